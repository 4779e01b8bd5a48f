//! CLI binary for flowchart2json.
//!
//! A thin shim over the library crate that maps CLI flags to `FlowConfig`,
//! runs the pipeline and maps the failure kind to the process exit code.

use anyhow::{Context, Result};
use clap::Parser;
use flowchart2json::{
    extract_raw, load_extraction, process_extraction, write_atomic, write_output, BuildWarning,
    FlowConfig, FlowError, PipelineProgressCallback, PipelineStage, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: one spinner whose prefix follows the current stage, and
/// a log line per finished stage or builder warning.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  ⏱ {elapsed}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: PipelineStage) {
        self.bar.set_prefix(stage.name().to_string());
        let msg = match stage {
            PipelineStage::Load => "reading input…",
            PipelineStage::Extract => "asking the vision model…",
            PipelineStage::Build => "building graph…",
            PipelineStage::Validate => "checking invariants…",
            PipelineStage::Render => "rendering steps…",
            PipelineStage::Write => "writing JSON…",
        };
        self.bar.set_message(msg);
    }

    fn on_stage_complete(&self, stage: PipelineStage, elapsed_ms: u64) {
        self.bar.println(format!(
            "  {} {:<9} {}",
            green("✓"),
            stage.name(),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
    }

    fn on_warning(&self, warning: &BuildWarning) {
        self.bar
            .println(format!("  {} {}", yellow("⚠"), dim(&warning.to_string())));
    }

    fn on_pipeline_complete(&self, step_count: usize) {
        self.bar.set_message(format!("{step_count} steps"));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert an image (JSON on stdout)
  flow2json ivr-flow.png

  # Convert to file
  flow2json ivr-flow.png -o ivr-flow.json

  # Page 3 of a slide deck exported to PDF
  flow2json --page 3 deck.pdf -o approval.json

  # Use a specific model
  flow2json --model gpt-4.1 --provider openai ivr-flow.png

  # Keep the model's raw answer, then re-run the graph core on it offline
  flow2json ivr-flow.png --save-raw raw.json -o flow.json
  flow2json --from-raw raw.json -o flow.json

EXIT CODES:
  0   success
  2   input could not be read, rasterised or written
  3   vision extraction service failed
  4   extraction insufficient (no shapes, ambiguous shape, unlabeled branch)
  5   flow graph invariant violated
  70  internal error

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (PDF input only)
  RUST_LOG                Log filter, e.g. flowchart2json=debug
"#;

/// Convert flowchart images and PDFs into JSON state machines.
#[derive(Parser, Debug)]
#[command(
    name = "flow2json",
    version,
    about = "Convert flowchart images and PDFs into JSON state machines using Vision LLMs",
    long_about = "Read a flowchart (PNG, JPEG, or one page of a PDF; local path or URL) with a \
Vision Language Model, check it as a flow graph (one start, every step reachable, every decision \
branch labelled) and write it as a JSON list of steps with explicit transitions.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Image/PDF path or HTTP/HTTPS URL (a raw extraction JSON with --from-raw).
    input: String,

    /// Write JSON to this file instead of stdout.
    #[arg(short, long, env = "FLOW2JSON_OUTPUT")]
    output: Option<PathBuf>,

    /// Treat INPUT as a saved raw extraction and skip the vision model.
    #[arg(long)]
    from_raw: bool,

    /// Save the model's raw extraction as JSON to this path.
    #[arg(long, env = "FLOW2JSON_SAVE_RAW")]
    save_raw: Option<PathBuf>,

    /// Save the validated flow graph as JSON to this path.
    #[arg(long, env = "FLOW2JSON_SAVE_GRAPH")]
    save_graph: Option<PathBuf>,

    /// LLM model ID (e.g. gpt-4.1-mini, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(
        long,
        env = "EDGEQUAKE_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set.\n\
          Supported: openai, anthropic, gemini, azure, ollama, or any OpenAI-compatible URL."
    )]
    provider: Option<String>,

    /// PDF page holding the flowchart (1-indexed).
    #[arg(long, env = "FLOW2JSON_PAGE", default_value_t = 1,
          value_parser = clap::value_parser!(u64).range(1..))]
    page: u64,

    /// Rendering DPI for PDF input (72–400).
    #[arg(long, env = "FLOW2JSON_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Longest image edge in pixels sent to the model.
    #[arg(long, env = "FLOW2JSON_MAX_PIXELS", default_value_t = 2000)]
    max_pixels: u32,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "FLOW2JSON_PASSWORD")]
    password: Option<String>,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "FLOW2JSON_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Max LLM output tokens.
    #[arg(long, env = "FLOW2JSON_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "FLOW2JSON_TEMPERATURE", default_value_t = 0.2)]
    temperature: f32,

    /// Retries on extraction failure.
    #[arg(long, env = "FLOW2JSON_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Write compact single-line JSON.
    #[arg(long, env = "FLOW2JSON_COMPACT")]
    compact: bool,

    /// Disable progress spinner.
    #[arg(long, env = "FLOW2JSON_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "FLOW2JSON_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "FLOW2JSON_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "FLOW2JSON_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Per-attempt LLM call timeout in seconds.
    #[arg(long, env = "FLOW2JSON_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the spinner is active; the
    // spinner provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress = show_progress.then(CliProgressCallback::new);
    let result = run(&cli, progress.clone()).await;
    if let Some(ref cb) = progress {
        cb.finish();
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", red("✘"), e);
            let code = e
                .downcast_ref::<FlowError>()
                .map(FlowError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}

async fn run(cli: &Cli, progress: Option<Arc<CliProgressCallback>>) -> Result<()> {
    let started = Instant::now();
    let config = build_config(cli, progress.map(|cb| cb as ProgressCallback)).await?;

    // ── Raw extraction ───────────────────────────────────────────────────
    let raw = if cli.from_raw {
        load_extraction(&cli.input).context("Failed to load raw extraction")?
    } else {
        extract_raw(&cli.input, &config)
            .await
            .context("Extraction failed")?
    };
    let extraction_ms = started.elapsed().as_millis() as u64;

    if let Some(ref path) = cli.save_raw {
        save_json(path, &raw).await?;
    }

    // ── Graph core ───────────────────────────────────────────────────────
    let mut output = process_extraction(raw, &config).context("Conversion failed")?;
    if !cli.from_raw {
        output.stats.extraction_ms = extraction_ms;
    }
    output.stats.total_ms = started.elapsed().as_millis() as u64;

    // ── Output ───────────────────────────────────────────────────────────
    if let Some(ref output_path) = cli.output {
        write_output(&output, output_path, &config)
            .await
            .context("Failed to write output")?;

        if !cli.quiet {
            eprintln!(
                "{}  {} steps  {} transitions  {}ms  →  {}",
                green("✔"),
                output.stats.step_count,
                output.document.transition_count(),
                output.stats.total_ms,
                bold(&output_path.display().to_string()),
            );
        }
    } else {
        let mut json = output
            .document
            .to_json(config.pretty)
            .context("Failed to serialise output")?;
        if !json.ends_with('\n') {
            json.push('\n');
        }
        io::stdout()
            .lock()
            .write_all(json.as_bytes())
            .context("Failed to write to stdout")?;

        if !cli.quiet {
            eprintln!(
                "Converted {} shapes into {} steps in {}ms",
                output.stats.shape_count, output.stats.step_count, output.stats.total_ms
            );
        }
    }

    if let Some(ref path) = cli.save_graph {
        save_json(path, &output.graph).await?;
    }

    if !cli.quiet && (output.stats.dropped_shapes > 0 || output.stats.duplicate_connectors > 0) {
        eprintln!(
            "   {} shapes dropped  /  {} duplicate connectors ignored",
            dim(&output.stats.dropped_shapes.to_string()),
            dim(&output.stats.duplicate_connectors.to_string()),
        );
    }

    Ok(())
}

/// Map CLI args to `FlowConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<FlowConfig> {
    let mut builder = FlowConfig::builder()
        .dpi(cli.dpi)
        .max_rendered_pixels(cli.max_pixels)
        .page(cli.page as usize)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout)
        .pretty(!cli.compact);

    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Pretty-print an intermediate artefact to `path` (atomic write).
async fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut json = serde_json::to_string_pretty(value).context("Failed to serialise artefact")?;
    json.push('\n');
    write_atomic(path, &json)
        .await
        .with_context(|| format!("Failed to save {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowchart2json::{RawConnector, RawExtraction, RawShape};

    fn write_raw(dir: &Path) -> PathBuf {
        let raw = RawExtraction {
            shapes: vec![
                RawShape::new("1", "oval", "Start").at(0.0, 0.0),
                RawShape::new("2", "rectangle", "Play greeting").at(0.0, 100.0),
                RawShape::new("3", "oval", "End").at(0.0, 200.0),
            ],
            connectors: vec![RawConnector::new("1", "2"), RawConnector::new("2", "3")],
        };
        let path = dir.join("raw.json");
        std::fs::write(&path, serde_json::to_string(&raw).unwrap()).unwrap();
        path
    }

    fn cli_for(raw: &Path, output: &Path, graph: &Path) -> Cli {
        Cli::parse_from([
            "flow2json",
            "--from-raw",
            raw.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
            "--save-graph",
            graph.to_str().unwrap(),
            "--quiet",
        ])
    }

    #[tokio::test]
    async fn graph_saved_after_output() {
        let dir = tempfile::tempdir().unwrap();
        let raw = write_raw(dir.path());
        let out = dir.path().join("flow.json");
        let graph = dir.path().join("graph.json");
        run(&cli_for(&raw, &out, &graph), None).await.unwrap();
        assert!(out.exists());
        assert!(graph.exists());
    }

    #[tokio::test]
    async fn failed_output_write_leaves_no_graph() {
        let dir = tempfile::tempdir().unwrap();
        let raw = write_raw(dir.path());
        // A non-empty directory cannot be replaced by the output file.
        let out = dir.path().join("taken");
        std::fs::create_dir(&out).unwrap();
        std::fs::write(out.join("keep"), b"x").unwrap();
        let graph = dir.path().join("graph.json");
        assert!(run(&cli_for(&raw, &out, &graph), None).await.is_err());
        assert!(!graph.exists());
    }
}
