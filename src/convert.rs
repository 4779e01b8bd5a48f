//! Pipeline entry points: image/PDF → [`RawExtraction`] → [`OutputDocument`].
//!
//! ## Why two halves?
//!
//! [`extract_raw`] is the slow, networked half (load, rasterise, ask the
//! model). [`process_extraction`] is the fast, deterministic half (build,
//! validate, render) and takes no I/O at all. [`convert`] runs both. Keeping
//! them apart lets callers save the raw extraction before the core runs, and
//! re-run the core on a saved extraction without paying for another model call.
//!
//! Every stage fully consumes its predecessor's output; the first failure
//! aborts the run and nothing is written.
//!
//! [`OutputDocument`]: crate::output::OutputDocument

use crate::config::FlowConfig;
use crate::error::FlowError;
use crate::graph::{self, BuildWarning, RawExtraction};
use crate::output::{PipelineOutput, PipelineStats};
use crate::pipeline::extract::{LlmVisionExtractor, VisionExtractor};
use crate::pipeline::{encode, input, rasterise, response};
use crate::progress::PipelineStage;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Model used when a provider is picked without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";

/// Convert a flowchart image, PDF or URL into an output document.
///
/// This is the primary entry point for the library.
///
/// # Arguments
/// * `input_str` — Local file path or HTTP/HTTPS URL (PDF, PNG or JPEG)
/// * `config`    — Conversion configuration
///
/// # Errors
/// Any [`FlowError`]; see [`FlowError::category`] for the broad classes.
pub async fn convert(
    input_str: impl AsRef<str>,
    config: &FlowConfig,
) -> Result<PipelineOutput, FlowError> {
    let total_start = Instant::now();
    let extract_start = Instant::now();
    let raw = extract_raw(input_str, config).await?;
    let extraction_ms = elapsed_ms(extract_start);

    let mut output = run_core(raw, config)?;
    output.stats.extraction_ms = extraction_ms;
    output.stats.total_ms = elapsed_ms(total_start);
    info!(
        "Conversion complete: {} steps, {}ms total",
        output.stats.step_count, output.stats.total_ms
    );
    Ok(output)
}

/// Load the input and run the vision extractor, stopping before the core.
pub async fn extract_raw(
    input_str: impl AsRef<str>,
    config: &FlowConfig,
) -> Result<RawExtraction, FlowError> {
    let input_str = input_str.as_ref();
    info!("Starting extraction: {}", input_str);

    // ── Step 1: Resolve extractor (fail fast on missing credentials) ─────
    let extractor = resolve_extractor(config).await?;

    // ── Step 2: Load, rasterise, encode ──────────────────────────────────
    let stage = StageTimer::start(config, PipelineStage::Load);
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    let image = rasterise::load_image(&resolved, config).await?;
    let image_data =
        encode::encode_image(&image).map_err(|e| FlowError::RasterisationFailed {
            page: config.page,
            detail: format!("Image encoding failed: {e}"),
        })?;
    stage.finish(config);

    // ── Step 3: Extract ──────────────────────────────────────────────────
    let stage = StageTimer::start(config, PipelineStage::Extract);
    debug!("Running {} extractor", extractor.name());
    let raw = extractor.extract(&image_data).await?;
    stage.finish(config);
    Ok(raw)
}

/// Run the deterministic core on an extraction: build → validate → render.
///
/// No I/O, no model calls. A fixed extraction always yields the same document.
pub fn process_extraction(
    raw: RawExtraction,
    config: &FlowConfig,
) -> Result<PipelineOutput, FlowError> {
    let start = Instant::now();
    let mut output = run_core(raw, config)?;
    output.stats.total_ms = elapsed_ms(start);
    Ok(output)
}

fn run_core(raw: RawExtraction, config: &FlowConfig) -> Result<PipelineOutput, FlowError> {
    let mut stats = PipelineStats {
        shape_count: raw.shapes.len(),
        connector_count: raw.connectors.len(),
        ..Default::default()
    };

    // ── Build ────────────────────────────────────────────────────────────
    let stage = StageTimer::start(config, PipelineStage::Build);
    let graph = graph::build(&raw)?;
    stats.build_ms = stage.finish(config);
    for warning in graph.warnings() {
        match warning {
            BuildWarning::OrphanShapeDropped { .. } | BuildWarning::DecorationDropped { .. } => {
                stats.dropped_shapes += 1
            }
            BuildWarning::DuplicateConnector { .. } => stats.duplicate_connectors += 1,
            BuildWarning::BranchLabelInferred { .. } => stats.inferred_labels += 1,
            _ => {}
        }
        if let Some(ref cb) = config.progress_callback {
            cb.on_warning(warning);
        }
    }

    // ── Validate ─────────────────────────────────────────────────────────
    let stage = StageTimer::start(config, PipelineStage::Validate);
    graph::validate(&graph)?;
    stats.validate_ms = stage.finish(config);

    // ── Render ───────────────────────────────────────────────────────────
    let stage = StageTimer::start(config, PipelineStage::Render);
    let document = graph::render(&graph)?;
    stats.render_ms = stage.finish(config);

    stats.node_count = graph.node_count();
    stats.edge_count = graph.edge_count();
    stats.step_count = document.steps.len();

    if let Some(ref cb) = config.progress_callback {
        cb.on_pipeline_complete(stats.step_count);
    }
    debug!("Pipeline stats: {:?}", stats);

    Ok(PipelineOutput {
        document,
        graph,
        raw,
        stats,
    })
}

/// Convert and write the JSON document to a file.
///
/// Uses atomic write (temp file + rename): on any failure, including a
/// failed write, no file exists at `output_path`.
pub async fn convert_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &FlowConfig,
) -> Result<PipelineOutput, FlowError> {
    let output = convert(input_str, config).await?;
    write_output(&output, output_path.as_ref(), config).await?;
    Ok(output)
}

/// Serialize a finished run's document and write it atomically.
pub async fn write_output(
    output: &PipelineOutput,
    path: &Path,
    config: &FlowConfig,
) -> Result<(), FlowError> {
    let stage = StageTimer::start(config, PipelineStage::Write);
    let json = output
        .document
        .to_json(config.pretty)
        .map_err(|e| FlowError::Internal(format!("Failed to serialise document: {e}")))?;
    write_atomic(path, &json).await?;
    stage.finish(config);
    info!("Wrote {} steps to {}", output.stats.step_count, path.display());
    Ok(())
}

/// Write `contents` to `<path>.tmp`, then rename over `path`.
pub async fn write_atomic(path: &Path, contents: &str) -> Result<(), FlowError> {
    let write_err = |e| FlowError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = std::path::PathBuf::from(tmp_name);

    tokio::fs::write(&tmp_path, contents)
        .await
        .map_err(write_err)?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_err(e));
    }
    Ok(())
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input_str: impl AsRef<str>,
    config: &FlowConfig,
) -> Result<PipelineOutput, FlowError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| FlowError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(convert(input_str, config))
}

/// Convert an in-memory image or PDF.
///
/// The bytes go to a managed [`tempfile`] that is removed on return.
///
/// # Example
/// ```rust,no_run
/// use flowchart2json::{convert_from_bytes, FlowConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes: Vec<u8> = std::fs::read("ivr-flow.png")?;
/// let output = convert_from_bytes(&bytes, &FlowConfig::default()).await?;
/// println!("{}", output.document.to_json(true)?);
/// # Ok(())
/// # }
/// ```
pub async fn convert_from_bytes(
    bytes: &[u8],
    config: &FlowConfig,
) -> Result<PipelineOutput, FlowError> {
    let mut tmp = tempfile::NamedTempFile::new()
        .map_err(|e| FlowError::Internal(format!("tempfile: {e}")))?;
    tmp.write_all(bytes)
        .map_err(|e| FlowError::Internal(format!("tempfile write: {e}")))?;
    let path = tmp.path().to_string_lossy().to_string();
    // `tmp` is dropped (and the file deleted) when `convert` returns
    convert(&path, config).await
}

/// Load a saved raw extraction (as written by `--save-raw`, or a model
/// answer saved verbatim; the same cleanup rules apply).
pub fn load_extraction(path: impl AsRef<Path>) -> Result<RawExtraction, FlowError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => FlowError::FileNotFound {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => FlowError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => FlowError::InvalidExtraction {
            path: path.to_path_buf(),
            detail: e.to_string(),
        },
    })?;
    response::parse_extraction(&text).map_err(|e| FlowError::InvalidExtraction {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Fires `on_stage_start` on creation and `on_stage_complete` on `finish`.
/// A stage that fails is simply never finished.
struct StageTimer {
    stage: PipelineStage,
    start: Instant,
}

impl StageTimer {
    fn start(config: &FlowConfig, stage: PipelineStage) -> Self {
        debug!("Stage {} started", stage);
        if let Some(ref cb) = config.progress_callback {
            cb.on_stage_start(stage);
        }
        Self {
            stage,
            start: Instant::now(),
        }
    }

    fn finish(self, config: &FlowConfig) -> u64 {
        let ms = elapsed_ms(self.start);
        debug!("Stage {} finished in {}ms", self.stage, ms);
        if let Some(ref cb) = config.progress_callback {
            cb.on_stage_complete(self.stage, ms);
        }
        ms
    }
}

/// Pick the extractor: a pre-built one, else an LLM extractor over the
/// resolved provider.
async fn resolve_extractor(config: &FlowConfig) -> Result<Arc<dyn VisionExtractor>, FlowError> {
    if let Some(ref extractor) = config.extractor {
        return Ok(Arc::clone(extractor));
    }
    let provider = resolve_provider(config).await?;
    Ok(Arc::new(LlmVisionExtractor::new(provider, config)))
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, FlowError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        FlowError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`); the factory reads
///    the matching API key from the environment.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`),
///    checked before auto-detection so the model choice is honoured even when
///    several API keys are present.
/// 4. **OpenAI key** (`OPENAI_API_KEY`), then **full auto-detection**
///    (`ProviderFactory::from_env`).
async fn resolve_provider(config: &FlowConfig) -> Result<Arc<dyn LLMProvider>, FlowError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_vision_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| FlowError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{RawConnector, RawShape};

    fn flow() -> RawExtraction {
        RawExtraction {
            shapes: vec![
                RawShape::new("a", "oval", "Start").at(0.0, 0.0),
                RawShape::new("b", "rectangle", "Greet caller").at(0.0, 100.0),
                RawShape::new("c", "oval", "End").at(0.0, 200.0),
                RawShape::new("n", "note", "v2 draft").at(300.0, 0.0),
            ],
            connectors: vec![
                RawConnector::new("a", "b"),
                RawConnector::new("b", "c"),
                RawConnector::new("b", "c"),
            ],
        }
    }

    #[test]
    fn process_extraction_fills_stats() {
        let out = process_extraction(flow(), &FlowConfig::default()).unwrap();
        assert_eq!(out.stats.shape_count, 4);
        assert_eq!(out.stats.connector_count, 3);
        assert_eq!(out.stats.node_count, 3);
        assert_eq!(out.stats.edge_count, 2);
        assert_eq!(out.stats.step_count, 3);
        assert_eq!(out.stats.dropped_shapes, 1);
        assert_eq!(out.stats.duplicate_connectors, 1);
        assert_eq!(out.stats.extraction_ms, 0);
        assert_eq!(out.raw, flow());
    }

    #[tokio::test]
    async fn write_atomic_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.json");
        write_atomic(&path, "{}\n").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}\n");
        let names: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn load_extraction_missing_file() {
        let err = load_extraction("/no/such/raw.json").unwrap_err();
        assert!(matches!(err, FlowError::FileNotFound { .. }));
    }

    #[test]
    fn load_extraction_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            load_extraction(&path).unwrap_err(),
            FlowError::InvalidExtraction { .. }
        ));
    }

    #[test]
    fn load_extraction_accepts_saved_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.json");
        std::fs::write(&path, serde_json::to_string_pretty(&flow()).unwrap()).unwrap();
        assert_eq!(load_extraction(&path).unwrap(), flow());
    }
}
