//! # flowchart2json
//!
//! Turn a flowchart picture (a call-centre IVR diagram, an approval process
//! sketched in a slide deck) into a machine-readable JSON state machine.
//!
//! ## Why this crate?
//!
//! Flowcharts are drawn for people: boxes, diamonds and arrows in whatever
//! layout fit the page. Systems that execute a flow need the opposite: a list
//! of steps with explicit, labelled transitions. A vision model can read the
//! drawing, but its answer is loose, and passing it straight through produces
//! flows with dead ends, unlabeled branches and steps nobody can reach.
//!
//! This crate keeps the model at the edge. The model reports only what it
//! sees ([`RawExtraction`]); a deterministic core types it into a
//! [`FlowGraph`], checks every structural invariant, and renders the
//! [`OutputDocument`]. Either the result is a valid flow or the run fails with
//! a specific [`FlowError`]; nothing half-correct is ever written.
//!
//! ## Pipeline Overview
//!
//! ```text
//! image / PDF / URL
//!  │
//!  ├─ 1. Input     resolve local file or download from URL, sniff format
//!  ├─ 2. Raster    render the PDF page via pdfium or decode the image
//!  ├─ 3. Extract   vision model → RawExtraction (retry + cleanup)
//!  ├─ 4. Build     classify shapes, assign ids, dedup connectors
//!  ├─ 5. Validate  start, reachability, branch labels, terminals
//!  └─ 6. Render    BFS from Start → OutputDocument JSON
//! ```
//!
//! Steps 4–6 are [`process_extraction`]: pure, synchronous and deterministic.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use flowchart2json::{convert_to_file, FlowConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = FlowConfig::default();
//!     let output = convert_to_file("ivr-flow.png", "ivr-flow.json", &config).await?;
//!     eprintln!("{} steps, {} transitions",
//!         output.stats.step_count,
//!         output.document.transition_count());
//!     Ok(())
//! }
//! ```
//!
//! ## Without a model
//!
//! ```rust
//! use flowchart2json::{process_extraction, FlowConfig, RawConnector, RawExtraction, RawShape};
//!
//! let raw = RawExtraction {
//!     shapes: vec![
//!         RawShape::new("s", "oval", "Start"),
//!         RawShape::new("a", "rectangle", "Play greeting"),
//!         RawShape::new("e", "oval", "End"),
//!     ],
//!     connectors: vec![RawConnector::new("s", "a"), RawConnector::new("a", "e")],
//! };
//! let output = process_extraction(raw, &FlowConfig::default()).unwrap();
//! assert_eq!(output.document.steps[0].id, "start");
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `flow2json` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod graph;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{FlowConfig, FlowConfigBuilder};
pub use convert::{
    convert, convert_from_bytes, convert_sync, convert_to_file, extract_raw, load_extraction,
    process_extraction, write_atomic, write_output,
};
pub use error::{ErrorCategory, FlowError, InvariantKind};
pub use graph::{
    BoundingBox, BuildWarning, Edge, FlowGraph, Node, NodeKind, RawConnector, RawExtraction,
    RawShape,
};
pub use output::{Branches, OutputDocument, PipelineOutput, PipelineStats, Step, StepType};
pub use pipeline::extract::{LlmVisionExtractor, VisionExtractor};
pub use progress::{
    NoopProgressCallback, PipelineProgressCallback, PipelineStage, ProgressCallback,
};
