//! Progress-callback trait for pipeline stage events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::FlowConfigBuilder::progress_callback`] to be told when
//! each stage starts and finishes, and about every non-fatal builder repair.
//!
//! # Why callbacks instead of channels?
//!
//! The host decides where events go (a spinner, a log line, a job record)
//! without the library knowing how it communicates. The CLI uses this to
//! drive its spinner.
//!
//! # Example
//!
//! ```rust
//! use flowchart2json::{FlowConfig, PipelineProgressCallback, PipelineStage};
//! use std::sync::{Arc, Mutex};
//!
//! #[derive(Default)]
//! struct StageLog(Mutex<Vec<PipelineStage>>);
//!
//! impl PipelineProgressCallback for StageLog {
//!     fn on_stage_complete(&self, stage: PipelineStage, _elapsed_ms: u64) {
//!         self.0.lock().unwrap().push(stage);
//!     }
//! }
//!
//! let config = FlowConfig::builder()
//!     .progress_callback(Arc::new(StageLog::default()))
//!     .build()
//!     .unwrap();
//! ```

use crate::graph::BuildWarning;
use std::fmt;
use std::sync::Arc;

/// A step of the pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    /// Resolve path/URL, sniff format, rasterise, encode.
    Load,
    /// Call the vision extractor.
    Extract,
    Build,
    Validate,
    Render,
    /// Write the JSON file (only from `convert_to_file`).
    Write,
}

impl PipelineStage {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineStage::Load => "load",
            PipelineStage::Extract => "extract",
            PipelineStage::Build => "build",
            PipelineStage::Validate => "validate",
            PipelineStage::Render => "render",
            PipelineStage::Write => "write",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Called by the pipeline as it moves through its stages.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. A stage that fails gets `on_stage_start` but no
/// `on_stage_complete`.
pub trait PipelineProgressCallback: Send + Sync {
    fn on_stage_start(&self, stage: PipelineStage) {
        let _ = stage;
    }

    fn on_stage_complete(&self, stage: PipelineStage, elapsed_ms: u64) {
        let _ = (stage, elapsed_ms);
    }

    /// Called once per builder repair (dedup, orphan drop, …), after Build.
    fn on_warning(&self, warning: &BuildWarning) {
        let _ = warning;
    }

    /// Called once after the document is rendered.
    fn on_pipeline_complete(&self, step_count: usize) {
        let _ = step_count;
    }
}

/// A no-op implementation; the default when no callback is configured.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::FlowConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        warnings: AtomicUsize,
        steps: AtomicUsize,
    }

    impl PipelineProgressCallback for TrackingCallback {
        fn on_stage_start(&self, _stage: PipelineStage) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_stage_complete(&self, _stage: PipelineStage, _elapsed_ms: u64) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_warning(&self, _warning: &BuildWarning) {
            self.warnings.fetch_add(1, Ordering::SeqCst);
        }

        fn on_pipeline_complete(&self, step_count: usize) {
            self.steps.store(step_count, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_stage_start(PipelineStage::Load);
        cb.on_stage_complete(PipelineStage::Load, 3);
        cb.on_warning(&BuildWarning::OrphanShapeDropped {
            shape: "x".into(),
            label: "Legend".into(),
        });
        cb.on_pipeline_complete(4);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        for stage in [PipelineStage::Build, PipelineStage::Validate] {
            tracker.on_stage_start(stage);
            tracker.on_stage_complete(stage, 1);
        }
        tracker.on_stage_start(PipelineStage::Render);
        tracker.on_pipeline_complete(7);

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.warnings.load(Ordering::SeqCst), 0);
        assert_eq!(tracker.steps.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn stage_names() {
        assert_eq!(PipelineStage::Extract.to_string(), "extract");
        assert_eq!(PipelineStage::Write.name(), "write");
    }
}
