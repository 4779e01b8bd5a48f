//! Error types for the flowchart2json library.
//!
//! Every failure in the pipeline is fatal: a run either produces a complete,
//! validated [`crate::output::OutputDocument`] or nothing at all. The only
//! non-fatal events (duplicate connectors, orphan or decorative shapes) are
//! recorded as [`crate::graph::BuildWarning`] values instead of errors.
//!
//! [`FlowError`] groups its variants by the stage that raises them. Callers
//! that only care about the broad class of failure (for example to pick a
//! process exit code) use [`FlowError::category`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the flowchart2json library.
#[derive(Debug, Error)]
pub enum FlowError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file is neither a PDF nor a supported raster image.
    #[error("Unsupported input format for '{path}': expected PDF, PNG or JPEG (first bytes: {magic:?})")]
    UnsupportedFormat { path: PathBuf, magic: [u8; 4] },

    // ── Rasterisation errors ──────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// The selected page does not exist in the document.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// The page or image could not be turned into a bitmap.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide.\n\
Raster inputs (PNG/JPEG) do not need pdfium."
    )]
    PdfiumBindingFailed(String),

    // ── Extraction service errors ─────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The image-understanding service was unreachable or answered with
    /// something that is not a raw extraction.
    #[error("Extraction service failed after {attempts} attempt(s): {detail}")]
    ExtractionService { attempts: u32, detail: String },

    /// A saved raw extraction file could not be read or parsed.
    #[error("Invalid raw extraction '{path}': {detail}")]
    InvalidExtraction { path: PathBuf, detail: String },

    // ── Graph building errors ─────────────────────────────────────────────
    /// The extraction contains no shapes at all.
    #[error("Extraction is incomplete: no shapes were detected.\nSupply a clearer image of the flowchart.")]
    ExtractionIncomplete,

    /// A shape could not be classified confidently.
    #[error("Ambiguous shape '{shape}': {reason}\nSupply a clearer image of the flowchart.")]
    AmbiguousShape { shape: String, reason: String },

    /// A decision branch has no label and none could be inferred.
    #[error("Decision '{node_id}' has an unlabeled branch to '{target}'\nEvery decision branch needs a label such as Yes/No.")]
    UnlabeledBranch { node_id: String, target: String },

    // ── Validation errors ─────────────────────────────────────────────────
    /// The built graph violates a structural invariant.
    #[error("Flow graph invariant violated ({kind}) at '{element_id}': {}", .kind.describe())]
    GraphInvariant {
        kind: InvariantKind,
        element_id: String,
    },

    // ── Rendering errors ──────────────────────────────────────────────────
    /// A node kind with no output mapping reached the renderer.
    #[error("Unsupported node kind '{kind}' on node '{node_id}' (internal error)")]
    UnsupportedNodeKind { node_id: String, kind: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// The structural invariant a [`FlowError::GraphInvariant`] refers to.
///
/// Variants are listed in the order the validator checks them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvariantKind {
    /// No node of kind Start, or the designated start is not one.
    MissingStart,
    /// More than one node of kind Start.
    MultipleStarts,
    /// An edge targets the Start node.
    StartHasIncoming,
    /// An edge endpoint or outgoing reference names a missing element.
    DanglingEdge,
    /// A node cannot be reached from Start.
    Unreachable,
    /// A decision has fewer than two branches.
    TooFewBranches,
    /// A decision branch has an empty label.
    MissingBranchLabel,
    /// Two branches of one decision share a label.
    DuplicateBranchLabel,
    /// An edge leaves and enters the same node.
    SelfLoop,
    /// An End or Terminator node has outgoing edges.
    TerminalHasOutgoing,
    /// A non-terminal node has no outgoing edges.
    DeadEnd,
}

impl InvariantKind {
    /// Stable snake_case name used in messages and JSON.
    pub fn as_str(&self) -> &'static str {
        match self {
            InvariantKind::MissingStart => "missing_start",
            InvariantKind::MultipleStarts => "multiple_starts",
            InvariantKind::StartHasIncoming => "start_has_incoming",
            InvariantKind::DanglingEdge => "dangling_edge",
            InvariantKind::Unreachable => "unreachable",
            InvariantKind::TooFewBranches => "too_few_branches",
            InvariantKind::MissingBranchLabel => "missing_branch_label",
            InvariantKind::DuplicateBranchLabel => "duplicate_branch_label",
            InvariantKind::SelfLoop => "self_loop",
            InvariantKind::TerminalHasOutgoing => "terminal_has_outgoing",
            InvariantKind::DeadEnd => "dead_end",
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            InvariantKind::MissingStart => "the flow has no start step",
            InvariantKind::MultipleStarts => "the flow has more than one start step",
            InvariantKind::StartHasIncoming => "a transition leads back into the start step",
            InvariantKind::DanglingEdge => "a transition references a step that does not exist",
            InvariantKind::Unreachable => "the step cannot be reached from the start step",
            InvariantKind::TooFewBranches => "a decision needs at least two branches",
            InvariantKind::MissingBranchLabel => "a decision branch has an empty label",
            InvariantKind::DuplicateBranchLabel => "two branches of a decision share a label",
            InvariantKind::SelfLoop => "a transition loops onto its own step",
            InvariantKind::TerminalHasOutgoing => "an end or terminator step has outgoing transitions",
            InvariantKind::DeadEnd => "a non-terminal step has no outgoing transition",
        }
    }
}

impl fmt::Display for InvariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broad class of a [`FlowError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad input file, URL, page selection, configuration or output path.
    Input,
    /// The image-understanding service failed or answered garbage.
    ExtractionService,
    /// The extraction was received but is not enough to build a flow.
    ExtractionInsufficient,
    /// The inferred flow is structurally defective.
    Invariant,
    /// A logic gap inside the library.
    Internal,
}

impl FlowError {
    /// Classify this error for reporting.
    pub fn category(&self) -> ErrorCategory {
        match self {
            FlowError::FileNotFound { .. }
            | FlowError::PermissionDenied { .. }
            | FlowError::InvalidInput { .. }
            | FlowError::DownloadFailed { .. }
            | FlowError::DownloadTimeout { .. }
            | FlowError::UnsupportedFormat { .. }
            | FlowError::CorruptPdf { .. }
            | FlowError::PasswordRequired { .. }
            | FlowError::WrongPassword { .. }
            | FlowError::PageOutOfRange { .. }
            | FlowError::RasterisationFailed { .. }
            | FlowError::PdfiumBindingFailed(_)
            | FlowError::InvalidExtraction { .. }
            | FlowError::OutputWriteFailed { .. }
            | FlowError::InvalidConfig(_) => ErrorCategory::Input,
            FlowError::ProviderNotConfigured { .. } | FlowError::ExtractionService { .. } => {
                ErrorCategory::ExtractionService
            }
            FlowError::ExtractionIncomplete
            | FlowError::AmbiguousShape { .. }
            | FlowError::UnlabeledBranch { .. } => ErrorCategory::ExtractionInsufficient,
            FlowError::GraphInvariant { .. } => ErrorCategory::Invariant,
            FlowError::UnsupportedNodeKind { .. } | FlowError::Internal(_) => {
                ErrorCategory::Internal
            }
        }
    }

    /// Process exit code for this error. Always non-zero.
    pub fn exit_code(&self) -> u8 {
        match self.category() {
            ErrorCategory::Input => 2,
            ErrorCategory::ExtractionService => 3,
            ErrorCategory::ExtractionInsufficient => 4,
            ErrorCategory::Invariant => 5,
            ErrorCategory::Internal => 70,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invariant_display_names_kind_and_element() {
        let e = FlowError::GraphInvariant {
            kind: InvariantKind::Unreachable,
            element_id: "action-audit".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("unreachable"), "got: {msg}");
        assert!(msg.contains("action-audit"), "got: {msg}");
    }

    #[test]
    fn unlabeled_branch_display() {
        let e = FlowError::UnlabeledBranch {
            node_id: "decision-valid".into(),
            target: "action-reject".into(),
        };
        assert!(e.to_string().contains("decision-valid"));
        assert!(e.to_string().contains("action-reject"));
    }

    #[test]
    fn extraction_service_display() {
        let e = FlowError::ExtractionService {
            attempts: 4,
            detail: "connection refused".into(),
        };
        assert!(e.to_string().contains("4 attempt"));
        assert!(e.to_string().contains("connection refused"));
    }

    #[test]
    fn invariant_kind_serialises_snake_case() {
        let json = serde_json::to_string(&InvariantKind::TerminalHasOutgoing).unwrap();
        assert_eq!(json, "\"terminal_has_outgoing\"");
        assert_eq!(InvariantKind::TerminalHasOutgoing.as_str(), "terminal_has_outgoing");
    }

    #[test]
    fn exit_codes_are_non_zero_and_grouped() {
        let cases = [
            (FlowError::ExtractionIncomplete, 4),
            (
                FlowError::ExtractionService {
                    attempts: 1,
                    detail: "x".into(),
                },
                3,
            ),
            (
                FlowError::GraphInvariant {
                    kind: InvariantKind::SelfLoop,
                    element_id: "e".into(),
                },
                5,
            ),
            (
                FlowError::UnsupportedNodeKind {
                    node_id: "n".into(),
                    kind: "unrecognized".into(),
                },
                70,
            ),
            (FlowError::InvalidConfig("bad".into()), 2),
        ];
        for (err, code) in cases {
            assert_eq!(err.exit_code(), code, "{err}");
        }
    }
}
