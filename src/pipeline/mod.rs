//! Adapter stages around the graph core: everything that touches files, the
//! network or a model.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ rasterise ──▶ encode ──▶ extract ──▶ response
//! (URL/path)  (pdfium/     (base64)    (VLM +      (cleanup,
//!              image)                   retry)      parse)
//! ```
//!
//! 1. [`input`]     — canonicalise the path or URL to a local file and sniff
//!    its format from magic bytes
//! 2. [`rasterise`] — render one PDF page or decode the image; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 3. [`encode`]    — PNG-encode and base64-wrap the bitmap for the request
//! 4. [`extract`]   — the [`VisionExtractor`](extract::VisionExtractor) seam
//!    and its LLM implementation; the only stage with model I/O
//! 5. [`response`]  — deterministic repairs to the model's JSON answer

pub mod encode;
pub mod extract;
pub mod input;
pub mod rasterise;
pub mod response;
