//! Input resolution: normalise a user-supplied path or URL to a local file
//! and work out whether it is a PDF or a raster image.
//!
//! ## Why sniff magic bytes?
//!
//! Flowcharts arrive as exported PNGs, phone-camera JPEGs and single-page PDFs,
//! often with the wrong extension. The first bytes are authoritative; the
//! extension is never consulted. Anything that is not PDF, PNG or JPEG fails
//! here with a clear error instead of deep inside pdfium or the image decoder.

use crate::error::FlowError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// Detected input format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Pdf,
    Png,
    Jpeg,
}

impl InputFormat {
    /// Identify a format from the leading bytes of a file.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"%PDF") {
            Some(InputFormat::Pdf)
        } else if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
            Some(InputFormat::Png)
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(InputFormat::Jpeg)
        } else {
            None
        }
    }
}

fn magic_of(bytes: &[u8]) -> [u8; 4] {
    let mut magic = [0u8; 4];
    let n = bytes.len().min(4);
    magic[..n].copy_from_slice(&bytes[..n]);
    magic
}

/// The resolved input — either a local path or a downloaded temp file.
#[derive(Debug)]
pub enum ResolvedInput {
    /// Input was already a local file.
    Local { path: PathBuf, format: InputFormat },
    /// Input was a URL; downloaded to a temp directory that lives as long as this value.
    Downloaded {
        path: PathBuf,
        format: InputFormat,
        _temp_dir: TempDir,
    },
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local { path, .. } => path,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }

    pub fn format(&self) -> InputFormat {
        match self {
            ResolvedInput::Local { format, .. } => *format,
            ResolvedInput::Downloaded { format, .. } => *format,
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to a local file of a supported format.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, FlowError> {
    if input.trim().is_empty() {
        return Err(FlowError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

fn resolve_local(path_str: &str) -> Result<ResolvedInput, FlowError> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(FlowError::FileNotFound { path });
    }
    if path.is_dir() {
        return Err(FlowError::InvalidInput {
            input: path_str.to_string(),
        });
    }

    let mut head = Vec::with_capacity(8);
    match std::fs::File::open(&path) {
        Ok(f) => {
            f.take(8)
                .read_to_end(&mut head)
                .map_err(|e| FlowError::Internal(format!("Failed to read input: {e}")))?;
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(FlowError::PermissionDenied { path });
        }
        Err(_) => return Err(FlowError::FileNotFound { path }),
    }

    let Some(format) = InputFormat::sniff(&head) else {
        return Err(FlowError::UnsupportedFormat {
            path,
            magic: magic_of(&head),
        });
    };

    debug!("Resolved local {:?} input: {}", format, path.display());
    Ok(ResolvedInput::Local { path, format })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, FlowError> {
    info!("Downloading flowchart from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| FlowError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            FlowError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            FlowError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(FlowError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let filename = filename_from_url(url);
    let temp_dir = TempDir::new().map_err(|e| FlowError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(&filename);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| FlowError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let Some(format) = InputFormat::sniff(&bytes) else {
        return Err(FlowError::UnsupportedFormat {
            path: file_path,
            magic: magic_of(&bytes),
        });
    };

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| FlowError::Internal(format!("Failed to write temp file: {e}")))?;

    info!("Downloaded {:?} to: {}", format, file_path.display());
    Ok(ResolvedInput::Downloaded {
        path: file_path,
        format,
        _temp_dir: temp_dir,
    })
}

/// Last URL path segment if it looks like a file name, else a fixed name.
fn filename_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut s| s.next_back().map(str::to_string))
        })
        .filter(|last| !last.is_empty() && last.contains('.'))
        .unwrap_or_else(|| "downloaded-flowchart".to_string())
}
