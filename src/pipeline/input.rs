//! Input handling: classify raw bytes, and resolve paths or URLs to bytes.
//!
//! Detection trusts the bytes over the label. Magic-byte sniffing (via
//! `infer`) decides between PDF and image; the declared MIME type or file
//! name only sharpens the error when sniffing fails, so a `.pdf` upload with
//! garbage bytes is reported as unreadable rather than unsupported.

use crate::error::ExtractError;
use crate::output::SourceKind;
use std::path::Path;
use tracing::{debug, info};

const PDF_MAGIC: &[u8] = b"%PDF";

/// An uploaded document: its bytes plus the detected kind.
///
/// Immutable once constructed.
#[derive(Debug, Clone)]
pub struct RawInput {
    bytes: Vec<u8>,
    kind: SourceKind,
}

impl RawInput {
    /// Classify `bytes`. `declared` is a MIME type (`application/pdf`,
    /// `image/png`) or a file name / extension (`scan.tiff`, `.pdf`).
    pub fn new(bytes: Vec<u8>, declared: Option<&str>) -> Result<Self, ExtractError> {
        let kind = detect_kind(&bytes, declared)?;
        debug!(
            "Detected {:?} input ({} bytes, declared {:?})",
            kind,
            bytes.len(),
            declared
        );
        Ok(Self { bytes, kind })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// What the caller claimed the input is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Declared {
    Pdf,
    Image,
    Other,
    Unknown,
}

fn classify_declared(declared: Option<&str>) -> Declared {
    let Some(raw) = declared.map(|d| d.trim().to_ascii_lowercase()) else {
        return Declared::Unknown;
    };
    if raw.is_empty() {
        return Declared::Unknown;
    }
    if raw.contains('/') && !raw.contains('.') {
        // MIME type
        return if raw == "application/pdf" || raw == "application/x-pdf" {
            Declared::Pdf
        } else if raw.starts_with("image/") {
            Declared::Image
        } else {
            Declared::Other
        };
    }
    let ext = raw.rsplit('.').next().unwrap_or(&raw);
    match ext {
        "pdf" => Declared::Pdf,
        "png" | "jpg" | "jpeg" | "tif" | "tiff" | "bmp" | "gif" | "webp" => Declared::Image,
        _ => Declared::Other,
    }
}

fn magic(bytes: &[u8]) -> Vec<u8> {
    bytes.iter().take(8).copied().collect()
}

/// Decide whether `bytes` are a PDF or an image.
pub fn detect_kind(bytes: &[u8], declared: Option<&str>) -> Result<SourceKind, ExtractError> {
    if bytes.is_empty() {
        return Err(ExtractError::EmptyInput);
    }

    let declared_kind = classify_declared(declared);

    if bytes.starts_with(PDF_MAGIC) {
        return Ok(SourceKind::Pdf);
    }
    if let Some(t) = infer::get(bytes) {
        match t.mime_type() {
            "application/pdf" => return Ok(SourceKind::Pdf),
            m if m.starts_with("image/") => {
                image::guess_format(bytes).map_err(|e| ExtractError::UndecodableImage {
                    detail: format!("{m}: {e}"),
                })?;
                return Ok(SourceKind::Image);
            }
            _ => {}
        }
    }

    match declared_kind {
        Declared::Pdf => Err(ExtractError::NotAPdf {
            magic: magic(bytes),
        }),
        Declared::Image => match image::guess_format(bytes) {
            Ok(_) => Ok(SourceKind::Image),
            Err(e) => Err(ExtractError::UndecodableImage {
                detail: e.to_string(),
            }),
        },
        Declared::Other | Declared::Unknown => {
            // Formats `infer` misses but `image` still recognises (e.g. some TGA/PNM).
            if image::guess_format(bytes).is_ok() {
                return Ok(SourceKind::Image);
            }
            Err(ExtractError::UnsupportedFormat {
                declared: declared.map(str::to_string),
                magic: magic(bytes),
            })
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// A path or URL resolved to bytes, with a name hint for detection.
#[derive(Debug)]
pub struct ResolvedInput {
    pub bytes: Vec<u8>,
    /// File name (local) or `Content-Type` / URL file name (download).
    pub declared: Option<String>,
}

/// Resolve a local path or HTTP(S) URL to its bytes.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, ExtractError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(Path::new(input)).await
    }
}

async fn resolve_local(path: &Path) -> Result<ResolvedInput, ExtractError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ExtractError::FileNotFound {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => ExtractError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => ExtractError::Internal(format!("Failed to read '{}': {e}", path.display())),
    })?;

    debug!("Read {} bytes from {}", bytes.len(), path.display());
    let declared = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned());
    Ok(ResolvedInput { bytes, declared })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, ExtractError> {
    info!("Downloading document from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ExtractError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            ExtractError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            ExtractError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(ExtractError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
        .filter(|v| v != "application/octet-stream");
    let declared = content_type.or_else(|| filename_from_url(url));

    let bytes = response.bytes().await.map_err(|e| {
        if e.is_timeout() {
            ExtractError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            ExtractError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    info!("Downloaded {} bytes", bytes.len());
    Ok(ResolvedInput {
        bytes: bytes.to_vec(),
        declared,
    })
}

/// Last URL path segment, if it looks like a file name.
fn filename_from_url(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    if !last.is_empty() && last.contains('.') {
        Some(last.to_string())
    } else {
        None
    }
}
