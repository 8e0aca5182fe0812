//! Error types for the pagescribe library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ExtractError`] — **Fatal**: the document cannot be processed at all
//!   (corrupt or encrypted PDF, empty upload, unsupported format, bad
//!   configuration). Returned as `Err(ExtractError)` from the top-level
//!   `extract*` functions. Every variant maps to a machine-readable
//!   [`ErrorKind`].
//!
//! * [`PageError`] — **Non-fatal**: a single page failed (render glitch,
//!   OCR engine crash, timeout, vision call exhausted its retries). Stored
//!   inside [`crate::output::PageResult`] next to a zero-confidence empty
//!   text, so a document with failed pages still completes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Machine-readable classification of a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Corrupt, truncated, encrypted or otherwise unreadable input.
    UnreadableInput,
    /// Input is neither an image nor a PDF.
    UnsupportedFormat,
    /// Zero-byte upload or a PDF without pages.
    EmptyDocument,
    /// The caller's configuration cannot be satisfied.
    InvalidConfig,
    /// Unexpected failure inside the pipeline itself.
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnreadableInput => "unreadable_input",
            ErrorKind::UnsupportedFormat => "unsupported_format",
            ErrorKind::EmptyDocument => "empty_document",
            ErrorKind::InvalidConfig => "invalid_config",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All fatal errors returned by the pagescribe library.
///
/// Page-level failures use [`PageError`] and are stored in
/// [`crate::output::PageResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The upload contained no bytes.
    #[error("Input is empty (0 bytes)")]
    EmptyInput,

    /// The bytes are neither a PDF nor a decodable image.
    #[error("Unsupported input format (declared: {declared:?}), first bytes {magic:?}")]
    UnsupportedFormat {
        declared: Option<String>,
        magic: Vec<u8>,
    },

    /// The input was declared or sniffed as a PDF but does not start with `%PDF`.
    #[error("Input declared as PDF is not a valid PDF: first bytes {magic:?}")]
    NotAPdf { magic: Vec<u8> },

    /// Image bytes could not be decoded.
    #[error("Image could not be decoded: {detail}")]
    UndecodableImage { detail: String },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF is corrupt: {detail}")]
    CorruptPdf { detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF is encrypted and requires a password")]
    PasswordRequired,

    /// A password was provided but it is wrong.
    #[error("Wrong password for encrypted PDF")]
    WrongPassword,

    /// The PDF opened fine but contains no pages.
    #[error("PDF contains no pages")]
    NoPages,

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium, place the library in the working\n\
directory, or install it system-wide.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Vision fallback is enabled but no provider could be resolved.
    #[error("Vision provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExtractError {
    /// The machine-readable kind reported to callers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExtractError::FileNotFound { .. }
            | ExtractError::PermissionDenied { .. }
            | ExtractError::DownloadFailed { .. }
            | ExtractError::DownloadTimeout { .. }
            | ExtractError::NotAPdf { .. }
            | ExtractError::UndecodableImage { .. }
            | ExtractError::CorruptPdf { .. }
            | ExtractError::PasswordRequired
            | ExtractError::WrongPassword => ErrorKind::UnreadableInput,
            ExtractError::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            ExtractError::EmptyInput | ExtractError::NoPages => ErrorKind::EmptyDocument,
            ExtractError::InvalidConfig(_) | ExtractError::ProviderNotConfigured { .. } => {
                ErrorKind::InvalidConfig
            }
            ExtractError::PdfiumBindingFailed(_) | ExtractError::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }
}

/// A non-fatal error for a single page.
///
/// Stored in [`crate::output::PageResult::error`] when a page fails.
/// The document still completes; the page carries empty text and
/// zero confidence.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageError {
    /// Page rasterisation or image preparation failed.
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// The direct text layer could not be read.
    #[error("Page {page}: text layer extraction failed: {detail}")]
    DirectFailed { page: usize, detail: String },

    /// The OCR engine crashed or returned unusable output.
    #[error("Page {page}: OCR failed: {detail}")]
    OcrFailed { page: usize, detail: String },

    /// Vision transcription failed after retries.
    #[error("Page {page}: vision transcription failed after {retries} retries: {detail}")]
    VisionFailed {
        page: usize,
        retries: u32,
        detail: String,
    },

    /// A strategy attempt exceeded the per-page timeout.
    #[error("Page {page}: {strategy} attempt timed out after {secs}s")]
    Timeout {
        page: usize,
        strategy: String,
        secs: u64,
    },

    /// More than one strategy failed; reasons in precedence order.
    #[error("Page {page}: all strategies failed: {}", reasons.join("; "))]
    AllStrategiesFailed { page: usize, reasons: Vec<String> },

    /// The page's temporary directory could not be created.
    #[error("Page {page}: scratch directory unavailable: {detail}")]
    ScratchUnavailable { page: usize, detail: String },

    /// No strategy in the configured list was applicable to the page.
    #[error("Page {page}: no applicable extraction strategy")]
    NoStrategy { page: usize },
}

impl PageError {
    /// 1-based page number the error belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageError::RenderFailed { page, .. }
            | PageError::DirectFailed { page, .. }
            | PageError::OcrFailed { page, .. }
            | PageError::VisionFailed { page, .. }
            | PageError::Timeout { page, .. }
            | PageError::AllStrategiesFailed { page, .. }
            | PageError::ScratchUnavailable { page, .. }
            | PageError::NoStrategy { page } => *page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(
            ExtractError::CorruptPdf {
                detail: "bad xref".into()
            }
            .kind(),
            ErrorKind::UnreadableInput
        );
        assert_eq!(ExtractError::PasswordRequired.kind(), ErrorKind::UnreadableInput);
        assert_eq!(ExtractError::EmptyInput.kind(), ErrorKind::EmptyDocument);
        assert_eq!(ExtractError::NoPages.kind(), ErrorKind::EmptyDocument);
        assert_eq!(
            ExtractError::UnsupportedFormat {
                declared: Some("text/plain".into()),
                magic: b"hell".to_vec(),
            }
            .kind(),
            ErrorKind::UnsupportedFormat
        );
    }

    #[test]
    fn kind_strings_are_snake_case() {
        assert_eq!(ErrorKind::UnreadableInput.as_str(), "unreadable_input");
        assert_eq!(ErrorKind::UnsupportedFormat.to_string(), "unsupported_format");
        let json = serde_json::to_string(&ErrorKind::EmptyDocument).unwrap();
        assert_eq!(json, "\"empty_document\"");
    }

    #[test]
    fn unsupported_format_display_mentions_declared() {
        let e = ExtractError::UnsupportedFormat {
            declared: Some("text/plain".into()),
            magic: vec![1, 2],
        };
        assert!(e.to_string().contains("text/plain"), "got: {e}");
    }

    #[test]
    fn timeout_display() {
        let e = PageError::Timeout {
            page: 3,
            strategy: "ocr".into(),
            secs: 30,
        };
        assert!(e.to_string().contains("30s"));
        assert!(e.to_string().contains("Page 3"));
        assert_eq!(e.page(), 3);
    }

    #[test]
    fn all_failed_joins_reasons() {
        let e = PageError::AllStrategiesFailed {
            page: 2,
            reasons: vec!["ocr crashed".into(), "vision 500".into()],
        };
        let msg = e.to_string();
        assert!(msg.contains("ocr crashed; vision 500"), "got: {msg}");
    }

    #[test]
    fn page_error_serialises_with_tag() {
        let e = PageError::OcrFailed {
            page: 1,
            detail: "exit 1".into(),
        };
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["kind"], "ocr_failed");
        assert_eq!(json["page"], 1);
    }
}
