//! # pagescribe
//!
//! Extract searchable text from scanned documents, photos of handwriting,
//! and PDFs, with per-word confidence and page provenance.
//!
//! ## Why this crate?
//!
//! A PDF may carry an exact text layer, or only pictures of pages; an
//! upload may be a phone photo of a handwritten note. No single extraction
//! technique handles all of these well. This crate tries an ordered list of
//! strategies per page (embedded text layer, OCR, and optionally a vision
//! model) and keeps the best result, recording which one produced each page
//! and how confident it is.
//!
//! ## Pipeline Overview
//!
//! ```text
//! bytes / path / URL
//!  │
//!  ├─ 1. Detect    sniff magic bytes: image or PDF
//!  ├─ 2. Open      validate the PDF and count pages (pdfium, spawn_blocking)
//!  ├─ 3. Per page  direct text layer ─▶ OCR (preprocess + tesseract) ─▶ vision
//!  ├─ 4. Normalize deterministic text cleanup
//!  └─ 5. Assemble  page-ordered text, weighted confidence, method label
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pagescribe::{extract_path, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExtractionConfig::builder()
//!         .dpi(300)
//!         .confidence_floor(40.0)
//!         .build()?;
//!     let result = extract_path("scan.pdf", &config).await?;
//!     println!("{}", result.full_text);
//!     eprintln!(
//!         "{} pages via {} at {:.0}% confidence",
//!         result.page_count, result.method, result.overall_confidence
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Runtime requirements
//!
//! | Component | Needed for | Located via |
//! |-----------|------------|-------------|
//! | `libpdfium` | PDF inputs | `PDFIUM_LIB_PATH`, `./`, system library paths |
//! | `tesseract` | OCR strategy | `OcrConfig::binary` on `PATH` |
//! | LLM API key | vision fallback (opt-in) | `OPENAI_API_KEY`, `ANTHROPIC_API_KEY`, … |
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pagescribe` binary (clap + indicatif + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pagescribe = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod assemble;
pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod pdfium;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use assemble::{assemble, PAGE_BREAK};
pub use config::{
    DirectTextConfig, ExtractionConfig, ExtractionConfigBuilder, OcrConfig, PreprocessConfig,
    StrategyKind, VisionConfig,
};
pub use error::{ErrorKind, ExtractError, PageError};
pub use extract::{extract_bytes, extract_path, extract_sync, inspect, DocumentState};
pub use output::{
    BoundingBox, DocumentMetadata, DocumentMethod, DocumentResult, ExtractionMethod,
    ExtractionStats, PageResult, SourceKind, Word,
};
pub use pipeline::ocr::{OcrEngine, OcrEnginePool, OcrError, OcrOutput, OcrRequest, TesseractEngine};
pub use pipeline::vision::{LlmTranscriber, Transcription, VisionError, VisionTranscriber};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{extract_stream, extract_stream_bytes, PageStream};
