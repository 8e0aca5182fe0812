//! Eager (full-document) extraction entry points.
//!
//! Each document moves through a fixed set of states:
//!
//! ```text
//! Received ──▶ Detecting ──▶ Extracting(1..N) ──▶ Assembling ──▶ Completed
//!     └────────────┴──────────────┴─────────────────────┴──────▶ Failed
//! ```
//!
//! Only document-level problems (unreadable input, empty or unsupported
//! files, bad configuration) reach `Failed`. A page that cannot be read
//! becomes a zero-confidence [`PageResult`] and extraction carries on.
//!
//! Temporary files live in a per-document directory that is removed when
//! the call returns, whichever way it returns. Use
//! [`crate::stream::extract_stream`] to receive pages as they finish.

use crate::assemble;
use crate::config::{ExtractionConfig, StrategyKind};
use crate::error::ExtractError;
use crate::output::{DocumentMetadata, DocumentResult, ExtractionMethod, PageResult, SourceKind};
use crate::pipeline::input::{self, RawInput};
use crate::pipeline::ocr::{OcrEngine, OcrEnginePool, TesseractEngine};
use crate::pipeline::render::{self, PageImage};
use crate::pipeline::scratch::DocumentScratch;
use crate::pipeline::strategy::{PageContext, PageSource, Selector};
use crate::pipeline::vision::build_transcriber;
use crate::prompts::resolve_transcription_prompt;
use futures::stream::{self, StreamExt};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Where a document is in its processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentState {
    Received,
    Detecting,
    Extracting { page: usize, total: usize },
    Assembling,
    Completed,
    Failed,
}

impl fmt::Display for DocumentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentState::Received => f.write_str("received"),
            DocumentState::Detecting => f.write_str("detecting"),
            DocumentState::Extracting { page, total } => write!(f, "extracting({page}/{total})"),
            DocumentState::Assembling => f.write_str("assembling"),
            DocumentState::Completed => f.write_str("completed"),
            DocumentState::Failed => f.write_str("failed"),
        }
    }
}

fn enter(state: DocumentState) {
    debug!(state = %state, "document state");
}

/// Extract text from a document held in memory.
///
/// `declared` is the caller's MIME type or file name, if any; the bytes are
/// sniffed either way.
///
/// # Returns
/// `Ok(DocumentResult)` whenever the document could be opened, even if
/// every page failed (check [`DocumentResult::failed_pages`]).
///
/// # Errors
/// Only fatal, document-level problems; see [`ExtractError::kind`].
///
/// # Example
/// ```rust,no_run
/// use pagescribe::{extract_bytes, ExtractionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes = std::fs::read("scan.png")?;
/// let result = extract_bytes(bytes, Some("image/png"), &ExtractionConfig::default()).await?;
/// println!("{} ({:.0}%)", result.full_text, result.overall_confidence);
/// # Ok(())
/// # }
/// ```
pub async fn extract_bytes(
    bytes: impl Into<Vec<u8>>,
    declared: Option<&str>,
    config: &ExtractionConfig,
) -> Result<DocumentResult, ExtractError> {
    let start = Instant::now();
    enter(DocumentState::Received);

    match run(bytes.into(), declared, config, start).await {
        Ok(result) => {
            enter(DocumentState::Completed);
            info!(
                "Extraction complete: {}/{} pages, method {}, confidence {:.1}, {}ms",
                result.stats.succeeded_pages,
                result.page_count,
                result.method,
                result.overall_confidence,
                result.stats.total_duration_ms
            );
            Ok(result)
        }
        Err(e) => {
            enter(DocumentState::Failed);
            warn!(kind = %e.kind(), "Extraction failed: {}", e);
            Err(e)
        }
    }
}

async fn run(
    bytes: Vec<u8>,
    declared: Option<&str>,
    config: &ExtractionConfig,
    start: Instant,
) -> Result<DocumentResult, ExtractError> {
    // ── Step 1: Classify input ───────────────────────────────────────────
    enter(DocumentState::Detecting);
    let raw = RawInput::new(bytes, declared)?;

    // ── Step 2: Build strategies ─────────────────────────────────────────
    let selector = build_selector(config)?;
    debug!("Strategy order: {:?}", selector.order());

    // ── Step 3: Open document ────────────────────────────────────────────
    let doc = prepare(raw, config).await?;
    let total = doc.page_count;
    info!("Extracting {} page(s) from {:?} input", total, doc.kind);

    if let Some(ref cb) = config.progress_callback {
        cb.on_document_start(total);
    }

    // ── Step 4: Extract pages, re-joined in page order ───────────────────
    let pages: Vec<PageResult> = stream::iter(1..=total)
        .map(|page| process_page(&doc, &selector, page, config))
        .buffered(config.page_concurrency.max(1))
        .collect()
        .await;

    // ── Step 5: Assemble ─────────────────────────────────────────────────
    enter(DocumentState::Assembling);
    let succeeded = pages.iter().filter(|p| p.is_success()).count();
    if let Some(ref cb) = config.progress_callback {
        cb.on_document_complete(total, succeeded);
    }

    Ok(assemble::assemble(
        pages,
        doc.kind,
        doc.metadata.clone(),
        &config.ocr.language,
        start.elapsed().as_millis() as u64,
    ))
}

/// Extract text from a local file or HTTP(S) URL.
pub async fn extract_path(
    input: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<DocumentResult, ExtractError> {
    let input = input.as_ref();
    info!("Starting extraction: {}", input);
    let resolved = input::resolve_input(input, config.download_timeout_secs).await?;
    extract_bytes(resolved.bytes, resolved.declared.as_deref(), config).await
}

/// Synchronous wrapper around [`extract_path`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync(
    input: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<DocumentResult, ExtractError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ExtractError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract_path(input, config))
}

/// Classify a document and read its metadata without extracting any page.
///
/// Images report a single page and no PDF fields. Needs neither an OCR
/// engine nor an LLM provider.
pub async fn inspect(
    input: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<DocumentMetadata, ExtractError> {
    let resolved = input::resolve_input(input.as_ref(), config.download_timeout_secs).await?;
    let raw = RawInput::new(resolved.bytes, resolved.declared.as_deref())?;
    let doc = prepare(raw, config).await?;
    Ok(doc.metadata.unwrap_or(DocumentMetadata {
        page_count: doc.page_count,
        ..Default::default()
    }))
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// An opened document: page count known, scratch space allocated.
pub(crate) struct PreparedDocument {
    pub kind: SourceKind,
    pub page_count: usize,
    pub metadata: Option<DocumentMetadata>,
    pages: PreparedSource,
    scratch: DocumentScratch,
}

enum PreparedSource {
    Pdf(PathBuf),
    Image(Arc<PageImage>),
}

/// Decode the image, or spill the PDF to scratch and validate it.
pub(crate) async fn prepare(
    raw: RawInput,
    config: &ExtractionConfig,
) -> Result<PreparedDocument, ExtractError> {
    let scratch = DocumentScratch::new()?;
    match raw.kind() {
        SourceKind::Image => {
            let bytes = raw.into_bytes();
            let image = tokio::task::spawn_blocking(move || image::load_from_memory(&bytes))
                .await
                .map_err(|e| ExtractError::Internal(format!("Image decode task panicked: {e}")))?
                .map_err(|e| ExtractError::UndecodableImage {
                    detail: e.to_string(),
                })?;
            debug!("Decoded image {}x{}", image.width(), image.height());
            Ok(PreparedDocument {
                kind: SourceKind::Image,
                page_count: 1,
                metadata: None,
                pages: PreparedSource::Image(Arc::new(PageImage {
                    image,
                    page: 1,
                    dpi: None,
                })),
                scratch,
            })
        }
        SourceKind::Pdf => {
            let path = scratch.write_input(raw.bytes(), "pdf").await?;
            let metadata = render::open_pdf(&path, config.password.as_deref()).await?;
            Ok(PreparedDocument {
                kind: SourceKind::Pdf,
                page_count: metadata.page_count,
                metadata: Some(metadata),
                pages: PreparedSource::Pdf(path),
                scratch,
            })
        }
    }
}

/// Assemble the strategy chain for one run.
///
/// An enabled vision fallback that cannot be resolved is fatal here, before
/// any page is touched. A missing OCR engine is not: every OCR attempt will
/// fail per page, which the results report.
pub(crate) fn build_selector(config: &ExtractionConfig) -> Result<Selector, ExtractError> {
    let pool = match config.ocr_pool {
        Some(ref pool) => pool.clone(),
        None => {
            let engine: Arc<dyn OcrEngine> = match config.ocr_engine {
                Some(ref engine) => Arc::clone(engine),
                None => Arc::new(TesseractEngine::new(config.ocr.clone())),
            };
            OcrEnginePool::new(engine, config.ocr.workers)
        }
    };
    if config.strategies.contains(&StrategyKind::Ocr) {
        let engine = pool.engine();
        if engine.is_available() {
            debug!("OCR engine '{}' with {} slot(s)", engine.name(), pool.size());
        } else {
            warn!(
                "OCR engine '{}' is not available: {}",
                engine.name(),
                engine.availability_hint()
            );
        }
    }

    let transcriber = build_transcriber(&config.vision)?;
    let instruction = match transcriber {
        Some(_) => resolve_transcription_prompt(config.vision.prompt.as_deref()),
        None => String::new(),
    };

    Ok(Selector::from_config(config, pool, transcriber, instruction))
}

/// Run the selector for one page and fire its progress events.
pub(crate) async fn process_page(
    doc: &PreparedDocument,
    selector: &Selector,
    page: usize,
    config: &ExtractionConfig,
) -> PageResult {
    let total = doc.page_count;
    enter(DocumentState::Extracting { page, total });
    if let Some(ref cb) = config.progress_callback {
        cb.on_page_start(page, total);
    }

    let source = match &doc.pages {
        PreparedSource::Image(img) => PageSource::Image(Arc::clone(img)),
        PreparedSource::Pdf(path) => PageSource::Pdf {
            path: path.clone(),
            password: config.password.clone(),
            index: page - 1,
            dpi: config.dpi,
            max_pixels: config.max_rendered_pixels,
        },
    };

    let result = match doc.scratch.page(page) {
        Ok(scratch) => {
            let ctx = PageContext::new(page, source, scratch);
            selector.extract_page(&ctx).await
        }
        Err(e) => PageResult::failed(page, ExtractionMethod::Ocr, e),
    };

    if let Some(ref cb) = config.progress_callback {
        match &result.error {
            None => cb.on_page_complete(page, total, result.method, result.confidence),
            Some(e) => cb.on_page_error(page, total, &e.to_string()),
        }
    }
    debug!(
        "Page {}/{}: {} at {:.1} in {}ms",
        page, total, result.method, result.confidence, result.duration_ms
    );
    result
}
