//! OCR: the engine seam, the tesseract backend, and the bounded engine pool.
//!
//! Engines are `Send + Sync`; the pool caps how many invocations run at
//! once. Each extraction builds its own pool unless the caller shares one
//! through [`crate::config::ExtractionConfig::ocr_pool`], which is how
//! concurrent documents are held to a single process-wide limit (or
//! serialised, for an engine that must not run concurrently).

use crate::config::OcrConfig;
use crate::output::BoundingBox;
use async_trait::async_trait;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Errors from OCR engines.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR engine not available: {0}")]
    NotAvailable(String),

    #[error("OCR engine failed: {0}")]
    EngineFailed(String),

    #[error("Unparseable OCR output: {0}")]
    InvalidOutput(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One page handed to an engine.
#[derive(Debug, Clone, Copy)]
pub struct OcrRequest<'a> {
    pub image: &'a DynamicImage,
    /// 1-based page number, for logging.
    pub page: usize,
    /// Resolution the image was rendered at, when known.
    pub dpi: Option<u32>,
    /// Private directory for intermediate files; removed after the page.
    pub scratch: &'a Path,
}

/// A word as reported by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedWord {
    pub text: String,
    /// 0–100.
    pub confidence: f32,
    pub bbox: BoundingBox,
    /// Layout position used to rebuild reading order.
    pub block: u32,
    pub paragraph: u32,
    pub line: u32,
}

/// Everything an engine reports for one page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OcrOutput {
    pub text: String,
    pub words: Vec<RecognizedWord>,
}

impl OcrOutput {
    /// Build the output from words already in reading order.
    ///
    /// Words on the same line are joined by a space, lines by a newline,
    /// and blocks by a blank line.
    pub fn from_words(words: Vec<RecognizedWord>) -> Self {
        let mut text = String::new();
        let mut prev: Option<(u32, u32, u32)> = None;
        for w in &words {
            let key = (w.block, w.paragraph, w.line);
            match prev {
                None => {}
                Some(p) if p == key => text.push(' '),
                Some((block, _, _)) if block != w.block => text.push_str("\n\n"),
                Some(_) => text.push('\n'),
            }
            text.push_str(&w.text);
            prev = Some(key);
        }
        Self { text, words }
    }

    /// Mean word confidence; 0 when there are no words.
    pub fn mean_confidence(&self) -> f32 {
        if self.words.is_empty() {
            return 0.0;
        }
        self.words.iter().map(|w| w.confidence).sum::<f32>() / self.words.len() as f32
    }
}

/// A text-recognition engine.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Short identifier for logs.
    fn name(&self) -> &str;

    /// Whether the engine's dependencies are installed.
    fn is_available(&self) -> bool;

    /// What is needed to make the engine available.
    fn availability_hint(&self) -> String;

    /// Recognise text on one page image.
    async fn recognize(&self, request: OcrRequest<'_>) -> Result<OcrOutput, OcrError>;
}

// ── Tesseract ────────────────────────────────────────────────────────────

/// Tesseract via its command-line interface, TSV output.
pub struct TesseractEngine {
    config: OcrConfig,
}

impl TesseractEngine {
    pub fn new(config: OcrConfig) -> Self {
        Self { config }
    }

    fn args(&self, image_path: &Path, dpi: Option<u32>) -> Vec<String> {
        let mut args = vec![
            image_path.to_string_lossy().into_owned(),
            "stdout".to_string(),
            "-l".to_string(),
            self.config.language.clone(),
            "--psm".to_string(),
            self.config.page_segmentation_mode.to_string(),
            "--oem".to_string(),
            self.config.engine_mode.to_string(),
        ];
        if let Some(dpi) = dpi {
            args.push("--dpi".to_string());
            args.push(dpi.to_string());
        }
        for (name, value) in &self.config.extra_config {
            args.push("-c".to_string());
            args.push(format!("{name}={value}"));
        }
        args.push("tsv".to_string());
        args
    }

    fn binary(&self) -> &Path {
        &self.config.binary
    }
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::new(OcrConfig::default())
    }
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn is_available(&self) -> bool {
        which::which(self.binary()).is_ok()
    }

    fn availability_hint(&self) -> String {
        if self.is_available() {
            "Tesseract is available".to_string()
        } else {
            format!(
                "'{}' not found. Install with: apt install tesseract-ocr (or brew install tesseract)",
                self.binary().display()
            )
        }
    }

    async fn recognize(&self, request: OcrRequest<'_>) -> Result<OcrOutput, OcrError> {
        let start = Instant::now();
        let image_path: PathBuf = request.scratch.join(format!("page-{}.png", request.page));

        let image = request.image.clone();
        let write_path = image_path.clone();
        tokio::task::spawn_blocking(move || image.save_with_format(&write_path, image::ImageFormat::Png))
            .await
            .map_err(|e| OcrError::Image(format!("encode task panicked: {e}")))?
            .map_err(|e| OcrError::Image(e.to_string()))?;

        let output = Command::new(self.binary())
            .args(self.args(&image_path, request.dpi))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => OcrError::NotAvailable(self.availability_hint()),
                _ => OcrError::Io(e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::EngineFailed(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let tsv = String::from_utf8_lossy(&output.stdout);
        let result = OcrOutput::from_words(parse_tsv(&tsv)?);
        debug!(
            "Page {}: tesseract found {} words in {}ms",
            request.page,
            result.words.len(),
            start.elapsed().as_millis()
        );
        Ok(result)
    }
}

/// Parse tesseract TSV into words, in the order tesseract emitted them.
///
/// Only level-5 (word) rows with non-blank text are kept. Confidence is
/// clamped into 0–100 (tesseract reports -1 for non-word rows and can
/// exceed 100 by rounding).
pub fn parse_tsv(tsv: &str) -> Result<Vec<RecognizedWord>, OcrError> {
    let mut lines = tsv.lines();
    match lines.next() {
        Some(header) if header.starts_with("level") => {}
        Some(other) => {
            return Err(OcrError::InvalidOutput(format!(
                "missing TSV header, got '{}'",
                other.chars().take(40).collect::<String>()
            )))
        }
        None => return Ok(Vec::new()),
    }

    let mut words = Vec::new();
    for (n, line) in lines.enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let cols: Vec<&str> = line.splitn(12, '\t').collect();
        if cols.len() < 11 {
            return Err(OcrError::InvalidOutput(format!(
                "row {} has {} columns",
                n + 2,
                cols.len()
            )));
        }
        if cols[0] != "5" {
            continue;
        }
        let text = cols.get(11).map(|t| t.trim()).unwrap_or("");
        if text.is_empty() {
            continue;
        }

        let num = |i: usize| -> Result<u32, OcrError> {
            cols[i].trim().parse::<u32>().map_err(|_| {
                OcrError::InvalidOutput(format!("row {}: bad integer '{}'", n + 2, cols[i]))
            })
        };
        let confidence = cols[10]
            .trim()
            .parse::<f32>()
            .map_err(|_| OcrError::InvalidOutput(format!("row {}: bad confidence", n + 2)))?
            .clamp(0.0, 100.0);

        words.push(RecognizedWord {
            text: text.to_string(),
            confidence,
            bbox: BoundingBox {
                x: num(6)?,
                y: num(7)?,
                w: num(8)?,
                h: num(9)?,
            },
            block: num(2)?,
            paragraph: num(3)?,
            line: num(4)?,
        });
    }
    Ok(words)
}

// ── Pool ─────────────────────────────────────────────────────────────────

/// A shared engine plus a cap on concurrent invocations.
///
/// Cloning is cheap; clones share the same permits.
#[derive(Clone)]
pub struct OcrEnginePool {
    engine: Arc<dyn OcrEngine>,
    permits: Arc<Semaphore>,
    size: usize,
}

impl OcrEnginePool {
    pub fn new(engine: Arc<dyn OcrEngine>, workers: usize) -> Self {
        let size = workers.max(1);
        Self {
            engine,
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Wait for a free slot. The slot is released when the lease drops.
    pub async fn acquire(&self) -> Result<OcrLease, OcrError> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| OcrError::EngineFailed("OCR pool closed".to_string()))?;
        Ok(OcrLease {
            engine: Arc::clone(&self.engine),
            _permit: permit,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Slots free right now.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn engine(&self) -> &Arc<dyn OcrEngine> {
        &self.engine
    }
}

impl std::fmt::Debug for OcrEnginePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OcrEnginePool")
            .field("engine", &self.engine.name())
            .field("size", &self.size)
            .field("available", &self.available())
            .finish()
    }
}

/// Exclusive use of one pool slot.
pub struct OcrLease {
    engine: Arc<dyn OcrEngine>,
    _permit: OwnedSemaphorePermit,
}

impl OcrLease {
    pub async fn recognize(&self, request: OcrRequest<'_>) -> Result<OcrOutput, OcrError> {
        self.engine.recognize(request).await
    }
}
