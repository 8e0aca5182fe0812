//! Per-page strategy selection.
//!
//! A [`Selector`] holds an ordered list of [`ExtractionStrategy`] values and
//! walks it for each page, stopping at the first acceptable outcome:
//!
//! ```text
//! direct ──▶ accepted? ──yes──▶ done
//!   │ declined / failed
//!   ▼
//! ocr ─────▶ confident? ─yes──▶ done
//!   │ low confidence / failed
//!   ▼
//! vision ──▶ better by min_improvement? ──▶ replaces the OCR outcome
//! ```
//!
//! A strategy either produces a [`PageOutcome`], *declines* (not applicable:
//! no text layer, or an image input for the direct strategy), or *fails*
//! with a [`PageError`]. Declining is not a failure. Each attempt is bounded
//! by the page timeout; a timeout is a failure of that attempt only. Time
//! spent queueing for an OCR pool slot is not part of the attempt.
//!
//! Strategies share a [`PageContext`], which renders the page lazily at most
//! once, so OCR and vision see the same pixels.

use crate::config::{DirectTextConfig, ExtractionConfig, PreprocessConfig, StrategyKind};
use crate::error::PageError;
use crate::output::{ExtractionMethod, PageResult, Word};
use crate::pipeline::normalize::{normalize_text, strip_invisible};
use crate::pipeline::ocr::{OcrEnginePool, OcrLease, OcrRequest};
use crate::pipeline::preprocess::preprocess;
use crate::pipeline::quality;
use crate::pipeline::render::{self, PageImage};
use crate::pipeline::scratch::PageScratch;
use crate::pipeline::vision::{VisionError, VisionTranscriber};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// A successful strategy attempt.
#[derive(Debug, Clone)]
pub struct PageOutcome {
    pub text: String,
    pub words: Vec<Word>,
    pub method: ExtractionMethod,
    /// 0–100.
    pub confidence: f32,
    pub preprocessing: Vec<String>,
    pub preprocessing_skipped: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum StrategyError {
    /// The strategy does not apply to this page.
    Declined(String),
    /// The strategy applied and failed.
    Failed(PageError),
}

/// Where a page's pixels and text layer come from.
#[derive(Debug, Clone)]
pub enum PageSource {
    Pdf {
        path: PathBuf,
        password: Option<String>,
        /// 0-based.
        index: usize,
        dpi: u32,
        max_pixels: u32,
    },
    Image(Arc<PageImage>),
}

/// Everything a strategy may look at for one page.
pub struct PageContext {
    page: usize,
    source: PageSource,
    scratch: PageScratch,
    rendered: OnceCell<Arc<PageImage>>,
}

impl PageContext {
    pub fn new(page: usize, source: PageSource, scratch: PageScratch) -> Self {
        Self {
            page,
            source,
            scratch,
            rendered: OnceCell::new(),
        }
    }

    /// 1-based page number.
    pub fn page(&self) -> usize {
        self.page
    }

    pub fn source(&self) -> &PageSource {
        &self.source
    }

    pub fn scratch(&self) -> &Path {
        self.scratch.path()
    }

    /// The page image, rendered on first use and shared afterwards.
    pub async fn page_image(&self) -> Result<Arc<PageImage>, PageError> {
        let image = self
            .rendered
            .get_or_try_init(|| async {
                match &self.source {
                    PageSource::Image(img) => Ok(Arc::clone(img)),
                    PageSource::Pdf {
                        path,
                        password,
                        index,
                        dpi,
                        max_pixels,
                    } => render::render_page(path, password.as_deref(), *index, *dpi, *max_pixels)
                        .await
                        .map(Arc::new),
                }
            })
            .await?;
        Ok(Arc::clone(image))
    }

    /// `true` once the page has been rendered (or was an image to begin with).
    pub fn is_rendered(&self) -> bool {
        self.rendered.initialized()
    }
}

/// One named way of getting a page's text.
#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    fn method(&self) -> ExtractionMethod;

    async fn attempt(&self, ctx: &PageContext) -> Result<PageOutcome, StrategyError>;

    /// [`Self::attempt`] bounded by `limit`.
    ///
    /// Strategies that queue for a shared resource override this so the
    /// clock starts once they hold it.
    async fn attempt_within(
        &self,
        ctx: &PageContext,
        limit: Duration,
    ) -> Result<PageOutcome, StrategyError> {
        tokio::time::timeout(limit, self.attempt(ctx))
            .await
            .unwrap_or_else(|_| Err(timed_out(ctx.page(), self.kind(), limit)))
    }
}

fn timed_out(page: usize, kind: StrategyKind, limit: Duration) -> StrategyError {
    StrategyError::Failed(PageError::Timeout {
        page,
        strategy: kind.to_string(),
        secs: limit.as_secs(),
    })
}

// ── Direct ───────────────────────────────────────────────────────────────

/// Accept the PDF's own text layer when it passes the quality gate.
pub struct DirectStrategy {
    config: DirectTextConfig,
}

impl DirectStrategy {
    pub fn new(config: DirectTextConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ExtractionStrategy for DirectStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Direct
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Direct
    }

    async fn attempt(&self, ctx: &PageContext) -> Result<PageOutcome, StrategyError> {
        let PageSource::Pdf {
            path,
            password,
            index,
            ..
        } = ctx.source()
        else {
            return Err(StrategyError::Declined("image input has no text layer".into()));
        };

        let raw = render::extract_direct(path, password.as_deref(), *index)
            .await
            .map_err(StrategyError::Failed)?
            .ok_or_else(|| StrategyError::Declined("no text layer".into()))?;

        let text = normalize_text(&raw);
        quality::assess(&text, &self.config)
            .map_err(|r| StrategyError::Declined(format!("text layer rejected: {r}")))?;

        Ok(PageOutcome {
            words: Word::synthesize(&text, ctx.page(), self.config.confidence),
            text,
            method: ExtractionMethod::Direct,
            confidence: self.config.confidence,
            preprocessing: Vec::new(),
            preprocessing_skipped: Vec::new(),
        })
    }
}

// ── OCR ──────────────────────────────────────────────────────────────────

/// Render, preprocess, and run the pooled OCR engine.
pub struct OcrStrategy {
    pool: OcrEnginePool,
    preprocess: PreprocessConfig,
    confidence_floor: f32,
}

impl OcrStrategy {
    pub fn new(pool: OcrEnginePool, preprocess: PreprocessConfig, confidence_floor: f32) -> Self {
        Self {
            pool,
            preprocess,
            confidence_floor,
        }
    }
}

impl OcrStrategy {
    async fn lease(&self, page: usize) -> Result<OcrLease, StrategyError> {
        self.pool
            .acquire()
            .await
            .map_err(|e| StrategyError::Failed(PageError::OcrFailed {
                page,
                detail: e.to_string(),
            }))
    }

    /// Render, preprocess and recognise while holding `lease`.
    async fn run(&self, ctx: &PageContext, lease: &OcrLease) -> Result<PageOutcome, StrategyError> {
        let page = ctx.page();
        let fail = |detail: String| StrategyError::Failed(PageError::OcrFailed { page, detail });

        let page_image = ctx.page_image().await.map_err(StrategyError::Failed)?;

        let source = Arc::clone(&page_image);
        let cfg = self.preprocess.clone();
        let prepared = tokio::task::spawn_blocking(move || preprocess(&source.image, &cfg))
            .await
            .map_err(|e| fail(format!("preprocess task panicked: {e}")))?;

        let output = lease
            .recognize(OcrRequest {
                image: &prepared.image,
                page,
                dpi: page_image.dpi,
                scratch: ctx.scratch(),
            })
            .await
            .map_err(|e| fail(e.to_string()))?;

        let confidence = output.mean_confidence();
        let floor = self.confidence_floor;
        let words: Vec<Word> = output
            .words
            .into_iter()
            .filter_map(|w| {
                let text = strip_invisible(&w.text);
                if text.trim().is_empty() {
                    return None;
                }
                Some(Word {
                    low_confidence: w.confidence < floor,
                    text,
                    confidence: w.confidence,
                    page,
                    bbox: Some(w.bbox),
                })
            })
            .collect();

        Ok(PageOutcome {
            text: normalize_text(&output.text),
            words,
            method: ExtractionMethod::Ocr,
            confidence,
            preprocessing: prepared.applied_names(),
            preprocessing_skipped: prepared.skipped_notes(),
        })
    }
}

#[async_trait]
impl ExtractionStrategy for OcrStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Ocr
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Ocr
    }

    async fn attempt(&self, ctx: &PageContext) -> Result<PageOutcome, StrategyError> {
        let lease = self.lease(ctx.page()).await?;
        self.run(ctx, &lease).await
    }

    async fn attempt_within(
        &self,
        ctx: &PageContext,
        limit: Duration,
    ) -> Result<PageOutcome, StrategyError> {
        let lease = self.lease(ctx.page()).await?;
        tokio::time::timeout(limit, self.run(ctx, &lease))
            .await
            .unwrap_or_else(|_| Err(timed_out(ctx.page(), StrategyKind::Ocr, limit)))
    }
}

// ── Vision ───────────────────────────────────────────────────────────────

/// Transcribe the rendered page with a vision model.
pub struct VisionStrategy {
    transcriber: Arc<dyn VisionTranscriber>,
    instruction: String,
    confidence: f32,
}

impl VisionStrategy {
    pub fn new(transcriber: Arc<dyn VisionTranscriber>, instruction: String, confidence: f32) -> Self {
        Self {
            transcriber,
            instruction,
            confidence,
        }
    }
}

#[async_trait]
impl ExtractionStrategy for VisionStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Vision
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Vision
    }

    async fn attempt(&self, ctx: &PageContext) -> Result<PageOutcome, StrategyError> {
        let page = ctx.page();
        let page_image = ctx.page_image().await.map_err(StrategyError::Failed)?;

        let transcription = self
            .transcriber
            .transcribe(&page_image.image, page, &self.instruction)
            .await
            .map_err(|e| {
                let retries = match &e {
                    VisionError::Exhausted { retries, .. } => *retries,
                    VisionError::Encode(_) => 0,
                };
                StrategyError::Failed(PageError::VisionFailed {
                    page,
                    retries,
                    detail: e.to_string(),
                })
            })?;

        let text = normalize_text(&transcription.text);
        Ok(PageOutcome {
            words: Word::synthesize(&text, page, self.confidence),
            text,
            method: ExtractionMethod::Vision,
            confidence: self.confidence,
            preprocessing: Vec::new(),
            preprocessing_skipped: Vec::new(),
        })
    }
}

// ── Selector ─────────────────────────────────────────────────────────────

/// When an outcome ends the search, and when a later one replaces it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcceptancePolicy {
    /// Non-direct outcomes at or above this confidence are final.
    pub threshold: f32,
    /// Points a later outcome must gain to replace the current best.
    pub min_improvement: f32,
}

impl AcceptancePolicy {
    pub fn accepts(&self, outcome: &PageOutcome) -> bool {
        outcome.method == ExtractionMethod::Direct || outcome.confidence >= self.threshold
    }

    pub fn improves(&self, candidate: &PageOutcome, best: &PageOutcome) -> bool {
        candidate.confidence >= best.confidence + self.min_improvement
    }
}

/// Walks the ordered strategy list for each page.
pub struct Selector {
    strategies: Vec<Arc<dyn ExtractionStrategy>>,
    policy: AcceptancePolicy,
    page_timeout: Duration,
}

impl Selector {
    pub fn new(
        strategies: Vec<Arc<dyn ExtractionStrategy>>,
        policy: AcceptancePolicy,
        page_timeout: Duration,
    ) -> Self {
        Self {
            strategies,
            policy,
            page_timeout,
        }
    }

    /// Build the configured chain. The vision strategy is only included
    /// when a transcriber is supplied.
    pub fn from_config(
        config: &ExtractionConfig,
        ocr_pool: OcrEnginePool,
        transcriber: Option<Arc<dyn VisionTranscriber>>,
        instruction: String,
    ) -> Self {
        let mut strategies: Vec<Arc<dyn ExtractionStrategy>> = Vec::new();
        for kind in &config.strategies {
            match kind {
                StrategyKind::Direct => {
                    strategies.push(Arc::new(DirectStrategy::new(config.direct.clone())))
                }
                StrategyKind::Ocr => strategies.push(Arc::new(OcrStrategy::new(
                    ocr_pool.clone(),
                    config.preprocess.clone(),
                    config.ocr.confidence_floor,
                ))),
                StrategyKind::Vision => match transcriber {
                    Some(ref t) => strategies.push(Arc::new(VisionStrategy::new(
                        Arc::clone(t),
                        instruction.clone(),
                        config.vision.reported_confidence,
                    ))),
                    None => debug!("Vision strategy listed but disabled"),
                },
            }
        }
        Self::new(
            strategies,
            AcceptancePolicy {
                threshold: config.vision.threshold,
                min_improvement: config.vision.min_improvement,
            },
            Duration::from_secs(config.page_timeout_secs),
        )
    }

    /// Active strategies, in precedence order.
    pub fn order(&self) -> Vec<StrategyKind> {
        self.strategies.iter().map(|s| s.kind()).collect()
    }

    /// Produce the page's result. Never fails: when no strategy succeeds the
    /// result is empty, zero-confidence, and carries the reason.
    pub async fn extract_page(&self, ctx: &PageContext) -> PageResult {
        let start = Instant::now();
        let page = ctx.page();
        let mut best: Option<PageOutcome> = None;
        let mut failures: Vec<(ExtractionMethod, PageError)> = Vec::new();
        let mut last_method = ExtractionMethod::Ocr;

        for strategy in &self.strategies {
            if best.as_ref().is_some_and(|b| self.policy.accepts(b)) {
                break;
            }
            let kind = strategy.kind();
            last_method = strategy.method();

            match strategy.attempt_within(ctx, self.page_timeout).await {
                Err(StrategyError::Declined(reason)) => {
                    debug!("Page {}: {} declined: {}", page, kind, reason);
                }
                Err(StrategyError::Failed(err)) => {
                    warn!("Page {}: {} failed: {}", page, kind, err);
                    failures.push((strategy.method(), err));
                }
                Ok(outcome) => {
                    debug!(
                        "Page {}: {} produced {} words at {:.1}",
                        page,
                        kind,
                        outcome.words.len(),
                        outcome.confidence
                    );
                    best = match best {
                        None => Some(outcome),
                        Some(current) if self.policy.improves(&outcome, &current) => {
                            info!(
                                "Page {}: {} ({:.1}) overrides {} ({:.1})",
                                page,
                                outcome.method,
                                outcome.confidence,
                                current.method,
                                current.confidence
                            );
                            Some(outcome)
                        }
                        Some(current) => Some(current),
                    };
                }
            }
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        match best {
            Some(outcome) => PageResult {
                page,
                text: outcome.text,
                words: outcome.words,
                method: outcome.method,
                confidence: outcome.confidence,
                error: None,
                duration_ms,
                preprocessing: outcome.preprocessing,
                preprocessing_skipped: outcome.preprocessing_skipped,
            },
            None => {
                let (method, error) = match failures.len() {
                    0 => (last_method, PageError::NoStrategy { page }),
                    1 => failures.remove(0),
                    _ => {
                        let method = failures.last().map(|(m, _)| *m).unwrap_or(last_method);
                        let reasons = failures.iter().map(|(_, e)| e.to_string()).collect();
                        (method, PageError::AllStrategiesFailed { page, reasons })
                    }
                };
                let mut result = PageResult::failed(page, method, error);
                result.duration_ms = duration_ms;
                result
            }
        }
    }
}
