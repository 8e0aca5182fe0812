//! Configuration types for document text extraction.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`],
//! built via its [`ExtractionConfigBuilder`]. Engine options and the vision
//! instruction live in named, typed sub-structures ([`OcrConfig`],
//! [`PreprocessConfig`], [`VisionConfig`], [`DirectTextConfig`]) rather than
//! a string-keyed bag, so every knob has a documented default and effect.

use crate::error::ExtractError;
use crate::pipeline::ocr::{OcrEngine, OcrEnginePool};
use crate::pipeline::vision::VisionTranscriber;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// Configuration for one extraction run.
///
/// # Example
/// ```rust
/// use pagescribe::{ExtractionConfig, StrategyKind};
///
/// let config = ExtractionConfig::builder()
///     .dpi(300)
///     .strategies(vec![StrategyKind::Direct, StrategyKind::Ocr])
///     .page_concurrency(2)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Rendering DPI for rasterised PDF pages. Range: 72–600. Default: 300.
    ///
    /// Tesseract accuracy drops sharply below ~200 DPI on body text.
    pub dpi: u32,

    /// Cap on either dimension of a rendered page, in pixels. Default: 4000.
    ///
    /// Keeps a 300-DPI render of an oversized page from exhausting memory.
    pub max_rendered_pixels: u32,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Ordered strategy precedence. Default: direct, ocr, vision.
    ///
    /// `vision` is inert unless [`VisionConfig::enabled`] is set.
    pub strategies: Vec<StrategyKind>,

    /// Pages processed at the same time. Default: 1 (sequential).
    ///
    /// Results are always re-joined in page order.
    pub page_concurrency: usize,

    /// Upper bound for a single strategy attempt on a single page, in seconds. Default: 120.
    pub page_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    pub direct: DirectTextConfig,
    pub ocr: OcrConfig,
    pub preprocess: PreprocessConfig,
    pub vision: VisionConfig,

    /// Pre-constructed OCR engine. Takes precedence over the tesseract
    /// engine built from [`OcrConfig`].
    pub ocr_engine: Option<Arc<dyn OcrEngine>>,

    /// Shared OCR pool. When set, its engine and permit count are used
    /// instead of [`Self::ocr_engine`] and [`OcrConfig::workers`], so every
    /// extraction holding a clone of the same pool draws from one set of
    /// slots.
    pub ocr_pool: Option<OcrEnginePool>,

    /// Optional per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            max_rendered_pixels: 4000,
            password: None,
            strategies: StrategyKind::default_order(),
            page_concurrency: 1,
            page_timeout_secs: 120,
            download_timeout_secs: 120,
            direct: DirectTextConfig::default(),
            ocr: OcrConfig::default(),
            preprocess: PreprocessConfig::default(),
            vision: VisionConfig::default(),
            ocr_engine: None,
            ocr_pool: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("strategies", &self.strategies)
            .field("page_concurrency", &self.page_concurrency)
            .field("page_timeout_secs", &self.page_timeout_secs)
            .field("direct", &self.direct)
            .field("ocr", &self.ocr)
            .field("preprocess", &self.preprocess)
            .field("vision", &self.vision)
            .field("ocr_engine", &self.ocr_engine.as_ref().map(|_| "<dyn OcrEngine>"))
            .field("ocr_pool", &self.ocr_pool)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn strategies(mut self, strategies: Vec<StrategyKind>) -> Self {
        self.config.strategies = strategies;
        self
    }

    pub fn page_concurrency(mut self, n: usize) -> Self {
        self.config.page_concurrency = n.max(1);
        self
    }

    pub fn page_timeout_secs(mut self, secs: u64) -> Self {
        self.config.page_timeout_secs = secs.max(1);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn direct(mut self, direct: DirectTextConfig) -> Self {
        self.config.direct = direct;
        self
    }

    pub fn ocr(mut self, ocr: OcrConfig) -> Self {
        self.config.ocr = ocr;
        self
    }

    pub fn confidence_floor(mut self, floor: f32) -> Self {
        self.config.ocr.confidence_floor = floor.clamp(0.0, 100.0);
        self
    }

    pub fn ocr_language(mut self, language: impl Into<String>) -> Self {
        self.config.ocr.language = language.into();
        self
    }

    pub fn ocr_workers(mut self, n: usize) -> Self {
        self.config.ocr.workers = n.max(1);
        self
    }

    pub fn ocr_engine(mut self, engine: Arc<dyn OcrEngine>) -> Self {
        self.config.ocr_engine = Some(engine);
        self
    }

    /// Share one OCR pool across extractions. See [`ExtractionConfig::ocr_pool`].
    pub fn ocr_pool(mut self, pool: OcrEnginePool) -> Self {
        self.config.ocr_pool = Some(pool);
        self
    }

    pub fn preprocess(mut self, preprocess: PreprocessConfig) -> Self {
        self.config.preprocess = preprocess;
        self
    }

    pub fn vision(mut self, vision: VisionConfig) -> Self {
        self.config.vision = vision;
        self
    }

    /// Enable the vision fallback.
    pub fn vision_fallback(mut self, enabled: bool) -> Self {
        self.config.vision.enabled = enabled;
        self
    }

    pub fn vision_threshold(mut self, threshold: f32) -> Self {
        self.config.vision.threshold = threshold.clamp(0.0, 100.0);
        self
    }

    /// Free-form instruction forwarded verbatim to the vision model.
    pub fn transcription_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.vision.prompt = Some(prompt.into());
        self
    }

    pub fn vision_transcriber(mut self, transcriber: Arc<dyn VisionTranscriber>) -> Self {
        self.config.vision.transcriber = Some(transcriber);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 600 {
            return Err(ExtractError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if c.strategies.is_empty() {
            return Err(ExtractError::InvalidConfig(
                "At least one extraction strategy is required".into(),
            ));
        }
        let mut seen = Vec::with_capacity(c.strategies.len());
        for s in &c.strategies {
            if seen.contains(s) {
                return Err(ExtractError::InvalidConfig(format!(
                    "Strategy '{}' listed more than once",
                    s
                )));
            }
            seen.push(*s);
        }
        if c.page_concurrency == 0 || c.ocr.workers == 0 {
            return Err(ExtractError::InvalidConfig(
                "Concurrency and OCR workers must be ≥ 1".into(),
            ));
        }
        if !(0.0..=100.0).contains(&c.vision.reported_confidence) {
            return Err(ExtractError::InvalidConfig(format!(
                "Vision confidence must be 0–100, got {}",
                c.vision.reported_confidence
            )));
        }
        if c.ocr.page_segmentation_mode > 13 {
            return Err(ExtractError::InvalidConfig(format!(
                "Tesseract page segmentation mode must be 0–13, got {}",
                c.ocr.page_segmentation_mode
            )));
        }
        Ok(self.config)
    }
}

// ── Strategy order ───────────────────────────────────────────────────────

/// One named extraction strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Embedded PDF text layer (PDF inputs only).
    Direct,
    /// Render, preprocess and OCR.
    Ocr,
    /// Vision-model transcription.
    Vision,
}

impl StrategyKind {
    pub fn default_order() -> Vec<StrategyKind> {
        vec![StrategyKind::Direct, StrategyKind::Ocr, StrategyKind::Vision]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Direct => "direct",
            StrategyKind::Ocr => "ocr",
            StrategyKind::Vision => "vision",
        }
    }

    /// Parse a comma-separated list such as `"direct,ocr"`.
    pub fn parse_list(s: &str) -> Result<Vec<StrategyKind>, ExtractError> {
        s.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(StrategyKind::from_str)
            .collect()
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "direct" | "text" => Ok(StrategyKind::Direct),
            "ocr" | "tesseract" => Ok(StrategyKind::Ocr),
            "vision" | "vlm" => Ok(StrategyKind::Vision),
            other => Err(ExtractError::InvalidConfig(format!(
                "Unknown strategy '{other}' (expected direct, ocr or vision)"
            ))),
        }
    }
}

// ── Direct text layer ────────────────────────────────────────────────────

/// Quality gate for accepting an embedded text layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectTextConfig {
    /// Minimum visible (non-whitespace, non-control) characters. Default: 4.
    pub min_chars: usize,
    /// Minimum share of alphanumerics among visible characters. Default: 0.5.
    pub min_alnum_ratio: f32,
    /// Minimum number of distinct visible characters. Default: 3.
    pub min_distinct_chars: usize,
    /// Maximum share of control / replacement characters. Default: 0.1.
    pub max_garbage_ratio: f32,
    /// Confidence assigned to accepted direct text. Default: 100.
    pub confidence: f32,
}

impl Default for DirectTextConfig {
    fn default() -> Self {
        Self {
            min_chars: 4,
            min_alnum_ratio: 0.5,
            min_distinct_chars: 3,
            max_garbage_ratio: 0.1,
            confidence: 100.0,
        }
    }
}

// ── OCR ──────────────────────────────────────────────────────────────────

/// Tesseract engine options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    /// Tesseract executable. Default: `tesseract` (resolved on `PATH`).
    pub binary: PathBuf,
    /// Language pack(s), e.g. `eng` or `eng+deu`. Default: `eng`.
    pub language: String,
    /// `--psm` page segmentation mode. Default: 3 (fully automatic).
    pub page_segmentation_mode: u8,
    /// `--oem` engine mode. Default: 1 (LSTM only).
    pub engine_mode: u8,
    /// Words below this confidence are flagged `low_confidence` (never dropped). Default: 40.
    pub confidence_floor: f32,
    /// Concurrent engine invocations allowed. Default: available CPUs.
    pub workers: usize,
    /// Additional `-c name=value` tesseract variables, passed in order.
    pub extra_config: Vec<(String, String)>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("tesseract"),
            language: "eng".to_string(),
            page_segmentation_mode: 3,
            engine_mode: 1,
            confidence_floor: 40.0,
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2),
            extra_config: Vec::new(),
        }
    }
}

// ── Preprocessing ────────────────────────────────────────────────────────

/// Image clean-up applied before OCR. Each step can be toggled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// Master switch. When off the page is only converted to grayscale. Default: true.
    pub enabled: bool,
    /// Median-filter denoising. Default: true.
    pub denoise: bool,
    /// Median filter radius in pixels. Default: 1.
    pub median_radius: u32,
    /// Adaptive (local mean) thresholding. Default: true.
    pub threshold: bool,
    /// Threshold window radius; 0 picks one from the page size. Default: 0.
    pub threshold_block_radius: u32,
    /// Skew detection and correction. Default: true.
    pub deskew: bool,
    /// Largest skew searched, in degrees either way. Default: 5.
    pub max_skew_degrees: f32,
    /// Angle search step in degrees. Default: 0.25.
    pub skew_step_degrees: f32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            denoise: true,
            median_radius: 1,
            threshold: true,
            threshold_block_radius: 0,
            deskew: true,
            max_skew_degrees: 5.0,
            skew_step_degrees: 0.25,
        }
    }
}

// ── Vision fallback ──────────────────────────────────────────────────────

/// Vision-model transcription options.
#[derive(Clone)]
pub struct VisionConfig {
    /// Allow the vision strategy to run. Default: false.
    pub enabled: bool,

    /// Outcomes below this confidence are not final; later strategies
    /// (vision) get a chance. Default: 60.
    pub threshold: f32,

    /// A later outcome replaces the current best only when it is at least
    /// this many points more confident. Default: 10.
    pub min_improvement: f32,

    /// Confidence attributed to a vision transcription. Default: 95.
    pub reported_confidence: f32,

    /// Transcription instruction, forwarded verbatim. If None, uses
    /// [`crate::prompts::resolve_transcription_prompt`].
    pub prompt: Option<String>,

    /// Model identifier, e.g. "gpt-4o". If None, uses the provider default.
    pub model: Option<String>,

    /// Provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Pre-constructed transcriber. Takes precedence over every provider field.
    pub transcriber: Option<Arc<dyn VisionTranscriber>>,

    /// Sampling temperature. Default: 0.0.
    pub temperature: f32,

    /// Maximum tokens generated per page. Default: 4000.
    pub max_tokens: usize,

    /// Retries on a failed vision call. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: 60.0,
            min_improvement: 10.0,
            reported_confidence: 95.0,
            prompt: None,
            model: None,
            provider_name: None,
            provider: None,
            transcriber: None,
            temperature: 0.0,
            max_tokens: 4000,
            max_retries: 3,
            retry_backoff_ms: 500,
        }
    }
}

impl fmt::Debug for VisionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisionConfig")
            .field("enabled", &self.enabled)
            .field("threshold", &self.threshold)
            .field("min_improvement", &self.min_improvement)
            .field("reported_confidence", &self.reported_confidence)
            .field("prompt", &self.prompt.as_ref().map(|p| format!("<{} chars>", p.len())))
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field(
                "transcriber",
                &self.transcriber.as_ref().map(|_| "<dyn VisionTranscriber>"),
            )
            .field("max_retries", &self.max_retries)
            .finish()
    }
}
