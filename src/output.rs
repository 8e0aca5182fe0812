//! Output types produced by the extraction pipeline.
//!
//! [`DocumentResult`] is the only artefact handed to callers. It is built
//! once by [`crate::assemble::assemble`] and never mutated by the pipeline
//! afterwards; persistence and any derived fields belong to the caller.

use crate::error::PageError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Axis-aligned word box in pixels of the rendered page image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// A single recognised word.
///
/// OCR words carry a bounding box and the engine's confidence. Direct and
/// vision words are synthesised from whitespace-split text with the
/// method's fixed confidence and no box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub text: String,
    /// Confidence on the 0–100 scale.
    pub confidence: f32,
    /// 1-based page number.
    pub page: usize,
    pub bbox: Option<BoundingBox>,
    /// `true` when `confidence` is below the configured OCR floor. The word
    /// is kept either way.
    pub low_confidence: bool,
}

impl Word {
    /// Split `text` on whitespace into box-less words with a fixed confidence.
    pub fn synthesize(text: &str, page: usize, confidence: f32) -> Vec<Word> {
        text.split_whitespace()
            .map(|w| Word {
                text: w.to_string(),
                confidence,
                page,
                bbox: None,
                low_confidence: false,
            })
            .collect()
    }
}

/// How a page's text was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    /// Embedded PDF text layer.
    Direct,
    /// Optical character recognition on the rendered page.
    Ocr,
    /// Vision-model transcription.
    Vision,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::Direct => "direct",
            ExtractionMethod::Ocr => "ocr",
            ExtractionMethod::Vision => "vision",
        }
    }
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Document-level method label: the single method used by every page, or `Mixed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentMethod {
    Direct,
    Ocr,
    Vision,
    Mixed,
}

impl DocumentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentMethod::Direct => "direct",
            DocumentMethod::Ocr => "ocr",
            DocumentMethod::Vision => "vision",
            DocumentMethod::Mixed => "mixed",
        }
    }
}

impl From<ExtractionMethod> for DocumentMethod {
    fn from(m: ExtractionMethod) -> Self {
        match m {
            ExtractionMethod::Direct => DocumentMethod::Direct,
            ExtractionMethod::Ocr => DocumentMethod::Ocr,
            ExtractionMethod::Vision => DocumentMethod::Vision,
        }
    }
}

impl fmt::Display for DocumentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The detected kind of the raw input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Image,
    Pdf,
}

/// Result for a single page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    /// 1-based page number.
    pub page: usize,
    pub text: String,
    pub words: Vec<Word>,
    pub method: ExtractionMethod,
    /// Page confidence on the 0–100 scale; 0 for failed pages.
    pub confidence: f32,
    /// Why the page failed, if it did. `text` is empty in that case.
    pub error: Option<PageError>,
    /// Wall-clock time spent on this page.
    pub duration_ms: u64,
    /// Names of the preprocessing steps applied before OCR.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preprocessing: Vec<String>,
    /// Preprocessing steps left out, as `step: reason`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preprocessing_skipped: Vec<String>,
}

impl PageResult {
    /// A zero-confidence empty page carrying its failure reason.
    pub fn failed(page: usize, method: ExtractionMethod, error: PageError) -> Self {
        Self {
            page,
            text: String::new(),
            words: Vec::new(),
            method,
            confidence: 0.0,
            error: Some(error),
            duration_ms: 0,
            preprocessing: Vec::new(),
            preprocessing_skipped: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// PDF metadata, read without rendering any page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub modification_date: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
}

/// Aggregate counters for one extraction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub total_pages: usize,
    pub succeeded_pages: usize,
    pub failed_pages: usize,
    pub direct_pages: usize,
    pub ocr_pages: usize,
    pub vision_pages: usize,
    pub word_count: usize,
    pub char_count: usize,
    /// OCR language code the document was processed with.
    pub language: String,
    pub total_duration_ms: u64,
}

/// The pipeline's sole externally visible artefact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentResult {
    /// Page texts joined by [`crate::assemble::PAGE_BREAK`], in page order.
    pub full_text: String,
    pub pages: Vec<PageResult>,
    pub page_count: usize,
    pub method: DocumentMethod,
    /// Word-count-weighted mean of page confidences (0–100).
    pub overall_confidence: f32,
    pub source: SourceKind,
    pub metadata: Option<DocumentMetadata>,
    pub stats: ExtractionStats,
}

impl DocumentResult {
    /// Re-split `full_text` into per-page texts.
    pub fn page_texts(&self) -> Vec<&str> {
        crate::assemble::split_pages(&self.full_text, self.page_count)
    }

    /// Pages that failed, in page order.
    pub fn failed_pages(&self) -> impl Iterator<Item = &PageResult> {
        self.pages.iter().filter(|p| !p.is_success())
    }

    /// `true` when at least one page produced text.
    pub fn has_text(&self) -> bool {
        !self.full_text.is_empty()
    }
}
