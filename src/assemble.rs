//! Document assembly: per-page results → one [`DocumentResult`].
//!
//! ## Page-break marker
//!
//! Page texts are joined with [`PAGE_BREAK`], a form feed framed by
//! newlines. Normalisation turns every form feed inside page text into a
//! newline, so splitting `full_text` on the marker recovers the pages
//! exactly. The one ambiguity, a document whose every page is empty, is
//! resolved by storing `""` and letting [`split_pages`] use the page count.
//!
//! ## Confidence
//!
//! `overall_confidence` is the word-count-weighted mean of page
//! confidences, so a one-word page cannot drag down a forty-word page.
//! Failed pages have no words and therefore no weight.

use crate::output::{
    DocumentMetadata, DocumentMethod, DocumentResult, ExtractionMethod, ExtractionStats,
    PageResult, SourceKind,
};

/// Separator between page texts in [`DocumentResult::full_text`].
pub const PAGE_BREAK: &str = "\n\u{000C}\n";

/// Join page texts in page order.
pub fn assemble_text(pages: &[PageResult]) -> String {
    if pages.iter().all(|p| p.text.is_empty()) {
        return String::new();
    }
    pages
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join(PAGE_BREAK)
}

/// Inverse of [`assemble_text`].
pub fn split_pages(full_text: &str, page_count: usize) -> Vec<&str> {
    if full_text.is_empty() {
        return vec![""; page_count];
    }
    full_text.split(PAGE_BREAK).collect()
}

/// Σ(confidence · words) / Σ(words), or 0 without words.
pub fn weighted_confidence(pages: &[PageResult]) -> f32 {
    let (weighted, words) = pages.iter().fold((0f64, 0usize), |(sum, n), p| {
        let w = p.words.len();
        (sum + p.confidence as f64 * w as f64, n + w)
    });
    if words == 0 {
        0.0
    } else {
        (weighted / words as f64) as f32
    }
}

/// The single method every page used, or `Mixed`.
///
/// Failed pages count with the method of the strategy that failed last, so
/// a document whose OCR pages all crashed is still labelled `ocr`.
pub fn dominant_method(pages: &[PageResult]) -> DocumentMethod {
    let mut methods = pages.iter().map(|p| p.method);
    let Some(first) = methods.next() else {
        return DocumentMethod::Mixed;
    };
    if methods.all(|m| m == first) {
        first.into()
    } else {
        DocumentMethod::Mixed
    }
}

/// Counters over the finished pages.
pub fn stats(pages: &[PageResult], language: &str, total_duration_ms: u64) -> ExtractionStats {
    let succeeded: Vec<&PageResult> = pages.iter().filter(|p| p.is_success()).collect();
    let count = |m: ExtractionMethod| succeeded.iter().filter(|p| p.method == m).count();
    ExtractionStats {
        total_pages: pages.len(),
        succeeded_pages: succeeded.len(),
        failed_pages: pages.len() - succeeded.len(),
        direct_pages: count(ExtractionMethod::Direct),
        ocr_pages: count(ExtractionMethod::Ocr),
        vision_pages: count(ExtractionMethod::Vision),
        word_count: pages.iter().map(|p| p.words.len()).sum(),
        char_count: pages.iter().map(|p| p.text.chars().count()).sum(),
        language: language.to_string(),
        total_duration_ms,
    }
}

/// Build the document record. `pages` must be in page order.
pub fn assemble(
    pages: Vec<PageResult>,
    source: SourceKind,
    metadata: Option<DocumentMetadata>,
    language: &str,
    total_duration_ms: u64,
) -> DocumentResult {
    debug_assert!(pages.iter().enumerate().all(|(i, p)| p.page == i + 1));

    DocumentResult {
        full_text: assemble_text(&pages),
        page_count: pages.len(),
        method: dominant_method(&pages),
        overall_confidence: weighted_confidence(&pages),
        stats: stats(&pages, language, total_duration_ms),
        source,
        metadata,
        pages,
    }
}
