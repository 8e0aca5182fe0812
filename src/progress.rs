//! Progress-callback trait for per-page extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the pipeline works through a document.
//!
//! # Example
//!
//! ```rust
//! use pagescribe::{ExtractionConfig, ExtractionMethod, ExtractionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: Arc<AtomicUsize>,
//! }
//!
//! impl ExtractionProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, page: usize, total: usize, method: ExtractionMethod, confidence: f32) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Page {page}/{total}: {method} at {confidence:.0}");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     completed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::ExtractionMethod;
use std::sync::Arc;

/// Called by the pipeline as it processes each page.
///
/// All methods default to no-ops. With `page_concurrency > 1` the page
/// events may arrive from several tasks at once; protect shared state with
/// `Mutex` or atomics.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once the page count is known, before any page is processed.
    fn on_document_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called before the first strategy runs for a page.
    ///
    /// # Arguments
    /// * `page`        — 1-indexed page number
    /// * `total_pages` — total pages in the document
    fn on_page_start(&self, page: usize, total_pages: usize) {
        let _ = (page, total_pages);
    }

    /// Called when a page produced a result.
    ///
    /// # Arguments
    /// * `method`     — the strategy whose outcome was kept
    /// * `confidence` — page confidence, 0–100
    fn on_page_complete(
        &self,
        page: usize,
        total_pages: usize,
        method: ExtractionMethod,
        confidence: f32,
    ) {
        let _ = (page, total_pages, method, confidence);
    }

    /// Called when every applicable strategy failed for a page.
    fn on_page_error(&self, page: usize, total_pages: usize, error: &str) {
        let _ = (page, total_pages, error);
    }

    /// Called once after all pages have been attempted.
    fn on_document_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// Used when no callback is configured.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;
