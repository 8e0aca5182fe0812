//! Streaming extraction API: emit pages as they complete.
//!
//! Large scanned documents take minutes. A stream lets callers show partial
//! results immediately, drive progress bars, or persist pages incrementally
//! instead of waiting for the assembled [`crate::output::DocumentResult`].
//!
//! Pages are always yielded in page order, even with `page_concurrency > 1`;
//! the input is classified and opened before the stream is returned, so
//! fatal errors surface from the call itself rather than from the stream.
//! Temporary files live until the stream is dropped.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::extract::{build_selector, prepare, process_page};
use crate::output::PageResult;
use crate::pipeline::input::{self, RawInput};
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of page results, in page order.
pub type PageStream = Pin<Box<dyn Stream<Item = PageResult> + Send>>;

/// Extract a local file or HTTP(S) URL, streaming pages as they are ready.
///
/// # Example
/// ```rust,no_run
/// use pagescribe::{extract_stream, ExtractionConfig};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ExtractionConfig::default();
/// let mut pages = extract_stream("scan.pdf", &config).await?;
/// while let Some(page) = pages.next().await {
///     match page.error {
///         None => println!("Page {} [{}]: {}", page.page, page.method, page.text),
///         Some(e) => eprintln!("Page {}: {e}", page.page),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub async fn extract_stream(
    input: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<PageStream, ExtractError> {
    let input = input.as_ref();
    info!("Starting streaming extraction: {}", input);
    let resolved = input::resolve_input(input, config.download_timeout_secs).await?;
    extract_stream_bytes(resolved.bytes, resolved.declared.as_deref(), config).await
}

/// Streaming equivalent of [`crate::extract::extract_bytes`].
pub async fn extract_stream_bytes(
    bytes: impl Into<Vec<u8>>,
    declared: Option<&str>,
    config: &ExtractionConfig,
) -> Result<PageStream, ExtractError> {
    let raw = RawInput::new(bytes.into(), declared)?;
    let selector = Arc::new(build_selector(config)?);
    let doc = Arc::new(prepare(raw, config).await?);
    let total = doc.page_count;

    if let Some(ref cb) = config.progress_callback {
        cb.on_document_start(total);
    }

    let config = Arc::new(config.clone());
    let concurrency = config.page_concurrency.max(1);
    let s = stream::iter(1..=total)
        .map(move |page| {
            let doc = Arc::clone(&doc);
            let selector = Arc::clone(&selector);
            let config = Arc::clone(&config);
            async move { process_page(&doc, &selector, page, &config).await }
        })
        .buffered(concurrency);

    Ok(Box::pin(s))
}
