//! PDF integration tests.
//!
//! These need a pdfium shared library (see `PDFIUM_LIB_PATH`) and skip
//! themselves when none can be bound. OCR is scripted.
//!
//! Run with:
//!   PDFIUM_LIB_PATH=/opt/pdfium/lib cargo test --test pdf -- --nocapture

mod common;

use common::{pdf_with_pages, ScriptedOcr};
use futures::StreamExt;
use pagescribe::{
    extract_bytes, extract_stream, inspect, DocumentMethod, ErrorKind, ExtractionConfig,
    ExtractionMethod, SourceKind, PAGE_BREAK,
};

macro_rules! needs_pdfium {
    () => {
        skip_unless!(
            pagescribe::pdfium::is_available(),
            "pdfium library not found; set PDFIUM_LIB_PATH"
        );
    };
}

#[tokio::test]
async fn text_layer_is_read_directly() {
    needs_pdfium!();
    let ocr = ScriptedOcr::reading(&[("never", 50.0)]);
    let config = ExtractionConfig::builder()
        .ocr_engine(ocr.clone())
        .build()
        .unwrap();

    let doc = extract_bytes(pdf_with_pages(&[Some("Hello World")]), None, &config)
        .await
        .unwrap();

    assert_eq!(doc.source, SourceKind::Pdf);
    assert_eq!(doc.page_count, 1);
    assert_eq!(doc.method, DocumentMethod::Direct);
    assert_eq!(doc.full_text, "Hello World");
    assert_eq!(doc.overall_confidence, 100.0);
    assert_eq!(doc.pages[0].words.len(), 2);
    assert_eq!(ocr.calls(), 0);
    assert_eq!(doc.metadata.as_ref().map(|m| m.page_count), Some(1));
}

#[tokio::test]
async fn pages_are_contiguous_and_split_back() {
    needs_pdfium!();
    let config = ExtractionConfig::builder()
        .ocr_engine(ScriptedOcr::reading(&[]))
        .build()
        .unwrap();

    let bytes = pdf_with_pages(&[Some("First page"), Some("Second page"), Some("Third page")]);
    let doc = extract_bytes(bytes, Some("report.pdf"), &config).await.unwrap();

    let numbers: Vec<usize> = doc.pages.iter().map(|p| p.page).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    assert_eq!(
        doc.full_text,
        ["First page", "Second page", "Third page"].join(PAGE_BREAK)
    );
    assert_eq!(doc.page_texts(), vec!["First page", "Second page", "Third page"]);
    assert_eq!(doc.stats.direct_pages, 3);
}

#[tokio::test]
async fn page_without_text_layer_falls_back_to_ocr() {
    needs_pdfium!();
    let ocr = ScriptedOcr::reading(&[("scanned", 84.0)]);
    let config = ExtractionConfig::builder()
        .dpi(100)
        .ocr_engine(ocr.clone())
        .build()
        .unwrap();

    let doc = extract_bytes(pdf_with_pages(&[Some("Typed cover"), None]), None, &config)
        .await
        .unwrap();

    assert_eq!(doc.pages[0].method, ExtractionMethod::Direct);
    assert_eq!(doc.pages[1].method, ExtractionMethod::Ocr);
    assert_eq!(doc.pages[1].text, "scanned");
    assert_eq!(doc.method, DocumentMethod::Mixed);
    assert_eq!(ocr.pages(), vec![2]);
}

#[tokio::test]
async fn concurrent_pages_keep_document_order() {
    needs_pdfium!();
    let config = ExtractionConfig::builder()
        .page_concurrency(3)
        .ocr_engine(ScriptedOcr::reading(&[]))
        .build()
        .unwrap();

    let texts = ["Alpha page", "Bravo page", "Charlie page", "Delta page", "Echo page"];
    let pages: Vec<Option<&str>> = texts.iter().map(|t| Some(*t)).collect();
    let doc = extract_bytes(pdf_with_pages(&pages), None, &config)
        .await
        .unwrap();

    let got: Vec<&str> = doc.pages.iter().map(|p| p.text.as_str()).collect();
    assert_eq!(got, texts);
}

#[tokio::test]
async fn corrupt_pdf_is_unreadable() {
    needs_pdfium!();
    let err = extract_bytes(
        b"%PDF-1.4\ngarbage".to_vec(),
        None,
        &ExtractionConfig::default(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnreadableInput);
}

#[tokio::test]
async fn inspect_counts_pages_without_extracting() {
    needs_pdfium!();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("three.pdf");
    std::fs::write(&path, pdf_with_pages(&[Some("a page"), None, None])).unwrap();

    let meta = inspect(path.to_string_lossy(), &ExtractionConfig::default())
        .await
        .unwrap();
    assert_eq!(meta.page_count, 3);
    assert!(meta.pdf_version.contains('1'));
}

#[tokio::test]
async fn stream_yields_pages_in_order() {
    needs_pdfium!();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("two.pdf");
    std::fs::write(&path, pdf_with_pages(&[Some("Page one"), Some("Page two")])).unwrap();

    let config = ExtractionConfig::builder()
        .page_concurrency(2)
        .ocr_engine(ScriptedOcr::reading(&[]))
        .build()
        .unwrap();
    let stream = extract_stream(path.to_string_lossy(), &config).await.unwrap();
    let pages: Vec<_> = stream.collect().await;

    assert_eq!(pages.len(), 2);
    assert_eq!((pages[0].page, pages[1].page), (1, 2));
    assert_eq!(pages[1].text, "Page two");
}
