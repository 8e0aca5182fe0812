//! Pipeline integration tests over image inputs.
//!
//! The OCR engine and vision model are scripted, so these run without
//! tesseract, pdfium or network access.

mod common;

use common::{blank_page, lined_page, png_bytes, ScriptedOcr, ScriptedVision};
use futures::StreamExt;
use pagescribe::{
    extract_bytes, extract_path, extract_stream_bytes, DocumentMethod, ErrorKind,
    ExtractionConfig, ExtractionMethod, ExtractionProgressCallback, OcrEnginePool, PageError,
    SourceKind, StrategyKind, VisionConfig,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn scan() -> Vec<u8> {
    png_bytes(&lined_page(400, 300))
}

#[tokio::test]
async fn scanned_image_is_read_by_ocr() {
    let ocr = ScriptedOcr::reading(&[("INVOICE", 92.0), ("TOTAL", 88.0), ("42.00", 90.0)]);
    let config = ExtractionConfig::builder()
        .ocr_engine(ocr.clone())
        .build()
        .unwrap();

    let doc = extract_bytes(scan(), Some("image/png"), &config).await.unwrap();

    assert_eq!(doc.source, SourceKind::Image);
    assert_eq!(doc.page_count, 1);
    assert_eq!(doc.pages.len(), 1);
    assert_eq!(doc.pages[0].page, 1);
    assert_eq!(doc.method, DocumentMethod::Ocr);
    assert_eq!(doc.full_text, "INVOICE TOTAL 42.00");
    assert!((doc.overall_confidence - 90.0).abs() < 1e-3);
    assert!(doc.metadata.is_none());

    let page = &doc.pages[0];
    assert!(page.is_success());
    assert_eq!(page.words.len(), 3);
    assert!(page.words.iter().all(|w| w.bbox.is_some() && w.page == 1));
    assert_eq!(page.preprocessing.first().map(String::as_str), Some("grayscale"));
    assert_eq!(ocr.calls(), 1);
}

#[tokio::test]
async fn blank_scan_is_empty_not_an_error() {
    let ocr = ScriptedOcr::reading(&[]);
    let config = ExtractionConfig::builder().ocr_engine(ocr).build().unwrap();

    let doc = extract_bytes(png_bytes(&blank_page(300, 300)), None, &config)
        .await
        .unwrap();

    let page = &doc.pages[0];
    assert!(page.is_success());
    assert_eq!(page.text, "");
    assert_eq!(page.confidence, 0.0);
    assert_eq!(doc.full_text, "");
    assert_eq!(doc.overall_confidence, 0.0);
    assert!(!doc.has_text());
}

#[tokio::test]
async fn low_confidence_words_are_flagged_not_dropped() {
    let ocr = ScriptedOcr::reading(&[("smudge", 22.0), ("ink", 71.0)]);
    let config = ExtractionConfig::builder()
        .ocr_engine(ocr)
        .confidence_floor(40.0)
        .build()
        .unwrap();

    let doc = extract_bytes(scan(), None, &config).await.unwrap();
    let words = &doc.pages[0].words;
    assert_eq!(words.len(), 2);
    assert!(words[0].low_confidence);
    assert!(!words[1].low_confidence);
    assert_eq!(doc.pages[0].method, ExtractionMethod::Ocr);
}

#[tokio::test]
async fn vision_overrides_weak_ocr() {
    let ocr = ScriptedOcr::reading(&[("Dcar", 31.0), ("Ado", 28.0)]);
    let vision = ScriptedVision::replying("Dear Ada,\nthank you for the letter.");
    let config = ExtractionConfig::builder()
        .ocr_engine(ocr.clone())
        .vision_fallback(true)
        .vision_transcriber(vision.clone())
        .build()
        .unwrap();

    let doc = extract_bytes(scan(), None, &config).await.unwrap();

    let page = &doc.pages[0];
    assert_eq!(page.method, ExtractionMethod::Vision);
    assert_eq!(page.confidence, 95.0);
    assert_eq!(page.text, "Dear Ada,\nthank you for the letter.");
    assert!(page.words.iter().all(|w| w.bbox.is_none()));
    assert_eq!(doc.method, DocumentMethod::Vision);
    assert_eq!((ocr.calls(), vision.calls()), (1, 1));
}

#[tokio::test]
async fn confident_ocr_never_calls_vision() {
    let ocr = ScriptedOcr::reading(&[("clear", 85.0), ("print", 80.0)]);
    let vision = ScriptedVision::replying("should not be used");
    let config = ExtractionConfig::builder()
        .ocr_engine(ocr)
        .vision_fallback(true)
        .vision_transcriber(vision.clone())
        .build()
        .unwrap();

    let doc = extract_bytes(scan(), None, &config).await.unwrap();
    assert_eq!(doc.method, DocumentMethod::Ocr);
    assert_eq!(vision.calls(), 0);
}

#[tokio::test]
async fn marginal_vision_gain_keeps_ocr() {
    let ocr = ScriptedOcr::reading(&[("faint", 30.0)]);
    let vision = ScriptedVision::replying("faint");
    let config = ExtractionConfig::builder()
        .ocr_engine(ocr)
        .vision(VisionConfig {
            enabled: true,
            transcriber: Some(vision.clone()),
            reported_confidence: 35.0,
            ..VisionConfig::default()
        })
        .build()
        .unwrap();

    let doc = extract_bytes(scan(), None, &config).await.unwrap();
    assert_eq!(vision.calls(), 1);
    assert_eq!(doc.pages[0].method, ExtractionMethod::Ocr);
    assert_eq!(doc.pages[0].confidence, 30.0);
}

#[tokio::test]
async fn vision_disabled_keeps_low_confidence_ocr() {
    let ocr = ScriptedOcr::reading(&[("scrawl", 12.0)]);
    let vision = ScriptedVision::replying("unused");
    let config = ExtractionConfig::builder()
        .ocr_engine(ocr)
        .vision_transcriber(vision.clone())
        .build()
        .unwrap();

    let doc = extract_bytes(scan(), None, &config).await.unwrap();
    assert_eq!(doc.pages[0].method, ExtractionMethod::Ocr);
    assert_eq!(doc.pages[0].confidence, 12.0);
    assert_eq!(vision.calls(), 0);
}

#[tokio::test]
async fn ocr_crash_is_a_page_failure() {
    let config = ExtractionConfig::builder()
        .ocr_engine(ScriptedOcr::failing("engine exited with signal 11"))
        .build()
        .unwrap();

    let doc = extract_bytes(scan(), None, &config).await.unwrap();

    let page = &doc.pages[0];
    assert!(!page.is_success());
    assert_eq!(page.method, ExtractionMethod::Ocr);
    assert_eq!(page.confidence, 0.0);
    assert!(page.text.is_empty());
    assert!(matches!(page.error, Some(PageError::OcrFailed { .. })));
    assert_eq!(doc.stats.failed_pages, 1);
    assert_eq!(doc.overall_confidence, 0.0);
    assert_eq!(doc.full_text, "");

    let json = serde_json::to_string(&doc).unwrap();
    assert!(json.contains("\"kind\":\"ocr_failed\""));
    assert!(json.contains("signal 11"));
}

#[tokio::test]
async fn exhausted_fallbacks_keep_every_reason() {
    let config = ExtractionConfig::builder()
        .ocr_engine(ScriptedOcr::failing("segfault"))
        .vision_fallback(true)
        .vision_transcriber(ScriptedVision::failing("HTTP 503"))
        .build()
        .unwrap();

    let doc = extract_bytes(scan(), None, &config).await.unwrap();
    let page = &doc.pages[0];
    assert_eq!(page.method, ExtractionMethod::Vision);
    match &page.error {
        Some(PageError::AllStrategiesFailed { page, reasons }) => {
            assert_eq!(*page, 1);
            assert_eq!(reasons.len(), 2);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn vision_only_chain_skips_ocr() {
    let ocr = ScriptedOcr::reading(&[("unused", 99.0)]);
    let vision = ScriptedVision::replying("Handwritten note");
    let config = ExtractionConfig::builder()
        .strategies(vec![StrategyKind::Vision])
        .ocr_engine(ocr.clone())
        .vision_fallback(true)
        .vision_transcriber(vision)
        .build()
        .unwrap();

    let doc = extract_bytes(scan(), None, &config).await.unwrap();
    assert_eq!(doc.method, DocumentMethod::Vision);
    assert_eq!(doc.full_text, "Handwritten note");
    assert_eq!(ocr.calls(), 0);
}

#[tokio::test]
async fn custom_instruction_is_forwarded_verbatim() {
    let instruction = "Transcribe {everything}; keep $dollar signs and  double  spaces.";
    let vision = ScriptedVision::replying("ok");
    let config = ExtractionConfig::builder()
        .strategies(vec![StrategyKind::Vision])
        .vision_fallback(true)
        .vision_transcriber(vision.clone())
        .transcription_prompt(instruction)
        .build()
        .unwrap();

    extract_bytes(scan(), None, &config).await.unwrap();
    assert_eq!(vision.instructions(), vec![instruction.to_string()]);
}

#[tokio::test]
async fn vision_output_is_normalised() {
    let vision = ScriptedVision::replying("```\r\nLine one  \r\n\r\n\r\n\r\nLine two\u{200B}\n```");
    let config = ExtractionConfig::builder()
        .strategies(vec![StrategyKind::Vision])
        .vision_fallback(true)
        .vision_transcriber(vision)
        .build()
        .unwrap();

    let doc = extract_bytes(scan(), None, &config).await.unwrap();
    assert_eq!(doc.full_text, "Line one\n\nLine two");
}

#[tokio::test]
async fn slow_ocr_times_out_per_page() {
    let config = ExtractionConfig::builder()
        .ocr_engine(ScriptedOcr::stalling(std::time::Duration::from_secs(30)))
        .page_timeout_secs(1)
        .build()
        .unwrap();

    let doc = extract_bytes(scan(), None, &config).await.unwrap();
    match &doc.pages[0].error {
        Some(PageError::Timeout { strategy, secs, .. }) => {
            assert_eq!(strategy, "ocr");
            assert_eq!(*secs, 1);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(doc.pages[0].confidence, 0.0);
}

#[tokio::test]
async fn shared_pool_bounds_ocr_across_documents() {
    let ocr = ScriptedOcr::stalling(std::time::Duration::from_millis(300));
    let config = ExtractionConfig::builder()
        .ocr_pool(OcrEnginePool::new(ocr.clone(), 1))
        .build()
        .unwrap();

    let docs = (0..3).map(|_| extract_bytes(scan(), None, &config));
    for doc in futures::future::join_all(docs).await {
        assert_eq!(doc.unwrap().full_text, "late");
    }
    assert_eq!(ocr.calls(), 3);
    assert_eq!(ocr.peak(), 1);
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
    completed: AtomicUsize,
}

impl ExtractionProgressCallback for Recorder {
    fn on_document_start(&self, total: usize) {
        self.events.lock().unwrap().push(format!("start {total}"));
    }
    fn on_page_start(&self, page: usize, _total: usize) {
        self.events.lock().unwrap().push(format!("page {page}"));
    }
    fn on_page_complete(&self, page: usize, _t: usize, method: ExtractionMethod, _c: f32) {
        self.completed.fetch_add(1, Ordering::SeqCst);
        self.events.lock().unwrap().push(format!("done {page} {method}"));
    }
    fn on_page_error(&self, page: usize, _total: usize, _error: &str) {
        self.events.lock().unwrap().push(format!("error {page}"));
    }
    fn on_document_complete(&self, total: usize, ok: usize) {
        self.events.lock().unwrap().push(format!("end {ok}/{total}"));
    }
}

#[tokio::test]
async fn progress_events_follow_the_document() {
    let recorder = Arc::new(Recorder::default());
    let config = ExtractionConfig::builder()
        .ocr_engine(ScriptedOcr::reading(&[("word", 80.0)]))
        .progress_callback(recorder.clone())
        .build()
        .unwrap();

    extract_bytes(scan(), None, &config).await.unwrap();
    assert_eq!(
        *recorder.events.lock().unwrap(),
        vec!["start 1", "page 1", "done 1 ocr", "end 1/1"]
    );
    assert_eq!(recorder.completed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stream_yields_the_page() {
    let config = ExtractionConfig::builder()
        .ocr_engine(ScriptedOcr::reading(&[("streamed", 77.0)]))
        .build()
        .unwrap();

    let stream = extract_stream_bytes(scan(), Some("scan.png"), &config)
        .await
        .unwrap();
    let pages: Vec<_> = stream.collect().await;
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].page, 1);
    assert_eq!(pages[0].text, "streamed");
}

#[tokio::test]
async fn path_input_is_sniffed_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("receipt.png");
    std::fs::write(&path, scan()).unwrap();

    let config = ExtractionConfig::builder()
        .ocr_engine(ScriptedOcr::reading(&[("receipt", 93.0)]))
        .build()
        .unwrap();
    let doc = extract_path(path.to_string_lossy(), &config).await.unwrap();
    assert_eq!(doc.source, SourceKind::Image);
    assert_eq!(doc.full_text, "receipt");
}

#[tokio::test]
async fn fatal_inputs_carry_a_kind() {
    let config = ExtractionConfig::default();

    let empty = extract_bytes(Vec::<u8>::new(), Some("image/png"), &config)
        .await
        .unwrap_err();
    assert_eq!(empty.kind(), ErrorKind::EmptyDocument);

    let truncated = extract_bytes(b"%PD".to_vec(), Some("application/pdf"), &config)
        .await
        .unwrap_err();
    assert_eq!(truncated.kind(), ErrorKind::UnreadableInput);

    let bad_image = extract_bytes(b"not really a jpeg".to_vec(), Some("image/jpeg"), &config)
        .await
        .unwrap_err();
    assert_eq!(bad_image.kind(), ErrorKind::UnreadableInput);

    let text = extract_bytes(b"plain text notes".to_vec(), Some("text/plain"), &config)
        .await
        .unwrap_err();
    assert_eq!(text.kind(), ErrorKind::UnsupportedFormat);
}

#[test]
fn invalid_config_is_rejected() {
    let err = tokio_test::assert_err!(ExtractionConfig::builder()
        .strategies(vec![StrategyKind::Ocr, StrategyKind::Ocr])
        .build());
    assert_eq!(err.kind(), ErrorKind::InvalidConfig);
}
