//! Shared fixtures: synthetic pages, a tiny PDF writer, and scripted engines.
#![allow(dead_code)]

use async_trait::async_trait;
use image::{DynamicImage, GrayImage, Luma};
use pagescribe::pipeline::ocr::RecognizedWord;
use pagescribe::{
    BoundingBox, OcrEngine, OcrError, OcrOutput, OcrRequest, Transcription, VisionError,
    VisionTranscriber,
};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Skip the current test with a message.
#[macro_export]
macro_rules! skip_unless {
    ($cond:expr, $why:expr) => {
        if !$cond {
            println!("SKIP — {}", $why);
            return;
        }
    };
}

// ── Images ───────────────────────────────────────────────────────────────────

/// A white page with dark horizontal bars where text lines would be.
pub fn lined_page(width: u32, height: u32) -> DynamicImage {
    let mut img = GrayImage::from_pixel(width, height, Luma([255]));
    let mut y = height / 8;
    while y + 6 < height - height / 8 {
        for dy in 0..6 {
            for x in width / 10..width - width / 10 {
                img.put_pixel(x, y + dy, Luma([20]));
            }
        }
        y += 24;
    }
    DynamicImage::ImageLuma8(img)
}

pub fn blank_page(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageLuma8(GrayImage::from_pixel(width, height, Luma([255])))
}

pub fn png_bytes(img: &DynamicImage) -> Vec<u8> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .expect("png encode");
    buf
}

// ── PDF ──────────────────────────────────────────────────────────────────────

/// Write a PDF with one US-Letter page per entry. `Some(text)` draws the
/// text in Helvetica; `None` leaves the page without any text object.
pub fn pdf_with_pages(pages: &[Option<&str>]) -> Vec<u8> {
    let mut objects: Vec<String> = Vec::new();
    let kids: Vec<String> = (0..pages.len())
        .map(|i| format!("{} 0 R", 4 + 2 * i))
        .collect();

    objects.push("<< /Type /Catalog /Pages 2 0 R >>".to_string());
    objects.push(format!(
        "<< /Type /Pages /Kids [{}] /Count {} >>",
        kids.join(" "),
        pages.len()
    ));
    objects.push("<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string());

    for (i, text) in pages.iter().enumerate() {
        let content_id = 5 + 2 * i;
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Resources << /Font << /F1 3 0 R >> >> /Contents {content_id} 0 R >>"
        ));
        let stream = match text {
            Some(t) => format!("BT /F1 24 Tf 72 700 Td ({t}) Tj ET"),
            None => String::new(),
        };
        objects.push(format!(
            "<< /Length {} >>\nstream\n{}\nendstream",
            stream.len(),
            stream
        ));
    }

    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }

    let xref_at = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for off in offsets {
        out.extend_from_slice(format!("{off:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_at
        )
        .as_bytes(),
    );
    out
}

// ── Scripted OCR engine ──────────────────────────────────────────────────────

/// An OCR engine that reports a fixed set of words on one line.
pub struct ScriptedOcr {
    words: Vec<(String, f32)>,
    failure: Option<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    pages: Mutex<Vec<usize>>,
}

impl ScriptedOcr {
    fn scripted(
        words: Vec<(String, f32)>,
        failure: Option<String>,
        delay: Option<Duration>,
    ) -> Arc<Self> {
        Arc::new(Self {
            words,
            failure,
            delay,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            pages: Mutex::new(Vec::new()),
        })
    }

    pub fn reading(words: &[(&str, f32)]) -> Arc<Self> {
        let words = words.iter().map(|(t, c)| (t.to_string(), *c)).collect();
        Self::scripted(words, None, None)
    }

    pub fn failing(reason: &str) -> Arc<Self> {
        Self::scripted(Vec::new(), Some(reason.to_string()), None)
    }

    pub fn stalling(delay: Duration) -> Arc<Self> {
        Self::scripted(vec![("late".to_string(), 90.0)], None, Some(delay))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most recognitions that were ever running at the same moment.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn pages(&self) -> Vec<usize> {
        self.pages.lock().unwrap().clone()
    }
}

#[async_trait]
impl OcrEngine for ScriptedOcr {
    fn name(&self) -> &str {
        "scripted"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn availability_hint(&self) -> String {
        String::new()
    }

    async fn recognize(&self, request: OcrRequest<'_>) -> Result<OcrOutput, OcrError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.pages.lock().unwrap().push(request.page);
        assert!(request.scratch.is_dir(), "scratch dir must exist during OCR");
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if let Some(ref reason) = self.failure {
            return Err(OcrError::EngineFailed(reason.clone()));
        }
        let words = self
            .words
            .iter()
            .enumerate()
            .map(|(i, (text, conf))| RecognizedWord {
                text: text.clone(),
                confidence: *conf,
                bbox: BoundingBox {
                    x: 10 + 60 * i as u32,
                    y: 10,
                    w: 50,
                    h: 20,
                },
                block: 1,
                paragraph: 1,
                line: 1,
            })
            .collect();
        Ok(OcrOutput::from_words(words))
    }
}

// ── Scripted vision model ────────────────────────────────────────────────────

pub struct ScriptedVision {
    reply: Result<String, String>,
    calls: AtomicUsize,
    instructions: Mutex<Vec<String>>,
}

impl ScriptedVision {
    pub fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(text.to_string()),
            calls: AtomicUsize::new(0),
            instructions: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(reason: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(reason.to_string()),
            calls: AtomicUsize::new(0),
            instructions: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn instructions(&self) -> Vec<String> {
        self.instructions.lock().unwrap().clone()
    }
}

#[async_trait]
impl VisionTranscriber for ScriptedVision {
    fn name(&self) -> &str {
        "scripted-vision"
    }

    async fn transcribe(
        &self,
        _image: &DynamicImage,
        _page: usize,
        instruction: &str,
    ) -> Result<Transcription, VisionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.instructions
            .lock()
            .unwrap()
            .push(instruction.to_string());
        match &self.reply {
            Ok(text) => Ok(Transcription {
                text: text.clone(),
                ..Default::default()
            }),
            Err(reason) => Err(VisionError::Exhausted {
                retries: 3,
                detail: reason.clone(),
            }),
        }
    }
}
