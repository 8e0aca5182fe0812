//! Pipeline stages for document text extraction.
//!
//! Each submodule implements one stage; [`strategy`] wires them into the
//! per-page fallback chain.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ─────────────▶ strategy ──▶ normalize
//! (sniff)   (pdfium: pixels,      (direct │ ocr │ vision)
//!            text layer)               │      │
//!                                 preprocess  encode
//!                                      │      │
//!                                     ocr   vision
//! ```
//!
//! 1. [`input`]      — resolve a path or URL, classify the bytes as image or PDF
//! 2. [`render`]     — rasterise one page or read its text layer; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 3. [`quality`]    — decide whether a text layer is real text
//! 4. [`preprocess`] — grayscale, denoise, threshold, deskew before OCR
//! 5. [`ocr`]        — pooled recognition engine (tesseract by default)
//! 6. [`encode`] / [`vision`] — base64 PNG to a vision model with retry/backoff
//! 7. [`strategy`]   — ordered strategies plus the acceptance policy
//! 8. [`normalize`]  — deterministic cleanup applied to every page's text
//! 9. [`scratch`]    — per-document and per-page temporary directories

pub mod encode;
pub mod input;
pub mod normalize;
pub mod ocr;
pub mod preprocess;
pub mod quality;
pub mod render;
pub mod scratch;
pub mod strategy;
pub mod vision;
