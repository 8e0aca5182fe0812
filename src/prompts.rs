//! Transcription instructions for the vision fallback.
//!
//! The instruction is resolved in this order:
//!
//! 1. [`crate::config::VisionConfig::prompt`] — the caller's free-form text,
//!    forwarded verbatim
//! 2. `PAGESCRIBE_TRANSCRIPTION_PROMPT` — the instruction itself
//! 3. `PAGESCRIBE_TRANSCRIPTION_PROMPT_FILE` — a file holding it
//! 4. [`DEFAULT_TRANSCRIPTION_PROMPT`]
//!
//! The pipeline never interprets the instruction; it is whatever the model
//! should be told to do with the page image.

use tracing::{info, warn};

pub const PROMPT_ENV: &str = "PAGESCRIBE_TRANSCRIPTION_PROMPT";
pub const PROMPT_FILE_ENV: &str = "PAGESCRIBE_TRANSCRIPTION_PROMPT_FILE";

/// Default instruction: verbatim plain-text transcription.
pub const DEFAULT_TRANSCRIPTION_PROMPT: &str = r#"You are a careful transcriber of scanned and handwritten documents.

Transcribe ALL text visible in the page image, exactly as written.

Rules:
1. Preserve the reading order a human would use: top to bottom, left to right,
   column by column for multi-column layouts.
2. Keep line breaks where the page has them; separate paragraphs and blocks
   with a single blank line.
3. Do not correct spelling, grammar or wording. Reproduce numbers, dates,
   names and punctuation exactly.
4. For a character you cannot read, use your best guess from context; for a
   word you cannot read at all, write [illegible].
5. Output ONLY the transcribed text: no commentary, no summary, no Markdown
   formatting, no code fences.
6. If the page contains no text, output nothing."#;

/// Resolve the instruction for one extraction run.
pub fn resolve_transcription_prompt(custom: Option<&str>) -> String {
    if let Some(custom) = custom {
        return custom.to_string();
    }

    if let Ok(env_prompt) = std::env::var(PROMPT_ENV) {
        if !env_prompt.trim().is_empty() {
            info!("Loaded transcription prompt from {PROMPT_ENV}");
            return env_prompt;
        }
    }

    if let Ok(file) = std::env::var(PROMPT_FILE_ENV) {
        if !file.is_empty() {
            match std::fs::read_to_string(&file) {
                Ok(text) if !text.trim().is_empty() => {
                    info!("Loaded transcription prompt from file: {file}");
                    return text.trim().to_string();
                }
                Ok(_) => warn!("Transcription prompt file {file} is empty, using default"),
                Err(e) => warn!("Could not read transcription prompt file {file}: {e}"),
            }
        }
    }

    DEFAULT_TRANSCRIPTION_PROMPT.to_string()
}
