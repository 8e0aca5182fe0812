//! Deterministic clean-up applied to every page's text, whatever produced it.
//!
//! Rules (applied in order):
//! 1. Strip outer code fences (vision models sometimes wrap their answer)
//! 2. Normalise line endings (CRLF / CR → LF) and map form feeds and vertical
//!    tabs to LF, which keeps the page-break marker out of page text
//! 3. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens, …)
//! 4. Trim trailing whitespace per line
//! 5. Collapse runs of blank lines down to one
//! 6. Drop leading and trailing blank lines
//!
//! Every rule is idempotent, so normalising twice changes nothing.

use once_cell::sync::Lazy;
use regex::Regex;

pub fn normalize_text(input: &str) -> String {
    let s = strip_outer_fences(input);
    let s = normalise_line_breaks(&s);
    let s = strip_invisible(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    s.trim_matches('\n').to_string()
}

// ── Rule 1: Strip outer fences ───────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[a-zA-Z]*\r?\n(.*?)\r?\n```\s*$").unwrap());

fn strip_outer_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule 2: Line breaks ──────────────────────────────────────────────────

fn normalise_line_breaks(input: &str) -> String {
    input
        .replace("\r\n", "\n")
        .replace(['\r', '\u{000C}', '\u{000B}', '\u{2028}', '\u{2029}'], "\n")
}

// ── Rule 3: Invisible characters ─────────────────────────────────────────

/// Rule 3 on its own, for single OCR words.
pub fn strip_invisible(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 4: Trailing whitespace ──────────────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .split('\n')
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Blank lines ──────────────────────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}
