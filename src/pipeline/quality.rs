//! Is an embedded text layer worth trusting?
//!
//! Scanned PDFs often carry a text layer that is empty, whitespace, a
//! handful of stray glyphs, or mojibake from a broken font map. Those must
//! fall through to OCR; a real text layer must not.

use crate::config::DirectTextConfig;
use std::collections::HashSet;

/// Why a text layer was rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    TooShort { visible: usize, min: usize },
    LowAlphanumeric { ratio: f32, min: f32 },
    LowDiversity { distinct: usize, min: usize },
    Garbage { ratio: f32, max: f32 },
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::TooShort { visible, min } => {
                write!(f, "{visible} visible chars (< {min})")
            }
            Rejection::LowAlphanumeric { ratio, min } => {
                write!(f, "alphanumeric ratio {ratio:.2} (< {min:.2})")
            }
            Rejection::LowDiversity { distinct, min } => {
                write!(f, "{distinct} distinct chars (< {min})")
            }
            Rejection::Garbage { ratio, max } => {
                write!(f, "control/replacement ratio {ratio:.2} (> {max:.2})")
            }
        }
    }
}

/// Accept or reject a text layer.
pub fn assess(text: &str, config: &DirectTextConfig) -> Result<(), Rejection> {
    let mut visible = 0usize;
    let mut alnum = 0usize;
    let mut garbage = 0usize;
    let mut total = 0usize;
    let mut distinct = HashSet::new();

    for c in text.chars() {
        total += 1;
        if c == '\u{FFFD}' || (c.is_control() && !c.is_whitespace()) {
            garbage += 1;
            continue;
        }
        if c.is_whitespace() {
            continue;
        }
        visible += 1;
        distinct.insert(c);
        if c.is_alphanumeric() {
            alnum += 1;
        }
    }

    if visible < config.min_chars {
        return Err(Rejection::TooShort {
            visible,
            min: config.min_chars,
        });
    }

    let garbage_ratio = garbage as f32 / total as f32;
    if garbage_ratio > config.max_garbage_ratio {
        return Err(Rejection::Garbage {
            ratio: garbage_ratio,
            max: config.max_garbage_ratio,
        });
    }

    let alnum_ratio = alnum as f32 / visible as f32;
    if alnum_ratio < config.min_alnum_ratio {
        return Err(Rejection::LowAlphanumeric {
            ratio: alnum_ratio,
            min: config.min_alnum_ratio,
        });
    }

    if distinct.len() < config.min_distinct_chars {
        return Err(Rejection::LowDiversity {
            distinct: distinct.len(),
            min: config.min_distinct_chars,
        });
    }

    Ok(())
}
