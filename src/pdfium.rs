//! Locating and binding the pdfium shared library.
//!
//! pdfium is loaded dynamically at runtime. The search order is:
//!
//! 1. `PDFIUM_LIB_PATH` — either the library file itself or a directory
//!    containing it
//! 2. the current working directory (`./libpdfium.so` and friends)
//! 3. the system library search path
//!
//! Every render or text-layer call binds its own [`Pdfium`] instance inside
//! `spawn_blocking`, so no handle crosses thread boundaries.

use crate::error::ExtractError;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Bind to a pdfium library following the search order above.
pub fn bind() -> Result<Pdfium, ExtractError> {
    let bindings = match env_library_path() {
        Some(path) => {
            debug!("Binding pdfium from PDFIUM_LIB_PATH: {}", path.display());
            Pdfium::bind_to_library(&path)
        }
        None => Pdfium::bind_to_library(library_path_in(Path::new("./")))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| ExtractError::PdfiumBindingFailed(format!("{e:?}")))?;

    Ok(Pdfium::new(bindings))
}

/// `true` when a pdfium library can be bound in this process.
pub fn is_available() -> bool {
    bind().is_ok()
}

fn env_library_path() -> Option<PathBuf> {
    let raw = std::env::var("PDFIUM_LIB_PATH").ok()?;
    if raw.is_empty() {
        return None;
    }
    let path = PathBuf::from(raw);
    if path.is_dir() {
        Some(library_path_in(&path))
    } else {
        Some(path)
    }
}

/// Platform file name of the library inside `dir` (e.g. `dir/libpdfium.so`).
fn library_path_in(dir: &Path) -> PathBuf {
    Pdfium::pdfium_platform_library_name_at_path(dir)
}
