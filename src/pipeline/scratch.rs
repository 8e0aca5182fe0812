//! Scoped temporary storage.
//!
//! One [`DocumentScratch`] per extraction holds the input PDF; one
//! [`PageScratch`] per page (nested inside it) holds intermediate images.
//! Both are `TempDir` guards: the directory and everything in it are removed
//! when the guard drops, on success, on error and on panic unwinding alike.

use crate::error::{ExtractError, PageError};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

#[derive(Debug)]
pub struct DocumentScratch {
    dir: TempDir,
}

impl DocumentScratch {
    pub fn new() -> Result<Self, ExtractError> {
        let dir = tempfile::Builder::new()
            .prefix("pagescribe-")
            .tempdir()
            .map_err(|e| ExtractError::Internal(format!("tempdir: {e}")))?;
        debug!("Document scratch at {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write the input bytes to `input.<ext>` and return the path.
    pub async fn write_input(&self, bytes: &[u8], ext: &str) -> Result<PathBuf, ExtractError> {
        let path = self.dir.path().join(format!("input.{ext}"));
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| ExtractError::Internal(format!("Failed to write temp file: {e}")))?;
        Ok(path)
    }

    /// A fresh private directory for one page.
    pub fn page(&self, page: usize) -> Result<PageScratch, PageError> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("page-{page}-"))
            .tempdir_in(self.dir.path())
            .map_err(|e| PageError::ScratchUnavailable {
                page,
                detail: e.to_string(),
            })?;
        Ok(PageScratch { dir })
    }
}

#[derive(Debug)]
pub struct PageScratch {
    dir: TempDir,
}

impl PageScratch {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}
