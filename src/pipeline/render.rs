//! PDF access: validation + metadata, page rasterisation, and text-layer reads.
//!
//! Every operation runs inside `spawn_blocking` and re-opens the document,
//! touching exactly one page. pdfium keeps thread-local state and is not
//! async-safe, and re-opening per page means no more than one rendered page
//! per worker is ever held in memory, whatever the page count.
//!
//! Longest-edge capping (`max_rendered_pixels`) applies on top of the DPI
//! scale so an oversized page (posters, engineering drawings) still fits in
//! bounded memory.

use crate::error::{ExtractError, PageError};
use crate::output::DocumentMetadata;
use crate::pdfium;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A single decoded or rasterised page.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub image: DynamicImage,
    /// 1-based.
    pub page: usize,
    /// Effective resolution; `None` for uploaded images of unknown DPI.
    pub dpi: Option<u32>,
}

fn load_error(err: PdfiumError, password: Option<&str>) -> ExtractError {
    let detail = format!("{err:?}");
    if detail.contains("Password") || detail.contains("password") {
        if password.is_some() {
            ExtractError::WrongPassword
        } else {
            ExtractError::PasswordRequired
        }
    } else {
        ExtractError::CorruptPdf { detail }
    }
}

/// Open the PDF once to validate it and read its metadata.
///
/// Corrupt, truncated or encrypted documents fail here, before any page
/// work starts. A document without pages is [`ExtractError::NoPages`].
pub async fn open_pdf(path: &Path, password: Option<&str>) -> Result<DocumentMetadata, ExtractError> {
    let path = path.to_path_buf();
    let pwd = password.map(str::to_string);

    tokio::task::spawn_blocking(move || open_pdf_blocking(&path, pwd.as_deref()))
        .await
        .map_err(|e| ExtractError::Internal(format!("PDF open task panicked: {e}")))?
}

fn open_pdf_blocking(path: &Path, password: Option<&str>) -> Result<DocumentMetadata, ExtractError> {
    let pdfium = pdfium::bind()?;
    let document = pdfium
        .load_pdf_from_file(path, password)
        .map_err(|e| load_error(e, password))?;

    let page_count = document.pages().len() as usize;
    if page_count == 0 {
        return Err(ExtractError::NoPages);
    }
    info!("PDF loaded: {} pages", page_count);

    let metadata = document.metadata();
    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata.get(tag).and_then(|t| {
            let v = t.value().trim().to_string();
            if v.is_empty() {
                None
            } else {
                Some(v)
            }
        })
    };

    Ok(DocumentMetadata {
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
        subject: get_meta(PdfDocumentMetadataTagType::Subject),
        creator: get_meta(PdfDocumentMetadataTagType::Creator),
        producer: get_meta(PdfDocumentMetadataTagType::Producer),
        creation_date: get_meta(PdfDocumentMetadataTagType::CreationDate),
        modification_date: get_meta(PdfDocumentMetadataTagType::ModificationDate),
        page_count,
        pdf_version: format!("{:?}", document.version()),
    })
}

/// Rasterise one page (0-based `page_index`) at `dpi`, longest edge capped
/// at `max_pixels`.
pub async fn render_page(
    path: &Path,
    password: Option<&str>,
    page_index: usize,
    dpi: u32,
    max_pixels: u32,
) -> Result<PageImage, PageError> {
    let path: PathBuf = path.to_path_buf();
    let pwd = password.map(str::to_string);
    let page = page_index + 1;

    tokio::task::spawn_blocking(move || {
        render_page_blocking(&path, pwd.as_deref(), page_index, dpi, max_pixels)
    })
    .await
    .map_err(|e| PageError::RenderFailed {
        page,
        detail: format!("render task panicked: {e}"),
    })?
}

fn render_page_blocking(
    path: &Path,
    password: Option<&str>,
    page_index: usize,
    dpi: u32,
    max_pixels: u32,
) -> Result<PageImage, PageError> {
    let page_num = page_index + 1;
    let fail = |detail: String| PageError::RenderFailed {
        page: page_num,
        detail,
    };

    let pdfium = pdfium::bind().map_err(|e| fail(e.to_string()))?;
    let document = pdfium
        .load_pdf_from_file(path, password)
        .map_err(|e| fail(format!("{e:?}")))?;
    let page = document
        .pages()
        .get(page_index as u16)
        .map_err(|e| fail(format!("{e:?}")))?;

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(dpi as f32 / 72.0)
        .set_maximum_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| fail(format!("{e:?}")))?;
    let image = bitmap.as_image();

    let width_in = page.width().value / 72.0;
    let effective_dpi = if width_in > 0.0 {
        (image.width() as f32 / width_in).round() as u32
    } else {
        dpi
    };
    debug!(
        "Rendered page {} → {}x{} px @ {} dpi",
        page_num,
        image.width(),
        image.height(),
        effective_dpi
    );

    Ok(PageImage {
        image,
        page: page_num,
        dpi: Some(effective_dpi),
    })
}

/// Read the embedded text layer of one page without rasterising it.
///
/// `Ok(None)` means the page has no text layer at all; `Ok(Some(""))` means
/// it has text objects that yield no characters.
pub async fn extract_direct(
    path: &Path,
    password: Option<&str>,
    page_index: usize,
) -> Result<Option<String>, PageError> {
    let path = path.to_path_buf();
    let pwd = password.map(str::to_string);
    let page = page_index + 1;

    tokio::task::spawn_blocking(move || extract_direct_blocking(&path, pwd.as_deref(), page_index))
        .await
        .map_err(|e| PageError::DirectFailed {
            page,
            detail: format!("text task panicked: {e}"),
        })?
}

fn extract_direct_blocking(
    path: &Path,
    password: Option<&str>,
    page_index: usize,
) -> Result<Option<String>, PageError> {
    let page_num = page_index + 1;
    let fail = |detail: String| PageError::DirectFailed {
        page: page_num,
        detail,
    };

    let pdfium = pdfium::bind().map_err(|e| fail(e.to_string()))?;
    let document = pdfium
        .load_pdf_from_file(path, password)
        .map_err(|e| fail(format!("{e:?}")))?;
    let page = document
        .pages()
        .get(page_index as u16)
        .map_err(|e| fail(format!("{e:?}")))?;

    let has_text_objects = page
        .objects()
        .iter()
        .any(|o| matches!(o.object_type(), PdfPageObjectType::Text));
    let text = page.text().map_err(|e| fail(format!("{e:?}")))?.all();

    if !has_text_objects && text.trim().is_empty() {
        debug!("Page {}: no text layer", page_num);
        return Ok(None);
    }
    debug!("Page {}: text layer has {} chars", page_num, text.chars().count());
    Ok(Some(text))
}
