//! Rasterisation: turn a document into page images (and, for PDFs, read
//! the native text layer on the way).
//!
//! pdfium wraps a C++ library with thread-local state, so every pdfium call
//! runs inside `tokio::task::spawn_blocking`. Image decoding is CPU-bound and
//! goes through the same path.
//!
//! `max_rendered_pixels` caps the longest edge of PDF renders regardless of
//! the page's physical size.

use super::input::Document;
use crate::config::PageSelection;
use crate::error::ExtractError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

/// Where a page image came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RasterSource {
    /// A rendered PDF page (0-indexed).
    PdfPage { page: usize },
    /// The input file itself was an image.
    SourceImage,
    /// An image embedded in a DOCX package.
    EmbeddedMedia { name: String },
}

/// One raster image handed to OCR and face location.
#[derive(Clone)]
pub struct RasterPage {
    /// Position in the page-image list (0-indexed).
    pub index: usize,
    pub source: RasterSource,
    pub image: DynamicImage,
}

impl std::fmt::Debug for RasterPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterPage")
            .field("index", &self.index)
            .field("source", &self.source)
            .field("width", &self.image.width())
            .field("height", &self.image.height())
            .finish()
    }
}

/// Text layer and renders of the selected pages of a PDF.
#[derive(Debug, Clone)]
pub struct PdfContent {
    pub page_count: usize,
    pub title: Option<String>,
    pub author: Option<String>,
    /// `(page_index, text)` for every selected page, in page order.
    pub page_text: Vec<(usize, String)>,
    pub pages: Vec<RasterPage>,
}

/// PDF metadata without rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfInfo {
    pub page_count: usize,
    pub title: Option<String>,
    pub author: Option<String>,
}

// ── PDF ──────────────────────────────────────────────────────────────────

/// Load a PDF, read the text of the selected pages and render them.
pub async fn load_pdf(
    document: &Document,
    pages: &PageSelection,
    password: Option<&str>,
    max_pixels: u32,
) -> Result<PdfContent, ExtractError> {
    let path = document.path().to_path_buf();
    let bytes = document.shared_bytes();
    let pages = pages.clone();
    let password = password.map(str::to_string);

    tokio::task::spawn_blocking(move || {
        load_pdf_blocking(&path, bytes.to_vec(), &pages, password.as_deref(), max_pixels)
    })
    .await
    .map_err(|e| ExtractError::Internal(format!("Render task panicked: {}", e)))?
}

/// Read PDF metadata (page count, title, author) without rendering.
pub async fn pdf_info(document: &Document, password: Option<&str>) -> Result<PdfInfo, ExtractError> {
    let path = document.path().to_path_buf();
    let bytes = document.shared_bytes();
    let password = password.map(str::to_string);

    tokio::task::spawn_blocking(move || {
        let pdfium = bind_pdfium()?;
        let pdf = open_pdf(&pdfium, &path, bytes.to_vec(), password.as_deref())?;
        let (title, author) = title_author(&pdf);
        Ok(PdfInfo {
            page_count: pdf.pages().len() as usize,
            title,
            author,
        })
    })
    .await
    .map_err(|e| ExtractError::Internal(format!("Metadata task panicked: {}", e)))?
}

fn bind_pdfium() -> Result<Pdfium, ExtractError> {
    pdfium_auto::bind_pdfium_silent().map_err(|e| ExtractError::PdfiumBindingFailed(e.to_string()))
}

fn open_pdf<'a>(
    pdfium: &'a Pdfium,
    path: &Path,
    bytes: Vec<u8>,
    password: Option<&str>,
) -> Result<PdfDocument<'a>, ExtractError> {
    pdfium.load_pdf_from_byte_vec(bytes, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            if password.is_some() {
                ExtractError::WrongPassword {
                    path: path.to_path_buf(),
                }
            } else {
                ExtractError::PasswordRequired {
                    path: path.to_path_buf(),
                }
            }
        } else {
            ExtractError::CorruptPdf {
                path: path.to_path_buf(),
                detail: err_str,
            }
        }
    })
}

fn title_author(pdf: &PdfDocument<'_>) -> (Option<String>, Option<String>) {
    let metadata = pdf.metadata();
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
    (
        get_meta(PdfDocumentMetadataTagType::Title),
        get_meta(PdfDocumentMetadataTagType::Author),
    )
}

fn load_pdf_blocking(
    path: &Path,
    bytes: Vec<u8>,
    selection: &PageSelection,
    password: Option<&str>,
    max_pixels: u32,
) -> Result<PdfContent, ExtractError> {
    let pdfium = bind_pdfium()?;
    let pdf = open_pdf(&pdfium, path, bytes, password)?;
    let (title, author) = title_author(&pdf);

    let pages = pdf.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    let indices = selection.to_indices(total_pages);
    if indices.is_empty() {
        return Err(ExtractError::PageOutOfRange {
            page: first_requested_page(selection),
            total: total_pages,
        });
    }

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut page_text = Vec::with_capacity(indices.len());
    let mut rendered = Vec::with_capacity(indices.len());

    for idx in indices {
        let page = pages
            .get(idx as u16)
            .map_err(|e| ExtractError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            })?;

        let text = page
            .text()
            .map(|t| t.all())
            .map_err(|e| ExtractError::RasterisationFailed {
                page: idx + 1,
                detail: format!("text layer: {:?}", e),
            })?;
        page_text.push((idx, text));

        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            ExtractError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            }
        })?;
        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );

        let index = rendered.len();
        rendered.push(RasterPage {
            index,
            source: RasterSource::PdfPage { page: idx },
            image,
        });
    }

    Ok(PdfContent {
        page_count: total_pages,
        title,
        author,
        page_text,
        pages: rendered,
    })
}

fn first_requested_page(selection: &PageSelection) -> usize {
    match selection {
        PageSelection::All => 0,
        PageSelection::Single(p) => *p,
        PageSelection::Range(start, _) => *start,
        PageSelection::Set(pages) => pages.iter().copied().min().unwrap_or(0),
    }
}

// ── Images ───────────────────────────────────────────────────────────────

/// Decode an image document into its single page image.
pub async fn load_image(document: &Document) -> Result<RasterPage, ExtractError> {
    let path = document.path().to_path_buf();
    let bytes = document.shared_bytes();

    let image = tokio::task::spawn_blocking(move || {
        image::load_from_memory(&bytes).map_err(|e| ExtractError::InvalidImage {
            path,
            detail: e.to_string(),
        })
    })
    .await
    .map_err(|e| ExtractError::Internal(format!("Decode task panicked: {}", e)))??;

    debug!("Decoded image {}x{}", image.width(), image.height());
    Ok(RasterPage {
        index: 0,
        source: RasterSource::SourceImage,
        image,
    })
}
