//! Text extraction: native text first, OCR when there is not enough of it.
//!
//! Native text (PDF text layer, DOCX paragraphs) is normalised and kept.
//! OCR runs over every page image when the document is an image or the
//! native text has fewer than `min_native_chars` non-whitespace characters.
//! OCR output is stored exactly as the engine returned it.

use super::detect::DocumentFormat;
use super::normalize::{non_whitespace_chars, normalize_text};
use super::render::RasterPage;
use crate::engine::OcrEngine;
use crate::error::{ExtractError, StageError};
use crate::output::{ExtractedText, TextBlock, TextSource};
use std::path::Path;
use tracing::{debug, info, warn};

/// Result of the text stage.
#[derive(Debug, Clone)]
pub struct TextOutcome {
    pub text: ExtractedText,
    pub warnings: Vec<StageError>,
    /// Page images sent to OCR.
    pub ocr_pages: usize,
}

/// Native blocks from per-page PDF text. Pages with no text are dropped.
pub fn pdf_native_blocks(page_text: &[(usize, String)]) -> Vec<TextBlock> {
    page_text
        .iter()
        .filter_map(|(page, raw)| native_block(Some(*page), raw))
        .collect()
}

/// The native block for a whole-document body such as DOCX paragraphs.
pub fn body_native_blocks(raw: &str) -> Vec<TextBlock> {
    native_block(None, raw).into_iter().collect()
}

fn native_block(page: Option<usize>, raw: &str) -> Option<TextBlock> {
    let text = normalize_text(raw);
    (non_whitespace_chars(&text) > 0).then_some(TextBlock {
        source: TextSource::Native,
        page,
        text,
    })
}

/// Whether OCR should run for this document.
pub fn needs_ocr(format: DocumentFormat, native: &[TextBlock], min_native_chars: usize) -> bool {
    if format == DocumentFormat::Image {
        return true;
    }
    let chars: usize = native.iter().map(|b| non_whitespace_chars(&b.text)).sum();
    chars < min_native_chars.max(1)
}

/// Produce the document's text.
///
/// # Errors
/// [`ExtractError::ExtractionFailed`] when neither native text nor OCR
/// produced any non-whitespace text.
pub async fn extract_text(
    path: &Path,
    format: DocumentFormat,
    native: Vec<TextBlock>,
    pages: &[RasterPage],
    ocr: &dyn OcrEngine,
    min_native_chars: usize,
) -> Result<TextOutcome, ExtractError> {
    let mut blocks = native;
    let mut warnings = Vec::new();
    let mut ocr_pages = 0;

    if needs_ocr(format, &blocks, min_native_chars) {
        info!(
            "Running OCR ({}) on {} page image(s)",
            ocr.name(),
            pages.len()
        );
        for page in pages {
            ocr_pages += 1;
            match ocr.recognize(&page.image).await {
                Ok(text) if text.trim().is_empty() => {
                    debug!("OCR found no text on image {}", page.index + 1);
                }
                Ok(text) => blocks.push(TextBlock {
                    source: TextSource::Ocr,
                    page: Some(page.index),
                    text,
                }),
                Err(e) => {
                    warn!("OCR failed on image {}: {}", page.index + 1, e);
                    warnings.push(StageError::OcrFailed {
                        page: Some(page.index),
                        detail: e.to_string(),
                    });
                }
            }
        }
    } else {
        debug!("Native text present; OCR skipped");
    }

    let text = ExtractedText::from_blocks(blocks);
    if text.is_empty() {
        let detail = if pages.is_empty() && format != DocumentFormat::Image {
            "no text layer and no images to OCR".to_string()
        } else {
            match warnings.first() {
                Some(w) => format!("no native text; {w}"),
                None => "no native text and OCR found none".to_string(),
            }
        };
        return Err(ExtractError::ExtractionFailed {
            path: path.to_path_buf(),
            detail,
        });
    }

    Ok(TextOutcome {
        text,
        warnings,
        ocr_pages,
    })
}
