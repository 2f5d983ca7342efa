//! DOCX reading: paragraph text, package metadata and embedded images.
//!
//! A DOCX file is a ZIP package. The body lives in `word/document.xml`,
//! where each `<w:p>` is a paragraph and its text sits in `<w:t>` runs;
//! `<w:tab/>` and `<w:br/>` carry layout. Embedded pictures are stored under
//! `word/media/` and become page images for OCR and face location.

use super::input::Document;
use super::render::{RasterPage, RasterSource};
use crate::error::ExtractError;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{Cursor, Read};
use tracing::debug;
use zip::ZipArchive;

const DOCUMENT_PART: &str = "word/document.xml";
const APP_PART: &str = "docProps/app.xml";
const CORE_PART: &str = "docProps/core.xml";
const MEDIA_PREFIX: &str = "word/media/";

/// Everything read from a DOCX package.
#[derive(Debug, Clone)]
pub struct DocxContent {
    /// Paragraph text, one paragraph per line.
    pub text: String,
    /// `<Pages>` from `docProps/app.xml`, when present.
    pub page_count: Option<usize>,
    pub title: Option<String>,
    pub author: Option<String>,
    /// Decodable images from `word/media/`, in package order.
    pub pages: Vec<RasterPage>,
}

/// Read a DOCX document.
///
/// # Errors
/// [`ExtractError::CorruptDocx`] when the package or its document part
/// cannot be read.
pub async fn load_docx(document: &Document) -> Result<DocxContent, ExtractError> {
    let path = document.path().to_path_buf();
    let bytes = document.shared_bytes();

    tokio::task::spawn_blocking(move || {
        read_docx(&bytes).map_err(|detail| ExtractError::CorruptDocx { path, detail })
    })
    .await
    .map_err(|e| ExtractError::Internal(format!("DOCX task panicked: {}", e)))?
}

/// Blocking DOCX reader over an in-memory package.
pub fn read_docx(bytes: &[u8]) -> Result<DocxContent, String> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|e| format!("not a ZIP package: {e}"))?;

    let body = read_part(&mut archive, DOCUMENT_PART)?
        .ok_or_else(|| format!("missing {DOCUMENT_PART}"))?;
    let text = paragraph_text(&body).map_err(|e| format!("{DOCUMENT_PART}: {e}"))?;

    let page_count = read_part(&mut archive, APP_PART)
        .ok()
        .flatten()
        .and_then(|xml| element_text(&xml, b"Pages"))
        .and_then(|p| p.trim().parse().ok());

    let core = read_part(&mut archive, CORE_PART).ok().flatten();
    let title = core.as_deref().and_then(|xml| element_text(xml, b"dc:title"));
    let author = core.as_deref().and_then(|xml| element_text(xml, b"dc:creator"));

    let pages = embedded_images(&mut archive);
    debug!(
        "DOCX: {} chars of text, {} embedded images",
        text.len(),
        pages.len()
    );

    Ok(DocxContent {
        text,
        page_count,
        title,
        author,
        pages,
    })
}

fn read_part(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
    name: &str,
) -> Result<Option<String>, String> {
    let mut file = match archive.by_name(name) {
        Ok(f) => f,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(format!("{name}: {e}")),
    };
    let mut xml = String::new();
    file.read_to_string(&mut xml)
        .map_err(|e| format!("{name}: {e}"))?;
    Ok(Some(xml))
}

fn embedded_images(archive: &mut ZipArchive<Cursor<&[u8]>>) -> Vec<RasterPage> {
    let mut pages = Vec::new();
    for i in 0..archive.len() {
        let Ok(mut file) = archive.by_index(i) else {
            continue;
        };
        if file.is_dir() || !file.name().starts_with(MEDIA_PREFIX) {
            continue;
        }
        let name = file.name().to_string();
        let mut buf = Vec::new();
        if let Err(e) = file.read_to_end(&mut buf) {
            debug!("Skipping {}: {}", name, e);
            continue;
        }
        match image::load_from_memory(&buf) {
            Ok(image) => {
                let index = pages.len();
                pages.push(RasterPage {
                    index,
                    source: RasterSource::EmbeddedMedia { name },
                    image,
                });
            }
            // EMF/WMF drawings and other formats the decoders do not cover.
            Err(e) => debug!("Skipping undecodable media {}: {}", name, e),
        }
    }
    pages
}

/// Extract the text of `word/document.xml`, one paragraph per line.
///
/// Only run content (`<w:r>`) is emitted; property blocks such as the tab
/// stops in `<w:pPr><w:tabs>` are skipped. Inside `mc:AlternateContent`
/// only the `mc:Choice` branch is read.
pub fn paragraph_text(xml: &str) -> Result<String, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut out = String::new();
    let mut in_text = false;
    let mut runs = 0usize;
    let mut properties = 0usize;
    let mut fallback = 0usize;

    loop {
        let event = reader.read_event()?;
        if fallback > 0 {
            match &event {
                Event::Start(e) if e.name().as_ref() == b"mc:Fallback" => fallback += 1,
                Event::End(e) if e.name().as_ref() == b"mc:Fallback" => fallback -= 1,
                Event::Eof => break,
                _ => {}
            }
            continue;
        }
        let in_run = runs > 0 && properties == 0;

        match event {
            Event::Start(e) => match e.name().as_ref() {
                b"mc:Fallback" => fallback = 1,
                b"w:r" => runs += 1,
                name if is_properties(name) => properties += 1,
                b"w:t" if in_run => in_text = true,
                b"w:tab" if in_run => out.push('\t'),
                b"w:br" | b"w:cr" if in_run => out.push('\n'),
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"w:tab" if in_run => out.push('\t'),
                b"w:br" | b"w:cr" if in_run => out.push('\n'),
                b"w:p" => out.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_text => out.push_str(&t.unescape()?),
            Event::End(e) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:r" => runs = runs.saturating_sub(1),
                name if is_properties(name) => properties = properties.saturating_sub(1),
                b"w:p" => out.push('\n'),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(out)
}

/// `<w:pPr>`, `<w:rPr>`, `<w:sectPr>` and the other `*Pr` property blocks.
fn is_properties(name: &[u8]) -> bool {
    name.starts_with(b"w:") && name.ends_with(b"Pr")
}

/// Text content of the first `<tag>` element, trimmed; `None` when absent
/// or empty.
fn element_text(xml: &str, tag: &[u8]) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    let mut inside = false;
    let mut value = String::new();
    loop {
        match reader.read_event().ok()? {
            Event::Start(e) if e.name().as_ref() == tag => inside = true,
            Event::Text(t) if inside => value.push_str(&t.unescape().ok()?),
            Event::End(e) if e.name().as_ref() == tag => break,
            Event::Eof => break,
            _ => {}
        }
    }
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}
