//! Format detection: classify a document as PDF, DOCX or image.
//!
//! The extension decides which format is *claimed*; the leading bytes must
//! then confirm it. Files without an extension are classified by content
//! alone. Unknown extensions are rejected before any content is read.

use crate::error::ExtractError;
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Number of leading bytes the detector needs.
pub const SNIFF_LEN: usize = 16;

const PDF_MAGIC: &[u8] = b"%PDF";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Document formats the pipeline can process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Image,
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DocumentFormat::Pdf => "PDF",
            DocumentFormat::Docx => "DOCX",
            DocumentFormat::Image => "IMAGE",
        })
    }
}

/// What the file extension says about the format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionHint {
    /// A supported extension.
    Known(DocumentFormat),
    /// The file name has no extension.
    Missing,
    /// An extension we do not handle, lowercased.
    Unsupported(String),
}

/// Classify a path by its extension (case-insensitive).
pub fn extension_hint(path: &Path) -> ExtensionHint {
    let Some(ext) = path.extension() else {
        return ExtensionHint::Missing;
    };
    let ext = ext.to_string_lossy().to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => ExtensionHint::Known(DocumentFormat::Pdf),
        "docx" => ExtensionHint::Known(DocumentFormat::Docx),
        "jpg" | "jpeg" | "png" | "tif" | "tiff" | "bmp" => {
            ExtensionHint::Known(DocumentFormat::Image)
        }
        "" => ExtensionHint::Missing,
        _ => ExtensionHint::Unsupported(ext),
    }
}

/// Reject unsupported extensions without touching the file.
pub fn check_extension(path: &Path) -> Result<(), ExtractError> {
    match extension_hint(path) {
        ExtensionHint::Unsupported(ext) => Err(ExtractError::UnsupportedFormat {
            path: path.to_path_buf(),
            reason: format!("unknown extension '.{ext}'"),
        }),
        _ => Ok(()),
    }
}

/// Identify a supported format from leading bytes alone.
pub fn sniff(head: &[u8]) -> Option<DocumentFormat> {
    if head.starts_with(PDF_MAGIC) {
        Some(DocumentFormat::Pdf)
    } else if head.starts_with(ZIP_MAGIC) {
        Some(DocumentFormat::Docx)
    } else if supported_image(head).is_some() {
        Some(DocumentFormat::Image)
    } else {
        None
    }
}

/// The raster format of `head`, if the crate can decode it.
pub fn supported_image(head: &[u8]) -> Option<ImageFormat> {
    match image::guess_format(head) {
        Ok(f @ (ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::Tiff | ImageFormat::Bmp)) => {
            Some(f)
        }
        _ => None,
    }
}

/// Detect the format of a document from its path and leading bytes.
///
/// # Errors
/// * [`ExtractError::EmptyFile`] when `head` is empty
/// * [`ExtractError::UnsupportedFormat`] for an unknown extension, an
///   extension/content mismatch, or unrecognised content
pub fn detect_format(path: &Path, head: &[u8]) -> Result<DocumentFormat, ExtractError> {
    let unsupported = |reason: String| ExtractError::UnsupportedFormat {
        path: path.to_path_buf(),
        reason,
    };

    let claimed = match extension_hint(path) {
        ExtensionHint::Unsupported(ext) => {
            return Err(unsupported(format!("unknown extension '.{ext}'")))
        }
        ExtensionHint::Known(f) => Some(f),
        ExtensionHint::Missing => None,
    };

    if head.is_empty() {
        return Err(ExtractError::EmptyFile {
            path: path.to_path_buf(),
        });
    }

    let actual = sniff(head);
    match (claimed, actual) {
        (Some(c), Some(a)) if c == a => Ok(a),
        (Some(c), Some(a)) => Err(unsupported(format!(
            "extension says {c} but content is {a}"
        ))),
        (Some(c), None) => Err(unsupported(format!(
            "extension says {c} but content is not recognised ({})",
            hex_prefix(head)
        ))),
        (None, Some(a)) => Ok(a),
        (None, None) => Err(unsupported(format!(
            "no extension and content is not recognised ({})",
            hex_prefix(head)
        ))),
    }
}

fn hex_prefix(head: &[u8]) -> String {
    head.iter()
        .take(4)
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}
