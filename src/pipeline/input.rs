//! Document loading: read and validate the input file.
//!
//! The extension is checked before the file is opened, so an unsupported
//! document costs one `stat` and nothing else. The whole file is then read
//! into memory; identity documents are small and every backend (pdfium,
//! the ZIP reader, the image decoders) can work from a byte buffer.

use super::detect::{self, DocumentFormat};
use crate::error::ExtractError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// A loaded, format-checked input document. Immutable once built.
#[derive(Clone)]
pub struct Document {
    path: PathBuf,
    format: DocumentFormat,
    bytes: Arc<Vec<u8>>,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("path", &self.path)
            .field("format", &self.format)
            .field("size_bytes", &self.bytes.len())
            .finish()
    }
}

impl Document {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name component of the path, or the whole path when it has none.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    pub fn format(&self) -> DocumentFormat {
        self.format
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Shared handle to the raw bytes, for moving into blocking tasks.
    pub fn shared_bytes(&self) -> Arc<Vec<u8>> {
        Arc::clone(&self.bytes)
    }

    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Load a document from disk.
///
/// # Errors
/// `FileNotFound`, `PermissionDenied`, `UnsupportedFormat`, `EmptyFile`.
pub async fn load_document(path: &Path) -> Result<Document, ExtractError> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| io_error(path, e))?;
    if meta.is_dir() {
        return Err(ExtractError::UnsupportedFormat {
            path: path.to_path_buf(),
            reason: "path is a directory".into(),
        });
    }

    detect::check_extension(path)?;

    let bytes = tokio::fs::read(path).await.map_err(|e| io_error(path, e))?;
    debug!("Read {} bytes from {}", bytes.len(), path.display());
    document_from_bytes(path, bytes)
}

/// Build a document from bytes already in memory. `path` supplies the name
/// and extension used for format detection; it is never opened.
pub fn document_from_bytes(path: impl Into<PathBuf>, bytes: Vec<u8>) -> Result<Document, ExtractError> {
    let path = path.into();
    let head = &bytes[..bytes.len().min(detect::SNIFF_LEN)];
    let format = detect::detect_format(&path, head)?;
    debug!("Detected {} for {}", format, path.display());
    Ok(Document {
        path,
        format,
        bytes: Arc::new(bytes),
    })
}

fn io_error(path: &Path, e: std::io::Error) -> ExtractError {
    match e.kind() {
        ErrorKind::PermissionDenied => ExtractError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => ExtractError::FileNotFound {
            path: path.to_path_buf(),
        },
    }
}
