//! Error types for the edgequake-idextract library.
//!
//! Three error types cover three distinct failure modes:
//!
//! * [`ExtractError`] — **Fatal**: the run cannot produce a result at all
//!   (missing file, unsupported format, no text obtainable). Returned as
//!   `Err(ExtractError)` from the top-level `extract*` functions.
//!
//! * [`StageError`] — **Non-fatal**: a best-effort stage degraded (the model
//!   reply was unusable, the face detector crashed). Stored in
//!   [`crate::output::ExtractionResult::warnings`]; the affected fields are
//!   null or empty.
//!
//! * [`EngineError`] — a collaborator (OCR engine, face detector, hosted
//!   model) failed. Stages translate it into one of the two above.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-idextract library.
///
/// Degraded stages use [`StageError`] and are stored in
/// [`crate::output::ExtractionResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Document not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists but has no content.
    #[error("Document '{path}' is empty")]
    EmptyFile { path: PathBuf },

    /// Extension or content matches none of PDF, DOCX or a supported image.
    #[error("Unsupported document format for '{path}': {reason}\nSupported: .pdf, .docx, .jpg, .jpeg, .png, .tif, .tiff, .bmp")]
    UnsupportedFormat { path: PathBuf, reason: String },

    // ── Document errors ───────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}\nTry repairing with: qpdf --decrypt input.pdf output.pdf")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// The DOCX container or its `word/document.xml` part is unreadable.
    #[error("DOCX '{path}' is corrupt: {detail}")]
    CorruptDocx { path: PathBuf, detail: String },

    /// The image file could not be decoded.
    #[error("Image '{path}' could not be decoded: {detail}")]
    InvalidImage { path: PathBuf, detail: String },

    /// Selected page numbers exceed the actual page count.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Neither the native text layer nor OCR produced any text.
    #[error("No text could be extracted from '{path}': {detail}")]
    ExtractionFailed { path: PathBuf, detail: String },

    // ── Model errors ──────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The run completed but at least one stage degraded.
    ///
    /// Returned by [`crate::output::ExtractionResult::into_strict`] when the
    /// caller wants to treat any degraded stage as an error.
    #[error("{count} stage warning(s) during extraction\nFirst: {first}")]
    Degraded { count: usize, first: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
PDFium is normally downloaded automatically on first run.\n\
If the auto-download failed, you can:\n\
  • Check your internet connection and try again.\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single stage.
///
/// Stored in [`crate::output::ExtractionResult::warnings`]. The run still
/// produces a result; the affected part is null or empty.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageError {
    /// The hosted model call failed or its reply could not be parsed.
    #[error("Analysis failed: {detail}")]
    AnalysisFailed { detail: String },

    /// A single field in the model reply had an unusable value.
    #[error("Field '{field}' rejected: {detail}")]
    FieldRejected { field: String, detail: String },

    /// The vision fallback analysis failed.
    #[error("Vision fallback failed: {detail}")]
    VisionFallbackFailed { detail: String },

    /// The face detector failed; counted as zero faces.
    #[error("Face detection failed{}: {detail}", page_suffix(.page))]
    FaceDetectionFailed { page: Option<usize>, detail: String },

    /// OCR failed on one page image; other pages may still contribute text.
    #[error("OCR failed{}: {detail}", page_suffix(.page))]
    OcrFailed { page: Option<usize>, detail: String },
}

fn page_suffix(page: &Option<usize>) -> String {
    match page {
        Some(p) => format!(" on image {}", p + 1),
        None => String::new(),
    }
}

/// A failure reported by an external collaborator.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// The engine is not installed or not configured.
    #[error("{engine} is unavailable: {detail}")]
    Unavailable { engine: String, detail: String },

    /// The engine ran and reported an error.
    #[error("{engine} failed: {detail}")]
    Failed { engine: String, detail: String },

    /// The engine did not answer in time.
    #[error("{engine} timed out after {secs}s")]
    Timeout { engine: String, secs: u64 },

    /// The engine answered with output that does not match its contract.
    #[error("{engine} returned invalid output: {detail}")]
    InvalidOutput { engine: String, detail: String },
}
