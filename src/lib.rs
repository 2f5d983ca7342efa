//! # edgequake-idextract
//!
//! Extract text, face photographs and personal-identification fields from
//! identity and personal documents: passports, ID cards, driving licences,
//! certificates, marksheets, income statements.
//!
//! A document goes in; a single [`ExtractionResult`] comes out, holding the
//! document's text, cropped face images and a fixed-schema
//! [`StructuredRecord`] filled by a hosted language model.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF / DOCX / JPG / PNG / TIFF / BMP
//!  │
//!  ├─ 1. Detect     extension + magic bytes, fatal on mismatch
//!  ├─ 2. Rasterise  PDF pages via pdfium, DOCX media, the image itself
//!  ├─ 3. Text       native text layer, OCR fallback (tesseract)
//!  ├─ 4. Faces      detector → confidence filter → pad → crop
//!  ├─ 5. Analysis   one hosted-model call, strict JSON schema parse
//!  ├─ 6. Vision     page image to the model when the text found nothing
//!  └─ 7. Aggregate  ExtractionResult (+ optional JSON / JPEG files)
//! ```
//!
//! Steps 3+5 and step 4 run concurrently.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_idextract::{extract, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = ExtractionConfig::default();
//!     let result = extract("passport.pdf", &config).await?;
//!     println!("{}", serde_json::to_string_pretty(&result.record)?);
//!     eprintln!("{} face(s), {} warning(s)", result.faces.len(), result.warnings.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Failure Model
//!
//! Only problems that leave nothing to extract are errors: unreadable or
//! unsupported input, a wrong PDF password, a document with no text even
//! after OCR. Everything else (model unreachable, unparsable reply, face
//! detector missing) is a [`StageError`] in `result.warnings`, with the
//! affected part of the result left empty. Use
//! [`ExtractionResult::into_strict`] to reject degraded results.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `idextract` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! ## External Tools
//!
//! OCR shells out to `tesseract`; face location uses a configured command
//! (see [`CommandFaceDetector`]) or, failing that, asks the vision model.
//! Both are replaceable through the [`OcrEngine`] and [`FaceDetector`]
//! traits.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod schema;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, PageSelection};
pub use engine::{
    CommandFaceDetector, Detection, FaceDetector, HostedModel, LlmModel, ModelReply, ModelRequest,
    OcrEngine, TesseractOcr, VisionFaceDetector,
};
pub use error::{EngineError, ExtractError, StageError};
pub use extract::{
    default_output_dir, extract, extract_from_bytes, extract_sync, extract_to_dir, inspect,
    inspect_with_password, save_result,
};
pub use output::{
    AnalysisSource, AnalysisStatus, BoundingBox, DocumentInfo, ExtractedText, ExtractionResult,
    ExtractionStats, FaceCrop, SavedOutput, TextBlock, TextSource,
};
pub use pipeline::detect::DocumentFormat;
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback, Stage};
pub use schema::{FieldSchema, FieldSpec, StructuredRecord};
