//! Progress-callback trait for per-stage extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the pipeline moves through its stages.
//!
//! # Example
//!
//! ```rust
//! use edgequake_idextract::{ExtractionConfig, ExtractionProgressCallback, Stage};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl ExtractionProgressCallback for Printer {
//!     fn on_stage_complete(&self, stage: Stage, detail: &str) {
//!         eprintln!("{stage}: {detail}");
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(Arc::new(Printer) as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Pipeline stage reported to [`ExtractionProgressCallback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Detect,
    Rasterise,
    Text,
    Faces,
    Analysis,
    VisionFallback,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Detect => "detect",
            Stage::Rasterise => "rasterise",
            Stage::Text => "text",
            Stage::Faces => "faces",
            Stage::Analysis => "analysis",
            Stage::VisionFallback => "vision fallback",
        };
        f.write_str(s)
    }
}

/// Called by the pipeline as it moves through its stages.
///
/// The text/analysis branch and the face branch run concurrently, so stage
/// events from the two branches may interleave. All methods have default
/// no-op implementations.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once, before format detection.
    fn on_extraction_start(&self, file_name: &str) {
        let _ = file_name;
    }

    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// `detail` is a short human-readable summary such as `"2 faces"`.
    fn on_stage_complete(&self, stage: Stage, detail: &str) {
        let _ = (stage, detail);
    }

    /// Called for each non-fatal warning a stage records.
    fn on_stage_warning(&self, stage: Stage, warning: &str) {
        let _ = (stage, warning);
    }

    /// Called once after aggregation.
    ///
    /// # Arguments
    /// * `fields_found` — non-null fields in the record
    /// * `faces`        — face crops produced
    /// * `warnings`     — non-fatal warnings recorded
    fn on_extraction_complete(&self, fields_found: usize, faces: usize, warnings: usize) {
        let _ = (fields_found, faces, warnings);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;
