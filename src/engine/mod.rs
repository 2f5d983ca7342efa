//! External collaborators consumed by the pipeline.
//!
//! The pipeline never talks to Tesseract, a face detector or an LLM API
//! directly; it goes through the three narrow traits below. Each returns a
//! boxed future so implementations can spawn processes or make network
//! calls, and so tests can substitute in-process fakes.
//!
//! | Trait | Default implementation |
//! |-------|------------------------|
//! | [`OcrEngine`]    | [`TesseractOcr`] — `tesseract <png> stdout -l <lang>` |
//! | [`FaceDetector`] | [`CommandFaceDetector`] or [`VisionFaceDetector`] |
//! | [`HostedModel`]  | [`LlmModel`] — any `edgequake_llm::LLMProvider` |

pub mod face;
pub mod llm;
pub mod tesseract;

use crate::error::EngineError;
use edgequake_llm::ImageData;
use futures::future::BoxFuture;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

pub use face::{parse_detections, CommandFaceDetector, VisionFaceDetector};
pub use llm::LlmModel;
pub use tesseract::TesseractOcr;

/// Converts a raster image into plain text.
pub trait OcrEngine: Send + Sync {
    /// Short engine label used in logs and error messages.
    fn name(&self) -> &str;

    /// Recognise the text in `image`. An image without text yields `Ok("")`.
    fn recognize<'a>(&'a self, image: &'a DynamicImage) -> BoxFuture<'a, Result<String, EngineError>>;
}

/// Finds faces in a raster image.
pub trait FaceDetector: Send + Sync {
    fn name(&self) -> &str;

    /// Bounding boxes in the image's pixel space. No faces yields `Ok(vec![])`.
    fn detect<'a>(
        &'a self,
        image: &'a DynamicImage,
    ) -> BoxFuture<'a, Result<Vec<Detection>, EngineError>>;
}

/// A hosted language model that answers one prompt.
pub trait HostedModel: Send + Sync {
    /// `provider/model` label used in logs and the result.
    fn name(&self) -> &str;

    fn complete(&self, request: ModelRequest) -> BoxFuture<'_, Result<ModelReply, EngineError>>;
}

/// One face bounding box reported by a [`FaceDetector`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Detector confidence in `0.0..=1.0`.
    pub confidence: f32,
}

/// A single prompt for a [`HostedModel`].
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system: String,
    pub prompt: String,
    /// Optional image attachments (base64 PNG) for vision-capable models.
    pub images: Vec<ImageData>,
}

impl ModelRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            images: Vec::new(),
        }
    }

    pub fn with_image(mut self, image: ImageData) -> Self {
        self.images.push(image);
        self
    }
}

/// The model's answer plus token accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelReply {
    pub content: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl ModelReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}
