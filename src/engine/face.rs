//! Face detectors.
//!
//! Both detectors speak the same wire format: a JSON array of
//! `{"x", "y", "width", "height", "confidence"}` objects in pixel
//! coordinates, optionally wrapped as `{"faces": [...]}`.
//!
//! * [`CommandFaceDetector`] runs an external program (OpenCV, mediapipe,
//!   an ONNX runner, …) as `<program> [args] --image <png>` and reads the
//!   JSON from stdout.
//! * [`VisionFaceDetector`] asks a vision-capable [`HostedModel`] for the
//!   boxes.

use super::{Detection, FaceDetector, HostedModel, ModelRequest};
use crate::error::EngineError;
use crate::pipeline::encode;
use crate::prompts::{face_location_prompt, FACE_LOCATION_SYSTEM_PROMPT};
use crate::pipeline::normalize::strip_code_fence;
use futures::future::BoxFuture;
use image::DynamicImage;
use serde::Deserialize;
use std::io::ErrorKind;
use std::sync::Arc;
use tokio::process::Command;
use tracing::debug;

#[derive(Deserialize)]
struct RawDetection {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    #[serde(default = "default_confidence")]
    confidence: f32,
}

fn default_confidence() -> f32 {
    1.0
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DetectionPayload {
    List(Vec<RawDetection>),
    Wrapped { faces: Vec<RawDetection> },
}

/// Parse detector output into [`Detection`]s.
///
/// Accepts an optional code fence around the JSON. Boxes with non-finite or
/// non-positive sizes are dropped; confidence is clamped to `0.0..=1.0`.
pub fn parse_detections(raw: &str) -> Result<Vec<Detection>, String> {
    let body = strip_code_fence(raw);
    let body = body.trim();
    if body.is_empty() {
        return Ok(Vec::new());
    }

    let payload: DetectionPayload =
        serde_json::from_str(body).map_err(|e| format!("expected JSON face list: {e}"))?;
    let raw = match payload {
        DetectionPayload::List(v) => v,
        DetectionPayload::Wrapped { faces } => faces,
    };

    Ok(raw
        .into_iter()
        .filter(|d| {
            [d.x, d.y, d.width, d.height].iter().all(|v| v.is_finite())
                && d.width > 0.0
                && d.height > 0.0
        })
        .map(|d| Detection {
            x: d.x,
            y: d.y,
            width: d.width,
            height: d.height,
            confidence: if d.confidence.is_finite() {
                d.confidence.clamp(0.0, 1.0)
            } else {
                0.0
            },
        })
        .collect())
}

// ── External command ─────────────────────────────────────────────────────────

/// [`FaceDetector`] that shells out to an external detection program.
#[derive(Debug, Clone)]
pub struct CommandFaceDetector {
    program: String,
    args: Vec<String>,
}

impl CommandFaceDetector {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Extra arguments placed before `--image <png>`.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Split a command line such as `"python3 detect_faces.py --model yunet"`
    /// on whitespace into program and arguments.
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program).with_args(parts.collect()))
    }

    async fn run(&self, image: &DynamicImage) -> Result<Vec<Detection>, EngineError> {
        let png = encode::png_bytes(image).map_err(|e| self.failed(format!("PNG encode: {e}")))?;
        let temp = tempfile::Builder::new()
            .prefix("faces_")
            .suffix(".png")
            .tempfile()
            .map_err(|e| self.failed(format!("temp file: {e}")))?;
        tokio::fs::write(temp.path(), &png)
            .await
            .map_err(|e| self.failed(format!("temp file write: {e}")))?;

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg("--image")
            .arg(temp.path())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    EngineError::Unavailable {
                        engine: self.program.clone(),
                        detail: "face detection command not found".into(),
                    }
                } else {
                    self.failed(e.to_string())
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.failed(format!("{} ({})", stderr.trim(), output.status)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_detections(&stdout).map_err(|detail| EngineError::InvalidOutput {
            engine: self.program.clone(),
            detail,
        })
    }

    fn failed(&self, detail: String) -> EngineError {
        EngineError::Failed {
            engine: self.program.clone(),
            detail,
        }
    }
}

impl FaceDetector for CommandFaceDetector {
    fn name(&self) -> &str {
        &self.program
    }

    fn detect<'a>(
        &'a self,
        image: &'a DynamicImage,
    ) -> BoxFuture<'a, Result<Vec<Detection>, EngineError>> {
        Box::pin(self.run(image))
    }
}

// ── Vision model ─────────────────────────────────────────────────────────────

/// [`FaceDetector`] that asks a vision-capable hosted model for face boxes.
///
/// The image is sent at its native size when it fits `max_pixels`; boxes
/// from a downscaled request are mapped back to the original pixel space.
#[derive(Clone)]
pub struct VisionFaceDetector {
    model: Arc<dyn HostedModel>,
    max_pixels: u32,
    label: String,
}

impl VisionFaceDetector {
    pub fn new(model: Arc<dyn HostedModel>, max_pixels: u32) -> Self {
        let label = format!("vision:{}", model.name());
        Self {
            model,
            max_pixels: max_pixels.max(100),
            label,
        }
    }

    async fn run(&self, image: &DynamicImage) -> Result<Vec<Detection>, EngineError> {
        let (w, h) = (image.width(), image.height());
        let longest = w.max(h).max(1);
        let scale = if longest > self.max_pixels {
            self.max_pixels as f64 / longest as f64
        } else {
            1.0
        };
        let sent_w = ((w as f64) * scale).round() as u32;
        let sent_h = ((h as f64) * scale).round() as u32;

        let data = encode::encode_for_model(image, self.max_pixels).map_err(|e| {
            EngineError::Failed {
                engine: self.label.clone(),
                detail: format!("image encode: {e}"),
            }
        })?;

        let request = ModelRequest::new(
            FACE_LOCATION_SYSTEM_PROMPT,
            face_location_prompt(sent_w, sent_h),
        )
        .with_image(data);

        let reply = self.model.complete(request).await?;
        debug!("{}: raw reply {} chars", self.label, reply.content.len());

        let detections = parse_detections(&reply.content).map_err(|detail| {
            EngineError::InvalidOutput {
                engine: self.label.clone(),
                detail,
            }
        })?;

        Ok(detections
            .into_iter()
            .map(|d| Detection {
                x: d.x / scale,
                y: d.y / scale,
                width: d.width / scale,
                height: d.height / scale,
                confidence: d.confidence,
            })
            .collect())
    }
}

impl FaceDetector for VisionFaceDetector {
    fn name(&self) -> &str {
        &self.label
    }

    fn detect<'a>(
        &'a self,
        image: &'a DynamicImage,
    ) -> BoxFuture<'a, Result<Vec<Detection>, EngineError>> {
        Box::pin(self.run(image))
    }
}
