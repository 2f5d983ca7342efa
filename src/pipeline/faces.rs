//! Face location: detect, filter, pad and crop.
//!
//! Each page image goes to the face detector once. Detections below the
//! confidence threshold are discarded; the rest are expanded by a padding
//! fraction on every side, clamped to the image and cropped. A detector
//! failure on one image is recorded as a warning and counts as no faces.

use super::render::RasterPage;
use crate::engine::{Detection, FaceDetector};
use crate::error::StageError;
use crate::output::{BoundingBox, FaceCrop};
use tracing::{debug, info, warn};

/// Result of the face stage.
#[derive(Debug, Clone, Default)]
pub struct FaceOutcome {
    pub faces: Vec<FaceCrop>,
    pub warnings: Vec<StageError>,
}

impl FaceOutcome {
    /// Zero faces plus one warning, for runs without a usable detector.
    pub fn unavailable(detail: impl Into<String>) -> Self {
        Self {
            faces: Vec::new(),
            warnings: vec![StageError::FaceDetectionFailed {
                page: None,
                detail: detail.into(),
            }],
        }
    }
}

/// Expand `det` by `padding` × its size on each side and clamp to a
/// `width`×`height` image. Returns `None` when nothing is left.
pub fn padded_box(det: &Detection, padding: f32, width: u32, height: u32) -> Option<BoundingBox> {
    let pad = padding.max(0.0) as f64;
    let pad_x = det.width * pad;
    let pad_y = det.height * pad;

    let x0 = (det.x - pad_x).max(0.0).floor();
    let y0 = (det.y - pad_y).max(0.0).floor();
    let x1 = (det.x + det.width + pad_x).min(width as f64).ceil();
    let y1 = (det.y + det.height + pad_y).min(height as f64).ceil();

    if !(x1 > x0 && y1 > y0) {
        return None;
    }
    Some(BoundingBox {
        x: x0 as u32,
        y: y0 as u32,
        width: (x1 - x0) as u32,
        height: (y1 - y0) as u32,
    })
}

/// Find and crop faces on every page image.
pub async fn locate_faces(
    pages: &[RasterPage],
    detector: &dyn FaceDetector,
    min_confidence: f32,
    padding: f32,
) -> FaceOutcome {
    let mut outcome = FaceOutcome::default();

    for page in pages {
        let detections = match detector.detect(&page.image).await {
            Ok(d) => d,
            Err(e) => {
                warn!("Face detection failed on image {}: {}", page.index + 1, e);
                outcome.warnings.push(StageError::FaceDetectionFailed {
                    page: Some(page.index),
                    detail: e.to_string(),
                });
                continue;
            }
        };

        let (w, h) = (page.image.width(), page.image.height());
        for det in detections {
            if det.confidence < min_confidence {
                debug!(
                    "Dropping face at ({:.0},{:.0}) with confidence {:.2}",
                    det.x, det.y, det.confidence
                );
                continue;
            }
            let Some(bbox) = padded_box(&det, padding, w, h) else {
                continue;
            };
            let image = page.image.crop_imm(bbox.x, bbox.y, bbox.width, bbox.height);
            let index = outcome.faces.len() + 1;
            outcome.faces.push(FaceCrop {
                index,
                page_index: page.index,
                bbox,
                confidence: det.confidence,
                image,
                path: None,
            });
        }
    }

    info!(
        "{} face(s) found on {} image(s) with {}",
        outcome.faces.len(),
        pages.len(),
        detector.name()
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::pipeline::render::RasterSource;
    use futures::future::BoxFuture;
    use image::DynamicImage;

    fn det(x: f64, y: f64, w: f64, h: f64, confidence: f32) -> Detection {
        Detection {
            x,
            y,
            width: w,
            height: h,
            confidence,
        }
    }

    #[test]
    fn padding_expands_and_clamps() {
        let b = padded_box(&det(10.0, 10.0, 20.0, 40.0, 1.0), 0.1, 100, 100).unwrap();
        assert_eq!(
            b,
            BoundingBox {
                x: 8,
                y: 6,
                width: 24,
                height: 48
            }
        );

        let b = padded_box(&det(90.0, 0.0, 20.0, 20.0, 1.0), 0.5, 100, 100).unwrap();
        assert_eq!(b.x, 80);
        assert_eq!(b.y, 0);
        assert_eq!(b.x + b.width, 100);
    }

    #[test]
    fn box_outside_image_is_dropped() {
        assert!(padded_box(&det(200.0, 200.0, 10.0, 10.0, 1.0), 0.1, 100, 100).is_none());
    }

    struct FixedDetector(Result<Vec<Detection>, EngineError>);

    impl FaceDetector for FixedDetector {
        fn name(&self) -> &str {
            "fixed"
        }

        fn detect<'a>(
            &'a self,
            _image: &'a DynamicImage,
        ) -> BoxFuture<'a, Result<Vec<Detection>, EngineError>> {
            let r = self.0.clone();
            Box::pin(async move { r })
        }
    }

    fn pages(n: usize) -> Vec<RasterPage> {
        (0..n)
            .map(|index| RasterPage {
                index,
                source: RasterSource::SourceImage,
                image: DynamicImage::new_rgb8(100, 80),
            })
            .collect()
    }

    #[tokio::test]
    async fn crops_faces_above_threshold() {
        let detector = FixedDetector(Ok(vec![
            det(10.0, 10.0, 30.0, 30.0, 0.9),
            det(50.0, 10.0, 30.0, 30.0, 0.2),
        ]));
        let out = locate_faces(&pages(2), &detector, 0.5, 0.0).await;
        assert!(out.warnings.is_empty());
        assert_eq!(out.faces.len(), 2);
        assert_eq!(out.faces[0].index, 1);
        assert_eq!(out.faces[1].index, 2);
        assert_eq!(out.faces[1].page_index, 1);
        assert_eq!(
            (out.faces[0].image.width(), out.faces[0].image.height()),
            (30, 30)
        );
    }

    #[tokio::test]
    async fn zero_faces_is_not_an_error() {
        let out = locate_faces(&pages(1), &FixedDetector(Ok(vec![])), 0.5, 0.1).await;
        assert!(out.faces.is_empty());
        assert!(out.warnings.is_empty());
    }

    #[tokio::test]
    async fn detector_error_becomes_warning() {
        let detector = FixedDetector(Err(EngineError::Failed {
            engine: "fixed".into(),
            detail: "model crashed".into(),
        }));
        let out = locate_faces(&pages(1), &detector, 0.5, 0.1).await;
        assert!(out.faces.is_empty());
        assert_eq!(out.warnings.len(), 1);
        assert!(out.warnings[0].to_string().contains("model crashed"));
    }
}
