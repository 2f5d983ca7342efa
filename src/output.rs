//! Result types and the aggregator.
//!
//! [`ExtractionResult`] is the single record produced per document. It
//! serialises to the JSON written by [`crate::extract_to_dir`]; face pixels
//! are not serialised, only their boxes and (once written) file paths.

use crate::error::{ExtractError, StageError};
use crate::pipeline::detect::DocumentFormat;
use crate::schema::StructuredRecord;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

// ── Document ─────────────────────────────────────────────────────────────

/// Metadata about the input document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub path: PathBuf,
    pub file_name: String,
    pub format: DocumentFormat,
    pub size_bytes: u64,
    /// PDF page count, 1 for images, DOCX page count when the package
    /// records one.
    pub page_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub author: Option<String>,
}

// ── Text ─────────────────────────────────────────────────────────────────

/// Where a block of text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextSource {
    Native,
    Ocr,
}

/// One contiguous piece of extracted text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextBlock {
    pub source: TextSource,
    /// Index of the page image (OCR) or PDF page (native) it came from.
    /// `None` for whole-document native text such as a DOCX body.
    pub page: Option<usize>,
    pub text: String,
}

/// The document's text, in reading order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedText {
    /// All blocks joined with a blank line.
    pub content: String,
    pub blocks: Vec<TextBlock>,
}

impl ExtractedText {
    pub fn from_blocks(blocks: Vec<TextBlock>) -> Self {
        let content = blocks
            .iter()
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        Self { content, blocks }
    }

    /// True when the content has no non-whitespace characters.
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
    }

    pub fn used_ocr(&self) -> bool {
        self.blocks.iter().any(|b| b.source == TextSource::Ocr)
    }
}

// ── Faces ────────────────────────────────────────────────────────────────

/// Pixel-space rectangle within a page image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// A cropped face image.
#[derive(Clone, Serialize)]
pub struct FaceCrop {
    /// 1-based face number, in page order then detector order.
    pub index: usize,
    /// Index of the page image the face was found on.
    pub page_index: usize,
    pub bbox: BoundingBox,
    pub confidence: f32,
    #[serde(skip)]
    pub image: DynamicImage,
    /// Set once the crop has been written to disk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl fmt::Debug for FaceCrop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FaceCrop")
            .field("index", &self.index)
            .field("page_index", &self.page_index)
            .field("bbox", &self.bbox)
            .field("confidence", &self.confidence)
            .field("path", &self.path)
            .finish()
    }
}

// ── Analysis ─────────────────────────────────────────────────────────────

/// Input the structured record was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisSource {
    Text,
    Vision,
}

/// Whether the hosted model produced a usable record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisStatus {
    Analyzed {
        source: AnalysisSource,
        model: String,
    },
    /// The record is all-null; `reason` repeats the first analysis warning.
    Failed { reason: String },
}

impl AnalysisStatus {
    pub fn is_analyzed(&self) -> bool {
        matches!(self, AnalysisStatus::Analyzed { .. })
    }
}

// ── Stats ────────────────────────────────────────────────────────────────

/// Timing and token accounting for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub total_duration_ms: u64,
    pub rasterise_duration_ms: u64,
    pub text_duration_ms: u64,
    pub faces_duration_ms: u64,
    pub analysis_duration_ms: u64,
    /// Page images available to OCR and face location.
    pub page_images: usize,
    /// Page images sent to OCR.
    pub ocr_pages: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

// ── Result ───────────────────────────────────────────────────────────────

/// Everything extracted from one document.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    pub document: DocumentInfo,
    pub text: ExtractedText,
    pub faces: Vec<FaceCrop>,
    /// Keys are exactly the configured schema's fields.
    pub record: StructuredRecord,
    pub analysis: AnalysisStatus,
    /// Non-fatal stage failures, in the order they were recorded.
    pub warnings: Vec<StageError>,
    pub stats: ExtractionStats,
}

impl ExtractionResult {
    /// True when any stage recorded a warning.
    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Number of non-null record fields.
    pub fn fields_found(&self) -> usize {
        self.record.filled()
    }

    /// Treat any stage warning as an error.
    ///
    /// # Errors
    /// [`ExtractError::Degraded`] carrying the warning count and the first
    /// warning's message.
    pub fn into_strict(self) -> Result<Self, ExtractError> {
        match self.warnings.first() {
            None => Ok(self),
            Some(first) => Err(ExtractError::Degraded {
                count: self.warnings.len(),
                first: first.to_string(),
            }),
        }
    }
}

/// Combine stage outputs into one [`ExtractionResult`].
///
/// Pure: every input appears unchanged in the result.
pub fn aggregate(
    document: DocumentInfo,
    text: ExtractedText,
    faces: Vec<FaceCrop>,
    record: StructuredRecord,
    analysis: AnalysisStatus,
    warnings: Vec<StageError>,
    stats: ExtractionStats,
) -> ExtractionResult {
    ExtractionResult {
        document,
        text,
        faces,
        record,
        analysis,
        warnings,
        stats,
    }
}

/// Files written by [`crate::extract_to_dir`].
#[derive(Debug, Clone)]
pub struct SavedOutput {
    pub result: ExtractionResult,
    /// The JSON result file.
    pub result_path: PathBuf,
    /// Directory holding `face_{n}.jpg`; created only when faces were found.
    pub faces_dir: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldSchema;

    fn info() -> DocumentInfo {
        DocumentInfo {
            path: PathBuf::from("/tmp/id.png"),
            file_name: "id.png".into(),
            format: DocumentFormat::Image,
            size_bytes: 42,
            page_count: Some(1),
            title: None,
            author: None,
        }
    }

    fn block(source: TextSource, text: &str) -> TextBlock {
        TextBlock {
            source,
            page: Some(0),
            text: text.into(),
        }
    }

    #[test]
    fn extracted_text_joins_blocks() {
        let t = ExtractedText::from_blocks(vec![
            block(TextSource::Native, "A"),
            block(TextSource::Ocr, "B\n"),
        ]);
        assert_eq!(t.content, "A\n\nB\n");
        assert!(t.used_ocr());

        let single = ExtractedText::from_blocks(vec![block(TextSource::Ocr, "  raw  \n")]);
        assert_eq!(single.content, "  raw  \n");
        assert!(ExtractedText::from_blocks(vec![block(TextSource::Ocr, " \n ")]).is_empty());
    }

    #[test]
    fn aggregate_is_pure_and_deterministic() {
        let schema = FieldSchema::from_names(["name", "id_number"]).unwrap();
        let mut record = schema.empty_record();
        record.set("name", Some("Jane Doe".into()));
        let text = ExtractedText::from_blocks(vec![block(TextSource::Ocr, "NAME JANE DOE")]);
        let analysis = AnalysisStatus::Analyzed {
            source: AnalysisSource::Text,
            model: "fake".into(),
        };
        let stats = ExtractionStats {
            ocr_pages: 1,
            ..Default::default()
        };

        let a = aggregate(
            info(),
            text.clone(),
            vec![],
            record.clone(),
            analysis.clone(),
            vec![],
            stats.clone(),
        );
        let b = aggregate(
            info(),
            text.clone(),
            vec![],
            record.clone(),
            analysis.clone(),
            vec![],
            stats.clone(),
        );

        assert_eq!(a.document, info());
        assert_eq!(a.text, text);
        assert_eq!(a.record, record);
        assert_eq!(a.analysis, analysis);
        assert_eq!(a.stats, stats);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn into_strict_rejects_warnings() {
        let schema = FieldSchema::from_names(["name"]).unwrap();
        let clean = aggregate(
            info(),
            ExtractedText::default(),
            vec![],
            schema.empty_record(),
            AnalysisStatus::Failed {
                reason: "x".into(),
            },
            vec![],
            ExtractionStats::default(),
        );
        assert!(clean.clone().into_strict().is_ok());

        let mut degraded = clean;
        degraded.warnings.push(StageError::AnalysisFailed {
            detail: "no provider".into(),
        });
        let err = degraded.into_strict().unwrap_err();
        assert!(matches!(err, ExtractError::Degraded { count: 1, .. }));
    }

    #[test]
    fn result_json_shape() {
        let schema = FieldSchema::from_names(["name"]).unwrap();
        let result = aggregate(
            info(),
            ExtractedText::default(),
            vec![FaceCrop {
                index: 1,
                page_index: 0,
                bbox: BoundingBox {
                    x: 1,
                    y: 2,
                    width: 3,
                    height: 4,
                },
                confidence: 0.5,
                image: DynamicImage::new_rgb8(3, 4),
                path: None,
            }],
            schema.empty_record(),
            AnalysisStatus::Failed {
                reason: "no model".into(),
            },
            vec![],
            ExtractionStats::default(),
        );
        let v = serde_json::to_value(&result).unwrap();
        assert_eq!(v["document"]["format"], "image");
        assert_eq!(v["analysis"]["status"], "failed");
        assert_eq!(v["record"]["name"], serde_json::Value::Null);
        assert_eq!(v["faces"][0]["bbox"]["width"], 3);
        assert!(v["faces"][0].get("image").is_none());
        assert!(v["faces"][0].get("path").is_none());
    }
}
