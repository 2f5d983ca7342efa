//! Integration tests for the extraction pipeline.
//!
//! OCR, face detection and the hosted model are replaced by in-process
//! fakes, so these tests need neither tesseract nor an API key. PDF input
//! is covered by `tests/e2e.rs` (it needs libpdfium).

use edgequake_idextract::pipeline::encode;
use edgequake_idextract::{
    extract, extract_from_bytes, extract_to_dir, inspect, inspect_with_password, AnalysisSource,
    AnalysisStatus, Detection, DocumentFormat, EngineError, ExtractError, ExtractionConfig,
    ExtractionProgressCallback, FaceDetector, FieldSchema, HostedModel, ModelReply, ModelRequest,
    OcrEngine, Stage, StageError,
};
use futures::future::BoxFuture;
use image::{DynamicImage, Rgb, RgbImage};
use std::collections::VecDeque;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use zip::write::SimpleFileOptions;

// ── Fakes ────────────────────────────────────────────────────────────────────

struct FakeOcr {
    reply: String,
    calls: AtomicUsize,
}

impl FakeOcr {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl OcrEngine for FakeOcr {
    fn name(&self) -> &str {
        "fake-ocr"
    }

    fn recognize<'a>(&'a self, _image: &'a DynamicImage) -> BoxFuture<'a, Result<String, EngineError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.reply.clone();
        Box::pin(async move { Ok(reply) })
    }
}

struct FakeDetector {
    reply: Result<Vec<Detection>, EngineError>,
    calls: AtomicUsize,
}

impl FakeDetector {
    fn new(reply: Result<Vec<Detection>, EngineError>) -> Arc<Self> {
        Arc::new(Self {
            reply,
            calls: AtomicUsize::new(0),
        })
    }
}

impl FaceDetector for FakeDetector {
    fn name(&self) -> &str {
        "fake-faces"
    }

    fn detect<'a>(
        &'a self,
        _image: &'a DynamicImage,
    ) -> BoxFuture<'a, Result<Vec<Detection>, EngineError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.reply.clone();
        Box::pin(async move { reply })
    }
}

/// Answers requests from a script, in order.
struct FakeModel {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl FakeModel {
    fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl HostedModel for FakeModel {
    fn name(&self) -> &str {
        "fake/model"
    }

    fn complete(&self, request: ModelRequest) -> BoxFuture<'_, Result<ModelReply, EngineError>> {
        self.requests.lock().unwrap().push(request);
        let reply = match self.replies.lock().unwrap().pop_front() {
            Some(content) => Ok(ModelReply {
                content,
                input_tokens: 50,
                output_tokens: 10,
            }),
            None => Err(EngineError::Failed {
                engine: "fake/model".into(),
                detail: "no scripted reply".into(),
            }),
        };
        Box::pin(async move { reply })
    }
}

#[derive(Default)]
struct RecordingProgress {
    events: Mutex<Vec<String>>,
}

impl ExtractionProgressCallback for RecordingProgress {
    fn on_extraction_start(&self, file_name: &str) {
        self.events.lock().unwrap().push(format!("start:{file_name}"));
    }

    fn on_stage_complete(&self, stage: Stage, _detail: &str) {
        self.events.lock().unwrap().push(format!("done:{stage}"));
    }

    fn on_stage_warning(&self, stage: Stage, _warning: &str) {
        self.events.lock().unwrap().push(format!("warn:{stage}"));
    }

    fn on_extraction_complete(&self, fields_found: usize, faces: usize, warnings: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("complete:{fields_found}/{faces}/{warnings}"));
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────────

fn schema() -> FieldSchema {
    FieldSchema::from_names(["name", "id_number"]).unwrap()
}

fn face(confidence: f32) -> Detection {
    Detection {
        x: 10.0,
        y: 5.0,
        width: 12.0,
        height: 16.0,
        confidence,
    }
}

fn png() -> Vec<u8> {
    let img = RgbImage::from_pixel(40, 30, Rgb([200, 200, 200]));
    encode::png_bytes(&DynamicImage::ImageRgb8(img)).unwrap()
}

fn docx(body_text: &str) -> Vec<u8> {
    let xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body><w:p><w:r><w:t>{body_text}</w:t></w:r></w:p></w:body>
</w:document>"#
    );
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    zip.start_file("word/document.xml", SimpleFileOptions::default())
        .unwrap();
    zip.write_all(xml.as_bytes()).unwrap();
    zip.finish().unwrap().into_inner()
}

/// A DOCX with no body text and one embedded picture.
fn docx_with_photo() -> Vec<u8> {
    let xml = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body><w:p/></w:body>
</w:document>"#;
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    zip.start_file("word/document.xml", SimpleFileOptions::default())
        .unwrap();
    zip.write_all(xml.as_bytes()).unwrap();
    zip.start_file("word/media/image1.png", SimpleFileOptions::default())
        .unwrap();
    zip.write_all(&png()).unwrap();
    zip.finish().unwrap().into_inner()
}

fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

fn config(
    ocr: &Arc<FakeOcr>,
    faces: &Arc<FakeDetector>,
    model: &Arc<FakeModel>,
) -> edgequake_idextract::ExtractionConfigBuilder {
    ExtractionConfig::builder()
        .schema(schema())
        .ocr(ocr.clone())
        .face_detector(faces.clone())
        .hosted_model(model.clone())
}

// ── Happy paths ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn image_is_ocrd_verbatim_and_analysed() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "id.png", &png());

    let ocr = FakeOcr::new("  NAME: JANE DOE\nID: X123  \n");
    let faces = FakeDetector::new(Ok(vec![face(0.9)]));
    let model = FakeModel::new(&[r#"{"name": "Jane Doe", "id_number": "X123"}"#]);
    let cfg = config(&ocr, &faces, &model).build().unwrap();

    let result = extract(&path, &cfg).await.unwrap();

    assert_eq!(result.document.format, DocumentFormat::Image);
    assert_eq!(result.document.page_count, Some(1));
    assert_eq!(result.text.content, "  NAME: JANE DOE\nID: X123  \n");
    assert!(result.text.used_ocr());
    assert_eq!(ocr.calls(), 1);

    assert_eq!(result.record.get("name"), Some("Jane Doe"));
    assert_eq!(result.record.get("id_number"), Some("X123"));
    assert_eq!(
        result.analysis,
        AnalysisStatus::Analyzed {
            source: AnalysisSource::Text,
            model: "fake/model".into()
        }
    );

    assert_eq!(result.faces.len(), 1);
    assert_eq!(result.faces[0].index, 1);
    assert!(result.warnings.is_empty());
    assert_eq!(result.stats.input_tokens, 50);
    assert_eq!(result.stats.ocr_pages, 1);

    let sent = model.requests();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].prompt.contains("NAME: JANE DOE"));
    assert!(sent[0].prompt.contains("id_number"));
}

#[tokio::test]
async fn docx_uses_native_text_without_ocr() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "letter.docx", &docx("Hello World"));

    let ocr = FakeOcr::new("should not be used");
    let faces = FakeDetector::new(Ok(vec![]));
    let model = FakeModel::new(&[r#"{"name": null, "id_number": null}"#]);
    let cfg = config(&ocr, &faces, &model).build().unwrap();

    let result = extract(&path, &cfg).await.unwrap();

    assert_eq!(result.document.format, DocumentFormat::Docx);
    assert_eq!(result.text.content, "Hello World");
    assert!(!result.text.used_ocr());
    assert_eq!(ocr.calls(), 0);

    // No page images, so nothing for face location or the vision fallback.
    assert!(result.faces.is_empty());
    assert_eq!(faces.calls.load(Ordering::SeqCst), 0);
    assert_eq!(model.requests().len(), 1);

    assert!(result.record.is_all_null());
    assert_eq!(result.record.len(), 2);
    assert!(result.warnings.is_empty());
}

#[tokio::test]
async fn docx_pictures_feed_ocr_and_face_location() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "card.docx", &docx_with_photo());

    let ocr = FakeOcr::new("NAME: JANE DOE");
    let faces = FakeDetector::new(Ok(vec![face(0.9)]));
    let model = FakeModel::new(&[r#"{"name": "Jane Doe"}"#]);
    let cfg = config(&ocr, &faces, &model).build().unwrap();

    let result = extract(&path, &cfg).await.unwrap();

    assert_eq!(result.document.format, DocumentFormat::Docx);
    assert_eq!(ocr.calls(), 1);
    assert!(result.text.used_ocr());
    assert_eq!(result.text.content, "NAME: JANE DOE");
    assert_eq!(result.stats.ocr_pages, 1);

    assert_eq!(faces.calls.load(Ordering::SeqCst), 1);
    assert_eq!(result.faces.len(), 1);
    assert_eq!(result.faces[0].page_index, 0);

    assert_eq!(result.record.get("name"), Some("Jane Doe"));
    assert!(result.warnings.is_empty());
}

#[tokio::test]
async fn extract_from_bytes_needs_no_file() {
    let ocr = FakeOcr::new("JANE DOE");
    let faces = FakeDetector::new(Ok(vec![]));
    let model = FakeModel::new(&[r#"{"name": "Jane Doe"}"#]);
    let cfg = config(&ocr, &faces, &model).build().unwrap();

    let result = extract_from_bytes("scan.png", png(), &cfg).await.unwrap();
    assert_eq!(result.document.file_name, "scan.png");
    assert_eq!(result.record.get("name"), Some("Jane Doe"));
    assert_eq!(result.record.get("id_number"), None);
}

#[tokio::test]
async fn skip_faces_never_calls_detector() {
    let ocr = FakeOcr::new("JANE DOE");
    let faces = FakeDetector::new(Ok(vec![face(0.9)]));
    let model = FakeModel::new(&[r#"{"name": "Jane Doe"}"#]);
    let cfg = config(&ocr, &faces, &model)
        .skip_faces(true)
        .build()
        .unwrap();

    let result = extract_from_bytes("scan.png", png(), &cfg).await.unwrap();
    assert!(result.faces.is_empty());
    assert!(result.warnings.is_empty());
    assert_eq!(faces.calls.load(Ordering::SeqCst), 0);
}

// ── Fatal errors ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn unsupported_extension_fails_before_any_stage() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "notes.xyz", b"plain text");

    let ocr = FakeOcr::new("x");
    let faces = FakeDetector::new(Ok(vec![]));
    let model = FakeModel::new(&["{}"]);
    let cfg = config(&ocr, &faces, &model).build().unwrap();

    let err = extract(&path, &cfg).await.unwrap_err();
    assert!(matches!(err, ExtractError::UnsupportedFormat { .. }), "{err}");
    assert_eq!(ocr.calls(), 0);
    assert_eq!(faces.calls.load(Ordering::SeqCst), 0);
    assert!(model.requests().is_empty());
}

#[tokio::test]
async fn missing_and_empty_files() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = ExtractionConfig::default();

    let err = extract(dir.path().join("absent.pdf"), &cfg)
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractError::FileNotFound { .. }));

    let empty = write_file(dir.path(), "empty.png", b"");
    let err = extract(&empty, &cfg).await.unwrap_err();
    assert!(matches!(err, ExtractError::EmptyFile { .. }));
}

#[tokio::test]
async fn mismatched_content_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "passport.pdf", &png());

    let err = extract(&path, &ExtractionConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractError::UnsupportedFormat { .. }), "{err}");
}

#[tokio::test]
async fn no_text_anywhere_is_fatal() {
    let ocr = FakeOcr::new("   \n");
    let faces = FakeDetector::new(Ok(vec![]));
    let model = FakeModel::new(&["{}"]);
    let cfg = config(&ocr, &faces, &model).build().unwrap();

    let err = extract_from_bytes("blank.png", png(), &cfg)
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractError::ExtractionFailed { .. }), "{err}");
    assert!(model.requests().is_empty());
}

// ── Degraded stages ──────────────────────────────────────────────────────────

#[tokio::test]
async fn detector_failure_is_a_warning() {
    let ocr = FakeOcr::new("JANE DOE");
    let faces = FakeDetector::new(Err(EngineError::Failed {
        engine: "fake-faces".into(),
        detail: "model weights missing".into(),
    }));
    let model = FakeModel::new(&[r#"{"name": "Jane Doe"}"#]);
    let cfg = config(&ocr, &faces, &model).build().unwrap();

    let result = extract_from_bytes("id.png", png(), &cfg).await.unwrap();
    assert!(result.faces.is_empty());
    assert_eq!(result.record.get("name"), Some("Jane Doe"));
    assert_eq!(result.warnings.len(), 1);
    assert!(matches!(
        result.warnings[0],
        StageError::FaceDetectionFailed { page: Some(0), .. }
    ));

    let err = result.into_strict().unwrap_err();
    assert!(err.to_string().contains("model weights missing"), "{err}");
}

#[tokio::test]
async fn unknown_provider_degrades_instead_of_failing() {
    let ocr = FakeOcr::new("JANE DOE");
    let cfg = ExtractionConfig::builder()
        .schema(schema())
        .ocr(ocr.clone())
        .provider_name("no-such-provider")
        .build()
        .unwrap();

    let result = extract_from_bytes("id.png", png(), &cfg).await.unwrap();

    assert_eq!(result.text.content, "JANE DOE");
    assert!(result.record.is_all_null());
    assert_eq!(result.record.len(), 2);
    assert!(matches!(result.analysis, AnalysisStatus::Failed { .. }));
    assert!(result.faces.is_empty());

    assert_eq!(result.warnings.len(), 2, "{:?}", result.warnings);
    assert!(result
        .warnings
        .iter()
        .any(|w| matches!(w, StageError::AnalysisFailed { .. })));
    assert!(result
        .warnings
        .iter()
        .any(|w| matches!(w, StageError::FaceDetectionFailed { page: None, .. })));
}

#[tokio::test]
async fn low_confidence_faces_are_dropped() {
    let ocr = FakeOcr::new("JANE DOE");
    let faces = FakeDetector::new(Ok(vec![face(0.3), face(0.8)]));
    let model = FakeModel::new(&[r#"{"name": "Jane Doe"}"#]);
    let cfg = config(&ocr, &faces, &model)
        .min_face_confidence(0.5)
        .build()
        .unwrap();

    let result = extract_from_bytes("id.png", png(), &cfg).await.unwrap();
    assert_eq!(result.faces.len(), 1);
    assert_eq!(result.faces[0].confidence, 0.8);
}

#[tokio::test]
async fn garbage_reply_keeps_full_key_set() {
    let ocr = FakeOcr::new("JANE DOE");
    let faces = FakeDetector::new(Ok(vec![]));
    let model = FakeModel::new(&["I'm sorry, I can't help with that.", "Still no JSON."]);
    let cfg = config(&ocr, &faces, &model).build().unwrap();

    let result = extract_from_bytes("id.png", png(), &cfg).await.unwrap();

    assert!(result.record.is_all_null());
    assert_eq!(
        result.record.keys().collect::<Vec<_>>(),
        vec!["name", "id_number"]
    );
    assert!(matches!(result.analysis, AnalysisStatus::Failed { .. }));
    assert_eq!(result.warnings.len(), 2);
    assert!(matches!(result.warnings[0], StageError::AnalysisFailed { .. }));
    assert!(matches!(
        result.warnings[1],
        StageError::VisionFallbackFailed { .. }
    ));
    assert!(matches!(
        result.into_strict(),
        Err(ExtractError::Degraded { count: 2, .. })
    ));
}

#[tokio::test]
async fn vision_fallback_fills_empty_record() {
    let ocr = FakeOcr::new("illegible scan");
    let faces = FakeDetector::new(Ok(vec![]));
    let model = FakeModel::new(&["{}", r#"{"name": "Jane Doe"}"#]);
    let cfg = config(&ocr, &faces, &model).build().unwrap();

    let result = extract_from_bytes("id.png", png(), &cfg).await.unwrap();

    assert_eq!(result.record.get("name"), Some("Jane Doe"));
    assert_eq!(
        result.analysis,
        AnalysisStatus::Analyzed {
            source: AnalysisSource::Vision,
            model: "fake/model".into()
        }
    );
    assert!(result.warnings.is_empty());
    assert_eq!(result.stats.input_tokens, 100);

    let sent = model.requests();
    assert_eq!(sent.len(), 2);
    assert!(sent[0].images.is_empty());
    assert_eq!(sent[1].images.len(), 1);
}

#[tokio::test]
async fn vision_fallback_can_be_disabled() {
    let ocr = FakeOcr::new("illegible scan");
    let faces = FakeDetector::new(Ok(vec![]));
    let model = FakeModel::new(&["{}", r#"{"name": "Jane Doe"}"#]);
    let cfg = config(&ocr, &faces, &model)
        .vision_fallback(false)
        .build()
        .unwrap();

    let result = extract_from_bytes("id.png", png(), &cfg).await.unwrap();
    assert!(result.record.is_all_null());
    assert_eq!(model.requests().len(), 1);
}

// ── Output ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn extract_to_dir_writes_json_and_faces() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "passport.png", &png());
    let out = dir.path().join("out");

    let ocr = FakeOcr::new("JANE DOE");
    let faces = FakeDetector::new(Ok(vec![face(0.9)]));
    let model = FakeModel::new(&[r#"{"name": "Jane Doe"}"#]);
    let cfg = config(&ocr, &faces, &model).build().unwrap();

    let saved = extract_to_dir(&path, &out, &cfg).await.unwrap();

    assert_eq!(saved.result_path, out.join("passport_result.json"));
    let face_path = out.join("faces").join("face_1.jpg");
    assert_eq!(saved.result.faces[0].path.as_deref(), Some(face_path.as_path()));

    let jpeg = std::fs::read(&face_path).unwrap();
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    let decoded = image::load_from_memory(&jpeg).unwrap();
    assert_eq!(
        (decoded.width(), decoded.height()),
        (
            saved.result.faces[0].bbox.width,
            saved.result.faces[0].bbox.height
        )
    );

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&saved.result_path).unwrap()).unwrap();
    assert_eq!(json["record"]["name"], "Jane Doe");
    assert!(json["record"]["id_number"].is_null());
    assert_eq!(json["document"]["format"], "image");
    assert_eq!(json["analysis"]["status"], "analyzed");
    assert_eq!(json["faces"].as_array().unwrap().len(), 1);

    let leftovers: Vec<_> = std::fs::read_dir(&out)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn progress_events_bracket_the_run() {
    let ocr = FakeOcr::new("JANE DOE");
    let faces = FakeDetector::new(Ok(vec![]));
    let model = FakeModel::new(&[r#"{"name": "Jane Doe"}"#]);
    let progress = Arc::new(RecordingProgress::default());
    let cfg = config(&ocr, &faces, &model)
        .progress_callback(progress.clone())
        .build()
        .unwrap();

    extract_from_bytes("id.png", png(), &cfg).await.unwrap();

    let events = progress.events.lock().unwrap().clone();
    assert_eq!(events.first().map(String::as_str), Some("start:id.png"));
    assert_eq!(events.last().map(String::as_str), Some("complete:1/0/0"));
    for stage in ["detect", "rasterise", "text", "faces", "analysis"] {
        assert!(
            events.contains(&format!("done:{stage}")),
            "missing {stage} in {events:?}"
        );
    }
}

#[tokio::test]
async fn inspect_reads_metadata_only() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "card.png", &png());

    let info = inspect(&path).await.unwrap();
    assert_eq!(info.format, DocumentFormat::Image);
    assert_eq!(info.file_name, "card.png");
    assert_eq!(info.page_count, Some(1));
    assert!(info.size_bytes > 0);
}

#[tokio::test]
async fn inspect_password_is_ignored_for_images() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "card.png", &png());

    let info = inspect_with_password(&path, Some("secret")).await.unwrap();
    assert_eq!(info.format, DocumentFormat::Image);
    assert_eq!(info.page_count, Some(1));
}
