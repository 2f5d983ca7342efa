//! Extraction entry points.
//!
//! [`extract`] runs the whole pipeline for one document and returns a single
//! [`ExtractionResult`]. Fatal problems (unreadable file, unsupported
//! format, no text at all) are returned as `Err`; degraded stages (analysis
//! failed, face detector crashed) are recorded in `result.warnings` and the
//! run still succeeds. Call [`ExtractionResult::into_strict`] to treat those
//! as errors too.

use crate::config::{ExtractionConfig, DEFAULT_MODEL};
use crate::engine::{
    CommandFaceDetector, FaceDetector, HostedModel, LlmModel, OcrEngine, TesseractOcr,
    VisionFaceDetector,
};
use crate::error::{ExtractError, StageError};
use crate::output::{aggregate, DocumentInfo, ExtractionResult, ExtractionStats, SavedOutput};
use crate::pipeline::analyze::{self, AnalysisOutcome};
use crate::pipeline::detect::DocumentFormat;
use crate::pipeline::faces::{self, FaceOutcome};
use crate::pipeline::input::{self, Document};
use crate::pipeline::render::{self, RasterPage};
use crate::pipeline::{docx, encode, text};
use crate::progress::Stage;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Extract text, faces and structured fields from a document on disk.
///
/// # Arguments
/// * `path`   — PDF, DOCX, JPG/JPEG, PNG, TIFF or BMP file
/// * `config` — extraction configuration
///
/// # Errors
/// Returns `Err(ExtractError)` only for fatal errors:
/// - file not found / permission denied / empty
/// - unsupported or mismatched format
/// - corrupt PDF / DOCX / image, wrong or missing PDF password
/// - no text obtainable from native extraction or OCR
pub async fn extract(
    path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionResult, ExtractError> {
    let path = path.as_ref();
    info!("Starting extraction: {}", path.display());
    notify_start(config, path);

    stage_start(config, Stage::Detect);
    let document = input::load_document(path).await?;
    stage_complete(config, Stage::Detect, &document.format().to_string());

    run(document, config).await
}

/// Extract from a document already in memory.
///
/// `file_name` supplies the extension used for format detection; nothing is
/// read from or written to disk.
///
/// # Example
/// ```rust,no_run
/// use edgequake_idextract::{extract_from_bytes, ExtractionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes = std::fs::read("passport.jpg")?;
/// let result = extract_from_bytes("passport.jpg", bytes, &ExtractionConfig::default()).await?;
/// println!("{}", serde_json::to_string_pretty(&result.record)?);
/// # Ok(())
/// # }
/// ```
pub async fn extract_from_bytes(
    file_name: impl AsRef<Path>,
    bytes: Vec<u8>,
    config: &ExtractionConfig,
) -> Result<ExtractionResult, ExtractError> {
    let path = file_name.as_ref();
    info!("Starting extraction: {} ({} bytes in memory)", path.display(), bytes.len());
    notify_start(config, path);

    stage_start(config, Stage::Detect);
    let document = input::document_from_bytes(path, bytes)?;
    stage_complete(config, Stage::Detect, &document.format().to_string());

    run(document, config).await
}

/// Synchronous wrapper around [`extract`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync(
    path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionResult, ExtractError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ExtractError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract(path, config))
}

/// Run [`extract`] and write the result under `out_dir`.
///
/// Layout:
/// ```text
/// out_dir/
/// ├── {stem}_result.json
/// └── faces/
///     ├── face_1.jpg
///     └── face_2.jpg
/// ```
///
/// Every file is written atomically (temp file + rename). The returned
/// result has `path` set on each face crop.
pub async fn extract_to_dir(
    path: impl AsRef<Path>,
    out_dir: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<SavedOutput, ExtractError> {
    let result = extract(path, config).await?;
    save_result(result, out_dir.as_ref()).await
}

/// Default output directory for a document: `extracted_{stem}` next to it.
pub fn default_output_dir(path: &Path) -> PathBuf {
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    parent.join(format!("extracted_{}", file_stem(path)))
}

/// Read document metadata without extracting content.
///
/// Does not require an LLM provider, OCR engine or face detector.
pub async fn inspect(path: impl AsRef<Path>) -> Result<DocumentInfo, ExtractError> {
    inspect_with_password(path, None).await
}

/// [`inspect`] for a password-protected PDF. The password is ignored for
/// other formats.
pub async fn inspect_with_password(
    path: impl AsRef<Path>,
    password: Option<&str>,
) -> Result<DocumentInfo, ExtractError> {
    let document = input::load_document(path.as_ref()).await?;
    match document.format() {
        DocumentFormat::Pdf => {
            let pdf = render::pdf_info(&document, password).await?;
            Ok(document_info(&document, Some(pdf.page_count), pdf.title, pdf.author))
        }
        DocumentFormat::Docx => {
            let docx = docx::load_docx(&document).await?;
            Ok(document_info(&document, docx.page_count, docx.title, docx.author))
        }
        DocumentFormat::Image => Ok(document_info(&document, Some(1), None, None)),
    }
}

// ── Pipeline ─────────────────────────────────────────────────────────────

struct Rasterised {
    info: DocumentInfo,
    native: Vec<crate::output::TextBlock>,
    pages: Vec<RasterPage>,
}

async fn rasterise(document: &Document, config: &ExtractionConfig) -> Result<Rasterised, ExtractError> {
    match document.format() {
        DocumentFormat::Pdf => {
            let pdf = render::load_pdf(
                document,
                &config.pages,
                config.password.as_deref(),
                config.max_rendered_pixels,
            )
            .await?;
            Ok(Rasterised {
                info: document_info(document, Some(pdf.page_count), pdf.title, pdf.author),
                native: text::pdf_native_blocks(&pdf.page_text),
                pages: pdf.pages,
            })
        }
        DocumentFormat::Docx => {
            let docx = docx::load_docx(document).await?;
            Ok(Rasterised {
                native: text::body_native_blocks(&docx.text),
                info: document_info(document, docx.page_count, docx.title, docx.author),
                pages: docx.pages,
            })
        }
        DocumentFormat::Image => {
            let page = render::load_image(document).await?;
            Ok(Rasterised {
                info: document_info(document, Some(1), None, None),
                native: Vec::new(),
                pages: vec![page],
            })
        }
    }
}

async fn run(document: Document, config: &ExtractionConfig) -> Result<ExtractionResult, ExtractError> {
    let total_start = Instant::now();
    let mut stats = ExtractionStats::default();

    // ── Step 1: Rasterise ────────────────────────────────────────────────
    stage_start(config, Stage::Rasterise);
    let raster_start = Instant::now();
    let Rasterised { info, native, pages } = rasterise(&document, config).await?;
    stats.rasterise_duration_ms = raster_start.elapsed().as_millis() as u64;
    stats.page_images = pages.len();
    stage_complete(config, Stage::Rasterise, &format!("{} image(s)", pages.len()));
    info!(
        "{} ready: {} page image(s), {} native text block(s)",
        document.format(),
        pages.len(),
        native.len()
    );

    // ── Step 2: Collaborators ────────────────────────────────────────────
    let ocr: Arc<dyn OcrEngine> = match &config.ocr {
        Some(engine) => Arc::clone(engine),
        None => Arc::new(TesseractOcr::new(
            config.tesseract_command.as_str(),
            config.ocr_language.as_str(),
        )),
    };
    let model = resolve_model(config);
    if let Err(e) = &model {
        warn!("No hosted model: {}", e);
    }
    let detector = if config.skip_faces {
        None
    } else {
        Some(resolve_face_detector(config, model.as_ref().ok()))
    };

    // ── Step 3: Text + analysis ‖ faces ──────────────────────────────────
    let text_branch = async {
        stage_start(config, Stage::Text);
        let started = Instant::now();
        let outcome = text::extract_text(
            document.path(),
            document.format(),
            native,
            &pages,
            ocr.as_ref(),
            config.min_native_chars,
        )
        .await?;
        let text_ms = started.elapsed().as_millis() as u64;
        report_warnings(config, Stage::Text, &outcome.warnings);
        stage_complete(
            config,
            Stage::Text,
            &format!("{} chars", outcome.text.content.chars().count()),
        );

        stage_start(config, Stage::Analysis);
        let started = Instant::now();
        let analysis = match &model {
            Ok(m) => {
                analyze::analyze_text(
                    &outcome.text.content,
                    &config.schema,
                    m.as_ref(),
                    config.system_prompt.as_deref(),
                    config.max_prompt_chars,
                )
                .await
            }
            Err(e) => AnalysisOutcome::failed(&config.schema, e.to_string()),
        };
        let analysis_ms = started.elapsed().as_millis() as u64;
        report_warnings(config, Stage::Analysis, &analysis.warnings);
        stage_complete(
            config,
            Stage::Analysis,
            &format!("{} field(s)", analysis.record.filled()),
        );

        Ok::<_, ExtractError>((outcome, text_ms, analysis, analysis_ms))
    };

    let face_branch = async {
        let Some(detector) = &detector else {
            debug!("Face location skipped");
            return (FaceOutcome::default(), 0);
        };
        stage_start(config, Stage::Faces);
        let started = Instant::now();
        let outcome = match detector {
            Ok(d) => {
                faces::locate_faces(
                    &pages,
                    d.as_ref(),
                    config.min_face_confidence,
                    config.face_padding,
                )
                .await
            }
            Err(reason) => {
                warn!("Face location unavailable: {}", reason);
                FaceOutcome::unavailable(reason.as_str())
            }
        };
        report_warnings(config, Stage::Faces, &outcome.warnings);
        stage_complete(config, Stage::Faces, &format!("{} face(s)", outcome.faces.len()));
        (outcome, started.elapsed().as_millis() as u64)
    };

    let (text_result, (face_outcome, faces_ms)) = tokio::join!(text_branch, face_branch);
    let (text_outcome, text_ms, mut analysis, analysis_ms) = text_result?;
    stats.text_duration_ms = text_ms;
    stats.faces_duration_ms = faces_ms;
    stats.analysis_duration_ms = analysis_ms;
    stats.ocr_pages = text_outcome.ocr_pages;

    // ── Step 4: Vision fallback ──────────────────────────────────────────
    if config.vision_fallback && analysis.record.is_all_null() {
        if let (Ok(m), Some(first)) = (&model, pages.first()) {
            stage_start(config, Stage::VisionFallback);
            let started = Instant::now();
            match analyze::analyze_image(
                &first.image,
                &config.schema,
                m.as_ref(),
                config.system_prompt.as_deref(),
                config.max_rendered_pixels,
            )
            .await
            {
                Ok(vision) => {
                    analysis.input_tokens += vision.input_tokens;
                    analysis.output_tokens += vision.output_tokens;
                    let filled = analysis.record.merge_missing(&vision.record);
                    report_warnings(config, Stage::VisionFallback, &vision.warnings);
                    analysis.warnings.extend(vision.warnings);
                    if filled > 0 {
                        analysis.status = vision.status;
                    }
                    stage_complete(
                        config,
                        Stage::VisionFallback,
                        &format!("{} field(s)", filled),
                    );
                }
                Err(w) => {
                    warn!("{}", w);
                    report_warnings(config, Stage::VisionFallback, std::slice::from_ref(&w));
                    analysis.warnings.push(w);
                    stage_complete(config, Stage::VisionFallback, "failed");
                }
            }
            stats.analysis_duration_ms += started.elapsed().as_millis() as u64;
        }
    }

    // ── Step 5: Aggregate ────────────────────────────────────────────────
    stats.input_tokens = analysis.input_tokens;
    stats.output_tokens = analysis.output_tokens;

    let mut warnings = text_outcome.warnings;
    warnings.extend(face_outcome.warnings);
    warnings.extend(analysis.warnings);

    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    let result = aggregate(
        info,
        text_outcome.text,
        face_outcome.faces,
        analysis.record,
        analysis.status,
        warnings,
        stats,
    );

    info!(
        "Extraction complete: {}/{} fields, {} face(s), {} warning(s), {}ms",
        result.fields_found(),
        result.record.len(),
        result.faces.len(),
        result.warnings.len(),
        result.stats.total_duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_extraction_complete(result.fields_found(), result.faces.len(), result.warnings.len());
    }

    Ok(result)
}

fn document_info(
    document: &Document,
    page_count: Option<usize>,
    title: Option<String>,
    author: Option<String>,
) -> DocumentInfo {
    DocumentInfo {
        path: document.path().to_path_buf(),
        file_name: document.file_name(),
        format: document.format(),
        size_bytes: document.size_bytes(),
        page_count,
        title,
        author,
    }
}

// ── Output ───────────────────────────────────────────────────────────────

/// Write `result` under `out_dir` in the [`extract_to_dir`] layout.
pub async fn save_result(
    mut result: ExtractionResult,
    out_dir: &Path,
) -> Result<SavedOutput, ExtractError> {
    create_dir(out_dir).await?;
    let faces_dir = out_dir.join("faces");

    if !result.faces.is_empty() {
        create_dir(&faces_dir).await?;
        for face in result.faces.iter_mut() {
            let path = faces_dir.join(format!("face_{}.jpg", face.index));
            let bytes = encode::jpeg_bytes(&face.image, encode::FACE_JPEG_QUALITY).map_err(|e| {
                ExtractError::OutputWriteFailed {
                    path: path.clone(),
                    source: std::io::Error::other(e.to_string()),
                }
            })?;
            write_atomic(&path, &bytes).await?;
            face.path = Some(path);
        }
        info!("Saved {} face image(s) to {}", result.faces.len(), faces_dir.display());
    }

    let result_path = out_dir.join(format!("{}_result.json", file_stem(&result.document.path)));
    let json = serde_json::to_vec_pretty(&result)
        .map_err(|e| ExtractError::Internal(format!("Result serialisation failed: {}", e)))?;
    write_atomic(&result_path, &json).await?;
    info!("Saved result to {}", result_path.display());

    Ok(SavedOutput {
        result,
        result_path,
        faces_dir,
    })
}

async fn create_dir(dir: &Path) -> Result<(), ExtractError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| ExtractError::OutputWriteFailed {
            path: dir.to_path_buf(),
            source: e,
        })
}

/// Write to `{path}.tmp`, then rename over `path`.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ExtractError> {
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    tokio::fs::write(&tmp_path, bytes)
        .await
        .map_err(|e| ExtractError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| ExtractError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string())
}

// ── Collaborator resolution ──────────────────────────────────────────────

/// Resolve the hosted model, from most-specific to least-specific.
///
/// 1. **Pre-built model** (`config.hosted_model`), used as-is.
/// 2. **Pre-built provider** (`config.provider`), wrapped in [`LlmModel`].
/// 3. **Named provider + model** (`config.provider_name`), via
///    [`ProviderFactory::create_llm_provider`], which reads the matching
///    API key from the environment.
/// 4. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 5. **`OPENAI_API_KEY`** present: OpenAI with `config.model` or
///    [`DEFAULT_MODEL`].
/// 6. **Full auto-detection** (`ProviderFactory::from_env`).
pub fn resolve_model(config: &ExtractionConfig) -> Result<Arc<dyn HostedModel>, ExtractError> {
    if let Some(ref model) = config.hosted_model {
        return Ok(Arc::clone(model));
    }
    let (provider, label) = resolve_provider(config)?;
    debug!("Hosted model: {}", label);
    Ok(Arc::new(LlmModel::new(provider, label, config)))
}

type Resolved = (Arc<dyn LLMProvider>, String);

fn create_provider(provider_name: &str, model: &str) -> Result<Resolved, ExtractError> {
    let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ExtractError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })?;
    Ok((provider, format!("{provider_name}/{model}")))
}

fn resolve_provider(config: &ExtractionConfig) -> Result<Resolved, ExtractError> {
    if let Some(ref provider) = config.provider {
        let label = config.model.clone().unwrap_or_else(|| "custom".to_string());
        return Ok((Arc::clone(provider), label));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ExtractError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok((llm_provider, "auto".to_string()))
}

/// Resolve the face detector.
///
/// `config.face_detector` → `config.face_command` → a
/// [`VisionFaceDetector`] over the hosted model when `vision_faces` is on.
/// `Err` carries the reason no detector is available.
pub fn resolve_face_detector(
    config: &ExtractionConfig,
    model: Option<&Arc<dyn HostedModel>>,
) -> Result<Arc<dyn FaceDetector>, String> {
    if let Some(ref detector) = config.face_detector {
        return Ok(Arc::clone(detector));
    }
    if let Some(ref line) = config.face_command {
        return CommandFaceDetector::from_command_line(line)
            .map(|d| Arc::new(d) as Arc<dyn FaceDetector>)
            .ok_or_else(|| "face command is empty".to_string());
    }
    match model {
        Some(m) if config.vision_faces => Ok(Arc::new(VisionFaceDetector::new(
            Arc::clone(m),
            config.max_rendered_pixels,
        ))),
        Some(_) => Err("no face detector configured (set a face command)".to_string()),
        None => Err(
            "no face detector configured and no hosted model for vision face location".to_string(),
        ),
    }
}

// ── Progress helpers ─────────────────────────────────────────────────────

fn notify_start(config: &ExtractionConfig, path: &Path) {
    if let Some(ref cb) = config.progress_callback {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        cb.on_extraction_start(&name);
    }
}

fn stage_start(config: &ExtractionConfig, stage: Stage) {
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage_start(stage);
    }
}

fn stage_complete(config: &ExtractionConfig, stage: Stage, detail: &str) {
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage_complete(stage, detail);
    }
}

fn report_warnings(config: &ExtractionConfig, stage: Stage, warnings: &[StageError]) {
    if let Some(ref cb) = config.progress_callback {
        for w in warnings {
            cb.on_stage_warning(stage, &w.to_string());
        }
    }
}
