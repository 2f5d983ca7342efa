//! Configuration types for document extraction.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. Collaborators (OCR engine, face
//! detector, hosted model) can either be injected directly or described by
//! name/command and constructed per run in [`crate::extract`].

use crate::engine::{FaceDetector, HostedModel, OcrEngine};
use crate::error::ExtractError;
use crate::progress::ProgressCallback;
use crate::schema::FieldSchema;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Model used when a provider name is given without a model.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Configuration for a single extraction run.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_idextract::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .ocr_language("eng+deu")
///     .min_face_confidence(0.7)
///     .model("gpt-4.1-mini")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    // ── Rasterisation ────────────────────────────────────────────────────
    /// Maximum rendered image dimension (width or height) in pixels. Default: 2000.
    ///
    /// Caps PDF page renders and the size of images sent to a vision model.
    pub max_rendered_pixels: u32,

    /// PDF page selection. Default: All pages. Ignored for DOCX and images.
    pub pages: PageSelection,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    // ── Text ─────────────────────────────────────────────────────────────
    /// OCR runs when the native text has fewer non-whitespace characters
    /// than this. Default: 1 (OCR only when there is no native text).
    pub min_native_chars: usize,

    /// Tesseract language code(s), e.g. `"eng"` or `"eng+fra"`. Default: "eng".
    pub ocr_language: String,

    /// Tesseract executable. Default: "tesseract".
    pub tesseract_command: String,

    /// Pre-constructed OCR engine. Takes precedence over `tesseract_command`.
    pub ocr: Option<Arc<dyn OcrEngine>>,

    // ── Faces ────────────────────────────────────────────────────────────
    /// Disable face location entirely. Default: false.
    pub skip_faces: bool,

    /// Detections below this confidence are discarded. Range: 0.0–1.0. Default: 0.5.
    pub min_face_confidence: f32,

    /// Fraction of the box size added on each side before cropping.
    /// Range: 0.0–1.0. Default: 0.1.
    pub face_padding: f32,

    /// External face-detection command line, run as
    /// `<command> --image <png>`.
    pub face_command: Option<String>,

    /// Ask the hosted model for face boxes when no other detector is
    /// configured. Default: true.
    pub vision_faces: bool,

    /// Pre-constructed face detector. Takes precedence over `face_command`.
    pub face_detector: Option<Arc<dyn FaceDetector>>,

    // ── Analysis ─────────────────────────────────────────────────────────
    /// LLM model identifier, e.g. "gpt-4.1-nano", "claude-sonnet-4-20250514".
    pub model: Option<String>,

    /// LLM provider name: "openai", "ollama", "lmstudio" or "mock".
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Pre-constructed hosted model. Takes precedence over every provider
    /// setting.
    pub hosted_model: Option<Arc<dyn HostedModel>>,

    /// Sampling temperature. Default: 0.0.
    pub temperature: f32,

    /// Maximum tokens the model may generate per call. Default: 1024.
    pub max_tokens: usize,

    /// Per-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Custom analysis system prompt. If None, uses the built-in default.
    pub system_prompt: Option<String>,

    /// Fields to extract. Default: the personal-identification schema.
    pub schema: FieldSchema,

    /// Document text beyond this many characters is cut from the prompt.
    /// Default: 24 000.
    pub max_prompt_chars: usize,

    /// Analyse the first page image directly when text analysis found
    /// nothing. Default: true.
    pub vision_fallback: bool,

    /// Optional progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_rendered_pixels: 2000,
            pages: PageSelection::default(),
            password: None,
            min_native_chars: 1,
            ocr_language: "eng".into(),
            tesseract_command: "tesseract".into(),
            ocr: None,
            skip_faces: false,
            min_face_confidence: 0.5,
            face_padding: 0.1,
            face_command: None,
            vision_faces: true,
            face_detector: None,
            model: None,
            provider_name: None,
            provider: None,
            hosted_model: None,
            temperature: 0.0,
            max_tokens: 1024,
            api_timeout_secs: 60,
            system_prompt: None,
            schema: FieldSchema::default(),
            max_prompt_chars: 24_000,
            vision_fallback: true,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("pages", &self.pages)
            .field("min_native_chars", &self.min_native_chars)
            .field("ocr_language", &self.ocr_language)
            .field("tesseract_command", &self.tesseract_command)
            .field("ocr", &self.ocr.as_ref().map(|o| o.name().to_string()))
            .field("skip_faces", &self.skip_faces)
            .field("min_face_confidence", &self.min_face_confidence)
            .field("face_padding", &self.face_padding)
            .field("face_command", &self.face_command)
            .field("vision_faces", &self.vision_faces)
            .field(
                "face_detector",
                &self.face_detector.as_ref().map(|d| d.name().to_string()),
            )
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field(
                "hosted_model",
                &self.hosted_model.as_ref().map(|m| m.name().to_string()),
            )
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("schema", &self.schema.names().collect::<Vec<_>>())
            .field("max_prompt_chars", &self.max_prompt_chars)
            .field("vision_fallback", &self.vision_fallback)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn min_native_chars(mut self, n: usize) -> Self {
        self.config.min_native_chars = n;
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = lang.into();
        self
    }

    pub fn tesseract_command(mut self, cmd: impl Into<String>) -> Self {
        self.config.tesseract_command = cmd.into();
        self
    }

    pub fn ocr(mut self, engine: Arc<dyn OcrEngine>) -> Self {
        self.config.ocr = Some(engine);
        self
    }

    pub fn skip_faces(mut self, v: bool) -> Self {
        self.config.skip_faces = v;
        self
    }

    pub fn min_face_confidence(mut self, c: f32) -> Self {
        self.config.min_face_confidence = c.clamp(0.0, 1.0);
        self
    }

    pub fn face_padding(mut self, p: f32) -> Self {
        self.config.face_padding = p.clamp(0.0, 1.0);
        self
    }

    pub fn face_command(mut self, cmd: impl Into<String>) -> Self {
        self.config.face_command = Some(cmd.into());
        self
    }

    pub fn vision_faces(mut self, v: bool) -> Self {
        self.config.vision_faces = v;
        self
    }

    pub fn face_detector(mut self, detector: Arc<dyn FaceDetector>) -> Self {
        self.config.face_detector = Some(detector);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn hosted_model(mut self, model: Arc<dyn HostedModel>) -> Self {
        self.config.hosted_model = Some(model);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n.max(1);
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs.max(1);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn schema(mut self, schema: FieldSchema) -> Self {
        self.config.schema = schema;
        self
    }

    pub fn max_prompt_chars(mut self, n: usize) -> Self {
        self.config.max_prompt_chars = n.max(1);
        self
    }

    pub fn vision_fallback(mut self, v: bool) -> Self {
        self.config.vision_fallback = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        let c = &self.config;
        if !(0.0..=1.0).contains(&c.min_face_confidence) {
            return Err(ExtractError::InvalidConfig(format!(
                "Face confidence threshold must be 0.0–1.0, got {}",
                c.min_face_confidence
            )));
        }
        if !(0.0..=1.0).contains(&c.face_padding) {
            return Err(ExtractError::InvalidConfig(format!(
                "Face padding must be 0.0–1.0, got {}",
                c.face_padding
            )));
        }
        if c.ocr_language.trim().is_empty() {
            return Err(ExtractError::InvalidConfig(
                "OCR language must not be empty".into(),
            ));
        }
        if c.tesseract_command.trim().is_empty() {
            return Err(ExtractError::InvalidConfig(
                "Tesseract command must not be empty".into(),
            ));
        }
        if let Some(cmd) = &c.face_command {
            if cmd.trim().is_empty() {
                return Err(ExtractError::InvalidConfig(
                    "Face command must not be empty".into(),
                ));
            }
        }
        if c.schema.is_empty() {
            return Err(ExtractError::InvalidConfig(
                "Field schema must contain at least one field".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Specifies which pages of a PDF to process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// Process all pages (default).
    #[default]
    All,
    /// Process a single page (1-indexed).
    Single(usize),
    /// Process a contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Process specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    /// Parse the CLI form: `"3"`, `"2-5"` or `"1,3,7"`.
    pub fn parse(s: &str) -> Result<Self, ExtractError> {
        let s = s.trim();
        let bad = || ExtractError::InvalidConfig(format!("Invalid page selection '{s}'"));
        if s.is_empty() || s.eq_ignore_ascii_case("all") {
            return Ok(PageSelection::All);
        }
        if let Some((a, b)) = s.split_once('-') {
            let start: usize = a.trim().parse().map_err(|_| bad())?;
            let end: usize = b.trim().parse().map_err(|_| bad())?;
            if start == 0 || end < start {
                return Err(bad());
            }
            return Ok(PageSelection::Range(start, end));
        }
        if s.contains(',') {
            let pages = s
                .split(',')
                .map(|p| p.trim().parse::<usize>().map_err(|_| bad()))
                .collect::<Result<Vec<_>, _>>()?;
            if pages.contains(&0) {
                return Err(bad());
            }
            return Ok(PageSelection::Set(pages));
        }
        match s.parse::<usize>() {
            Ok(0) | Err(_) => Err(bad()),
            Ok(p) => Ok(PageSelection::Single(p)),
        }
    }
}
