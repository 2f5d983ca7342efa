//! CLI binary for edgequake-idextract.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ExtractionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_idextract::{
    default_output_dir, extract, inspect_with_password, save_result, ExtractionConfig,
    ExtractionProgressCallback, ExtractionResult, FieldSchema, PageSelection, ProgressCallback,
    Stage,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a spinner naming the running stage plus one
/// log line per finished stage. The text and face branches run
/// concurrently, so lines may arrive in either order.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, file_name: &str) {
        self.bar.set_prefix("Extracting");
        self.bar.println(format!("{} {}", cyan("◆"), bold(file_name)));
    }

    fn on_stage_start(&self, stage: Stage) {
        self.bar.set_message(format!("{stage}…"));
    }

    fn on_stage_complete(&self, stage: Stage, detail: &str) {
        self.bar.println(format!(
            "  {} {:<16} {}",
            green("✓"),
            stage.to_string(),
            dim(detail)
        ));
    }

    fn on_stage_warning(&self, stage: Stage, warning: &str) {
        let msg: String = if warning.chars().count() > 100 {
            let mut s: String = warning.chars().take(99).collect();
            s.push('\u{2026}');
            s
        } else {
            warning.to_string()
        };
        self.bar.println(format!(
            "  {} {:<16} {}",
            yellow("⚠"),
            stage.to_string(),
            yellow(&msg)
        ));
    }

    fn on_extraction_complete(&self, fields_found: usize, faces: usize, warnings: usize) {
        self.bar.finish_and_clear();
        let mark = if warnings == 0 { green("✔") } else { yellow("⚠") };
        eprintln!(
            "{} {} field(s), {} face(s), {} warning(s)",
            mark,
            bold(&fields_found.to_string()),
            faces,
            warnings
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract a passport scan (writes ./extracted_passport/)
  idextract passport.pdf

  # Choose the output directory, print only the JSON path
  idextract --json-only -o out/ id_card.jpg

  # Fail on any degraded stage
  idextract --strict licence.png

  # Custom field list
  idextract --fields name,date_of_birth,id_number marksheet.docx

  # Face location through an external detector
  idextract --face-command "python3 detect_faces.py" passport.jpg

  # Document metadata only (no API key needed)
  idextract --inspect-only statement.pdf

OUTPUT:
  <out>/{stem}_result.json   text, faces, fields, warnings, stats
  <out>/faces/face_{n}.jpg   one JPEG per located face

FACE DETECTOR COMMAND:
  Invoked as `<command> --image <png>`; must print a JSON array of
  {"x","y","width","height","confidence"} objects in pixels.
  Without a command, the hosted vision model is asked for face boxes.

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, ollama, lmstudio, mock)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to an existing libpdfium — skips auto-download
  PDFIUM_AUTO_CACHE_DIR   Override the default pdfium cache directory

SETUP:
  1. Install tesseract (apt install tesseract-ocr / brew install tesseract)
  2. Set API key:     export OPENAI_API_KEY=sk-...
  3. Extract:         idextract document.pdf
"#;

/// Extract identity fields, text and face photos from documents.
#[derive(Parser, Debug)]
#[command(
    name = "idextract",
    version,
    about = "Extract identity fields, text and face photos from PDF, DOCX and image documents",
    long_about = "Extract text (native or OCR), face photographs and personal-identification \
fields from PDF, DOCX, JPG, PNG, TIFF and BMP documents. Fields are read by a hosted LLM \
(OpenAI, Ollama or LM Studio by name; other providers are auto-detected from their API keys).",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Document to process.
    input: PathBuf,

    /// Output directory [default: extracted_{stem} next to the input].
    #[arg(short, long = "output-dir", env = "IDEXTRACT_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Print only the path of the JSON result file.
    #[arg(long, env = "IDEXTRACT_JSON_ONLY")]
    json_only: bool,

    /// Exit non-zero when any stage degraded (analysis, faces, OCR).
    #[arg(long, env = "IDEXTRACT_STRICT")]
    strict: bool,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1-mini, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, ollama, lmstudio, mock.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Comma-separated field names to extract instead of the identity set.
    #[arg(long, env = "IDEXTRACT_FIELDS", conflicts_with = "schema")]
    fields: Option<String>,

    /// JSON file with the field schema: ["name", …] or {"name": "description", …}.
    #[arg(long, env = "IDEXTRACT_SCHEMA")]
    schema: Option<PathBuf>,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "IDEXTRACT_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Skip face location.
    #[arg(long, env = "IDEXTRACT_SKIP_FACES")]
    skip_faces: bool,

    /// External face detector command, invoked with `--image <png>`.
    #[arg(long, env = "IDEXTRACT_FACE_COMMAND")]
    face_command: Option<String>,

    /// Do not ask the vision model for face boxes when no command is set.
    #[arg(long, env = "IDEXTRACT_NO_VISION_FACES")]
    no_vision_faces: bool,

    /// Minimum detector confidence for a face (0.0–1.0).
    #[arg(long, env = "IDEXTRACT_MIN_FACE_CONFIDENCE", default_value_t = 0.5)]
    min_face_confidence: f32,

    /// Padding around each face as a fraction of its size.
    #[arg(long, env = "IDEXTRACT_FACE_PADDING", default_value_t = 0.1)]
    face_padding: f32,

    /// Tesseract language(s), e.g. eng or eng+fra.
    #[arg(long, env = "IDEXTRACT_OCR_LANG", default_value = "eng")]
    ocr_lang: String,

    /// Tesseract executable.
    #[arg(long, env = "IDEXTRACT_TESSERACT", default_value = "tesseract")]
    tesseract: String,

    /// Native text below this many non-whitespace characters triggers OCR.
    #[arg(long, env = "IDEXTRACT_MIN_NATIVE_CHARS", default_value_t = 1)]
    min_native_chars: usize,

    /// PDF page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "IDEXTRACT_PAGES", default_value = "all")]
    pages: String,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "IDEXTRACT_PASSWORD")]
    password: Option<String>,

    /// Longest edge of rendered page images, in pixels.
    #[arg(long, env = "IDEXTRACT_MAX_PIXELS", default_value_t = 2000)]
    max_pixels: u32,

    /// Do not retry analysis on the page image when the text yields nothing.
    #[arg(long, env = "IDEXTRACT_NO_VISION_FALLBACK")]
    no_vision_fallback: bool,

    /// Max LLM output tokens.
    #[arg(long, env = "IDEXTRACT_MAX_TOKENS", default_value_t = 1024)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "IDEXTRACT_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// LLM call timeout in seconds.
    #[arg(long, env = "IDEXTRACT_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Print document metadata only, no extraction.
    #[arg(long)]
    inspect_only: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "IDEXTRACT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "IDEXTRACT_VERBOSE")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.no_progress && !cli.json_only && !cli.verbose;
    let filter = if cli.verbose {
        "debug"
    } else if show_progress || cli.json_only {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    // ── Ensure PDFium engine is available (PDF input only) ──────────────
    if is_pdf(&cli.input) && !pdfium_auto::is_pdfium_cached() {
        ensure_pdfium(!cli.json_only)?;
    }

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let info = inspect_with_password(&cli.input, cli.password.as_deref())
            .await
            .context("Failed to inspect document")?;
        if cli.json_only {
            println!(
                "{}",
                serde_json::to_string_pretty(&info).context("Failed to serialise metadata")?
            );
        } else {
            println!("File:     {}", info.path.display());
            println!("Format:   {}", info.format);
            println!("Size:     {} bytes", info.size_bytes);
            if let Some(n) = info.page_count {
                println!("Pages:    {}", n);
            }
            if let Some(ref t) = info.title {
                println!("Title:    {}", t);
            }
            if let Some(ref a) = info.author {
                println!("Author:   {}", a);
            }
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;

    // ── Run extraction ───────────────────────────────────────────────────
    let mut result = extract(&cli.input, &config)
        .await
        .with_context(|| format!("Extraction failed for {}", cli.input.display()))?;

    if cli.strict {
        result = result
            .into_strict()
            .context("Extraction degraded (--strict)")?;
    }

    let out_dir = cli
        .output_dir
        .clone()
        .unwrap_or_else(|| default_output_dir(&cli.input));
    let saved = save_result(result, &out_dir)
        .await
        .context("Failed to write results")?;

    if cli.json_only {
        println!("{}", saved.result_path.display());
    } else {
        print_summary(&saved.result, &saved.result_path);
    }

    Ok(())
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

/// Download libpdfium on first use, with a byte progress bar when `visible`.
fn ensure_pdfium(visible: bool) -> Result<()> {
    if !visible {
        tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
            .context("Failed to download PDFium engine")?;
        return Ok(());
    }

    let dl_bar = ProgressBar::new(0);
    dl_bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS),
    );
    dl_bar.set_prefix("PDF engine");
    dl_bar.enable_steady_tick(Duration::from_millis(80));

    let bar = dl_bar.clone();
    tokio::task::block_in_place(|| {
        pdfium_auto::ensure_pdfium_library(Some(&|downloaded, total| {
            if let Some(t) = total {
                if bar.length().unwrap_or(0) != t {
                    bar.set_length(t);
                }
            }
            bar.set_position(downloaded);
        }))
    })
    .context("Failed to download PDFium engine")?;

    dl_bar.finish_with_message("ready ✓");
    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .max_rendered_pixels(cli.max_pixels)
        .pages(PageSelection::parse(&cli.pages).context("Invalid --pages")?)
        .min_native_chars(cli.min_native_chars)
        .ocr_language(cli.ocr_lang.as_str())
        .tesseract_command(cli.tesseract.as_str())
        .skip_faces(cli.skip_faces)
        .min_face_confidence(cli.min_face_confidence)
        .face_padding(cli.face_padding)
        .vision_faces(!cli.no_vision_faces)
        .vision_fallback(!cli.no_vision_fallback)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.as_str());
    }
    if let Some(ref cmd) = cli.face_command {
        builder = builder.face_command(cmd.as_str());
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.as_str());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.as_str());
    }
    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(schema) = load_schema(cli).await? {
        builder = builder.schema(schema);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

async fn load_schema(cli: &Cli) -> Result<Option<FieldSchema>> {
    if let Some(ref list) = cli.fields {
        let names = list.split(',').map(str::trim).filter(|s| !s.is_empty());
        return Ok(Some(
            FieldSchema::from_names(names).context("Invalid --fields")?,
        ));
    }
    if let Some(ref path) = cli.schema {
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read schema from {:?}", path))?;
        return Ok(Some(
            FieldSchema::from_json(&json)
                .with_context(|| format!("Invalid schema file {:?}", path))?,
        ));
    }
    Ok(None)
}

// ── Summary ──────────────────────────────────────────────────────────────────

/// `date_of_birth` → `Date Of Birth`.
fn title_case(field: &str) -> String {
    field
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(c) => c.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn print_summary(result: &ExtractionResult, result_path: &Path) {
    println!(
        "{}  {}  {}",
        bold(&result.document.file_name),
        dim(&result.document.format.to_string()),
        dim(&format!("{}ms", result.stats.total_duration_ms))
    );

    let width = result
        .record
        .keys()
        .map(|k| title_case(k).chars().count())
        .max()
        .unwrap_or(0);
    let mut any = false;
    for (field, value) in result.record.iter() {
        if let Some(v) = value {
            any = true;
            println!("  {:<width$}  {}", title_case(field), v, width = width);
        }
    }
    if !any {
        println!("  {}", dim("no personal information found"));
    }

    for face in &result.faces {
        if let Some(ref p) = face.path {
            println!(
                "  {} face {} ({:.2}) → {}",
                cyan("◉"),
                face.index,
                face.confidence,
                p.display()
            );
        }
    }

    for w in &result.warnings {
        println!("  {} {}", yellow("⚠"), w);
    }
    if !result.analysis.is_analyzed() {
        println!("  {} analysis unavailable", red("✗"));
    }

    println!(
        "  {} tokens in  /  {} tokens out",
        dim(&result.stats.input_tokens.to_string()),
        dim(&result.stats.output_tokens.to_string())
    );
    println!("{} {}", green("→"), bold(&result_path.display().to_string()));
}
