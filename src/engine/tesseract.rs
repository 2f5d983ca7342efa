//! OCR through the `tesseract` command-line tool.
//!
//! The image is written to a temporary PNG and recognised with
//! `tesseract <png> stdout -l <lang>`. Form feeds that tesseract appends
//! after each page are stripped; the text is otherwise returned as-is.

use super::OcrEngine;
use crate::error::EngineError;
use crate::pipeline::encode;
use futures::future::BoxFuture;
use image::DynamicImage;
use std::io::ErrorKind;
use tokio::process::Command;
use tracing::debug;

/// [`OcrEngine`] backed by a local tesseract installation.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    command: String,
    language: String,
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self::new("tesseract", "eng")
    }
}

impl TesseractOcr {
    pub fn new(command: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            language: language.into(),
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    async fn run(&self, image: &DynamicImage) -> Result<String, EngineError> {
        let png = encode::png_bytes(image).map_err(|e| self.failed(format!("PNG encode: {e}")))?;

        let temp = tempfile::Builder::new()
            .prefix("ocr_")
            .suffix(".png")
            .tempfile()
            .map_err(|e| self.failed(format!("temp file: {e}")))?;
        tokio::fs::write(temp.path(), &png)
            .await
            .map_err(|e| self.failed(format!("temp file write: {e}")))?;

        debug!(
            "Running {} on {}x{} image (lang={})",
            self.command,
            image.width(),
            image.height(),
            self.language
        );

        let output = Command::new(&self.command)
            .arg(temp.path())
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    EngineError::Unavailable {
                        engine: self.command.clone(),
                        detail: "not found on PATH; install tesseract-ocr or set --tesseract"
                            .into(),
                    }
                } else {
                    self.failed(e.to_string())
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.failed(format!("{} ({})", stderr.trim(), output.status)));
        }

        Ok(clean_page_text(&String::from_utf8_lossy(&output.stdout)))
    }

    fn failed(&self, detail: String) -> EngineError {
        EngineError::Failed {
            engine: self.command.clone(),
            detail,
        }
    }
}

impl OcrEngine for TesseractOcr {
    fn name(&self) -> &str {
        &self.command
    }

    fn recognize<'a>(&'a self, image: &'a DynamicImage) -> BoxFuture<'a, Result<String, EngineError>> {
        Box::pin(self.run(image))
    }
}

fn clean_page_text(raw: &str) -> String {
    raw.replace('\x0c', "")
}
