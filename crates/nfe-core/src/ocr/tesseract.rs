//! Tesseract OCR engine.
//!
//! Runs the `tesseract` command line tool on a temporary PNG with a fixed
//! configuration: LSTM engine, single-block segmentation and a character
//! whitelist limited to what appears in access keys and tax IDs.

use std::path::Path;
use std::process::Command;
use std::time::Instant;

use image::{DynamicImage, ImageFormat};
use tracing::{debug, info};

use super::OcrEngine;
use crate::error::OcrError;
use crate::models::config::OcrConfig;

/// Tesseract OCR engine.
pub struct TesseractEngine {
    config: OcrConfig,
}

impl TesseractEngine {
    /// Create a new engine with the given configuration.
    pub fn new(config: OcrConfig) -> Self {
        Self { config }
    }

    /// Command line arguments following the input and output paths.
    pub fn arguments(&self) -> Vec<String> {
        let mut args = vec![
            "-l".to_string(),
            self.config.language.clone(),
            "--oem".to_string(),
            self.config.oem.to_string(),
            "--psm".to_string(),
            self.config.psm.to_string(),
        ];
        if !self.config.char_whitelist.is_empty() {
            args.push("-c".to_string());
            args.push(format!("tessedit_char_whitelist={}", self.config.char_whitelist));
        }
        args
    }

    /// Run tesseract on an image file.
    fn run_tesseract(&self, image_path: &Path) -> Result<String, OcrError> {
        let output = Command::new(&self.config.tesseract_binary)
            .arg(image_path)
            .arg("stdout")
            .args(self.arguments())
            .output();

        match output {
            Ok(output) if output.status.success() => {
                Ok(String::from_utf8_lossy(&output.stdout).to_string())
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(OcrError::Recognition(format!("tesseract failed: {}", stderr.trim())))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(OcrError::NotAvailable(
                format!("{} not found (install tesseract-ocr)", self.config.tesseract_binary),
            )),
            Err(e) => Err(OcrError::Io(e)),
        }
    }
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::new(OcrConfig::default())
    }
}

impl OcrEngine for TesseractEngine {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    fn is_available(&self) -> bool {
        Command::new(&self.config.tesseract_binary)
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError> {
        let start = Instant::now();

        let file = tempfile::Builder::new().suffix(".png").tempfile()?;
        image
            .save_with_format(file.path(), ImageFormat::Png)
            .map_err(|e| OcrError::Recognition(format!("failed to write page image: {}", e)))?;
        debug!("Wrote {}x{} page to {}", image.width(), image.height(), file.path().display());

        let text = self.run_tesseract(file.path())?;

        info!(
            "Tesseract recognized {} characters in {}ms",
            text.len(),
            start.elapsed().as_millis()
        );
        Ok(text)
    }
}
