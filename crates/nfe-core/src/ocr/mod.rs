//! OCR engines turning a decoded page bitmap into raw text.
//!
//! Two engines are available:
//! - **Tesseract**: external binary with a character whitelist (default)
//! - **ONNX**: pure Rust engine via `pure-onnx-ocr` (feature: native)

mod tesseract;

#[cfg(feature = "native")]
mod pure_engine;

pub use tesseract::TesseractEngine;

#[cfg(feature = "native")]
pub use pure_engine::OnnxOcrEngine;

use image::DynamicImage;
use tracing::info;

use crate::error::OcrError;
use crate::models::config::{OcrConfig, OcrEngineKind};

/// An OCR engine: given an image, return the recognized text.
pub trait OcrEngine: Send + Sync {
    /// Short engine name for logs.
    fn name(&self) -> &'static str;

    /// Whether the engine can run on this machine.
    fn is_available(&self) -> bool;

    /// Recognize the text of one page.
    fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError>;
}

/// Build the engine selected in the configuration.
pub fn create_engine(config: &OcrConfig) -> Result<Box<dyn OcrEngine>, OcrError> {
    let engine: Box<dyn OcrEngine> = match config.engine {
        OcrEngineKind::Tesseract => Box::new(TesseractEngine::new(config.clone())),
        #[cfg(feature = "native")]
        OcrEngineKind::Onnx => Box::new(OnnxOcrEngine::from_dir(&config.model_dir, config.clone())?),
        #[cfg(not(feature = "native"))]
        OcrEngineKind::Onnx => {
            return Err(OcrError::NotAvailable(
                "ONNX engine requires the `native` feature".to_string(),
            ));
        }
    };

    info!("Using {} OCR engine", engine.name());
    Ok(engine)
}

/// Drop every character outside `whitelist`, keeping line breaks.
pub fn apply_whitelist(text: &str, whitelist: &str) -> String {
    if whitelist.is_empty() {
        return text.to_string();
    }
    text.chars()
        .filter(|c| *c == '\n' || whitelist.contains(*c))
        .collect()
}
