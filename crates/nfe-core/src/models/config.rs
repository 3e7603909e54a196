//! Configuration structures for the extraction pipeline and service.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;

/// Characters the OCR engine is allowed to emit.
pub const DEFAULT_CHAR_WHITELIST: &str =
    "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz./-: ";

/// Main configuration for the nfe pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NfeConfig {
    /// OCR configuration.
    pub ocr: OcrConfig,

    /// PDF processing configuration.
    pub pdf: PdfConfig,

    /// Image decoding configuration.
    pub image: ImageConfig,

    /// Field extraction configuration.
    pub extraction: ExtractionConfig,

    /// HTTP service configuration.
    pub server: ServerConfig,
}

/// Which OCR engine recognizes the document image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrEngineKind {
    /// External `tesseract` binary.
    #[default]
    Tesseract,
    /// Pure Rust ONNX engine (requires the `native` feature and model files).
    Onnx,
}

/// OCR engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Engine to use.
    pub engine: OcrEngineKind,

    /// Path or name of the tesseract executable.
    pub tesseract_binary: String,

    /// Tesseract language pack.
    pub language: String,

    /// Tesseract OCR engine mode.
    pub oem: u8,

    /// Tesseract page segmentation mode.
    pub psm: u8,

    /// Characters the engine may emit; anything else is dropped.
    pub char_whitelist: String,

    /// Directory with `det.onnx`, `latin_rec.onnx` and `latin_dict.txt`.
    pub model_dir: PathBuf,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            engine: OcrEngineKind::Tesseract,
            tesseract_binary: "tesseract".to_string(),
            language: "eng".to_string(),
            oem: 3,
            psm: 6, // single uniform block of text
            char_whitelist: DEFAULT_CHAR_WHITELIST.to_string(),
            model_dir: PathBuf::from("models"),
        }
    }
}

/// PDF processing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfConfig {
    /// DPI for rasterizing the first page.
    pub render_dpi: u32,

    /// Use the PDF's embedded text instead of OCR when there is enough of it.
    pub prefer_embedded_text: bool,

    /// Minimum embedded text length to skip OCR.
    pub min_text_length: usize,

    /// Path or name of poppler's `pdftoppm` executable.
    pub pdftoppm_binary: String,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            render_dpi: 300,
            prefer_embedded_text: false,
            min_text_length: 50,
            pdftoppm_binary: "pdftoppm".to_string(),
        }
    }
}

/// Image decoding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Accept HEIC/HEIF uploads when the converter is installed.
    pub enable_heif: bool,

    /// Path or name of libheif's `heif-convert` executable.
    pub heif_convert_binary: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            enable_heif: true,
            heif_convert_binary: "heif-convert".to_string(),
        }
    }
}

/// Field extraction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Lines scanned from a recipient label, label line included.
    pub recipient_window: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self { recipient_window: 10 }
    }
}

/// HTTP service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,

    /// Bind port.
    pub port: u16,

    /// Required value of the `x-api-key` header; `None` disables the check.
    pub api_key: Option<String>,

    /// Maximum accepted upload size in bytes.
    pub max_upload_bytes: usize,

    /// Allowed CORS origins; empty means any origin.
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            api_key: None,
            max_upload_bytes: 20 * 1024 * 1024,
            allowed_origins: Vec::new(),
        }
    }
}

impl NfeConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_match_tesseract_setup() {
        let config = NfeConfig::default();
        assert_eq!(config.ocr.engine, OcrEngineKind::Tesseract);
        assert_eq!(config.ocr.oem, 3);
        assert_eq!(config.ocr.psm, 6);
        assert_eq!(config.pdf.render_dpi, 300);
        assert_eq!(config.extraction.recipient_window, 10);
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: NfeConfig =
            serde_json::from_str(r#"{"server": {"port": 9000}, "ocr": {"engine": "onnx"}}"#).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.ocr.engine, OcrEngineKind::Onnx);
        assert_eq!(config.ocr.language, "eng");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = NfeConfig::default();
        config.server.api_key = Some("secret".to_string());
        config.save(&path).unwrap();

        let loaded = NfeConfig::from_file(&path).unwrap();
        assert_eq!(loaded.server.api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn test_from_file_reports_bad_json_as_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = NfeConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, crate::NfeError::Config(_)));
    }

    #[test]
    fn test_from_file_reports_missing_file_as_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = NfeConfig::from_file(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, crate::NfeError::Io(_)));
    }
}
