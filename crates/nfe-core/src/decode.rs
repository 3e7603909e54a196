//! Turning uploaded image bytes into an RGB bitmap.
//!
//! PNG and JPEG are decoded in process. HEIC/HEIF goes through libheif's
//! `heif-convert`, whose availability is probed once in
//! [`DocumentDecoder::initialize`] instead of on every request.

use std::process::Command;

use image::DynamicImage;
use tracing::{debug, info, warn};

use crate::error::DecodeError;
use crate::models::config::ImageConfig;
use crate::models::DocumentKind;

/// Check if a binary is available on `PATH`.
pub fn check_binary(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Image decoder with optional HEIC/HEIF support.
#[derive(Debug, Clone)]
pub struct DocumentDecoder {
    heif_convert: Option<String>,
}

impl DocumentDecoder {
    /// Probe optional format support. Call once at startup.
    pub fn initialize(config: &ImageConfig) -> Self {
        let heif_convert = if !config.enable_heif {
            debug!("HEIC/HEIF support disabled by configuration");
            None
        } else if check_binary(&config.heif_convert_binary) {
            info!("HEIC/HEIF support enabled via {}", config.heif_convert_binary);
            Some(config.heif_convert_binary.clone())
        } else {
            warn!(
                "{} not found, HEIC/HEIF uploads will be rejected (install libheif-examples)",
                config.heif_convert_binary
            );
            None
        };

        Self { heif_convert }
    }

    /// Decoder for PNG and JPEG only.
    pub fn without_heif() -> Self {
        Self { heif_convert: None }
    }

    /// Whether HEIC/HEIF uploads can be decoded.
    pub fn supports_heif(&self) -> bool {
        self.heif_convert.is_some()
    }

    /// Decode image bytes into an RGB bitmap.
    ///
    /// `kind` must be [`DocumentKind::Image`] or [`DocumentKind::Heif`];
    /// PDFs are rasterized by the PDF module instead.
    pub fn decode_image(&self, bytes: &[u8], kind: DocumentKind) -> Result<DynamicImage, DecodeError> {
        let image = match kind {
            DocumentKind::Heif => self.decode_heif(bytes)?,
            DocumentKind::Image | DocumentKind::Pdf => image::load_from_memory(bytes)?,
        };

        debug!("Decoded {}x{} image", image.width(), image.height());
        Ok(DynamicImage::ImageRgb8(image.to_rgb8()))
    }

    fn decode_heif(&self, bytes: &[u8]) -> Result<DynamicImage, DecodeError> {
        let binary = self.heif_convert.as_deref().ok_or_else(|| {
            DecodeError::HeifUnavailable("heif-convert is not installed".to_string())
        })?;

        let temp_dir = tempfile::tempdir()?;
        let input = temp_dir.path().join("upload.heic");
        let output = temp_dir.path().join("upload.png");
        std::fs::write(&input, bytes)?;

        let result = Command::new(binary).arg(&input).arg(&output).output()?;
        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(DecodeError::HeifConversion(stderr.trim().to_string()));
        }

        Ok(image::open(&output)?)
    }
}

impl Default for DocumentDecoder {
    fn default() -> Self {
        Self::initialize(&ImageConfig::default())
    }
}
