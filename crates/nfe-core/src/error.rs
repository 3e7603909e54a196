//! Error types for the nfe-core library.

use thiserror::Error;

/// Main error type for the nfe library.
///
/// Every variant is an upstream failure that prevents extraction from
/// running. Finding no identifiers is not an error.
#[derive(Error, Debug)]
pub enum NfeError {
    /// PDF processing error.
    #[error("PDF error: {0}")]
    Pdf(#[from] PdfError),

    /// OCR processing error.
    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),

    /// Document decoding error.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid JSON for [`NfeConfig`](crate::NfeConfig).
    #[error("configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

/// Errors related to PDF processing.
#[derive(Error, Debug)]
pub enum PdfError {
    /// Failed to open/parse the PDF file.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// Failed to extract text from PDF.
    #[error("failed to extract text: {0}")]
    TextExtraction(String),

    /// Failed to rasterize a page.
    #[error("failed to render page: {0}")]
    Render(String),

    /// The PDF is encrypted and cannot be processed.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,

    /// Invalid page number requested.
    #[error("invalid page number: {0}")]
    InvalidPage(u32),
}

/// Errors related to OCR processing.
#[derive(Error, Debug)]
pub enum OcrError {
    /// The engine binary or models are not installed.
    #[error("OCR engine not available: {0}")]
    NotAvailable(String),

    /// Failed to load OCR models.
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// Text recognition failed.
    #[error("text recognition failed: {0}")]
    Recognition(String),

    /// I/O error while handing the image to the engine.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to turning uploaded bytes into a bitmap.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The bytes are not a readable image.
    #[error("failed to decode image: {0}. Check that the format is supported")]
    Image(#[from] image::ImageError),

    /// HEIC/HEIF support was not initialized or its converter is missing.
    #[error("HEIC/HEIF support not available: {0}")]
    HeifUnavailable(String),

    /// The HEIC/HEIF converter ran but failed.
    #[error("HEIC/HEIF conversion failed: {0}")]
    HeifConversion(String),

    /// I/O error during conversion.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for the nfe library.
pub type Result<T> = std::result::Result<T, NfeError>;
