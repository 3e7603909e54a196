//! Core library for NFe (Brazilian electronic invoice) OCR processing.
//!
//! This crate provides:
//! - Access key and recipient CNPJ/CPF extraction from OCR text
//! - PDF processing (first page rasterization and embedded text)
//! - Image decoding, including HEIC/HEIF through an external converter
//! - OCR engines (Tesseract, or pure Rust ONNX with the `native` feature)

pub mod decode;
pub mod error;
pub mod invoice;
pub mod models;
pub mod ocr;
pub mod pdf;
pub mod pipeline;

pub use decode::DocumentDecoder;
pub use error::{NfeError, Result};
pub use invoice::{extract, ExtractionReport, InvoiceParser, NfeParser};
pub use models::{
    AccessKey, Cnpj, Cpf, DocumentKind, ExtractionResponse, ExtractionResult, NfeConfig,
};
pub use ocr::{create_engine, OcrEngine};
pub use pdf::{PdfExtractor, PdfProcessor};
pub use pipeline::DocumentProcessor;
