//! NFe field extraction module.

mod parser;
pub mod rules;

pub use parser::{ExtractionReport, InvoiceParser, NfeParser};

use crate::models::ExtractionResult;

/// Extract the access key and recipient tax ID from OCR text.
///
/// Pure function: identical text always yields an identical result.
pub fn extract(text: &str) -> ExtractionResult {
    NfeParser::new().extract(text)
}
