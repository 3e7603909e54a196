//! Rule-based field extractors for NFe documents.

pub mod access_key;
pub mod patterns;
pub mod tax_id;

pub use access_key::{extract_access_key, AccessKeyExtractor, AccessKeySource};
pub use patterns::*;
pub use tax_id::{
    extract_recipient_tax_ids, scan_document, CnpjExtractor, CpfExtractor, RecipientTaxIds,
    TaxIdExtractor, TaxIdSource, DEFAULT_RECIPIENT_WINDOW,
};

/// Trait for field extractors.
pub trait FieldExtractor {
    /// The type of value this extractor produces.
    type Output;

    /// Extract the field from text.
    fn extract(&self, text: &str) -> Option<Self::Output>;

    /// Extract all occurrences of the field.
    fn extract_all(&self, text: &str) -> Vec<Self::Output>;
}

/// Extraction context with confidence scores.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionMatch<T> {
    /// Extracted value.
    pub value: T,
    /// Confidence score (0.0 - 1.0).
    pub confidence: f32,
    /// Position in source text.
    pub position: Option<(usize, usize)>,
    /// Source text that was matched.
    pub source: String,
}

impl<T> ExtractionMatch<T> {
    pub fn new(value: T, confidence: f32, source: impl Into<String>) -> Self {
        Self {
            value,
            confidence,
            position: None,
            source: source.into(),
        }
    }

    pub fn with_position(mut self, start: usize, end: usize) -> Self {
        self.position = Some((start, end));
        self
    }
}
