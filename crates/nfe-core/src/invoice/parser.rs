//! Tiered NFe field parser.

use std::collections::HashMap;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info};

use crate::models::ExtractionResult;

use super::rules::{AccessKeyExtractor, AccessKeySource, TaxIdExtractor, TaxIdSource};

/// Result of parsing one page of OCR text, with provenance.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionReport {
    /// Extracted identifiers.
    pub result: ExtractionResult,
    /// Tier that produced the access key.
    pub access_key_source: Option<AccessKeySource>,
    /// Tier that produced the recipient tax ID.
    pub tax_id_source: Option<TaxIdSource>,
    /// Confidence per extracted field.
    pub field_confidence: HashMap<String, f32>,
    /// Extraction warnings.
    pub warnings: Vec<String>,
    /// Processing time in milliseconds.
    pub processing_time_ms: u64,
}

/// Trait for NFe text parsing.
pub trait InvoiceParser {
    /// Parse identifiers from OCR text. Never fails: missing fields are `None`.
    fn parse(&self, text: &str) -> ExtractionReport;
}

/// Parser running the access key and tax ID tiers independently.
#[derive(Debug, Clone, Default)]
pub struct NfeParser {
    access_key: AccessKeyExtractor,
    tax_id: TaxIdExtractor,
}

impl NfeParser {
    /// Create a new parser with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set how many lines are searched after a recipient label.
    pub fn with_recipient_window(mut self, lines: usize) -> Self {
        self.tax_id = self.tax_id.with_window(lines);
        self
    }

    /// Extract only the identifiers.
    pub fn extract(&self, text: &str) -> ExtractionResult {
        self.parse(text).result
    }
}

impl InvoiceParser for NfeParser {
    fn parse(&self, text: &str) -> ExtractionReport {
        let start = Instant::now();
        let mut warnings = Vec::new();
        let mut field_confidence = HashMap::new();
        let mut result = ExtractionResult::default();

        info!("Parsing NFe fields from {} characters of text", text.len());

        let access_key_source = match self.access_key.extract_with_source(text) {
            Some((source, m)) => {
                debug!("Access key found via {:?}: {}", source, m.value);
                if !m.value.has_valid_check_digit() {
                    warnings.push(format!(
                        "Access key check digit mismatch (expected {})",
                        m.value.expected_check_digit()
                    ));
                }
                field_confidence.insert("chave_acesso".to_string(), m.confidence);
                result.access_key = Some(m.value);
                Some(source)
            }
            None => {
                warnings.push("Could not extract access key".to_string());
                None
            }
        };

        let tax_id_source = match self.tax_id.extract(text) {
            Some((source, ids)) => {
                debug!("Recipient tax ID found via {:?}", source);
                if source == TaxIdSource::DocumentScan {
                    warnings.push("Recipient tax ID chosen by position, no recipient section found".to_string());
                }
                if let Some(m) = ids.cnpj {
                    field_confidence.insert("cnpj_destinatario".to_string(), m.confidence);
                    result.company_tax_id = Some(m.value);
                }
                if let Some(m) = ids.cpf {
                    field_confidence.insert("cpf_destinatario".to_string(), m.confidence);
                    result.individual_tax_id = Some(m.value);
                }
                if result.company_tax_id.is_some() && result.individual_tax_id.is_some() {
                    warnings.push("Both CNPJ and CPF recovered for the recipient".to_string());
                }
                Some(source)
            }
            None => {
                warnings.push("Could not extract recipient CNPJ/CPF".to_string());
                None
            }
        };

        let processing_time_ms = start.elapsed().as_millis() as u64;
        debug!(
            "Extraction finished in {}ms with {} warnings",
            processing_time_ms,
            warnings.len()
        );

        ExtractionReport {
            result,
            access_key_source,
            tax_id_source,
            field_confidence,
            warnings,
            processing_time_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DANFE: &str = r#"
        DANFE
        DOCUMENTO AUXILIAR DA NOTA FISCAL ELETRONICA
        CHAVE DE ACESSO
        3523 0812 3456 7800 0199 5500 1000 0001 2310 0000 0128
        IDENTIFICACAO DO EMITENTE
        ACME COMERCIO LTDA
        CNPJ 12.345.678/0001-99
        DESTINATARIO / REMETENTE
        NOME / RAZAO SOCIAL CLIENTE EXEMPLO SA
        CNPJ/CPF 98.765.432/0001-10
        CALCULO DO IMPOSTO
        DADOS DO PRODUTO / SERVICO
    "#;

    #[test]
    fn test_parse_danfe() {
        let report = NfeParser::new().parse(DANFE);

        assert_eq!(
            report.result.access_key.as_ref().map(|k| k.as_str()),
            Some("35230812345678000199550010000001231000000128")
        );
        assert_eq!(
            report.result.company_tax_id.as_ref().map(|c| c.as_str()),
            Some("98765432000110")
        );
        assert!(report.result.individual_tax_id.is_none());
        assert_eq!(report.access_key_source, Some(AccessKeySource::Labeled));
        assert_eq!(report.tax_id_source, Some(TaxIdSource::RecipientSection));
        assert!(report.warnings.is_empty(), "unexpected warnings: {:?}", report.warnings);
    }

    #[test]
    fn test_end_to_end_example() {
        let text = "...Chave de acesso 1234 5678 9012 3456 7890 1234 5678 9012 3456 7890 1234...DESTINATÁRIO\nRazão: ACME\nCNPJ: 12.345.678/0001-99\nEMITENTE...";
        let result = NfeParser::new().extract(text);

        assert_eq!(
            result.access_key.as_ref().map(|k| k.as_str()),
            Some("12345678901234567890123456789012345678901234")
        );
        assert_eq!(
            result.company_tax_id.as_ref().map(|c| c.as_str()),
            Some("12345678000199")
        );
        assert!(result.individual_tax_id.is_none());
    }

    #[test]
    fn test_check_digit_mismatch_is_only_a_warning() {
        let text = "Chave de acesso 1234 5678 9012 3456 7890 1234 5678 9012 3456 7890 1234";
        let report = NfeParser::new().parse(text);

        assert!(report.result.access_key.is_some());
        assert!(report.warnings.iter().any(|w| w.contains("check digit")));
    }

    #[test]
    fn test_fields_are_independent() {
        let report = NfeParser::new().parse("DESTINATARIO\nCPF 123.456.789-09");

        assert!(report.result.access_key.is_none());
        assert_eq!(
            report.result.individual_tax_id.as_ref().map(|c| c.as_str()),
            Some("12345678909")
        );
        assert!(report.warnings.iter().any(|w| w.contains("access key")));
    }

    #[test]
    fn test_empty_text() {
        let report = NfeParser::new().parse("");
        assert_eq!(report.result, ExtractionResult::default());
        assert!(report.access_key_source.is_none());
        assert!(report.tax_id_source.is_none());
        assert_eq!(report.warnings.len(), 2);
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let parser = NfeParser::new();
        assert_eq!(parser.extract(DANFE), parser.extract(DANFE));
    }
}
