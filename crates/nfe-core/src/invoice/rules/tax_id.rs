//! Recipient CNPJ/CPF extraction.
//!
//! The recipient section of a DANFE is located by its label and a bounded
//! window of lines after it is searched for formatted tax IDs. When that
//! finds nothing, every formatted tax ID in the document is collected and
//! the recipient is guessed by position: the issuer's CNPJ is printed first,
//! so the second CNPJ is taken.

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::patterns::{is_recipient_label, is_section_end, CNPJ_FORMATTED, CPF_FORMATTED};
use super::{ExtractionMatch, FieldExtractor};
use crate::models::{Cnpj, Cpf};

/// Default number of lines searched from a recipient label, label included.
pub const DEFAULT_RECIPIENT_WINDOW: usize = 10;

/// Which tier recovered the recipient tax ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxIdSource {
    /// Found in the lines following a recipient label.
    RecipientSection,
    /// Picked from all tax IDs in the document by position.
    DocumentScan,
}

impl TaxIdSource {
    /// Confidence attached to matches from this tier.
    pub fn confidence(self) -> f32 {
        match self {
            Self::RecipientSection => 0.9,
            Self::DocumentScan => 0.5,
        }
    }
}

/// Formatted CNPJ extractor (`dd.ddd.ddd/dddd-dd`).
#[derive(Debug, Default, Clone, Copy)]
pub struct CnpjExtractor;

impl FieldExtractor for CnpjExtractor {
    type Output = ExtractionMatch<Cnpj>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        CNPJ_FORMATTED
            .find_iter(text)
            .filter_map(|m| {
                Cnpj::from_formatted(m.as_str()).map(|cnpj| {
                    ExtractionMatch::new(cnpj, 1.0, m.as_str()).with_position(m.start(), m.end())
                })
            })
            .collect()
    }
}

/// Formatted CPF extractor (`ddd.ddd.ddd-dd`).
#[derive(Debug, Default, Clone, Copy)]
pub struct CpfExtractor;

impl FieldExtractor for CpfExtractor {
    type Output = ExtractionMatch<Cpf>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        CPF_FORMATTED
            .find_iter(text)
            .filter_map(|m| {
                Cpf::from_formatted(m.as_str()).map(|cpf| {
                    ExtractionMatch::new(cpf, 1.0, m.as_str()).with_position(m.start(), m.end())
                })
            })
            .collect()
    }
}

/// Recipient tax IDs found by one tier.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecipientTaxIds {
    pub cnpj: Option<ExtractionMatch<Cnpj>>,
    pub cpf: Option<ExtractionMatch<Cpf>>,
}

impl RecipientTaxIds {
    /// Whether either ID is held.
    pub fn any(&self) -> bool {
        self.cnpj.is_some() || self.cpf.is_some()
    }

    /// Fill still-empty fields from the first matches on `line`.
    fn fill_from_line(&mut self, line: &str) {
        if self.cnpj.is_none() {
            self.cnpj = CnpjExtractor.extract(line);
        }
        if self.cpf.is_none() {
            self.cpf = CpfExtractor.extract(line);
        }
    }

    fn with_confidence(mut self, confidence: f32) -> Self {
        if let Some(m) = self.cnpj.as_mut() {
            m.confidence = confidence;
        }
        if let Some(m) = self.cpf.as_mut() {
            m.confidence = confidence;
        }
        self
    }
}

/// Recipient CNPJ/CPF extractor.
#[derive(Debug, Clone)]
pub struct TaxIdExtractor {
    window: usize,
}

impl TaxIdExtractor {
    /// Create an extractor with the default 10-line window.
    pub fn new() -> Self {
        Self {
            window: DEFAULT_RECIPIENT_WINDOW,
        }
    }

    /// Set how many lines are searched from a recipient label.
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window.max(1);
        self
    }

    /// Run both tiers; `None` when neither finds a tax ID.
    pub fn extract(&self, text: &str) -> Option<(TaxIdSource, RecipientTaxIds)> {
        let section = self.scan_recipient_sections(text);
        if section.any() {
            let confidence = TaxIdSource::RecipientSection.confidence();
            return Some((TaxIdSource::RecipientSection, section.with_confidence(confidence)));
        }

        let scanned = scan_document(text);
        if scanned.any() {
            let confidence = TaxIdSource::DocumentScan.confidence();
            return Some((TaxIdSource::DocumentScan, scanned.with_confidence(confidence)));
        }

        None
    }

    /// Tier 1: search the window after every recipient label.
    ///
    /// Fields are filled at most once across all windows, so a CNPJ found
    /// under the first label is kept while a later window may still supply
    /// the CPF.
    pub fn scan_recipient_sections(&self, text: &str) -> RecipientTaxIds {
        let lines: Vec<&str> = text.lines().collect();

        lines
            .iter()
            .enumerate()
            .filter(|(_, line)| is_recipient_label(line))
            .fold(RecipientTaxIds::default(), |found, (start, _)| {
                let end = (start + self.window).min(lines.len());
                trace!("Scanning recipient window lines {}..{}", start, end);
                scan_window(&lines[start..end], found)
            })
    }
}

impl Default for TaxIdExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Scan one window in order, stopping after the first line that ends the
/// section once a candidate is held. The boundary line itself is searched.
fn scan_window(window: &[&str], mut found: RecipientTaxIds) -> RecipientTaxIds {
    for line in window {
        found.fill_from_line(line);
        if found.any() && is_section_end(line) {
            break;
        }
    }
    found
}

/// Tier 2: all formatted tax IDs in the document.
///
/// CNPJ: the second occurrence when there are several, else the only one.
/// CPF: the first occurrence.
pub fn scan_document(text: &str) -> RecipientTaxIds {
    let cnpjs = CnpjExtractor.extract_all(text);
    let cpf = CpfExtractor.extract(text);

    let cnpj = match cnpjs.len() {
        0 => None,
        1 => cnpjs.into_iter().next(),
        _ => cnpjs.into_iter().nth(1),
    };

    RecipientTaxIds { cnpj, cpf }
}

/// Extract the recipient CNPJ and CPF from text.
pub fn extract_recipient_tax_ids(text: &str) -> (Option<Cnpj>, Option<Cpf>) {
    match TaxIdExtractor::new().extract(text) {
        Some((_, ids)) => (ids.cnpj.map(|m| m.value), ids.cpf.map(|m| m.value)),
        None => (None, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn cnpj_of(ids: &RecipientTaxIds) -> Option<&str> {
        ids.cnpj.as_ref().map(|m| m.value.as_str())
    }

    fn cpf_of(ids: &RecipientTaxIds) -> Option<&str> {
        ids.cpf.as_ref().map(|m| m.value.as_str())
    }

    #[test]
    fn test_recipient_section_cnpj() {
        let text = "EMITENTE\nCNPJ 11.111.111/0001-11\nDESTINATÁRIO / REMETENTE\nNOME ACME LTDA\nCNPJ/CPF 22.222.222/0001-22\nFATURA";
        let (source, ids) = TaxIdExtractor::new().extract(text).unwrap();

        assert_eq!(source, TaxIdSource::RecipientSection);
        assert_eq!(cnpj_of(&ids), Some("22222222000122"));
        assert_eq!(cpf_of(&ids), None);
    }

    #[test]
    fn test_recipient_section_cpf() {
        let text = "DESTINATARIO\nJOAO DA SILVA\nCPF 123.456.789-09\n";
        let (source, ids) = TaxIdExtractor::new().extract(text).unwrap();

        assert_eq!(source, TaxIdSource::RecipientSection);
        assert_eq!(cnpj_of(&ids), None);
        assert_eq!(cpf_of(&ids), Some("12345678909"));
    }

    #[test]
    fn test_window_is_bounded() {
        // label on line 0, CNPJ on line 10: outside a 10-line window
        let mut lines = vec!["DESTINATARIO"];
        lines.extend(std::iter::repeat("...").take(9));
        lines.push("22.222.222/0001-22");
        let text = lines.join("\n");

        let section = TaxIdExtractor::new().scan_recipient_sections(&text);
        assert!(!section.any());

        // tier 2 still finds the only CNPJ
        let (source, ids) = TaxIdExtractor::new().extract(&text).unwrap();
        assert_eq!(source, TaxIdSource::DocumentScan);
        assert_eq!(cnpj_of(&ids), Some("22222222000122"));
    }

    #[test]
    fn test_window_size_is_configurable() {
        let text = "DEST\na\nb\n123.456.789-09";
        assert!(!TaxIdExtractor::new().with_window(3).scan_recipient_sections(text).any());
        assert!(TaxIdExtractor::new().with_window(4).scan_recipient_sections(text).any());
    }

    #[test]
    fn test_stops_at_next_section_after_candidate() {
        let text = "DESTINATARIO\nCNPJ 22.222.222/0001-22\nCALCULO DO IMPOSTO\nCPF 123.456.789-09";
        let ids = TaxIdExtractor::new().scan_recipient_sections(text);

        assert_eq!(cnpj_of(&ids), Some("22222222000122"));
        assert_eq!(cpf_of(&ids), None);
    }

    #[test]
    fn test_section_label_before_candidate_does_not_stop() {
        let text = "DESTINATARIO\nPRODUTOR RURAL\nCPF 123.456.789-09";
        let ids = TaxIdExtractor::new().scan_recipient_sections(text);
        assert_eq!(cpf_of(&ids), Some("12345678909"));
    }

    #[test]
    fn test_boundary_line_is_still_searched() {
        let text = "DESTINATARIO\nCNPJ 22.222.222/0001-22\nEMITENTE CPF 123.456.789-09";
        let ids = TaxIdExtractor::new().scan_recipient_sections(text);
        assert_eq!(cnpj_of(&ids), Some("22222222000122"));
        assert_eq!(cpf_of(&ids), Some("12345678909"));
    }

    #[test]
    fn test_later_label_fills_missing_field_only() {
        let text = "DESTINATARIO\n22.222.222/0001-22\nEMITENTE\nDEST\n33.333.333/0001-33\n123.456.789-09";
        let ids = TaxIdExtractor::new().scan_recipient_sections(text);

        assert_eq!(cnpj_of(&ids), Some("22222222000122"));
        assert_eq!(cpf_of(&ids), Some("12345678909"));
    }

    #[test]
    fn test_fallback_picks_second_cnpj() {
        let text = "EMITENTE\n11.111.111/0001-11\nCLIENTE\n22.222.222/0001-22\nTRANSPORTADOR 33.333.333/0001-33";
        let (source, ids) = TaxIdExtractor::new().extract(text).unwrap();

        assert_eq!(source, TaxIdSource::DocumentScan);
        assert_eq!(cnpj_of(&ids), Some("22222222000122"));
        assert_eq!(ids.cnpj.unwrap().confidence, TaxIdSource::DocumentScan.confidence());
    }

    #[test]
    fn test_fallback_single_cnpj() {
        let (cnpj, cpf) = extract_recipient_tax_ids("CNPJ: 11.111.111/0001-11");
        assert_eq!(cnpj.unwrap().as_str(), "11111111000111");
        assert!(cpf.is_none());
    }

    #[test]
    fn test_fallback_can_populate_both() {
        let (cnpj, cpf) =
            extract_recipient_tax_ids("11.111.111/0001-11\n123.456.789-09\n987.654.321-00");
        assert_eq!(cnpj.unwrap().as_str(), "11111111000111");
        assert_eq!(cpf.unwrap().as_str(), "12345678909");
    }

    #[test]
    fn test_no_tax_ids() {
        assert!(TaxIdExtractor::new().extract("DESTINATARIO\nsem documento").is_none());
        assert_eq!(extract_recipient_tax_ids(""), (None, None));
    }
}
