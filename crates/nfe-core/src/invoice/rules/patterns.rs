//! Common regex patterns and section labels for NFe (DANFE) extraction.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Access key after its label: skip non-digits, then 44-60 digits/whitespace
    pub static ref ACCESS_KEY_LABELED: Regex = Regex::new(
        r"(?i)chave\s*de\s*acesso[^0-9]*([0-9\s]{44,60})"
    ).unwrap();

    // Bare 44-digit run, applied after spaces and line feeds are removed
    pub static ref ACCESS_KEY_RUN: Regex = Regex::new(
        r"[0-9]{44}"
    ).unwrap();

    // Printed form: eleven blocks of 4 digits
    pub static ref ACCESS_KEY_GROUPED: Regex = Regex::new(
        r"[0-9]{4}(?:\s+[0-9]{4}){10}"
    ).unwrap();

    // CNPJ (company tax ID): dd.ddd.ddd/dddd-dd
    pub static ref CNPJ_FORMATTED: Regex = Regex::new(
        r"[0-9]{2}\.[0-9]{3}\.[0-9]{3}/[0-9]{4}-[0-9]{2}"
    ).unwrap();

    // CPF (individual tax ID): ddd.ddd.ddd-dd
    pub static ref CPF_FORMATTED: Regex = Regex::new(
        r"[0-9]{3}\.[0-9]{3}\.[0-9]{3}-[0-9]{2}"
    ).unwrap();
}

/// Labels that open the recipient block, matched against uppercased lines.
///
/// `DEST` covers OCR output where the accented letter was dropped or the
/// label was truncated.
pub const RECIPIENT_LABELS: &[&str] = &["DESTINATÁRIO", "DESTINATARIO", "DEST"];

/// Labels of the blocks that follow or precede the recipient block.
pub const SECTION_END_LABELS: &[&str] = &["EMITENTE", "PRODUTO", "FATURA", "CÁLCULO", "CALCULO"];

/// Whether an uppercased line carries any of the given labels.
pub fn contains_label(line: &str, labels: &[&str]) -> bool {
    let upper = line.to_uppercase();
    labels.iter().any(|label| upper.contains(label))
}

/// Whether the line opens the recipient section.
pub fn is_recipient_label(line: &str) -> bool {
    contains_label(line, RECIPIENT_LABELS)
}

/// Whether the line opens a section that ends the recipient window.
pub fn is_section_end(line: &str) -> bool {
    contains_label(line, SECTION_END_LABELS)
}
