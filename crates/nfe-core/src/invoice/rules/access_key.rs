//! Access key (chave de acesso) extraction.
//!
//! Three tiers are tried in order, stopping at the first hit:
//! 1. the printed label followed by 44 digits, possibly split by whitespace;
//! 2. any 44-digit run once spaces and line feeds are removed from the text;
//! 3. the printed grouping of eleven 4-digit blocks.

use serde::{Deserialize, Serialize};

use super::patterns::{ACCESS_KEY_GROUPED, ACCESS_KEY_LABELED, ACCESS_KEY_RUN};
use super::{ExtractionMatch, FieldExtractor};
use crate::models::AccessKey;

/// Which tier recovered the access key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessKeySource {
    /// Digits following the "chave de acesso" label.
    Labeled,
    /// First 44-digit run once spaces and line feeds are removed.
    ContiguousRun,
    /// Eleven whitespace-separated 4-digit blocks.
    Grouped,
}

impl AccessKeySource {
    /// Confidence attached to matches from this tier.
    pub fn confidence(self) -> f32 {
        match self {
            Self::Labeled => 0.95,
            Self::ContiguousRun => 0.8,
            Self::Grouped => 0.7,
        }
    }
}

/// Access key field extractor.
#[derive(Debug, Default, Clone, Copy)]
pub struct AccessKeyExtractor;

impl AccessKeyExtractor {
    /// Create a new access key extractor.
    pub fn new() -> Self {
        Self
    }

    /// Run the tiers in order and report which one matched.
    pub fn extract_with_source(
        &self,
        text: &str,
    ) -> Option<(AccessKeySource, ExtractionMatch<AccessKey>)> {
        find_labeled(text)
            .map(|m| (AccessKeySource::Labeled, m))
            .or_else(|| find_contiguous_run(text).map(|m| (AccessKeySource::ContiguousRun, m)))
            .or_else(|| find_grouped(text).map(|m| (AccessKeySource::Grouped, m)))
    }
}

impl FieldExtractor for AccessKeyExtractor {
    type Output = ExtractionMatch<AccessKey>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_with_source(text).map(|(_, m)| m)
    }

    /// One candidate per tier that matched, best tier first, without duplicates.
    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        let mut results: Vec<Self::Output> = Vec::new();

        for candidate in [find_labeled(text), find_contiguous_run(text), find_grouped(text)]
            .into_iter()
            .flatten()
        {
            if !results.iter().any(|r| r.value == candidate.value) {
                results.push(candidate);
            }
        }

        results
    }
}

/// Tier 1: the label, any non-digits, then 44-60 digits and whitespace.
///
/// Only the first labeled match is considered; it is accepted only when
/// exactly 44 digits remain after stripping.
pub fn find_labeled(text: &str) -> Option<ExtractionMatch<AccessKey>> {
    let caps = ACCESS_KEY_LABELED.captures(text)?;
    let digits = caps.get(1)?;
    let key = AccessKey::parse(digits.as_str())?;

    let full_match = caps.get(0)?;
    Some(
        ExtractionMatch::new(key, AccessKeySource::Labeled.confidence(), full_match.as_str())
            .with_position(full_match.start(), full_match.end()),
    )
}

/// Tier 2: first 44-digit run after removing spaces and line feeds.
///
/// Tabs, carriage returns and other whitespace stay in place, so blocks
/// separated by them are left to tier 3. Positions are not reported since
/// they refer to the stripped text.
pub fn find_contiguous_run(text: &str) -> Option<ExtractionMatch<AccessKey>> {
    let compact: String = text.chars().filter(|c| !matches!(*c, ' ' | '\n')).collect();
    let run = ACCESS_KEY_RUN.find(&compact)?;
    let key = AccessKey::parse(run.as_str())?;

    Some(ExtractionMatch::new(
        key,
        AccessKeySource::ContiguousRun.confidence(),
        run.as_str(),
    ))
}

/// Tier 3: eleven 4-digit blocks separated by whitespace in the original text.
pub fn find_grouped(text: &str) -> Option<ExtractionMatch<AccessKey>> {
    let m = ACCESS_KEY_GROUPED.find(text)?;
    let key = AccessKey::parse(m.as_str())?;

    Some(
        ExtractionMatch::new(key, AccessKeySource::Grouped.confidence(), m.as_str())
            .with_position(m.start(), m.end()),
    )
}

/// Extract the access key from text.
pub fn extract_access_key(text: &str) -> Option<AccessKey> {
    AccessKeyExtractor::new().extract(text).map(|m| m.value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const KEY: &str = "35230812345678000199550010000001231000000128";
    const KEY_SPACED: &str = "3523 0812 3456 7800 0199 5500 1000 0001 2310 0000 0128";

    #[test]
    fn test_labeled_key_with_spaces() {
        let text = format!("DANFE\nCHAVE DE ACESSO\n{}\nConsulta de autenticidade", KEY_SPACED);
        let (source, m) = AccessKeyExtractor::new().extract_with_source(&text).unwrap();

        assert_eq!(source, AccessKeySource::Labeled);
        assert_eq!(m.value.as_str(), KEY);
        assert!(m.position.is_some());
    }

    #[test]
    fn test_labeled_is_case_insensitive() {
        let text = format!("chave de acesso: {}", KEY);
        assert_eq!(find_labeled(&text).unwrap().value.as_str(), KEY);

        let text = format!("ChaveDeAcesso {}", KEY);
        assert_eq!(find_labeled(&text).unwrap().value.as_str(), KEY);
    }

    #[test]
    fn test_labeled_rejects_wrong_digit_count() {
        // 45 digits after the label: tier 1 refuses, tier 2 takes the first 44
        let text = format!("Chave de acesso {}9", KEY);
        assert!(find_labeled(&text).is_none());

        let (source, m) = AccessKeyExtractor::new().extract_with_source(&text).unwrap();
        assert_eq!(source, AccessKeySource::ContiguousRun);
        assert_eq!(m.value.as_str(), KEY);
    }

    #[test]
    fn test_unlabeled_run() {
        let text = format!("Protocolo de autorizacao\n{}\nfim", KEY);
        let (source, m) = AccessKeyExtractor::new().extract_with_source(&text).unwrap();

        assert_eq!(source, AccessKeySource::ContiguousRun);
        assert_eq!(m.value.as_str(), KEY);
        assert!(m.position.is_none());
    }

    #[test]
    fn test_run_split_across_lines() {
        let text = "35230812345678000199550\n010000001231000000128";
        assert_eq!(extract_access_key(text).unwrap().as_str(), KEY);
    }

    #[test]
    fn test_grouped_form() {
        let m = find_grouped(&format!("numero {} emitido", KEY_SPACED)).unwrap();
        assert_eq!(m.value.as_str(), KEY);
    }

    #[test]
    fn test_tab_separated_blocks_fall_through_to_grouped() {
        let text = format!("numero\n{}\nemitido", KEY_SPACED.replace(' ', "\t"));
        let (source, m) = AccessKeyExtractor::new().extract_with_source(&text).unwrap();

        assert_eq!(source, AccessKeySource::Grouped);
        assert_eq!(m.value.as_str(), KEY);
        assert!(m.position.is_some());
    }

    #[test]
    fn test_tab_keeps_neighbouring_digits_out_of_run() {
        let text = format!("FOLHA 01\t{}", KEY);
        let (source, m) = AccessKeyExtractor::new().extract_with_source(&text).unwrap();

        assert_eq!(source, AccessKeySource::ContiguousRun);
        assert_eq!(m.value.as_str(), KEY);
    }

    #[test]
    fn test_crlf_split_run_is_not_joined() {
        // A carriage return is not removed, so the two halves never join
        let text = "35230812345678000199550\r\n010000001231000000128";
        assert!(find_contiguous_run(text).is_none());
    }

    #[test]
    fn test_no_key() {
        let text = "NF-e 000.000.123 SERIE 001\nCNPJ 12.345.678/0001-99\n1234 5678";
        assert!(extract_access_key(text).is_none());
    }

    #[test]
    fn test_extract_all_deduplicates() {
        let text = format!("Chave de acesso {}", KEY_SPACED);
        let all = AccessKeyExtractor::new().extract_all(&text);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].confidence, AccessKeySource::Labeled.confidence());
    }
}
