//! NFe identifier types and extraction results.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Number of digits in an NFe access key.
pub const ACCESS_KEY_LEN: usize = 44;

/// Number of digits in a CNPJ.
pub const CNPJ_LEN: usize = 14;

/// Number of digits in a CPF.
pub const CPF_LEN: usize = 11;

fn digits_only(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// A 44-digit NFe access key (chave de acesso), stored without separators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccessKey(String);

impl AccessKey {
    /// Parse an access key, ignoring any separators between the digits.
    ///
    /// Returns `None` unless exactly 44 digits remain.
    pub fn parse(value: &str) -> Option<Self> {
        let digits = digits_only(value);
        (digits.len() == ACCESS_KEY_LEN).then_some(Self(digits))
    }

    /// The normalized 44-digit string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Human-readable form: eleven 4-digit blocks separated by spaces.
    pub fn formatted(&self) -> String {
        self.0
            .as_bytes()
            .chunks(4)
            .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Split the key into the fields of the NFe key layout.
    pub fn components(&self) -> AccessKeyComponents<'_> {
        let k = self.0.as_str();
        AccessKeyComponents {
            uf_code: &k[0..2],
            year_month: &k[2..6],
            issuer_cnpj: &k[6..20],
            model: &k[20..22],
            series: &k[22..25],
            number: &k[25..34],
            emission_type: &k[34..35],
            numeric_code: &k[35..43],
            check_digit: &k[43..44],
        }
    }

    /// Compute the modulo-11 check digit over the first 43 digits.
    ///
    /// Weights 2..=9 are applied right to left, cycling. A remainder of 0 or 1
    /// yields a check digit of 0.
    pub fn expected_check_digit(&self) -> u32 {
        let sum: u32 = self.0[..ACCESS_KEY_LEN - 1]
            .chars()
            .rev()
            .filter_map(|c| c.to_digit(10))
            .zip((2..=9).cycle())
            .map(|(d, w)| d * w)
            .sum();

        match sum % 11 {
            0 | 1 => 0,
            rest => 11 - rest,
        }
    }

    /// Whether the last digit matches the modulo-11 check digit.
    pub fn has_valid_check_digit(&self) -> bool {
        self.0[ACCESS_KEY_LEN - 1..]
            .chars()
            .next()
            .and_then(|c| c.to_digit(10))
            .is_some_and(|d| d == self.expected_check_digit())
    }
}

impl fmt::Display for AccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for AccessKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("access key must have {} digits", ACCESS_KEY_LEN))
    }
}

impl From<AccessKey> for String {
    fn from(key: AccessKey) -> Self {
        key.0
    }
}

/// Fields of an access key, borrowed from the key itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AccessKeyComponents<'a> {
    /// IBGE code of the issuing state.
    pub uf_code: &'a str,
    /// Year and month of issue (YYMM).
    pub year_month: &'a str,
    /// CNPJ of the issuer.
    pub issuer_cnpj: &'a str,
    /// Document model (55 = NFe, 65 = NFCe).
    pub model: &'a str,
    pub series: &'a str,
    pub number: &'a str,
    pub emission_type: &'a str,
    pub numeric_code: &'a str,
    pub check_digit: &'a str,
}

/// A company tax ID (CNPJ), 14 digits without separators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cnpj(String);

impl Cnpj {
    /// Build from a formatted match such as `12.345.678/0001-99`.
    ///
    /// Only the format is checked, never the check digits.
    pub fn from_formatted(value: &str) -> Option<Self> {
        let digits = digits_only(value);
        (digits.len() == CNPJ_LEN).then_some(Self(digits))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Canonical `dd.ddd.ddd/dddd-dd` rendering.
    pub fn formatted(&self) -> String {
        let d = &self.0;
        format!("{}.{}.{}/{}-{}", &d[0..2], &d[2..5], &d[5..8], &d[8..12], &d[12..14])
    }
}

impl fmt::Display for Cnpj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Cnpj {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_formatted(&value).ok_or_else(|| format!("CNPJ must have {} digits", CNPJ_LEN))
    }
}

impl From<Cnpj> for String {
    fn from(value: Cnpj) -> Self {
        value.0
    }
}

/// An individual tax ID (CPF), 11 digits without separators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cpf(String);

impl Cpf {
    /// Build from a formatted match such as `123.456.789-09`.
    pub fn from_formatted(value: &str) -> Option<Self> {
        let digits = digits_only(value);
        (digits.len() == CPF_LEN).then_some(Self(digits))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Canonical `ddd.ddd.ddd-dd` rendering.
    pub fn formatted(&self) -> String {
        let d = &self.0;
        format!("{}.{}.{}-{}", &d[0..3], &d[3..6], &d[6..9], &d[9..11])
    }
}

impl fmt::Display for Cpf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Cpf {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_formatted(&value).ok_or_else(|| format!("CPF must have {} digits", CPF_LEN))
    }
}

impl From<Cpf> for String {
    fn from(value: Cpf) -> Self {
        value.0
    }
}

/// Identifiers recovered from one document page.
///
/// Serializes to exactly three keys, each a string or `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// NFe access key.
    #[serde(rename = "chave_acesso")]
    pub access_key: Option<AccessKey>,

    /// Recipient company tax ID.
    #[serde(rename = "cnpj_destinatario")]
    pub company_tax_id: Option<Cnpj>,

    /// Recipient individual tax ID.
    #[serde(rename = "cpf_destinatario")]
    pub individual_tax_id: Option<Cpf>,
}

impl ExtractionResult {
    /// Whether either recipient tax ID was recovered.
    pub fn has_tax_id(&self) -> bool {
        self.company_tax_id.is_some() || self.individual_tax_id.is_some()
    }
}

/// What the service returns for one upload.
///
/// On success `error` is omitted; on failure it carries a description and
/// every identifier is `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(flatten)]
    pub result: ExtractionResult,
}

impl ExtractionResponse {
    pub fn success(result: ExtractionResult) -> Self {
        Self { error: None, result }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            result: ExtractionResult::default(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Kind of uploaded document, as declared by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    /// PDF; only the first page is processed.
    Pdf,
    /// PNG or JPEG photo/scan.
    Image,
    /// HEIC/HEIF photo, needs conversion before decoding.
    Heif,
}

impl DocumentKind {
    /// Content types accepted by the upload endpoint.
    pub const SUPPORTED_CONTENT_TYPES: &'static [&'static str] = &[
        "application/pdf",
        "image/png",
        "image/jpeg",
        "image/jpg",
        "image/heic",
        "image/heif",
    ];

    /// Map a declared content type to a document kind.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "application/pdf" => Some(Self::Pdf),
            "image/png" | "image/jpeg" | "image/jpg" => Some(Self::Image),
            "image/heic" | "image/heif" => Some(Self::Heif),
            _ => None,
        }
    }

    /// Map a file extension to a document kind.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "png" | "jpg" | "jpeg" => Some(Self::Image),
            "heic" | "heif" => Some(Self::Heif),
            _ => None,
        }
    }

    /// Map a file path to a document kind by its extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}
