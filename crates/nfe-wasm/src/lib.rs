//! WASM bindings for NFe access key and recipient tax ID extraction.
//!
//! OCR runs on the JavaScript side; these bindings take the recognized text.

use serde::Serialize;
use wasm_bindgen::prelude::*;

use nfe_core::invoice::{InvoiceParser, NfeParser};
use nfe_core::models::document::AccessKeyComponents;
use nfe_core::{AccessKey, Cnpj, Cpf};

/// Initialize panic hook for better error messages in console.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Version information.
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(value).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Extract the access key and recipient CNPJ/CPF from OCR text.
///
/// Returns `{ chave_acesso, cnpj_destinatario, cpf_destinatario }`, each a
/// string or `null`.
#[wasm_bindgen]
pub fn extract_from_text(text: &str) -> Result<JsValue, JsValue> {
    to_js(&nfe_core::extract(text))
}

/// A parsed access key with its layout fields.
#[derive(Serialize)]
struct AccessKeyInfo<'a> {
    key: &'a str,
    formatted: String,
    check_digit_valid: bool,
    #[serde(flatten)]
    components: AccessKeyComponents<'a>,
}

/// Parse an access key typed or pasted by a user.
///
/// Returns `null` unless the input holds exactly 44 digits.
#[wasm_bindgen]
pub fn parse_access_key(value: &str) -> Result<JsValue, JsValue> {
    let Some(key) = AccessKey::parse(value) else {
        return Ok(JsValue::NULL);
    };

    to_js(&AccessKeyInfo {
        key: key.as_str(),
        formatted: key.formatted(),
        check_digit_valid: key.has_valid_check_digit(),
        components: key.components(),
    })
}

/// Format a CNPJ as `XX.XXX.XXX/XXXX-XX`; other input is returned unchanged.
#[wasm_bindgen]
pub fn format_cnpj(value: &str) -> String {
    Cnpj::from_formatted(value)
        .map(|c| c.formatted())
        .unwrap_or_else(|| value.to_string())
}

/// Format a CPF as `XXX.XXX.XXX-XX`; other input is returned unchanged.
#[wasm_bindgen]
pub fn format_cpf(value: &str) -> String {
    Cpf::from_formatted(value)
        .map(|c| c.formatted())
        .unwrap_or_else(|| value.to_string())
}

/// NFe extractor class for browser use.
#[wasm_bindgen]
pub struct NfeExtractor {
    parser: NfeParser,
}

#[wasm_bindgen]
impl NfeExtractor {
    /// Create a new extractor.
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self {
            parser: NfeParser::new(),
        }
    }

    /// Set how many lines after a recipient label are searched.
    #[wasm_bindgen]
    pub fn set_recipient_window(&mut self, lines: usize) {
        self.parser = NfeParser::new().with_recipient_window(lines);
    }

    /// Extract identifiers from text.
    #[wasm_bindgen]
    pub fn extract(&self, text: &str) -> Result<JsValue, JsValue> {
        to_js(&self.parser.extract(text))
    }

    /// Extract identifiers with sources, confidence and warnings.
    #[wasm_bindgen]
    pub fn extract_with_report(&self, text: &str) -> Result<JsValue, JsValue> {
        to_js(&self.parser.parse(text))
    }
}

impl Default for NfeExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    #[wasm_bindgen_test]
    fn test_format_cnpj() {
        assert_eq!(format_cnpj("98765432000110"), "98.765.432/0001-10");
        assert_eq!(format_cnpj("123"), "123");
    }

    #[wasm_bindgen_test]
    fn test_format_cpf() {
        assert_eq!(format_cpf("12345678909"), "123.456.789-09");
        assert_eq!(format_cpf("123.456.789-09"), "123.456.789-09");
    }

    #[wasm_bindgen_test]
    fn test_parse_access_key_rejects_short_input() {
        assert!(parse_access_key("1234").unwrap().is_null());
    }

    #[wasm_bindgen_test]
    fn test_extract_from_text() {
        let value = extract_from_text("35230812345678000199550010000001231000000128").unwrap();
        assert!(value.is_object());
    }
}
