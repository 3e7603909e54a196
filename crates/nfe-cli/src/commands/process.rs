//! Process command - extract the access key and recipient tax ID from one file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use nfe_core::invoice::{ExtractionReport, InvoiceParser, NfeParser};
use nfe_core::models::config::{NfeConfig, OcrEngineKind};
use nfe_core::pipeline::{response_from_report, ACCESS_KEY_NOT_FOUND};
use nfe_core::{DocumentKind, DocumentProcessor, ExtractionResponse};

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Input file (PDF, PNG, JPEG, HEIC, or a .txt OCR dump)
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// OCR engine override
    #[arg(short, long, value_enum)]
    engine: Option<EngineArg>,

    /// Model directory for the ONNX engine
    #[arg(short, long)]
    model_dir: Option<PathBuf>,

    /// Use a PDF's embedded text when it has enough of it
    #[arg(long)]
    embedded_text: bool,

    /// Show extraction sources, confidence and warnings
    #[arg(long)]
    show_confidence: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// CSV output
    Csv,
    /// Plain text summary
    Text,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Text => "txt",
        }
    }
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum EngineArg {
    Tesseract,
    Onnx,
}

impl From<EngineArg> for OcrEngineKind {
    fn from(arg: EngineArg) -> Self {
        match arg {
            EngineArg::Tesseract => OcrEngineKind::Tesseract,
            EngineArg::Onnx => OcrEngineKind::Onnx,
        }
    }
}

/// What a file on disk holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputKind {
    /// A document that needs decoding and OCR.
    Document(DocumentKind),
    /// Text that was already recognized.
    Text,
}

impl InputKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let is_text = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("txt"));

        if is_text {
            Some(InputKind::Text)
        } else {
            DocumentKind::from_path(path).map(InputKind::Document)
        }
    }
}

pub async fn run(args: ProcessArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut config = super::config::load(config_path)?;
    if let Some(engine) = args.engine {
        config.ocr.engine = engine.into();
    }
    if let Some(dir) = &args.model_dir {
        config.ocr.model_dir = dir.clone();
    }
    if args.embedded_text {
        config.pdf.prefer_embedded_text = true;
    }

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let Some(kind) = InputKind::from_path(&args.input) else {
        anyhow::bail!("{}", nfe_core::pipeline::UNSUPPORTED_TYPE);
    };

    info!("Processing file: {}", args.input.display());

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);

    let processor = match kind {
        InputKind::Document(_) => {
            pb.set_message("Loading OCR engine...");
            Some(DocumentProcessor::from_config(&config)?)
        }
        InputKind::Text => None,
    };

    pb.set_message("Extracting...");
    let report = extract_file(&args.input, kind, processor.as_ref(), &config)?;
    pb.finish_and_clear();

    let response = response_from_report(report.clone());
    let output = format_response(&response, args.format)?;

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        println!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    if args.show_confidence {
        print_report_details(&report);
    }

    debug!("Total processing time: {:?}", start.elapsed());

    if !response.is_success() {
        anyhow::bail!("{}", ACCESS_KEY_NOT_FOUND);
    }

    Ok(())
}

/// Run extraction on one file.
///
/// `processor` is only needed for documents; text dumps go straight to the
/// parser.
pub fn extract_file(
    path: &Path,
    kind: InputKind,
    processor: Option<&DocumentProcessor>,
    config: &NfeConfig,
) -> anyhow::Result<ExtractionReport> {
    match kind {
        InputKind::Text => {
            let text = fs::read_to_string(path)?;
            let parser = NfeParser::new().with_recipient_window(config.extraction.recipient_window);
            Ok(parser.parse(&text))
        }
        InputKind::Document(kind) => {
            let processor = processor
                .ok_or_else(|| anyhow::anyhow!("No OCR engine configured for {}", path.display()))?;
            let data = fs::read(path)?;
            Ok(processor.process(&data, kind)?)
        }
    }
}

pub fn format_response(response: &ExtractionResponse, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string(response)?),
        OutputFormat::Csv => format_csv(response),
        OutputFormat::Text => Ok(format_text(response)),
    }
}

fn format_csv(response: &ExtractionResponse) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    let result = &response.result;

    wtr.write_record(["chave_acesso", "cnpj_destinatario", "cpf_destinatario", "error"])?;
    wtr.write_record([
        result.access_key.as_ref().map(|k| k.as_str()).unwrap_or(""),
        result.company_tax_id.as_ref().map(|c| c.as_str()).unwrap_or(""),
        result.individual_tax_id.as_ref().map(|c| c.as_str()).unwrap_or(""),
        response.error.as_deref().unwrap_or(""),
    ])?;

    let data = String::from_utf8(wtr.into_inner()?)?;
    Ok(data)
}

fn format_text(response: &ExtractionResponse) -> String {
    let result = &response.result;
    let mut output = String::new();

    if let Some(error) = &response.error {
        output.push_str(&format!("Error: {}\n", error));
    }

    match &result.access_key {
        Some(key) => {
            let parts = key.components();
            output.push_str(&format!("Access key: {}\n", key.formatted()));
            output.push_str(&format!(
                "  UF {}, issued {}, model {}, series {}, number {}\n",
                parts.uf_code, parts.year_month, parts.model, parts.series, parts.number
            ));
        }
        None => output.push_str("Access key: -\n"),
    }

    output.push_str("\nRecipient:\n");
    match &result.company_tax_id {
        Some(cnpj) => output.push_str(&format!("  CNPJ: {}\n", cnpj.formatted())),
        None => output.push_str("  CNPJ: -\n"),
    }
    match &result.individual_tax_id {
        Some(cpf) => output.push_str(&format!("  CPF:  {}\n", cpf.formatted())),
        None => output.push_str("  CPF:  -\n"),
    }

    output
}

fn print_report_details(report: &ExtractionReport) {
    println!();
    if let Some(source) = report.access_key_source {
        println!(
            "{} Access key: {:?} (confidence {:.0}%)",
            style("ℹ").blue(),
            source,
            source.confidence() * 100.0
        );
    }
    if let Some(source) = report.tax_id_source {
        println!(
            "{} Recipient tax ID: {:?} (confidence {:.0}%)",
            style("ℹ").blue(),
            source,
            source.confidence() * 100.0
        );
    }
    for warning in &report.warnings {
        println!("{} {}", style("⚠").yellow(), warning);
    }
    println!(
        "{} Processing time: {}ms",
        style("ℹ").blue(),
        report.processing_time_ms
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use nfe_core::ExtractionResult;
    use pretty_assertions::assert_eq;

    fn sample_response() -> ExtractionResponse {
        let text = "CHAVE DE ACESSO 3523 0812 3456 7800 0199 5500 1000 0001 2310 0000 0128\n\
                    DESTINATARIO\n\
                    CPF 123.456.789-09";
        ExtractionResponse::success(nfe_core::extract(text))
    }

    #[test]
    fn test_input_kind_from_path() {
        assert_eq!(InputKind::from_path(Path::new("a/ocr.TXT")), Some(InputKind::Text));
        assert_eq!(
            InputKind::from_path(Path::new("nota.pdf")),
            Some(InputKind::Document(DocumentKind::Pdf))
        );
        assert_eq!(
            InputKind::from_path(Path::new("foto.heic")),
            Some(InputKind::Document(DocumentKind::Heif))
        );
        assert_eq!(InputKind::from_path(Path::new("nota.docx")), None);
    }

    #[test]
    fn test_json_output_has_three_keys() {
        let json = format_response(&sample_response(), OutputFormat::Json).unwrap();
        assert_eq!(
            json,
            r#"{"chave_acesso":"35230812345678000199550010000001231000000128","cnpj_destinatario":null,"cpf_destinatario":"12345678909"}"#
        );
    }

    #[test]
    fn test_csv_output() {
        let csv = format_response(&sample_response(), OutputFormat::Csv).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "chave_acesso,cnpj_destinatario,cpf_destinatario,error");
        assert_eq!(lines[1], "35230812345678000199550010000001231000000128,,12345678909,");
    }

    #[test]
    fn test_text_output_formats_identifiers() {
        let text = format_response(&sample_response(), OutputFormat::Text).unwrap();
        assert!(text.contains("Access key: 3523 0812 3456 7800 0199 5500 1000 0001 2310 0000 0128"));
        assert!(text.contains("CPF:  123.456.789-09"));
        assert!(text.contains("CNPJ: -"));
    }

    #[test]
    fn test_failure_output_carries_error() {
        let response = ExtractionResponse::failure(ACCESS_KEY_NOT_FOUND);
        let json = format_response(&response, OutputFormat::Json).unwrap();
        assert_eq!(
            json,
            r#"{"error":"access key not found","chave_acesso":null,"cnpj_destinatario":null,"cpf_destinatario":null}"#
        );
        assert_eq!(response.result, ExtractionResult::default());
    }

    #[test]
    fn test_text_file_needs_no_processor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ocr.txt");
        fs::write(&path, "35230812345678000199550010000001231000000128").unwrap();

        let report = extract_file(&path, InputKind::Text, None, &NfeConfig::default()).unwrap();
        assert!(report.result.access_key.is_some());
    }
}
