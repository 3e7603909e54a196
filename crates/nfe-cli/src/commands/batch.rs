//! Batch processing command for multiple NFe files.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, warn};

use nfe_core::pipeline::response_from_report;
use nfe_core::{DocumentProcessor, ExtractionResponse};

use super::process::{extract_file, format_response, InputKind, OutputFormat};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Input files or glob pattern
    #[arg(required = true)]
    input: String,

    /// Output directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output format for each file
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Also generate a summary CSV
    #[arg(long)]
    summary: bool,

    /// Continue on error
    #[arg(long)]
    continue_on_error: bool,

    /// Model directory for the ONNX engine
    #[arg(short, long)]
    model_dir: Option<PathBuf>,
}

/// Outcome for a single file.
struct FileOutcome {
    path: PathBuf,
    response: ExtractionResponse,
    failed: bool,
    processing_time_ms: u64,
}

impl FileOutcome {
    fn status(&self) -> &'static str {
        if self.failed {
            "error"
        } else if self.response.is_success() {
            "success"
        } else {
            "no_key"
        }
    }
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut config = super::config::load(config_path)?;
    if let Some(dir) = &args.model_dir {
        config.ocr.model_dir = dir.clone();
    }

    let files: Vec<(PathBuf, InputKind)> = glob(&args.input)?
        .filter_map(|r| r.ok())
        .filter_map(|p| InputKind::from_path(&p).map(|kind| (p, kind)))
        .collect();

    if files.is_empty() {
        anyhow::bail!("No matching files found for pattern: {}", args.input);
    }

    println!(
        "{} Found {} files to process",
        style("ℹ").blue(),
        files.len()
    );

    if let Some(ref output_dir) = args.output_dir {
        fs::create_dir_all(output_dir)?;
    }

    // One engine for the whole batch, and none for text-only batches
    let needs_ocr = files
        .iter()
        .any(|(_, kind)| matches!(kind, InputKind::Document(_)));
    let processor = if needs_ocr {
        Some(DocumentProcessor::from_config(&config)?)
    } else {
        None
    };

    let overall_pb = ProgressBar::new(files.len() as u64);
    overall_pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")?
            .progress_chars("=>-"),
    );

    let mut outcomes = Vec::with_capacity(files.len());

    for (path, kind) in files {
        let file_start = Instant::now();
        let result = extract_file(&path, kind, processor.as_ref(), &config);
        let processing_time_ms = file_start.elapsed().as_millis() as u64;

        let outcome = match result {
            Ok(report) => FileOutcome {
                path,
                response: response_from_report(report),
                failed: false,
                processing_time_ms,
            },
            Err(e) if args.continue_on_error => {
                warn!("Failed to process {}: {}", path.display(), e);
                FileOutcome {
                    path,
                    response: ExtractionResponse::failure(e.to_string()),
                    failed: true,
                    processing_time_ms,
                }
            }
            Err(e) => {
                error!("Failed to process {}: {}", path.display(), e);
                anyhow::bail!("Processing failed for {}: {}", path.display(), e);
            }
        };

        if let Some(output_dir) = &args.output_dir {
            write_output(output_dir, &outcome, args.format)?;
        }

        outcomes.push(outcome);
        overall_pb.inc(1);
    }

    overall_pb.finish_with_message("Complete");

    if args.summary {
        let summary_path = args
            .output_dir
            .as_ref()
            .map(|d| d.join("summary.csv"))
            .unwrap_or_else(|| PathBuf::from("summary.csv"));

        write_summary(&summary_path, &outcomes)?;
        println!(
            "{} Summary written to {}",
            style("✓").green(),
            summary_path.display()
        );
    }

    let count = |status: &str| outcomes.iter().filter(|o| o.status() == status).count();

    println!();
    println!(
        "{} Processed {} files in {:?}",
        style("✓").green(),
        outcomes.len(),
        start.elapsed()
    );
    println!(
        "   {} with access key, {} without, {} failed",
        style(count("success")).green(),
        style(count("no_key")).yellow(),
        style(count("error")).red()
    );

    let unsuccessful: Vec<_> = outcomes.iter().filter(|o| !o.response.is_success()).collect();
    if !unsuccessful.is_empty() {
        println!();
        println!("{}", style("Files without a result:").red());
        for outcome in unsuccessful {
            println!(
                "  - {}: {}",
                outcome.path.display(),
                outcome.response.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    Ok(())
}

fn write_output(output_dir: &Path, outcome: &FileOutcome, format: OutputFormat) -> anyhow::Result<()> {
    let stem = outcome
        .path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("nfe");
    let output_path = output_dir.join(format!("{}.{}", stem, format.extension()));

    fs::write(&output_path, format_response(&outcome.response, format)?)?;
    debug!("Wrote output to {}", output_path.display());
    Ok(())
}

fn write_summary(path: &Path, outcomes: &[FileOutcome]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "filename",
        "status",
        "chave_acesso",
        "cnpj_destinatario",
        "cpf_destinatario",
        "processing_time_ms",
        "error",
    ])?;

    for outcome in outcomes {
        let filename = outcome
            .path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("");
        let result = &outcome.response.result;

        wtr.write_record([
            filename,
            outcome.status(),
            result.access_key.as_ref().map(|k| k.as_str()).unwrap_or(""),
            result.company_tax_id.as_ref().map(|c| c.as_str()).unwrap_or(""),
            result.individual_tax_id.as_ref().map(|c| c.as_str()).unwrap_or(""),
            &outcome.processing_time_ms.to_string(),
            outcome.response.error.as_deref().unwrap_or(""),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
