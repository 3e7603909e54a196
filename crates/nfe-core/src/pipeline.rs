//! Document processing: bytes in, identifiers out.
//!
//! A [`DocumentProcessor`] is built once and shared. It owns the decoder,
//! the OCR engine and the parser, so no format probing or model loading
//! happens per request.

use std::time::Instant;

use image::DynamicImage;
use tracing::{debug, info, warn};

use crate::decode::DocumentDecoder;
use crate::error::{NfeError, Result};
use crate::invoice::{ExtractionReport, InvoiceParser, NfeParser};
use crate::models::config::{NfeConfig, PdfConfig};
use crate::models::{DocumentKind, ExtractionResponse};
use crate::ocr::{create_engine, OcrEngine};
use crate::pdf::{PdfExtractor, PdfProcessor};

/// Error reported when processing succeeded but no access key was found.
pub const ACCESS_KEY_NOT_FOUND: &str = "access key not found";

/// Error reported for uploads that are neither PDF nor a supported image.
pub const UNSUPPORTED_TYPE: &str = "Unsupported file type. Use PDF, PNG, JPG or HEIC.";

/// Decode, OCR and parse one document.
pub struct DocumentProcessor {
    decoder: DocumentDecoder,
    ocr: Box<dyn OcrEngine>,
    parser: NfeParser,
    pdf: PdfConfig,
}

impl DocumentProcessor {
    /// Assemble a processor from already-built parts.
    pub fn new(decoder: DocumentDecoder, ocr: Box<dyn OcrEngine>, config: &NfeConfig) -> Self {
        Self {
            decoder,
            ocr,
            parser: NfeParser::new().with_recipient_window(config.extraction.recipient_window),
            pdf: config.pdf.clone(),
        }
    }

    /// Build the OCR engine and probe optional decoders.
    pub fn from_config(config: &NfeConfig) -> Result<Self> {
        let decoder = DocumentDecoder::initialize(&config.image);
        let ocr = create_engine(&config.ocr)?;
        if !ocr.is_available() {
            warn!("OCR engine {} does not look available, requests will fail", ocr.name());
        }
        Ok(Self::new(decoder, ocr, config))
    }

    /// The image decoder.
    pub fn decoder(&self) -> &DocumentDecoder {
        &self.decoder
    }

    /// Name of the OCR engine in use.
    pub fn engine_name(&self) -> &'static str {
        self.ocr.name()
    }

    /// Text of the document's first page.
    pub fn document_text(&self, bytes: &[u8], kind: DocumentKind) -> Result<String> {
        match kind {
            DocumentKind::Pdf => self.pdf_text(bytes),
            DocumentKind::Image | DocumentKind::Heif => {
                let image = self.decoder.decode_image(bytes, kind)?;
                self.recognize(&image)
            }
        }
    }

    /// Run the whole pipeline on uploaded bytes.
    ///
    /// Errors are upstream failures only; a document without identifiers
    /// yields a report with empty fields.
    pub fn process(&self, bytes: &[u8], kind: DocumentKind) -> Result<ExtractionReport> {
        let start = Instant::now();
        info!("Processing {:?} document ({} bytes)", kind, bytes.len());

        let text = self.document_text(bytes, kind)?;
        let mut report = self.process_text(&text);
        report.processing_time_ms = start.elapsed().as_millis() as u64;

        Ok(report)
    }

    /// Parse text that was already recognized.
    pub fn process_text(&self, text: &str) -> ExtractionReport {
        self.parser.parse(text)
    }

    /// Run the pipeline and shape the outcome for a client.
    pub fn respond(&self, bytes: &[u8], kind: DocumentKind) -> ExtractionResponse {
        match self.process(bytes, kind) {
            Ok(report) => response_from_report(report),
            Err(e) => {
                warn!("Processing failed: {}", e);
                ExtractionResponse::failure(e.to_string())
            }
        }
    }

    fn pdf_text(&self, bytes: &[u8]) -> Result<String> {
        let mut extractor = PdfExtractor::new().with_pdftoppm(&self.pdf.pdftoppm_binary);
        extractor.load(bytes)?;
        debug!("PDF has {} pages, processing the first", extractor.page_count());

        if self.pdf.prefer_embedded_text {
            match extractor.extract_text() {
                Ok(text) if text.trim().len() >= self.pdf.min_text_length => {
                    debug!("Using {} characters of embedded text", text.len());
                    return Ok(text);
                }
                Ok(_) => debug!("Embedded text too short, falling back to OCR"),
                Err(e) => warn!("Embedded text extraction failed: {}", e),
            }
        }

        let page = extractor.render_page(1, self.pdf.render_dpi)?;
        self.recognize(&page)
    }

    fn recognize(&self, image: &DynamicImage) -> Result<String> {
        let text = self.ocr.recognize(image).map_err(NfeError::from)?;
        debug!("OCR text:\n{}", text);
        Ok(text)
    }
}

/// Map a finished report to the client response: the access key is the
/// one mandatory field.
pub fn response_from_report(report: ExtractionReport) -> ExtractionResponse {
    if report.result.access_key.is_none() {
        ExtractionResponse::failure(ACCESS_KEY_NOT_FOUND)
    } else {
        ExtractionResponse::success(report.result)
    }
}
