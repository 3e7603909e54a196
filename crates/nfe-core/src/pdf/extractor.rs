//! PDF loading with lopdf, text with pdf-extract, rasterization with pdftoppm.

use std::process::Command;

use image::{DynamicImage, GrayImage, RgbImage};
use lopdf::{Document, Object, ObjectId};
use tracing::{debug, trace, warn};

use super::{PdfProcessor, Result};
use crate::error::PdfError;

/// PDF extractor for scanned or generated DANFE documents.
pub struct PdfExtractor {
    document: Option<Document>,
    raw_data: Vec<u8>,
    pdftoppm_binary: String,
}

impl PdfExtractor {
    /// Create a new PDF extractor.
    pub fn new() -> Self {
        Self {
            document: None,
            raw_data: Vec::new(),
            pdftoppm_binary: "pdftoppm".to_string(),
        }
    }

    /// Use a different `pdftoppm` executable.
    pub fn with_pdftoppm(mut self, binary: impl Into<String>) -> Self {
        self.pdftoppm_binary = binary.into();
        self
    }

    fn document(&self) -> Result<&Document> {
        self.document
            .as_ref()
            .ok_or_else(|| PdfError::Parse("No document loaded".to_string()))
    }

    /// Rasterize one page with poppler's `pdftoppm`.
    fn rasterize(&self, page: u32, dpi: u32) -> Result<DynamicImage> {
        let temp_dir = tempfile::tempdir().map_err(|e| PdfError::Render(e.to_string()))?;
        let input = temp_dir.path().join("input.pdf");
        let prefix = temp_dir.path().join("page");
        std::fs::write(&input, &self.raw_data).map_err(|e| PdfError::Render(e.to_string()))?;

        let page_str = page.to_string();
        let status = Command::new(&self.pdftoppm_binary)
            .args(["-png", "-singlefile", "-r", &dpi.to_string(), "-f", &page_str, "-l", &page_str])
            .arg(&input)
            .arg(&prefix)
            .status();

        match status {
            Ok(s) if s.success() => {
                let output = temp_dir.path().join("page.png");
                image::open(&output).map_err(|e| PdfError::Render(e.to_string()))
            }
            Ok(s) => Err(PdfError::Render(format!("pdftoppm exited with {}", s))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(PdfError::Render(
                "pdftoppm not found (install poppler-utils)".to_string(),
            )),
            Err(e) => Err(PdfError::Render(e.to_string())),
        }
    }

    /// Largest raster image placed on the page, for scanned PDFs.
    fn embedded_page_image(&self, page: u32) -> Result<DynamicImage> {
        let doc = self.document()?;
        let page_id = *doc.get_pages().get(&page).ok_or(PdfError::InvalidPage(page))?;

        let resources = page_resources(doc, page_id)
            .ok_or_else(|| PdfError::Render(format!("page {} has no resources", page)))?;
        let xobjects = match resources.get(b"XObject").map(|o| doc.dereference(o)) {
            Ok(Ok((_, Object::Dictionary(dict)))) => dict.clone(),
            _ => return Err(PdfError::Render(format!("page {} has no images", page))),
        };

        xobjects
            .iter()
            .filter_map(|(_, obj_ref)| doc.dereference(obj_ref).ok())
            .filter_map(|(_, obj)| decode_image_object(obj))
            .max_by_key(|img| u64::from(img.width()) * u64::from(img.height()))
            .ok_or_else(|| PdfError::Render(format!("page {} has no decodable images", page)))
    }
}

impl Default for PdfExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfProcessor for PdfExtractor {
    fn load(&mut self, data: &[u8]) -> Result<()> {
        let mut doc = Document::load_mem(data).map_err(|e| PdfError::Parse(e.to_string()))?;

        // Handle PDFs with empty password encryption
        if doc.is_encrypted() {
            if doc.decrypt("").is_err() {
                return Err(PdfError::Encrypted);
            }
            debug!("Decrypted PDF with empty password");

            let mut decrypted_data = Vec::new();
            doc.save_to(&mut decrypted_data)
                .map_err(|e| PdfError::Parse(format!("Failed to save decrypted PDF: {}", e)))?;
            self.raw_data = decrypted_data;
        } else {
            self.raw_data = data.to_vec();
        }

        let page_count = doc.get_pages().len();
        if page_count == 0 {
            return Err(PdfError::NoPages);
        }

        debug!("Loaded PDF with {} pages", page_count);
        self.document = Some(doc);
        Ok(())
    }

    fn page_count(&self) -> u32 {
        self.document
            .as_ref()
            .map(|doc| doc.get_pages().len() as u32)
            .unwrap_or(0)
    }

    fn extract_text(&self) -> Result<String> {
        self.document()?;
        pdf_extract::extract_text_from_mem(&self.raw_data)
            .map_err(|e| PdfError::TextExtraction(e.to_string()))
    }

    fn render_page(&self, page: u32, dpi: u32) -> Result<DynamicImage> {
        if page == 0 || page > self.page_count() {
            return Err(PdfError::InvalidPage(page));
        }

        match self.rasterize(page, dpi) {
            Ok(image) => {
                debug!("Rendered page {} at {} DPI: {}x{}", page, dpi, image.width(), image.height());
                Ok(image)
            }
            Err(e) => {
                warn!("Rasterizing page {} failed ({}), using its embedded image", page, e);
                self.embedded_page_image(page)
            }
        }
    }
}

/// Resources dictionary of a page, following `Parent` inheritance.
fn page_resources(doc: &Document, node_id: ObjectId) -> Option<lopdf::Dictionary> {
    let Ok(Object::Dictionary(dict)) = doc.get_object(node_id) else {
        return None;
    };

    if let Ok(resources) = dict.get(b"Resources") {
        if let Ok((_, Object::Dictionary(res_dict))) = doc.dereference(resources) {
            return Some(res_dict.clone());
        }
    }

    match dict.get(b"Parent") {
        Ok(Object::Reference(parent_id)) => page_resources(doc, *parent_id),
        _ => None,
    }
}

/// Decode an image XObject: JPEG streams directly, raw 8-bit RGB/gray otherwise.
fn decode_image_object(obj: &Object) -> Option<DynamicImage> {
    let Object::Stream(stream) = obj else {
        return None;
    };
    let dict = &stream.dict;

    if dict.get(b"Subtype").ok()?.as_name().ok()? != b"Image" {
        return None;
    }

    let width = u32::try_from(dict.get(b"Width").ok()?.as_i64().ok()?).ok()?;
    let height = u32::try_from(dict.get(b"Height").ok()?.as_i64().ok()?).ok()?;
    trace!("Found image object: {}x{}", width, height);

    let filter = dict.get(b"Filter").ok().and_then(|f| match f {
        Object::Name(name) => Some(name.as_slice()),
        Object::Array(arr) => arr.first().and_then(|o| o.as_name().ok()),
        _ => None,
    });

    match filter {
        Some(b"DCTDecode") => {
            return image::load_from_memory_with_format(&stream.content, image::ImageFormat::Jpeg)
                .ok();
        }
        Some(b"JPXDecode") | Some(b"CCITTFaxDecode") | Some(b"JBIG2Decode") => {
            trace!("Unsupported image filter");
            return None;
        }
        _ => {}
    }

    let bits = dict
        .get(b"BitsPerComponent")
        .ok()
        .and_then(|o| o.as_i64().ok())
        .unwrap_or(8);
    if bits != 8 {
        return None;
    }

    let data = stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone());
    let color_space = dict
        .get(b"ColorSpace")
        .ok()
        .and_then(|o| o.as_name().ok())
        .unwrap_or(&b"DeviceRGB"[..]);

    let pixels = width as usize * height as usize;
    match color_space {
        b"DeviceGray" | b"G" if data.len() >= pixels => {
            GrayImage::from_raw(width, height, data[..pixels].to_vec()).map(DynamicImage::ImageLuma8)
        }
        b"DeviceRGB" | b"RGB" if data.len() >= pixels * 3 => {
            RgbImage::from_raw(width, height, data[..pixels * 3].to_vec())
                .map(DynamicImage::ImageRgb8)
        }
        _ => None,
    }
}
