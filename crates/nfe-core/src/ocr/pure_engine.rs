//! Pure Rust OCR engine wrapper using `pure-onnx-ocr`.

use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

use image::{DynamicImage, GenericImageView};
use tracing::{debug, info};

use super::{apply_whitelist, OcrEngine};
use crate::error::OcrError;
use crate::models::config::OcrConfig;

/// Vertical bucket size, in pixels, for grouping regions into lines.
const ROW_HEIGHT: f32 = 20.0;

/// OCR engine backed by `pure-onnx-ocr` (pure Rust, no external ONNX Runtime).
///
/// The engine has no whitelist option, so its output is filtered afterwards.
pub struct OnnxOcrEngine {
    engine: Mutex<pure_onnx_ocr::engine::OcrEngine>,
    config: OcrConfig,
}

/// One recognized region, reduced to what reading order needs.
#[derive(Debug, Clone)]
struct Region {
    x: f32,
    y: f32,
    text: String,
}

impl OnnxOcrEngine {
    /// Create an engine from model files in a directory.
    pub fn from_dir(model_dir: &Path, config: OcrConfig) -> Result<Self, OcrError> {
        let det_path = model_dir.join("det.onnx");
        let rec_path = model_dir.join("latin_rec.onnx");
        let dict_path = model_dir.join("latin_dict.txt");

        for path in [&det_path, &rec_path, &dict_path] {
            if !path.exists() {
                return Err(OcrError::NotAvailable(format!(
                    "model file missing: {}",
                    path.display()
                )));
            }
        }

        let engine = pure_onnx_ocr::engine::OcrEngineBuilder::new()
            .det_model_path(&det_path)
            .rec_model_path(&rec_path)
            .dictionary_path(&dict_path)
            .build()
            .map_err(|e| OcrError::ModelLoad(format!("pure-onnx-ocr: {}", e)))?;

        info!("Loaded pure-onnx-ocr engine from {}", model_dir.display());

        Ok(Self {
            engine: Mutex::new(engine),
            config,
        })
    }
}

impl OcrEngine for OnnxOcrEngine {
    fn name(&self) -> &'static str {
        "onnx"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError> {
        let start = Instant::now();
        let (width, height) = image.dimensions();

        info!("Processing image: {}x{}", width, height);

        let results = {
            let engine = self
                .engine
                .lock()
                .map_err(|_| OcrError::Recognition("OCR engine lock poisoned".to_string()))?;
            engine
                .run_from_image(image)
                .map_err(|e| OcrError::Recognition(format!("pure-onnx-ocr: {}", e)))?
        };

        debug!("pure-onnx-ocr returned {} text regions", results.len());

        let regions: Vec<Region> = results
            .iter()
            .map(|r| {
                let (x, y) = top_left(&r.bounding_box);
                Region {
                    x,
                    y,
                    text: r.text.replace("[UNK]", " "),
                }
            })
            .collect();

        let text = apply_whitelist(&join_in_reading_order(regions), &self.config.char_whitelist);

        info!(
            "OCR complete: {} characters in {}ms",
            text.len(),
            start.elapsed().as_millis()
        );

        Ok(text)
    }
}

/// Join regions into lines: top to bottom by row bucket, left to right
/// within a row.
fn join_in_reading_order(mut regions: Vec<Region>) -> String {
    let row_of = |r: &Region| (r.y / ROW_HEIGHT) as i32;

    regions.sort_by(|a, b| {
        row_of(a)
            .cmp(&row_of(b))
            .then(a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal))
    });

    let mut lines: Vec<String> = Vec::new();
    let mut current_row = None;

    for region in regions {
        let row = row_of(&region);
        match lines.last_mut() {
            Some(line) if current_row == Some(row) => {
                line.push(' ');
                line.push_str(&region.text);
            }
            _ => {
                lines.push(region.text);
                current_row = Some(row);
            }
        }
    }

    lines.join("\n")
}

/// Smallest x and y of the region polygon's exterior.
fn top_left(polygon: &pure_onnx_ocr::Polygon<f64>) -> (f32, f32) {
    polygon
        .exterior()
        .coords()
        .take(4)
        .fold((f32::INFINITY, f32::INFINITY), |(x, y), c| {
            (x.min(c.x as f32), y.min(c.y as f32))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn region(x: f32, y: f32, text: &str) -> Region {
        Region {
            x,
            y,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_reading_order_groups_rows() {
        let regions = vec![
            region(300.0, 52.0, "12.345.678/0001-99"),
            region(10.0, 5.0, "DESTINATARIO"),
            region(10.0, 48.0, "CNPJ/CPF"),
        ];

        assert_eq!(
            join_in_reading_order(regions),
            "DESTINATARIO\nCNPJ/CPF 12.345.678/0001-99"
        );
    }

    #[test]
    fn test_missing_models_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = OnnxOcrEngine::from_dir(dir.path(), OcrConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, OcrError::NotAvailable(_)));
    }
}
