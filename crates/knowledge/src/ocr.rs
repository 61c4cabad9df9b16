//! Optical character recognition for image-only PDF pages.
//!
//! The default engine shells out to poppler's `pdftoppm` to rasterize a page
//! and to `tesseract` to read it back.

use lexrag_core::{AppError, AppResult};
use std::fs;
use std::path::Path;
use std::process::Command;

/// Recovers the text of a single PDF page.
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Recognize 1-based `page` of the PDF in `pdf_bytes`.
    fn recognize_page(&self, pdf_bytes: &[u8], page: u32) -> AppResult<String>;
}

/// Used when no OCR tooling is installed; image-only pages fail their document.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledOcr;

impl OcrEngine for DisabledOcr {
    fn name(&self) -> &str {
        "disabled"
    }

    fn recognize_page(&self, _pdf_bytes: &[u8], page: u32) -> AppResult<String> {
        Err(AppError::Ingestion(format!(
            "page {} has no text layer and OCR is not available (install poppler-utils and tesseract)",
            page
        )))
    }
}

/// `pdftoppm` + `tesseract` OCR.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    language: String,
    dpi: u32,
}

impl TesseractOcr {
    pub fn new(language: impl Into<String>, dpi: u32) -> Self {
        Self {
            language: language.into(),
            dpi,
        }
    }

    /// Whether both external tools are on PATH.
    pub fn is_available() -> bool {
        let available = |cmd: &str, arg: &str| {
            Command::new(cmd)
                .arg(arg)
                .output()
                .map(|o| o.status.success() || !o.stderr.is_empty())
                .unwrap_or(false)
        };
        available("pdftoppm", "-v") && available("tesseract", "--version")
    }

    fn rasterize(&self, pdf_path: &Path, page: u32, prefix: &Path) -> AppResult<()> {
        let page_arg = page.to_string();
        let output = Command::new("pdftoppm")
            .args(["-f", &page_arg, "-l", &page_arg, "-png", "-r"])
            .arg(self.dpi.to_string())
            .arg(pdf_path)
            .arg(prefix)
            .output()
            .map_err(|e| AppError::Ingestion(format!("Failed to run pdftoppm: {}", e)))?;

        if !output.status.success() {
            return Err(AppError::Ingestion(format!(
                "pdftoppm failed on page {}: {}",
                page,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    fn read_image(&self, image: &Path) -> AppResult<String> {
        let output = Command::new("tesseract")
            .arg(image)
            .arg("stdout")
            .args(["-l", &self.language])
            .output()
            .map_err(|e| AppError::Ingestion(format!("Failed to run tesseract: {}", e)))?;

        if !output.status.success() {
            return Err(AppError::Ingestion(format!(
                "tesseract failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self::new("eng", 150)
    }
}

impl OcrEngine for TesseractOcr {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn recognize_page(&self, pdf_bytes: &[u8], page: u32) -> AppResult<String> {
        let temp_dir = std::env::temp_dir().join(format!("lexrag-ocr-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&temp_dir)?;

        let result = (|| {
            let pdf_path = temp_dir.join("input.pdf");
            fs::write(&pdf_path, pdf_bytes)?;
            self.rasterize(&pdf_path, page, &temp_dir.join("page"))?;

            // pdftoppm zero-pads the page suffix depending on page count.
            let image = fs::read_dir(&temp_dir)?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .find(|p| p.extension().and_then(|e| e.to_str()) == Some("png"))
                .ok_or_else(|| {
                    AppError::Ingestion(format!("pdftoppm produced no image for page {}", page))
                })?;

            self.read_image(&image)
        })();

        if let Err(e) = fs::remove_dir_all(&temp_dir) {
            tracing::debug!("Failed to remove OCR scratch dir {:?}: {}", temp_dir, e);
        }

        let text = result?;
        tracing::debug!(page, chars = text.len(), "OCR recognized page");
        Ok(text)
    }
}

/// Tesseract when installed, otherwise the disabled engine.
pub fn default_engine(language: &str, dpi: u32) -> std::sync::Arc<dyn OcrEngine> {
    if TesseractOcr::is_available() {
        std::sync::Arc::new(TesseractOcr::new(language, dpi))
    } else {
        tracing::info!("OCR tools not found; image-only PDF pages will be rejected");
        std::sync::Arc::new(DisabledOcr)
    }
}
