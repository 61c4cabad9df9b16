//! PDF page extraction with OCR fallback for image-only pages.

use crate::ocr::OcrEngine;
use crate::types::{PageOrigin, PageText};
use lexrag_core::{AppError, AppResult};
use lopdf::Document;

/// A text layer with fewer letters or digits than this is treated as a scan.
const MIN_NATIVE_CHARS: usize = 10;

/// Extract every page of a PDF, OCR-ing pages without a usable text layer.
///
/// An OCR failure on any page fails the whole document so that a partially
/// read scan is never stored as if it were complete.
pub fn extract_pdf_pages(bytes: &[u8], ocr: &dyn OcrEngine) -> AppResult<Vec<PageText>> {
    let doc = Document::load_mem(bytes)
        .map_err(|e| AppError::Ingestion(format!("Failed to parse PDF: {}", e)))?;

    if doc.is_encrypted() {
        return Err(AppError::Ingestion(
            "Encrypted PDFs are not supported".to_string(),
        ));
    }

    let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
    let mut pages = Vec::with_capacity(page_numbers.len());

    for page in page_numbers {
        let native = match doc.extract_text(&[page]) {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!(page, "No text layer: {}", e);
                String::new()
            }
        };

        if has_text_layer(&native) {
            pages.push(PageText {
                page,
                text: tidy(&native),
                origin: PageOrigin::Native,
            });
            continue;
        }

        tracing::debug!(page, engine = ocr.name(), "Running OCR on image-only page");
        let recognized = ocr.recognize_page(bytes, page)?;
        pages.push(PageText {
            page,
            text: tidy(&recognized),
            origin: PageOrigin::Ocr,
        });
    }

    Ok(pages)
}

fn has_text_layer(text: &str) -> bool {
    text.chars().filter(|c| c.is_alphanumeric()).count() >= MIN_NATIVE_CHARS
}

/// Join hyphenated line breaks and normalize whitespace.
fn tidy(text: &str) -> String {
    crate::parser::normalize_whitespace(&text.replace("-\n", ""))
}


#[cfg(test)]
mod tests {
    use super::test_support::build_pdf;
    use super::*;
    use crate::ocr::DisabledOcr;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct PageEcho {
        calls: AtomicU32,
    }

    impl OcrEngine for PageEcho {
        fn name(&self) -> &str {
            "echo"
        }

        fn recognize_page(&self, _pdf: &[u8], page: u32) -> AppResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("Scanned page {} text recovered by recognition", page))
        }
    }

    #[test]
    fn test_image_only_pages_go_through_ocr() {
        let pdf = build_pdf(&[None, None]);
        let ocr = PageEcho {
            calls: AtomicU32::new(0),
        };

        let pages = extract_pdf_pages(&pdf, &ocr).unwrap();
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 2);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[1].page, 2);
        assert_eq!(pages[1].origin, PageOrigin::Ocr);
        assert!(pages[1].text.contains("Scanned page 2"));
    }

    #[test]
    fn test_text_layer_is_used_directly() {
        let pdf = build_pdf(&[Some("Retention of customer records is seven years")]);
        let ocr = PageEcho {
            calls: AtomicU32::new(0),
        };

        let pages = extract_pdf_pages(&pdf, &ocr).unwrap();
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 0);
        assert_eq!(pages[0].origin, PageOrigin::Native);
        assert!(pages[0].text.contains("Retention"));
    }

    #[test]
    fn test_scan_without_ocr_fails_document() {
        let pdf = build_pdf(&[None]);
        let err = extract_pdf_pages(&pdf, &DisabledOcr).unwrap_err();
        assert!(err.to_string().contains("page 1"));
    }

    #[test]
    fn test_garbage_is_ingestion_error() {
        let err = extract_pdf_pages(b"definitely not a pdf", &DisabledOcr).unwrap_err();
        assert!(matches!(err, AppError::Ingestion(_)));
    }

    #[test]
    fn test_tidy_joins_hyphenation() {
        assert_eq!(tidy("reten-\ntion period"), "retention period");
    }
}
