//! Text extraction: turns a `SourceDocument` into per-page text.

use crate::ocr::OcrEngine;
use crate::pdf;
use crate::types::{DocumentFormat, PageOrigin, PageText, SourceDocument};
use lexrag_core::{AppError, AppResult};

/// Page separator in plain-text exports (form feed).
const PAGE_BREAK: char = '\u{0C}';

/// Extract the text of every page of a document.
///
/// PDFs are read page by page and image-only pages go through `ocr`.
/// Text formats are split on form feeds; without any, the whole document
/// becomes a single undivided section. Pages that end up empty are dropped,
/// and a document with no text at all is an error.
pub fn extract_pages(doc: &SourceDocument, ocr: &dyn OcrEngine) -> AppResult<Vec<PageText>> {
    let pages = match doc.format {
        DocumentFormat::Pdf => pdf::extract_pdf_pages(&doc.bytes, ocr)?,
        DocumentFormat::Text | DocumentFormat::Markdown | DocumentFormat::Html => {
            let raw = decode_text(doc)?;
            split_sections(&raw, doc.format)
        }
    };

    let pages: Vec<PageText> = pages
        .into_iter()
        .filter(|p| !p.text.trim().is_empty())
        .collect();

    if pages.is_empty() {
        return Err(AppError::Ingestion(format!(
            "{} contains no extractable text",
            doc.name
        )));
    }

    tracing::debug!(
        source = %doc.id,
        pages = pages.len(),
        ocr_pages = pages.iter().filter(|p| p.origin == PageOrigin::Ocr).count(),
        "Extracted pages"
    );

    Ok(pages)
}

fn decode_text(doc: &SourceDocument) -> AppResult<String> {
    let raw = String::from_utf8(doc.bytes.clone())
        .map_err(|_| AppError::Ingestion(format!("{} is not valid UTF-8 text", doc.name)))?;

    if raw.contains('\0') {
        return Err(AppError::Ingestion(format!(
            "{} looks like a binary file",
            doc.name
        )));
    }

    Ok(raw)
}

fn split_sections(raw: &str, format: DocumentFormat) -> Vec<PageText> {
    let clean = |text: &str| match format {
        DocumentFormat::Markdown => clean_markdown(text),
        DocumentFormat::Html => clean_html(text),
        _ => normalize_whitespace(text),
    };

    if !raw.contains(PAGE_BREAK) {
        return vec![PageText {
            page: 1,
            text: clean(raw),
            origin: PageOrigin::Undivided,
        }];
    }

    raw.split(PAGE_BREAK)
        .enumerate()
        .map(|(i, section)| PageText {
            page: i as u32 + 1,
            text: clean(section),
            origin: PageOrigin::Native,
        })
        .collect()
}

/// Trim trailing spaces and collapse runs of blank lines, keeping paragraph breaks.
pub fn normalize_whitespace(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut blank_run = 0;

    for line in text.lines() {
        let trimmed = line.trim_end();
        if trimmed.trim().is_empty() {
            blank_run += 1;
            if blank_run == 1 && !result.is_empty() {
                result.push('\n');
            }
            continue;
        }
        blank_run = 0;
        result.push_str(trimmed);
        result.push('\n');
    }

    result.trim().to_string()
}

/// Clean markdown by removing excess formatting.
pub fn clean_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for line in text.lines() {
        let trimmed = line.trim_start_matches('#').trim();

        // Horizontal rules and code fences
        if trimmed.starts_with("---") || trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            continue;
        }

        if !trimmed.is_empty() {
            result.push_str(trimmed);
            result.push('\n');
        }
    }

    result.trim().to_string()
}

/// Strip tags, scripts and styles from HTML and collapse whitespace.
pub fn clean_html(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut in_tag = false;
    let mut in_script = false;
    let mut in_style = false;

    // ASCII lowercasing keeps byte offsets aligned with `text`.
    let lower = text.to_ascii_lowercase();

    for (i, ch) in text.char_indices() {
        if ch == '<' {
            in_tag = true;
            let rest = &lower[i..];
            if rest.starts_with("<script") {
                in_script = true;
            } else if rest.starts_with("</script") {
                in_script = false;
            } else if rest.starts_with("<style") {
                in_style = true;
            } else if rest.starts_with("</style") {
                in_style = false;
            }
        } else if ch == '>' {
            in_tag = false;
            result.push(' ');
        } else if !in_tag && !in_script && !in_style {
            result.push(ch);
        }
    }

    decode_entities(&result.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::DisabledOcr;

    #[test]
    fn test_text_without_breaks_is_undivided() {
        let doc = SourceDocument::from_text("notes.txt", "Line one.\n\n\n\nLine two.  ");
        let pages = extract_pages(&doc, &DisabledOcr).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].page, 1);
        assert_eq!(pages[0].origin, PageOrigin::Undivided);
        assert_eq!(pages[0].text, "Line one.\n\nLine two.");
    }

    #[test]
    fn test_form_feeds_become_pages() {
        let doc = SourceDocument::from_text("act.txt", "Part one\u{0C}Part two\u{0C}\u{0C}Part four");
        let pages = extract_pages(&doc, &DisabledOcr).unwrap();
        let numbers: Vec<u32> = pages.iter().map(|p| p.page).collect();
        // The empty third page is dropped but numbering is preserved.
        assert_eq!(numbers, vec![1, 2, 4]);
        assert!(pages.iter().all(|p| p.origin == PageOrigin::Native));
    }

    #[test]
    fn test_empty_document_is_error() {
        let doc = SourceDocument::from_text("empty.txt", "   \n ");
        let err = extract_pages(&doc, &DisabledOcr).unwrap_err();
        assert!(matches!(err, AppError::Ingestion(_)));
    }

    #[test]
    fn test_invalid_utf8_is_error() {
        let doc = SourceDocument::new("b", "b.txt", DocumentFormat::Text, vec![0xff, 0xfe, 0x00]);
        assert!(extract_pages(&doc, &DisabledOcr).is_err());
    }

    #[test]
    fn test_clean_markdown() {
        let input = "# Header\n\nSome text\n\n```rust\ncode\n```\n\nMore text";
        let output = clean_markdown(input);
        assert!(output.contains("Header"));
        assert!(output.contains("Some text"));
        assert!(output.contains("More text"));
        assert!(!output.contains("```"));
    }

    #[test]
    fn test_clean_html() {
        let input = "<html><body><p>Hello <b>world</b></p><script>var x = 1;</script></body></html>";
        assert_eq!(clean_html(input), "Hello world");
    }

    #[test]
    fn test_clean_html_non_ascii_and_entities() {
        let input = "<p>มาตรา 7</p><p>R&amp;D &lt;records&gt;</p>";
        assert_eq!(clean_html(input), "มาตรา 7 R&D <records>");
    }
}
