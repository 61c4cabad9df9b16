//! Overlapping, page-scoped text chunking.
//!
//! Windows come from `text-splitter`, which cuts at the largest semantic
//! unit that fits (paragraph, sentence, word, then grapheme) and carries up
//! to `overlap` characters of the previous window into the next. Text with no
//! word breaks, such as Thai, still overlaps at the grapheme level.

use crate::config::ChunkingConfig;
use crate::types::{ChunkCandidate, PageText};
use sha2::{Digest, Sha256};
use text_splitter::{ChunkConfig, TextSplitter};

/// Deterministic chunk id from document id and document-level start offset.
pub fn chunk_id(source_id: &str, offset_start: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_id.as_bytes());
    hasher.update(b":");
    hasher.update(offset_start.to_string().as_bytes());
    let digest = hasher.finalize();
    digest[..16].iter().map(|b| format!("{:02x}", b)).collect()
}

/// Chunk every page of a document.
///
/// Offsets are character positions in the concatenation of all page texts,
/// so they are unique per document even when pages repeat content.
pub fn chunk_pages(
    source_id: &str,
    source_name: &str,
    pages: &[PageText],
    config: &ChunkingConfig,
) -> Vec<ChunkCandidate> {
    let mut chunks = Vec::new();
    let mut base = 0usize;

    for page in pages {
        let page_chars = page.text.chars().count();
        for (start, end, text) in split_window(&page.text, config) {
            let offset_start = base + start;
            chunks.push(ChunkCandidate {
                id: chunk_id(source_id, offset_start),
                source_id: source_id.to_string(),
                source_name: source_name.to_string(),
                page: page.page,
                offset_start,
                offset_end: base + end,
                text,
            });
        }
        base += page_chars;
    }

    tracing::debug!(
        source = source_id,
        chunks = chunks.len(),
        size = config.chunk_size,
        overlap = config.overlap_chars(),
        "Chunked document"
    );

    chunks
}

/// Split one page into `(start, end, text)` windows with char offsets into `text`.
fn split_window(text: &str, config: &ChunkingConfig) -> Vec<(usize, usize, String)> {
    let size = config.chunk_size.max(1);
    let chunk_config = ChunkConfig::new(size)
        .with_overlap(config.overlap_chars())
        .unwrap_or_else(|_| ChunkConfig::new(size));
    let splitter = TextSplitter::new(chunk_config);

    let mut windows: Vec<(usize, usize, String)> = splitter
        .chunk_char_indices(text)
        .filter(|c| !c.chunk.trim().is_empty())
        .map(|c| {
            let end = c.char_offset + c.chunk.chars().count();
            (c.char_offset, end, c.chunk.to_string())
        })
        .collect();

    // Short fragments carry no context on their own; keep them only if the
    // page has nothing else.
    if windows.len() > 1 {
        windows.retain(|(s, e, _)| e - s >= config.min_chunk_chars);
    }
    windows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PageOrigin;

    fn config(size: usize, overlap: f32) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size: size,
            overlap_fraction: overlap,
            min_chunk_chars: 10,
        }
    }

    fn page(n: u32, text: &str) -> PageText {
        PageText {
            page: n,
            text: text.to_string(),
            origin: PageOrigin::Native,
        }
    }

    fn words(count: usize) -> String {
        (0..count)
            .map(|i| format!("word{}", i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_offsets_point_at_chunk_text() {
        let text = words(200);
        let pages = vec![page(1, &text)];
        let chunks = chunk_pages("doc", "doc.txt", &pages, &config(120, 0.2));
        let chars: Vec<char> = text.chars().collect();

        assert!(chunks.len() > 3);
        for chunk in &chunks {
            let slice: String = chars[chunk.offset_start..chunk.offset_end].iter().collect();
            assert_eq!(slice, chunk.text);
            assert!(chunk.text.chars().count() <= 120);
        }
    }

    #[test]
    fn test_chunks_overlap_and_do_not_split_words() {
        let text = words(200);
        let chunks = chunk_pages("doc", "doc.txt", &[page(1, &text)], &config(120, 0.25));

        for pair in chunks.windows(2) {
            assert!(pair[1].offset_start < pair[0].offset_end, "expected overlap");
            let first_word = pair[1].text.split(' ').next().unwrap();
            assert!(first_word.starts_with("word"), "split word: {}", first_word);
            let last_word = pair[0].text.rsplit(' ').next().unwrap();
            assert!(text.split(' ').any(|w| w == last_word), "split word: {}", last_word);
        }
    }

    #[test]
    fn test_ids_are_deterministic() {
        let pages = vec![page(1, &words(100)), page(2, &words(50))];
        let a = chunk_pages("policy.pdf", "policy.pdf", &pages, &config(100, 0.1));
        let b = chunk_pages("policy.pdf", "policy.pdf", &pages, &config(100, 0.1));
        assert_eq!(a, b);

        let c = chunk_pages("other.pdf", "other.pdf", &pages, &config(100, 0.1));
        assert_ne!(a[0].id, c[0].id);
    }

    #[test]
    fn test_pages_are_tagged_and_offsets_continue() {
        let pages = vec![page(1, "First page has some text."), page(3, "Third page text here.")];
        let chunks = chunk_pages("d", "d.txt", &pages, &config(200, 0.1));

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].page, 1);
        assert_eq!(chunks[1].page, 3);
        assert_eq!(chunks[1].offset_start, "First page has some text.".chars().count());
    }

    #[test]
    fn test_short_page_kept_as_single_chunk() {
        let chunks = chunk_pages("d", "d.txt", &[page(1, "Fee: 5")], &config(200, 0.1));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Fee: 5");
    }

    #[test]
    fn test_multibyte_text() {
        let text = "มาตรา ๑ ผู้ควบคุมข้อมูลส่วนบุคคลต้องเก็บรักษาข้อมูล ".repeat(20);
        let chunks = chunk_pages("th", "th.txt", &[page(1, &text)], &config(80, 0.2));
        assert!(!chunks.is_empty());
        let chars: Vec<char> = text.chars().collect();
        for chunk in &chunks {
            let slice: String = chars[chunk.offset_start..chunk.offset_end].iter().collect();
            assert_eq!(slice, chunk.text);
        }
    }

    #[test]
    fn test_text_without_spaces_still_overlaps() {
        let text = "ผู้ควบคุมข้อมูลส่วนบุคคลต้องเก็บรักษาข้อมูล".repeat(10);
        let chunks = chunk_pages("th", "th.txt", &[page(1, &text)], &config(100, 0.2));
        let chars: Vec<char> = text.chars().collect();

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 100);
            let slice: String = chars[chunk.offset_start..chunk.offset_end].iter().collect();
            assert_eq!(slice, chunk.text);
        }
        for pair in chunks.windows(2) {
            assert!(pair[1].offset_start <= pair[0].offset_end, "gap between chunks");
        }
        let overlapping = chunks
            .windows(2)
            .filter(|pair| pair[1].offset_start < pair[0].offset_end)
            .count();
        assert!(overlapping > 0);
    }

    #[test]
    fn test_empty_page() {
        assert!(chunk_pages("d", "d.txt", &[page(1, "")], &config(100, 0.1)).is_empty());
    }
}
