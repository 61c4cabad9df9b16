//! Knowledge type definitions: source documents, chunks and ingestion reports.

use chrono::{DateTime, Utc};
use lexrag_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How a document's bytes are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Text,
    Markdown,
    Html,
    /// Text-native, scanned (image-only) or mixed PDF
    Pdf,
}

impl DocumentFormat {
    /// Detect format from a file extension. `None` means unsupported.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "txt" | "text" => Some(Self::Text),
            "md" | "markdown" => Some(Self::Markdown),
            "html" | "htm" => Some(Self::Html),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Markdown => "markdown",
            Self::Html => "html",
            Self::Pdf => "pdf",
        }
    }
}

/// A raw document handed to the ingestor. Never modified after creation.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Stable identifier; chunk ids derive from it
    pub id: String,
    /// File name shown in citations
    pub name: String,
    pub format: DocumentFormat,
    pub bytes: Vec<u8>,
}

impl SourceDocument {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        format: DocumentFormat,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            format,
            bytes,
        }
    }

    /// Plain-text document whose id is its name.
    pub fn from_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(name.clone(), name, DocumentFormat::Text, text.into().into_bytes())
    }

    /// Read a file. `id` is the path relative to `root`, so the same file
    /// ingested from the same root always gets the same id.
    pub fn from_path(path: &Path, root: &Path) -> AppResult<Self> {
        let format = DocumentFormat::from_path(path).ok_or_else(|| {
            AppError::Ingestion(format!("Unsupported document type: {}", path.display()))
        })?;
        let bytes = std::fs::read(path)?;

        let relative = path.strip_prefix(root).unwrap_or(path);
        let id = relative.to_string_lossy().replace('\\', "/");
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| id.clone());

        Ok(Self::new(id, name, format, bytes))
    }
}

/// Where a page's text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageOrigin {
    /// Text layer or explicit section break
    Native,
    /// Recovered by optical character recognition
    Ocr,
    /// Document had no page structure; the whole text is section 1
    Undivided,
}

/// Text of one page (or section) of a document.
#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    /// 1-based page or section index
    pub page: u32,
    pub text: String,
    pub origin: PageOrigin,
}

/// A chunk before it has been embedded.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkCandidate {
    pub id: String,
    pub source_id: String,
    pub source_name: String,
    pub page: u32,
    /// Character offsets into the document's text
    pub offset_start: usize,
    pub offset_end: usize,
    pub text: String,
}

/// A stored chunk. Field names follow the vector store record schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub source_id: String,
    pub source_name: String,
    pub page: u32,
    pub offset_start: usize,
    pub offset_end: usize,
    pub text: String,
    #[serde(skip_serializing, default)]
    pub vector: Vec<f32>,
    pub ingested_at: DateTime<Utc>,
}

impl Chunk {
    pub fn from_candidate(
        candidate: ChunkCandidate,
        vector: Vec<f32>,
        ingested_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: candidate.id,
            source_id: candidate.source_id,
            source_name: candidate.source_name,
            page: candidate.page,
            offset_start: candidate.offset_start,
            offset_end: candidate.offset_end,
            text: candidate.text,
            vector,
            ingested_at,
        }
    }

    /// A chunk may only be stored when it can be traced to a document page.
    pub fn has_provenance(&self) -> bool {
        !self.source_id.trim().is_empty() && !self.source_name.trim().is_empty() && self.page >= 1
    }
}

/// A chunk returned by similarity search.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Per-document summary kept alongside the chunks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceRecord {
    pub id: String,
    pub name: String,
    pub format: DocumentFormat,
    pub pages: u32,
    pub ocr_pages: u32,
    pub chunks: u32,
    pub size_bytes: u64,
    pub ingested_at: DateTime<Utc>,
}

/// Options for an ingestion batch.
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Reject documents whose text cannot be attributed to pages or sections
    pub require_metadata: bool,
}

/// Why a document or chunk was not stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestFailure {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,
    pub reason: String,
}

/// Outcome of an ingestion batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestReport {
    pub documents_succeeded: u32,
    pub documents_failed: u32,
    pub chunks_succeeded: u32,
    pub chunks_failed: u32,
    pub ocr_pages: u32,
    pub failures: Vec<IngestFailure>,
    /// Ids written in this batch, in write order
    #[serde(skip)]
    pub chunk_ids: Vec<String>,
    pub duration_secs: f64,
}

impl IngestReport {
    pub fn record_document_failure(&mut self, source: &str, error: &AppError) {
        self.documents_failed += 1;
        self.failures.push(IngestFailure {
            source: source.to_string(),
            chunk_id: None,
            reason: error.to_string(),
        });
    }

    pub fn record_chunk_failure(&mut self, source: &str, chunk_id: &str, error: &AppError) {
        self.chunks_failed += 1;
        self.failures.push(IngestFailure {
            source: source.to_string(),
            chunk_id: Some(chunk_id.to_string()),
            reason: error.to_string(),
        });
    }

    /// Fold another report (e.g. file discovery failures) into this one.
    pub fn merge(&mut self, other: IngestReport) {
        self.documents_succeeded += other.documents_succeeded;
        self.documents_failed += other.documents_failed;
        self.chunks_succeeded += other.chunks_succeeded;
        self.chunks_failed += other.chunks_failed;
        self.ocr_pages += other.ocr_pages;
        self.failures.extend(other.failures);
        self.chunk_ids.extend(other.chunk_ids);
        self.duration_secs += other.duration_secs;
    }
}

/// Vector store statistics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreStats {
    pub documents: u32,
    pub chunks: u32,
    pub last_ingested_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            DocumentFormat::from_path(&PathBuf::from("a/policy.PDF")),
            Some(DocumentFormat::Pdf)
        );
        assert_eq!(
            DocumentFormat::from_path(&PathBuf::from("notes.md")),
            Some(DocumentFormat::Markdown)
        );
        assert_eq!(DocumentFormat::from_path(&PathBuf::from("image.png")), None);
        assert_eq!(DocumentFormat::from_path(&PathBuf::from("README")), None);
    }

    #[test]
    fn test_from_path_uses_relative_id() {
        let temp = tempfile::TempDir::new().unwrap();
        let dir = temp.path().join("regs");
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("act.txt");
        std::fs::write(&file, "Section 1").unwrap();

        let doc = SourceDocument::from_path(&file, temp.path()).unwrap();
        assert_eq!(doc.id, "regs/act.txt");
        assert_eq!(doc.name, "act.txt");
        assert_eq!(doc.format, DocumentFormat::Text);
    }

    #[test]
    fn test_provenance_requires_page() {
        let mut chunk = Chunk {
            id: "c".into(),
            source_id: "policy.pdf".into(),
            source_name: "policy.pdf".into(),
            page: 2,
            offset_start: 0,
            offset_end: 10,
            text: "retained".into(),
            vector: vec![1.0],
            ingested_at: Utc::now(),
        };
        assert!(chunk.has_provenance());
        chunk.page = 0;
        assert!(!chunk.has_provenance());
        chunk.page = 1;
        chunk.source_name = " ".into();
        assert!(!chunk.has_provenance());
    }

    #[test]
    fn test_report_merge() {
        let mut a = IngestReport {
            documents_succeeded: 1,
            chunks_succeeded: 4,
            ..Default::default()
        };
        let mut b = IngestReport::default();
        b.record_document_failure("scan.pdf", &AppError::Ingestion("no text".into()));
        a.merge(b);
        assert_eq!(a.documents_succeeded, 1);
        assert_eq!(a.documents_failed, 1);
        assert_eq!(a.failures[0].source, "scan.pdf");
    }
}
