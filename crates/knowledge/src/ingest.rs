//! Document ingestion: extract, chunk, embed and write.
//!
//! Each document is processed independently. A document that cannot be read
//! is recorded in the report and the batch carries on. Chunk ids are
//! deterministic, so re-ingesting an unchanged document rewrites the same
//! rows instead of adding new ones.

use crate::chunker;
use crate::config::PipelineConfig;
use crate::ocr::OcrEngine;
use crate::parser;
use crate::progress::ProgressReporter;
use crate::store::VectorStoreClient;
use crate::types::{
    Chunk, DocumentFormat, IngestOptions, IngestReport, PageOrigin, SourceDocument, SourceRecord,
};
use chrono::Utc;
use lexrag_core::{AppError, AppResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use walkdir::WalkDir;

pub struct Ingestor {
    client: VectorStoreClient,
    ocr: Arc<dyn OcrEngine>,
    config: Arc<PipelineConfig>,
    progress: ProgressReporter,
}

impl Ingestor {
    pub fn new(
        client: VectorStoreClient,
        ocr: Arc<dyn OcrEngine>,
        config: Arc<PipelineConfig>,
    ) -> Self {
        Self {
            client,
            ocr,
            config,
            progress: ProgressReporter::noop(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    /// Read every supported file under `paths`.
    ///
    /// Directories are walked recursively and files with unknown extensions
    /// are skipped. Unreadable files are recorded as failures.
    pub fn discover(&self, paths: &[PathBuf]) -> (Vec<SourceDocument>, IngestReport) {
        let mut documents = Vec::new();
        let mut report = IngestReport::default();

        for path in paths {
            if path.is_file() {
                let root = path.parent().unwrap_or_else(|| Path::new(""));
                match SourceDocument::from_path(path, root) {
                    Ok(doc) => documents.push(doc),
                    Err(e) => report.record_document_failure(&path.to_string_lossy(), &e),
                }
            } else if path.is_dir() {
                for entry in WalkDir::new(path)
                    .follow_links(false)
                    .sort_by_file_name()
                    .into_iter()
                    .filter_map(|e| e.ok())
                {
                    let entry_path = entry.path();
                    if !entry_path.is_file() || DocumentFormat::from_path(entry_path).is_none() {
                        continue;
                    }
                    match SourceDocument::from_path(entry_path, path) {
                        Ok(doc) => documents.push(doc),
                        Err(e) => {
                            report.record_document_failure(&entry_path.to_string_lossy(), &e)
                        }
                    }
                }
            } else {
                report.record_document_failure(
                    &path.to_string_lossy(),
                    &AppError::Ingestion("Path does not exist".to_string()),
                );
            }
            self.progress
                .discover(documents.len() as u64, &path.to_string_lossy());
        }

        (documents, report)
    }

    /// Ingest a batch of documents.
    pub async fn ingest(&self, documents: &[SourceDocument], options: &IngestOptions) -> IngestReport {
        let start = Instant::now();
        let mut report = IngestReport::default();
        let total = documents.len() as u64;

        tracing::info!("Starting ingestion of {} documents", documents.len());

        for (i, doc) in documents.iter().enumerate() {
            match self.ingest_document(doc, options, &mut report, i as u64 + 1, total).await {
                Ok(()) => report.documents_succeeded += 1,
                Err(e) => {
                    tracing::warn!(source = %doc.id, "Document not ingested: {}", e);
                    report.record_document_failure(&doc.id, &e);
                }
            }
        }

        report.duration_secs = start.elapsed().as_secs_f64();

        tracing::info!(
            "Ingestion completed: {} documents ({} failed), {} chunks ({} failed) in {:.2}s",
            report.documents_succeeded,
            report.documents_failed,
            report.chunks_succeeded,
            report.chunks_failed,
            report.duration_secs
        );

        report
    }

    async fn ingest_document(
        &self,
        doc: &SourceDocument,
        options: &IngestOptions,
        report: &mut IngestReport,
        position: u64,
        total: u64,
    ) -> AppResult<()> {
        tracing::debug!(source = %doc.id, format = doc.format.as_str(), "Processing document");

        // OCR shells out, keep it off the async workers.
        let ocr = Arc::clone(&self.ocr);
        let owned = doc.clone();
        let pages = tokio::task::spawn_blocking(move || parser::extract_pages(&owned, ocr.as_ref()))
            .await
            .map_err(|e| AppError::Ingestion(format!("Extraction task failed: {}", e)))??;

        if options.require_metadata && pages.iter().any(|p| p.origin == PageOrigin::Undivided) {
            return Err(AppError::Ingestion(format!(
                "{} has no page or section structure and metadata is required",
                doc.name
            )));
        }

        let ocr_pages = pages.iter().filter(|p| p.origin == PageOrigin::Ocr).count() as u32;
        self.progress.extract(position, total, &doc.name, ocr_pages);

        let candidates = chunker::chunk_pages(&doc.id, &doc.name, &pages, &self.config.chunking);
        if candidates.is_empty() {
            return Err(AppError::Ingestion(format!("{} produced no chunks", doc.name)));
        }
        self.progress.chunk(position, total, candidates.len());

        // Embed everything before writing so a failed embedding leaves the
        // previous version of the document untouched.
        let batch_size = self.config.embedding.batch_size.max(1);
        let mut vectors = Vec::with_capacity(candidates.len());
        for batch in candidates.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embedded = self
                .client
                .embed_batch(&texts)
                .await
                .map_err(|e| AppError::Ingestion(format!("Embedding failed: {}", e)))?;
            if embedded.len() != batch.len() {
                return Err(AppError::Ingestion(format!(
                    "Embedder returned {} vectors for {} chunks",
                    embedded.len(),
                    batch.len()
                )));
            }
            vectors.extend(embedded);
            self.progress.embed(
                vectors.len() as u64,
                candidates.len() as u64,
                self.client.embedder().model_name(),
            );
        }

        let ingested_at = Utc::now();
        let chunk_total = candidates.len() as u64;
        let mut written = Vec::with_capacity(candidates.len());
        let mut failed = 0u32;

        for (candidate, vector) in candidates.into_iter().zip(vectors) {
            let chunk = Chunk::from_candidate(candidate, vector, ingested_at);
            let id = chunk.id.clone();
            match self.write_with_retry(chunk).await {
                Ok(()) => written.push(id),
                Err(e) => {
                    failed += 1;
                    tracing::warn!(source = %doc.id, chunk = %id, "Chunk write failed: {}", e);
                    report.record_chunk_failure(&doc.id, &id, &e);
                }
            }
            self.progress.write(written.len() as u64 + failed as u64, chunk_total);
        }

        if written.is_empty() {
            return Err(AppError::Storage(format!(
                "No chunks of {} could be written",
                doc.name
            )));
        }

        let store = self.client.store();
        if failed == 0 {
            store.retain_chunks(&doc.id, &written)?;
        }
        store.record_source(&SourceRecord {
            id: doc.id.clone(),
            name: doc.name.clone(),
            format: doc.format,
            pages: pages.len() as u32,
            ocr_pages,
            chunks: written.len() as u32,
            size_bytes: doc.bytes.len() as u64,
            ingested_at,
        })?;

        report.chunks_succeeded += written.len() as u32;
        report.ocr_pages += ocr_pages;
        report.chunk_ids.extend(written);
        Ok(())
    }

    async fn write_with_retry(&self, chunk: Chunk) -> AppResult<()> {
        let attempts = self.config.ingest.write_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.client.upsert(chunk.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && attempt < attempts => {
                    let backoff = write_backoff(self.config.ingest.write_backoff_ms, attempt);
                    tracing::debug!(
                        chunk = %chunk.id,
                        "Write failed (attempt {}/{}), retrying in {:?}: {}",
                        attempt,
                        attempts,
                        backoff,
                        e
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Delay before retry `attempt` (1-based): doubles each time, capped at 64x.
fn write_backoff(base_ms: u64, attempt: u32) -> Duration {
    Duration::from_millis(base_ms.saturating_mul(1u64 << attempt.saturating_sub(1).min(6)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::providers::trigram::TrigramProvider;
    use crate::ocr::DisabledOcr;
    use crate::store::{DistanceMetric, SearchFilters, SqliteVectorStore, VectorStore};
    use crate::types::{ScoredChunk, StoreStats};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    /// Fails the first `failures` writes with a transient error.
    struct FlakyStore {
        inner: SqliteVectorStore,
        failures: AtomicU32,
    }

    impl VectorStore for FlakyStore {
        fn upsert(&self, chunk: &Chunk) -> AppResult<()> {
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(AppError::Storage("database is locked".to_string()));
            }
            self.inner.upsert(chunk)
        }
        fn search(&self, q: &[f32], k: usize, f: &SearchFilters) -> AppResult<Vec<ScoredChunk>> {
            self.inner.search(q, k, f)
        }
        fn record_source(&self, s: &SourceRecord) -> AppResult<()> {
            self.inner.record_source(s)
        }
        fn retain_chunks(&self, id: &str, keep: &[String]) -> AppResult<usize> {
            self.inner.retain_chunks(id, keep)
        }
        fn get_chunk(&self, id: &str) -> AppResult<Option<Chunk>> {
            self.inner.get_chunk(id)
        }
        fn list_sources(&self) -> AppResult<Vec<SourceRecord>> {
            self.inner.list_sources()
        }
        fn stats(&self) -> AppResult<StoreStats> {
            self.inner.stats()
        }
        fn reset(&self) -> AppResult<()> {
            self.inner.reset()
        }
    }

    fn config() -> Arc<PipelineConfig> {
        let mut config = PipelineConfig::default();
        config.chunking.chunk_size = 120;
        config.chunking.min_chunk_chars = 10;
        config.embedding.dimensions = 64;
        config.ingest.write_backoff_ms = 1;
        Arc::new(config)
    }

    fn ingestor_with(store: Arc<dyn VectorStore>) -> Ingestor {
        let client = VectorStoreClient::new(Arc::new(TrigramProvider::new(64)), store);
        Ingestor::new(client, Arc::new(DisabledOcr), config())
    }

    fn memory_store() -> Arc<dyn VectorStore> {
        Arc::new(SqliteVectorStore::open_in_memory(DistanceMetric::Cosine).unwrap())
    }

    fn paged(name: &str) -> SourceDocument {
        SourceDocument::from_text(
            name,
            "Section 1. Customer records are retained for seven years.\u{0C}\
             Section 2. Access logs are kept for twelve months.",
        )
    }

    #[tokio::test]
    async fn test_ingest_records_pages_and_sources() {
        let store = memory_store();
        let ingestor = ingestor_with(store.clone());

        let report = ingestor.ingest(&[paged("policy.txt")], &IngestOptions::default()).await;

        assert_eq!(report.documents_succeeded, 1);
        assert_eq!(report.chunks_succeeded, 2);
        assert_eq!(report.chunks_failed, 0);

        let second = store.get_chunk(&report.chunk_ids[1]).unwrap().unwrap();
        assert_eq!(second.page, 2);
        assert_eq!(second.source_name, "policy.txt");

        let stats = store.stats().unwrap();
        assert_eq!(stats.documents, 1);
        assert_eq!(stats.chunks, 2);
    }

    #[tokio::test]
    async fn test_reingest_is_idempotent() {
        let store = memory_store();
        let ingestor = ingestor_with(store.clone());
        let docs = vec![paged("policy.txt")];

        let first = ingestor.ingest(&docs, &IngestOptions::default()).await;
        let stats_before = store.stats().unwrap();
        let second = ingestor.ingest(&docs, &IngestOptions::default()).await;
        let stats_after = store.stats().unwrap();

        assert_eq!(first.chunk_ids, second.chunk_ids);
        assert_eq!(stats_before.chunks, stats_after.chunks);
        assert_eq!(stats_before.documents, stats_after.documents);
    }

    #[tokio::test]
    async fn test_shrunk_document_drops_stale_chunks() {
        let store = memory_store();
        let ingestor = ingestor_with(store.clone());

        ingestor.ingest(&[paged("policy.txt")], &IngestOptions::default()).await;
        let shorter = SourceDocument::from_text(
            "policy.txt",
            "Section 1. Customer records are retained for seven years.\u{0C}",
        );
        ingestor.ingest(&[shorter], &IngestOptions::default()).await;

        assert_eq!(store.stats().unwrap().chunks, 1);
    }

    #[tokio::test]
    async fn test_require_metadata_rejects_undivided_text() {
        let store = memory_store();
        let ingestor = ingestor_with(store.clone());
        let flat = SourceDocument::from_text("memo.txt", "Records are kept for seven years.");
        let options = IngestOptions {
            require_metadata: true,
        };

        let report = ingestor.ingest(&[flat, paged("policy.txt")], &options).await;

        assert_eq!(report.documents_failed, 1);
        assert_eq!(report.documents_succeeded, 1);
        assert_eq!(report.failures[0].source, "memo.txt");
        assert!(report.failures[0].reason.contains("metadata"));
    }

    #[tokio::test]
    async fn test_bad_document_does_not_stop_batch() {
        let ingestor = ingestor_with(memory_store());
        let empty = SourceDocument::from_text("empty.txt", "   ");

        let report = ingestor
            .ingest(&[empty, paged("policy.txt")], &IngestOptions::default())
            .await;

        assert_eq!(report.documents_failed, 1);
        assert_eq!(report.documents_succeeded, 1);
    }

    #[tokio::test]
    async fn test_transient_write_failures_are_retried() {
        let store = Arc::new(FlakyStore {
            inner: SqliteVectorStore::open_in_memory(DistanceMetric::Cosine).unwrap(),
            failures: AtomicU32::new(2),
        });
        let ingestor = ingestor_with(store.clone());

        let report = ingestor.ingest(&[paged("policy.txt")], &IngestOptions::default()).await;

        assert_eq!(report.chunks_failed, 0);
        assert_eq!(report.chunks_succeeded, 2);
    }

    #[tokio::test]
    async fn test_exhausted_retries_record_chunk_failure() {
        let store = Arc::new(FlakyStore {
            inner: SqliteVectorStore::open_in_memory(DistanceMetric::Cosine).unwrap(),
            failures: AtomicU32::new(3),
        });
        let ingestor = ingestor_with(store.clone());

        let report = ingestor.ingest(&[paged("policy.txt")], &IngestOptions::default()).await;

        assert_eq!(report.chunks_failed, 1);
        assert_eq!(report.chunks_succeeded, 1);
        assert_eq!(report.documents_succeeded, 1);
        assert!(report.failures[0].chunk_id.is_some());
    }

    #[test]
    fn test_discover_walks_directories() {
        let temp = TempDir::new().unwrap();
        let regs = temp.path().join("regs");
        std::fs::create_dir_all(&regs).unwrap();
        std::fs::write(regs.join("act.txt"), "Section 1").unwrap();
        std::fs::write(regs.join("guide.md"), "# Guide").unwrap();
        std::fs::write(regs.join("photo.png"), [0u8, 1, 2]).unwrap();

        let ingestor = ingestor_with(memory_store());
        let (docs, report) =
            ingestor.discover(&[temp.path().to_path_buf(), temp.path().join("missing.pdf")]);

        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["regs/act.txt", "regs/guide.md"]);
        assert_eq!(report.documents_failed, 1);
    }

    #[test]
    fn test_write_backoff_doubles_and_saturates() {
        assert_eq!(write_backoff(50, 1), Duration::from_millis(50));
        assert_eq!(write_backoff(50, 3), Duration::from_millis(200));
        assert_eq!(write_backoff(50, 100), Duration::from_millis(50 * 64));
        assert_eq!(write_backoff(u64::MAX, 5), Duration::from_millis(u64::MAX));
    }
}
