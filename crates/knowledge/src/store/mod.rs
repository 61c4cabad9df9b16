//! Vector store abstraction for knowledge chunks.
//!
//! Defines a trait for backend-agnostic chunk storage and similarity search,
//! plus [`VectorStoreClient`], which pairs a store with the embedder that
//! produced its vectors so callers can search by text.

pub mod sqlite;

pub use sqlite::SqliteVectorStore;

use crate::embeddings::EmbeddingProvider;
use crate::types::{Chunk, ScoredChunk, SourceRecord, StoreStats};
use lexrag_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;

/// Similarity function used to score stored vectors against a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    Cosine,
    Dot,
}

impl DistanceMetric {
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Cosine => cosine_similarity(a, b),
            Self::Dot => a.iter().zip(b.iter()).map(|(x, y)| x * y).sum(),
        }
    }
}

/// Calculate cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Restricts which chunks a search may return.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    pub source_name: Option<String>,
    pub source_id: Option<String>,
    /// Inclusive page range
    pub pages: Option<(u32, u32)>,
    pub min_score: Option<f32>,
}

impl SearchFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = Some(name.into());
        self
    }

    pub fn with_source_id(mut self, id: impl Into<String>) -> Self {
        self.source_id = Some(id.into());
        self
    }

    pub fn with_pages(mut self, first: u32, last: u32) -> Self {
        self.pages = Some((first.min(last), first.max(last)));
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }
}

/// Result ordering: score, then most recently ingested, then id.
pub(crate) fn compare_scored(a: &ScoredChunk, b: &ScoredChunk) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.chunk.ingested_at.cmp(&a.chunk.ingested_at))
        .then_with(|| a.chunk.id.cmp(&b.chunk.id))
}

/// Trait for vector store backends.
///
/// Writes are idempotent on chunk id. Reads never see a chunk without its
/// provenance, because `upsert` refuses to store one.
pub trait VectorStore: Send + Sync {
    /// Insert or replace a chunk and its vector.
    fn upsert(&self, chunk: &Chunk) -> AppResult<()>;

    /// Top-`k` chunks by similarity to `query`, best first.
    fn search(&self, query: &[f32], k: usize, filters: &SearchFilters)
        -> AppResult<Vec<ScoredChunk>>;

    /// Insert or replace the summary row of a document.
    fn record_source(&self, source: &SourceRecord) -> AppResult<()>;

    /// Delete chunks of `source_id` whose ids are not in `keep`. Returns the count removed.
    fn retain_chunks(&self, source_id: &str, keep: &[String]) -> AppResult<usize>;

    fn get_chunk(&self, id: &str) -> AppResult<Option<Chunk>>;

    fn list_sources(&self) -> AppResult<Vec<SourceRecord>>;

    fn stats(&self) -> AppResult<StoreStats>;

    /// Remove all chunks and sources.
    fn reset(&self) -> AppResult<()>;
}

/// Embedder plus store. Cheap to clone.
#[derive(Clone)]
pub struct VectorStoreClient {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
}

impl VectorStoreClient {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Embed one text; failures surface as retrieval errors.
    pub async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        self.embedder
            .embed(text)
            .await
            .map_err(|e| AppError::Retrieval(format!("Failed to embed query: {}", e)))
    }

    pub async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        self.embedder.embed_batch(texts).await
    }

    /// Search with a precomputed query vector.
    pub async fn search(
        &self,
        query: Vec<f32>,
        k: usize,
        filters: SearchFilters,
    ) -> AppResult<Vec<ScoredChunk>> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.search(&query, k, &filters))
            .await
            .map_err(|e| AppError::Retrieval(format!("Search task failed: {}", e)))?
    }

    /// Embed `text` and search.
    pub async fn search_text(
        &self,
        text: &str,
        k: usize,
        filters: SearchFilters,
    ) -> AppResult<Vec<ScoredChunk>> {
        let query = self.embed(text).await?;
        self.search(query, k, filters).await
    }

    pub async fn upsert(&self, chunk: Chunk) -> AppResult<()> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.upsert(&chunk))
            .await
            .map_err(|e| AppError::Storage(format!("Write task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::providers::trigram::TrigramProvider;
    use chrono::{TimeZone, Utc};

    fn scored(id: &str, score: f32, day: u32) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                id: id.to_string(),
                source_id: "s".to_string(),
                source_name: "s.txt".to_string(),
                page: 1,
                offset_start: 0,
                offset_end: 1,
                text: "x".to_string(),
                vector: vec![],
                ingested_at: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
            },
            score,
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 0.001);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 0.001);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_dot_metric_ignores_magnitude_normalization() {
        assert_eq!(DistanceMetric::Dot.score(&[2.0, 0.0], &[3.0, 0.0]), 6.0);
        assert!((DistanceMetric::Cosine.score(&[2.0, 0.0], &[3.0, 0.0]) - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_ties_prefer_recent_then_id() {
        let mut results = vec![
            scored("b", 0.5, 1),
            scored("a", 0.5, 1),
            scored("c", 0.5, 2),
            scored("d", 0.9, 1),
        ];
        results.sort_by(compare_scored);
        let ids: Vec<&str> = results.iter().map(|r| r.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["d", "c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_client_search_text() {
        let store = Arc::new(SqliteVectorStore::open_in_memory(DistanceMetric::Cosine).unwrap());
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(TrigramProvider::new(64));
        let client = VectorStoreClient::new(embedder.clone(), store);

        let text = "Customer records are retained for seven years";
        let mut chunk = scored("c1", 0.0, 1).chunk;
        chunk.text = text.to_string();
        chunk.vector = embedder.embed(text).await.unwrap();
        client.upsert(chunk).await.unwrap();

        let results = client
            .search_text("customer records retained", 3, SearchFilters::new())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.id, "c1");
        assert!(results[0].score > 0.0);
    }
}
