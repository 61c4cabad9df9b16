//! SQLite-backed vector store.
//!
//! Vectors are stored as little-endian `f32` blobs and scored in process.
//! Metadata filters are applied in SQL before any vector is decoded.

use super::{compare_scored, DistanceMetric, SearchFilters, VectorStore};
use crate::types::{Chunk, DocumentFormat, ScoredChunk, SourceRecord, StoreStats};
use chrono::{DateTime, Utc};
use lexrag_core::{AppError, AppResult};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sources (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    format TEXT NOT NULL,
    pages INTEGER NOT NULL,
    ocr_pages INTEGER NOT NULL,
    chunks INTEGER NOT NULL,
    size_bytes INTEGER NOT NULL,
    ingested_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS chunks (
    id TEXT PRIMARY KEY,
    source_id TEXT NOT NULL,
    source_name TEXT NOT NULL,
    page INTEGER NOT NULL CHECK (page >= 1),
    offset_start INTEGER NOT NULL,
    offset_end INTEGER NOT NULL,
    text TEXT NOT NULL,
    vector BLOB NOT NULL,
    ingested_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source_id);
CREATE INDEX IF NOT EXISTS idx_chunks_source_name ON chunks(source_name);
"#;

const CHUNK_COLUMNS: &str =
    "id, source_id, source_name, page, offset_start, offset_end, text, vector, ingested_at";

/// Vector store in a single SQLite file.
pub struct SqliteVectorStore {
    conn: Mutex<Connection>,
    metric: DistanceMetric,
}

impl SqliteVectorStore {
    /// Open (creating if needed) the store at `db_path`.
    pub fn open(db_path: &Path, metric: DistanceMetric) -> AppResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Storage(format!("Failed to create index directory: {}", e))
            })?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| AppError::Storage(format!("Failed to open SQLite index: {}", e)))?;
        let store = Self::init(conn, metric)?;

        tracing::debug!("Opened vector store at {:?}", db_path);
        Ok(store)
    }

    pub fn open_in_memory(metric: DistanceMetric) -> AppResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Storage(format!("Failed to open in-memory index: {}", e)))?;
        Self::init(conn, metric)
    }

    fn init(conn: Connection, metric: DistanceMetric) -> AppResult<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| AppError::Storage(format!("Failed to create tables: {}", e)))?;
        Ok(Self {
            conn: Mutex::new(conn),
            metric,
        })
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    fn conn(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Storage("Vector store lock poisoned".to_string()))
    }
}

impl VectorStore for SqliteVectorStore {
    fn upsert(&self, chunk: &Chunk) -> AppResult<()> {
        if !chunk.has_provenance() {
            return Err(AppError::Ingestion(format!(
                "Chunk {} has no source or page and cannot be stored",
                chunk.id
            )));
        }
        if chunk.vector.is_empty() {
            return Err(AppError::Ingestion(format!("Chunk {} has no vector", chunk.id)));
        }

        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO chunks (id, source_id, source_name, page, offset_start, offset_end, text, vector, ingested_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                chunk.id,
                chunk.source_id,
                chunk.source_name,
                chunk.page as i64,
                chunk.offset_start as i64,
                chunk.offset_end as i64,
                chunk.text,
                vector_to_bytes(&chunk.vector),
                chunk.ingested_at.to_rfc3339(),
            ],
        )
        .map_err(|e| AppError::Storage(format!("Failed to write chunk {}: {}", chunk.id, e)))?;

        Ok(())
    }

    fn search(
        &self,
        query: &[f32],
        k: usize,
        filters: &SearchFilters,
    ) -> AppResult<Vec<ScoredChunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut clauses = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if let Some(name) = &filters.source_name {
            clauses.push("source_name = ?");
            values.push(Value::Text(name.clone()));
        }
        if let Some(id) = &filters.source_id {
            clauses.push("source_id = ?");
            values.push(Value::Text(id.clone()));
        }
        if let Some((first, last)) = filters.pages {
            clauses.push("page BETWEEN ? AND ?");
            values.push(Value::Integer(first as i64));
            values.push(Value::Integer(last as i64));
        }

        let mut sql = format!("SELECT {} FROM chunks", CHUNK_COLUMNS);
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| AppError::Retrieval(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params_from_iter(values), row_to_chunk)
            .map_err(|e| AppError::Retrieval(format!("Failed to query chunks: {}", e)))?;

        let mut results = Vec::new();
        for row in rows {
            let chunk =
                row.map_err(|e| AppError::Retrieval(format!("Failed to read chunk: {}", e)))?;
            if chunk.vector.len() != query.len() {
                // Retrying cannot fix an index built by another embedding model
                return Err(AppError::Config(format!(
                    "Index vectors have {} dimensions but the query has {}; re-ingest after changing the embedding model",
                    chunk.vector.len(),
                    query.len()
                )));
            }
            let score = self.metric.score(query, &chunk.vector);
            if filters.min_score.map_or(true, |min| score >= min) {
                results.push(ScoredChunk { chunk, score });
            }
        }

        results.sort_by(compare_scored);
        results.truncate(k);

        tracing::debug!(
            "Retrieved {} chunks (requested top-{})",
            results.len(),
            k
        );

        Ok(results)
    }

    fn record_source(&self, source: &SourceRecord) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO sources (id, name, format, pages, ocr_pages, chunks, size_bytes, ingested_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                source.id,
                source.name,
                source.format.as_str(),
                source.pages as i64,
                source.ocr_pages as i64,
                source.chunks as i64,
                source.size_bytes as i64,
                source.ingested_at.to_rfc3339(),
            ],
        )
        .map_err(|e| AppError::Storage(format!("Failed to record source {}: {}", source.id, e)))?;
        Ok(())
    }

    fn retain_chunks(&self, source_id: &str, keep: &[String]) -> AppResult<usize> {
        let keep: HashSet<&str> = keep.iter().map(|s| s.as_str()).collect();
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Storage(format!("Failed to begin transaction: {}", e)))?;

        let stale: Vec<String> = {
            let mut stmt = tx
                .prepare("SELECT id FROM chunks WHERE source_id = ?1")
                .map_err(|e| AppError::Storage(e.to_string()))?;
            let ids = stmt
                .query_map(params![source_id], |row| row.get::<_, String>(0))
                .map_err(|e| AppError::Storage(e.to_string()))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| AppError::Storage(e.to_string()))?;
            ids.into_iter().filter(|id| !keep.contains(id.as_str())).collect()
        };

        for id in &stale {
            tx.execute("DELETE FROM chunks WHERE id = ?1", params![id])
                .map_err(|e| AppError::Storage(format!("Failed to delete chunk {}: {}", id, e)))?;
        }
        tx.commit()
            .map_err(|e| AppError::Storage(format!("Failed to commit: {}", e)))?;

        if !stale.is_empty() {
            tracing::debug!(source = source_id, removed = stale.len(), "Removed stale chunks");
        }
        Ok(stale.len())
    }

    fn get_chunk(&self, id: &str) -> AppResult<Option<Chunk>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM chunks WHERE id = ?1", CHUNK_COLUMNS),
            params![id],
            row_to_chunk,
        )
        .optional()
        .map_err(|e| AppError::Storage(format!("Failed to read chunk {}: {}", id, e)))
    }

    fn list_sources(&self) -> AppResult<Vec<SourceRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, name, format, pages, ocr_pages, chunks, size_bytes, ingested_at
                 FROM sources ORDER BY name, id",
            )
            .map_err(|e| AppError::Storage(e.to_string()))?;

        let rows = stmt
            .query_map([], |row| {
                let format: String = row.get(2)?;
                Ok(SourceRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    format: parse_format(&format),
                    pages: row.get::<_, i64>(3)? as u32,
                    ocr_pages: row.get::<_, i64>(4)? as u32,
                    chunks: row.get::<_, i64>(5)? as u32,
                    size_bytes: row.get::<_, i64>(6)? as u64,
                    ingested_at: parse_timestamp(row, 7)?,
                })
            })
            .map_err(|e| AppError::Storage(e.to_string()))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::Storage(format!("Failed to list sources: {}", e)))
    }

    fn stats(&self) -> AppResult<StoreStats> {
        let conn = self.conn()?;
        let count = |sql: &str| -> AppResult<u32> {
            conn.query_row(sql, [], |row| row.get::<_, i64>(0).map(|v| v as u32))
                .map_err(|e| AppError::Storage(format!("Failed to read stats: {}", e)))
        };

        let documents = count("SELECT COUNT(*) FROM sources")?;
        let chunks = count("SELECT COUNT(*) FROM chunks")?;
        let last: Option<String> = conn
            .query_row("SELECT MAX(ingested_at) FROM sources", [], |row| row.get(0))
            .map_err(|e| AppError::Storage(format!("Failed to read stats: {}", e)))?;

        Ok(StoreStats {
            documents,
            chunks,
            last_ingested_at: last
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|d| d.with_timezone(&Utc)),
        })
    }

    fn reset(&self) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute_batch("DELETE FROM chunks; DELETE FROM sources;")
            .map_err(|e| AppError::Storage(format!("Failed to reset index: {}", e)))?;

        tracing::info!("Reset vector store");
        Ok(())
    }
}

fn row_to_chunk(row: &Row<'_>) -> rusqlite::Result<Chunk> {
    let bytes: Vec<u8> = row.get(7)?;
    let vector = bytes_to_vector(&bytes).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            7,
            Type::Blob,
            "vector blob length is not a multiple of 4".into(),
        )
    })?;

    Ok(Chunk {
        id: row.get(0)?,
        source_id: row.get(1)?,
        source_name: row.get(2)?,
        page: row.get::<_, i64>(3)? as u32,
        offset_start: row.get::<_, i64>(4)? as usize,
        offset_end: row.get::<_, i64>(5)? as usize,
        text: row.get(6)?,
        vector,
        ingested_at: parse_timestamp(row, 8)?,
    })
}

fn parse_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_format(raw: &str) -> DocumentFormat {
    match raw {
        "pdf" => DocumentFormat::Pdf,
        "markdown" => DocumentFormat::Markdown,
        "html" => DocumentFormat::Html,
        _ => DocumentFormat::Text,
    }
}

fn vector_to_bytes(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for &value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn bytes_to_vector(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}
