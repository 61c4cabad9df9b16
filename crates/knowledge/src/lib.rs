//! Citation-preserving retrieval over legal and regulatory documents.
//!
//! The offline path turns documents into page-tagged, embedded chunks in a
//! local SQLite vector store. The online path answers questions from those
//! chunks (plus optional web results) and ties every claim in the answer
//! back to the page or URL that supports it.

pub mod chunker;
pub mod config;
pub mod embeddings;
pub mod ingest;
pub mod ocr;
pub mod parser;
pub mod pdf;
pub mod pipeline;
pub mod progress;
pub mod rag;
pub mod session;
pub mod store;
pub mod types;
pub mod web;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use config::{load_config, PipelineConfig};
pub use pipeline::{KnowledgeStats, Pipeline, PipelineParts};
pub use progress::{ProgressEvent, ProgressReporter};
pub use rag::{
    AnswerKind, CancellationToken, Citation, QueryAnswer, QueryOptions, RunFailure, RunOutcome,
    Stage, WebMode,
};
pub use session::{Role, SessionSummary, Turn};
pub use store::SearchFilters;
pub use types::{Chunk, IngestFailure, IngestOptions, IngestReport, SourceDocument, StoreStats};
