//! Error types for lexrag.
//!
//! A single enum covers every failure category of the pipeline. Variants
//! line up with the stages of the answer workflow so callers can tell a
//! dead vector store from a flaky model call without string matching.

use thiserror::Error;

/// Unified error type for lexrag.
///
/// All functions in the workspace return `Result<T, AppError>`.
/// "Insufficient evidence" is deliberately absent: it is an answer, not an error.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Language-model provider errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Per-document parse, OCR or chunking failure
    #[error("Ingestion failure: {0}")]
    Ingestion(String),

    /// Vector store or embedding backend unreachable
    #[error("Retrieval failure: {0}")]
    Retrieval(String),

    /// Web search unreachable, unauthorized or empty
    #[error("Augmentation failure: {0}")]
    Augmentation(String),

    /// Candidate generation failed
    #[error("Generation failure: {0}")]
    Generation(String),

    /// No candidate could be scored
    #[error("Ranking failure: {0}")]
    Ranking(String),

    /// Local database errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Prompt system errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Query rejected before any retrieval happened
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// The run was cancelled by its caller
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Stable identifier used in structured error output.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Config(_) => "config_error",
            AppError::Io(_) => "io_error",
            AppError::Llm(_) => "llm_error",
            AppError::Ingestion(_) => "ingestion_failure",
            AppError::Retrieval(_) => "retrieval_failure",
            AppError::Augmentation(_) => "augmentation_failure",
            AppError::Generation(_) => "generation_failure",
            AppError::Ranking(_) => "ranking_failure",
            AppError::Storage(_) => "storage_error",
            AppError::Prompt(_) => "prompt_error",
            AppError::InvalidQuery(_) => "invalid_query",
            AppError::Cancelled(_) => "cancelled",
            AppError::Serialization(_) => "serialization_error",
            AppError::Other(_) => "other",
        }
    }

    /// Whether re-running the same read/compute step may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::Io(_)
                | AppError::Llm(_)
                | AppError::Retrieval(_)
                | AppError::Augmentation(_)
                | AppError::Generation(_)
                | AppError::Storage(_)
        )
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
