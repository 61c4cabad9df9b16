//! Embedding providers.
//!
//! `trigram` is deterministic and offline; `ollama` calls a local embedding
//! model. Both return unit-length vectors of the configured dimension.

pub mod provider;
pub mod providers;

pub use provider::{create_provider, EmbeddingProvider};
