//! Command handlers for the lexrag CLI.
//!
//! This module organizes all CLI commands into separate submodules.

pub mod ask;
pub mod ingest;
pub mod knowledge;
pub mod session;

// Re-export command types for convenience
pub use ask::AskCommand;
pub use ingest::IngestCommand;
pub use knowledge::{CleanCommand, StatsCommand};
pub use session::SessionCommand;
