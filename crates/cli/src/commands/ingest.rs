//! Ingest command handler.
//!
//! Reads documents into the local vector store.

use clap::Args;
use lexrag_core::{config::AppConfig, AppResult};
use lexrag_knowledge::{IngestOptions, Pipeline, ProgressReporter};
use std::path::PathBuf;
use std::sync::Arc;

/// Ingest documents into the knowledge base
#[derive(Args, Debug)]
pub struct IngestCommand {
    /// Files or directories to ingest
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Reject documents without page or section structure
    #[arg(long)]
    pub require_metadata: bool,

    /// Remove everything from the store before ingesting
    #[arg(long)]
    pub reset: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl IngestCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ingest command for {} path(s)", self.paths.len());

        let pipeline = Pipeline::open(config)?;
        let options = IngestOptions {
            require_metadata: self.require_metadata,
        };

        // Progress goes to stderr so stdout stays parseable.
        let progress = ProgressReporter::new(Arc::new(|event| eprintln!("{}", event.format_simple())));

        let report = pipeline
            .ingest_paths(&self.paths, &options, self.reset, progress)
            .await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            println!(
                "Ingested {} document(s), {} chunk(s) in {:.2}s",
                report.documents_succeeded, report.chunks_succeeded, report.duration_secs
            );
            if report.ocr_pages > 0 {
                println!("  OCR pages: {}", report.ocr_pages);
            }
            if !report.failures.is_empty() {
                println!(
                    "  Failed: {} document(s), {} chunk(s)",
                    report.documents_failed, report.chunks_failed
                );
                for failure in &report.failures {
                    match &failure.chunk_id {
                        Some(chunk) => println!("  - {} [{}]: {}", failure.source, chunk, failure.reason),
                        None => println!("  - {}: {}", failure.source, failure.reason),
                    }
                }
            }
        }

        Ok(())
    }
}
