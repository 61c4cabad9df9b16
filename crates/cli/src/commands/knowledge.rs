//! Knowledge base maintenance: statistics and reset.

use clap::Args;
use lexrag_core::{config::AppConfig, AppError, AppResult};
use lexrag_knowledge::Pipeline;

/// Show knowledge base statistics
#[derive(Args, Debug)]
pub struct StatsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatsCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing stats command");

        let pipeline = Pipeline::open(config)?;
        let stats = pipeline.stats()?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        } else {
            println!("Knowledge base: {}", config.workspace.display());
            println!("  Documents: {}", stats.documents);
            println!("  Chunks: {}", stats.chunks);
            println!("  Store size: {} bytes", stats.store_size_bytes);
            println!("  Embedding model: {}", stats.embedding_model);
            if let Some(last) = stats.last_ingested_at {
                println!("  Last ingestion: {}", last.to_rfc3339());
            }
            for source in &stats.sources {
                println!(
                    "  - {} ({} pages, {} chunks)",
                    source.name, source.pages, source.chunks
                );
            }
        }

        Ok(())
    }
}

/// Remove every document from the knowledge base
#[derive(Args, Debug)]
pub struct CleanCommand {
    /// Confirm deletion
    #[arg(short, long)]
    pub yes: bool,
}

impl CleanCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing clean command");

        if !self.yes {
            return Err(AppError::Config(
                "Refusing to delete the knowledge base without --yes".to_string(),
            ));
        }

        let pipeline = Pipeline::open(config)?;
        pipeline.clean()?;
        println!("Knowledge base cleaned");

        Ok(())
    }
}
