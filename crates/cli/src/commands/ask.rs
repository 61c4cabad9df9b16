//! Ask command handler.
//!
//! Runs one question through the answer workflow and prints the answer with
//! its citations, or a structured error when the run fails.

use clap::Args;
use lexrag_core::{config::AppConfig, AppResult};
use lexrag_knowledge::pipeline::has_index;
use lexrag_knowledge::rag::EvidenceItem;
use lexrag_knowledge::{
    AnswerKind, CancellationToken, Pipeline, QueryAnswer, QueryOptions, RunFailure, RunOutcome,
    SearchFilters, WebMode,
};
use std::collections::BTreeSet;

/// Ask a question about the ingested documents
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: String,

    /// Session id for follow-up questions
    #[arg(short, long)]
    pub session: Option<String>,

    /// Always search the web alongside local documents
    #[arg(long, conflicts_with = "no_web")]
    pub web: bool,

    /// Never search the web
    #[arg(long)]
    pub no_web: bool,

    /// Number of candidate answers to generate
    #[arg(long)]
    pub candidates: Option<usize>,

    /// Only use chunks from this source file
    #[arg(long)]
    pub source: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");
        tracing::debug!("Ask command options: {:?}", self);

        if !has_index(&config.workspace) {
            tracing::warn!("No documents ingested yet; run 'lexrag ingest' first");
        }

        let pipeline = Pipeline::open(config)?;

        // Ctrl-C cancels the run instead of killing the process mid-call.
        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_interrupt.cancel();
            }
        });

        let outcome = pipeline
            .ask_with_cancel(&self.question, self.session.as_deref(), self.options(), cancel)
            .await;

        match outcome {
            RunOutcome::Completed(answer) => self.print_answer(&answer),
            RunOutcome::Failed(failure) => {
                self.print_failure(&failure)?;
                Err(failure.error)
            }
        }
    }

    fn options(&self) -> QueryOptions {
        let web = if self.no_web {
            WebMode::Off
        } else if self.web {
            WebMode::Force
        } else {
            WebMode::Auto
        };

        let mut filters = SearchFilters::new();
        if let Some(source) = &self.source {
            filters = filters.with_source_name(source);
        }

        QueryOptions {
            web,
            candidates: self.candidates,
            filters,
        }
    }

    fn print_answer(&self, answer: &QueryAnswer) -> AppResult<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(answer)?);
            return Ok(());
        }

        println!("{}", answer.answer);
        println!();

        if answer.kind == AnswerKind::InsufficientEvidence {
            println!("Confidence: 0.00 (insufficient evidence)");
            return Ok(());
        }
        println!("Confidence: {:.2}", answer.confidence);

        let mut seen = BTreeSet::new();
        let sources: Vec<&EvidenceItem> = answer
            .citations
            .iter()
            .map(|c| &c.evidence)
            .filter(|e| seen.insert(e.label.clone()))
            .collect();

        if sources.is_empty() {
            println!("Sources: (none)");
        } else {
            println!("Sources:");
            for evidence in sources {
                println!("- [{}] {}", evidence.label, evidence.source.describe());
            }
        }

        if !answer.unsupported.is_empty() {
            println!();
            println!("Unsupported statements (no matching source):");
            for span in &answer.unsupported {
                println!("- {}", span.text);
            }
        }

        Ok(())
    }

    fn print_failure(&self, failure: &RunFailure) -> AppResult<()> {
        let evidence: Vec<serde_json::Value> = failure
            .partial_evidence
            .items()
            .iter()
            .map(|e| {
                serde_json::json!({
                    "label": e.label,
                    "source": e.source.describe(),
                    "score": e.score,
                })
            })
            .collect();

        if self.json {
            let output = serde_json::json!({
                "error": {
                    "kind": failure.error.kind(),
                    "message": failure.error.to_string(),
                    "stage": failure.stage,
                    "run_id": failure.run_id,
                    "partial_evidence": evidence,
                }
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            eprintln!("Could not answer ({}): {}", failure.stage, failure.error);
            if !evidence.is_empty() {
                eprintln!("Evidence gathered before the failure:");
                for item in failure.partial_evidence.items() {
                    eprintln!("- [{}] {}", item.label, item.source.describe());
                }
            }
        }

        Ok(())
    }
}
