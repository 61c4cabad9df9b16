//! Entry points used by the CLI: ingest, ask, maintenance and sessions.
//!
//! A `Pipeline` wires the configured backends together once per process.
//! Every query is an independent orchestrator run; the only state shared
//! between runs is the vector store and the session history.

use crate::config::{self, PipelineConfig};
use crate::embeddings::{create_provider, EmbeddingProvider};
use crate::ingest::Ingestor;
use crate::ocr::{self, OcrEngine};
use crate::progress::ProgressReporter;
use crate::rag::generate::CandidateGenerator;
use crate::rag::workflow::{Orchestrator, Query, QueryOptions, RunOutcome};
use crate::rag::CancellationToken;
use crate::session::{Role, SessionStore, SessionSummary, Turn};
use crate::store::sqlite::SqliteVectorStore;
use crate::store::{VectorStore, VectorStoreClient};
use crate::types::{IngestOptions, IngestReport, SourceRecord};
use crate::web::{self, WebSearch};
use chrono::{DateTime, Utc};
use lexrag_core::{AppConfig, AppError, AppResult};
use lexrag_llm::{create_client, LlmClient};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Knowledge base statistics for `lexrag stats`.
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeStats {
    pub documents: u32,
    pub chunks: u32,
    pub last_ingested_at: Option<DateTime<Utc>>,
    pub store_size_bytes: u64,
    pub embedding_model: String,
    pub sources: Vec<SourceRecord>,
}

/// Backends a pipeline is assembled from.
pub struct PipelineParts {
    pub workspace: PathBuf,
    pub config: PipelineConfig,
    pub store: Arc<dyn VectorStore>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub llm: Arc<dyn LlmClient>,
    pub model: String,
    pub web: Option<Arc<dyn WebSearch>>,
    pub ocr: Arc<dyn OcrEngine>,
    pub sessions: SessionStore,
    /// On-disk index, reported by `stats`
    pub index_path: Option<PathBuf>,
}

pub struct Pipeline {
    config: Arc<PipelineConfig>,
    client: VectorStoreClient,
    ocr: Arc<dyn OcrEngine>,
    orchestrator: Orchestrator,
    sessions: SessionStore,
    index_path: Option<PathBuf>,
}

impl Pipeline {
    /// Open the pipeline for the workspace in `app`.
    ///
    /// Web search is enabled only when its API key is present; without it
    /// the pipeline answers from local documents alone.
    pub fn open(app: &AppConfig) -> AppResult<Self> {
        app.ensure_lexrag_dir()?;
        let workspace = app.workspace.clone();
        let config = config::load_config(&workspace)?;
        if !config::get_config_path(&workspace).exists() {
            // Leave an editable copy of the defaults behind
            config::save_config(&workspace, &config)?;
        }

        let api_key = app.resolve_api_key(&app.provider);
        let llm = create_client(
            &app.provider,
            app.endpoint.as_deref(),
            api_key.as_deref(),
            app.provider_timeout(),
        )?;

        let index_path = config::get_index_path(&workspace);
        let store = SqliteVectorStore::open(&index_path, config.retrieval.metric)?;
        let embedder = create_provider(&config.embedding)?;
        let web = web::from_config(&config.web)?;
        let ocr = ocr::default_engine(&config.ingest.ocr_language, config.ingest.ocr_dpi);
        let sessions = SessionStore::open(&config::get_sessions_path(&workspace))?;

        tracing::debug!(
            provider = %app.provider,
            model = %app.model,
            embedder = embedder.model_name(),
            web = web.is_some(),
            "Pipeline opened"
        );

        Self::from_parts(PipelineParts {
            workspace,
            config,
            store: Arc::new(store),
            embedder,
            llm,
            model: app.model.clone(),
            web,
            ocr,
            sessions,
            index_path: Some(index_path),
        })
    }

    pub fn from_parts(parts: PipelineParts) -> AppResult<Self> {
        parts.config.validate()?;
        let config = Arc::new(parts.config);
        let client = VectorStoreClient::new(parts.embedder, parts.store);
        let generator = CandidateGenerator::from_workspace(
            parts.llm,
            parts.model,
            &parts.workspace,
            config.generation.clone(),
        )?;
        let orchestrator =
            Orchestrator::new(Arc::clone(&config), client.clone(), parts.web, generator)?;

        Ok(Self {
            config,
            client,
            ocr: parts.ocr,
            orchestrator,
            sessions: parts.sessions,
            index_path: parts.index_path,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn has_web(&self) -> bool {
        self.orchestrator.has_web()
    }

    /// Ingest files and directories into the vector store.
    pub async fn ingest_paths(
        &self,
        paths: &[PathBuf],
        options: &IngestOptions,
        reset: bool,
        progress: ProgressReporter,
    ) -> AppResult<IngestReport> {
        let started = Instant::now();
        if reset {
            tracing::info!("Resetting vector store before ingestion");
            self.client.store().reset()?;
        }

        let ingestor = Ingestor::new(
            self.client.clone(),
            Arc::clone(&self.ocr),
            Arc::clone(&self.config),
        )
        .with_progress(progress);

        let (documents, mut report) = ingestor.discover(paths);
        if documents.is_empty() && report.failures.is_empty() {
            return Err(AppError::Ingestion(format!(
                "No supported documents found in {:?}",
                paths
            )));
        }

        report.merge(ingestor.ingest(&documents, options).await);
        report.duration_secs = started.elapsed().as_secs_f64();

        tracing::info!(
            documents = report.documents_succeeded,
            failed = report.documents_failed,
            chunks = report.chunks_succeeded,
            "Ingestion finished in {:.2}s",
            report.duration_secs
        );
        Ok(report)
    }

    pub async fn ask(
        &self,
        question: &str,
        session_id: Option<&str>,
        options: QueryOptions,
    ) -> RunOutcome {
        self.ask_with_cancel(question, session_id, options, CancellationToken::new())
            .await
    }

    /// Answer a question, folding in and extending the session history.
    ///
    /// History is read before the run and appended only when it completes,
    /// so a failed or cancelled run leaves the session untouched.
    pub async fn ask_with_cancel(
        &self,
        question: &str,
        session_id: Option<&str>,
        options: QueryOptions,
        cancel: CancellationToken,
    ) -> RunOutcome {
        let mut query = Query::new(question).with_options(options);

        if let Some(id) = session_id {
            query = query.with_session(id);
            match self
                .sessions
                .conversation_context(id, self.config.session.history_turns)
            {
                Ok(conversation) => query = query.with_conversation(conversation),
                Err(e) => tracing::warn!(session = id, "Ignoring session history: {}", e),
            }
        }

        let outcome = self.orchestrator.run_with_cancel(query, cancel).await;

        if let (Some(id), RunOutcome::Completed(answer)) = (session_id, &outcome) {
            let saved = self
                .sessions
                .append(id, Role::User, &answer.question)
                .and_then(|_| self.sessions.append(id, Role::Assistant, &answer.answer));
            if let Err(e) = saved {
                tracing::warn!(session = id, "Failed to save turn: {}", e);
            }
        }

        outcome
    }

    pub fn stats(&self) -> AppResult<KnowledgeStats> {
        let store = self.client.store();
        let stats = store.stats()?;
        let store_size_bytes = self
            .index_path
            .as_deref()
            .and_then(|p| std::fs::metadata(p).ok())
            .map(|m| m.len())
            .unwrap_or(0);

        Ok(KnowledgeStats {
            documents: stats.documents,
            chunks: stats.chunks,
            last_ingested_at: stats.last_ingested_at,
            store_size_bytes,
            embedding_model: self.client.embedder().model_name().to_string(),
            sources: store.list_sources()?,
        })
    }

    /// Remove every document and chunk.
    pub fn clean(&self) -> AppResult<()> {
        tracing::info!("Cleaning vector store");
        self.client.store().reset()
    }

    pub fn sessions(&self) -> AppResult<Vec<SessionSummary>> {
        self.sessions.list()
    }

    /// Stored turns of one session, oldest first.
    pub fn session_turns(&self, session_id: &str) -> AppResult<Vec<Turn>> {
        self.sessions.messages(session_id)
    }

    pub fn reset_session(&self, session_id: &str) -> AppResult<usize> {
        self.sessions.reset(session_id)
    }
}

/// Whether the workspace has been initialised with an index.
pub fn has_index(workspace: &Path) -> bool {
    config::get_index_path(workspace).exists()
}
