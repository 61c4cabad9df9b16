//! Per-query workflow.
//!
//! A run moves through a fixed set of stages:
//!
//! ```text
//! Received -> LocalRetrieval -> [WebAugmentation] -> Generation -> Ranking -> [Citation] -> Completed
//! ```
//!
//! with `Failed` reachable from any stage. Stage order lives in the pure
//! [`transition`] function; [`Orchestrator`] executes one stage at a time and
//! feeds each outcome back into it. Stages only read or compute, so
//! re-entering a stage after a transient failure is always safe.

use crate::config::PipelineConfig;
use crate::rag::cancel::CancellationToken;
use crate::rag::cite::{CitationComposer, CitationReport};
use crate::rag::generate::CandidateGenerator;
use crate::rag::guard::QueryGuard;
use crate::rag::rank::Ranker;
use crate::rag::redact::PiiRedactor;
use crate::rag::types::{
    AnswerCandidate, AnswerKind, EvidenceSet, QueryAnswer, RankedAnswer, StageRecord,
    INSUFFICIENT_EVIDENCE_ANSWER,
};
use crate::store::{SearchFilters, VectorStoreClient};
use crate::web::{WebSearch, WebSnippet};
use chrono::{DateTime, Utc};
use lexrag_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    LocalRetrieval,
    WebAugmentation,
    Generation,
    Ranking,
    Citation,
    Completed,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::LocalRetrieval => "local_retrieval",
            Self::WebAugmentation => "web_augmentation",
            Self::Generation => "generation",
            Self::Ranking => "ranking",
            Self::Citation => "citation",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of executing one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    Advanced,
    Failed {
        /// Re-running the stage may succeed
        transient: bool,
        /// The run can continue without this stage's output
        degradable: bool,
    },
}

/// Facts the transition function needs besides the stage itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Guards {
    /// Retries already spent on the current stage
    pub retries_used: u32,
    pub max_retries: u32,
    /// Local retrieval should be followed by web augmentation
    pub augment: bool,
    /// Ranking found nothing to cite
    pub skip_citation: bool,
}

/// Next stage for a step outcome.
///
/// A transient failure re-enters the same stage while retries remain. Once
/// they are spent, a degradable failure moves on to generation and any other
/// failure ends the run. Terminal stages never move.
pub fn transition(stage: Stage, result: &StepResult, guards: &Guards) -> Stage {
    if stage.is_terminal() {
        return stage;
    }

    match result {
        StepResult::Advanced => match stage {
            Stage::Received => Stage::LocalRetrieval,
            Stage::LocalRetrieval if guards.augment => Stage::WebAugmentation,
            Stage::LocalRetrieval => Stage::Generation,
            Stage::WebAugmentation => Stage::Generation,
            Stage::Generation => Stage::Ranking,
            Stage::Ranking if guards.skip_citation => Stage::Completed,
            Stage::Ranking => Stage::Citation,
            Stage::Citation => Stage::Completed,
            Stage::Completed | Stage::Failed => stage,
        },
        StepResult::Failed {
            transient,
            degradable,
        } => {
            if *transient && guards.retries_used < guards.max_retries {
                stage
            } else if *degradable {
                Stage::Generation
            } else {
                Stage::Failed
            }
        }
    }
}

/// How a query may use web search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebMode {
    /// Search the web when local evidence is weak
    #[default]
    Auto,
    /// Always search, alongside local retrieval
    Force,
    Off,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    pub web: WebMode,
    /// Overrides the configured candidate count
    pub candidates: Option<usize>,
    pub filters: SearchFilters,
}

/// A question submitted to the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub text: String,
    pub session_id: Option<String>,
    pub received_at: DateTime<Utc>,
    /// Rendered earlier turns of the session
    pub conversation: Option<String>,
    pub options: QueryOptions,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            session_id: None,
            received_at: Utc::now(),
            conversation: None,
            options: QueryOptions::default(),
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_conversation(mut self, conversation: Option<String>) -> Self {
        self.conversation = conversation.filter(|c| !c.trim().is_empty());
        self
    }

    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    /// Text used for similarity search: the question, preceded by the
    /// conversation so follow-ups like "and for contractors?" still retrieve.
    fn retrieval_text(&self, question: &str) -> String {
        match &self.conversation {
            Some(conversation) => format!("{}\n{}", conversation, question),
            None => question.to_string(),
        }
    }
}

/// Terminal failure of a run. Never carries an answer.
#[derive(Debug)]
pub struct RunFailure {
    pub run_id: String,
    /// Stage that failed
    pub stage: Stage,
    pub error: AppError,
    /// Evidence gathered before the failure
    pub partial_evidence: EvidenceSet,
    pub trace: Vec<StageRecord>,
}

#[derive(Debug)]
pub enum RunOutcome {
    Completed(QueryAnswer),
    Failed(RunFailure),
}

/// State of one query moving through the stages. Dropped when the run ends.
struct WorkflowRun {
    id: String,
    stage: Stage,
    question: String,
    evidence: EvidenceSet,
    /// Result of a web search issued together with local retrieval
    prefetched_web: Option<AppResult<Vec<WebSnippet>>>,
    candidates: Vec<AnswerCandidate>,
    ranked: Option<RankedAnswer>,
    citations: CitationReport,
    retries_used: u32,
    augment: bool,
    trace: Vec<StageRecord>,
}

impl WorkflowRun {
    fn new(query: &Query) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            stage: Stage::Received,
            question: query.text.trim().to_string(),
            evidence: EvidenceSet::default(),
            prefetched_web: None,
            candidates: Vec::new(),
            ranked: None,
            citations: CitationReport::default(),
            retries_used: 0,
            augment: false,
            trace: Vec::new(),
        }
    }

    fn record(&mut self, outcome: impl Into<String>, started: Instant) {
        self.trace.push(StageRecord {
            stage: self.stage.as_str().to_string(),
            outcome: outcome.into(),
            attempt: self.retries_used + 1,
            elapsed_ms: started.elapsed().as_millis() as u64,
        });
    }
}

/// Runs queries through retrieval, augmentation, generation, ranking and
/// citation. Holds only read-only configuration and shared clients, so one
/// orchestrator serves any number of concurrent runs.
pub struct Orchestrator {
    config: Arc<PipelineConfig>,
    store: VectorStoreClient,
    web: Option<Arc<dyn WebSearch>>,
    generator: CandidateGenerator,
    ranker: Ranker,
    composer: CitationComposer,
    guard: QueryGuard,
    redactor: Option<PiiRedactor>,
}

impl Orchestrator {
    pub fn new(
        config: Arc<PipelineConfig>,
        store: VectorStoreClient,
        web: Option<Arc<dyn WebSearch>>,
        generator: CandidateGenerator,
    ) -> AppResult<Self> {
        let ranker = Ranker::new(
            config.ranking.clone(),
            config.attribution.clone(),
            config.web.effective_trust(),
        );
        let composer = CitationComposer::new(config.attribution.clone());
        let guard = QueryGuard::new(&config.guard)?;
        let redactor = if config.guard.redact_pii {
            Some(PiiRedactor::new()?)
        } else {
            None
        };

        Ok(Self {
            config,
            store,
            web,
            generator,
            ranker,
            composer,
            guard,
            redactor,
        })
    }

    pub fn has_web(&self) -> bool {
        self.web.is_some()
    }

    pub async fn run(&self, query: Query) -> RunOutcome {
        self.run_with_cancel(query, CancellationToken::new()).await
    }

    /// Run a query until it completes, fails or `cancel` fires.
    ///
    /// Cancellation drops the in-flight stage, which releases any pending
    /// model, search or store call. Nothing a stage does needs undoing.
    pub async fn run_with_cancel(&self, query: Query, cancel: CancellationToken) -> RunOutcome {
        let mut run = WorkflowRun::new(&query);
        info!(run_id = %run.id, session = ?query.session_id, "Query received");

        loop {
            if run.stage == Stage::Completed {
                return RunOutcome::Completed(self.finish(run));
            }

            let started = Instant::now();
            let stage = run.stage;
            let executed = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(AppError::Cancelled(format!(
                    "Run cancelled during {}",
                    stage
                ))),
                result = self.execute(&mut run, &query) => result,
            };

            let (result, error) = match executed {
                Ok(()) => {
                    run.record("ok", started);
                    (StepResult::Advanced, None)
                }
                Err(AppError::Cancelled(message)) => {
                    run.record("cancelled", started);
                    info!(run_id = %run.id, stage = %run.stage, "Run cancelled");
                    return self.fail(run, AppError::Cancelled(message));
                }
                Err(e) => {
                    run.record(format!("error: {}", e), started);
                    let result = StepResult::Failed {
                        transient: e.is_transient(),
                        degradable: run.stage == Stage::WebAugmentation,
                    };
                    (result, Some(e))
                }
            };

            let guards = Guards {
                retries_used: run.retries_used,
                max_retries: self.config.workflow.max_stage_retries,
                augment: run.augment,
                skip_citation: run
                    .ranked
                    .as_ref()
                    .is_some_and(|r| r.kind == AnswerKind::InsufficientEvidence),
            };
            let next = transition(run.stage, &result, &guards);

            match (next, error) {
                (Stage::Failed, Some(e)) => {
                    warn!(run_id = %run.id, stage = %run.stage, "Run failed: {}", e);
                    return self.fail(run, e);
                }
                (next, Some(e)) if next == run.stage => {
                    run.retries_used += 1;
                    let backoff = self.retry_backoff(run.retries_used);
                    warn!(
                        run_id = %run.id,
                        stage = %run.stage,
                        retry = run.retries_used,
                        "Retrying stage in {:?}: {}",
                        backoff,
                        e
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            return self.fail(run, AppError::Cancelled("Run cancelled while waiting to retry".to_string()));
                        }
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
                (next, error) => {
                    if let Some(e) = error {
                        info!(run_id = %run.id, stage = %run.stage, "Continuing without {}: {}", run.stage, e);
                    }
                    debug!(run_id = %run.id, from = %run.stage, to = %next, "Stage transition");
                    run.stage = next;
                    run.retries_used = 0;
                }
            }
        }
    }

    fn retry_backoff(&self, retry: u32) -> Duration {
        let base = self.config.workflow.retry_backoff_ms;
        Duration::from_millis(base.saturating_mul(1u64 << retry.saturating_sub(1).min(6)))
    }

    /// Execute the current stage. Each arm assigns its results to `run` only
    /// after its last await point, so a dropped stage leaves no partial state.
    async fn execute(&self, run: &mut WorkflowRun, query: &Query) -> AppResult<()> {
        match run.stage {
            Stage::Received => {
                run.question = self.guard.check(&query.text)?;
                Ok(())
            }
            Stage::LocalRetrieval => self.retrieve(run, query).await,
            Stage::WebAugmentation => {
                let snippets = match run.prefetched_web.take() {
                    Some(prefetched) => prefetched?,
                    None => self.search_web(&run.question).await?,
                };
                info!(run_id = %run.id, snippets = snippets.len(), "Web evidence added");
                run.evidence.web = snippets;
                Ok(())
            }
            Stage::Generation => {
                let n = query
                    .options
                    .candidates
                    .unwrap_or(self.config.generation.candidates)
                    .max(1);
                let candidates = self
                    .generator
                    .generate(
                        &run.question,
                        query.conversation.as_deref(),
                        &run.evidence,
                        n,
                    )
                    .await?;
                run.candidates = candidates;
                Ok(())
            }
            Stage::Ranking => {
                let mut ranked = self.ranker.rank(&run.question, &run.candidates);
                if let Some(selected) = ranked.selected.as_mut() {
                    self.filter_output(&run.id, &mut selected.text);
                }
                info!(
                    run_id = %run.id,
                    kind = ?ranked.kind,
                    confidence = ranked.confidence,
                    "{}",
                    ranked.rationale
                );
                run.ranked = Some(ranked);
                Ok(())
            }
            Stage::Citation => {
                let selected = run
                    .ranked
                    .as_ref()
                    .and_then(|r| r.selected.as_ref())
                    .ok_or_else(|| AppError::Ranking("No selected answer to cite".to_string()))?;
                run.citations = self.composer.attach(&selected.text, &selected.evidence);
                Ok(())
            }
            Stage::Completed | Stage::Failed => Ok(()),
        }
    }

    /// Mask personal data in the selected answer and flag injection phrases
    /// echoed from the evidence. Runs before citation so spans match the
    /// returned text.
    fn filter_output(&self, run_id: &str, text: &mut String) {
        if let Some(redactor) = &self.redactor {
            let (redacted, counts) = redactor.redact(text);
            if counts.total() > 0 {
                info!(
                    run_id,
                    emails = counts.emails,
                    phones = counts.phones,
                    national_ids = counts.national_ids,
                    "Redacted personal data from answer"
                );
                *text = redacted;
            }
        }

        let hits = self.guard.injection_hits(text);
        if !hits.is_empty() {
            warn!(run_id, hits = ?hits, "Answer contains prompt-injection language");
        }
    }

    async fn retrieve(&self, run: &mut WorkflowRun, query: &Query) -> AppResult<()> {
        let mut filters = query.options.filters.clone();
        if filters.min_score.is_none() {
            filters.min_score = Some(self.config.retrieval.min_score);
        }
        let text = query.retrieval_text(&run.question);
        let local = self
            .store
            .search_text(&text, self.config.retrieval.top_k, filters);

        let force = query.options.web == WebMode::Force && self.web.is_some();
        let chunks = if force && run.prefetched_web.is_none() {
            let (local, web) = tokio::join!(local, self.search_web(&run.question));
            run.prefetched_web = Some(web);
            local?
        } else {
            local.await?
        };

        let top = chunks.first().map(|c| c.score).unwrap_or(0.0);
        run.evidence.local = chunks;
        run.augment = self.wants_web(query, run.evidence.top_local_score());

        info!(
            run_id = %run.id,
            chunks = run.evidence.local.len(),
            top_score = top,
            augment = run.augment,
            "Local retrieval done"
        );
        Ok(())
    }

    fn wants_web(&self, query: &Query, top_local_score: f32) -> bool {
        if self.web.is_none() {
            return false;
        }
        match query.options.web {
            WebMode::Off => false,
            WebMode::Force => true,
            WebMode::Auto => top_local_score < self.config.web.confidence_threshold,
        }
    }

    async fn search_web(&self, question: &str) -> AppResult<Vec<WebSnippet>> {
        let Some(web) = &self.web else {
            return Err(AppError::Augmentation("Web search is not configured".to_string()));
        };
        let timeout = Duration::from_secs(self.config.web.timeout_secs.max(1));
        match tokio::time::timeout(timeout, web.search(question, self.config.web.top_k)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Augmentation(format!(
                "{} search timed out after {:?}",
                web.name(),
                timeout
            ))),
        }
    }

    fn finish(&self, run: WorkflowRun) -> QueryAnswer {
        let web_used = !run.evidence.web.is_empty();
        let ranked = run.ranked.unwrap_or(RankedAnswer {
            selected: None,
            confidence: 0.0,
            rationale: "no candidates".to_string(),
            kind: AnswerKind::InsufficientEvidence,
            scores: Vec::new(),
        });

        let (answer, kind, confidence, citations) = match ranked.selected {
            Some(selected) if ranked.kind == AnswerKind::Grounded => (
                selected.text,
                AnswerKind::Grounded,
                ranked.confidence,
                run.citations,
            ),
            _ => (
                INSUFFICIENT_EVIDENCE_ANSWER.to_string(),
                AnswerKind::InsufficientEvidence,
                0.0,
                CitationReport::default(),
            ),
        };

        info!(
            run_id = %run.id,
            kind = ?kind,
            confidence,
            citations = citations.citations.len(),
            unsupported = citations.unsupported.len(),
            "Run completed"
        );

        QueryAnswer {
            run_id: run.id,
            question: run.question,
            answer,
            kind,
            confidence,
            citations: citations.citations,
            unsupported: citations.unsupported,
            web_used,
            ranking: ranked.scores,
            trace: run.trace,
        }
    }

    fn fail(&self, run: WorkflowRun, error: AppError) -> RunOutcome {
        RunOutcome::Failed(RunFailure {
            run_id: run.id,
            stage: run.stage,
            error,
            partial_evidence: run.evidence,
            trace: run.trace,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guards() -> Guards {
        Guards {
            retries_used: 0,
            max_retries: 2,
            augment: false,
            skip_citation: false,
        }
    }

    const TRANSIENT: StepResult = StepResult::Failed {
        transient: true,
        degradable: false,
    };

    const FATAL: StepResult = StepResult::Failed {
        transient: false,
        degradable: false,
    };

    #[test]
    fn test_happy_path_without_augmentation() {
        let mut stage = Stage::Received;
        let mut visited = vec![stage];
        while !stage.is_terminal() {
            stage = transition(stage, &StepResult::Advanced, &guards());
            visited.push(stage);
        }
        assert_eq!(
            visited,
            vec![
                Stage::Received,
                Stage::LocalRetrieval,
                Stage::Generation,
                Stage::Ranking,
                Stage::Citation,
                Stage::Completed
            ]
        );
    }

    #[test]
    fn test_augmentation_branch() {
        let g = Guards {
            augment: true,
            ..guards()
        };
        assert_eq!(
            transition(Stage::LocalRetrieval, &StepResult::Advanced, &g),
            Stage::WebAugmentation
        );
        assert_eq!(
            transition(Stage::WebAugmentation, &StepResult::Advanced, &g),
            Stage::Generation
        );
    }

    #[test]
    fn test_transient_failure_retries_then_fails() {
        assert_eq!(transition(Stage::LocalRetrieval, &TRANSIENT, &guards()), Stage::LocalRetrieval);

        let spent = Guards {
            retries_used: 2,
            ..guards()
        };
        assert_eq!(transition(Stage::LocalRetrieval, &TRANSIENT, &spent), Stage::Failed);
        assert_eq!(transition(Stage::Generation, &FATAL, &guards()), Stage::Failed);
    }

    #[test]
    fn test_degradable_failure_moves_to_generation() {
        let failed = StepResult::Failed {
            transient: true,
            degradable: true,
        };
        assert_eq!(transition(Stage::WebAugmentation, &failed, &guards()), Stage::WebAugmentation);

        let spent = Guards {
            retries_used: 2,
            ..guards()
        };
        assert_eq!(transition(Stage::WebAugmentation, &failed, &spent), Stage::Generation);
    }

    #[test]
    fn test_insufficient_ranking_skips_citation() {
        let g = Guards {
            skip_citation: true,
            ..guards()
        };
        assert_eq!(transition(Stage::Ranking, &StepResult::Advanced, &g), Stage::Completed);
    }

    #[test]
    fn test_terminal_stages_are_sticky() {
        assert_eq!(transition(Stage::Completed, &FATAL, &guards()), Stage::Completed);
        assert_eq!(transition(Stage::Failed, &StepResult::Advanced, &guards()), Stage::Failed);
    }

    #[test]
    fn test_conversation_expands_retrieval_text() {
        let query = Query::new("And for access logs?")
            .with_conversation(Some("User: How long are records kept?".to_string()));
        assert_eq!(
            query.retrieval_text("And for access logs?"),
            "User: How long are records kept?\nAnd for access logs?"
        );
        assert_eq!(Query::new("q").with_conversation(Some("  ".to_string())).conversation, None);
    }
}
