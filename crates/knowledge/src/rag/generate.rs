//! Candidate answer generation.
//!
//! Each pass varies the prompt framing and the sampling temperature. When
//! both local and web evidence are present, the second pass sees local
//! evidence only, so the ranker can compare a web-informed answer with a
//! purely local one.

use crate::config::GenerationConfig;
use crate::rag::types::{
    AnswerCandidate, CandidateKind, EvidenceItem, EvidenceSet, INSUFFICIENT_EVIDENCE_ANSWER,
};
use lexrag_core::{AppError, AppResult};
use lexrag_llm::{LlmClient, LlmRequest};
use lexrag_prompt::{
    build_prompt, load_prompt, AnswerContext, Framing, PromptDefinition, PromptEvidence,
    INSUFFICIENT_EVIDENCE_MARKER,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, warn};

const DEFAULT_TEMPERATURE: f32 = 0.2;

/// Everything one generation task needs, prepared up front.
struct PassPlan {
    pass: usize,
    prompt_id: String,
    framing: Framing,
    temperature: f32,
    request: LlmRequest,
    evidence: Vec<EvidenceItem>,
}

pub struct CandidateGenerator {
    llm: Arc<dyn LlmClient>,
    model: String,
    prompts: Vec<PromptDefinition>,
    config: GenerationConfig,
}

impl CandidateGenerator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        model: impl Into<String>,
        prompts: Vec<PromptDefinition>,
        config: GenerationConfig,
    ) -> AppResult<Self> {
        if prompts.is_empty() {
            return Err(AppError::Config(
                "At least one answer prompt is required".to_string(),
            ));
        }
        Ok(Self {
            llm,
            model: model.into(),
            prompts,
            config,
        })
    }

    /// Load the configured prompt ids, honouring workspace overrides.
    pub fn from_workspace(
        llm: Arc<dyn LlmClient>,
        model: impl Into<String>,
        workspace: &Path,
        config: GenerationConfig,
    ) -> AppResult<Self> {
        let prompts = config
            .prompts
            .iter()
            .map(|id| load_prompt(workspace, id))
            .collect::<AppResult<Vec<_>>>()?;
        Self::new(llm, model, prompts, config)
    }

    /// Generate up to `n` candidates concurrently.
    ///
    /// Passes that fail or exceed the timeout are dropped. The call fails
    /// only when every pass does. With no evidence at all the model is not
    /// called and a single insufficient-evidence candidate is returned.
    pub async fn generate(
        &self,
        question: &str,
        conversation: Option<&str>,
        evidence: &EvidenceSet,
        n: usize,
    ) -> AppResult<Vec<AnswerCandidate>> {
        if evidence.is_empty() {
            debug!("No evidence, skipping generation");
            return Ok(vec![AnswerCandidate {
                id: "cand-0".to_string(),
                pass: 0,
                framing: Framing::Direct,
                temperature: 0.0,
                prompt_id: String::new(),
                text: INSUFFICIENT_EVIDENCE_ANSWER.to_string(),
                evidence: Vec::new(),
                kind: CandidateKind::InsufficientEvidence,
            }]);
        }

        let n = n.max(1);
        let full = evidence.items();
        let local_only = if !evidence.local.is_empty() && !evidence.web.is_empty() {
            Some(
                EvidenceSet {
                    local: evidence.local.clone(),
                    web: Vec::new(),
                }
                .items(),
            )
        } else {
            None
        };

        let mut plans = Vec::with_capacity(n);
        for pass in 0..n {
            let items = match (&local_only, pass) {
                (Some(local), 1) => local.clone(),
                _ => full.clone(),
            };
            plans.push(self.plan(pass, question, conversation, items)?);
        }

        let timeout = Duration::from_secs(self.config.timeout_secs.max(1));
        let mut tasks = JoinSet::new();
        for plan in plans {
            let llm = Arc::clone(&self.llm);
            tasks.spawn(async move {
                let result = tokio::time::timeout(timeout, llm.complete(&plan.request)).await;
                (plan, result)
            });
        }

        let mut candidates = Vec::with_capacity(n);
        let mut last_error = None;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((plan, Ok(Ok(response)))) => candidates.push(to_candidate(plan, response.content)),
                Ok((plan, Ok(Err(e)))) => {
                    warn!(pass = plan.pass, "Candidate generation failed: {}", e);
                    last_error = Some(e.to_string());
                }
                Ok((plan, Err(_))) => {
                    warn!(pass = plan.pass, "Candidate generation timed out after {:?}", timeout);
                    last_error = Some(format!("pass {} timed out", plan.pass));
                }
                Err(e) => {
                    warn!("Generation task failed: {}", e);
                    last_error = Some(e.to_string());
                }
            }
        }

        if candidates.is_empty() {
            return Err(AppError::Generation(format!(
                "All {} candidate passes failed: {}",
                n,
                last_error.unwrap_or_else(|| "no result".to_string())
            )));
        }

        candidates.sort_by_key(|c| c.pass);
        debug!(generated = candidates.len(), requested = n, "Generated candidates");
        Ok(candidates)
    }

    fn plan(
        &self,
        pass: usize,
        question: &str,
        conversation: Option<&str>,
        evidence: Vec<EvidenceItem>,
    ) -> AppResult<PassPlan> {
        let definition = &self.prompts[pass % self.prompts.len()];
        let temperature = if self.config.temperatures.is_empty() {
            definition.behavior.temperature.unwrap_or(DEFAULT_TEMPERATURE)
        } else {
            self.config.temperatures[pass % self.config.temperatures.len()]
        };

        let prompt_evidence: Vec<PromptEvidence> = evidence.iter().map(|e| e.to_prompt()).collect();
        let built = build_prompt(
            definition,
            &AnswerContext {
                question,
                conversation,
                evidence: &prompt_evidence,
            },
        )?;

        let mut request = LlmRequest::new(built.user, &self.model)
            .with_temperature(temperature)
            .with_max_tokens(self.config.max_tokens);
        if let Some(system) = built.system {
            request = request.with_system(system);
        }

        Ok(PassPlan {
            pass,
            prompt_id: definition.id.clone(),
            framing: definition.behavior.framing,
            temperature,
            request,
            evidence,
        })
    }
}

fn to_candidate(plan: PassPlan, text: String) -> AnswerCandidate {
    let text = text.trim().to_string();
    let kind = if text.is_empty() || text.contains(INSUFFICIENT_EVIDENCE_MARKER) {
        CandidateKind::InsufficientEvidence
    } else {
        CandidateKind::Answer
    };

    AnswerCandidate {
        id: format!("cand-{}", plan.pass),
        pass: plan.pass,
        framing: plan.framing,
        temperature: plan.temperature,
        prompt_id: plan.prompt_id,
        text,
        evidence: plan.evidence,
        kind,
    }
}
