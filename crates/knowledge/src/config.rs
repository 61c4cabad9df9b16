//! Pipeline configuration.
//!
//! `PipelineConfig` is built once per process (defaults merged with
//! `.lexrag/pipeline.yaml`) and handed to the ingestor and the orchestrator
//! behind an `Arc`. Nothing mutates it afterwards.

use crate::rag::guard::{compile_injection_patterns, DEFAULT_INJECTION_PATTERNS};
use crate::store::DistanceMetric;
use lexrag_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Every tunable of the ingestion and answer pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub ingest: IngestConfig,
    pub retrieval: RetrievalConfig,
    pub web: WebConfig,
    pub generation: GenerationConfig,
    pub ranking: RankingConfig,
    pub attribution: AttributionConfig,
    pub workflow: WorkflowConfig,
    pub guard: GuardConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Window size in characters
    pub chunk_size: usize,
    /// Fraction of the window repeated at the start of the next chunk
    pub overlap_fraction: f32,
    /// Chunks shorter than this are dropped unless they are a page's only chunk
    pub min_chunk_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            overlap_fraction: 0.15,
            min_chunk_chars: 60,
        }
    }
}

impl ChunkingConfig {
    /// Overlap in characters, always strictly smaller than the window.
    pub fn overlap_chars(&self) -> usize {
        let overlap = (self.chunk_size as f32 * self.overlap_fraction.clamp(0.0, 0.9)).round();
        (overlap as usize).min(self.chunk_size.saturating_sub(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// "trigram" (offline, deterministic) or "ollama"
    pub provider: String,
    pub model: String,
    pub dimensions: usize,
    pub endpoint: Option<String>,
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "trigram".to_string(),
            model: "trigram-v1".to_string(),
            dimensions: 384,
            endpoint: None,
            batch_size: 32,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IngestConfig {
    /// Attempts per chunk write before it is recorded as failed
    pub write_attempts: u32,
    pub write_backoff_ms: u64,
    /// Language passed to the OCR engine
    pub ocr_language: String,
    pub ocr_dpi: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            write_attempts: 3,
            write_backoff_ms: 50,
            ocr_language: "eng".to_string(),
            ocr_dpi: 150,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub metric: DistanceMetric,
    /// Chunks scoring below this never enter the evidence set
    pub min_score: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 6,
            metric: DistanceMetric::Cosine,
            min_score: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WebConfig {
    pub enabled: bool,
    /// Augment when the best local score is below this
    pub confidence_threshold: f32,
    pub top_k: usize,
    pub endpoint: String,
    /// Environment variable holding the search API key
    pub api_key_env: String,
    pub timeout_secs: u64,
    /// Fetch result pages and extract their text instead of using the search snippet
    pub fetch_content: bool,
    pub max_snippet_chars: usize,
    pub max_total_chars: usize,
    /// Weight of a web-only supported claim relative to a locally supported one
    pub trust_weight: f32,
    /// Treat web snippets as fully trusted evidence
    pub promote: bool,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            confidence_threshold: 0.35,
            top_k: 3,
            endpoint: "https://google.serper.dev/search".to_string(),
            api_key_env: "SERPER_API_KEY".to_string(),
            timeout_secs: 10,
            fetch_content: false,
            max_snippet_chars: 4000,
            max_total_chars: 12000,
            trust_weight: 0.8,
            promote: false,
        }
    }
}

impl WebConfig {
    /// Weight applied to support coming from web evidence.
    pub fn effective_trust(&self) -> f32 {
        if self.promote {
            1.0
        } else {
            self.trust_weight.clamp(0.0, 1.0)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    /// Candidates dispatched per query
    pub candidates: usize,
    /// Sampling temperatures, cycled across passes
    pub temperatures: Vec<f32>,
    /// Prompt ids, cycled across passes
    pub prompts: Vec<String>,
    pub timeout_secs: u64,
    pub max_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            candidates: 3,
            temperatures: vec![0.1, 0.4, 0.7],
            prompts: vec!["answer.direct".to_string(), "answer.caveats".to_string()],
            timeout_secs: 90,
            max_tokens: 768,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RankingConfig {
    pub faithfulness_weight: f32,
    pub relevance_weight: f32,
    /// Candidates below this faithfulness are never selected
    pub faithfulness_floor: f32,
    /// Combined scores closer than this are treated as tied
    pub tie_epsilon: f32,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            faithfulness_weight: 0.7,
            relevance_weight: 0.3,
            faithfulness_floor: 0.6,
            tie_epsilon: 1e-4,
        }
    }
}

/// Shared by the ranker and the citation composer so that "faithful" and
/// "citable" mean the same thing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AttributionConfig {
    /// Fraction of a clause's content terms that must appear in one evidence item
    pub support_threshold: f32,
    /// Clauses with fewer content terms are not treated as factual claims
    pub min_claim_terms: usize,
    pub max_citations_per_clause: usize,
}

impl Default for AttributionConfig {
    fn default() -> Self {
        Self {
            support_threshold: 0.5,
            min_claim_terms: 2,
            max_citations_per_clause: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Re-entries of a stage after a transient failure
    pub max_stage_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_stage_retries: 2,
            retry_backoff_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GuardConfig {
    pub max_query_chars: usize,
    pub blocked_terms: Vec<String>,
    /// Case-insensitive regexes; an empty list turns detection off
    pub injection_patterns: Vec<String>,
    /// Mask e-mail addresses, phone numbers and national ids in answers
    pub redact_pii: bool,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_query_chars: 2000,
            blocked_terms: Vec::new(),
            injection_patterns: DEFAULT_INJECTION_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            redact_pii: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Previous turns folded into a follow-up question
    pub history_turns: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { history_turns: 3 }
    }
}

impl PipelineConfig {
    /// Reject settings that would make the pipeline misbehave silently.
    pub fn validate(&self) -> AppResult<()> {
        if self.chunking.chunk_size < 50 {
            return Err(AppError::Config(format!(
                "chunking.chunk_size must be at least 50, got {}",
                self.chunking.chunk_size
            )));
        }
        if !(0.0..1.0).contains(&self.chunking.overlap_fraction) {
            return Err(AppError::Config(
                "chunking.overlap_fraction must be in [0, 1)".to_string(),
            ));
        }
        if self.generation.candidates == 0 {
            return Err(AppError::Config(
                "generation.candidates must be at least 1".to_string(),
            ));
        }
        if self.generation.prompts.is_empty() {
            return Err(AppError::Config(
                "generation.prompts must name at least one prompt".to_string(),
            ));
        }
        if self.retrieval.top_k == 0 {
            return Err(AppError::Config("retrieval.top_k must be at least 1".to_string()));
        }
        let weights = self.ranking.faithfulness_weight + self.ranking.relevance_weight;
        if weights <= 0.0 {
            return Err(AppError::Config(
                "ranking weights must sum to a positive value".to_string(),
            ));
        }
        if self.embedding.dimensions == 0 {
            return Err(AppError::Config(
                "embedding.dimensions must be positive".to_string(),
            ));
        }
        if !(1..=10).contains(&self.ingest.write_attempts) {
            return Err(AppError::Config(format!(
                "ingest.write_attempts must be between 1 and 10, got {}",
                self.ingest.write_attempts
            )));
        }
        compile_injection_patterns(&self.guard.injection_patterns)?;
        Ok(())
    }
}

/// Load the pipeline configuration for a workspace.
///
/// Reads `.lexrag/pipeline.yaml` if present; missing keys take their defaults.
pub fn load_config(workspace: &Path) -> AppResult<PipelineConfig> {
    let config_path = get_config_path(workspace);

    let config = if config_path.exists() {
        let content = fs::read_to_string(&config_path).map_err(|e| {
            AppError::Config(format!("Failed to read config at {:?}: {}", config_path, e))
        })?;

        let config: PipelineConfig = serde_yaml::from_str(&content).map_err(|e| {
            AppError::Config(format!("Failed to parse config at {:?}: {}", config_path, e))
        })?;

        tracing::debug!("Loaded pipeline config from {:?}", config_path);
        config
    } else {
        tracing::debug!("No pipeline config found, using defaults");
        PipelineConfig::default()
    };

    config.validate()?;
    Ok(config)
}

/// Save the pipeline configuration for a workspace.
pub fn save_config(workspace: &Path, config: &PipelineConfig) -> AppResult<()> {
    let config_path = get_config_path(workspace);

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let yaml = serde_yaml::to_string(config)?;
    fs::write(&config_path, yaml).map_err(|e| {
        AppError::Config(format!("Failed to write config to {:?}: {}", config_path, e))
    })?;

    tracing::debug!("Saved pipeline config to {:?}", config_path);
    Ok(())
}

/// Directory holding all lexrag state for a workspace.
pub fn get_state_dir(workspace: &Path) -> PathBuf {
    workspace.join(".lexrag")
}

pub fn get_config_path(workspace: &Path) -> PathBuf {
    get_state_dir(workspace).join("pipeline.yaml")
}

/// SQLite vector store path.
pub fn get_index_path(workspace: &Path) -> PathBuf {
    get_state_dir(workspace).join("index.sqlite")
}

/// SQLite conversation history path.
pub fn get_sessions_path(workspace: &Path) -> PathBuf {
    get_state_dir(workspace).join("sessions.sqlite")
}
