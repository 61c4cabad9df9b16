//! Answer pipeline types.

use crate::types::ScoredChunk;
use crate::web::WebSnippet;
use chrono::{DateTime, Utc};
use lexrag_prompt::{Framing, PromptEvidence};
use serde::{Deserialize, Serialize};

/// Where an evidence item came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EvidenceSource {
    Local {
        chunk_id: String,
        source_id: String,
        source_name: String,
        page: u32,
        offset_start: usize,
        offset_end: usize,
        ingested_at: DateTime<Utc>,
    },
    Web {
        url: String,
        title: String,
        rank: usize,
    },
}

impl EvidenceSource {
    pub fn is_web(&self) -> bool {
        matches!(self, Self::Web { .. })
    }

    /// Human-readable location, e.g. `policy.pdf, page 2`.
    pub fn describe(&self) -> String {
        match self {
            Self::Local {
                source_name, page, ..
            } => format!("{}, page {}", source_name, page),
            Self::Web { url, .. } => url.clone(),
        }
    }
}

/// A labelled piece of evidence shown to the model and cited in answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    /// `E1`, `E2`, ... in evidence-set order
    pub label: String,
    pub text: String,
    pub score: f32,
    pub source: EvidenceSource,
}

impl EvidenceItem {
    pub fn to_prompt(&self) -> PromptEvidence {
        PromptEvidence {
            label: self.label.clone(),
            origin: self.source.describe(),
            text: self.text.clone(),
        }
    }
}

/// Evidence gathered for one run: local chunks plus optional web snippets.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EvidenceSet {
    pub local: Vec<ScoredChunk>,
    pub web: Vec<WebSnippet>,
}

impl EvidenceSet {
    pub fn is_empty(&self) -> bool {
        self.local.is_empty() && self.web.is_empty()
    }

    pub fn len(&self) -> usize {
        self.local.len() + self.web.len()
    }

    /// Best local similarity, or 0 with no local evidence.
    pub fn top_local_score(&self) -> f32 {
        self.local
            .iter()
            .map(|c| c.score)
            .fold(None, |best: Option<f32>, s| Some(best.map_or(s, |b| b.max(s))))
            .unwrap_or(0.0)
    }

    /// Labelled items: local chunks first in retrieval order, then web by rank.
    pub fn items(&self) -> Vec<EvidenceItem> {
        let local = self.local.iter().map(|scored| {
            let c = &scored.chunk;
            (
                c.text.clone(),
                scored.score,
                EvidenceSource::Local {
                    chunk_id: c.id.clone(),
                    source_id: c.source_id.clone(),
                    source_name: c.source_name.clone(),
                    page: c.page,
                    offset_start: c.offset_start,
                    offset_end: c.offset_end,
                    ingested_at: c.ingested_at,
                },
            )
        });

        let mut web: Vec<&WebSnippet> = self.web.iter().collect();
        web.sort_by_key(|s| s.rank);
        let web = web.into_iter().map(|s| {
            (
                s.text.clone(),
                s.score,
                EvidenceSource::Web {
                    url: s.url.clone(),
                    title: s.title.clone(),
                    rank: s.rank,
                },
            )
        });

        local
            .chain(web)
            .enumerate()
            .map(|(i, (text, score, source))| EvidenceItem {
                label: format!("E{}", i + 1),
                text,
                score,
                source,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateKind {
    Answer,
    InsufficientEvidence,
}

/// One generated answer and the evidence it was conditioned on.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerCandidate {
    pub id: String,
    /// 0-based generation pass; also the final tie-break
    pub pass: usize,
    pub framing: Framing,
    pub temperature: f32,
    pub prompt_id: String,
    pub text: String,
    #[serde(skip)]
    pub evidence: Vec<EvidenceItem>,
    pub kind: CandidateKind,
}

/// Ranking scores for a candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateScore {
    pub candidate_id: String,
    pub pass: usize,
    pub faithfulness: f32,
    pub relevance: f32,
    pub combined: f32,
    pub unsupported_claims: usize,
    pub length: usize,
    pub eligible: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerKind {
    Grounded,
    InsufficientEvidence,
}

/// The ranker's decision.
#[derive(Debug, Clone, Serialize)]
pub struct RankedAnswer {
    /// `None` only for an insufficient-evidence outcome
    pub selected: Option<AnswerCandidate>,
    pub confidence: f32,
    pub rationale: String,
    pub kind: AnswerKind,
    pub scores: Vec<CandidateScore>,
}

/// Byte span of an answer clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerSpan {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// A clause of the answer tied to one evidence item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub span: AnswerSpan,
    pub evidence: EvidenceItem,
    /// Term coverage of the clause by this evidence
    pub overlap: f32,
}

/// Text returned when no candidate is grounded in the evidence.
pub const INSUFFICIENT_EVIDENCE_ANSWER: &str =
    "The available documents do not contain enough evidence to answer this question.";

/// Final answer of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct QueryAnswer {
    pub run_id: String,
    pub question: String,
    pub answer: String,
    pub kind: AnswerKind,
    pub confidence: f32,
    pub citations: Vec<Citation>,
    /// Factual clauses no evidence item supports
    pub unsupported: Vec<AnswerSpan>,
    pub web_used: bool,
    pub ranking: Vec<CandidateScore>,
    pub trace: Vec<StageRecord>,
}

/// One step of a run, for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageRecord {
    pub stage: String,
    pub outcome: String,
    pub attempt: u32,
    pub elapsed_ms: u64,
}
