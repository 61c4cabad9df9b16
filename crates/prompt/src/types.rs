//! Prompt types for lexrag.

use serde::{Deserialize, Serialize};

/// Marker a model must emit verbatim when the evidence cannot answer the question.
pub const INSUFFICIENT_EVIDENCE_MARKER: &str = "INSUFFICIENT_EVIDENCE";

/// A prompt definition, either built in or loaded from `.lexrag/prompts/<id>.yml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptDefinition {
    /// Unique prompt identifier (e.g. "answer.direct")
    pub id: String,

    /// Human-readable title
    pub title: String,

    /// API version for schema evolution
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Behavioral settings
    #[serde(default)]
    pub behavior: PromptBehavior,

    /// System message template (Handlebars)
    #[serde(default)]
    pub system: Option<String>,

    /// User message template (Handlebars)
    pub template: String,
}

/// How an answer produced by this prompt is framed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    /// Answer the question and stop
    #[default]
    Direct,
    /// Answer, then state conditions and exceptions found in the evidence
    Caveats,
}

impl Framing {
    pub fn as_str(&self) -> &'static str {
        match self {
            Framing::Direct => "direct",
            Framing::Caveats => "caveats",
        }
    }
}

/// Behavioral settings for prompt execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptBehavior {
    #[serde(default)]
    pub framing: Framing,

    /// Preferred sampling temperature; the generator may override it
    #[serde(default)]
    pub temperature: Option<f32>,
}

/// A fully built prompt ready for LLM execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltPrompt {
    pub system: Option<String>,
    pub user: String,
    pub metadata: BuiltPromptMetadata,
}

/// Metadata about a built prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltPromptMetadata {
    #[serde(rename = "sourcePromptId")]
    pub source_prompt_id: String,

    pub framing: Framing,

    /// Number of evidence items rendered into the prompt
    #[serde(rename = "evidenceCount")]
    pub evidence_count: usize,
}
