//! Built-in answer prompts.
//!
//! A workspace can shadow any of these by writing `.lexrag/prompts/<id>.yml`.

use crate::types::PromptDefinition;
use lexrag_core::{AppError, AppResult};

pub const ANSWER_DIRECT: &str = "answer.direct";
pub const ANSWER_CAVEATS: &str = "answer.caveats";

const ANSWER_DIRECT_YAML: &str = r#"
id: answer.direct
title: Direct grounded answer
apiVersion: "1.0"
behavior:
  framing: direct
system: |
  You answer questions about laws, regulations and internal policy.
  Use ONLY the numbered evidence supplied by the user. Do not rely on outside knowledge.
  End every factual sentence with the label of the evidence it comes from, for example [E2].
  If the evidence does not answer the question, reply with exactly: INSUFFICIENT_EVIDENCE
template: |
  {{#if conversation}}Earlier in this conversation:
  {{conversation}}

  {{/if}}Evidence:
  {{#each evidence}}
  [{{label}}] ({{origin}}) {{text}}
  {{/each}}

  Question: {{question}}

  Give a direct answer in a short paragraph.
"#;

const ANSWER_CAVEATS_YAML: &str = r#"
id: answer.caveats
title: Grounded answer with caveats
apiVersion: "1.0"
behavior:
  framing: caveats
system: |
  You answer questions about laws, regulations and internal policy.
  Use ONLY the numbered evidence supplied by the user. Do not rely on outside knowledge.
  End every factual sentence with the label of the evidence it comes from, for example [E2].
  If the evidence does not answer the question, reply with exactly: INSUFFICIENT_EVIDENCE
template: |
  {{#if conversation}}Earlier in this conversation:
  {{conversation}}

  {{/if}}Evidence:
  {{#each evidence}}
  [{{label}}] ({{origin}}) {{text}}
  {{/each}}

  Question: {{question}}

  Answer the question, then note any conditions, exceptions or limits the evidence states.
  Do not speculate beyond the evidence.
"#;

/// Parse a built-in prompt definition.
pub fn builtin_prompt(id: &str) -> AppResult<PromptDefinition> {
    let yaml = match id {
        ANSWER_DIRECT => ANSWER_DIRECT_YAML,
        ANSWER_CAVEATS => ANSWER_CAVEATS_YAML,
        other => {
            return Err(AppError::Prompt(format!(
                "No built-in prompt named '{}'",
                other
            )))
        }
    };

    serde_yaml::from_str(yaml)
        .map_err(|e| AppError::Prompt(format!("Built-in prompt '{}' is malformed: {}", id, e)))
}
