//! Prompt rendering.

use crate::types::{BuiltPrompt, BuiltPromptMetadata, PromptDefinition};
use handlebars::Handlebars;
use lexrag_core::{AppError, AppResult};
use serde::Serialize;

/// One evidence item as the model sees it.
#[derive(Debug, Clone, Serialize)]
pub struct PromptEvidence {
    /// Citation label the model should echo, e.g. "E3"
    pub label: String,
    /// Human-readable provenance, e.g. "policy.pdf p.2" or a URL
    pub origin: String,
    pub text: String,
}

/// Variables available to answer templates.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerContext<'a> {
    pub question: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation: Option<&'a str>,
    pub evidence: &'a [PromptEvidence],
}

/// Render a definition's system and user templates against `context`.
///
/// # Example
/// ```no_run
/// use lexrag_prompt::{build_prompt, load_prompt, AnswerContext};
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let def = load_prompt(Path::new("."), "answer.direct")?;
/// let built = build_prompt(&def, &AnswerContext { question: "Who signs?", conversation: None, evidence: &[] })?;
/// println!("{}", built.user);
/// # Ok(())
/// # }
/// ```
pub fn build_prompt(
    definition: &PromptDefinition,
    context: &AnswerContext<'_>,
) -> AppResult<BuiltPrompt> {
    tracing::debug!("Building prompt: {}", definition.id);

    let user = render_template(&definition.template, context)?;
    let system = definition
        .system
        .as_deref()
        .map(|template| render_template(template, context))
        .transpose()?;

    Ok(BuiltPrompt {
        system,
        user,
        metadata: BuiltPromptMetadata {
            source_prompt_id: definition.id.clone(),
            framing: definition.behavior.framing,
            evidence_count: context.evidence.len(),
        },
    })
}

fn render_template<T: Serialize>(template: &str, data: &T) -> AppResult<String> {
    let mut handlebars = Handlebars::new();

    // Plain text out; legal text is full of ampersands and quotes.
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("prompt", template)
        .map_err(|e| AppError::Prompt(format!("Failed to register template: {}", e)))?;

    handlebars
        .render("prompt", data)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::{builtin_prompt, ANSWER_CAVEATS, ANSWER_DIRECT};
    use crate::types::Framing;

    fn evidence() -> Vec<PromptEvidence> {
        vec![
            PromptEvidence {
                label: "E1".into(),
                origin: "policy.pdf p.2".into(),
                text: "Records are retained for seven years.".into(),
            },
            PromptEvidence {
                label: "E2".into(),
                origin: "https://example.org/rules".into(),
                text: "Retention applies to R&D files.".into(),
            },
        ]
    }

    #[test]
    fn test_render_evidence_and_question() {
        let def = builtin_prompt(ANSWER_DIRECT).unwrap();
        let items = evidence();
        let built = build_prompt(
            &def,
            &AnswerContext {
                question: "What is the retention period?",
                conversation: None,
                evidence: &items,
            },
        )
        .unwrap();

        assert!(built.user.contains("[E1] (policy.pdf p.2) Records are retained for seven years."));
        assert!(built.user.contains("R&D files"));
        assert!(built.user.contains("Question: What is the retention period?"));
        assert!(!built.user.contains("Earlier in this conversation"));
        assert!(built.system.unwrap().contains("[E2]"));
        assert_eq!(built.metadata.evidence_count, 2);
        assert_eq!(built.metadata.framing, Framing::Direct);
    }

    #[test]
    fn test_conversation_block_rendered_when_present() {
        let def = builtin_prompt(ANSWER_CAVEATS).unwrap();
        let items = evidence();
        let built = build_prompt(
            &def,
            &AnswerContext {
                question: "And for contractors?",
                conversation: Some("user: What is the retention period?"),
                evidence: &items,
            },
        )
        .unwrap();

        assert!(built.user.contains("Earlier in this conversation"));
        assert!(built.user.contains("conditions, exceptions or limits"));
        assert_eq!(built.metadata.framing, Framing::Caveats);
    }

    #[test]
    fn test_render_template_missing_variable() {
        let result = render_template("Question: {{missing}}", &serde_json::json!({}));
        assert_eq!(result.unwrap(), "Question: ");
    }
}
