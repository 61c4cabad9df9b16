//! Answer prompts for lexrag.
//!
//! Built-in YAML prompt definitions rendered with Handlebars. A workspace
//! may override any of them under `.lexrag/prompts/`.

pub mod builder;
pub mod defaults;
pub mod loader;
pub mod types;

pub use builder::{build_prompt, AnswerContext, PromptEvidence};
pub use defaults::{ANSWER_CAVEATS, ANSWER_DIRECT};
pub use loader::load_prompt;
pub use types::{
    BuiltPrompt, BuiltPromptMetadata, Framing, PromptBehavior, PromptDefinition,
    INSUFFICIENT_EVIDENCE_MARKER,
};
