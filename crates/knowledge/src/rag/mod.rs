//! Question answering over the knowledge base.
//!
//! Retrieval, optional web augmentation, multi-candidate generation,
//! ranking and citation, sequenced by the [`workflow::Orchestrator`].

pub mod cancel;
pub mod cite;
pub mod generate;
pub mod guard;
pub mod lexical;
pub mod rank;
pub mod redact;
pub mod types;
pub mod workflow;

pub use cancel::CancellationToken;
pub use cite::{CitationComposer, CitationReport};
pub use generate::CandidateGenerator;
pub use guard::QueryGuard;
pub use rank::Ranker;
pub use redact::PiiRedactor;
pub use types::{
    AnswerCandidate, AnswerKind, AnswerSpan, Citation, EvidenceItem, EvidenceSet, EvidenceSource,
    QueryAnswer, RankedAnswer, StageRecord, INSUFFICIENT_EVIDENCE_ANSWER,
};
pub use workflow::{
    Orchestrator, Query, QueryOptions, RunFailure, RunOutcome, Stage, WebMode,
};
