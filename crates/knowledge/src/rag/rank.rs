//! Candidate ranking by faithfulness and relevance.
//!
//! Faithfulness is the weighted share of an answer's factual clauses that
//! some evidence item supports. A clause supported only by web evidence
//! counts at the configured web trust weight. Relevance is the share of the
//! question's content terms the answer addresses.

use crate::config::{AttributionConfig, RankingConfig};
use crate::rag::lexical::{coverage, is_factual, split_clauses, terms};
use crate::rag::types::{
    AnswerCandidate, AnswerKind, CandidateKind, CandidateScore, RankedAnswer,
};
use std::collections::HashSet;

pub struct Ranker {
    ranking: RankingConfig,
    attribution: AttributionConfig,
    web_trust: f32,
}

impl Ranker {
    pub fn new(ranking: RankingConfig, attribution: AttributionConfig, web_trust: f32) -> Self {
        Self {
            ranking,
            attribution,
            web_trust: web_trust.clamp(0.0, 1.0),
        }
    }

    /// Score one candidate against its own evidence.
    pub fn score(&self, question: &str, candidate: &AnswerCandidate) -> CandidateScore {
        let length = candidate.text.chars().count();
        if candidate.kind == CandidateKind::InsufficientEvidence {
            return CandidateScore {
                candidate_id: candidate.id.clone(),
                pass: candidate.pass,
                faithfulness: 0.0,
                relevance: 0.0,
                combined: 0.0,
                unsupported_claims: 0,
                length,
                eligible: false,
            };
        }

        let evidence: Vec<(HashSet<String>, bool)> = candidate
            .evidence
            .iter()
            .map(|e| (terms(&e.text), e.source.is_web()))
            .collect();

        let mut claims = 0usize;
        let mut unsupported = 0usize;
        let mut support = 0.0f32;

        for clause in split_clauses(&candidate.text) {
            let clause_terms = terms(&clause.text);
            if !is_factual(&clause_terms, self.attribution.min_claim_terms) {
                continue;
            }
            claims += 1;

            let best = |web: bool| {
                evidence
                    .iter()
                    .filter(|(_, is_web)| *is_web == web)
                    .map(|(t, _)| coverage(&clause_terms, t))
                    .fold(0.0f32, f32::max)
            };

            if best(false) >= self.attribution.support_threshold {
                support += 1.0;
            } else if best(true) >= self.attribution.support_threshold {
                support += self.web_trust;
            } else {
                unsupported += 1;
            }
        }

        let faithfulness = if claims == 0 {
            0.0
        } else {
            support / claims as f32
        };

        let question_terms = terms(question);
        let relevance = coverage(&question_terms, &terms(&candidate.text));

        let combined = self.ranking.faithfulness_weight * faithfulness
            + self.ranking.relevance_weight * relevance;

        CandidateScore {
            candidate_id: candidate.id.clone(),
            pass: candidate.pass,
            faithfulness,
            relevance,
            combined,
            unsupported_claims: unsupported,
            length,
            eligible: claims > 0 && faithfulness >= self.ranking.faithfulness_floor,
        }
    }

    /// Pick the best eligible candidate.
    ///
    /// Ties on the combined score (within `tie_epsilon`) go to fewer
    /// unsupported claims, then the shorter answer, then the earlier pass.
    /// With no eligible candidate the outcome is insufficient evidence with
    /// zero confidence. Never fails.
    pub fn rank(&self, question: &str, candidates: &[AnswerCandidate]) -> RankedAnswer {
        let scores: Vec<CandidateScore> = candidates.iter().map(|c| self.score(question, c)).collect();

        let mut best: Option<usize> = None;
        for (i, score) in scores.iter().enumerate() {
            if !score.eligible {
                continue;
            }
            best = match best {
                Some(b) if !self.better(score, &scores[b]) => Some(b),
                _ => Some(i),
            };
        }

        for score in &scores {
            tracing::debug!(
                candidate = %score.candidate_id,
                faithfulness = score.faithfulness,
                relevance = score.relevance,
                combined = score.combined,
                unsupported = score.unsupported_claims,
                eligible = score.eligible,
                "Scored candidate"
            );
        }

        match best {
            Some(i) => {
                let s = &scores[i];
                RankedAnswer {
                    selected: Some(candidates[i].clone()),
                    confidence: s.combined.clamp(0.0, 1.0),
                    rationale: format!(
                        "pass {} selected: faithfulness {:.2}, relevance {:.2}, {} unsupported claims",
                        s.pass, s.faithfulness, s.relevance, s.unsupported_claims
                    ),
                    kind: AnswerKind::Grounded,
                    scores,
                }
            }
            None => RankedAnswer {
                selected: None,
                confidence: 0.0,
                rationale: format!(
                    "no candidate reached faithfulness {:.2}",
                    self.ranking.faithfulness_floor
                ),
                kind: AnswerKind::InsufficientEvidence,
                scores,
            },
        }
    }

    fn better(&self, a: &CandidateScore, b: &CandidateScore) -> bool {
        let diff = a.combined - b.combined;
        if diff.abs() > self.ranking.tie_epsilon {
            return diff > 0.0;
        }
        (a.unsupported_claims, a.length, a.pass) < (b.unsupported_claims, b.length, b.pass)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::types::{EvidenceItem, EvidenceSource};
    use chrono::Utc;
    use lexrag_prompt::Framing;

    const QUESTION: &str = "How long are customer records retained?";

    fn local(label: &str, text: &str) -> EvidenceItem {
        EvidenceItem {
            label: label.to_string(),
            text: text.to_string(),
            score: 0.8,
            source: EvidenceSource::Local {
                chunk_id: "c".to_string(),
                source_id: "policy.pdf".to_string(),
                source_name: "policy.pdf".to_string(),
                page: 2,
                offset_start: 0,
                offset_end: text.len(),
                ingested_at: Utc::now(),
            },
        }
    }

    fn web(label: &str, text: &str) -> EvidenceItem {
        EvidenceItem {
            label: label.to_string(),
            text: text.to_string(),
            score: 1.0,
            source: EvidenceSource::Web {
                url: "https://example.org".to_string(),
                title: "Example".to_string(),
                rank: 1,
            },
        }
    }

    fn candidate(pass: usize, text: &str, evidence: Vec<EvidenceItem>) -> AnswerCandidate {
        AnswerCandidate {
            id: format!("cand-{}", pass),
            pass,
            framing: Framing::Direct,
            temperature: 0.1,
            prompt_id: "answer.direct".to_string(),
            text: text.to_string(),
            evidence,
            kind: CandidateKind::Answer,
        }
    }

    fn ranker() -> Ranker {
        Ranker::new(RankingConfig::default(), AttributionConfig::default(), 0.8)
    }

    fn policy() -> Vec<EvidenceItem> {
        vec![local("E1", "Customer records are retained for seven years after account closure.")]
    }

    #[test]
    fn test_faithful_answer_beats_hallucination() {
        let candidates = vec![
            candidate(0, "Records go to the Geneva regulator and are destroyed after ten months.", policy()),
            candidate(1, "Customer records are retained for seven years [E1].", policy()),
        ];
        let ranked = ranker().rank(QUESTION, &candidates);

        assert_eq!(ranked.kind, AnswerKind::Grounded);
        assert_eq!(ranked.selected.unwrap().pass, 1);
        assert!(ranked.confidence > 0.6);
        assert!(!ranked.scores[0].eligible);
    }

    #[test]
    fn test_tie_goes_to_shorter_answer() {
        let candidates = vec![
            candidate(0, "Customer records are retained for seven years after account closure [E1].", policy()),
            candidate(1, "Customer records are retained for seven years after account closure.", policy()),
        ];
        let ranked = ranker().rank(QUESTION, &candidates);
        let scores = &ranked.scores;

        assert!((scores[0].combined - scores[1].combined).abs() < 1e-6);
        assert_eq!(ranked.selected.unwrap().pass, 1);
    }

    #[test]
    fn test_identical_answers_prefer_earlier_pass() {
        let text = "Customer records are retained for seven years [E1].";
        let candidates = vec![candidate(0, text, policy()), candidate(1, text, policy())];
        assert_eq!(ranker().rank(QUESTION, &candidates).selected.unwrap().pass, 0);
    }

    #[test]
    fn test_nothing_faithful_is_insufficient() {
        let candidates = vec![candidate(0, "The chief executive is Jane Doe of Springfield.", policy())];
        let ranked = ranker().rank(QUESTION, &candidates);

        assert_eq!(ranked.kind, AnswerKind::InsufficientEvidence);
        assert!(ranked.selected.is_none());
        assert_eq!(ranked.confidence, 0.0);
    }

    #[test]
    fn test_answer_without_claims_is_not_eligible() {
        let candidates = vec![candidate(0, "Yes.", policy())];
        let score = ranker().score(QUESTION, &candidates[0]);
        assert_eq!(score.faithfulness, 0.0);
        assert!(!score.eligible);
    }

    #[test]
    fn test_web_only_support_uses_trust_weight() {
        let evidence = vec![web("E1", "Customer records are retained for seven years.")];
        let c = candidate(0, "Customer records are retained for seven years [E1].", evidence);

        let trusted = ranker().score(QUESTION, &c);
        assert!((trusted.faithfulness - 0.8).abs() < 1e-6);
        assert!(trusted.eligible);

        let wary = Ranker::new(RankingConfig::default(), AttributionConfig::default(), 0.5);
        assert!(!wary.score(QUESTION, &c).eligible);
    }

    #[test]
    fn test_insufficient_candidate_never_selected() {
        let mut c = candidate(0, "INSUFFICIENT_EVIDENCE", policy());
        c.kind = CandidateKind::InsufficientEvidence;
        let ranked = ranker().rank(QUESTION, &[c]);
        assert_eq!(ranked.kind, AnswerKind::InsufficientEvidence);
    }
}
