//! Attaching citations to the selected answer.

use crate::config::AttributionConfig;
use crate::rag::lexical::{coverage, is_factual, split_clauses, terms};
use crate::rag::types::{AnswerSpan, Citation, EvidenceItem};
use serde::Serialize;
use std::cmp::Ordering;

#[derive(Debug, Clone, Default, Serialize)]
pub struct CitationReport {
    pub citations: Vec<Citation>,
    /// Factual clauses no evidence item supports
    pub unsupported: Vec<AnswerSpan>,
}

pub struct CitationComposer {
    config: AttributionConfig,
}

impl CitationComposer {
    pub fn new(config: AttributionConfig) -> Self {
        Self { config }
    }

    /// Tie every factual clause of `answer` to the evidence that supports it.
    ///
    /// A clause is supported by an item when the item covers at least
    /// `support_threshold` of the clause's terms. Items the clause names
    /// explicitly (`[E2]`) come first, then higher coverage, then local
    /// before web. Clauses with no supporting item are reported, not dropped.
    pub fn attach(&self, answer: &str, evidence: &[EvidenceItem]) -> CitationReport {
        let evidence_terms: Vec<_> = evidence.iter().map(|e| terms(&e.text)).collect();
        let mut report = CitationReport::default();

        for clause in split_clauses(answer) {
            let clause_terms = terms(&clause.text);
            if !is_factual(&clause_terms, self.config.min_claim_terms) {
                continue;
            }

            let span = AnswerSpan {
                start: clause.start,
                end: clause.end,
                text: clause.text.clone(),
            };

            let mut supporting: Vec<(usize, f32, bool)> = evidence
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    let named = clause.text.contains(&format!("[{}]", item.label));
                    (i, coverage(&clause_terms, &evidence_terms[i]), named)
                })
                .filter(|(_, overlap, _)| *overlap >= self.config.support_threshold)
                .collect();

            if supporting.is_empty() {
                report.unsupported.push(span);
                continue;
            }

            supporting.sort_by(|a, b| {
                b.2.cmp(&a.2)
                    .then_with(|| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal))
                    .then_with(|| {
                        evidence[a.0]
                            .source
                            .is_web()
                            .cmp(&evidence[b.0].source.is_web())
                    })
                    .then_with(|| a.0.cmp(&b.0))
            });

            for (i, overlap, _) in supporting
                .into_iter()
                .take(self.config.max_citations_per_clause.max(1))
            {
                report.citations.push(Citation {
                    span: span.clone(),
                    evidence: evidence[i].clone(),
                    overlap,
                });
            }
        }

        tracing::debug!(
            citations = report.citations.len(),
            unsupported = report.unsupported.len(),
            "Attached citations"
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::types::EvidenceSource;
    use chrono::Utc;

    fn item(label: &str, page: u32, text: &str) -> EvidenceItem {
        EvidenceItem {
            label: label.to_string(),
            text: text.to_string(),
            score: 0.5,
            source: EvidenceSource::Local {
                chunk_id: format!("chunk-{}", page),
                source_id: "policy.pdf".to_string(),
                source_name: "policy.pdf".to_string(),
                page,
                offset_start: 0,
                offset_end: text.len(),
                ingested_at: Utc::now(),
            },
        }
    }

    fn web_item(label: &str, text: &str) -> EvidenceItem {
        EvidenceItem {
            label: label.to_string(),
            text: text.to_string(),
            score: 1.0,
            source: EvidenceSource::Web {
                url: "https://example.org/retention".to_string(),
                title: "Retention".to_string(),
                rank: 1,
            },
        }
    }

    fn evidence() -> Vec<EvidenceItem> {
        vec![
            item("E1", 1, "Scope. This policy applies to all staff and contractors."),
            item("E2", 2, "Customer records are retained for seven years after account closure."),
            item("E3", 3, "Access logs are kept for twelve months."),
        ]
    }

    #[test]
    fn test_clauses_cite_supporting_pages() {
        let composer = CitationComposer::new(AttributionConfig::default());
        let answer = "Customer records are retained for seven years [E2]. Access logs are kept for twelve months [E3].";
        let report = composer.attach(answer, &evidence());

        assert!(report.unsupported.is_empty());
        assert_eq!(report.citations.len(), 2);
        assert_eq!(report.citations[0].evidence.label, "E2");
        assert_eq!(report.citations[1].evidence.label, "E3");
        let span = &report.citations[0].span;
        assert_eq!(&answer[span.start..span.end], span.text);
    }

    #[test]
    fn test_unsupported_clause_is_reported() {
        let composer = CitationComposer::new(AttributionConfig::default());
        let answer = "Customer records are retained for seven years. Fines reach four million euros.";
        let report = composer.attach(answer, &evidence());

        assert_eq!(report.citations.len(), 1);
        assert_eq!(report.unsupported.len(), 1);
        assert!(report.unsupported[0].text.starts_with("Fines"));
    }

    #[test]
    fn test_local_preferred_and_capped() {
        let config = AttributionConfig {
            max_citations_per_clause: 1,
            ..Default::default()
        };
        let composer = CitationComposer::new(config);
        let evidence = vec![
            web_item("E1", "Access logs are kept for twelve months."),
            item("E2", 3, "Access logs are kept for twelve months."),
        ];
        let report = composer.attach("Access logs are kept for twelve months.", &evidence);

        assert_eq!(report.citations.len(), 1);
        assert_eq!(report.citations[0].evidence.label, "E2");
    }

    #[test]
    fn test_named_label_comes_first() {
        let composer = CitationComposer::new(AttributionConfig::default());
        let evidence = vec![
            item("E1", 3, "Access logs are kept for twelve months."),
            item("E2", 7, "Access logs are kept for twelve months unless under investigation."),
        ];
        let report = composer.attach("Access logs are kept for twelve months [E2].", &evidence);
        assert_eq!(report.citations[0].evidence.label, "E2");
        assert_eq!(report.citations.len(), 2);
    }
}
