//! Term extraction and clause splitting shared by ranking and citation.
//!
//! Support is measured as term coverage: the fraction of a clause's content
//! terms that appear in one evidence item. Both the ranker and the citation
//! composer use these functions, so an answer the ranker calls faithful is
//! one the composer can cite.

use std::collections::HashSet;
use unicode_segmentation::UnicodeSegmentation;

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "if", "then", "of", "to", "in", "on", "at", "by", "for",
    "with", "from", "as", "is", "are", "was", "were", "be", "been", "being", "it", "its", "this",
    "that", "these", "those", "there", "their", "they", "them", "which", "who", "whom", "what",
    "when", "where", "how", "why", "do", "does", "did", "has", "have", "had", "not", "no", "so",
    "than", "can", "will", "would", "should", "may", "might", "must", "shall", "any", "all",
    "each", "such", "into", "about", "also", "only", "per", "under", "i", "you", "we",
];

/// A clause of an answer with its byte span.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// Content terms of `text`, lowercased and lightly stemmed.
///
/// Stop words and citation labels such as `E3` are dropped. Single
/// characters survive only when they contain a digit.
pub fn terms(text: &str) -> HashSet<String> {
    let stop: HashSet<&str> = STOP_WORDS.iter().copied().collect();
    let lower = text.to_lowercase();

    lower
        .unicode_words()
        .filter(|w| !stop.contains(w))
        .filter(|w| !is_citation_label(w))
        .filter(|w| w.chars().any(|c| c.is_numeric()) || w.chars().count() >= 2)
        .map(stem)
        .collect()
}

fn is_citation_label(word: &str) -> bool {
    let mut chars = word.chars();
    chars.next() == Some('e') && {
        let rest: Vec<char> = chars.collect();
        !rest.is_empty() && rest.iter().all(|c| c.is_ascii_digit())
    }
}

fn stem(word: &str) -> String {
    if word.ends_with("ss") {
        return word.to_string();
    }
    for suffix in ["ing", "ed", "es", "s"] {
        if word.len() > suffix.len() + 3 && word.ends_with(suffix) {
            return word[..word.len() - suffix.len()].to_string();
        }
    }
    word.to_string()
}

/// Fraction of `clause` terms present in `evidence`. Zero for an empty clause.
pub fn coverage(clause: &HashSet<String>, evidence: &HashSet<String>) -> f32 {
    if clause.is_empty() {
        return 0.0;
    }
    clause.intersection(evidence).count() as f32 / clause.len() as f32
}

/// Split an answer into sentences, then on semicolons and line breaks.
pub fn split_clauses(text: &str) -> Vec<Clause> {
    let mut clauses = Vec::new();

    for (offset, sentence) in text.split_sentence_bound_indices() {
        let mut start = 0;
        for (i, ch) in sentence.char_indices() {
            if ch == ';' || ch == '\n' {
                push_trimmed(&mut clauses, text, offset + start, offset + i);
                start = i + ch.len_utf8();
            }
        }
        push_trimmed(&mut clauses, text, offset + start, offset + sentence.len());
    }

    clauses
}

fn push_trimmed(clauses: &mut Vec<Clause>, text: &str, start: usize, end: usize) {
    let slice = &text[start..end];
    let leading = slice.len() - slice.trim_start().len();
    let trimmed = slice.trim();
    if trimmed.is_empty() {
        return;
    }
    let start = start + leading;
    clauses.push(Clause {
        start,
        end: start + trimmed.len(),
        text: trimmed.to_string(),
    });
}

/// Whether a clause carries enough content to be checked against evidence.
pub fn is_factual(clause_terms: &HashSet<String>, min_claim_terms: usize) -> bool {
    clause_terms.len() >= min_claim_terms.max(1)
}
