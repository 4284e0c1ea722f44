// src/matching/mod.rs
// Similarity matching between clinical concepts and the service vocabulary.

pub mod embedding;
pub mod fuzzy;
pub mod semantic;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::EngineError;
use self::embedding::EmbeddingModel;
use self::fuzzy::FuzzyMatcher;
use self::semantic::SemanticMatcher;

/// Which similarity strategy the engine runs. Selected once at
/// configuration time; callers only ever see [`ServiceMatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchStrategy {
    Semantic,
    Fuzzy,
}

/// Parallel lists of matched services and their scores in [0, 1],
/// ordered by descending score.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchOutcome {
    pub services: Vec<String>,
    pub scores: Vec<f64>,
}

impl MatchOutcome {
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

/// Capability for mapping a free-text clinical concept to controlled
/// service identifiers.
pub trait ServiceMatcher: Send + Sync {
    /// Match `query` against `candidates`, keeping scores at or above
    /// `threshold`, deduplicated by candidate identity (first, highest
    /// scoring occurrence wins) and truncated to `top_k`.
    ///
    /// Empty `candidates` yields an empty outcome, never an error.
    fn match_services(
        &self,
        query: &str,
        candidates: &[String],
        threshold: f64,
        top_k: usize,
    ) -> Result<MatchOutcome, EngineError>;
}

/// Build the configured matcher.
pub fn build_matcher(
    strategy: MatchStrategy,
    embedder: Arc<dyn EmbeddingModel>,
) -> Box<dyn ServiceMatcher> {
    match strategy {
        MatchStrategy::Semantic => Box::new(SemanticMatcher::new(embedder)),
        MatchStrategy::Fuzzy => Box::new(FuzzyMatcher),
    }
}

/// Shared post-processing for both strategies: threshold filter, stable
/// descending sort (ties keep candidate input order), dedup preserving the
/// first occurrence, top-k truncation and three-decimal score rounding.
pub(crate) fn rank_candidates(
    scored: Vec<(String, f64)>,
    threshold: f64,
    top_k: usize,
) -> MatchOutcome {
    let mut kept: Vec<(String, f64)> =
        scored.into_iter().filter(|(_, score)| *score >= threshold).collect();
    kept.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut outcome = MatchOutcome::default();
    let mut seen = std::collections::HashSet::new();
    for (candidate, score) in kept {
        if outcome.services.len() >= top_k {
            break;
        }
        if seen.insert(candidate.clone()) {
            outcome.services.push(candidate);
            outcome.scores.push((score * 1000.0).round() / 1000.0);
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(pairs: &[(&str, f64)]) -> Vec<(String, f64)> {
        pairs.iter().map(|(s, v)| (s.to_string(), *v)).collect()
    }

    #[test]
    fn test_rank_candidates_orders_and_truncates() {
        let outcome = rank_candidates(
            scored(&[("a", 0.4), ("b", 0.9), ("c", 0.8), ("d", 0.1)]),
            0.3,
            2,
        );
        assert_eq!(outcome.services, vec!["b", "c"]);
        assert_eq!(outcome.scores, vec![0.9, 0.8]);
    }

    #[test]
    fn test_rank_candidates_scores_non_increasing() {
        let outcome = rank_candidates(
            scored(&[("a", 0.41), ("b", 0.93), ("c", 0.82), ("d", 0.82)]),
            0.0,
            10,
        );
        for pair in outcome.scores.windows(2) {
            assert!(pair[0] >= pair[1]);
        }
    }

    #[test]
    fn test_rank_candidates_ties_keep_input_order() {
        let outcome = rank_candidates(scored(&[("x", 0.5), ("y", 0.5), ("z", 0.5)]), 0.0, 10);
        assert_eq!(outcome.services, vec!["x", "y", "z"]);
    }

    #[test]
    fn test_rank_candidates_dedupes_keeping_best() {
        let outcome = rank_candidates(scored(&[("a", 0.5), ("b", 0.7), ("a", 0.9)]), 0.0, 10);
        assert_eq!(outcome.services, vec!["a", "b"]);
        assert_eq!(outcome.scores, vec![0.9, 0.7]);
    }

    #[test]
    fn test_rank_candidates_impossible_threshold_empty() {
        let outcome = rank_candidates(scored(&[("a", 1.0)]), 1.01, 5);
        assert!(outcome.is_empty());
    }
}
