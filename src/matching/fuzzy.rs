// src/matching/fuzzy.rs
// Fuzzy string-matching strategy: token-order-insensitive similarity.

use strsim::normalized_levenshtein;

use super::{rank_candidates, MatchOutcome, ServiceMatcher};
use crate::errors::EngineError;
use crate::normalize::normalize_for_embedding;

/// Matches a clinical concept against the service vocabulary by
/// token-sort ratio: both sides are tokenized, tokens sorted and the
/// rejoined strings compared, so word order never affects the score.
pub struct FuzzyMatcher;

/// Token-sort ratio in [0, 100].
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    let sort_tokens = |s: &str| -> String {
        let mut tokens: Vec<&str> = s.split_whitespace().collect();
        tokens.sort_unstable();
        tokens.join(" ")
    };
    let (sorted_a, sorted_b) = (sort_tokens(a), sort_tokens(b));
    if sorted_a.is_empty() && sorted_b.is_empty() {
        return 0.0;
    }
    normalized_levenshtein(&sorted_a, &sorted_b) * 100.0
}

impl ServiceMatcher for FuzzyMatcher {
    fn match_services(
        &self,
        query: &str,
        candidates: &[String],
        threshold: f64,
        top_k: usize,
    ) -> Result<MatchOutcome, EngineError> {
        if candidates.is_empty() {
            return Ok(MatchOutcome::default());
        }

        let query_clean = normalize_for_embedding(query);
        let scored = candidates
            .iter()
            .map(|candidate| {
                let ratio = token_sort_ratio(&query_clean, &normalize_for_embedding(candidate));
                (candidate.clone(), ratio / 100.0)
            })
            .collect();

        Ok(rank_candidates(scored, threshold, top_k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn services(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_token_sort_ratio_is_order_insensitive() {
        let a = token_sort_ratio("medico general urgencias", "urgencias medico general");
        assert!((a - 100.0).abs() < 1e-9);
        assert_eq!(token_sort_ratio("", ""), 0.0);
        assert!(token_sort_ratio("odontologia", "oftalmologia") < 100.0);
    }

    #[test]
    fn test_fuzzy_match_exact_service_label() {
        let outcome = FuzzyMatcher
            .match_services(
                "Urgencias Medico General",
                &services(&["urgencias_medico_general", "consulta_medicina_general"]),
                0.9,
                5,
            )
            .unwrap();
        assert_eq!(outcome.services, vec!["urgencias_medico_general"]);
        assert_eq!(outcome.scores, vec![1.0]);
    }

    #[test]
    fn test_fuzzy_match_tolerates_word_order_and_typos() {
        let outcome = FuzzyMatcher
            .match_services(
                "general medico urgencias",
                &services(&["urgencias_medico_general", "urgencias_ortopedista"]),
                0.7,
                5,
            )
            .unwrap();
        assert_eq!(outcome.services, vec!["urgencias_medico_general"]);

        // One substituted character still clears the threshold.
        let outcome = FuzzyMatcher
            .match_services(
                "urgencias medica general",
                &services(&["urgencias_medico_general"]),
                0.9,
                5,
            )
            .unwrap();
        assert_eq!(outcome.services.len(), 1);
    }

    #[test]
    fn test_fuzzy_match_empty_candidates_and_impossible_threshold() {
        assert!(FuzzyMatcher.match_services("x", &[], 0.0, 5).unwrap().is_empty());
        let outcome = FuzzyMatcher
            .match_services("urgencias", &services(&["urgencias"]), 1.01, 5)
            .unwrap();
        assert!(outcome.is_empty());
    }

    #[test]
    fn test_fuzzy_match_zero_threshold_counts() {
        let candidates = services(&["a_b", "a_b", "c_d", "e_f"]);
        let outcome = FuzzyMatcher.match_services("a b", &candidates, 0.0, 2).unwrap();
        assert_eq!(outcome.services.len(), 2);
        for pair in outcome.scores.windows(2) {
            assert!(pair[0] >= pair[1]);
        }
    }
}
