// src/matching/semantic.rs
// Embedding-based matching strategy.

use std::sync::Arc;

use anyhow::{Context, Result as AnyhowResult};
use candle_core::{Device, Tensor};
use log::warn;
use once_cell::sync::Lazy;

use super::embedding::EmbeddingModel;
use super::{rank_candidates, MatchOutcome, ServiceMatcher};
use crate::errors::EngineError;
use crate::normalize::normalize_for_embedding;

static CANDLE_DEVICE: Lazy<Device> = Lazy::new(|| Device::Cpu);

/// Matches a clinical concept against the service vocabulary by cosine
/// similarity of sentence embeddings.
pub struct SemanticMatcher {
    embedder: Arc<dyn EmbeddingModel>,
}

impl SemanticMatcher {
    pub fn new(embedder: Arc<dyn EmbeddingModel>) -> Self {
        SemanticMatcher { embedder }
    }
}

impl ServiceMatcher for SemanticMatcher {
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

        let query_embedding = self.embedder.embed(&normalize_for_embedding(query))?;

        let cleaned: Vec<String> = candidates.iter().map(|c| normalize_for_embedding(c)).collect();
        let cleaned_refs: Vec<&str> = cleaned.iter().map(String::as_str).collect();
        let candidate_embeddings = self.embedder.embed_batch(&cleaned_refs)?;

        let mut scored = Vec::with_capacity(candidates.len());
        for (candidate, embedding) in candidates.iter().zip(candidate_embeddings.iter()) {
            let similarity = match cosine_similarity(&query_embedding, embedding) {
                Ok(sim) => sim,
                Err(e) => {
                    warn!("cosine similarity failed for candidate '{}': {}", candidate, e);
                    continue;
                }
            };
            // Cosine lands in [-1, 1]; negatives carry no useful signal here.
            scored.push((candidate.clone(), similarity.max(0.0)));
        }

        Ok(rank_candidates(scored, threshold, top_k))
    }
}

/// Cosine similarity of two embedding vectors on the candle CPU device.
///
/// Zero-magnitude and non-finite results collapse to 0.0 rather than
/// propagating NaN into score ordering.
pub fn cosine_similarity(v1: &[f32], v2: &[f32]) -> AnyhowResult<f64> {
    if v1.len() != v2.len() {
        anyhow::bail!("embedding lengths differ: {} vs {}", v1.len(), v2.len());
    }
    if v1.is_empty() {
        anyhow::bail!("embeddings must not be empty");
    }

    let t1 = Tensor::from_slice(v1, (v1.len(),), &CANDLE_DEVICE).context("tensor v1")?;
    let t2 = Tensor::from_slice(v2, (v2.len(),), &CANDLE_DEVICE).context("tensor v2")?;

    let dot = (&t1 * &t2)?.sum_all()?.to_scalar::<f32>()? as f64;
    let mag1 = (&t1 * &t1)?.sum_all()?.sqrt()?.to_scalar::<f32>()? as f64;
    let mag2 = (&t2 * &t2)?.sum_all()?.sqrt()?.to_scalar::<f32>()? as f64;

    if mag1 == 0.0 || mag2 == 0.0 {
        return Ok(0.0);
    }
    let similarity = dot / (mag1 * mag2);
    if !similarity.is_finite() {
        warn!("cosine similarity produced a non-finite value, treating as 0.0");
        return Ok(0.0);
    }
    Ok(similarity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::embedding::HashedEmbedder;

    fn matcher() -> SemanticMatcher {
        SemanticMatcher::new(Arc::new(HashedEmbedder::new()))
    }

    fn services(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_cosine_similarity_identity_and_orthogonality() {
        let a = [1.0f32, 0.0, 0.0];
        let b = [0.0f32, 1.0, 0.0];
        assert!((cosine_similarity(&a, &a).unwrap() - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&a, &b).unwrap().abs() < 1e-6);
        assert_eq!(cosine_similarity(&a, &[0.0f32, 0.0, 0.0]).unwrap(), 0.0);
        assert!(cosine_similarity(&a, &[1.0f32, 2.0]).is_err());
    }

    #[test]
    fn test_semantic_match_ranks_by_token_overlap() {
        let outcome = matcher()
            .match_services(
                "salud_mental",
                &services(&[
                    "urgencias_salud_mental",
                    "consulta_salud_mental",
                    "urgencias_ortopedista",
                ]),
                0.5,
                5,
            )
            .unwrap();
        assert_eq!(outcome.services.len(), 2);
        assert!(outcome.services.contains(&"urgencias_salud_mental".to_string()));
        assert!(outcome.services.contains(&"consulta_salud_mental".to_string()));
        for pair in outcome.scores.windows(2) {
            assert!(pair[0] >= pair[1]);
        }
    }

    #[test]
    fn test_semantic_match_empty_candidates() {
        let outcome = matcher().match_services("ortopedia", &[], 0.0, 5).unwrap();
        assert!(outcome.is_empty());
    }

    #[test]
    fn test_semantic_match_zero_threshold_keeps_all_unique() {
        let candidates = services(&["consulta_urologia", "consulta_urologia", "consulta_neurologo"]);
        let outcome = matcher().match_services("urologia", &candidates, 0.0, 10).unwrap();
        assert_eq!(outcome.services.len(), 2);
        assert_eq!(outcome.services.len(), outcome.scores.len());
    }

    #[test]
    fn test_semantic_match_impossible_threshold() {
        let candidates = services(&["consulta_urologia"]);
        let outcome = matcher().match_services("urologia", &candidates, 1.01, 10).unwrap();
        assert!(outcome.is_empty());
    }
}
