// src/results.rs
// Request-scoped result payloads returned by the facade.

use serde::Serialize;

use crate::models::{MatchType, Provider, ServiceId};

/// A directory row annotated with its distance from the user, when a user
/// location was part of the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedProvider {
    #[serde(flatten)]
    pub provider: Provider,
    pub distance_km: Option<f64>,
}

/// The facade's complete answer for one query: the resolved services with
/// their confidence scores, how they were matched, and the ranked
/// providers offering them.
#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub services: Vec<ServiceId>,
    pub scores: Vec<f64>,
    pub match_type: MatchType,
    pub providers: Vec<RankedProvider>,
}

impl Recommendation {
    /// "No providers matched" is a normal outcome, reported here instead
    /// of as an error.
    pub fn has_providers(&self) -> bool {
        !self.providers.is_empty()
    }
}
