// src/correspondence.rs
// Precomputes the mapping from triage combinations to recommended services.

use std::collections::HashSet;

use log::{debug, info, warn};

use crate::config::{
    EngineConfig, EMERGENCY_MARKER, FALLBACK_EMERGENCY_SERVICE, FALLBACK_SCHEDULED_SERVICE,
    SCHEDULED_MARKER, SURGERY_MARKER,
};
use crate::matching::{MatchOutcome, MatchStrategy, ServiceMatcher};
use crate::models::{
    CorrespondenceEntry, MatchType, Provider, ServiceId, TriageCombination, TriageLevel,
};

/// Distinct service identifiers offered by the directory, in first-seen
/// order.
pub fn service_vocabulary(providers: &[Provider]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut vocabulary = Vec::new();
    for provider in providers {
        let id = provider.service_id.as_str();
        if seen.insert(id) {
            vocabulary.push(id.to_string());
        }
    }
    vocabulary
}

/// Narrow the vocabulary to the service classes a triage level can route
/// to: emergency services for T1-T3, scheduled consultations for T4-T5,
/// with surgery services additionally unioned in for T1.
pub fn prefilter_pool(vocabulary: &[String], level: TriageLevel) -> Vec<String> {
    let marker = if level.is_emergency() { EMERGENCY_MARKER } else { SCHEDULED_MARKER };
    let mut pool: Vec<String> =
        vocabulary.iter().filter(|s| s.contains(marker)).cloned().collect();

    if level == TriageLevel::T1 {
        for service in vocabulary {
            if service.contains(SURGERY_MARKER) && !pool.contains(service) {
                pool.push(service.clone());
            }
        }
    }
    pool
}

/// The service of last resort for a triage level, with score 1.0.
pub fn fallback_outcome(level: TriageLevel) -> (Vec<ServiceId>, Vec<f64>) {
    let service = if level.is_emergency() {
        FALLBACK_EMERGENCY_SERVICE
    } else {
        FALLBACK_SCHEDULED_SERVICE
    };
    (vec![ServiceId::new(service)], vec![1.0])
}

/// Build one correspondence entry per distinct combination.
///
/// Tier 1 matches the category text, only for the configured special
/// categories. Tier 2 matches the specialty text when tier 1 produced
/// nothing and a specialty is present. Tier 3 assigns the level fallback,
/// so no entry is ever left without a service. Matcher failures degrade to
/// the next tier instead of aborting the build.
pub fn build_correspondence_table(
    combinations: &[TriageCombination],
    providers: &[Provider],
    matcher: &dyn ServiceMatcher,
    cfg: &EngineConfig,
) -> Vec<CorrespondenceEntry> {
    let vocabulary = service_vocabulary(providers);
    let special: HashSet<&str> = cfg.special_categories.iter().map(String::as_str).collect();

    let mut seen = HashSet::new();
    let mut entries = Vec::new();

    for combination in combinations {
        if !seen.insert(combination.clone()) {
            continue;
        }

        let pool = prefilter_pool(&vocabulary, combination.triage_level);

        let mut outcome = MatchOutcome::default();
        let mut match_type = None;

        if special.contains(combination.category.as_str()) {
            outcome = run_matcher(matcher, &combination.category, &pool, cfg);
            if !outcome.is_empty() {
                match_type = Some(category_match_type(cfg.strategy));
            }
        }

        if outcome.is_empty() && !combination.specialty.is_empty() {
            outcome = run_matcher(matcher, &combination.specialty, &pool, cfg);
            if !outcome.is_empty() {
                match_type = Some(specialty_match_type(cfg.strategy));
            }
        }

        let (suggested_services, scores, match_type) = if outcome.is_empty() {
            let (services, scores) = fallback_outcome(combination.triage_level);
            (services, scores, MatchType::Fallback)
        } else {
            let services = outcome.services.into_iter().map(ServiceId::new).collect();
            // match_type is always set when the outcome is non-empty.
            (services, outcome.scores, match_type.unwrap_or(MatchType::Fallback))
        };

        debug!(
            "[{}] {} / {} -> {} ({} services)",
            combination.triage_level,
            combination.category,
            combination.specialty,
            match_type,
            suggested_services.len()
        );

        entries.push(CorrespondenceEntry {
            combination: combination.clone(),
            suggested_services,
            scores,
            match_type,
        });
    }

    info!(
        "correspondence table built: {} entries from {} combinations over {} services",
        entries.len(),
        combinations.len(),
        vocabulary.len()
    );
    entries
}

fn run_matcher(
    matcher: &dyn ServiceMatcher,
    query: &str,
    pool: &[String],
    cfg: &EngineConfig,
) -> MatchOutcome {
    match matcher.match_services(query, pool, cfg.threshold, cfg.top_k) {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!("matcher failed for '{}', falling through: {}", query, e);
            MatchOutcome::default()
        }
    }
}

fn category_match_type(strategy: MatchStrategy) -> MatchType {
    match strategy {
        MatchStrategy::Semantic => MatchType::CategorySemantic,
        MatchStrategy::Fuzzy => MatchType::CategoryFuzzy,
    }
}

fn specialty_match_type(strategy: MatchStrategy) -> MatchType {
    match strategy {
        MatchStrategy::Semantic => MatchType::SpecialtySemantic,
        MatchStrategy::Fuzzy => MatchType::SpecialtyFuzzy,
    }
}
