// src/models.rs
// Domain types shared across the recommendation pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a provider service, drawn from the controlled vocabulary
/// after normalization (e.g. `urgencias_medico_general`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceId(pub String);

impl ServiceId {
    pub fn new(id: impl Into<String>) -> Self {
        ServiceId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Acuity classification for a triage outcome. T1 is the most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TriageLevel {
    T1,
    T2,
    T3,
    T4,
    T5,
}

impl TriageLevel {
    /// Parse a raw label from the rules table or a live query.
    ///
    /// Accepts `T1`..`T5` in any case and the bare digits `1`..`5` that
    /// appear in some revisions of the rules source.
    pub fn parse(raw: &str) -> Option<TriageLevel> {
        match raw.trim().to_uppercase().as_str() {
            "T1" | "1" => Some(TriageLevel::T1),
            "T2" | "2" => Some(TriageLevel::T2),
            "T3" | "3" => Some(TriageLevel::T3),
            "T4" | "4" => Some(TriageLevel::T4),
            "T5" | "5" => Some(TriageLevel::T5),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TriageLevel::T1 => "T1",
            TriageLevel::T2 => "T2",
            TriageLevel::T3 => "T3",
            TriageLevel::T4 => "T4",
            TriageLevel::T5 => "T5",
        }
    }

    /// T1-T3 route to emergency service classes, T4-T5 to scheduled
    /// consultations.
    pub fn is_emergency(&self) -> bool {
        matches!(self, TriageLevel::T1 | TriageLevel::T2 | TriageLevel::T3)
    }
}

impl fmt::Display for TriageLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A point on Earth in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        GeoPoint { lat, lng }
    }
}

/// One cleaned directory row: a single (institution, branch, service)
/// triple with validated coordinates and a routing priority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub provider_name: String,
    pub branch: String,
    /// Administrative region, title-cased for display.
    pub department: String,
    pub municipality: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub service_id: ServiceId,
    /// Lower is higher priority. The sentinel 9 ("excluded from routing")
    /// never survives cleaning.
    pub routing_priority: i64,
    pub schedule: Option<String>,
    pub phone_landline: Option<String>,
    pub phone_mobile: Option<String>,
}

impl Provider {
    /// Composite key used when merging location overrides.
    pub fn location_key(&self) -> (String, String, String) {
        (
            self.branch.clone(),
            self.department.clone(),
            self.municipality.clone(),
        )
    }
}

/// One distinct clinical combination observed in the triage rules table.
/// All textual fields are normalized keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TriageCombination {
    pub category: String,
    pub triage_level: TriageLevel,
    pub modality: String,
    pub specialty: String,
}

/// How a correspondence entry's services were obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    CategorySemantic,
    CategoryFuzzy,
    SpecialtySemantic,
    SpecialtyFuzzy,
    Fallback,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::CategorySemantic => "category_semantic",
            MatchType::CategoryFuzzy => "category_fuzzy",
            MatchType::SpecialtySemantic => "specialty_semantic",
            MatchType::SpecialtyFuzzy => "specialty_fuzzy",
            MatchType::Fallback => "fallback",
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Precomputed mapping from one triage combination to the services that
/// should be recommended for it.
///
/// Invariant: `suggested_services` and `scores` have the same length and
/// are never empty; the fallback tier guarantees at least one service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrespondenceEntry {
    pub combination: TriageCombination,
    pub suggested_services: Vec<ServiceId>,
    pub scores: Vec<f64>,
    pub match_type: MatchType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triage_level_parse() {
        assert_eq!(TriageLevel::parse("t1"), Some(TriageLevel::T1));
        assert_eq!(TriageLevel::parse(" T3 "), Some(TriageLevel::T3));
        assert_eq!(TriageLevel::parse("4"), Some(TriageLevel::T4));
        assert_eq!(TriageLevel::parse("T6"), None);
        assert_eq!(TriageLevel::parse(""), None);
    }

    #[test]
    fn test_triage_level_acuity() {
        assert!(TriageLevel::T1.is_emergency());
        assert!(TriageLevel::T3.is_emergency());
        assert!(!TriageLevel::T4.is_emergency());
        assert!(!TriageLevel::T5.is_emergency());
        // T1 is the most severe and orders first.
        assert!(TriageLevel::T1 < TriageLevel::T5);
    }
}
