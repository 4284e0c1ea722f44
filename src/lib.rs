// src/lib.rs
// Triage-to-provider recommendation engine: maps a patient's triage
// outcome and location to ranked healthcare providers.

pub mod cache;
pub mod config;
pub mod correspondence;
pub mod engine;
pub mod errors;
pub mod geo;
pub mod geocode;
pub mod matching;
pub mod models;
pub mod normalize;
pub mod providers;
pub mod results;
pub mod sources;
pub mod triage;

pub use config::EngineConfig;
pub use engine::{FileSources, RecommendationEngine, RecommendationRequest, SourceSet, StaticSources};
pub use errors::EngineError;
pub use models::{
    CorrespondenceEntry, GeoPoint, MatchType, Provider, ServiceId, TriageCombination, TriageLevel,
};
pub use results::{RankedProvider, Recommendation};
