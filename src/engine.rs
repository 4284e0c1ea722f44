// src/engine.rs
// The recommendation facade: the single entry point the presentation
// layer calls with a triage outcome and a location.

use std::sync::Arc;

use log::{info, warn};

use crate::cache::{CacheInfo, TtlCache};
use crate::config::EngineConfig;
use crate::correspondence::{build_correspondence_table, fallback_outcome};
use crate::errors::EngineError;
use crate::geo::filter_and_rank;
use crate::matching::embedding::EmbeddingModel;
use crate::matching::{build_matcher, ServiceMatcher};
use crate::models::{CorrespondenceEntry, GeoPoint, MatchType, Provider, ServiceId, TriageLevel};
use crate::normalize::normalize_key;
use crate::providers::{clean_providers, merge_locations, CleaningConfig};
use crate::results::Recommendation;
use crate::sources::{source_signature, Row};
use crate::triage::build_combinations;

/// Provides the raw rows of the three source tables. The engine reloads
/// through this on every cache rebuild.
pub trait SourceSet: Send + Sync {
    fn provider_rows(&self) -> Result<Vec<Row>, EngineError>;
    fn urgent_provider_rows(&self) -> Result<Vec<Row>, EngineError>;
    fn triage_rows(&self) -> Result<Vec<Row>, EngineError>;
}

/// File-backed sources: three JSON tables on disk.
pub struct FileSources {
    pub providers: std::path::PathBuf,
    pub urgent_providers: std::path::PathBuf,
    pub triage_rules: std::path::PathBuf,
}

impl SourceSet for FileSources {
    fn provider_rows(&self) -> Result<Vec<Row>, EngineError> {
        crate::sources::load_rows(&self.providers)
    }

    fn urgent_provider_rows(&self) -> Result<Vec<Row>, EngineError> {
        crate::sources::load_rows(&self.urgent_providers)
    }

    fn triage_rows(&self) -> Result<Vec<Row>, EngineError> {
        crate::sources::load_rows(&self.triage_rules)
    }
}

/// In-memory sources, used by tests and embedded deployments.
#[derive(Default, Clone)]
pub struct StaticSources {
    pub providers: Vec<Row>,
    pub urgent_providers: Vec<Row>,
    pub triage_rules: Vec<Row>,
}

impl SourceSet for StaticSources {
    fn provider_rows(&self) -> Result<Vec<Row>, EngineError> {
        Ok(self.providers.clone())
    }

    fn urgent_provider_rows(&self) -> Result<Vec<Row>, EngineError> {
        Ok(self.urgent_providers.clone())
    }

    fn triage_rows(&self) -> Result<Vec<Row>, EngineError> {
        Ok(self.triage_rules.clone())
    }
}

/// One live query against the engine.
#[derive(Debug, Clone)]
pub struct RecommendationRequest {
    pub category: String,
    pub triage_level: String,
    pub specialty: String,
    pub department: String,
    pub municipality: String,
    pub user_location: Option<GeoPoint>,
    /// Overrides [`EngineConfig::max_distance_km`] when set.
    pub max_distance_km: Option<f64>,
}

/// Orchestrates the directory and correspondence caches and answers
/// recommendation queries.
pub struct RecommendationEngine {
    config: EngineConfig,
    cleaning: CleaningConfig,
    sources: Arc<dyn SourceSet>,
    matcher: Box<dyn ServiceMatcher>,
    directory: TtlCache<Vec<Provider>>,
    correspondence: TtlCache<Vec<CorrespondenceEntry>>,
}

impl RecommendationEngine {
    pub fn new(
        config: EngineConfig,
        sources: Arc<dyn SourceSet>,
        embedder: Arc<dyn EmbeddingModel>,
    ) -> Self {
        let matcher = build_matcher(config.strategy, embedder);
        let directory = TtlCache::new("provider-directory", config.cache_ttl, config.rebuild_timeout);
        let correspondence =
            TtlCache::new("correspondence-table", config.cache_ttl, config.rebuild_timeout);
        RecommendationEngine {
            config,
            cleaning: CleaningConfig::default(),
            sources,
            matcher,
            directory,
            correspondence,
        }
    }

    /// The cleaned, merged provider directory (cached).
    pub async fn directory(&self) -> Result<Arc<Vec<Provider>>, EngineError> {
        let primary_rows = self.sources.provider_rows()?;
        let urgent_rows = self.sources.urgent_provider_rows()?;
        let signature = source_signature(&[&primary_rows, &urgent_rows]);

        self.directory
            .get_or_build(Some(signature), || async {
                let primary = clean_providers(&primary_rows, &self.cleaning)?;
                let urgent = clean_providers(&urgent_rows, &self.cleaning)?;
                Ok(merge_locations(&primary, &urgent))
            })
            .await
    }

    /// The triage-to-service correspondence table (cached).
    pub async fn correspondence_table(&self) -> Result<Arc<Vec<CorrespondenceEntry>>, EngineError> {
        let providers = self.directory().await?;
        let triage_rows = self.sources.triage_rows()?;
        let signature = source_signature(&[&triage_rows]);

        self.correspondence
            .get_or_build(Some(signature), || async {
                let combinations = build_combinations(&triage_rows)?;
                Ok(build_correspondence_table(
                    &combinations,
                    &providers,
                    self.matcher.as_ref(),
                    &self.config,
                ))
            })
            .await
    }

    /// Drop both caches; the next query rebuilds from the sources.
    pub async fn invalidate(&self) {
        self.directory.invalidate().await;
        self.correspondence.invalidate().await;
    }

    /// Metadata of the published caches (directory, correspondence).
    pub async fn cache_info(&self) -> (Option<CacheInfo>, Option<CacheInfo>) {
        (self.directory.info().await, self.correspondence.info().await)
    }

    /// Answer one triage outcome with ranked providers.
    ///
    /// Raises only for malformed input or source-schema mismatches. Every
    /// other failure degrades to the triage-level fallback services or to
    /// an empty provider list the caller reports as "no providers
    /// matched".
    pub async fn recommend(
        &self,
        request: &RecommendationRequest,
    ) -> Result<Recommendation, EngineError> {
        let level = TriageLevel::parse(&request.triage_level).ok_or_else(|| {
            EngineError::InvalidInput(format!("unknown triage level '{}'", request.triage_level))
        })?;
        let category = require_key(&request.category, "category")?;
        let department = require_field(&request.department, "department")?;
        let municipality = require_field(&request.municipality, "municipality")?;
        let specialty = normalize_key(&request.specialty);

        let (services, scores, match_type) = match self.correspondence_table().await {
            Ok(table) => resolve_services(&table, &category, level, &specialty),
            Err(e) if e.is_configuration() => return Err(e),
            Err(e) => {
                warn!("correspondence table unavailable ({}), using level fallback", e);
                let (services, scores) = fallback_outcome(level);
                (services, scores, MatchType::Fallback)
            }
        };

        let providers = match self.directory().await {
            Ok(directory) => filter_and_rank(
                &directory,
                &services,
                &department,
                &municipality,
                request.user_location,
                request.max_distance_km.unwrap_or(self.config.max_distance_km),
            ),
            Err(e) if e.is_configuration() => return Err(e),
            Err(e) => {
                warn!("provider directory unavailable ({}), returning no providers", e);
                Vec::new()
            }
        };

        let recommendation = Recommendation { services, scores, match_type, providers };
        info!(
            "recommendation for {}/{}: {} via {}, {} providers",
            category,
            level,
            recommendation
                .services
                .iter()
                .map(ServiceId::as_str)
                .collect::<Vec<_>>()
                .join(","),
            recommendation.match_type,
            recommendation.providers.len()
        );
        Ok(recommendation)
    }
}

/// Look up the correspondence entry for (category, level, specialty);
/// unseen combinations degrade to the triage-level fallback.
fn resolve_services(
    table: &[CorrespondenceEntry],
    category: &str,
    level: TriageLevel,
    specialty: &str,
) -> (Vec<ServiceId>, Vec<f64>, MatchType) {
    let hit = table.iter().find(|entry| {
        entry.combination.category == category
            && entry.combination.triage_level == level
            && entry.combination.specialty == specialty
    });

    match hit {
        Some(entry) => {
            (entry.suggested_services.clone(), entry.scores.clone(), entry.match_type)
        }
        None => {
            let (services, scores) = fallback_outcome(level);
            (services, scores, MatchType::Fallback)
        }
    }
}

fn require_field(value: &str, name: &str) -> Result<String, EngineError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidInput(format!("missing required field '{}'", name)));
    }
    Ok(trimmed.to_string())
}

fn require_key(value: &str, name: &str) -> Result<String, EngineError> {
    let key = normalize_key(value);
    if key.is_empty() {
        return Err(EngineError::InvalidInput(format!("missing required field '{}'", name)));
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::matching::embedding::HashedEmbedder;
    use crate::sources::canonicalize_columns;

    fn provider_row(
        name: &str,
        service: &str,
        municipality: &str,
        lat: f64,
        lng: f64,
        priority: i64,
    ) -> Row {
        match json!({
            "prestador": name,
            "sucursal_prestador": format!("{} Sede", name),
            "departamento": "Antioquia",
            "municipio": municipality,
            "direccion_domicilio": "Calle 1 # 2-3",
            "valor_latitud": lat,
            "valor_longitud": lng,
            "concepto_factura": service,
            "direccionamiento": priority,
            "horario_habil": "24 horas",
            "telefono": "6041234567",
            "telefono_celular": "3001234567",
        }) {
            Value::Object(map) => canonicalize_columns(map),
            _ => unreachable!(),
        }
    }

    fn rule_row(category: &str, level: &str, specialty: &str) -> Row {
        match json!({
            "categoria": category,
            "sintoma": "sintoma generico",
            "modificador": "ninguno",
            "nivel_triage": level,
            "modalidad": "presencial",
            "especialidad": specialty,
        }) {
            Value::Object(map) => canonicalize_columns(map),
            _ => unreachable!(),
        }
    }

    /// Directory with one emergency provider ~2 km from the query point
    /// and one psychology provider ~80 km away.
    fn engine_with_fixture() -> RecommendationEngine {
        let sources = StaticSources {
            providers: vec![
                // ~2 km north of (6.25, -75.57).
                provider_row("Clinica Cercana", "Urgencias Medico General", "Medellín", 6.268, -75.57, 2),
                // ~80 km away.
                provider_row(
                    "IPS Lejana",
                    "Consulta Psicologo y Terapia Psicologica",
                    "Medellín",
                    6.95,
                    -75.45,
                    1,
                ),
            ],
            urgent_providers: Vec::new(),
            triage_rules: vec![
                rule_row("Salud Mental", "T1", "Psiquiatría"),
                rule_row("Piel", "T5", "especialidad rara"),
            ],
        };
        RecommendationEngine::new(
            EngineConfig::default(),
            Arc::new(sources),
            Arc::new(HashedEmbedder::new()),
        )
    }

    fn request(category: &str, level: &str, specialty: &str) -> RecommendationRequest {
        RecommendationRequest {
            category: category.into(),
            triage_level: level.into(),
            specialty: specialty.into(),
            department: "Antioquia".into(),
            municipality: "Medellín".into(),
            user_location: Some(GeoPoint::new(6.25, -75.57)),
            max_distance_km: Some(50.0),
        }
    }

    #[tokio::test]
    async fn test_end_to_end_distance_cut() {
        let engine = engine_with_fixture();
        let rec = engine.recommend(&request("salud_mental", "T1", "psiquiatria")).await.unwrap();

        // The 80 km psychology provider is outside the radius and not an
        // emergency service; only the 2 km general-emergency one remains.
        assert_eq!(rec.providers.len(), 1);
        assert_eq!(rec.providers[0].provider.provider_name, "Clinica Cercana");
        let distance = rec.providers[0].distance_km.unwrap();
        assert!((distance - 2.0).abs() < 0.5, "unexpected distance {}", distance);
        assert_eq!(rec.services, vec![ServiceId::new("urgencias_medico_general")]);
    }

    #[tokio::test]
    async fn test_end_to_end_unknown_specialty_t5_fallback() {
        let engine = engine_with_fixture();
        let rec = engine
            .recommend(&request("categoria_desconocida", "T5", "especialidad desconocida"))
            .await
            .unwrap();
        assert_eq!(rec.match_type, MatchType::Fallback);
        assert_eq!(rec.services, vec![ServiceId::new("consulta_medicina_general")]);
        assert_eq!(rec.scores, vec![1.0]);
        assert!(!rec.has_providers());
    }

    #[tokio::test]
    async fn test_end_to_end_accented_region_inputs() {
        let engine = engine_with_fixture();
        let mut req = request("salud_mental", "T1", "psiquiatria");
        req.department = "ANTIOQUÍA".into();
        req.municipality = "medellín".into();
        let rec = engine.recommend(&req).await.unwrap();
        assert_eq!(rec.providers.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_department_is_invalid_input() {
        let engine = engine_with_fixture();
        let mut req = request("salud_mental", "T1", "psiquiatria");
        req.department = "  ".into();
        let err = engine.recommend(&req).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_unknown_triage_level_is_invalid_input() {
        let engine = engine_with_fixture();
        let err = engine.recommend(&request("piel", "T9", "")).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_precomputed_entry_is_used_when_present() {
        let engine = engine_with_fixture();
        // The T5 "piel" combination exists in the rules; its specialty has
        // no match in the vocabulary, so the table carries the fallback.
        let mut req = request("piel", "T5", "especialidad rara");
        req.user_location = None;
        let rec = engine.recommend(&req).await.unwrap();
        assert_eq!(rec.match_type, MatchType::Fallback);
        assert_eq!(rec.services, vec![ServiceId::new("consulta_medicina_general")]);
    }

    #[tokio::test]
    async fn test_invalidate_then_reuse() {
        let engine = engine_with_fixture();
        engine.recommend(&request("salud_mental", "T1", "psiquiatria")).await.unwrap();
        let (dir_info, corr_info) = engine.cache_info().await;
        assert!(dir_info.is_some() && corr_info.is_some());

        engine.invalidate().await;
        let (dir_info, corr_info) = engine.cache_info().await;
        assert!(dir_info.is_none() && corr_info.is_none());

        // Queries keep working after invalidation.
        let rec = engine.recommend(&request("salud_mental", "T1", "psiquiatria")).await.unwrap();
        assert_eq!(rec.providers.len(), 1);
    }
}
