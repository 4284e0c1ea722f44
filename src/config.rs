// src/config.rs
// Controlled vocabulary, cleaning tables and engine tunables.

use std::time::Duration;

use crate::matching::MatchStrategy;

/// Minimum similarity score for a match to count.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.7;

/// Number of service suggestions kept per triage combination.
pub const DEFAULT_TOP_K: usize = 3;

/// Radius the geographic filter applies when the caller does not override it.
pub const DEFAULT_MAX_DISTANCE_KM: f64 = 50.0;

/// Directory and correspondence caches are rebuilt wholesale after this long.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// A rebuild running longer than this fails the request instead of hanging.
pub const DEFAULT_REBUILD_TIMEOUT: Duration = Duration::from_secs(120);

/// Service-class markers used by the triage-level prefilter.
pub const EMERGENCY_MARKER: &str = "urgencias";
pub const SCHEDULED_MARKER: &str = "consulta";
pub const SURGERY_MARKER: &str = "cirugia";

/// Services of last resort when no match survives the tiers.
pub const FALLBACK_EMERGENCY_SERVICE: &str = "urgencias_medico_general";
pub const FALLBACK_SCHEDULED_SERVICE: &str = "consulta_medicina_general";

/// Categories routed through the category-match tier before any specialty
/// lookup. These are the clinical areas whose category name alone already
/// determines the service class.
pub const SPECIAL_CATEGORIES: [&str; 4] = [
    "salud_mental",
    "oftalmologia",
    "riesgo_biologico",
    "neurologico_o_cabeza",
];

/// Provider names excluded from the directory outright.
pub const PROVIDER_DENYLIST: [&str; 2] = [
    "ORDEN DE COMPRA PUNTUAL",
    "IPS DE ATENCION INICIALPOR CONFIRMAR",
];

/// Controlled vocabulary of service labels accepted from the raw source,
/// expressed as normalized keys. Labels outside this list are dropped.
pub const ALLOWED_SERVICES: [&str; 25] = [
    "urgencias_medico_general",
    "consulta_no_programada",
    "urgencias_riesgo_biologico",
    "consulta_ortopedista",
    "urgencias_ortopedista",
    "consulta_medicina_fisica_y_de_deporte_l",
    "consulta_odontologica",
    "consulta_prioritaria_odontologia_l",
    "urgencias_odontologia_l",
    "consulta_prioritaria_de_oftalmologia_l",
    "consulta_oftalmologia",
    "cirugia_oftalmologia",
    "urgencias_oftalmologia",
    "consulta_medicina_interna",
    "consulta_medicin_interna_telemedicina_l",
    "consulta_urologia",
    "cirugia_urologia",
    "consulta_otorrinolaringologia",
    "cirugia_otorrinolaringologia",
    "consulta_dermatologia_telemedicina_l",
    "consulta_y_procedimientos_dermatologia",
    "urgencia_cirugia_plastica",
    "consulta_psicologo_y_terapia_psicologica",
    "consulta_neurologo",
    "consulta_cirujano_general",
];

/// Fixed renaming table folding near-duplicate and legacy service labels
/// into canonical identifiers.
pub const SERVICE_RENAMES: [(&str, &str); 8] = [
    ("consulta_medicina_fisica_y_de_deporte_l", "consulta_deportologia"),
    ("consulta_prioritaria_odontologia_l", "consulta_prioritaria_odontologia"),
    ("urgencias_odontologia_l", "urgencias_odontologia"),
    ("consulta_prioritaria_de_oftalmologia_l", "consulta_prioritaria_oftalmologia"),
    ("consulta_medicin_interna_telemedicina_l", "consulta_medicina_interna_telemedicina"),
    ("consulta_dermatologia_telemedicina_l", "consulta_dermatologia_telemedicina"),
    ("consulta_no_programada", "consulta_medicina_general"),
    ("consulta_cirujano_general", "consulta_cirugia_general"),
];

/// Tunables for one engine instance, fixed at construction time.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub strategy: MatchStrategy,
    pub threshold: f64,
    pub top_k: usize,
    pub max_distance_km: f64,
    pub cache_ttl: Duration,
    pub rebuild_timeout: Duration,
    pub special_categories: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            strategy: MatchStrategy::Semantic,
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
            top_k: DEFAULT_TOP_K,
            max_distance_km: DEFAULT_MAX_DISTANCE_KM,
            cache_ttl: DEFAULT_CACHE_TTL,
            rebuild_timeout: DEFAULT_REBUILD_TIMEOUT,
            special_categories: SPECIAL_CATEGORIES.iter().map(|s| s.to_string()).collect(),
        }
    }
}
