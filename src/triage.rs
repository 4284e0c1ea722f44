// src/triage.rs
// Clinical rules table: column role discovery, combination building and
// the symptom catalog the intake flow queries.

use std::collections::{BTreeMap, HashSet};

use log::{debug, warn};

use crate::errors::EngineError;
use crate::models::{TriageCombination, TriageLevel};
use crate::normalize::normalize_key;
use crate::sources::{self, Row};

/// Column roles located by substring match against canonicalized column
/// names. `specialty` is the only optional role: rules rows without it
/// fall through to the level fallback later in the pipeline.
const ROLE_PATTERNS: [(&str, &str); 6] = [
    ("category", "categ"),
    ("symptom", "sintoma"),
    ("modifier", "modif"),
    ("triage", "triage"),
    ("modality", "modal"),
    ("specialty", "especial"),
];

/// Resolved column names for the rules table.
#[derive(Debug, Clone)]
struct RuleColumns {
    category: String,
    symptom: String,
    modifier: String,
    triage: String,
    modality: String,
    specialty: Option<String>,
}

fn discover_columns(rows: &[Row]) -> Result<RuleColumns, EngineError> {
    let columns: Vec<&str> = rows
        .iter()
        .flat_map(|r| r.keys().map(String::as_str))
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();

    let find = |pattern: &str| -> Option<String> {
        // Deterministic pick when several columns contain the pattern.
        let mut hits: Vec<&&str> = columns.iter().filter(|c| c.contains(pattern)).collect();
        hits.sort();
        hits.first().map(|c| c.to_string())
    };

    let mut resolved: BTreeMap<&str, String> = BTreeMap::new();
    for (role, pattern) in ROLE_PATTERNS {
        match find(pattern) {
            Some(col) => {
                resolved.insert(role, col);
            }
            None if role == "specialty" => {}
            None => {
                return Err(EngineError::Configuration(format!(
                    "triage rules table has no column matching role '{}' (pattern '{}')",
                    role, pattern
                )));
            }
        }
    }

    Ok(RuleColumns {
        category: resolved["category"].clone(),
        symptom: resolved["symptom"].clone(),
        modifier: resolved["modifier"].clone(),
        triage: resolved["triage"].clone(),
        modality: resolved["modality"].clone(),
        specialty: resolved.get("specialty").cloned(),
    })
}

/// Extract the distinct (category, triage level, modality, specialty)
/// combinations from the clinical rules table.
///
/// Every textual field is normalized into the shared key space; triage
/// levels accept `T1`..`T5` and bare digits. Rows with no category or
/// symptom, or with an unparseable level, are skipped with a warning.
pub fn build_combinations(rows: &[Row]) -> Result<Vec<TriageCombination>, EngineError> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let cols = discover_columns(rows)?;

    let mut seen = HashSet::new();
    let mut combinations = Vec::new();
    let mut skipped = 0usize;

    for row in rows {
        let category = sources::str_field(row, &cols.category).map(|v| normalize_key(&v));
        let symptom = sources::str_field(row, &cols.symptom).map(|v| normalize_key(&v));
        let (category, _symptom) = match (category, symptom) {
            (Some(c), Some(s)) if !c.is_empty() && !s.is_empty() => (c, s),
            _ => continue,
        };

        let raw_level = match sources::str_field(row, &cols.triage) {
            Some(l) => l,
            None => continue,
        };
        let triage_level = match TriageLevel::parse(&raw_level) {
            Some(l) => l,
            None => {
                skipped += 1;
                warn!("skipping rules row with unparseable triage level '{}'", raw_level);
                continue;
            }
        };

        let modality = sources::str_field(row, &cols.modality)
            .map(|v| normalize_key(&v))
            .unwrap_or_default();
        let specialty = cols
            .specialty
            .as_ref()
            .and_then(|c| sources::str_field(row, c))
            .map(|v| normalize_key(&v))
            .unwrap_or_default();

        let combination = TriageCombination { category, triage_level, modality, specialty };
        if seen.insert(combination.clone()) {
            combinations.push(combination);
        }
    }

    debug!(
        "built {} distinct triage combinations from {} rules rows ({} skipped)",
        combinations.len(),
        rows.len(),
        skipped
    );
    Ok(combinations)
}

/// Queryable Category -> Symptom -> Modifiers view over the rules table,
/// preserving the display casing of the source. This is what the intake
/// flow reads to offer choices.
#[derive(Debug, Clone, Default)]
pub struct SymptomCatalog {
    entries: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

/// Aggregate counts over a [`SymptomCatalog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogSummary {
    pub total_categories: usize,
    pub total_symptoms: usize,
    pub total_modifiers: usize,
}

impl SymptomCatalog {
    pub fn from_rows(rows: &[Row]) -> Result<SymptomCatalog, EngineError> {
        if rows.is_empty() {
            return Ok(SymptomCatalog::default());
        }
        let cols = discover_columns(rows)?;

        let mut entries: BTreeMap<String, BTreeMap<String, Vec<String>>> = BTreeMap::new();
        for row in rows {
            let category = match sources::str_field(row, &cols.category) {
                Some(c) => c,
                None => continue,
            };
            let symptom = match sources::str_field(row, &cols.symptom) {
                Some(s) => s,
                None => continue,
            };
            let modifiers = entries.entry(category).or_default().entry(symptom).or_default();
            if let Some(modifier) = sources::str_field(row, &cols.modifier) {
                if !modifiers.contains(&modifier) {
                    modifiers.push(modifier);
                }
            }
        }

        Ok(SymptomCatalog { entries })
    }

    /// All category names, sorted.
    pub fn categories(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Symptom names for one category, sorted; empty for unknown categories.
    pub fn symptoms(&self, category: &str) -> Vec<&str> {
        self.entries
            .get(category)
            .map(|symptoms| symptoms.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Modifiers for one (category, symptom) pair in source order.
    pub fn modifiers(&self, category: &str, symptom: &str) -> Vec<&str> {
        self.entries
            .get(category)
            .and_then(|symptoms| symptoms.get(symptom))
            .map(|mods| mods.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Case-insensitive keyword search over symptom names, grouped by
    /// category.
    pub fn search(&self, keyword: &str) -> BTreeMap<&str, Vec<&str>> {
        let needle = keyword.to_lowercase();
        let mut results = BTreeMap::new();
        for (category, symptoms) in &self.entries {
            let hits: Vec<&str> = symptoms
                .keys()
                .filter(|s| s.to_lowercase().contains(&needle))
                .map(String::as_str)
                .collect();
            if !hits.is_empty() {
                results.insert(category.as_str(), hits);
            }
        }
        results
    }

    /// Whether the (category, symptom, modifier) triple exists in the rules.
    pub fn validate(&self, category: &str, symptom: &str, modifier: &str) -> bool {
        self.entries
            .get(category)
            .and_then(|symptoms| symptoms.get(symptom))
            .map(|mods| mods.iter().any(|m| m == modifier))
            .unwrap_or(false)
    }

    pub fn summary(&self) -> CatalogSummary {
        let total_symptoms: HashSet<&str> = self
            .entries
            .values()
            .flat_map(|symptoms| symptoms.keys().map(String::as_str))
            .collect();
        let total_modifiers = self
            .entries
            .values()
            .flat_map(|symptoms| symptoms.values())
            .map(|mods| mods.len())
            .sum();
        CatalogSummary {
            total_categories: self.entries.len(),
            total_symptoms: total_symptoms.len(),
            total_modifiers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn rule_row(category: &str, symptom: &str, modifier: &str, level: &str, specialty: &str) -> Row {
        match json!({
            "Categoría": category,
            "Síntoma": symptom,
            "Modificador": modifier,
            "Nivel de Triage": level,
            "Modalidad": "presencial",
            "Especialidad": specialty,
        }) {
            Value::Object(map) => sources::canonicalize_columns(map),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_build_combinations_normalizes_and_dedupes() {
        let rows = vec![
            rule_row("Salud Mental", "Ansiedad", "Ninguno", "1", "Psiquiatría"),
            // Same combination spelled differently must collapse.
            rule_row("SALUD MENTAL", "Insomnio", "Ninguno", "T1", "psiquiatria"),
            rule_row("Piel", "Brote", "Fiebre", "t5", "Dermatología"),
        ];

        let combos = build_combinations(&rows).unwrap();
        assert_eq!(combos.len(), 2);
        assert_eq!(combos[0].category, "salud_mental");
        assert_eq!(combos[0].triage_level, TriageLevel::T1);
        assert_eq!(combos[0].specialty, "psiquiatria");
        assert_eq!(combos[1].category, "piel");
        assert_eq!(combos[1].triage_level, TriageLevel::T5);
        assert_eq!(combos[1].specialty, "dermatologia");
    }

    #[test]
    fn test_build_combinations_skips_bad_rows() {
        let rows = vec![
            rule_row("Piel", "Brote", "Ninguno", "T9", "Dermatología"),
            rule_row("", "Brote", "Ninguno", "T5", "Dermatología"),
            rule_row("Piel", "Brote", "Ninguno", "T5", ""),
        ];
        let combos = build_combinations(&rows).unwrap();
        assert_eq!(combos.len(), 1);
        assert_eq!(combos[0].specialty, "");
    }

    #[test]
    fn test_missing_role_is_configuration_error() {
        let mut row = rule_row("Piel", "Brote", "Ninguno", "T5", "Dermatología");
        row.remove("modalidad");
        let err = build_combinations(&[row]).unwrap_err();
        match err {
            EngineError::Configuration(msg) => assert!(msg.contains("modality")),
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_catalog_queries() {
        let rows = vec![
            rule_row("Boca, garganta y cuello", "Golpe en la boca", "Sangrado", "T3", ""),
            rule_row("Boca, garganta y cuello", "Golpe en la boca", "Dolor intenso", "T2", ""),
            rule_row("Boca, garganta y cuello", "Dificultad para tragar", "Ninguno", "T4", ""),
            rule_row("Piel", "Brote", "Fiebre", "T5", "Dermatología"),
        ];
        let catalog = SymptomCatalog::from_rows(&rows).unwrap();

        assert_eq!(catalog.categories(), vec!["Boca, garganta y cuello", "Piel"]);
        assert_eq!(
            catalog.symptoms("Boca, garganta y cuello"),
            vec!["Dificultad para tragar", "Golpe en la boca"]
        );
        assert_eq!(
            catalog.modifiers("Boca, garganta y cuello", "Golpe en la boca"),
            vec!["Sangrado", "Dolor intenso"]
        );
        assert!(catalog.validate("Piel", "Brote", "Fiebre"));
        assert!(!catalog.validate("Piel", "Brote", "Sangrado"));

        let hits = catalog.search("golpe");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits["Boca, garganta y cuello"], vec!["Golpe en la boca"]);

        let summary = catalog.summary();
        assert_eq!(summary.total_categories, 2);
        assert_eq!(summary.total_symptoms, 3);
        assert_eq!(summary.total_modifiers, 4);
    }
}
