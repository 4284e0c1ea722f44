// src/providers.rs
// Provider directory cleaning and location-override merging.

use std::collections::{HashMap, HashSet};

use log::{debug, info, warn};

use crate::config::{ALLOWED_SERVICES, PROVIDER_DENYLIST, SERVICE_RENAMES};
use crate::errors::EngineError;
use crate::models::{Provider, ServiceId};
use crate::normalize::{normalize_key, title_case};
use crate::sources::{self, Row};

/// The routing-priority value meaning "excluded from routing".
pub const EXCLUDED_ROUTING_PRIORITY: i64 = 9;

/// Columns every provider source table must expose (after column
/// canonicalization). Extra columns are ignored.
pub const REQUIRED_PROVIDER_COLUMNS: [&str; 12] = [
    "prestador",
    "sucursal_prestador",
    "departamento",
    "municipio",
    "direccion_domicilio",
    "valor_latitud",
    "valor_longitud",
    "concepto_factura",
    "direccionamiento",
    "horario_habil",
    "telefono",
    "telefono_celular",
];

/// Cleaning policy: which providers to drop and which service labels to keep.
#[derive(Debug, Clone)]
pub struct CleaningConfig {
    pub denylist: Vec<String>,
    /// Allow-list of normalized service labels; anything else is dropped.
    pub allowed_services: Vec<String>,
    /// Renames applied after the allow-list check, folding legacy labels
    /// into canonical service identifiers.
    pub renames: Vec<(String, String)>,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        CleaningConfig {
            denylist: PROVIDER_DENYLIST.iter().map(|s| s.to_string()).collect(),
            allowed_services: ALLOWED_SERVICES.iter().map(|s| s.to_string()).collect(),
            renames: SERVICE_RENAMES
                .iter()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .collect(),
        }
    }
}

/// Clean a raw provider table into directory rows.
///
/// Each step strictly reduces or transforms the set, never reorders:
/// denylisted or nameless providers, the routing-priority sentinel,
/// missing or zero coordinates and unknown service labels are dropped;
/// surviving labels are folded through the rename table; department and
/// municipality are title-cased; rows are projected onto [`Provider`].
///
/// A missing required column is a configuration error, not an empty result.
pub fn clean_providers(rows: &[Row], cfg: &CleaningConfig) -> Result<Vec<Provider>, EngineError> {
    sources::require_columns(rows, "providers", &REQUIRED_PROVIDER_COLUMNS)?;

    let denylist: HashSet<&str> = cfg.denylist.iter().map(String::as_str).collect();
    let allowed: HashSet<&str> = cfg.allowed_services.iter().map(String::as_str).collect();
    let renames: HashMap<&str, &str> = cfg
        .renames
        .iter()
        .map(|(from, to)| (from.as_str(), to.as_str()))
        .collect();

    let initial = rows.len();
    let mut after_denylist = 0usize;
    let mut after_priority = 0usize;
    let mut after_coords = 0usize;
    let mut cleaned = Vec::new();

    for row in rows {
        // 1. Provider must be named and not denylisted.
        let name = match sources::str_field(row, "prestador") {
            Some(n) if !denylist.contains(n.as_str()) => n,
            _ => continue,
        };
        after_denylist += 1;

        // 2. Routing priority 9 means the row is excluded from routing.
        // Rows without a usable priority cannot be ranked either.
        let priority = match sources::i64_field(row, "direccionamiento") {
            Some(p) if p != EXCLUDED_ROUTING_PRIORITY => p,
            Some(_) => continue,
            None => {
                warn!("provider '{}' has no routing priority, dropping", name);
                continue;
            }
        };
        after_priority += 1;

        // 3. Zero is the known "unset" sentinel for coordinates.
        let latitude = sources::f64_field(row, "valor_latitud");
        let longitude = sources::f64_field(row, "valor_longitud");
        let (latitude, longitude) = match (latitude, longitude) {
            (Some(lat), Some(lng)) if lat != 0.0 && lng != 0.0 => (lat, lng),
            _ => continue,
        };
        after_coords += 1;

        // 4. Normalize the free-text service label and keep only the
        // controlled vocabulary.
        let raw_label = match sources::str_field(row, "concepto_factura") {
            Some(l) => l,
            None => continue,
        };
        let service_key = normalize_key(&raw_label);
        if !allowed.contains(service_key.as_str()) {
            continue;
        }

        // 5. Fold near-duplicate labels into canonical identifiers.
        let service_id = renames
            .get(service_key.as_str())
            .map(|s| s.to_string())
            .unwrap_or(service_key);

        // 6.-7. Format region names and project onto the directory row.
        cleaned.push(Provider {
            provider_name: name,
            branch: sources::str_field(row, "sucursal_prestador").unwrap_or_default(),
            department: title_case(&sources::str_field(row, "departamento").unwrap_or_default()),
            municipality: title_case(&sources::str_field(row, "municipio").unwrap_or_default()),
            address: sources::str_field(row, "direccion_domicilio").unwrap_or_default(),
            latitude,
            longitude,
            service_id: ServiceId::new(service_id),
            routing_priority: priority,
            schedule: sources::str_field(row, "horario_habil"),
            phone_landline: sources::str_field(row, "telefono"),
            phone_mobile: sources::str_field(row, "telefono_celular"),
        });
    }

    debug!(
        "provider cleaning: {} raw, {} after denylist, {} after priority, {} after coordinates, {} final",
        initial, after_denylist, after_priority, after_coords, cleaned.len()
    );
    info!("provider cleaning complete: {} directory rows", cleaned.len());
    Ok(cleaned)
}

/// Overlay location fields from an override table onto the primary
/// directory.
///
/// For every distinct (branch, department, municipality) key in
/// `overrides`, the first occurrence's address and coordinates overwrite
/// those fields on every matching primary row. Rows without a matching key
/// pass through byte-identical. Inputs are not mutated.
pub fn merge_locations(primary: &[Provider], overrides: &[Provider]) -> Vec<Provider> {
    let mut first_by_key: HashMap<(String, String, String), (String, f64, f64)> = HashMap::new();
    for o in overrides {
        first_by_key
            .entry(o.location_key())
            .or_insert_with(|| (o.address.clone(), o.latitude, o.longitude));
    }

    let mut updates = 0usize;
    let merged: Vec<Provider> = primary
        .iter()
        .map(|p| {
            let mut row = p.clone();
            if let Some((address, lat, lng)) = first_by_key.get(&p.location_key()) {
                row.address = address.clone();
                row.latitude = *lat;
                row.longitude = *lng;
                updates += 1;
            }
            row
        })
        .collect();

    info!(
        "location merge complete: {} of {} rows updated from {} override keys",
        updates,
        primary.len(),
        first_by_key.len()
    );
    merged
}
