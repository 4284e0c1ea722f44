// src/sources.rs
// Row-oriented source tables: loading, column canonicalization, field
// extraction and content signatures.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::errors::EngineError;
use crate::normalize::normalize_key;

/// One source-table row: canonicalized column name -> raw value.
pub type Row = serde_json::Map<String, Value>;

/// Load a source table from a JSON file containing an array of row objects.
///
/// Column names are canonicalized on the way in, so downstream code only
/// ever sees keys like `valor_latitud` regardless of the spelling the
/// source file used. Extra columns are carried along and ignored.
pub fn load_rows(path: &Path) -> Result<Vec<Row>, EngineError> {
    let name = path.display().to_string();
    let raw = fs::read_to_string(path).map_err(|e| {
        // A vanished or locked file may come back; anything else will not.
        let retryable = matches!(e.kind(), ErrorKind::NotFound | ErrorKind::PermissionDenied);
        EngineError::source_unavailable(&name, e, retryable)
    })?;

    let value: Value = serde_json::from_str(&raw)
        .map_err(|e| EngineError::source_unavailable(&name, format!("invalid JSON: {}", e), false))?;

    let rows = match value {
        Value::Array(items) => items,
        _ => {
            return Err(EngineError::source_unavailable(
                &name,
                "expected a JSON array of row objects",
                false,
            ))
        }
    };

    rows.into_iter()
        .map(|item| match item {
            Value::Object(map) => Ok(canonicalize_columns(map)),
            other => Err(EngineError::source_unavailable(
                &name,
                format!("expected row object, found {}", type_name(&other)),
                false,
            )),
        })
        .collect()
}

/// Rewrite every column name through the shared key normalizer, so that
/// "Valor Latitud", "valor.latitud" and "valor_latitud" all address the
/// same field. The first spelling of a colliding column wins.
pub fn canonicalize_columns(row: serde_json::Map<String, Value>) -> Row {
    let mut out = Row::new();
    for (key, value) in row {
        let canonical = normalize_key(&key);
        out.entry(canonical).or_insert(value);
    }
    out
}

/// Fail fast with a configuration error if any required column is absent
/// from the table. An empty table has no schema to validate and passes.
pub fn require_columns(rows: &[Row], table: &str, required: &[&str]) -> Result<(), EngineError> {
    if rows.is_empty() {
        return Ok(());
    }
    let present: BTreeSet<&str> = rows.iter().flat_map(|r| r.keys().map(String::as_str)).collect();
    for col in required {
        if !present.contains(col) {
            return Err(EngineError::Configuration(format!(
                "source table '{}' is missing required column '{}'",
                table, col
            )));
        }
    }
    Ok(())
}

/// Extract a textual field. Numbers are rendered as text because tabular
/// sources are inconsistent about quoting; null and missing are `None`.
pub fn str_field(row: &Row, column: &str) -> Option<String> {
    match row.get(column) {
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// Extract a numeric field, accepting both JSON numbers and numeric text.
pub fn f64_field(row: &Row, column: &str) -> Option<f64> {
    match row.get(column) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().replace(',', ".").parse().ok(),
        _ => None,
    }
}

/// Extract an integer field, tolerating the float rendering spreadsheets
/// give whole numbers ("9.0").
pub fn i64_field(row: &Row, column: &str) -> Option<i64> {
    match row.get(column) {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => {
            let t = s.trim();
            t.parse::<i64>().ok().or_else(|| t.parse::<f64>().ok().map(|f| f as i64))
        }
        _ => None,
    }
}

/// Content signature over a set of source tables, used to detect
/// source-data change between cache rebuilds. Keys are sorted so the
/// signature is independent of column order in the file.
pub fn source_signature(tables: &[&[Row]]) -> String {
    let mut hasher = Sha256::new();
    for rows in tables {
        for row in rows.iter() {
            let ordered: BTreeMap<&String, &Value> = row.iter().collect();
            // Serialization of a BTreeMap is canonical; failure is impossible
            // for values that came out of serde_json.
            if let Ok(bytes) = serde_json::to_vec(&ordered) {
                hasher.update(&bytes);
            }
            hasher.update([0x1e]);
        }
        hasher.update([0x1d]);
    }
    hex::encode(hasher.finalize())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
