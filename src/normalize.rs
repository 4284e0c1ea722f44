// src/normalize.rs
// Canonical text keys shared by every comparison in the engine.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

static NON_KEY_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Canonicalize a free-text label into the key space used for matching.
///
/// Lowercases, strips diacritics (NFD decomposition, combining marks
/// removed, then an NFKD pass dropping anything still outside ASCII),
/// collapses every run of non-alphanumeric characters into a single
/// separator and joins the remaining tokens with underscores.
///
/// Idempotent: `normalize_key(normalize_key(x)) == normalize_key(x)`.
///
/// ```
/// use ruta_salud_lib::normalize::normalize_key;
///
/// assert_eq!(normalize_key("Héllo Wórld!"), "hello_world");
/// assert_eq!(normalize_key("Médico Cirugía"), "medico_cirugia");
/// ```
pub fn normalize_key(text: &str) -> String {
    let lowered = text.to_lowercase();

    // NFD exposes combining marks so accents can be dropped; the NFKD pass
    // afterwards folds compatibility forms and discards what is still
    // outside ASCII (e.g. 'ø', full-width digits that decomposed oddly).
    let decomposed: String = lowered.nfd().filter(|c| !is_combining_mark(*c)).collect();
    let ascii: String = decomposed.nfkd().filter(|c| c.is_ascii()).collect();

    let spaced = NON_KEY_RUNS.replace_all(&ascii, " ");
    spaced.split_whitespace().collect::<Vec<_>>().join("_")
}

/// Title-case every alphabetic run, leaving separators untouched.
///
/// Matches the display convention the provider directory uses for
/// department and municipality names ("valle del cauca" -> "Valle Del Cauca").
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut word_start = true;
    for c in text.chars() {
        if c.is_alphabetic() {
            if word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            word_start = false;
        } else {
            out.push(c);
            word_start = true;
        }
    }
    out
}

/// Prepare a label for the sentence-embedding model.
///
/// Service identifiers join tokens with underscores; embedding models
/// expect natural-language spacing, so separators become spaces.
pub fn normalize_for_embedding(text: &str) -> String {
    text.to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_key_examples() {
        assert_eq!(normalize_key("Héllo Wórld!"), "hello_world");
        assert_eq!(normalize_key("Médico Cirugía"), "medico_cirugia");
        assert_eq!(normalize_key("Urgencias - Médico General"), "urgencias_medico_general");
        assert_eq!(normalize_key("  CONSULTA   No  Programada "), "consulta_no_programada");
    }

    #[test]
    fn test_normalize_key_is_idempotent() {
        for s in [
            "Héllo Wórld!",
            "Boca, garganta y cuello",
            "riesgo biológico",
            "NEUROLÓGICO o cabeza",
            "consulta_prioritaria_de_oftalmologia_l",
        ] {
            let once = normalize_key(s);
            assert_eq!(normalize_key(&once), once);
        }
    }

    #[test]
    fn test_normalize_key_output_alphabet() {
        for s in ["¿Dónde está?", "salud—mental", "T1/T2.T3", "日本語 label", "ça va® #5"] {
            let key = normalize_key(s);
            assert!(
                key.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'),
                "unexpected character in key {:?}",
                key
            );
            assert!(!key.starts_with('_') && !key.ends_with('_'));
        }
    }

    #[test]
    fn test_normalize_key_drops_non_latin_text() {
        assert_eq!(normalize_key("日本語"), "");
        assert_eq!(normalize_key("clinica 日本語 norte"), "clinica_norte");
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("valle del cauca"), "Valle Del Cauca");
        assert_eq!(title_case("MEDELLIN"), "Medellin");
        assert_eq!(title_case("bogota d c"), "Bogota D C");
    }

    #[test]
    fn test_normalize_for_embedding() {
        assert_eq!(normalize_for_embedding("urgencias_medico_general"), "urgencias medico general");
        assert_eq!(normalize_for_embedding("consulta-ortopedista"), "consulta ortopedista");
        assert_eq!(normalize_for_embedding("  Salud   Mental "), "salud mental");
    }
}
