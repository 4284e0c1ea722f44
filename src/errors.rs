// src/errors.rs

use std::time::Duration;
use thiserror::Error;

/// Error kinds surfaced by the recommendation engine.
///
/// Empty match or filter results are never errors; they travel as normal
/// result values. Only malformed configuration or input raises.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A required column or role is missing from a source table. Fatal:
    /// reprocessing cannot fix a schema mismatch.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A source table or model resource could not be loaded.
    #[error("source '{source_name}' unavailable: {reason}")]
    SourceUnavailable {
        source_name: String,
        reason: String,
        /// Transient causes (network, locked file) may be retried with
        /// backoff; anything else is fatal.
        retryable: bool,
    },

    /// A caller-supplied query is malformed (e.g. missing department).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A cache rebuild exceeded the deploy-configured timeout. The request
    /// fails instead of hanging; the caller may retry.
    #[error("cache rebuild timed out after {0:?}")]
    RebuildTimeout(Duration),
}

impl EngineError {
    pub fn source_unavailable(name: &str, reason: impl ToString, retryable: bool) -> Self {
        EngineError::SourceUnavailable {
            source_name: name.to_string(),
            reason: reason.to_string(),
            retryable,
        }
    }

    /// Whether retrying the failed operation can possibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Configuration(_) | EngineError::InvalidInput(_) => false,
            EngineError::SourceUnavailable { retryable, .. } => *retryable,
            EngineError::RebuildTimeout(_) => true,
        }
    }

    /// Configuration-class errors are the only ones the facade re-raises;
    /// everything else degrades to the safest available fallback.
    pub fn is_configuration(&self) -> bool {
        matches!(self, EngineError::Configuration(_) | EngineError::InvalidInput(_))
    }
}
