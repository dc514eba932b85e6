// =============================================================================
// Error taxonomy
// =============================================================================
//
// Everything below the `decide` boundary is absorbed into scores and reasons.
// The types here are what surfaces above it: malformed inbound payloads and
// self-contradictory rule configuration.
// =============================================================================

use thiserror::Error;

use crate::types::SourceName;

/// The payload did not match any known producer fingerprint.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unrecognized payload: {best_guess}")]
pub struct ClassificationFailure {
    /// Human-readable best guess for the caller's logs.
    pub best_guess: String,
}

/// Mandatory fields could not be resolved even after fallback inference.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot normalize {source_name} payload: missing {}", .missing.join(", "))]
pub struct NormalizationFailure {
    pub source_name: SourceName,
    pub missing: Vec<&'static str>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IngestError {
    #[error(transparent)]
    Classification(#[from] ClassificationFailure),

    #[error(transparent)]
    Normalization(#[from] NormalizationFailure),
}

/// Invalid rule configuration. Fatal at load time.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("wait threshold {wait} must be below execute threshold {execute}")]
    ThresholdOrder { wait: f64, execute: f64 },

    #[error("threshold {name} = {value} is outside [0, 100]")]
    ThresholdRange { name: &'static str, value: f64 },

    #[error("required source set is empty")]
    NoRequiredSources,

    #[error("primary evidence source set is empty")]
    NoPrimarySources,

    #[error("source {0} is listed as both required and optional")]
    SourceOverlap(SourceName),

    #[error("primary source {0} is neither required nor optional")]
    UnknownPrimary(SourceName),

    #[error("max age must be positive")]
    ZeroMaxAge,

    #[error("max age {value}s exceeds the {max}s ceiling")]
    MaxAgeTooLarge { value: u64, max: u64 },

    #[error("weight {name} = {value} is negative")]
    NegativeWeight { name: &'static str, value: f64 },

    #[error("confidence weights sum to {0:.4}, expected 1.0")]
    WeightSum(f64),

    #[error("size multiplier range [{min}, {max}] is invalid")]
    SizeRange { min: f64, max: f64 },

    #[error("market gate limit {name} = {value} must be positive")]
    MarketLimit { name: &'static str, value: f64 },

    #[error("fetch budget must be positive")]
    ZeroFetchBudget,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecideError {
    #[error("no context available for symbol {0}")]
    UnknownSymbol(String),

    #[error("context is structurally invalid: {0}")]
    InvalidContext(String),
}

/// Either half of ingest-then-decide.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Decide(#[from] DecideError),
}
