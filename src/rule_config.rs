// =============================================================================
// Rule Configuration — Versioned decision rules with atomic save
// =============================================================================
//
// Every tunable threshold, weight and limit of the confluence engine lives
// here. All fields carry `#[serde(default)]` so that adding new fields never
// breaks loading an older rules file.
//
// Validation runs at load/construction time. A self-contradictory rule set
// (e.g. WAIT threshold above EXECUTE) is rejected before any decision is made.
// =============================================================================

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::ConfigError;
use crate::types::{QualityTier, SourceName};

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_rules_version() -> String {
    "confluence-v1".to_string()
}

fn default_required_sources() -> BTreeSet<SourceName> {
    [SourceName::ExpertSignal].into_iter().collect()
}

fn default_optional_sources() -> BTreeSet<SourceName> {
    [
        SourceName::Regime,
        SourceName::TrendAlignment,
        SourceName::StructureCheck,
    ]
    .into_iter()
    .collect()
}

fn default_primary_sources() -> BTreeSet<SourceName> {
    [SourceName::ExpertSignal].into_iter().collect()
}

fn default_max_age_secs() -> u64 {
    900
}

fn default_execute_threshold() -> f64 {
    70.0
}

fn default_wait_threshold() -> f64 {
    50.0
}

fn default_min_phase_confidence() -> f64 {
    60.0
}

fn default_partial_score_factor() -> f64 {
    0.5
}

fn default_true() -> bool {
    true
}

fn default_invalid_structure_score() -> f64 {
    25.0
}

fn default_max_spread_bps() -> f64 {
    15.0
}

fn default_max_atr_ratio() -> f64 {
    2.0
}

fn default_min_depth_score() -> f64 {
    30.0
}

fn default_min_completeness() -> f64 {
    0.5
}

fn default_min_multiplier() -> f64 {
    0.5
}

fn default_max_multiplier() -> f64 {
    3.0
}

fn default_phase_boost() -> f64 {
    0.25
}

fn default_phase_boost_min_confidence() -> f64 {
    85.0
}

fn default_budget_ms() -> u64 {
    2_500
}

fn default_cache_ttl_ms() -> u64 {
    5_000
}

// =============================================================================
// Completeness
// =============================================================================

/// Upper bound on `max_age_secs`. A context older than a week is never
/// worth deciding on.
pub const MAX_AGE_CEILING_SECS: u64 = 7 * 24 * 60 * 60;

/// Which sources must be fresh before a decision can be made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletenessRule {
    #[serde(default = "default_required_sources")]
    pub required_sources: BTreeSet<SourceName>,

    #[serde(default = "default_optional_sources")]
    pub optional_sources: BTreeSet<SourceName>,

    /// At least one of these must be fresh ("primary evidence").
    #[serde(default = "default_primary_sources")]
    pub primary_sources: BTreeSet<SourceName>,

    /// Fragments older than this are treated as never received.
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,
}

impl Default for CompletenessRule {
    fn default() -> Self {
        Self {
            required_sources: default_required_sources(),
            optional_sources: default_optional_sources(),
            primary_sources: default_primary_sources(),
            max_age_secs: default_max_age_secs(),
        }
    }
}

impl CompletenessRule {
    pub fn max_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.max_age_secs.min(MAX_AGE_CEILING_SECS) as i64)
    }

    /// Required and optional sources together.
    pub fn known_sources(&self) -> BTreeSet<SourceName> {
        self.required_sources
            .union(&self.optional_sources)
            .copied()
            .collect()
    }

    /// Defaults first, then each override only if present.
    pub fn with_overrides(mut self, overrides: &CompletenessOverrides) -> Self {
        if let Some(required) = &overrides.required_sources {
            // Sources leaving the required set stay known as optional.
            let demoted: Vec<SourceName> = self
                .required_sources
                .difference(required)
                .copied()
                .collect();
            self.optional_sources.extend(demoted);
            self.optional_sources.retain(|s| !required.contains(s));
            self.required_sources = required.clone();
        }
        if let Some(optional) = &overrides.optional_sources {
            self.optional_sources = optional.clone();
        }
        if let Some(primary) = &overrides.primary_sources {
            self.primary_sources = primary.clone();
        }
        if let Some(max_age_secs) = overrides.max_age_secs {
            self.max_age_secs = max_age_secs;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.required_sources.is_empty() {
            return Err(ConfigError::NoRequiredSources);
        }
        if self.primary_sources.is_empty() {
            return Err(ConfigError::NoPrimarySources);
        }
        if let Some(overlap) = self.required_sources.intersection(&self.optional_sources).next() {
            return Err(ConfigError::SourceOverlap(*overlap));
        }
        let known = self.known_sources();
        if let Some(stray) = self.primary_sources.iter().find(|s| !known.contains(s)) {
            return Err(ConfigError::UnknownPrimary(*stray));
        }
        if self.max_age_secs == 0 {
            return Err(ConfigError::ZeroMaxAge);
        }
        if self.max_age_secs > MAX_AGE_CEILING_SECS {
            return Err(ConfigError::MaxAgeTooLarge {
                value: self.max_age_secs,
                max: MAX_AGE_CEILING_SECS,
            });
        }
        Ok(())
    }
}

/// Caller-supplied completeness settings. `None` keeps the default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletenessOverrides {
    #[serde(default)]
    pub required_sources: Option<BTreeSet<SourceName>>,
    #[serde(default)]
    pub optional_sources: Option<BTreeSet<SourceName>>,
    #[serde(default)]
    pub primary_sources: Option<BTreeSet<SourceName>>,
    #[serde(default)]
    pub max_age_secs: Option<u64>,
}

impl CompletenessOverrides {
    /// Read `CONFLUENCE_REQUIRED_SOURCES`, `CONFLUENCE_OPTIONAL_SOURCES`,
    /// `CONFLUENCE_PRIMARY_SOURCES` and `CONFLUENCE_MAX_AGE_SECS`.
    pub fn from_env() -> Result<Self> {
        fn sources(var: &str) -> Result<Option<BTreeSet<SourceName>>> {
            match std::env::var(var) {
                Ok(raw) => {
                    let set = raw
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(|s| s.parse::<SourceName>().map_err(anyhow::Error::msg))
                        .collect::<Result<BTreeSet<_>>>()
                        .with_context(|| format!("invalid {var}"))?;
                    Ok(Some(set))
                }
                Err(_) => Ok(None),
            }
        }

        let max_age_secs = match std::env::var("CONFLUENCE_MAX_AGE_SECS") {
            Ok(raw) => Some(
                raw.trim()
                    .parse::<u64>()
                    .context("invalid CONFLUENCE_MAX_AGE_SECS")?,
            ),
            Err(_) => None,
        };

        Ok(Self {
            required_sources: sources("CONFLUENCE_REQUIRED_SOURCES")?,
            optional_sources: sources("CONFLUENCE_OPTIONAL_SOURCES")?,
            primary_sources: sources("CONFLUENCE_PRIMARY_SOURCES")?,
            max_age_secs,
        })
    }
}

// =============================================================================
// Thresholds & weights
// =============================================================================

/// Confidence thresholds for EXECUTE and WAIT.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionThresholds {
    #[serde(default = "default_execute_threshold")]
    pub execute: f64,

    /// Floor of the WAIT band; below this the decision is SKIP.
    #[serde(default = "default_wait_threshold")]
    pub wait: f64,
}

impl Default for ActionThresholds {
    fn default() -> Self {
        Self {
            execute: default_execute_threshold(),
            wait: default_wait_threshold(),
        }
    }
}

/// Weights of the five confidence contributions. Must sum to 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceWeights {
    pub regime: f64,
    pub expert: f64,
    pub alignment: f64,
    pub market: f64,
    pub structure: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            regime: 0.30,
            expert: 0.25,
            alignment: 0.20,
            market: 0.15,
            structure: 0.10,
        }
    }
}

impl ConfidenceWeights {
    fn named(&self) -> [(&'static str, f64); 5] {
        [
            ("regime", self.regime),
            ("expert", self.expert),
            ("alignment", self.alignment),
            ("market", self.market),
            ("structure", self.structure),
        ]
    }
}

// =============================================================================
// Gate parameters
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeGateParams {
    #[serde(default = "default_min_phase_confidence")]
    pub min_phase_confidence: f64,

    /// Whether a NEUTRAL regime bias is compatible with either direction.
    #[serde(default = "default_true")]
    pub allow_neutral_bias: bool,

    /// Fraction of phase confidence scored for a compatible but
    /// sub-threshold regime.
    #[serde(default = "default_partial_score_factor")]
    pub partial_score_factor: f64,
}

impl Default for RegimeGateParams {
    fn default() -> Self {
        Self {
            min_phase_confidence: default_min_phase_confidence(),
            allow_neutral_bias: true,
            partial_score_factor: default_partial_score_factor(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuralGateParams {
    /// Score when no structural data was received at all (critical).
    #[serde(default)]
    pub missing_score: f64,

    /// Score when structure was received and explicitly invalid.
    #[serde(default = "default_invalid_structure_score")]
    pub invalid_score: f64,
}

impl Default for StructuralGateParams {
    fn default() -> Self {
        Self {
            missing_score: 0.0,
            invalid_score: default_invalid_structure_score(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketGateParams {
    #[serde(default = "default_max_spread_bps")]
    pub max_spread_bps: f64,

    /// Current ATR over its average; above this is a volatility spike.
    #[serde(default = "default_max_atr_ratio")]
    pub max_atr_ratio: f64,

    /// Minimum order-book depth score (0–100).
    #[serde(default = "default_min_depth_score")]
    pub min_depth_score: f64,

    /// Minimum fraction of metric providers that must have answered.
    #[serde(default = "default_min_completeness")]
    pub min_completeness: f64,
}

impl Default for MarketGateParams {
    fn default() -> Self {
        Self {
            max_spread_bps: default_max_spread_bps(),
            max_atr_ratio: default_max_atr_ratio(),
            min_depth_score: default_min_depth_score(),
            min_completeness: default_min_completeness(),
        }
    }
}

// =============================================================================
// Sizing
// =============================================================================

/// Quality-tier multipliers. The same value feeds confidence and sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityMultipliers {
    pub extreme: f64,
    pub high: f64,
    pub medium: f64,
    pub low: f64,
}

impl Default for QualityMultipliers {
    fn default() -> Self {
        Self {
            extreme: 1.15,
            high: 1.05,
            medium: 1.0,
            low: 0.85,
        }
    }
}

impl QualityMultipliers {
    pub fn for_tier(&self, tier: QualityTier) -> f64 {
        match tier {
            QualityTier::Extreme => self.extreme,
            QualityTier::High => self.high,
            QualityTier::Medium => self.medium,
            QualityTier::Low => self.low,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizingParams {
    #[serde(default = "default_min_multiplier")]
    pub min_multiplier: f64,

    #[serde(default = "default_max_multiplier")]
    pub max_multiplier: f64,

    /// Added after the multiplicative factors on strong regime alignment.
    #[serde(default = "default_phase_boost")]
    pub phase_boost: f64,

    #[serde(default = "default_phase_boost_min_confidence")]
    pub phase_boost_min_confidence: f64,

    #[serde(default)]
    pub quality: QualityMultipliers,
}

impl Default for SizingParams {
    fn default() -> Self {
        Self {
            min_multiplier: default_min_multiplier(),
            max_multiplier: default_max_multiplier(),
            phase_boost: default_phase_boost(),
            phase_boost_min_confidence: default_phase_boost_min_confidence(),
            quality: QualityMultipliers::default(),
        }
    }
}

// =============================================================================
// Metrics fetch
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchParams {
    /// Shared timeout budget for one metrics fetch.
    #[serde(default = "default_budget_ms")]
    pub budget_ms: u64,

    /// Per-provider response cache TTL. Zero disables caching.
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,
}

impl Default for FetchParams {
    fn default() -> Self {
        Self {
            budget_ms: default_budget_ms(),
            cache_ttl_ms: default_cache_ttl_ms(),
        }
    }
}

impl FetchParams {
    pub fn budget(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.budget_ms)
    }

    pub fn cache_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.cache_ttl_ms)
    }
}

// =============================================================================
// RuleConfig
// =============================================================================

/// Top-level versioned rule set for the confluence engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Stamped into every decision packet.
    #[serde(default = "default_rules_version")]
    pub rules_version: String,

    #[serde(default)]
    pub completeness: CompletenessRule,

    #[serde(default)]
    pub thresholds: ActionThresholds,

    #[serde(default)]
    pub weights: ConfidenceWeights,

    #[serde(default)]
    pub regime_gate: RegimeGateParams,

    #[serde(default)]
    pub structural_gate: StructuralGateParams,

    #[serde(default)]
    pub market_gate: MarketGateParams,

    #[serde(default)]
    pub sizing: SizingParams,

    #[serde(default)]
    pub fetch: FetchParams,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            rules_version: default_rules_version(),
            completeness: CompletenessRule::default(),
            thresholds: ActionThresholds::default(),
            weights: ConfidenceWeights::default(),
            regime_gate: RegimeGateParams::default(),
            structural_gate: StructuralGateParams::default(),
            market_gate: MarketGateParams::default(),
            sizing: SizingParams::default(),
            fetch: FetchParams::default(),
        }
    }
}

impl RuleConfig {
    /// Load configuration from a JSON file at `path` and validate it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read rule config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse rule config from {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("invalid rule config in {}", path.display()))?;

        info!(
            path = %path.display(),
            rules_version = %config.rules_version,
            required = ?config.completeness.required_sources,
            "rule config loaded"
        );

        Ok(config)
    }

    /// Persist the configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise rule config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "rule config saved (atomic)");
        Ok(())
    }

    /// Reject self-contradictory rules.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.completeness.validate()?;

        let t = &self.thresholds;
        for (name, value) in [("execute", t.execute), ("wait", t.wait)] {
            if !(0.0..=100.0).contains(&value) {
                return Err(ConfigError::ThresholdRange { name, value });
            }
        }
        if t.wait >= t.execute {
            return Err(ConfigError::ThresholdOrder {
                wait: t.wait,
                execute: t.execute,
            });
        }

        let mut sum = 0.0;
        for (name, value) in self.weights.named() {
            if value < 0.0 {
                return Err(ConfigError::NegativeWeight { name, value });
            }
            sum += value;
        }
        if (sum - 1.0).abs() > 1e-3 {
            return Err(ConfigError::WeightSum(sum));
        }

        let m = &self.market_gate;
        for (name, value) in [
            ("max_spread_bps", m.max_spread_bps),
            ("max_atr_ratio", m.max_atr_ratio),
            ("min_depth_score", m.min_depth_score),
        ] {
            if value <= 0.0 {
                return Err(ConfigError::MarketLimit { name, value });
            }
        }
        if !(0.0..=1.0).contains(&m.min_completeness) {
            return Err(ConfigError::MarketLimit {
                name: "min_completeness",
                value: m.min_completeness,
            });
        }

        let s = &self.sizing;
        if s.min_multiplier <= 0.0 || s.min_multiplier > s.max_multiplier {
            return Err(ConfigError::SizeRange {
                min: s.min_multiplier,
                max: s.max_multiplier,
            });
        }

        if self.fetch.budget_ms == 0 {
            return Err(ConfigError::ZeroFetchBudget);
        }

        Ok(())
    }
}
