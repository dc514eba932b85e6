// =============================================================================
// Market Metrics Module
// =============================================================================
//
// Live market conditions fetched per decision attempt, in three sections:
//
//   1. Derivatives  - options positioning (put/call ratio, IV percentile)
//   2. Liquidity    - spread, book depth, size at best, trade velocity
//   3. Statistics   - ATR, realized volatility, trend, RSI, relative volume
//
// Every section always holds numbers. When no provider answers for a
// section its documented fallback is used and the section is marked as such,
// so downstream scoring degrades instead of failing.

pub mod fetcher;
pub mod provider;

pub use fetcher::{MarketMetricsFetcher, ProviderBinding};
pub use provider::{HttpMetricsProvider, MetricsProvider};

use serde::{Deserialize, Serialize};

use crate::types::Bias;

/// The three metric sections a provider can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricSection {
    Derivatives,
    Liquidity,
    Statistics,
}

impl MetricSection {
    pub const ALL: [MetricSection; 3] = [
        MetricSection::Derivatives,
        MetricSection::Liquidity,
        MetricSection::Statistics,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Derivatives => "derivatives",
            Self::Liquidity => "liquidity",
            Self::Statistics => "statistics",
        }
    }
}

impl std::fmt::Display for MetricSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a section came from a provider or from the fallback table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Origin {
    Live,
    Fallback,
}

// ── Sections ────────────────────────────────────────────────────────────────

/// Options-market positioning.
///
/// Fallback: put/call 1.0, IV percentile 50, bias NEUTRAL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DerivativesMetrics {
    #[serde(alias = "putCallRatio")]
    pub put_call_ratio: f64,

    /// Implied-volatility percentile, 0–100.
    #[serde(alias = "ivPercentile")]
    pub iv_percentile: f64,

    #[serde(alias = "directionalBias", alias = "bias")]
    pub directional_bias: Bias,
}

impl Default for DerivativesMetrics {
    fn default() -> Self {
        Self {
            put_call_ratio: 1.0,
            iv_percentile: 50.0,
            directional_bias: Bias::Neutral,
        }
    }
}

impl DerivativesMetrics {
    /// Replace non-finite values with fallbacks and clamp ranges.
    pub fn sanitized(self) -> Self {
        let fb = Self::default();
        Self {
            put_call_ratio: finite_or(self.put_call_ratio, fb.put_call_ratio).max(0.0),
            iv_percentile: finite_or(self.iv_percentile, fb.iv_percentile).clamp(0.0, 100.0),
            directional_bias: self.directional_bias,
        }
    }
}

/// Order-book and tape liquidity.
///
/// Fallback: spread 10 bps, depth score 50, sizes and velocity 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiquidityMetrics {
    #[serde(alias = "spreadBps")]
    pub spread_bps: f64,

    /// Book depth score, 0–100.
    #[serde(alias = "depthScore")]
    pub depth_score: f64,

    #[serde(alias = "bidSize")]
    pub bid_size: f64,

    #[serde(alias = "askSize")]
    pub ask_size: f64,

    /// Trades per second.
    #[serde(alias = "tradeVelocity")]
    pub trade_velocity: f64,
}

impl Default for LiquidityMetrics {
    fn default() -> Self {
        Self {
            spread_bps: 10.0,
            depth_score: 50.0,
            bid_size: 0.0,
            ask_size: 0.0,
            trade_velocity: 0.0,
        }
    }
}

impl LiquidityMetrics {
    pub fn sanitized(self) -> Self {
        let fb = Self::default();
        Self {
            spread_bps: finite_or(self.spread_bps, fb.spread_bps).max(0.0),
            depth_score: finite_or(self.depth_score, fb.depth_score).clamp(0.0, 100.0),
            bid_size: finite_or(self.bid_size, fb.bid_size).max(0.0),
            ask_size: finite_or(self.ask_size, fb.ask_size).max(0.0),
            trade_velocity: finite_or(self.trade_velocity, fb.trade_velocity).max(0.0),
        }
    }
}

/// Volatility and trend statistics.
///
/// Fallback: ATR 0, ATR ratio 1.0 (normal), realized vol 0, slope 0, RSI 50,
/// volume ratio 1.0, trend strength 25.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolatilityStats {
    pub atr: f64,

    /// Current ATR over its trailing average; 1.0 is normal.
    #[serde(alias = "atrRatio")]
    pub atr_ratio: f64,

    #[serde(alias = "realizedVol", alias = "realized_volatility")]
    pub realized_vol: f64,

    #[serde(alias = "trendSlope")]
    pub trend_slope: f64,

    pub rsi: f64,

    /// Current volume over its trailing average.
    #[serde(alias = "volumeRatio", alias = "relative_volume")]
    pub volume_ratio: f64,

    /// ADX-style trend strength, 0–100.
    #[serde(alias = "trendStrength", alias = "adx")]
    pub trend_strength: f64,
}

impl Default for VolatilityStats {
    fn default() -> Self {
        Self {
            atr: 0.0,
            atr_ratio: 1.0,
            realized_vol: 0.0,
            trend_slope: 0.0,
            rsi: 50.0,
            volume_ratio: 1.0,
            trend_strength: 25.0,
        }
    }
}

impl VolatilityStats {
    pub fn sanitized(self) -> Self {
        let fb = Self::default();
        Self {
            atr: finite_or(self.atr, fb.atr).max(0.0),
            atr_ratio: finite_or(self.atr_ratio, fb.atr_ratio).max(0.0),
            realized_vol: finite_or(self.realized_vol, fb.realized_vol).max(0.0),
            trend_slope: finite_or(self.trend_slope, fb.trend_slope),
            rsi: finite_or(self.rsi, fb.rsi).clamp(0.0, 100.0),
            volume_ratio: finite_or(self.volume_ratio, fb.volume_ratio).max(0.0),
            trend_strength: finite_or(self.trend_strength, fb.trend_strength).clamp(0.0, 100.0),
        }
    }
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

// ── Aggregate ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionOrigins {
    pub derivatives: Origin,
    pub liquidity: Origin,
    pub statistics: Origin,
}

impl SectionOrigins {
    pub fn of(&self, section: MetricSection) -> Origin {
        match section {
            MetricSection::Derivatives => self.derivatives,
            MetricSection::Liquidity => self.liquidity,
            MetricSection::Statistics => self.statistics,
        }
    }
}

/// Market conditions for one decision attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketMetrics {
    pub symbol: String,
    pub derivatives: DerivativesMetrics,
    pub liquidity: LiquidityMetrics,
    pub statistics: VolatilityStats,
    pub origins: SectionOrigins,
    /// Fraction of provider calls that succeeded, 0.0–1.0.
    pub completeness: f64,
    /// `"<provider>/<section>: <message>"` per failed call.
    pub errors: Vec<String>,
}

impl MarketMetrics {
    /// Every section at its fallback, nothing answered.
    pub fn fallback(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            derivatives: DerivativesMetrics::default(),
            liquidity: LiquidityMetrics::default(),
            statistics: VolatilityStats::default(),
            origins: SectionOrigins {
                derivatives: Origin::Fallback,
                liquidity: Origin::Fallback,
                statistics: Origin::Fallback,
            },
            completeness: 0.0,
            errors: Vec::new(),
        }
    }
}
