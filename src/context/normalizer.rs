// =============================================================================
// Field Normalizer — map heterogeneous producer payloads to fragments
// =============================================================================
//
// Mandatory fields per source:
//   every source      - instrument symbol
//   REGIME            - bias (or a phase name it can be inferred from)
//   EXPERT_SIGNAL     - directional indicator
//   TREND_ALIGNMENT   - per-timeframe map or a bullish/bearish percentage
//   STRUCTURE_CHECK   - validSetup flag
//
// Everything else has a fallback:
//   phase confidence missing        => 50 (neutral)
//   AI score missing                => tier's representative score, else 5.0
//   quality tier missing            => inferred from AI score breakpoints
//   risk:reward missing             => derived from entry/stop/target if all present
//   alignment percentages missing   => computed from the timeframe map
//   execution grade missing         => from a structure score, else B/C by validity
//   timestamp missing               => receipt time
//
// Numeric scores are clamped into their valid ranges; 0–1 fractions are
// scaled to percent.
// =============================================================================

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use crate::context::payload;
use crate::context::snapshot::{
    AlignmentSection, ContextFragment, ExpertSection, FragmentSection, RegimeSection, RiskRatios,
    StructureSection,
};
use crate::errors::NormalizationFailure;
use crate::types::{Bias, Direction, ExecutionGrade, Instrument, QualityTier, SourceName};

/// Upper bound of the expert AI score scale.
pub const AI_SCORE_MAX: f64 = 10.5;

const DEFAULT_PHASE_CONFIDENCE: f64 = 50.0;
const DEFAULT_AI_SCORE: f64 = 5.0;
pub const UNKNOWN_EXCHANGE: &str = "UNKNOWN";

const SYMBOL_PATHS: &[&str] = &[
    "symbol",
    "ticker",
    "instrument.symbol",
    "signal.symbol",
    "signal.ticker",
    "market.symbol",
    "regime.symbol",
    "structure.symbol",
    "alignment.symbol",
];
const EXCHANGE_PATHS: &[&str] = &["exchange", "instrument.exchange", "signal.exchange", "market.exchange"];
const PRICE_PATHS: &[&str] = &[
    "price",
    "close",
    "lastPrice",
    "last_price",
    "instrument.price",
    "instrument.lastPrice",
    "signal.price",
];
const TIMESTAMP_PATHS: &[&str] = &["timestamp", "time", "ts", "signal.timestamp", "signal.time"];

/// How far a producer clock may run ahead of ours before its timestamp is
/// replaced by the receipt time.
pub const MAX_CLOCK_SKEW_SECS: i64 = 5;

pub struct FieldNormalizer;

impl FieldNormalizer {
    /// Map `payload` from `source` into a fragment, or list the mandatory
    /// fields that could not be resolved.
    pub fn normalize(
        payload: &Value,
        source: SourceName,
        received_at: DateTime<Utc>,
    ) -> Result<ContextFragment, NormalizationFailure> {
        let mut missing = Vec::new();

        let instrument = instrument(payload);
        if instrument.is_none() {
            missing.push("symbol");
        }

        let section = match source {
            SourceName::Regime => regime(payload, &mut missing).map(FragmentSection::Regime),
            SourceName::ExpertSignal => expert(payload, &mut missing).map(FragmentSection::Expert),
            SourceName::TrendAlignment => {
                alignment(payload, &mut missing).map(FragmentSection::Alignment)
            }
            SourceName::StructureCheck => {
                structure(payload, &mut missing).map(FragmentSection::Structure)
            }
        };

        match (instrument, section) {
            (Some(instrument), Some(section)) if missing.is_empty() => {
                let observed_at = observed_at(payload, received_at);
                debug!(symbol = %instrument.symbol, %source, "payload normalized");
                Ok(ContextFragment {
                    instrument,
                    observed_at,
                    section,
                })
            }
            _ => Err(NormalizationFailure {
                source_name: source,
                missing,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Instrument
// ---------------------------------------------------------------------------

fn instrument(payload: &Value) -> Option<Instrument> {
    let raw = payload::text(payload, SYMBOL_PATHS)?;
    let (prefix, symbol) = match raw.split_once(':') {
        Some((ex, sym)) => (Some(ex.trim()), sym.trim()),
        None => (None, raw),
    };
    if symbol.is_empty() {
        return None;
    }

    let exchange = payload::text(payload, EXCHANGE_PATHS)
        .or(prefix.filter(|p| !p.is_empty()))
        .unwrap_or(UNKNOWN_EXCHANGE)
        .to_ascii_uppercase();

    Some(Instrument {
        symbol: canonical_symbol(symbol),
        exchange,
        last_price: payload::number(payload, PRICE_PATHS).filter(|p| *p > 0.0),
    })
}

/// Upper-cased symbol with any `EXCHANGE:` prefix removed.
pub fn canonical_symbol(raw: &str) -> String {
    let raw = raw.trim();
    let symbol = raw.rsplit_once(':').map_or(raw, |(_, s)| s);
    symbol.trim().to_ascii_uppercase()
}

// ---------------------------------------------------------------------------
// Vocabulary
// ---------------------------------------------------------------------------

fn parse_bias(raw: &str) -> Option<Bias> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "BULLISH" | "BULL" | "LONG" | "UP" | "BUY" => Some(Bias::Bullish),
        "BEARISH" | "BEAR" | "SHORT" | "DOWN" | "SELL" => Some(Bias::Bearish),
        "NEUTRAL" | "RANGING" | "RANGE" | "SIDEWAYS" | "FLAT" | "MIXED" => Some(Bias::Neutral),
        _ => None,
    }
}

fn bias_from_value(value: &Value) -> Option<Bias> {
    match value {
        Value::String(s) => parse_bias(s),
        Value::Number(n) => n.as_f64().map(|x| {
            if x > 0.0 {
                Bias::Bullish
            } else if x < 0.0 {
                Bias::Bearish
            } else {
                Bias::Neutral
            }
        }),
        Value::Object(_) => payload::first(value, &["bias", "direction", "trend"])
            .and_then(bias_from_value),
        _ => None,
    }
}

/// Market phase names imply a lean when no explicit bias is sent.
fn bias_from_phase(phase: &str) -> Option<Bias> {
    let upper = phase.to_ascii_uppercase();
    if ["MARKUP", "ACCUMULATION", "BULL", "UPTREND"].iter().any(|k| upper.contains(k)) {
        Some(Bias::Bullish)
    } else if ["MARKDOWN", "DISTRIBUTION", "BEAR", "DOWNTREND"].iter().any(|k| upper.contains(k)) {
        Some(Bias::Bearish)
    } else if ["RANGE", "RANGING", "NEUTRAL", "CONSOLIDATION", "CHOP"].iter().any(|k| upper.contains(k)) {
        Some(Bias::Neutral)
    } else {
        None
    }
}

fn parse_direction(value: &Value) -> Option<Direction> {
    match value {
        Value::String(s) => match s.trim().to_ascii_uppercase().as_str() {
            "LONG" | "BUY" | "BULLISH" | "BULL" => Some(Direction::Long),
            "SHORT" | "SELL" | "BEARISH" | "BEAR" => Some(Direction::Short),
            _ => None,
        },
        Value::Number(n) => match n.as_f64() {
            Some(x) if x > 0.0 => Some(Direction::Long),
            Some(x) if x < 0.0 => Some(Direction::Short),
            _ => None,
        },
        _ => None,
    }
}

fn parse_quality(raw: &str) -> Option<QualityTier> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "EXTREME" | "ELITE" | "S" => Some(QualityTier::Extreme),
        "HIGH" | "STRONG" | "A" => Some(QualityTier::High),
        "MEDIUM" | "MODERATE" | "NORMAL" | "B" => Some(QualityTier::Medium),
        "LOW" | "WEAK" | "C" => Some(QualityTier::Low),
        _ => None,
    }
}

fn parse_grade(raw: &str) -> Option<ExecutionGrade> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "A+" | "APLUS" | "A_PLUS" => Some(ExecutionGrade::APlus),
        "A" => Some(ExecutionGrade::A),
        "B" => Some(ExecutionGrade::B),
        "C" | "D" | "F" => Some(ExecutionGrade::C),
        _ => None,
    }
}

/// Producer timestamp, never later than receipt plus the allowed skew. A
/// future stamp would otherwise make every later fragment look stale.
fn observed_at(payload: &Value, received_at: DateTime<Utc>) -> DateTime<Utc> {
    match payload::timestamp(payload, TIMESTAMP_PATHS) {
        Some(ts) if ts > received_at + chrono::Duration::seconds(MAX_CLOCK_SKEW_SECS) => {
            debug!(
                producer_ts = %ts.to_rfc3339(),
                received_at = %received_at.to_rfc3339(),
                "producer timestamp ahead of receipt, using receipt time"
            );
            received_at
        }
        Some(ts) => ts,
        None => received_at,
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

fn regime(payload: &Value, missing: &mut Vec<&'static str>) -> Option<RegimeSection> {
    let phase = payload::text(payload, &["phase", "regime.phase", "regime.name", "regime"])
        .map(str::to_string);

    let bias = payload::first(payload, &["bias", "regime.bias", "direction", "regime.direction"])
        .and_then(bias_from_value)
        .or_else(|| phase.as_deref().and_then(bias_from_phase));

    let Some(bias) = bias else {
        missing.push("bias");
        return None;
    };

    let phase_confidence = payload::number(
        payload,
        &[
            "phaseConfidence",
            "phase_confidence",
            "regime.phaseConfidence",
            "regime.phase_confidence",
            "confidence",
            "regime.confidence",
        ],
    )
    .map(payload::to_percent)
    .unwrap_or(DEFAULT_PHASE_CONFIDENCE);

    Some(RegimeSection {
        bias,
        phase,
        phase_confidence,
    })
}

fn expert(payload: &Value, missing: &mut Vec<&'static str>) -> Option<ExpertSection> {
    let direction = payload::first(
        payload,
        &[
            "direction",
            "signal.direction",
            "side",
            "signal.side",
            "action",
            "signal.action",
            "signal.type",
        ],
    )
    .and_then(parse_direction);

    let Some(direction) = direction else {
        missing.push("direction");
        return None;
    };

    let raw_score = payload::number(
        payload,
        &["aiScore", "ai_score", "signal.aiScore", "signal.ai_score", "score", "signal.score"],
    )
    .map(|s| s.clamp(0.0, AI_SCORE_MAX));

    let raw_quality =
        payload::text(payload, &["quality", "signal.quality", "tier", "signal.tier"]).and_then(parse_quality);

    let (ai_score, quality) = match (raw_score, raw_quality) {
        (Some(score), Some(tier)) => (score, tier),
        (Some(score), None) => (score, QualityTier::from_ai_score(score)),
        (None, Some(tier)) => (tier.representative_score(), tier),
        (None, None) => (DEFAULT_AI_SCORE, QualityTier::from_ai_score(DEFAULT_AI_SCORE)),
    };

    let risk = risk_ratios(payload);
    let timeframe = payload::text(payload, &["timeframe", "tf", "interval", "signal.timeframe"])
        .map(str::to_string);

    Some(ExpertSection {
        direction,
        ai_score,
        quality,
        risk,
        timeframe,
    })
}

fn risk_ratios(payload: &Value) -> RiskRatios {
    let entry = payload::number(payload, &["entry", "entryPrice", "entry_price", "signal.entry", "signal.entryPrice"]);
    let stop = payload::number(
        payload,
        &["stopLoss", "stop_loss", "stop", "sl", "signal.stopLoss", "signal.stop_loss", "signal.sl"],
    );
    let target = payload::number(
        payload,
        &[
            "takeProfit",
            "take_profit",
            "target",
            "tp1",
            "signal.takeProfit",
            "signal.take_profit",
            "signal.tp1",
        ],
    );

    let explicit = payload::number(
        payload,
        &[
            "riskReward",
            "risk_reward",
            "rr",
            "signal.riskReward",
            "signal.risk_reward",
            "signal.rr",
            "riskRatios.rewardToRisk",
        ],
    )
    .filter(|r| *r >= 0.0);

    let derived = match (entry, stop, target) {
        (Some(e), Some(s), Some(t)) if (e - s).abs() > f64::EPSILON => {
            Some((t - e).abs() / (e - s).abs())
        }
        _ => None,
    };

    RiskRatios {
        reward_to_risk: explicit.or(derived),
        entry,
        stop,
        target,
    }
}

fn alignment(payload: &Value, missing: &mut Vec<&'static str>) -> Option<AlignmentSection> {
    let timeframes: BTreeMap<String, Bias> =
        payload::first(payload, &["timeframes", "alignment.timeframes", "trends"])
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .filter_map(|(tf, v)| bias_from_value(v).map(|b| (tf.clone(), b)))
                    .collect()
            })
            .unwrap_or_default();

    let bullish = payload::number(
        payload,
        &["bullishPct", "bullish_pct", "alignment.bullishPct", "alignment.bullish_pct"],
    )
    .map(payload::to_percent);
    let bearish = payload::number(
        payload,
        &["bearishPct", "bearish_pct", "alignment.bearishPct", "alignment.bearish_pct"],
    )
    .map(payload::to_percent);

    let (bullish_pct, bearish_pct) = match (bullish, bearish) {
        (Some(bu), Some(be)) => (bu, be),
        (Some(bu), None) => (bu, 100.0 - bu),
        (None, Some(be)) => (100.0 - be, be),
        (None, None) if !timeframes.is_empty() => {
            let total = timeframes.len() as f64;
            let count = |want: Bias| timeframes.values().filter(|b| **b == want).count() as f64;
            (
                count(Bias::Bullish) / total * 100.0,
                count(Bias::Bearish) / total * 100.0,
            )
        }
        (None, None) => {
            missing.push("timeframes");
            return None;
        }
    };

    Some(AlignmentSection {
        timeframes,
        bullish_pct,
        bearish_pct,
    })
}

fn structure(payload: &Value, missing: &mut Vec<&'static str>) -> Option<StructureSection> {
    let valid = payload::boolean(
        payload,
        &[
            "validSetup",
            "valid_setup",
            "structure.validSetup",
            "structure.valid_setup",
            "setup.valid",
        ],
    );

    let Some(valid_setup) = valid else {
        missing.push("validSetup");
        return None;
    };

    let execution_quality = payload::text(
        payload,
        &[
            "executionQuality",
            "execution_quality",
            "structure.executionQuality",
            "structure.execution_quality",
            "grade",
        ],
    )
    .and_then(parse_grade)
    .or_else(|| {
        payload::number(payload, &["structure.score", "structureScore", "structure_score", "score"])
            .map(|s| ExecutionGrade::from_score(payload::to_percent(s)))
    })
    .unwrap_or(if valid_setup {
        ExecutionGrade::B
    } else {
        ExecutionGrade::C
    });

    Some(StructureSection {
        valid_setup,
        execution_quality,
    })
}
