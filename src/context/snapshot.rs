// =============================================================================
// Context fragments and the aggregated snapshot
// =============================================================================
//
// A fragment carries exactly one section from exactly one producer. The
// aggregated context holds one optional slot per section: `None` means the
// section was never received or has aged out, which downstream gates treat
// differently from a present section with zero confidence.
// =============================================================================

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Bias, Direction, ExecutionGrade, Instrument, QualityTier, SourceName};

/// Timeframes at or above this many minutes count as higher timeframes.
pub const HIGHER_TIMEFRAME_MINUTES: u32 = 240;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeSection {
    pub bias: Bias,
    #[serde(default)]
    pub phase: Option<String>,
    /// Phase confidence in percent.
    pub phase_confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskRatios {
    /// Reward over risk, explicit or derived from entry/stop/target.
    pub reward_to_risk: Option<f64>,
    pub entry: Option<f64>,
    pub stop: Option<f64>,
    pub target: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertSection {
    pub direction: Direction,
    /// AI score on the producer's 0–10.5 scale.
    pub ai_score: f64,
    pub quality: QualityTier,
    #[serde(default)]
    pub risk: RiskRatios,
    #[serde(default)]
    pub timeframe: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentSection {
    /// Per-timeframe bias, keyed by the producer's timeframe label.
    pub timeframes: BTreeMap<String, Bias>,
    pub bullish_pct: f64,
    pub bearish_pct: f64,
}

impl AlignmentSection {
    /// Percentage of timeframes agreeing with `direction`.
    pub fn pct_for(&self, direction: Direction) -> f64 {
        match direction {
            Direction::Long => self.bullish_pct,
            Direction::Short => self.bearish_pct,
        }
    }

    /// Number of timeframes whose bias matches `direction`.
    pub fn aligned_count(&self, direction: Direction) -> usize {
        let want = direction.aligned_bias();
        self.timeframes.values().filter(|b| **b == want).count()
    }

    /// `Some(true)` when every higher timeframe agrees with `direction`,
    /// `Some(false)` when any disagrees, `None` when none are reported.
    pub fn higher_timeframes_aligned(&self, direction: Direction) -> Option<bool> {
        let want = direction.aligned_bias();
        let htf: Vec<Bias> = self
            .timeframes
            .iter()
            .filter(|(tf, _)| {
                timeframe_minutes(tf).is_some_and(|m| m >= HIGHER_TIMEFRAME_MINUTES)
            })
            .map(|(_, b)| *b)
            .collect();
        if htf.is_empty() {
            None
        } else {
            Some(htf.iter().all(|b| *b == want))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureSection {
    pub valid_setup: bool,
    pub execution_quality: ExecutionGrade,
}

/// The section payload of a fragment. The variant determines the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum FragmentSection {
    Regime(RegimeSection),
    Expert(ExpertSection),
    Alignment(AlignmentSection),
    Structure(StructureSection),
}

/// A normalized partial update from one producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextFragment {
    pub instrument: Instrument,
    /// Producer timestamp, or receipt time when the producer sent none.
    pub observed_at: DateTime<Utc>,
    pub section: FragmentSection,
}

impl ContextFragment {
    pub fn source(&self) -> SourceName {
        match self.section {
            FragmentSection::Regime(_) => SourceName::Regime,
            FragmentSection::Expert(_) => SourceName::ExpertSignal,
            FragmentSection::Alignment(_) => SourceName::TrendAlignment,
            FragmentSection::Structure(_) => SourceName::StructureCheck,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.instrument.symbol
    }
}

/// Point-in-time merged view of all fresh fragments for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedContext {
    pub instrument: Instrument,
    pub regime: Option<RegimeSection>,
    pub expert: Option<ExpertSection>,
    pub alignment: Option<AlignmentSection>,
    pub structure: Option<StructureSection>,
    /// Receipt time of the last applied fragment, per fresh source.
    pub last_updated: BTreeMap<SourceName, DateTime<Utc>>,
}

/// A deep copy of the aggregated context handed to the decision engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub context: AggregatedContext,
    /// Fraction of required + optional sources currently fresh.
    pub completeness: f64,
    /// Whether the completeness rule held when the snapshot was taken.
    pub complete: bool,
    pub taken_at: DateTime<Utc>,
}

/// Parse a timeframe label into minutes: `15m`, `1h`, `4H`, `1d`, `D`, `W`,
/// `1w`, or bare minutes (`240`).
pub fn timeframe_minutes(label: &str) -> Option<u32> {
    let label = label.trim();
    if label.is_empty() {
        return None;
    }
    if let Ok(minutes) = label.parse::<u32>() {
        return Some(minutes);
    }
    let lower = label.to_ascii_lowercase();
    let split = lower.find(|c: char| !c.is_ascii_digit()).unwrap_or(lower.len());
    let (digits, unit) = lower.split_at(split);
    let count: u32 = if digits.is_empty() { 1 } else { digits.parse().ok()? };
    let unit_minutes = match unit {
        "m" | "min" => 1,
        "h" | "hr" => 60,
        "d" | "day" => 1_440,
        "w" | "wk" => 10_080,
        _ => return None,
    };
    count.checked_mul(unit_minutes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alignment(pairs: &[(&str, Bias)]) -> AlignmentSection {
        AlignmentSection {
            timeframes: pairs.iter().map(|(k, b)| (k.to_string(), *b)).collect(),
            bullish_pct: 0.0,
            bearish_pct: 0.0,
        }
    }

    #[test]
    fn timeframe_labels_parse() {
        assert_eq!(timeframe_minutes("15m"), Some(15));
        assert_eq!(timeframe_minutes("4H"), Some(240));
        assert_eq!(timeframe_minutes("D"), Some(1_440));
        assert_eq!(timeframe_minutes("1w"), Some(10_080));
        assert_eq!(timeframe_minutes("60"), Some(60));
        assert_eq!(timeframe_minutes("fortnight"), None);
    }

    #[test]
    fn higher_timeframe_alignment() {
        let a = alignment(&[("15m", Bias::Bearish), ("4h", Bias::Bullish), ("1d", Bias::Bullish)]);
        assert_eq!(a.higher_timeframes_aligned(Direction::Long), Some(true));
        assert_eq!(a.higher_timeframes_aligned(Direction::Short), Some(false));

        let lower_only = alignment(&[("5m", Bias::Bullish)]);
        assert_eq!(lower_only.higher_timeframes_aligned(Direction::Long), None);
    }

    #[test]
    fn aligned_count_matches_direction() {
        let a = alignment(&[("15m", Bias::Bullish), ("1h", Bias::Bullish), ("4h", Bias::Neutral)]);
        assert_eq!(a.aligned_count(Direction::Long), 2);
        assert_eq!(a.aligned_count(Direction::Short), 0);
    }
}
