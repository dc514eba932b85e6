// =============================================================================
// Position Sizing — independent multiplicative factors
// =============================================================================
//
// multiplier = clamp(1.0 × quality × confluence × htf × rr × volume × trend
//                    × session × weekday + phase_boost, min, max)
//
// Each factor is a pure function of one input.
//
//   Confluence (aligned timeframes):  0-1 → 0.90   2 → 1.00   3 → 1.10   4+ → 1.20
//   Higher-timeframe alignment:       aligned → 1.15   opposed → 0.80
//   Reward:risk:                      ≥3 → 1.20   ≥2 → 1.10   ≥1.5 → 1.00   <1.5 → 0.80
//   Relative volume:                  ≥2 → 1.15   ≥1.2 → 1.05   ≥0.8 → 1.00   <0.8 → 0.85
//   Trend strength:                   ≥40 → 1.10   ≥25 → 1.00   <25 → 0.90
//   Session (UTC hour):               13-16 → 1.10   7-20 → 1.00   else → 0.90
//   Weekday:                          Sat/Sun → 0.80   Fri → 0.90   Mon → 0.95
//
// Unknown inputs (`None`) are neutral (1.0).
// =============================================================================

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::context::RegimeSection;
use crate::rule_config::SizingParams;
use crate::types::Direction;

pub fn confluence_factor(aligned_timeframes: Option<usize>) -> f64 {
    match aligned_timeframes {
        None => 1.0,
        Some(0..=1) => 0.90,
        Some(2) => 1.00,
        Some(3) => 1.10,
        Some(_) => 1.20,
    }
}

pub fn htf_alignment_factor(aligned: Option<bool>) -> f64 {
    match aligned {
        Some(true) => 1.15,
        Some(false) => 0.80,
        None => 1.0,
    }
}

pub fn risk_reward_factor(reward_to_risk: Option<f64>) -> f64 {
    match reward_to_risk {
        Some(rr) if rr >= 3.0 => 1.20,
        Some(rr) if rr >= 2.0 => 1.10,
        Some(rr) if rr >= 1.5 => 1.00,
        Some(_) => 0.80,
        None => 1.0,
    }
}

pub fn volume_factor(volume_ratio: f64) -> f64 {
    if volume_ratio >= 2.0 {
        1.15
    } else if volume_ratio >= 1.2 {
        1.05
    } else if volume_ratio >= 0.8 {
        1.00
    } else {
        0.85
    }
}

pub fn trend_factor(trend_strength: f64) -> f64 {
    if trend_strength >= 40.0 {
        1.10
    } else if trend_strength >= 25.0 {
        1.00
    } else {
        0.90
    }
}

/// London/New York overlap is the most liquid window.
pub fn session_factor(utc_hour: u32) -> f64 {
    match utc_hour {
        13..=16 => 1.10,
        7..=20 => 1.00,
        _ => 0.90,
    }
}

pub fn weekday_factor(day: Weekday) -> f64 {
    match day {
        Weekday::Sat | Weekday::Sun => 0.80,
        Weekday::Fri => 0.90,
        Weekday::Mon => 0.95,
        _ => 1.00,
    }
}

/// Additive boost when the regime agrees with the signal with high
/// confidence. A neutral regime never boosts.
pub fn phase_boost(
    regime: Option<&RegimeSection>,
    direction: Option<Direction>,
    params: &SizingParams,
) -> f64 {
    match (regime, direction) {
        (Some(r), Some(d))
            if r.bias == d.aligned_bias()
                && r.phase_confidence >= params.phase_boost_min_confidence =>
        {
            params.phase_boost
        }
        _ => 0.0,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizingBreakdown {
    pub quality: f64,
    pub confluence: f64,
    pub htf_alignment: f64,
    pub risk_reward: f64,
    pub volume: f64,
    pub trend: f64,
    pub session: f64,
    pub weekday: f64,
    pub phase_boost: f64,
    /// Before clamping.
    pub raw: f64,
    pub multiplier: f64,
}

pub struct SizingInputs<'a> {
    /// Resolved once by the engine; the same value weighted the confidence.
    pub quality_multiplier: f64,
    pub aligned_timeframes: Option<usize>,
    pub htf_aligned: Option<bool>,
    pub reward_to_risk: Option<f64>,
    pub volume_ratio: f64,
    pub trend_strength: f64,
    pub at: DateTime<Utc>,
    pub regime: Option<&'a RegimeSection>,
    pub direction: Option<Direction>,
}

pub fn size(inputs: &SizingInputs<'_>, params: &SizingParams) -> SizingBreakdown {
    let quality = inputs.quality_multiplier;
    let confluence = confluence_factor(inputs.aligned_timeframes);
    let htf_alignment = htf_alignment_factor(inputs.htf_aligned);
    let risk_reward = risk_reward_factor(inputs.reward_to_risk);
    let volume = volume_factor(inputs.volume_ratio);
    let trend = trend_factor(inputs.trend_strength);
    let session = session_factor(inputs.at.hour());
    let weekday = weekday_factor(inputs.at.weekday());
    let boost = phase_boost(inputs.regime, inputs.direction, params);

    let raw = quality * confluence * htf_alignment * risk_reward * volume * trend * session * weekday
        + boost;
    let multiplier = if raw.is_finite() {
        raw.clamp(params.min_multiplier, params.max_multiplier)
    } else {
        params.min_multiplier
    };

    SizingBreakdown {
        quality,
        confluence,
        htf_alignment,
        risk_reward,
        volume,
        trend,
        session,
        weekday,
        phase_boost: boost,
        raw,
        multiplier,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Bias;
    use chrono::TimeZone;

    #[test]
    fn confluence_tiers() {
        assert_eq!(confluence_factor(Some(0)), 0.90);
        assert_eq!(confluence_factor(Some(2)), 1.00);
        assert_eq!(confluence_factor(Some(3)), 1.10);
        assert_eq!(confluence_factor(Some(6)), 1.20);
        assert_eq!(confluence_factor(None), 1.0);
    }

    #[test]
    fn htf_alignment_tiers() {
        assert_eq!(htf_alignment_factor(Some(true)), 1.15);
        assert_eq!(htf_alignment_factor(Some(false)), 0.80);
        assert_eq!(htf_alignment_factor(None), 1.0);
    }

    #[test]
    fn risk_reward_tiers() {
        assert_eq!(risk_reward_factor(Some(3.5)), 1.20);
        assert_eq!(risk_reward_factor(Some(2.0)), 1.10);
        assert_eq!(risk_reward_factor(Some(1.6)), 1.00);
        assert_eq!(risk_reward_factor(Some(0.9)), 0.80);
        assert_eq!(risk_reward_factor(None), 1.0);
    }

    #[test]
    fn volume_tiers() {
        assert_eq!(volume_factor(2.4), 1.15);
        assert_eq!(volume_factor(1.3), 1.05);
        assert_eq!(volume_factor(1.0), 1.00);
        assert_eq!(volume_factor(0.5), 0.85);
    }

    #[test]
    fn trend_tiers() {
        assert_eq!(trend_factor(55.0), 1.10);
        assert_eq!(trend_factor(25.0), 1.00);
        assert_eq!(trend_factor(10.0), 0.90);
    }

    #[test]
    fn session_tiers() {
        assert_eq!(session_factor(14), 1.10);
        assert_eq!(session_factor(9), 1.00);
        assert_eq!(session_factor(2), 0.90);
    }

    #[test]
    fn weekday_tiers() {
        assert_eq!(weekday_factor(Weekday::Sun), 0.80);
        assert_eq!(weekday_factor(Weekday::Fri), 0.90);
        assert_eq!(weekday_factor(Weekday::Mon), 0.95);
        assert_eq!(weekday_factor(Weekday::Wed), 1.00);
    }

    #[test]
    fn phase_boost_requires_aligned_confident_regime() {
        let params = SizingParams::default();
        let strong = RegimeSection {
            bias: Bias::Bullish,
            phase: None,
            phase_confidence: 90.0,
        };
        assert_eq!(phase_boost(Some(&strong), Some(Direction::Long), &params), 0.25);
        assert_eq!(phase_boost(Some(&strong), Some(Direction::Short), &params), 0.0);
        let weak = RegimeSection {
            phase_confidence: 70.0,
            ..strong
        };
        assert_eq!(phase_boost(Some(&weak), Some(Direction::Long), &params), 0.0);
    }

    #[test]
    fn multiplier_is_clamped_to_configured_range() {
        let params = SizingParams::default();
        // Saturday 03:00 UTC
        let at = Utc.with_ymd_and_hms(2026, 3, 14, 3, 0, 0).unwrap();
        let weak = SizingInputs {
            quality_multiplier: 0.85,
            aligned_timeframes: Some(0),
            htf_aligned: Some(false),
            reward_to_risk: Some(1.0),
            volume_ratio: 0.3,
            trend_strength: 5.0,
            at,
            regime: None,
            direction: Some(Direction::Long),
        };
        let s = size(&weak, &params);
        assert!(s.raw < params.min_multiplier);
        assert_eq!(s.multiplier, params.min_multiplier);

        let strong = SizingInputs {
            quality_multiplier: 50.0,
            ..weak
        };
        assert_eq!(size(&strong, &params).multiplier, params.max_multiplier);
    }
}
