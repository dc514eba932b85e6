// =============================================================================
// Decision Gates — regime, structure, market
// =============================================================================
//
// Every gate runs on every decision and reports a score in [0, 100] plus
// every reason it failed. Gates never short-circuit: an operator reading a
// SKIP should see all the problems at once, not only the first one.
//
//   Regime      - regime bias compatible with the signal direction, and phase
//                confidence above the minimum
//   Structural  - structure checker reported a valid setup
//   Market      - spread, volatility spike, book depth, metrics completeness
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::context::{RegimeSection, StructureSection};
use crate::market_metrics::MarketMetrics;
use crate::rule_config::{MarketGateParams, RegimeGateParams, StructuralGateParams};
use crate::types::{Bias, Direction, ExecutionGrade};

/// Penalty for a market condition that is fully beyond its limit.
const MARKET_PENALTY_PER_VIOLATION: f64 = 25.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateResult {
    pub passed: bool,
    pub score: f64,
    /// Failure reasons; empty when passed.
    pub reasons: Vec<String>,
}

impl GateResult {
    fn pass(score: f64) -> Self {
        Self {
            passed: true,
            score: score.clamp(0.0, 100.0),
            reasons: Vec::new(),
        }
    }

    fn fail(score: f64, reasons: Vec<String>) -> Self {
        Self {
            passed: false,
            score: score.clamp(0.0, 100.0),
            reasons,
        }
    }
}

// ── Regime ──────────────────────────────────────────────────────────────────

pub fn regime_gate(
    regime: Option<&RegimeSection>,
    direction: Option<Direction>,
    params: &RegimeGateParams,
) -> GateResult {
    let Some(regime) = regime else {
        return GateResult::fail(0.0, vec!["Regime: no regime data received".to_string()]);
    };
    let Some(direction) = direction else {
        return GateResult::fail(
            0.0,
            vec!["Regime: no signal direction to check regime against".to_string()],
        );
    };

    let mut reasons = Vec::new();
    let confidence = regime.phase_confidence.clamp(0.0, 100.0);

    let compatible = regime.bias == direction.aligned_bias()
        || (regime.bias == Bias::Neutral && params.allow_neutral_bias);
    if !compatible {
        reasons.push(format!(
            "Regime: {} bias conflicts with {} signal",
            regime.bias, direction
        ));
    }

    let confident = confidence >= params.min_phase_confidence;
    if !confident {
        reasons.push(format!(
            "Regime: phase confidence {:.1} below {:.1} minimum",
            confidence, params.min_phase_confidence
        ));
    }

    match (compatible, confident) {
        (true, true) => GateResult::pass(confidence),
        (true, false) => GateResult::fail(confidence * params.partial_score_factor, reasons),
        (false, _) => GateResult::fail(0.0, reasons),
    }
}

// ── Structural ──────────────────────────────────────────────────────────────

pub fn grade_score(grade: ExecutionGrade) -> f64 {
    match grade {
        ExecutionGrade::APlus => 100.0,
        ExecutionGrade::A => 90.0,
        ExecutionGrade::B => 75.0,
        ExecutionGrade::C => 60.0,
    }
}

pub fn structural_gate(
    structure: Option<&StructureSection>,
    params: &StructuralGateParams,
) -> GateResult {
    match structure {
        None => GateResult::fail(
            params.missing_score,
            vec!["Structure: CRITICAL no structural data received".to_string()],
        ),
        Some(s) if !s.valid_setup => GateResult::fail(
            params.invalid_score,
            vec![format!(
                "Structure: setup reported invalid (execution quality {})",
                s.execution_quality
            )],
        ),
        Some(s) => GateResult::pass(grade_score(s.execution_quality)),
    }
}

// ── Market ──────────────────────────────────────────────────────────────────

/// How far `value` is past `limit`, relative to the limit, in [0, 1].
fn excess(value: f64, limit: f64) -> f64 {
    if limit <= 0.0 {
        return 1.0;
    }
    ((value - limit) / limit).clamp(0.0, 1.0)
}

pub fn market_gate(metrics: &MarketMetrics, params: &MarketGateParams) -> GateResult {
    let mut reasons = Vec::new();
    let mut penalty = 0.0;

    let spread = metrics.liquidity.spread_bps;
    if spread > params.max_spread_bps {
        penalty += MARKET_PENALTY_PER_VIOLATION * excess(spread, params.max_spread_bps);
        reasons.push(format!(
            "Market: spread {:.1} bps > {:.1} bps limit",
            spread, params.max_spread_bps
        ));
    }

    let atr_ratio = metrics.statistics.atr_ratio;
    if atr_ratio > params.max_atr_ratio {
        penalty += MARKET_PENALTY_PER_VIOLATION * excess(atr_ratio, params.max_atr_ratio);
        reasons.push(format!(
            "Market: volatility spike, ATR ratio {:.2} > {:.2}",
            atr_ratio, params.max_atr_ratio
        ));
    }

    let depth = metrics.liquidity.depth_score;
    if depth < params.min_depth_score {
        penalty += MARKET_PENALTY_PER_VIOLATION
            * ((params.min_depth_score - depth) / params.min_depth_score).clamp(0.0, 1.0);
        reasons.push(format!(
            "Market: book depth {:.1} < {:.1} floor",
            depth, params.min_depth_score
        ));
    }

    let completeness = metrics.completeness;
    if completeness < params.min_completeness {
        let shortfall = if params.min_completeness > 0.0 {
            (params.min_completeness - completeness) / params.min_completeness
        } else {
            0.0
        };
        penalty += MARKET_PENALTY_PER_VIOLATION * shortfall.clamp(0.0, 1.0);
        reasons.push(format!(
            "Market: only {:.0}% of metric providers answered (need {:.0}%)",
            completeness * 100.0,
            params.min_completeness * 100.0
        ));
    }

    let score = 100.0 - penalty;
    if reasons.is_empty() {
        GateResult::pass(score)
    } else {
        GateResult::fail(score, reasons)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_metrics::{LiquidityMetrics, VolatilityStats};

    fn regime(bias: Bias, confidence: f64) -> RegimeSection {
        RegimeSection {
            bias,
            phase: None,
            phase_confidence: confidence,
        }
    }

    fn healthy_metrics() -> MarketMetrics {
        let mut m = MarketMetrics::fallback("BTCUSDT");
        m.liquidity = LiquidityMetrics {
            spread_bps: 3.0,
            depth_score: 80.0,
            ..LiquidityMetrics::default()
        };
        m.completeness = 1.0;
        m
    }

    #[test]
    fn regime_passes_with_confidence_as_score() {
        let r = regime_gate(
            Some(&regime(Bias::Bullish, 82.0)),
            Some(Direction::Long),
            &RegimeGateParams::default(),
        );
        assert!(r.passed);
        assert_eq!(r.score, 82.0);
        assert!(r.reasons.is_empty());
    }

    #[test]
    fn regime_conflict_scores_zero_and_reports_both_reasons() {
        let r = regime_gate(
            Some(&regime(Bias::Bearish, 40.0)),
            Some(Direction::Long),
            &RegimeGateParams::default(),
        );
        assert!(!r.passed);
        assert_eq!(r.score, 0.0);
        assert_eq!(r.reasons.len(), 2);
    }

    #[test]
    fn regime_sub_threshold_gets_partial_score() {
        let r = regime_gate(
            Some(&regime(Bias::Bullish, 50.0)),
            Some(Direction::Long),
            &RegimeGateParams::default(),
        );
        assert!(!r.passed);
        assert_eq!(r.score, 25.0);
    }

    #[test]
    fn neutral_regime_follows_config() {
        let mut params = RegimeGateParams::default();
        let neutral = regime(Bias::Neutral, 75.0);
        assert!(regime_gate(Some(&neutral), Some(Direction::Short), &params).passed);
        params.allow_neutral_bias = false;
        assert!(!regime_gate(Some(&neutral), Some(Direction::Short), &params).passed);
    }

    #[test]
    fn missing_regime_fails() {
        let r = regime_gate(None, Some(Direction::Long), &RegimeGateParams::default());
        assert!(!r.passed);
        assert!(r.reasons[0].contains("no regime data"));
    }

    #[test]
    fn structure_absent_and_invalid_are_distinguishable() {
        let params = StructuralGateParams::default();
        let absent = structural_gate(None, &params);
        let invalid = structural_gate(
            Some(&StructureSection {
                valid_setup: false,
                execution_quality: ExecutionGrade::B,
            }),
            &params,
        );
        assert!(!absent.passed && !invalid.passed);
        assert!(absent.score < invalid.score);
        assert!(absent.reasons[0].contains("CRITICAL"));
        assert!(invalid.reasons[0].contains("invalid"));
        assert_ne!(absent.reasons, invalid.reasons);
    }

    #[test]
    fn valid_structure_scores_by_grade() {
        let r = structural_gate(
            Some(&StructureSection {
                valid_setup: true,
                execution_quality: ExecutionGrade::APlus,
            }),
            &StructuralGateParams::default(),
        );
        assert!(r.passed);
        assert_eq!(r.score, 100.0);
    }

    #[test]
    fn healthy_market_passes_at_full_score() {
        let r = market_gate(&healthy_metrics(), &MarketGateParams::default());
        assert!(r.passed);
        assert_eq!(r.score, 100.0);
    }

    #[test]
    fn market_collects_every_violation() {
        let mut m = healthy_metrics();
        m.liquidity.spread_bps = 30.0;
        m.liquidity.depth_score = 15.0;
        m.statistics = VolatilityStats {
            atr_ratio: 3.0,
            ..VolatilityStats::default()
        };
        let r = market_gate(&m, &MarketGateParams::default());
        assert!(!r.passed);
        assert_eq!(r.reasons.len(), 3);
        // spread 100% over (25) + ATR 50% over (12.5) + depth 50% short (12.5)
        assert!((r.score - 50.0).abs() < 1e-9);
    }

    #[test]
    fn market_score_degrades_with_distance() {
        let params = MarketGateParams::default();
        let mut slight = healthy_metrics();
        slight.liquidity.spread_bps = 16.0;
        let mut wide = healthy_metrics();
        wide.liquidity.spread_bps = 25.0;
        let a = market_gate(&slight, &params);
        let b = market_gate(&wide, &params);
        assert!(!a.passed && !b.passed);
        assert!(a.score > b.score);
    }

    #[test]
    fn unanswered_providers_fail_the_market_gate() {
        let r = market_gate(&MarketMetrics::fallback("BTCUSDT"), &MarketGateParams::default());
        assert!(!r.passed);
        assert_eq!(r.reasons.len(), 1);
        assert_eq!(r.score, 75.0);
    }
}
