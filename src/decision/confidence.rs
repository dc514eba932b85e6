// =============================================================================
// Confidence Score — weighted blend of five clamped contributions
// =============================================================================
//
//   regime      - regime gate score
//   expert      - AI score rescaled to 0–100, times the quality multiplier
//   alignment   - % of timeframes agreeing with the signal (50 when unknown)
//   market      - market gate score
//   structure   - structural gate score
//
// Each contribution is clamped to [0, 100] before weighting and the sum is
// clamped again. The quality multiplier is passed in, never looked up here:
// the engine resolves it once and hands the same value to sizing.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::context::normalizer::AI_SCORE_MAX;
use crate::context::{AlignmentSection, ExpertSection};
use crate::decision::gates::GateResult;
use crate::rule_config::ConfidenceWeights;
use crate::types::Direction;

/// Alignment contribution when no alignment data is fresh.
pub const NEUTRAL_ALIGNMENT: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    /// Clamped contribution in [0, 100].
    pub value: f64,
    pub weight: f64,
    pub weighted: f64,
}

impl Contribution {
    fn new(raw: f64, weight: f64) -> Self {
        let value = if raw.is_finite() { raw.clamp(0.0, 100.0) } else { 0.0 };
        Self {
            value,
            weight,
            weighted: value * weight,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceBreakdown {
    pub regime: Contribution,
    pub expert: Contribution,
    pub alignment: Contribution,
    pub market: Contribution,
    pub structure: Contribution,
    /// Quality-tier multiplier applied to the expert contribution.
    pub quality_multiplier: f64,
    pub total: f64,
}

/// Expert-signal strength on a 0–100 scale with the quality multiplier
/// applied.
pub fn expert_strength(expert: Option<&ExpertSection>, quality_multiplier: f64) -> f64 {
    match expert {
        Some(e) => (e.ai_score / AI_SCORE_MAX * 100.0 * quality_multiplier).clamp(0.0, 100.0),
        None => 0.0,
    }
}

pub fn alignment_pct(alignment: Option<&AlignmentSection>, direction: Option<Direction>) -> f64 {
    match (alignment, direction) {
        (Some(a), Some(d)) => a.pct_for(d),
        _ => NEUTRAL_ALIGNMENT,
    }
}

pub struct ConfidenceInputs<'a> {
    pub regime_gate: &'a GateResult,
    pub structural_gate: &'a GateResult,
    pub market_gate: &'a GateResult,
    pub expert: Option<&'a ExpertSection>,
    pub alignment: Option<&'a AlignmentSection>,
    pub direction: Option<Direction>,
    pub quality_multiplier: f64,
}

pub fn confidence(inputs: &ConfidenceInputs<'_>, weights: &ConfidenceWeights) -> ConfidenceBreakdown {
    let regime = Contribution::new(inputs.regime_gate.score, weights.regime);
    let expert = Contribution::new(
        expert_strength(inputs.expert, inputs.quality_multiplier),
        weights.expert,
    );
    let alignment = Contribution::new(
        alignment_pct(inputs.alignment, inputs.direction),
        weights.alignment,
    );
    let market = Contribution::new(inputs.market_gate.score, weights.market);
    let structure = Contribution::new(inputs.structural_gate.score, weights.structure);

    let total = [regime, expert, alignment, market, structure]
        .iter()
        .map(|c| c.weighted)
        .sum::<f64>()
        .clamp(0.0, 100.0);

    ConfidenceBreakdown {
        regime,
        expert,
        alignment,
        market,
        structure,
        quality_multiplier: inputs.quality_multiplier,
        total,
    }
}
