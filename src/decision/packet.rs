// =============================================================================
// Decision Packet — auditable record of every EXECUTE / WAIT / SKIP verdict
// =============================================================================
//
// A packet is built once per decision and never mutated afterwards. It
// carries the inputs (context and market snapshots) alongside every gate
// verdict and score component, so any decision can be re-derived and
// audited after the fact.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::context::ContextSnapshot;
use crate::decision::confidence::ConfidenceBreakdown;
use crate::decision::gates::GateResult;
use crate::decision::sizing::SizingBreakdown;
use crate::market_metrics::MarketMetrics;
use crate::types::{Action, Direction};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateResults {
    pub regime: GateResult,
    pub structural: GateResult,
    pub market: GateResult,
}

impl GateResults {
    pub fn all_passed(&self) -> bool {
        self.regime.passed && self.structural.passed && self.market.passed
    }

    /// Failure reasons of every gate, in regime / structural / market order.
    pub fn failure_reasons(&self) -> impl Iterator<Item = &String> {
        self.regime
            .reasons
            .iter()
            .chain(&self.structural.reasons)
            .chain(&self.market.reasons)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionPacket {
    /// Unique identifier for this decision (UUID v4).
    pub id: String,

    pub symbol: String,

    pub action: Action,

    /// Direction of the expert signal, if one was in context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,

    /// Within the configured size range. The range minimum on SKIP.
    pub size_multiplier: f64,

    pub confidence_score: f64,

    /// Empty on EXECUTE.
    pub reasons: Vec<String>,

    pub gate_results: GateResults,

    pub contributions: ConfidenceBreakdown,

    /// Present on EXECUTE and WAIT only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sizing: Option<SizingBreakdown>,

    pub context_snapshot: ContextSnapshot,

    pub market_snapshot: MarketMetrics,

    pub rules_version: String,

    /// ISO 8601 timestamp of when this packet was created.
    pub timestamp: String,
}

impl DecisionPacket {
    /// Compare everything except `id` and `timestamp`.
    pub fn same_verdict(&self, other: &Self) -> bool {
        self.symbol == other.symbol
            && self.action == other.action
            && self.direction == other.direction
            && self.size_multiplier == other.size_multiplier
            && self.confidence_score == other.confidence_score
            && self.reasons == other.reasons
            && self.gate_results == other.gate_results
            && self.contributions == other.contributions
            && self.sizing == other.sizing
            && self.context_snapshot == other.context_snapshot
            && self.market_snapshot == other.market_snapshot
            && self.rules_version == other.rules_version
    }

    /// One-line JSON, as written by the line sink.
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
