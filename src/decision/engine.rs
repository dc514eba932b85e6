// =============================================================================
// Decision Engine — gates, confidence, action, sizing
// =============================================================================
//
// `decide` is synchronous, does no I/O and never mutates its inputs. Two
// calls with the same snapshot and metrics produce packets that differ only
// in `id` and `timestamp`; session and weekday sizing use the snapshot's
// `taken_at`, not the wall clock.
//
// Action:
//   EXECUTE  - all gates pass and confidence ≥ execute threshold
//   WAIT     - all gates pass and wait floor ≤ confidence < execute threshold
//   SKIP     - anything else
// =============================================================================

use chrono::Utc;
use tracing::{debug, info};

use crate::context::ContextSnapshot;
use crate::decision::confidence::{confidence, ConfidenceInputs};
use crate::decision::gates::{market_gate, regime_gate, structural_gate};
use crate::decision::packet::{DecisionPacket, GateResults};
use crate::decision::sizing::{size, SizingInputs};
use crate::errors::{ConfigError, DecideError};
use crate::market_metrics::MarketMetrics;
use crate::rule_config::RuleConfig;
use crate::types::Action;

pub struct DecisionEngine {
    config: RuleConfig,
}

impl DecisionEngine {
    /// Build an engine over a validated rule set.
    pub fn new(config: RuleConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        info!(
            rules_version = %config.rules_version,
            execute = config.thresholds.execute,
            wait = config.thresholds.wait,
            "decision engine ready"
        );
        Ok(Self { config })
    }

    pub fn config(&self) -> &RuleConfig {
        &self.config
    }

    pub fn decide(
        &self,
        snapshot: &ContextSnapshot,
        metrics: &MarketMetrics,
    ) -> Result<DecisionPacket, DecideError> {
        let cfg = &self.config;
        let ctx = &snapshot.context;
        let symbol = ctx.instrument.symbol.as_str();

        if symbol.is_empty() {
            return Err(DecideError::InvalidContext(
                "context has no instrument symbol".to_string(),
            ));
        }
        if metrics.symbol != symbol {
            return Err(DecideError::InvalidContext(format!(
                "market metrics for {} supplied with context for {}",
                metrics.symbol, symbol
            )));
        }

        let expert = ctx.expert.as_ref();
        let direction = expert.map(|e| e.direction);

        // ── Gates ────────────────────────────────────────────────────────
        let gates = GateResults {
            regime: regime_gate(ctx.regime.as_ref(), direction, &cfg.regime_gate),
            structural: structural_gate(ctx.structure.as_ref(), &cfg.structural_gate),
            market: market_gate(metrics, &cfg.market_gate),
        };

        // ── Confidence ───────────────────────────────────────────────────
        let quality_multiplier = expert.map_or(1.0, |e| cfg.sizing.quality.for_tier(e.quality));
        let contributions = confidence(
            &ConfidenceInputs {
                regime_gate: &gates.regime,
                structural_gate: &gates.structural,
                market_gate: &gates.market,
                expert,
                alignment: ctx.alignment.as_ref(),
                direction,
                quality_multiplier,
            },
            &cfg.weights,
        );
        let score = contributions.total;

        // ── Action ───────────────────────────────────────────────────────
        let mut reasons: Vec<String> = gates.failure_reasons().cloned().collect();
        if expert.is_none() {
            reasons.push("Signal: no expert signal in context".to_string());
        }
        if !snapshot.complete {
            reasons.push(format!(
                "Context: completeness rule not satisfied ({:.0}% of sources fresh)",
                snapshot.completeness * 100.0
            ));
        }

        let eligible = gates.all_passed() && expert.is_some() && snapshot.complete;
        let t = &cfg.thresholds;
        let action = if eligible && score >= t.execute {
            Action::Execute
        } else if eligible && score >= t.wait {
            reasons.push(format!(
                "Confidence {:.1} below execute threshold {:.1}",
                score, t.execute
            ));
            Action::Wait
        } else {
            if eligible {
                reasons.push(format!(
                    "Confidence {:.1} below wait floor {:.1}",
                    score, t.wait
                ));
            }
            Action::Skip
        };

        // ── Sizing ───────────────────────────────────────────────────────
        let sizing = match (action, expert, direction) {
            (Action::Skip, _, _) | (_, None, _) | (_, _, None) => None,
            (_, Some(e), Some(d)) => Some(size(
                &SizingInputs {
                    quality_multiplier,
                    aligned_timeframes: ctx.alignment.as_ref().map(|a| a.aligned_count(d)),
                    htf_aligned: ctx
                        .alignment
                        .as_ref()
                        .and_then(|a| a.higher_timeframes_aligned(d)),
                    reward_to_risk: e.risk.reward_to_risk,
                    volume_ratio: metrics.statistics.volume_ratio,
                    trend_strength: metrics.statistics.trend_strength,
                    at: snapshot.taken_at,
                    regime: ctx.regime.as_ref(),
                    direction: Some(d),
                },
                &cfg.sizing,
            )),
        };
        let size_multiplier = sizing
            .as_ref()
            .map_or(cfg.sizing.min_multiplier, |s| s.multiplier);

        debug!(
            symbol,
            regime = gates.regime.score,
            structural = gates.structural.score,
            market = gates.market.score,
            "gates evaluated"
        );
        info!(
            symbol,
            %action,
            confidence = score,
            size_multiplier,
            reasons = reasons.len(),
            "decision made"
        );

        Ok(DecisionPacket {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.to_string(),
            action,
            direction,
            size_multiplier,
            confidence_score: score,
            reasons,
            gate_results: gates,
            contributions,
            sizing,
            context_snapshot: snapshot.clone(),
            market_snapshot: metrics.clone(),
            rules_version: cfg.rules_version.clone(),
            timestamp: Utc::now().to_rfc3339(),
        })
    }
}
