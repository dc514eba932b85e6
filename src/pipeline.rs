// =============================================================================
// Confluence Pipeline — the ingest / decide call-in surfaces
// =============================================================================
//
//   ingest(payload)  classify → normalize → merge → completeness check
//   decide(symbol)   snapshot → metrics fetch → gates/score → sink
//
// The pipeline owns one instance of each component and nothing else; the
// binary (or any embedding service) builds it explicitly and shares it
// behind an `Arc`. A snapshot is copied before metrics are fetched, so
// fragments merged while a decision is in flight never leak into it.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::context::{ContextAggregator, ContextSnapshot, FieldNormalizer, SourceClassifier};
use crate::decision::{DecisionEngine, DecisionPacket};
use crate::errors::{ConfigError, DecideError, IngestError, ProcessError};
use crate::market_metrics::{MarketMetricsFetcher, ProviderBinding};
use crate::rule_config::RuleConfig;
use crate::sink::DecisionSink;
use crate::types::SourceName;

/// Result of ingesting one payload.
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    /// The symbol still lacks required or primary sources.
    Pending {
        symbol: String,
        source: SourceName,
        applied: bool,
        completeness: f64,
        missing: Vec<SourceName>,
    },
    /// The completeness rule holds; the snapshot is ready to decide on.
    SnapshotReady(ContextSnapshot),
}

pub struct ConfluencePipeline {
    aggregator: ContextAggregator,
    fetcher: MarketMetricsFetcher,
    engine: DecisionEngine,
    sink: Arc<dyn DecisionSink>,
    clock: Arc<dyn Clock>,
    fetch_budget: Duration,
}

impl ConfluencePipeline {
    /// Build every component from one validated rule set.
    pub fn new(
        config: RuleConfig,
        bindings: Vec<ProviderBinding>,
        sink: Arc<dyn DecisionSink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let aggregator = ContextAggregator::new(config.completeness.clone(), clock.clone())?;
        let fetcher = MarketMetricsFetcher::new(bindings, config.fetch.cache_ttl(), clock.clone());
        let fetch_budget = config.fetch.budget();
        let engine = DecisionEngine::new(config)?;
        Ok(Self {
            aggregator,
            fetcher,
            engine,
            sink,
            clock,
            fetch_budget,
        })
    }

    pub fn aggregator(&self) -> &ContextAggregator {
        &self.aggregator
    }

    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    /// Classify, normalize and merge one raw payload.
    pub fn ingest(&self, payload: &Value) -> Result<IngestOutcome, IngestError> {
        let source = SourceClassifier::classify(payload).map_err(|e| {
            warn!(best_guess = %e.best_guess, "unrecognized payload");
            e
        })?;

        let fragment = FieldNormalizer::normalize(payload, source, self.clock.now()).map_err(|e| {
            warn!(%source, missing = ?e.missing, "payload failed normalization");
            e
        })?;

        let outcome = self.aggregator.merge(fragment);
        Ok(match outcome.snapshot {
            Some(snapshot) => IngestOutcome::SnapshotReady(snapshot),
            None => {
                debug!(
                    symbol = %outcome.symbol,
                    %source,
                    missing = ?outcome.missing,
                    "context pending"
                );
                IngestOutcome::Pending {
                    symbol: outcome.symbol,
                    source,
                    applied: outcome.applied,
                    completeness: outcome.completeness,
                    missing: outcome.missing,
                }
            }
        })
    }

    /// Decide on the current snapshot for `symbol`.
    pub async fn decide(&self, symbol: &str) -> Result<DecisionPacket, DecideError> {
        let snapshot = self
            .aggregator
            .snapshot(symbol)
            .ok_or_else(|| DecideError::UnknownSymbol(symbol.to_string()))?;
        self.decide_snapshot(snapshot).await
    }

    /// Fetch metrics for an already-taken snapshot, decide, and hand the
    /// packet to the sink.
    pub async fn decide_snapshot(
        &self,
        snapshot: ContextSnapshot,
    ) -> Result<DecisionPacket, DecideError> {
        let symbol = snapshot.context.instrument.symbol.clone();
        let metrics = self.fetcher.fetch(&symbol, self.fetch_budget).await;
        let packet = self.engine.decide(&snapshot, &metrics)?;
        self.sink.submit(&packet);
        Ok(packet)
    }

    /// Ingest a payload and, if it completed the context, decide on it.
    pub async fn process(&self, payload: &Value) -> Result<Option<DecisionPacket>, ProcessError> {
        match self.ingest(payload)? {
            IngestOutcome::SnapshotReady(snapshot) => Ok(Some(self.decide_snapshot(snapshot).await?)),
            IngestOutcome::Pending { .. } => Ok(None),
        }
    }

    /// Forget symbols with no fresh data left and drop expired metric
    /// cache entries. Returns the number of symbols forgotten.
    pub fn sweep(&self) -> usize {
        let evicted = self.fetcher.sweep();
        if evicted > 0 {
            debug!(evicted, "expired metric cache entries dropped");
        }
        self.aggregator.sweep()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::market_metrics::{
        DerivativesMetrics, LiquidityMetrics, MetricSection, MetricsProvider, VolatilityStats,
    };
    use crate::sink::DecisionLedger;
    use crate::types::Action;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    struct StaticProvider {
        hang: bool,
    }

    impl StaticProvider {
        async fn gate(&self) {
            if self.hang {
                std::future::pending::<()>().await;
            }
        }
    }

    #[async_trait]
    impl MetricsProvider for StaticProvider {
        fn name(&self) -> &str {
            "static"
        }

        async fn fetch_options(&self, _symbol: &str) -> anyhow::Result<DerivativesMetrics> {
            self.gate().await;
            Ok(DerivativesMetrics::default())
        }

        async fn fetch_liquidity(&self, _symbol: &str) -> anyhow::Result<LiquidityMetrics> {
            self.gate().await;
            Ok(LiquidityMetrics {
                spread_bps: 3.0,
                depth_score: 85.0,
                ..LiquidityMetrics::default()
            })
        }

        async fn fetch_stats(&self, _symbol: &str) -> anyhow::Result<VolatilityStats> {
            self.gate().await;
            Ok(VolatilityStats {
                volume_ratio: 1.3,
                trend_strength: 30.0,
                ..VolatilityStats::default()
            })
        }
    }

    fn bindings(hang: bool) -> Vec<ProviderBinding> {
        let provider: Arc<dyn MetricsProvider> = Arc::new(StaticProvider { hang });
        MetricSection::ALL
            .into_iter()
            .map(|section| ProviderBinding::new(section, provider.clone()))
            .collect()
    }

    fn pipeline(config: RuleConfig, hang: bool) -> (ConfluencePipeline, Arc<DecisionLedger>) {
        // Tuesday 14:00 UTC
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 10, 14, 0, 0).unwrap(),
        ));
        let ledger = Arc::new(DecisionLedger::new());
        let mut config = config;
        config.fetch.budget_ms = 100;
        let p = ConfluencePipeline::new(config, bindings(hang), ledger.clone(), clock).unwrap();
        (p, ledger)
    }

    fn regime_payload() -> Value {
        json!({ "symbol": "BTCUSDT", "phase": "MARKUP", "bias": "BULLISH", "phaseConfidence": 0.9 })
    }

    fn expert_payload() -> Value {
        json!({
            "ticker": "BINANCE:BTCUSDT",
            "price": 64000.0,
            "signal": { "direction": "LONG", "aiScore": 9.5, "quality": "EXTREME" }
        })
    }

    fn structure_payload(valid: bool) -> Value {
        json!({ "symbol": "BTCUSDT", "structure": { "validSetup": valid, "executionQuality": "A" } })
    }

    #[tokio::test]
    async fn full_flow_executes_and_reaches_the_sink() {
        let mut cfg = RuleConfig::default();
        cfg.completeness.required_sources =
            [SourceName::Regime, SourceName::ExpertSignal, SourceName::StructureCheck]
                .into_iter()
                .collect();
        cfg.completeness.optional_sources = [SourceName::TrendAlignment].into_iter().collect();
        let (p, ledger) = pipeline(cfg, false);

        assert!(p.process(&regime_payload()).await.unwrap().is_none());
        assert!(p.process(&structure_payload(true)).await.unwrap().is_none());
        let packet = p.process(&expert_payload()).await.unwrap().unwrap();

        assert_eq!(packet.action, Action::Execute, "{:?}", packet.reasons);
        assert_eq!(packet.symbol, "BTCUSDT");
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.stats().execute, 1);
    }

    #[tokio::test]
    async fn pending_reports_missing_sources() {
        let mut cfg = RuleConfig::default();
        cfg.completeness.required_sources = [SourceName::Regime].into_iter().collect();
        cfg.completeness.optional_sources = [
            SourceName::ExpertSignal,
            SourceName::TrendAlignment,
            SourceName::StructureCheck,
        ]
        .into_iter()
        .collect();
        let (p, _) = pipeline(cfg, false);

        match p.ingest(&expert_payload()).unwrap() {
            IngestOutcome::Pending { missing, applied, .. } => {
                assert!(applied);
                assert_eq!(missing, vec![SourceName::Regime]);
            }
            other => panic!("expected pending, got {other:?}"),
        }
        assert!(matches!(
            p.ingest(&regime_payload()).unwrap(),
            IngestOutcome::SnapshotReady(_)
        ));
    }

    #[tokio::test]
    async fn invalid_structure_skips_end_to_end() {
        let (p, ledger) = pipeline(RuleConfig::default(), false);
        p.ingest(&regime_payload()).unwrap();
        p.ingest(&structure_payload(false)).unwrap();
        let packet = p.process(&expert_payload()).await.unwrap().unwrap();
        assert_eq!(packet.action, Action::Skip);
        assert!(!packet.gate_results.structural.passed);
        assert_eq!(ledger.stats().skip, 1);
    }

    #[tokio::test]
    async fn hung_providers_degrade_to_skip() {
        let (p, _) = pipeline(RuleConfig::default(), true);
        p.ingest(&regime_payload()).unwrap();
        p.ingest(&structure_payload(true)).unwrap();
        let packet = p.process(&expert_payload()).await.unwrap().unwrap();
        assert_eq!(packet.market_snapshot.completeness, 0.0);
        assert_eq!(packet.market_snapshot.errors.len(), 3);
        assert_eq!(packet.action, Action::Skip);
    }

    #[tokio::test]
    async fn in_flight_snapshot_ignores_later_fragments() {
        let (p, _) = pipeline(RuleConfig::default(), false);
        let snapshot = match p.ingest(&expert_payload()).unwrap() {
            IngestOutcome::SnapshotReady(s) => s,
            other => panic!("expected snapshot, got {other:?}"),
        };
        p.ingest(&structure_payload(false)).unwrap();
        let packet = p.decide_snapshot(snapshot).await.unwrap();
        assert!(packet.context_snapshot.context.structure.is_none());
        assert!(packet.reasons.iter().any(|r| r.contains("CRITICAL")));
    }

    #[tokio::test]
    async fn unknown_symbol_and_bad_payloads_surface_errors() {
        let (p, _) = pipeline(RuleConfig::default(), false);
        assert_eq!(
            p.decide("DOGEUSDT").await.unwrap_err(),
            DecideError::UnknownSymbol("DOGEUSDT".into())
        );
        assert!(matches!(
            p.ingest(&json!({ "hello": "world" })),
            Err(IngestError::Classification(_))
        ));
        assert!(matches!(
            p.ingest(&json!({ "signal": { "direction": "LONG" } })),
            Err(IngestError::Normalization(_))
        ));
    }
}
