// =============================================================================
// Context Aggregator — per-symbol merge of partial producer updates
// =============================================================================
//
// Each symbol owns one `SymbolContext` behind its own mutex, so fragments for
// the same symbol are serialised while different symbols proceed in
// parallel. The outer map lock is only held to look up or insert an entry.
//
// Lifecycle per symbol:
//   EMPTY -> PARTIAL -> COMPLETE -> (time passes) -> EXPIRED
// Sources age out individually, so a symbol cycles PARTIAL <-> COMPLETE as
// sources refresh or lapse. Stale sections are dropped on every access;
// `sweep` additionally forgets symbols with nothing fresh left.
//
// Merge rules:
//   - a fragment only overwrites its own section
//   - a fragment older (by producer timestamp) than the stored section for
//     the same source is ignored and does not refresh freshness
//   - the instrument is replaced by the newest fragment; equal timestamps
//     break ties deterministically so arrival order does not matter
// =============================================================================

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::context::normalizer::{canonical_symbol, UNKNOWN_EXCHANGE};
use crate::context::snapshot::{
    AggregatedContext, AlignmentSection, ContextFragment, ContextSnapshot, ExpertSection,
    FragmentSection, RegimeSection, StructureSection,
};
use crate::errors::ConfigError;
use crate::rule_config::CompletenessRule;
use crate::types::{Instrument, SourceName};

/// Where a symbol sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContextState {
    Empty,
    Partial,
    Complete,
    Expired,
}

impl std::fmt::Display for ContextState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "EMPTY"),
            Self::Partial => write!(f, "PARTIAL"),
            Self::Complete => write!(f, "COMPLETE"),
            Self::Expired => write!(f, "EXPIRED"),
        }
    }
}

/// Result of merging one fragment.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub symbol: String,
    pub source: SourceName,
    /// False when the fragment was older than the stored section.
    pub applied: bool,
    pub state: ContextState,
    pub completeness: f64,
    /// Sources still needed before the symbol is complete.
    pub missing: Vec<SourceName>,
    /// Taken under the same lock as the completeness check, when complete.
    pub snapshot: Option<ContextSnapshot>,
}

// ---------------------------------------------------------------------------
// Per-symbol state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Stamped<T> {
    value: T,
    observed_at: DateTime<Utc>,
    received_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct SymbolContext {
    instrument: Option<(Instrument, DateTime<Utc>)>,
    regime: Option<Stamped<RegimeSection>>,
    expert: Option<Stamped<ExpertSection>>,
    alignment: Option<Stamped<AlignmentSection>>,
    structure: Option<Stamped<StructureSection>>,
}

impl SymbolContext {
    /// (observed_at, received_at) of the stored section for `source`.
    fn stamps(&self, source: SourceName) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        fn pair<T>(s: &Option<Stamped<T>>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
            s.as_ref().map(|s| (s.observed_at, s.received_at))
        }
        match source {
            SourceName::Regime => pair(&self.regime),
            SourceName::ExpertSignal => pair(&self.expert),
            SourceName::TrendAlignment => pair(&self.alignment),
            SourceName::StructureCheck => pair(&self.structure),
        }
    }

    fn clear(&mut self, source: SourceName) {
        match source {
            SourceName::Regime => self.regime = None,
            SourceName::ExpertSignal => self.expert = None,
            SourceName::TrendAlignment => self.alignment = None,
            SourceName::StructureCheck => self.structure = None,
        }
    }

    fn last_updated(&self) -> BTreeMap<SourceName, DateTime<Utc>> {
        SourceName::ALL
            .iter()
            .filter_map(|s| self.stamps(*s).map(|(_, received)| (*s, received)))
            .collect()
    }

    /// Drop sections whose receipt is older than `max_age`. Returns how many.
    fn expire(&mut self, now: DateTime<Utc>, max_age: Duration) -> usize {
        let mut removed = 0;
        for source in SourceName::ALL {
            if let Some((_, received)) = self.stamps(source) {
                if now - received > max_age {
                    self.clear(source);
                    removed += 1;
                }
            }
        }
        removed
    }

    fn is_empty(&self) -> bool {
        SourceName::ALL.iter().all(|s| self.stamps(*s).is_none())
    }

    fn apply(&mut self, fragment: ContextFragment, now: DateTime<Utc>) -> bool {
        let source = fragment.source();
        if let Some((stored_observed, _)) = self.stamps(source) {
            if stored_observed > fragment.observed_at {
                return false;
            }
        }

        let ContextFragment {
            instrument,
            observed_at,
            section,
        } = fragment;

        self.offer_instrument(instrument, observed_at);

        match section {
            FragmentSection::Regime(value) => {
                self.regime = Some(Stamped { value, observed_at, received_at: now })
            }
            FragmentSection::Expert(value) => {
                self.expert = Some(Stamped { value, observed_at, received_at: now })
            }
            FragmentSection::Alignment(value) => {
                self.alignment = Some(Stamped { value, observed_at, received_at: now })
            }
            FragmentSection::Structure(value) => {
                self.structure = Some(Stamped { value, observed_at, received_at: now })
            }
        }
        true
    }

    fn offer_instrument(&mut self, candidate: Instrument, observed_at: DateTime<Utc>) {
        let replace = match &self.instrument {
            None => true,
            Some((current, current_at)) => match observed_at.cmp(current_at) {
                Ordering::Greater => true,
                Ordering::Less => false,
                Ordering::Equal => instrument_rank(&candidate, current) == Ordering::Greater,
            },
        };
        if replace {
            self.instrument = Some((candidate, observed_at));
        }
    }

    fn to_context(&self) -> Option<AggregatedContext> {
        if self.is_empty() {
            return None;
        }
        let (instrument, _) = self.instrument.as_ref()?;
        Some(AggregatedContext {
            instrument: instrument.clone(),
            regime: self.regime.as_ref().map(|s| s.value.clone()),
            expert: self.expert.as_ref().map(|s| s.value.clone()),
            alignment: self.alignment.as_ref().map(|s| s.value.clone()),
            structure: self.structure.as_ref().map(|s| s.value.clone()),
            last_updated: self.last_updated(),
        })
    }
}

/// Tie-break for instruments stamped at the same instant: prefer a known
/// exchange, then a reported price, then the higher price, then exchange name.
fn instrument_rank(a: &Instrument, b: &Instrument) -> Ordering {
    let known = |i: &Instrument| i.exchange != UNKNOWN_EXCHANGE;
    known(a)
        .cmp(&known(b))
        .then_with(|| a.last_price.is_some().cmp(&b.last_price.is_some()))
        .then_with(|| {
            a.last_price
                .unwrap_or(0.0)
                .total_cmp(&b.last_price.unwrap_or(0.0))
        })
        .then_with(|| a.exchange.cmp(&b.exchange))
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

pub struct ContextAggregator {
    rule: CompletenessRule,
    clock: Arc<dyn Clock>,
    symbols: RwLock<HashMap<String, Arc<Mutex<SymbolContext>>>>,
}

impl ContextAggregator {
    /// Build an aggregator; the completeness rule is validated up front.
    pub fn new(rule: CompletenessRule, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        rule.validate()?;
        info!(
            required = ?rule.required_sources,
            optional = ?rule.optional_sources,
            primary = ?rule.primary_sources,
            max_age_secs = rule.max_age_secs,
            "context aggregator ready"
        );
        Ok(Self {
            rule,
            clock,
            symbols: RwLock::new(HashMap::new()),
        })
    }

    pub fn rule(&self) -> &CompletenessRule {
        &self.rule
    }

    fn existing(&self, symbol: &str) -> Option<Arc<Mutex<SymbolContext>>> {
        self.symbols.read().get(&canonical_symbol(symbol)).cloned()
    }

    fn entry(&self, symbol: &str) -> Arc<Mutex<SymbolContext>> {
        if let Some(ctx) = self.symbols.read().get(symbol) {
            return ctx.clone();
        }
        self.symbols
            .write()
            .entry(symbol.to_string())
            .or_default()
            .clone()
    }

    /// Merge one fragment into its symbol's context.
    pub fn merge(&self, fragment: ContextFragment) -> MergeOutcome {
        let symbol = canonical_symbol(fragment.symbol());
        let source = fragment.source();
        let slot = self.entry(&symbol);

        let mut ctx = slot.lock();
        let now = self.clock.now();
        ctx.expire(now, self.rule.max_age());

        let before = self.state_of(&ctx, now);
        let applied = ctx.apply(fragment, now);
        let state = self.state_of(&ctx, now);
        let completeness = self.completeness_of(&ctx);
        let missing = self.missing_of(&ctx);
        let snapshot = if state == ContextState::Complete {
            self.snapshot_of(&ctx, now)
        } else {
            None
        };

        if !applied {
            debug!(%symbol, %source, "fragment older than stored section, ignored");
        } else if before != ContextState::Complete && state == ContextState::Complete {
            info!(%symbol, %source, completeness, "context complete");
        } else {
            debug!(%symbol, %source, %state, completeness, "fragment merged");
        }

        MergeOutcome {
            symbol,
            source,
            applied,
            state,
            completeness,
            missing,
            snapshot,
        }
    }

    /// Whether the completeness rule currently holds for `symbol`.
    pub fn is_complete(&self, symbol: &str) -> bool {
        self.with_expired(symbol, |agg, ctx, now| {
            agg.state_of(ctx, now) == ContextState::Complete
        })
        .unwrap_or(false)
    }

    /// Deep copy of the fresh context, or `None` if nothing fresh is held.
    pub fn snapshot(&self, symbol: &str) -> Option<ContextSnapshot> {
        self.with_expired(symbol, |agg, ctx, now| agg.snapshot_of(ctx, now))
            .flatten()
    }

    /// Remove fragments older than the max age. Returns how many were removed.
    pub fn expire(&self, symbol: &str) -> usize {
        let Some(slot) = self.existing(symbol) else {
            return 0;
        };
        let mut ctx = slot.lock();
        let removed = ctx.expire(self.clock.now(), self.rule.max_age());
        if removed > 0 {
            debug!(symbol, removed, "expired stale fragments");
        }
        removed
    }

    pub fn state(&self, symbol: &str) -> ContextState {
        self.with_expired(symbol, |agg, ctx, now| agg.state_of(ctx, now))
            .unwrap_or(ContextState::Empty)
    }

    /// Sources still needed before the symbol is complete.
    pub fn missing_sources(&self, symbol: &str) -> Vec<SourceName> {
        self.with_expired(symbol, |agg, ctx, _| agg.missing_of(ctx))
            .unwrap_or_else(|| {
                self.rule
                    .required_sources
                    .union(&self.rule.primary_sources)
                    .copied()
                    .collect()
            })
    }

    /// Forget symbols with no fresh data left. Returns how many were dropped.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let max_age = self.rule.max_age();
        let mut map = self.symbols.write();
        let before = map.len();
        map.retain(|_, slot| {
            // An outstanding clone means a merge is in flight on this entry.
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            let mut ctx = slot.lock();
            ctx.expire(now, max_age);
            !ctx.is_empty()
        });
        let dropped = before - map.len();
        if dropped > 0 {
            debug!(dropped, remaining = map.len(), "context sweep");
        }
        dropped
    }

    pub fn tracked_symbols(&self) -> usize {
        self.symbols.read().len()
    }

    // ── internals ───────────────────────────────────────────────────────

    fn with_expired<R>(
        &self,
        symbol: &str,
        f: impl FnOnce(&Self, &SymbolContext, DateTime<Utc>) -> R,
    ) -> Option<R> {
        let slot = self.existing(symbol)?;
        let mut ctx = slot.lock();
        let now = self.clock.now();
        ctx.expire(now, self.rule.max_age());
        Some(f(self, &*ctx, now))
    }

    fn fresh_sources(&self, ctx: &SymbolContext) -> BTreeSet<SourceName> {
        SourceName::ALL
            .into_iter()
            .filter(|s| ctx.stamps(*s).is_some())
            .collect()
    }

    fn missing_of(&self, ctx: &SymbolContext) -> Vec<SourceName> {
        let fresh = self.fresh_sources(ctx);
        let mut missing: BTreeSet<SourceName> = self
            .rule
            .required_sources
            .difference(&fresh)
            .copied()
            .collect();
        if self.rule.primary_sources.is_disjoint(&fresh) {
            missing.extend(self.rule.primary_sources.iter().copied());
        }
        missing.into_iter().collect()
    }

    fn state_of(&self, ctx: &SymbolContext, _now: DateTime<Utc>) -> ContextState {
        if ctx.is_empty() {
            return ContextState::Expired;
        }
        if self.missing_of(ctx).is_empty() {
            ContextState::Complete
        } else {
            ContextState::Partial
        }
    }

    fn completeness_of(&self, ctx: &SymbolContext) -> f64 {
        let known = self.rule.known_sources();
        if known.is_empty() {
            return 0.0;
        }
        let fresh = self.fresh_sources(ctx);
        known.intersection(&fresh).count() as f64 / known.len() as f64
    }

    fn snapshot_of(&self, ctx: &SymbolContext, now: DateTime<Utc>) -> Option<ContextSnapshot> {
        let context = ctx.to_context()?;
        Some(ContextSnapshot {
            context,
            completeness: self.completeness_of(ctx),
            complete: self.state_of(ctx, now) == ContextState::Complete,
            taken_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::context::snapshot::RiskRatios;
    use crate::types::{Bias, Direction, ExecutionGrade, QualityTier};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 14, 0, 0).unwrap()
    }

    fn instrument(price: Option<f64>) -> Instrument {
        Instrument {
            symbol: "BTCUSDT".into(),
            exchange: "BINANCE".into(),
            last_price: price,
        }
    }

    fn regime_frag(at: DateTime<Utc>, confidence: f64) -> ContextFragment {
        ContextFragment {
            instrument: instrument(Some(100.0)),
            observed_at: at,
            section: FragmentSection::Regime(RegimeSection {
                bias: Bias::Bullish,
                phase: Some("MARKUP".into()),
                phase_confidence: confidence,
            }),
        }
    }

    fn expert_frag(at: DateTime<Utc>) -> ContextFragment {
        ContextFragment {
            instrument: instrument(Some(101.0)),
            observed_at: at,
            section: FragmentSection::Expert(ExpertSection {
                direction: Direction::Long,
                ai_score: 9.5,
                quality: QualityTier::Extreme,
                risk: RiskRatios::default(),
                timeframe: None,
            }),
        }
    }

    fn structure_frag(at: DateTime<Utc>) -> ContextFragment {
        ContextFragment {
            instrument: instrument(None),
            observed_at: at,
            section: FragmentSection::Structure(StructureSection {
                valid_setup: true,
                execution_quality: ExecutionGrade::A,
            }),
        }
    }

    fn rule(required: &[SourceName]) -> CompletenessRule {
        let required: BTreeSet<SourceName> = required.iter().copied().collect();
        CompletenessRule {
            optional_sources: SourceName::ALL
                .into_iter()
                .filter(|s| !required.contains(s))
                .collect(),
            required_sources: required,
            primary_sources: [SourceName::ExpertSignal].into_iter().collect(),
            max_age_secs: 300,
        }
    }

    fn aggregator(required: &[SourceName]) -> (ContextAggregator, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(t0()));
        let agg = ContextAggregator::new(rule(required), clock.clone()).unwrap();
        (agg, clock)
    }

    #[test]
    fn expert_only_completes_when_expert_required() {
        let (agg, _) = aggregator(&[SourceName::ExpertSignal]);
        let outcome = agg.merge(expert_frag(t0()));
        assert!(outcome.applied);
        assert_eq!(outcome.state, ContextState::Complete);
        assert!(outcome.missing.is_empty());
        assert!(outcome.snapshot.is_some());
        assert!(agg.is_complete("BTCUSDT"));
    }

    #[test]
    fn expert_only_stays_partial_when_regime_required() {
        let (agg, clock) = aggregator(&[SourceName::Regime]);
        agg.merge(expert_frag(t0()));
        assert!(!agg.is_complete("BTCUSDT"));
        assert_eq!(agg.missing_sources("BTCUSDT"), vec![SourceName::Regime]);

        // Elapsed time alone never completes it.
        clock.advance(Duration::seconds(120));
        assert!(!agg.is_complete("BTCUSDT"));

        agg.merge(regime_frag(clock.now(), 90.0));
        assert!(agg.is_complete("BTCUSDT"));
    }

    #[test]
    fn merge_is_commutative_across_sources() {
        let (a, _) = aggregator(&[SourceName::ExpertSignal]);
        a.merge(regime_frag(t0(), 80.0));
        a.merge(expert_frag(t0()));
        a.merge(structure_frag(t0()));

        let (b, _) = aggregator(&[SourceName::ExpertSignal]);
        b.merge(structure_frag(t0()));
        b.merge(expert_frag(t0()));
        b.merge(regime_frag(t0(), 80.0));

        assert_eq!(a.snapshot("BTCUSDT"), b.snapshot("BTCUSDT"));
        // Equal timestamps resolve to the highest reported price.
        let snap = a.snapshot("BTCUSDT").unwrap();
        assert_eq!(snap.context.instrument.last_price, Some(101.0));
    }

    #[test]
    fn merge_is_idempotent() {
        let (agg, _) = aggregator(&[SourceName::ExpertSignal]);
        agg.merge(expert_frag(t0()));
        let once = agg.snapshot("BTCUSDT");
        agg.merge(expert_frag(t0()));
        assert_eq!(agg.snapshot("BTCUSDT"), once);
    }

    #[test]
    fn older_fragment_is_not_applied() {
        let (agg, clock) = aggregator(&[SourceName::ExpertSignal]);
        agg.merge(regime_frag(t0(), 80.0));
        clock.advance(Duration::seconds(10));
        let outcome = agg.merge(regime_frag(t0() - Duration::seconds(30), 20.0));
        assert!(!outcome.applied);

        agg.merge(expert_frag(clock.now()));
        let snap = agg.snapshot("BTCUSDT").unwrap();
        assert_eq!(snap.context.regime.unwrap().phase_confidence, 80.0);
        // Freshness was not refreshed by the ignored fragment.
        assert_eq!(snap.context.last_updated[&SourceName::Regime], t0());
    }

    #[test]
    fn future_stamped_fragment_does_not_block_live_updates() {
        use crate::context::FieldNormalizer;
        use serde_json::json;

        let (agg, clock) = aggregator(&[SourceName::ExpertSignal]);
        let ahead = (t0() + Duration::hours(1)).to_rfc3339();
        let stale = json!({ "symbol": "BTCUSDT", "direction": "LONG", "timestamp": ahead });
        let frag = FieldNormalizer::normalize(&stale, SourceName::ExpertSignal, clock.now()).unwrap();
        assert!(agg.merge(frag).applied);

        for _ in 0..15 {
            clock.advance(Duration::minutes(1));
            let live = json!({
                "symbol": "BTCUSDT",
                "direction": "SHORT",
                "timestamp": clock.now().to_rfc3339()
            });
            let frag =
                FieldNormalizer::normalize(&live, SourceName::ExpertSignal, clock.now()).unwrap();
            assert!(agg.merge(frag).applied);
        }

        let snap = agg.snapshot("BTCUSDT").unwrap();
        assert_eq!(snap.context.expert.unwrap().direction, Direction::Short);
        assert_eq!(snap.context.last_updated[&SourceName::ExpertSignal], clock.now());
    }

    #[test]
    fn sources_age_out_and_symbol_cycles() {
        let (agg, clock) = aggregator(&[SourceName::ExpertSignal]);
        agg.merge(expert_frag(t0()));
        assert_eq!(agg.state("BTCUSDT"), ContextState::Complete);

        clock.advance(Duration::seconds(301));
        assert!(!agg.is_complete("BTCUSDT"));
        assert_eq!(agg.state("BTCUSDT"), ContextState::Expired);
        assert!(agg.snapshot("BTCUSDT").is_none());

        agg.merge(expert_frag(clock.now()));
        assert_eq!(agg.state("BTCUSDT"), ContextState::Complete);
    }

    #[test]
    fn stale_source_is_treated_as_absent() {
        let (agg, clock) = aggregator(&[SourceName::ExpertSignal]);
        agg.merge(regime_frag(t0(), 80.0));
        clock.advance(Duration::seconds(200));
        agg.merge(expert_frag(clock.now()));
        clock.advance(Duration::seconds(200));

        let snap = agg.snapshot("BTCUSDT").unwrap();
        assert!(snap.context.regime.is_none());
        assert!(snap.context.expert.is_some());
        assert!(!snap.context.last_updated.contains_key(&SourceName::Regime));
    }

    #[test]
    fn expire_counts_removed_fragments() {
        let (agg, clock) = aggregator(&[SourceName::ExpertSignal]);
        agg.merge(regime_frag(t0(), 80.0));
        agg.merge(structure_frag(t0()));
        clock.advance(Duration::seconds(400));
        assert_eq!(agg.expire("BTCUSDT"), 2);
        assert_eq!(agg.expire("BTCUSDT"), 0);
        assert_eq!(agg.expire("UNKNOWN"), 0);
    }

    #[test]
    fn completeness_ratio_counts_fresh_known_sources() {
        let (agg, _) = aggregator(&[SourceName::ExpertSignal]);
        agg.merge(expert_frag(t0()));
        agg.merge(regime_frag(t0(), 80.0));
        let snap = agg.snapshot("BTCUSDT").unwrap();
        assert!((snap.completeness - 0.5).abs() < 1e-9);
        assert!(snap.complete);
    }

    #[test]
    fn snapshot_absent_for_unknown_symbol() {
        let (agg, _) = aggregator(&[SourceName::ExpertSignal]);
        assert!(agg.snapshot("ETHUSDT").is_none());
        assert_eq!(agg.state("ETHUSDT"), ContextState::Empty);
        assert_eq!(agg.missing_sources("ETHUSDT"), vec![SourceName::ExpertSignal]);
    }

    #[test]
    fn snapshot_is_isolated_from_later_merges() {
        let (agg, _) = aggregator(&[SourceName::ExpertSignal]);
        agg.merge(expert_frag(t0()));
        let snap = agg.snapshot("BTCUSDT").unwrap();
        agg.merge(regime_frag(t0(), 70.0));
        assert!(snap.context.regime.is_none());
        assert!(agg.snapshot("BTCUSDT").unwrap().context.regime.is_some());
    }

    #[test]
    fn symbol_lookup_is_canonical() {
        let (agg, _) = aggregator(&[SourceName::ExpertSignal]);
        agg.merge(expert_frag(t0()));
        assert!(agg.is_complete("binance:btcusdt"));
    }

    #[test]
    fn sweep_drops_symbols_without_fresh_data() {
        let (agg, clock) = aggregator(&[SourceName::ExpertSignal]);
        agg.merge(expert_frag(t0()));
        assert_eq!(agg.sweep(), 0);
        clock.advance(Duration::seconds(301));
        assert_eq!(agg.sweep(), 1);
        assert_eq!(agg.tracked_symbols(), 0);
        assert_eq!(agg.state("BTCUSDT"), ContextState::Empty);
    }

    #[test]
    fn concurrent_merges_for_one_symbol_all_land() {
        let (agg, _) = aggregator(&[SourceName::ExpertSignal]);
        std::thread::scope(|s| {
            s.spawn(|| agg.merge(regime_frag(t0(), 80.0)));
            s.spawn(|| agg.merge(expert_frag(t0())));
            s.spawn(|| agg.merge(structure_frag(t0())));
        });
        let snap = agg.snapshot("BTCUSDT").unwrap();
        assert!(snap.context.regime.is_some());
        assert!(snap.context.expert.is_some());
        assert!(snap.context.structure.is_some());
    }

    #[test]
    fn invalid_rule_is_rejected() {
        let mut bad = rule(&[SourceName::ExpertSignal]);
        bad.max_age_secs = 0;
        let clock = Arc::new(ManualClock::new(t0()));
        assert!(matches!(
            ContextAggregator::new(bad, clock),
            Err(ConfigError::ZeroMaxAge)
        ));
    }
}
