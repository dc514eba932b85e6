// =============================================================================
// Market Metrics Fetcher — concurrent, budget-bounded provider fan-out
// =============================================================================
//
// One call per provider binding, all issued at once and joined. Each call is
// wrapped in `tokio::time::timeout(budget)`; on expiry the future is dropped,
// which cancels the in-flight request. The join therefore settles within the
// budget no matter how a provider behaves.
//
// Per section, the first binding (in configuration order) that succeeded
// supplies the value; otherwise the section's fallback is used.
//
// Successful responses are cached per (binding, symbol) for a short TTL.
// The cache is keyed on the injected clock so expiry is testable. Expired
// entries are pruned on every insert and by `sweep`, so symbols that are
// never asked for again do not accumulate. A zero TTL disables the cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::provider::MetricsProvider;
use super::{
    DerivativesMetrics, LiquidityMetrics, MarketMetrics, MetricSection, Origin, VolatilityStats,
};
use crate::clock::Clock;

/// A provider answering for one metric section.
#[derive(Clone)]
pub struct ProviderBinding {
    pub section: MetricSection,
    pub provider: Arc<dyn MetricsProvider>,
}

impl ProviderBinding {
    pub fn new(section: MetricSection, provider: Arc<dyn MetricsProvider>) -> Self {
        Self { section, provider }
    }

    async fn call(&self, symbol: &str) -> anyhow::Result<SectionValue> {
        Ok(match self.section {
            MetricSection::Derivatives => {
                SectionValue::Derivatives(self.provider.fetch_options(symbol).await?.sanitized())
            }
            MetricSection::Liquidity => {
                SectionValue::Liquidity(self.provider.fetch_liquidity(symbol).await?.sanitized())
            }
            MetricSection::Statistics => {
                SectionValue::Statistics(self.provider.fetch_stats(symbol).await?.sanitized())
            }
        })
    }
}

#[derive(Debug, Clone)]
enum SectionValue {
    Derivatives(DerivativesMetrics),
    Liquidity(LiquidityMetrics),
    Statistics(VolatilityStats),
}

type CacheKey = (usize, String);

pub struct MarketMetricsFetcher {
    bindings: Vec<ProviderBinding>,
    cache_ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
    cache: Mutex<HashMap<CacheKey, (DateTime<Utc>, SectionValue)>>,
}

impl MarketMetricsFetcher {
    pub fn new(bindings: Vec<ProviderBinding>, cache_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let cache_ttl = chrono::Duration::from_std(cache_ttl).unwrap_or_else(|_| chrono::Duration::zero());
        info!(
            providers = bindings.len(),
            cache_ttl_ms = cache_ttl.num_milliseconds(),
            "market metrics fetcher ready"
        );
        Self {
            bindings,
            cache_ttl,
            clock,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn provider_count(&self) -> usize {
        self.bindings.len()
    }

    /// Number of cached section values, live or expired.
    pub fn cached_entries(&self) -> usize {
        self.cache.lock().len()
    }

    /// Drop cache entries past their TTL. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut cache = self.cache.lock();
        let before = cache.len();
        cache.retain(|_, (stored_at, _)| now - *stored_at < self.cache_ttl);
        before - cache.len()
    }

    /// Query every provider concurrently and assemble a fully populated
    /// `MarketMetrics`. Never fails; provider problems end up in `errors`.
    pub async fn fetch(&self, symbol: &str, budget: Duration) -> MarketMetrics {
        let calls = self
            .bindings
            .iter()
            .enumerate()
            .map(|(idx, binding)| self.fetch_one(idx, binding, symbol, budget));
        let results = join_all(calls).await;

        let mut metrics = MarketMetrics::fallback(symbol);
        let mut succeeded = 0usize;

        for (binding, result) in self.bindings.iter().zip(results) {
            match result {
                Ok(value) => {
                    succeeded += 1;
                    apply_section(&mut metrics, value);
                }
                Err(message) => {
                    warn!(
                        provider = binding.provider.name(),
                        section = %binding.section,
                        symbol,
                        error = %message,
                        "metrics provider failed, using fallback"
                    );
                    metrics.errors.push(format!(
                        "{}/{}: {}",
                        binding.provider.name(),
                        binding.section,
                        message
                    ));
                }
            }
        }

        metrics.completeness = if self.bindings.is_empty() {
            0.0
        } else {
            succeeded as f64 / self.bindings.len() as f64
        };

        debug!(
            symbol,
            completeness = metrics.completeness,
            errors = metrics.errors.len(),
            "market metrics assembled"
        );
        metrics
    }

    async fn fetch_one(
        &self,
        idx: usize,
        binding: &ProviderBinding,
        symbol: &str,
        budget: Duration,
    ) -> Result<SectionValue, String> {
        if let Some(hit) = self.cached(idx, symbol) {
            return Ok(hit);
        }

        match tokio::time::timeout(budget, binding.call(symbol)).await {
            Ok(Ok(value)) => {
                if self.cache_ttl > chrono::Duration::zero() {
                    let now = self.clock.now();
                    let mut cache = self.cache.lock();
                    cache.retain(|_, (stored_at, _)| now - *stored_at < self.cache_ttl);
                    cache.insert((idx, symbol.to_string()), (now, value.clone()));
                }
                Ok(value)
            }
            Ok(Err(e)) => Err(format!("{e:#}")),
            Err(_) => Err(format!("timed out after {}ms", budget.as_millis())),
        }
    }

    fn cached(&self, idx: usize, symbol: &str) -> Option<SectionValue> {
        let now = self.clock.now();
        let mut cache = self.cache.lock();
        let key = (idx, symbol.to_string());
        match cache.get(&key) {
            Some((stored_at, value)) if now - *stored_at < self.cache_ttl => Some(value.clone()),
            Some(_) => {
                cache.remove(&key);
                None
            }
            None => None,
        }
    }
}

/// First live value per section wins; later successes for the same section
/// are ignored.
fn apply_section(metrics: &mut MarketMetrics, value: SectionValue) {
    match value {
        SectionValue::Derivatives(v) if metrics.origins.derivatives == Origin::Fallback => {
            metrics.derivatives = v;
            metrics.origins.derivatives = Origin::Live;
        }
        SectionValue::Liquidity(v) if metrics.origins.liquidity == Origin::Fallback => {
            metrics.liquidity = v;
            metrics.origins.liquidity = Origin::Live;
        }
        SectionValue::Statistics(v) if metrics.origins.statistics == Origin::Fallback => {
            metrics.statistics = v;
            metrics.origins.statistics = Origin::Live;
        }
        _ => {}
    }
}
