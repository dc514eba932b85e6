// =============================================================================
// Metrics Providers — vendor adapters behind one async interface
// =============================================================================
//
// A provider answers for one or more metric sections. Timeouts and retries
// are not its concern: the fetcher bounds every call with the decision
// budget and drops the future when the budget runs out.
//
// `HttpMetricsProvider` expects a vendor gateway exposing
//   GET {base}/options?symbol=SYM
//   GET {base}/liquidity?symbol=SYM
//   GET {base}/stats?symbol=SYM
// each returning a JSON object (optionally wrapped in `{"data": ...}`).

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{DerivativesMetrics, LiquidityMetrics, VolatilityStats};

#[async_trait]
pub trait MetricsProvider: Send + Sync {
    /// Short label used in error strings and logs.
    fn name(&self) -> &str;

    async fn fetch_options(&self, symbol: &str) -> Result<DerivativesMetrics>;

    async fn fetch_liquidity(&self, symbol: &str) -> Result<LiquidityMetrics>;

    async fn fetch_stats(&self, symbol: &str) -> Result<VolatilityStats>;
}

/// JSON-over-HTTP provider.
pub struct HttpMetricsProvider {
    name: String,
    base_url: String,
    client: reqwest::Client,
}

impl HttpMetricsProvider {
    /// Build a provider with its own client. `timeout` is a transport-level
    /// ceiling; the fetcher's budget normally fires first.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let name = name.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .with_context(|| format!("failed to build HTTP client for provider {name}"))?;
        Ok(Self::with_client(name, base_url, client))
    }

    /// Create a provider that re-uses an existing HTTP client.
    pub fn with_client(
        name: impl Into<String>,
        base_url: impl Into<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn get_section<T: DeserializeOwned>(&self, path: &str, symbol: &str) -> Result<T> {
        let url = self.endpoint(path);
        let resp = self
            .client
            .get(&url)
            .query(&[("symbol", symbol)])
            .send()
            .await
            .with_context(|| format!("GET {path} for {symbol}"))?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .with_context(|| format!("failed to parse {path} response body"))?;

        if !status.is_success() {
            anyhow::bail!("{} API returned {}: {}", path, status, body);
        }

        let section = match body.get("data") {
            Some(inner) if inner.is_object() => inner.clone(),
            _ => body,
        };
        if !section.is_object() {
            anyhow::bail!("{path} response is not an object");
        }

        debug!(provider = %self.name, path, symbol, "section fetched");
        serde_json::from_value(section).with_context(|| format!("malformed {path} section"))
    }
}

#[async_trait]
impl MetricsProvider for HttpMetricsProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_options(&self, symbol: &str) -> Result<DerivativesMetrics> {
        self.get_section("options", symbol).await
    }

    async fn fetch_liquidity(&self, symbol: &str) -> Result<LiquidityMetrics> {
        self.get_section("liquidity", symbol).await
    }

    async fn fetch_stats(&self, symbol: &str) -> Result<VolatilityStats> {
        self.get_section("stats", symbol).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_trims_trailing_slash() {
        let p = HttpMetricsProvider::new("vendor", "http://localhost:9000/", Duration::from_secs(1))
            .unwrap();
        assert_eq!(p.endpoint("stats"), "http://localhost:9000/stats");
        assert_eq!(p.name(), "vendor");
    }

    #[tokio::test]
    async fn unreachable_gateway_is_an_error_not_a_panic() {
        // Port 9 (discard) on localhost is not expected to serve HTTP.
        let p = HttpMetricsProvider::new("vendor", "http://127.0.0.1:9", Duration::from_millis(300))
            .unwrap();
        assert!(p.fetch_liquidity("BTCUSDT").await.is_err());
    }
}
