// =============================================================================
// Aurora Confluence — Main Entry Point
// =============================================================================
//
// Composition root. Reads newline-delimited JSON producer payloads from
// stdin, ingests each one, and writes a decision packet as a JSON line to
// stdout whenever a payload completes a symbol's context. Logs go to stderr.
//
// Environment:
//   CONFLUENCE_RULES_PATH        rule config JSON (default rules.json)
//   CONFLUENCE_METRICS_URL       gateway serving every metric section
//   CONFLUENCE_OPTIONS_URL       per-section overrides of the above
//   CONFLUENCE_LIQUIDITY_URL
//   CONFLUENCE_STATS_URL
//   CONFLUENCE_DECISION_LOG      optional file to append packets to
//   CONFLUENCE_REQUIRED_SOURCES  completeness overrides (comma-separated)
//   CONFLUENCE_OPTIONAL_SOURCES
//   CONFLUENCE_PRIMARY_SOURCES
//   CONFLUENCE_MAX_AGE_SECS
// =============================================================================

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use aurora_confluence::market_metrics::{HttpMetricsProvider, MetricSection};
use aurora_confluence::{
    CompletenessOverrides, ConfluencePipeline, DecisionLedger, DecisionSink, FanoutSink,
    JsonLinesSink, ProviderBinding, RuleConfig, SystemClock,
};

const SWEEP_INTERVAL_SECS: u64 = 60;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & logging ─────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Aurora Confluence starting up");

    // ── 2. Rules ─────────────────────────────────────────────────────────
    let rules_path =
        std::env::var("CONFLUENCE_RULES_PATH").unwrap_or_else(|_| "rules.json".into());
    let mut config = if Path::new(&rules_path).exists() {
        RuleConfig::load(&rules_path)?
    } else {
        warn!(path = %rules_path, "rule config not found, using defaults");
        RuleConfig::default()
    };

    let overrides = CompletenessOverrides::from_env()?;
    config.completeness = config.completeness.with_overrides(&overrides);
    if let Err(e) = config.validate() {
        error!(error = %e, "rule config is self-contradictory, refusing to start");
        return Err(e.into());
    }

    info!(
        rules_version = %config.rules_version,
        required = ?config.completeness.required_sources,
        optional = ?config.completeness.optional_sources,
        max_age_secs = config.completeness.max_age_secs,
        "rules active"
    );

    // ── 3. Metrics providers ─────────────────────────────────────────────
    let bindings = provider_bindings(config.fetch.budget())?;
    if bindings.is_empty() {
        warn!("no metrics providers configured; market gate will see fallback values only");
    }

    // ── 4. Sinks ─────────────────────────────────────────────────────────
    let ledger = Arc::new(DecisionLedger::new());
    let mut sinks = FanoutSink::new(vec![
        ledger.clone() as Arc<dyn DecisionSink>,
        Arc::new(JsonLinesSink::new(std::io::stdout())),
    ]);
    if let Ok(path) = std::env::var("CONFLUENCE_DECISION_LOG") {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open decision log {path}"))?;
        info!(path = %path, "appending decisions to file");
        sinks.push(Arc::new(JsonLinesSink::new(file)));
    }

    // ── 5. Pipeline ──────────────────────────────────────────────────────
    let pipeline = Arc::new(ConfluencePipeline::new(
        config,
        bindings,
        Arc::new(sinks),
        Arc::new(SystemClock),
    )?);

    // ── 6. Opportunistic sweep ───────────────────────────────────────────
    {
        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(SWEEP_INTERVAL_SECS));
            loop {
                interval.tick().await;
                let dropped = pipeline.sweep();
                debug!(
                    dropped,
                    tracked = pipeline.aggregator().tracked_symbols(),
                    "context sweep tick"
                );
            }
        });
    }

    // ── 7. Input loop ────────────────────────────────────────────────────
    info!("reading payloads from stdin; Ctrl+C to stop");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut in_flight = JoinSet::new();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let line = line.trim().to_string();
                    if line.is_empty() {
                        continue;
                    }
                    let pipeline = pipeline.clone();
                    in_flight.spawn(async move { handle_line(&pipeline, &line).await });
                }
                Ok(None) => {
                    info!("input closed");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "failed to read stdin");
                    break;
                }
            },
            _ = &mut shutdown => {
                warn!("Shutdown signal received, stopping");
                in_flight.abort_all();
                break;
            }
        }
    }

    while in_flight.join_next().await.is_some() {}

    let stats = ledger.stats();
    info!(
        total = stats.total,
        execute = stats.execute,
        wait = stats.wait,
        skip = stats.skip,
        "Aurora Confluence shut down complete"
    );
    Ok(())
}

/// One HTTP provider per section, from the per-section URL or the shared one.
fn provider_bindings(budget: Duration) -> anyhow::Result<Vec<ProviderBinding>> {
    let shared = std::env::var("CONFLUENCE_METRICS_URL").ok();
    let mut bindings = Vec::new();

    for (section, name, var) in [
        (MetricSection::Derivatives, "options", "CONFLUENCE_OPTIONS_URL"),
        (MetricSection::Liquidity, "liquidity", "CONFLUENCE_LIQUIDITY_URL"),
        (MetricSection::Statistics, "stats", "CONFLUENCE_STATS_URL"),
    ] {
        let Some(url) = std::env::var(var).ok().or_else(|| shared.clone()) else {
            warn!(%section, "no provider URL, section will use fallback values");
            continue;
        };
        info!(%section, url = %url, "metrics provider configured");
        let provider = HttpMetricsProvider::new(name, url, budget)?;
        bindings.push(ProviderBinding::new(section, Arc::new(provider)));
    }

    Ok(bindings)
}

async fn handle_line(pipeline: &ConfluencePipeline, line: &str) {
    let payload: serde_json::Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "skipping malformed JSON line");
            return;
        }
    };

    match pipeline.process(&payload).await {
        Ok(Some(packet)) => debug!(id = %packet.id, symbol = %packet.symbol, "packet emitted"),
        Ok(None) => {}
        Err(e) => warn!(error = %e, "payload rejected"),
    }
}
