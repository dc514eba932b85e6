// =============================================================================
// Aurora Confluence — context aggregation and gate-based decisions
// =============================================================================
//
// Partial signals from independent producers (regime, expert signal, trend
// alignment, structure check) are merged per symbol. Once the configured
// sources are fresh, live market metrics are fetched and three gates plus a
// weighted confidence score produce an EXECUTE / WAIT / SKIP packet.
// =============================================================================

pub mod clock;
pub mod context;
pub mod decision;
pub mod errors;
pub mod market_metrics;
pub mod pipeline;
pub mod rule_config;
pub mod sink;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use context::{ContextAggregator, ContextSnapshot, ContextState, FieldNormalizer, SourceClassifier};
pub use decision::{DecisionEngine, DecisionPacket};
pub use errors::{ConfigError, DecideError, IngestError, ProcessError};
pub use market_metrics::{MarketMetrics, MarketMetricsFetcher, MetricsProvider, ProviderBinding};
pub use pipeline::{ConfluencePipeline, IngestOutcome};
pub use rule_config::{CompletenessOverrides, CompletenessRule, RuleConfig};
pub use sink::{DecisionLedger, DecisionSink, FanoutSink, JsonLinesSink};
pub use types::{Action, Bias, Direction, SourceName};
