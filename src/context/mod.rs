// =============================================================================
// Context Module
// =============================================================================
//
// Turns raw producer payloads into per-symbol aggregated context:
//
//   1. Classifier   - which producer sent this payload
//   2. Normalizer   - vendor JSON into a typed fragment
//   3. Aggregator   - merge fragments, track freshness and completeness

pub mod aggregator;
pub mod classifier;
pub mod normalizer;
pub mod payload;
pub mod snapshot;

pub use aggregator::{ContextAggregator, ContextState, MergeOutcome};
pub use classifier::SourceClassifier;
pub use normalizer::FieldNormalizer;
pub use snapshot::{
    AggregatedContext, AlignmentSection, ContextFragment, ContextSnapshot, ExpertSection,
    FragmentSection, RegimeSection, RiskRatios, StructureSection,
};
