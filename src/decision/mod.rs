// =============================================================================
// Decision Module
// =============================================================================
//
// Turns a context snapshot plus live market metrics into a DecisionPacket:
//
//   1. Gates        - regime, structural, market (pass/fail + score + reasons)
//   2. Confidence   - weighted blend of gate scores and signal strength
//   3. Action       - EXECUTE / WAIT / SKIP from gates and thresholds
//   4. Sizing       - multiplicative factors, phase boost, clamped range

pub mod confidence;
pub mod engine;
pub mod gates;
pub mod packet;
pub mod sizing;

pub use confidence::ConfidenceBreakdown;
pub use engine::DecisionEngine;
pub use gates::GateResult;
pub use packet::{DecisionPacket, GateResults};
pub use sizing::SizingBreakdown;
