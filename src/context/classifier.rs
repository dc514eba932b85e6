// =============================================================================
// Source Classifier — identify the producer of a raw payload by its shape
// =============================================================================
//
// Detection walks an ordered fingerprint table; the first producer with any
// fingerprint key present wins. Order matters: structure and alignment
// payloads often also carry a `bias` or `direction`, so the more specific
// fingerprints are checked first.
//
// Classification never panics on malformed input. Failures carry a best
// guess built from weaker hint keys so the caller can route or log them.
// =============================================================================

use serde_json::Value;
use tracing::debug;

use crate::context::payload;
use crate::errors::ClassificationFailure;
use crate::types::SourceName;

struct Fingerprint {
    source: SourceName,
    /// Any of these present identifies the producer.
    keys: &'static [&'static str],
    /// Weaker hints, only used for the best-guess diagnostic.
    hints: &'static [&'static str],
}

const FINGERPRINTS: &[Fingerprint] = &[
    Fingerprint {
        source: SourceName::StructureCheck,
        keys: &[
            "structure.validSetup",
            "structure.valid_setup",
            "validSetup",
            "valid_setup",
            "setup.valid",
        ],
        hints: &["structure", "setup", "executionQuality", "execution_quality"],
    },
    Fingerprint {
        source: SourceName::TrendAlignment,
        keys: &[
            "timeframes",
            "alignment.timeframes",
            "bullishPct",
            "bullish_pct",
            "alignment.bullishPct",
            "alignment.bullish_pct",
            "bearishPct",
            "bearish_pct",
            "alignment.bearishPct",
            "alignment.bearish_pct",
            "trends",
        ],
        hints: &["alignment", "mtf"],
    },
    Fingerprint {
        source: SourceName::Regime,
        keys: &[
            "phase",
            "phaseConfidence",
            "phase_confidence",
            // Nested object or a bare phase name.
            "regime",
        ],
        hints: &["bias", "confidence"],
    },
    Fingerprint {
        source: SourceName::ExpertSignal,
        keys: &[
            "signal.direction",
            "signal.side",
            "signal.action",
            "signal.type",
            "signal.aiScore",
            "signal.ai_score",
            "aiScore",
            "ai_score",
            // Bare directional keys are checked last so the richer
            // producers above claim them first.
            "direction",
            "side",
        ],
        hints: &["signal", "action", "quality", "stopLoss", "takeProfit"],
    },
];

pub struct SourceClassifier;

impl SourceClassifier {
    /// Identify which producer `payload` came from.
    pub fn classify(payload: &Value) -> Result<SourceName, ClassificationFailure> {
        if !payload.is_object() {
            return Err(ClassificationFailure {
                best_guess: format!("payload is not a JSON object (found {})", kind_of(payload)),
            });
        }

        if let Some(fp) = FINGERPRINTS
            .iter()
            .find(|fp| payload::has_any(payload, fp.keys))
        {
            debug!(source = %fp.source, "payload classified");
            return Ok(fp.source);
        }

        Err(ClassificationFailure {
            best_guess: Self::best_guess(payload),
        })
    }

    fn best_guess(payload: &Value) -> String {
        let keys = payload::top_level_keys(payload);

        // Highest hint count wins; ties keep table order.
        let mut best: Option<(SourceName, Vec<&str>)> = None;
        for fp in FINGERPRINTS {
            let matched: Vec<&str> = fp
                .hints
                .iter()
                .copied()
                .filter(|h| payload::lookup(payload, h).is_some())
                .collect();
            let better = match &best {
                Some((_, prev)) => matched.len() > prev.len(),
                None => !matched.is_empty(),
            };
            if better {
                best = Some((fp.source, matched));
            }
        }

        match best {
            Some((source, matched)) => format!(
                "closest to {} (matched hints: {}); keys: [{}]",
                source,
                matched.join(", "),
                keys.join(", ")
            ),
            None => format!(
                "no producer fingerprint matched; keys: [{}]",
                keys.join(", ")
            ),
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_each_producer() {
        let regime = json!({ "symbol": "BTCUSDT", "phase": "MARKUP", "bias": "BULLISH" });
        let expert = json!({ "symbol": "BTCUSDT", "signal": { "direction": "LONG", "aiScore": 9.1 } });
        let align = json!({ "symbol": "BTCUSDT", "timeframes": { "1h": "BULLISH" } });
        let structure = json!({ "symbol": "BTCUSDT", "structure": { "validSetup": true } });

        assert_eq!(SourceClassifier::classify(&regime), Ok(SourceName::Regime));
        assert_eq!(SourceClassifier::classify(&expert), Ok(SourceName::ExpertSignal));
        assert_eq!(SourceClassifier::classify(&align), Ok(SourceName::TrendAlignment));
        assert_eq!(SourceClassifier::classify(&structure), Ok(SourceName::StructureCheck));
    }

    #[test]
    fn every_normalizable_shape_is_routable() {
        let cases = [
            (json!({ "symbol": "BTCUSDT", "signal": { "side": "BUY" } }), SourceName::ExpertSignal),
            (json!({ "symbol": "BTCUSDT", "signal": { "action": "SELL" } }), SourceName::ExpertSignal),
            (json!({ "symbol": "BTCUSDT", "signal": { "type": "LONG" } }), SourceName::ExpertSignal),
            (json!({ "symbol": "BTCUSDT", "direction": "LONG" }), SourceName::ExpertSignal),
            (json!({ "symbol": "SOLUSDT", "side": "SELL", "quality": "high" }), SourceName::ExpertSignal),
            (json!({ "symbol": "BTCUSDT", "trends": { "4h": "BULLISH" } }), SourceName::TrendAlignment),
            (
                json!({ "symbol": "BTCUSDT", "regime": { "bias": "BULLISH", "confidence": 80 } }),
                SourceName::Regime,
            ),
            (json!({ "symbol": "BTCUSDT", "regime": "MARKUP" }), SourceName::Regime),
            (json!({ "symbol": "BTCUSDT", "bearishPct": 70 }), SourceName::TrendAlignment),
        ];
        for (payload, expected) in cases {
            assert_eq!(SourceClassifier::classify(&payload), Ok(expected), "{payload}");
        }
    }

    #[test]
    fn regime_with_direction_is_not_taken_for_a_signal() {
        let regime = json!({ "symbol": "BTCUSDT", "phase": "MARKDOWN", "direction": "SHORT" });
        assert_eq!(SourceClassifier::classify(&regime), Ok(SourceName::Regime));
    }

    #[test]
    fn first_match_wins() {
        // Carries both structure and expert keys; structure is checked first.
        let mixed = json!({ "symbol": "ETHUSDT", "validSetup": false, "aiScore": 7.0 });
        assert_eq!(SourceClassifier::classify(&mixed), Ok(SourceName::StructureCheck));
    }

    #[test]
    fn unrecognized_payload_reports_best_guess() {
        let vague = json!({ "symbol": "BTCUSDT", "bias": "BEARISH" });
        let err = SourceClassifier::classify(&vague).unwrap_err();
        assert!(err.best_guess.starts_with("closest to REGIME"), "{}", err.best_guess);
        assert!(err.best_guess.contains("symbol"));
    }

    #[test]
    fn unrecognized_without_hints_lists_keys() {
        let junk = json!({ "hello": "world" });
        let err = SourceClassifier::classify(&junk).unwrap_err();
        assert_eq!(err.best_guess, "no producer fingerprint matched; keys: [hello]");
    }

    #[test]
    fn non_object_payload_does_not_panic() {
        for payload in [json!(null), json!([1, 2]), json!("text"), json!(42)] {
            assert!(SourceClassifier::classify(&payload).is_err());
        }
    }
}
