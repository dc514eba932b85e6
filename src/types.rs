// =============================================================================
// Shared types used across the Aurora confluence engine
// =============================================================================

use serde::{Deserialize, Serialize};

/// The producers whose events feed the context aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceName {
    Regime,
    ExpertSignal,
    TrendAlignment,
    StructureCheck,
}

impl SourceName {
    pub const ALL: [SourceName; 4] = [
        SourceName::Regime,
        SourceName::ExpertSignal,
        SourceName::TrendAlignment,
        SourceName::StructureCheck,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regime => "REGIME",
            Self::ExpertSignal => "EXPERT_SIGNAL",
            Self::TrendAlignment => "TREND_ALIGNMENT",
            Self::StructureCheck => "STRUCTURE_CHECK",
        }
    }
}

impl std::fmt::Display for SourceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "REGIME" => Ok(Self::Regime),
            "EXPERT_SIGNAL" | "EXPERT" => Ok(Self::ExpertSignal),
            "TREND_ALIGNMENT" | "ALIGNMENT" => Ok(Self::TrendAlignment),
            "STRUCTURE_CHECK" | "STRUCTURE" => Ok(Self::StructureCheck),
            other => Err(format!("unknown source name: {other}")),
        }
    }
}

/// Trade direction carried by an expert signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// The market bias that agrees with this direction.
    pub fn aligned_bias(&self) -> Bias {
        match self {
            Self::Long => Bias::Bullish,
            Self::Short => Bias::Bearish,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
        }
    }
}

/// Directional lean of a regime or timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Bias {
    Bullish,
    Bearish,
    Neutral,
}

impl std::fmt::Display for Bias {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bullish => write!(f, "BULLISH"),
            Self::Bearish => write!(f, "BEARISH"),
            Self::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Quality tier attached to an expert signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QualityTier {
    Extreme,
    High,
    Medium,
    Low,
}

impl QualityTier {
    /// Infer a tier from an AI score on the 0–10.5 scale.
    pub fn from_ai_score(score: f64) -> Self {
        if score >= 9.0 {
            Self::Extreme
        } else if score >= 7.5 {
            Self::High
        } else if score >= 6.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Representative AI score used when a producer sends only the tier.
    pub fn representative_score(&self) -> f64 {
        match self {
            Self::Extreme => 9.5,
            Self::High => 8.0,
            Self::Medium => 6.5,
            Self::Low => 4.0,
        }
    }
}

impl std::fmt::Display for QualityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Extreme => write!(f, "EXTREME"),
            Self::High => write!(f, "HIGH"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::Low => write!(f, "LOW"),
        }
    }
}

/// Execution-quality grade reported by the structure checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionGrade {
    #[serde(rename = "A+")]
    APlus,
    A,
    B,
    C,
}

impl ExecutionGrade {
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            Self::APlus
        } else if score >= 75.0 {
            Self::A
        } else if score >= 60.0 {
            Self::B
        } else {
            Self::C
        }
    }
}

impl std::fmt::Display for ExecutionGrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::APlus => write!(f, "A+"),
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
            Self::C => write!(f, "C"),
        }
    }
}

/// Final verdict of a decision evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Execute,
    Wait,
    Skip,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Execute => write!(f, "EXECUTE"),
            Self::Wait => write!(f, "WAIT"),
            Self::Skip => write!(f, "SKIP"),
        }
    }
}

/// Instrument identity as last reported by any producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub symbol: String,
    pub exchange: String,
    #[serde(default)]
    pub last_price: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_name_parses_aliases() {
        assert_eq!("expert".parse::<SourceName>().unwrap(), SourceName::ExpertSignal);
        assert_eq!("trend-alignment".parse::<SourceName>().unwrap(), SourceName::TrendAlignment);
        assert_eq!(" regime ".parse::<SourceName>().unwrap(), SourceName::Regime);
        assert!("weather".parse::<SourceName>().is_err());
    }

    #[test]
    fn source_name_serialises_screaming_case() {
        let json = serde_json::to_string(&SourceName::StructureCheck).unwrap();
        assert_eq!(json, "\"STRUCTURE_CHECK\"");
    }

    #[test]
    fn quality_tier_breakpoints() {
        assert_eq!(QualityTier::from_ai_score(10.5), QualityTier::Extreme);
        assert_eq!(QualityTier::from_ai_score(9.0), QualityTier::Extreme);
        assert_eq!(QualityTier::from_ai_score(8.99), QualityTier::High);
        assert_eq!(QualityTier::from_ai_score(6.0), QualityTier::Medium);
        assert_eq!(QualityTier::from_ai_score(0.0), QualityTier::Low);
    }

    #[test]
    fn execution_grade_serialises_plus() {
        assert_eq!(serde_json::to_string(&ExecutionGrade::APlus).unwrap(), "\"A+\"");
        assert_eq!(ExecutionGrade::from_score(80.0), ExecutionGrade::A);
    }
}
