use serde::{Deserialize, Serialize};

use super::provider::ProviderId;

/// How the router arrived at its provider choice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingMethod {
    Static,
    Complexity,
    Tier,
    Fallback,
}

/// Analyzer aggressiveness. Sets the local-vs-cloud score threshold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingMode {
    Aggressive,
    Heuristic,
    Conservative,
}

impl RoutingMode {
    /// Score at or above which a request is considered cloud-worthy.
    pub fn threshold(&self) -> u32 {
        match self {
            Self::Aggressive => 60,
            Self::Heuristic => 40,
            Self::Conservative => 25,
        }
    }
}

/// Structured record of why a provider was chosen. Attached to responses
/// for observability and retained in a bounded ring buffer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub provider: ProviderId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub method: RoutingMethod,
    pub score: u32,
    pub threshold: u32,
    pub mode: RoutingMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    /// Set when the caller asked for streaming but the target family
    /// cannot pass a stream through.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stream_forced_off: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_thresholds() {
        assert_eq!(RoutingMode::Aggressive.threshold(), 60);
        assert_eq!(RoutingMode::Heuristic.threshold(), 40);
        assert_eq!(RoutingMode::Conservative.threshold(), 25);
    }

    #[test]
    fn test_decision_serialization_omits_empty_fields() {
        let decision = RoutingDecision {
            provider: ProviderId::Openai,
            model: None,
            method: RoutingMethod::Static,
            score: 12,
            threshold: 40,
            mode: RoutingMode::Heuristic,
            fallback_reason: None,
            stream_forced_off: false,
        };
        let json = serde_json::to_string(&decision).unwrap();
        assert!(!json.contains("fallback_reason"));
        assert!(!json.contains("stream_forced_off"));
        assert!(json.contains(r#""method":"static""#));
    }
}
