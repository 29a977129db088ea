// src/config.rs

use serde::{Deserialize, Serialize};

/// Engine and synth settings.
///
/// Every field has a default, so a partial JSON document is enough:
/// `{"sample_rate": 44100}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sample_rate: f64,
    pub max_block_size: usize,

    /// Node slots in the render graph, destination included.
    pub max_nodes: usize,

    /// Number of oscillator voices.
    pub bank_size: usize,

    /// Quiet period before a remote write fires.
    pub debounce_delay_ms: u64,
    /// Longest a burst of remote writes may be held back.
    pub debounce_max_wait_ms: Option<u64>,

    /// Ramp length for amplitude changes on local voices.
    pub param_smoothing_seconds: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000.0,
            max_block_size: 512,
            max_nodes: 64,
            bank_size: 4,
            debounce_delay_ms: 500,
            debounce_max_wait_ms: Some(1000),
            param_smoothing_seconds: 0.005,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = EngineConfig::from_json(r#"{"sample_rate": 44100, "bank_size": 2}"#).unwrap();
        assert_eq!(config.sample_rate, 44_100.0);
        assert_eq!(config.bank_size, 2);
        assert_eq!(config.debounce_delay_ms, 500);
        assert_eq!(config.debounce_max_wait_ms, Some(1000));
    }

    #[test]
    fn max_wait_can_be_disabled() {
        let config = EngineConfig::from_json(r#"{"debounce_max_wait_ms": null}"#).unwrap();
        assert_eq!(config.debounce_max_wait_ms, None);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(EngineConfig::from_json("{sample_rate:").is_err());
    }
}
