//! AnswerBox configuration system.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{AnswerBoxError, Result};

/// Engine configuration.
///
/// The similarity threshold and the confidence display tiers are
/// tunables with sensible defaults, not hard constants. A missing
/// config file means all defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Minimum cosine similarity a match must strictly exceed.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Confidence (0-100) at or above which a match displays as "high".
    #[serde(default = "default_high_confidence")]
    pub high_confidence: f64,
    /// Confidence (0-100) at or above which a match displays as "medium".
    #[serde(default = "default_medium_confidence")]
    pub medium_confidence: f64,
    /// How many random questions to suggest by default.
    #[serde(default = "default_suggestions")]
    pub suggestions: usize,
}

fn default_threshold() -> f64 { 0.1 }
fn default_high_confidence() -> f64 { 70.0 }
fn default_medium_confidence() -> f64 { 40.0 }
fn default_suggestions() -> usize { 5 }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            high_confidence: default_high_confidence(),
            medium_confidence: default_medium_confidence(),
            suggestions: default_suggestions(),
        }
    }
}

impl EngineConfig {
    /// Load config from a specific path. A missing file is not an error;
    /// it yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| AnswerBoxError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| AnswerBoxError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Display tier for a 0-100 confidence value.
    pub fn confidence_tier(&self, confidence: f64) -> ConfidenceTier {
        if confidence >= self.high_confidence {
            ConfidenceTier::High
        } else if confidence >= self.medium_confidence {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::Low
        }
    }
}

/// Coarse match-quality bucket used by the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfidenceTier::High => write!(f, "high"),
            ConfidenceTier::Medium => write!(f, "medium"),
            ConfidenceTier::Low => write!(f, "low"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!((config.threshold - 0.1).abs() < 1e-9);
        assert!((config.high_confidence - 70.0).abs() < 1e-9);
        assert!((config.medium_confidence - 40.0).abs() < 1e-9);
        assert_eq!(config.suggestions, 5);
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            threshold = 0.25
            high_confidence = 80.0
        "#;

        let config: EngineConfig = toml::from_str(toml_str).unwrap();
        assert!((config.threshold - 0.25).abs() < 1e-9);
        assert!((config.high_confidence - 80.0).abs() < 1e-9);
        // Unspecified fields fall back to defaults
        assert!((config.medium_confidence - 40.0).abs() < 1e-9);
        assert_eq!(config.suggestions, 5);
    }

    #[test]
    fn test_config_missing_fields_use_defaults() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert!((config.threshold - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_tiers() {
        let config = EngineConfig::default();
        assert_eq!(config.confidence_tier(95.0), ConfidenceTier::High);
        assert_eq!(config.confidence_tier(70.0), ConfidenceTier::High);
        assert_eq!(config.confidence_tier(55.0), ConfidenceTier::Medium);
        assert_eq!(config.confidence_tier(12.5), ConfidenceTier::Low);
    }
}
