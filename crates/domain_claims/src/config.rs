//! Engine-level fallbacks for thresholds normally set per plan

use serde::Deserialize;

/// Pipeline configuration
///
/// Every value is a fallback: plan settings win when the claim has a plan.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimum extraction confidence for auto-approval without a plan
    pub min_confidence_score: f64,
    /// Maximum fraud risk for auto-approval without a plan
    pub max_fraud_risk_score: f64,
    /// Similarity at which a duplicate match is recorded
    pub duplicate_match_threshold: f64,
    /// Threshold for `duplicate_check` rules that name none
    pub duplicate_rule_threshold: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_confidence_score: 0.85,
            max_fraud_risk_score: 0.2,
            duplicate_match_threshold: 0.6,
            duplicate_rule_threshold: 0.85,
        }
    }
}

impl EngineConfig {
    /// Loads configuration from `CLAIMS_*` environment variables
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::Environment::with_prefix("CLAIMS"))
            .build()?
            .try_deserialize()
    }

    /// Rejects thresholds outside 0..=1
    pub fn validate(&self) -> Result<(), String> {
        let fields = [
            ("min_confidence_score", self.min_confidence_score),
            ("max_fraud_risk_score", self.max_fraud_risk_score),
            ("duplicate_match_threshold", self.duplicate_match_threshold),
            ("duplicate_rule_threshold", self.duplicate_rule_threshold),
        ];
        match fields.iter().find(|(_, value)| !(0.0..=1.0).contains(value)) {
            Some((name, value)) => Err(format!("{name} must be between 0 and 1, got {value}")),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.duplicate_match_threshold, 0.6);
    }

    #[test]
    fn test_out_of_range_threshold() {
        let config = EngineConfig {
            max_fraud_risk_score: 1.5,
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().contains("max_fraud_risk_score"));
    }
}
