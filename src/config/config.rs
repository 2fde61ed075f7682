//! Configuration for the aggregation pipeline
//!
//! All buffer caps, retention horizons, trend policy thresholds, and custom
//! alert rules live here. Configuration is TOML-loadable with serde defaults
//! for every field, so a partial file (or none at all) yields a working
//! setup. Loading validates the result, including that every configured rule
//! condition actually parses.

use crate::alerts::{AlertRule, Condition};
use crate::error::ConfigError;
use crate::trends::TrendConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration for an [`crate::system::AggregationSystem`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AggregationConfig {
    /// Cap on raw samples kept per pattern
    pub max_samples: usize,
    /// Cap on occurrence timestamps kept per pattern
    pub max_history: usize,
    /// Cap on tracked patterns before least-recently-seen eviction
    pub max_patterns: usize,
    /// Patterns with no occurrence for this many hours are pruned
    pub retention_hours: i64,
    /// Custom key-term vocabulary; empty means the built-in vocabulary
    pub key_terms: Vec<String>,
    /// Whether to seed the engine with the built-in rule registry
    pub use_default_rules: bool,
    /// Additional rules, applied after the defaults (same id overwrites)
    pub rules: Vec<AlertRule>,
    /// Trend policy thresholds
    pub trend: TrendConfig,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            max_samples: 20,
            max_history: 10_000,
            max_patterns: 10_000,
            retention_hours: 24,
            key_terms: Vec::new(),
            use_default_rules: true,
            rules: Vec::new(),
            trend: TrendConfig::default(),
        }
    }
}

impl AggregationConfig {
    /// Parse and validate configuration from a TOML string
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }

    /// Check all values for consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_samples == 0 {
            return Err(ConfigError::ValidationError(
                "max_samples must be at least 1".to_string(),
            ));
        }
        if self.max_history == 0 {
            return Err(ConfigError::ValidationError(
                "max_history must be at least 1".to_string(),
            ));
        }
        if self.max_patterns == 0 {
            return Err(ConfigError::ValidationError(
                "max_patterns must be at least 1".to_string(),
            ));
        }
        if self.retention_hours <= 0 {
            return Err(ConfigError::ValidationError(
                "retention_hours must be positive".to_string(),
            ));
        }
        if self.trend.window_minutes <= 0 {
            return Err(ConfigError::ValidationError(
                "trend.window_minutes must be positive".to_string(),
            ));
        }
        if self.trend.sustained_min_windows == 0 {
            return Err(ConfigError::ValidationError(
                "trend.sustained_min_windows must be at least 1".to_string(),
            ));
        }
        for rule in &self.rules {
            if rule.rule_id.is_empty() {
                return Err(ConfigError::ValidationError(
                    "rules must have a non-empty rule_id".to_string(),
                ));
            }
            if rule.cooldown_minutes < 0 {
                return Err(ConfigError::ValidationError(format!(
                    "rule {} has a negative cooldown",
                    rule.rule_id
                )));
            }
            if let Err(e) = Condition::parse(&rule.condition) {
                return Err(ConfigError::ValidationError(format!(
                    "rule {} has an invalid condition: {}",
                    rule.rule_id, e
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        assert!(AggregationConfig::default().validate().is_ok());
    }

    #[test]
    fn test_empty_toml_yields_defaults() {
        let config = AggregationConfig::from_toml_str("").unwrap();
        assert_eq!(config, AggregationConfig::default());
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config = AggregationConfig::from_toml_str(
            r#"
            max_samples = 5
            retention_hours = 48

            [trend]
            window_minutes = 15
            "#,
        )
        .unwrap();

        assert_eq!(config.max_samples, 5);
        assert_eq!(config.retention_hours, 48);
        assert_eq!(config.trend.window_minutes, 15);
        // Untouched fields keep their defaults
        assert_eq!(config.max_patterns, 10_000);
        assert_eq!(config.trend.sustained_min_count, 20);
    }

    #[test]
    fn test_toml_with_custom_rule() {
        let config = AggregationConfig::from_toml_str(
            r#"
            [[rules]]
            rule_id = "db_errors"
            name = "Database errors"
            description = "Errors out of the db module"
            condition = "pattern.module == 'db' && pattern.count >= 5"
            severity = "critical"
            time_window_minutes = 15
            cooldown_minutes = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.rules.len(), 1);
        assert_eq!(config.rules[0].rule_id, "db_errors");
        assert!(config.rules[0].active);
    }

    #[test]
    fn test_invalid_rule_condition_rejected() {
        let result = AggregationConfig::from_toml_str(
            r#"
            [[rules]]
            rule_id = "broken"
            name = "Broken"
            description = ""
            condition = "pattern.count >="
            severity = "warning"
            time_window_minutes = 15
            cooldown_minutes = 10
            "#,
        );

        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validation_rejects_zero_caps() {
        let mut config = AggregationConfig::default();
        config.max_samples = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        let mut config = AggregationConfig::default();
        config.trend.window_minutes = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_from_file_round_trip() {
        let config = AggregationConfig {
            max_samples: 7,
            ..AggregationConfig::default()
        };
        let serialized = toml::to_string(&config).unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(serialized.as_bytes()).unwrap();

        let loaded = AggregationConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_from_file_missing_is_read_error() {
        let result = AggregationConfig::from_file(Path::new("/nonexistent/faultline.toml"));
        assert!(matches!(result, Err(ConfigError::ReadError(_))));
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let result = AggregationConfig::from_toml_str("max_samples = [not a number");
        assert!(matches!(result, Err(ConfigError::TomlError(_))));
    }
}
