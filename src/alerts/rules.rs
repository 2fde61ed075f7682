//! Alert rule definitions and the built-in rule registry
//!
//! Rules are data, not code: each carries its trigger condition as an
//! expression string (see [`crate::alerts::condition`]) so deployments can
//! reconfigure alerting without a rebuild. The built-in registry seeds every
//! new engine; each default remains independently addressable and removable
//! by its `rule_id`.

use crate::events::Severity;
use serde::{Deserialize, Serialize};

fn default_active() -> bool {
    true
}

/// A named, configurable alert condition with severity and cooldown metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertRule {
    /// Unique key; adding a rule with an existing id overwrites it
    pub rule_id: String,
    /// Human-readable name used in alert messages
    pub name: String,
    /// What the rule looks for
    pub description: String,
    /// Boolean condition expression evaluated per pattern
    pub condition: String,
    /// Severity assigned to alerts fired by this rule
    pub severity: Severity,
    /// Occurrence-count threshold the condition is built around
    #[serde(default)]
    pub threshold_count: u64,
    /// Growth-rate threshold the condition is built around
    #[serde(default)]
    pub threshold_rate: f64,
    /// Evaluation window exposed to the condition as `window_minutes`
    pub time_window_minutes: i64,
    /// Minimum minutes between successive alerts from this rule
    pub cooldown_minutes: i64,
    /// Administratively disabled rules are skipped entirely
    #[serde(default = "default_active")]
    pub active: bool,
}

impl AlertRule {
    /// Create an active rule with the given identity and condition
    pub fn new(
        rule_id: &str,
        name: &str,
        condition: &str,
        severity: Severity,
        cooldown_minutes: i64,
    ) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            name: name.to_string(),
            description: String::new(),
            condition: condition.to_string(),
            severity,
            threshold_count: 0,
            threshold_rate: 0.0,
            time_window_minutes: 60,
            cooldown_minutes,
            active: true,
        }
    }
}

/// The built-in rule registry seeded into every new engine
pub fn default_rules() -> Vec<AlertRule> {
    vec![
        AlertRule {
            rule_id: "high_error_rate".to_string(),
            name: "High error rate".to_string(),
            description: "A pattern accumulated many occurrences within the evaluation window"
                .to_string(),
            condition: "pattern.count >= 50 && window_minutes <= 60".to_string(),
            severity: Severity::Warning,
            threshold_count: 50,
            threshold_rate: 0.0,
            time_window_minutes: 60,
            cooldown_minutes: 30,
            active: true,
        },
        AlertRule {
            rule_id: "critical_spike".to_string(),
            name: "Critical error spike".to_string(),
            description: "A busy pattern's growth rate crossed the spike threshold".to_string(),
            condition: "trend.is_spike && pattern.count >= 10".to_string(),
            severity: Severity::Critical,
            threshold_count: 10,
            threshold_rate: 5.0,
            time_window_minutes: 10,
            cooldown_minutes: 15,
            active: true,
        },
        AlertRule {
            rule_id: "sustained_errors".to_string(),
            name: "Sustained error growth".to_string(),
            description: "Positive growth held across consecutive windows".to_string(),
            condition: "trend.is_sustained".to_string(),
            severity: Severity::Warning,
            threshold_count: 20,
            threshold_rate: 0.0,
            time_window_minutes: 30,
            cooldown_minutes: 60,
            active: true,
        },
        AlertRule {
            rule_id: "new_pattern".to_string(),
            name: "New error pattern".to_string(),
            description: "A previously unseen pattern is accumulating occurrences".to_string(),
            condition: "pattern_age_minutes <= 5 && pattern.count >= 5".to_string(),
            severity: Severity::Info,
            threshold_count: 5,
            threshold_rate: 0.0,
            time_window_minutes: 5,
            cooldown_minutes: 120,
            active: true,
        },
    ]
}
