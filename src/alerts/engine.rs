//! Alert engine with per-rule cooldowns
//!
//! Evaluates every active rule against a pattern snapshot (plus an optional
//! trend) and emits alerts for the conditions that hold. A rule that fires
//! enters cooldown and is skipped until its cooldown elapses; a rule whose
//! condition fails to parse or evaluate is logged and treated as not matched
//! for the cycle, and never disturbs the remaining rules.

use crate::aggregator::ErrorPattern;
use crate::alerts::condition::{Condition, ConditionContext};
use crate::alerts::rules::{default_rules, AlertRule};
use crate::events::{Severity, Timestamp};
use crate::trends::ErrorTrend;
use chrono::{Duration, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// An alert emitted by the engine
///
/// Carries snapshots of the pattern (and trend) that triggered it, so the
/// alert remains meaningful after the aggregates move on. The acknowledged
/// and resolved flags exist for downstream triage workflows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorAlert {
    /// Fresh unique id per alert
    pub alert_id: Uuid,
    /// Id of the rule that fired
    pub rule_id: String,
    /// Name of the rule that fired
    pub rule_name: String,
    /// Severity taken from the rule
    pub severity: Severity,
    /// Snapshot of the pattern at firing time
    pub pattern: ErrorPattern,
    /// Snapshot of the trend, when one was supplied
    pub trend: Option<ErrorTrend>,
    /// When the alert fired
    pub timestamp: Timestamp,
    /// Set by downstream triage
    pub acknowledged: bool,
    /// Set by downstream triage
    pub resolved: bool,
    /// Human-readable summary
    pub message: String,
}

/// Evaluates alert rules against patterns, enforcing per-rule cooldowns
///
/// Owns the rule registry, the cooldown timestamps, and the list of emitted
/// alerts. Evaluation takes `&mut self`, which makes the per-rule
/// check-cooldown / fire / set-cooldown sequence atomic as long as callers
/// serialize access (the facade keeps the engine behind a single lock).
pub struct AlertEngine {
    rules: HashMap<String, AlertRule>,
    last_fired: HashMap<String, Timestamp>,
    alerts: Vec<ErrorAlert>,
}

impl AlertEngine {
    /// Create an engine with no rules
    pub fn new() -> Self {
        Self {
            rules: HashMap::new(),
            last_fired: HashMap::new(),
            alerts: Vec::new(),
        }
    }

    /// Create an engine seeded with the built-in rule registry
    pub fn with_default_rules() -> Self {
        let mut engine = Self::new();
        for rule in default_rules() {
            engine.add_rule(rule);
        }
        engine
    }

    /// Insert a rule, overwriting any existing rule with the same id
    pub fn add_rule(&mut self, rule: AlertRule) {
        self.rules.insert(rule.rule_id.clone(), rule);
    }

    /// Remove a rule by id, returning it if present
    pub fn remove_rule(&mut self, rule_id: &str) -> Option<AlertRule> {
        self.last_fired.remove(rule_id);
        self.rules.remove(rule_id)
    }

    /// Enable or disable a rule administratively
    ///
    /// Returns false when no rule with that id exists.
    pub fn set_rule_active(&mut self, rule_id: &str, active: bool) -> bool {
        match self.rules.get_mut(rule_id) {
            Some(rule) => {
                rule.active = active;
                true
            }
            None => false,
        }
    }

    /// Look up a rule by id
    pub fn rule(&self, rule_id: &str) -> Option<&AlertRule> {
        self.rules.get(rule_id)
    }

    /// Iterate over all configured rules
    pub fn rules(&self) -> impl Iterator<Item = &AlertRule> {
        self.rules.values()
    }

    /// Number of configured rules
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Whether a rule is currently cooling down
    pub fn is_in_cooldown(&self, rule_id: &str, now: Timestamp) -> bool {
        match (self.rules.get(rule_id), self.last_fired.get(rule_id)) {
            (Some(rule), Some(fired)) => now - *fired < Duration::minutes(rule.cooldown_minutes),
            _ => false,
        }
    }

    /// Evaluate all rules against a pattern, emitting alerts for matches
    pub fn evaluate_pattern(
        &mut self,
        pattern: &ErrorPattern,
        trend: Option<&ErrorTrend>,
    ) -> Vec<ErrorAlert> {
        self.evaluate_pattern_at(pattern, trend, Utc::now())
    }

    /// Evaluation with an explicit clock, used by the facade and by tests
    pub fn evaluate_pattern_at(
        &mut self,
        pattern: &ErrorPattern,
        trend: Option<&ErrorTrend>,
        now: Timestamp,
    ) -> Vec<ErrorAlert> {
        let mut rule_ids: Vec<String> = self.rules.keys().cloned().collect();
        rule_ids.sort();

        let mut fired = Vec::new();
        for rule_id in rule_ids {
            let rule = match self.rules.get(&rule_id) {
                Some(rule) => rule.clone(),
                None => continue,
            };
            if !rule.active {
                continue;
            }
            if self.is_in_cooldown(&rule_id, now) {
                debug!("Rule {} in cooldown, skipping", rule_id);
                continue;
            }

            let matched = Condition::parse(&rule.condition).and_then(|condition| {
                let ctx = ConditionContext::new(pattern, trend, rule.time_window_minutes, now);
                condition.evaluate(&ctx)
            });
            let matched = match matched {
                Ok(matched) => matched,
                Err(e) => {
                    // Fail-safe: a broken rule never aborts the cycle
                    warn!(
                        "Rule {} condition failed against pattern {}: {}",
                        rule_id, pattern.signature.pattern_hash, e
                    );
                    continue;
                }
            };
            if !matched {
                continue;
            }

            let alert = Self::build_alert(&rule, pattern, trend, now);
            debug!("Rule {} fired: {}", rule_id, alert.message);
            self.last_fired.insert(rule_id, now);
            self.alerts.push(alert.clone());
            fired.push(alert);
        }
        fired
    }

    /// All alerts emitted by this engine, oldest first
    pub fn alerts(&self) -> &[ErrorAlert] {
        &self.alerts
    }

    /// Mark an alert acknowledged; returns false when the id is unknown
    pub fn acknowledge(&mut self, alert_id: Uuid) -> bool {
        match self.alerts.iter_mut().find(|a| a.alert_id == alert_id) {
            Some(alert) => {
                alert.acknowledged = true;
                true
            }
            None => false,
        }
    }

    /// Mark an alert resolved; returns false when the id is unknown
    pub fn resolve(&mut self, alert_id: Uuid) -> bool {
        match self.alerts.iter_mut().find(|a| a.alert_id == alert_id) {
            Some(alert) => {
                alert.resolved = true;
                true
            }
            None => false,
        }
    }

    /// Drop resolved alerts from the history, returning how many were removed
    pub fn clear_resolved(&mut self) -> usize {
        let before = self.alerts.len();
        self.alerts.retain(|alert| !alert.resolved);
        before - self.alerts.len()
    }

    fn build_alert(
        rule: &AlertRule,
        pattern: &ErrorPattern,
        trend: Option<&ErrorTrend>,
        now: Timestamp,
    ) -> ErrorAlert {
        ErrorAlert {
            alert_id: Uuid::new_v4(),
            rule_id: rule.rule_id.clone(),
            rule_name: rule.name.clone(),
            severity: rule.severity,
            pattern: pattern.clone(),
            trend: trend.cloned(),
            timestamp: now,
            acknowledged: false,
            resolved: false,
            message: Self::build_message(rule, pattern, trend),
        }
    }

    fn build_message(
        rule: &AlertRule,
        pattern: &ErrorPattern,
        trend: Option<&ErrorTrend>,
    ) -> String {
        let signature = &pattern.signature;
        let mut message = format!(
            "{}: {} occurrences of {} in {}::{} [{}], {} users affected",
            rule.name,
            pattern.count,
            signature.error_type,
            signature.module,
            signature.function,
            signature.pattern_hash,
            pattern.affected_users.len(),
        );

        if let Some(trend) = trend {
            if trend.is_spike {
                message.push_str(", spiking");
            }
            if trend.is_sustained {
                message.push_str(", sustained growth");
            }
            if let Some(projection) = trend.projection {
                message.push_str(&format!(
                    ", projected {:.1} in the next window",
                    projection
                ));
            }
        }
        message
    }
}

impl Default for AlertEngine {
    fn default() -> Self {
        Self::with_default_rules()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::PatternStore;
    use crate::events::ErrorEvent;
    use crate::trends::TrendAnalyzer;

    fn pattern_with_count(count: u64, first_offset_minutes: i64, now: Timestamp) -> ErrorPattern {
        let mut store = PatternStore::default();
        let mut pattern = None;
        for i in 0..count {
            // Spread occurrences between the first offset and now
            let offset = first_offset_minutes - (i as i64 * first_offset_minutes) / count as i64;
            let event = ErrorEvent::new("ValueError", "auth", "login", "invalid credentials")
                .with_user(&format!("user-{}", i % 7))
                .with_timestamp(now - Duration::minutes(offset));
            pattern = Some(store.ingest_at(&event, now));
        }
        pattern.expect("at least one event")
    }

    fn count_rule(rule_id: &str, threshold: u64, cooldown_minutes: i64) -> AlertRule {
        AlertRule::new(
            rule_id,
            rule_id,
            &format!("pattern.count >= {}", threshold),
            Severity::Warning,
            cooldown_minutes,
        )
    }

    #[test]
    fn test_high_error_rate_scenario_with_cooldown() {
        let mut engine = AlertEngine::with_default_rules();
        let now = Utc::now();
        let pattern = pattern_with_count(51, 10, now);

        // 51 errors in 10 minutes trips exactly the high-error-rate rule
        let alerts = engine.evaluate_pattern_at(&pattern, None, now);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].rule_id, "high_error_rate");
        assert_eq!(alerts[0].pattern.count, 51);

        // An immediate second evaluation is silenced by the cooldown
        let again = engine.evaluate_pattern_at(&pattern, None, now);
        assert!(again.is_empty());
        assert_eq!(engine.alerts().len(), 1);
    }

    #[test]
    fn test_cooldown_expires() {
        let mut engine = AlertEngine::new();
        engine.add_rule(count_rule("r", 1, 10));
        let now = Utc::now();
        let pattern = pattern_with_count(3, 5, now);

        assert_eq!(engine.evaluate_pattern_at(&pattern, None, now).len(), 1);
        assert!(engine.is_in_cooldown("r", now));

        // Still cooling down one minute before expiry
        let early = now + Duration::minutes(9);
        assert!(engine.evaluate_pattern_at(&pattern, None, early).is_empty());

        // Fires again once the cooldown has fully elapsed
        let later = now + Duration::minutes(10);
        assert!(!engine.is_in_cooldown("r", later));
        assert_eq!(engine.evaluate_pattern_at(&pattern, None, later).len(), 1);
    }

    #[test]
    fn test_cooldowns_are_per_rule() {
        let mut engine = AlertEngine::new();
        engine.add_rule(count_rule("first", 1, 30));
        engine.add_rule(count_rule("second", 2, 30));
        let now = Utc::now();

        let small = pattern_with_count(1, 5, now);
        let alerts = engine.evaluate_pattern_at(&small, None, now);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].rule_id, "first");

        // "first" is cooling down, but "second" can still fire
        let big = pattern_with_count(5, 5, now);
        let alerts = engine.evaluate_pattern_at(&big, None, now);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].rule_id, "second");
    }

    #[test]
    fn test_inactive_rule_is_skipped() {
        let mut engine = AlertEngine::new();
        engine.add_rule(count_rule("r", 1, 10));
        assert!(engine.set_rule_active("r", false));
        let now = Utc::now();
        let pattern = pattern_with_count(5, 5, now);

        assert!(engine.evaluate_pattern_at(&pattern, None, now).is_empty());

        // Re-enabling restores evaluation
        assert!(engine.set_rule_active("r", true));
        assert_eq!(engine.evaluate_pattern_at(&pattern, None, now).len(), 1);
        assert!(!engine.set_rule_active("missing", true));
    }

    #[test]
    fn test_broken_rule_does_not_disturb_others() {
        let _ = env_logger::builder().is_test(true).try_init();

        let mut engine = AlertEngine::new();
        engine.add_rule(AlertRule::new(
            "broken_reference",
            "Broken reference",
            "pattern.nonexistent > 1",
            Severity::Warning,
            10,
        ));
        engine.add_rule(AlertRule::new(
            "broken_syntax",
            "Broken syntax",
            "pattern.count >=",
            Severity::Warning,
            10,
        ));
        engine.add_rule(count_rule("healthy", 1, 10));
        let now = Utc::now();
        let pattern = pattern_with_count(5, 5, now);

        let alerts = engine.evaluate_pattern_at(&pattern, None, now);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].rule_id, "healthy");
    }

    #[test]
    fn test_trend_rules_need_a_trend() {
        let mut engine = AlertEngine::new();
        engine.add_rule(AlertRule::new(
            "spike",
            "Spike",
            "trend.is_spike || trend.growth_rate > 100",
            Severity::Critical,
            10,
        ));
        let now = Utc::now();
        let pattern = pattern_with_count(5, 5, now);

        // Without a trend the condition errors out and is treated as no match
        assert!(engine.evaluate_pattern_at(&pattern, None, now).is_empty());

        let trend = TrendAnalyzer::default().analyze_at(&pattern, now);
        // With a (flat) trend it evaluates cleanly to false
        assert!(engine
            .evaluate_pattern_at(&pattern, Some(&trend), now)
            .is_empty());
    }

    #[test]
    fn test_add_rule_overwrites_by_id() {
        let mut engine = AlertEngine::new();
        engine.add_rule(count_rule("r", 100, 10));
        engine.add_rule(count_rule("r", 1, 10));
        assert_eq!(engine.rule_count(), 1);

        let now = Utc::now();
        let pattern = pattern_with_count(2, 5, now);
        assert_eq!(engine.evaluate_pattern_at(&pattern, None, now).len(), 1);
    }

    #[test]
    fn test_remove_rule() {
        let mut engine = AlertEngine::with_default_rules();
        let initial = engine.rule_count();

        let removed = engine.remove_rule("new_pattern");
        assert!(removed.is_some());
        assert_eq!(engine.rule_count(), initial - 1);
        assert!(engine.rule("new_pattern").is_none());
        assert!(engine.remove_rule("new_pattern").is_none());
    }

    #[test]
    fn test_alert_message_content() {
        let mut engine = AlertEngine::new();
        engine.add_rule(count_rule("r", 1, 10));
        let now = Utc::now();
        let pattern = pattern_with_count(12, 60, now);
        let trend = TrendAnalyzer::default().analyze_at(&pattern, now);

        let alerts = engine.evaluate_pattern_at(&pattern, Some(&trend), now);
        let message = &alerts[0].message;

        assert!(message.contains("12 occurrences"));
        assert!(message.contains("ValueError"));
        assert!(message.contains("auth::login"));
        assert!(message.contains(&pattern.signature.pattern_hash));
        assert!(message.contains("users affected"));
        if trend.projection.is_some() {
            assert!(message.contains("projected"));
        }
    }

    #[test]
    fn test_alert_ids_are_unique() {
        let mut engine = AlertEngine::new();
        engine.add_rule(count_rule("r", 1, 0));
        let now = Utc::now();
        let pattern = pattern_with_count(2, 5, now);

        // Zero cooldown lets the rule fire repeatedly
        let first = engine.evaluate_pattern_at(&pattern, None, now);
        let second = engine.evaluate_pattern_at(&pattern, None, now + Duration::minutes(1));
        assert_ne!(first[0].alert_id, second[0].alert_id);
    }

    #[test]
    fn test_acknowledge_and_resolve_workflow() {
        let mut engine = AlertEngine::new();
        engine.add_rule(count_rule("r", 1, 10));
        let now = Utc::now();
        let pattern = pattern_with_count(2, 5, now);

        let alert_id = engine.evaluate_pattern_at(&pattern, None, now)[0].alert_id;

        assert!(engine.acknowledge(alert_id));
        assert!(engine.alerts()[0].acknowledged);
        assert!(engine.resolve(alert_id));
        assert_eq!(engine.clear_resolved(), 1);
        assert!(engine.alerts().is_empty());
        assert!(!engine.acknowledge(alert_id));
    }
}
