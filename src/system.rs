//! Aggregation system facade
//!
//! Composes the signature extractor, pattern store, trend analyzer, and alert
//! engine into a single ingestion-to-alerting pipeline. The store and engine
//! sit behind their own locks: ingestion may run from many producer threads,
//! while trend analysis and alert evaluation are expected to run on one
//! periodic evaluator. Holding the engine behind a single lock makes each
//! rule's cooldown check-then-set atomic.

use crate::aggregator::{ErrorPattern, PatternStore};
use crate::alerts::{AlertEngine, AlertRule, ErrorAlert};
use crate::config::AggregationConfig;
use crate::events::{ErrorEvent, Timestamp};
use crate::signature::SignatureExtractor;
use crate::trends::{ErrorTrend, TrendAnalyzer};
use chrono::{Duration, Utc};
use log::{debug, info};
use parking_lot::Mutex;
use uuid::Uuid;

/// The composed ingestion→aggregation→trend→alert pipeline
pub struct AggregationSystem {
    config: AggregationConfig,
    store: Mutex<PatternStore>,
    analyzer: TrendAnalyzer,
    engine: Mutex<AlertEngine>,
}

impl AggregationSystem {
    /// Create a system from a validated configuration
    pub fn new(config: AggregationConfig) -> Self {
        let extractor = if config.key_terms.is_empty() {
            SignatureExtractor::with_defaults()
        } else {
            SignatureExtractor::new(config.key_terms.clone())
        };
        let store = PatternStore::new(
            extractor,
            config.max_samples,
            config.max_history,
            config.max_patterns,
        );

        let mut engine = if config.use_default_rules {
            AlertEngine::with_default_rules()
        } else {
            AlertEngine::new()
        };
        for rule in &config.rules {
            engine.add_rule(rule.clone());
        }

        let analyzer = TrendAnalyzer::new(config.trend.clone());

        info!(
            "Initializing aggregation system with {} rules",
            engine.rule_count()
        );
        Self {
            config,
            store: Mutex::new(store),
            analyzer,
            engine: Mutex::new(engine),
        }
    }

    /// The configuration this system was built from
    pub fn config(&self) -> &AggregationConfig {
        &self.config
    }

    /// Ingest one raw error event, returning a snapshot of its pattern
    pub fn ingest(&self, event: &ErrorEvent) -> ErrorPattern {
        self.ingest_at(event, Utc::now())
    }

    /// Ingestion with an explicit clock, used by tests
    pub fn ingest_at(&self, event: &ErrorEvent, now: Timestamp) -> ErrorPattern {
        let pattern = self.store.lock().ingest_at(event, now);
        debug!(
            "Ingested error into pattern {} (count {})",
            pattern.signature.pattern_hash, pattern.count
        );
        pattern
    }

    /// Run one analysis/alerting cycle over every tracked pattern
    ///
    /// Computes a fresh trend per pattern, writes the growth rate back as the
    /// pattern's trend score, and evaluates the full rule set. Intended to be
    /// called from a single periodic evaluator; concurrent ingestion is safe.
    pub fn evaluate(&self) -> Vec<ErrorAlert> {
        self.evaluate_at(Utc::now())
    }

    /// Evaluation with an explicit clock, used by tests
    pub fn evaluate_at(&self, now: Timestamp) -> Vec<ErrorAlert> {
        let snapshots: Vec<ErrorPattern> = {
            let store = self.store.lock();
            store.patterns().cloned().collect()
        };

        let trends: Vec<ErrorTrend> = snapshots
            .iter()
            .map(|pattern| self.analyzer.analyze_at(pattern, now))
            .collect();

        {
            let mut store = self.store.lock();
            for trend in &trends {
                store.set_trend_score(&trend.pattern_hash, trend.growth_rate);
            }
        }

        let mut fired = Vec::new();
        {
            let mut engine = self.engine.lock();
            for (pattern, trend) in snapshots.iter().zip(trends.iter()) {
                fired.extend(engine.evaluate_pattern_at(pattern, Some(trend), now));
            }
        }

        if !fired.is_empty() {
            info!(
                "Evaluation cycle over {} patterns fired {} alerts",
                snapshots.len(),
                fired.len()
            );
        }
        fired
    }

    /// Evaluate the rule set against a single pattern snapshot
    pub fn evaluate_pattern(
        &self,
        pattern: &ErrorPattern,
        trend: Option<&ErrorTrend>,
    ) -> Vec<ErrorAlert> {
        self.engine.lock().evaluate_pattern(pattern, trend)
    }

    /// Insert or overwrite an alert rule
    pub fn add_rule(&self, rule: AlertRule) {
        self.engine.lock().add_rule(rule);
    }

    /// Remove an alert rule by id
    pub fn remove_rule(&self, rule_id: &str) -> Option<AlertRule> {
        self.engine.lock().remove_rule(rule_id)
    }

    /// Enable or disable a rule administratively
    pub fn set_rule_active(&self, rule_id: &str, active: bool) -> bool {
        self.engine.lock().set_rule_active(rule_id, active)
    }

    /// All alerts emitted so far, oldest first
    pub fn alerts(&self) -> Vec<ErrorAlert> {
        self.engine.lock().alerts().to_vec()
    }

    /// Mark an alert acknowledged
    pub fn acknowledge(&self, alert_id: Uuid) -> bool {
        self.engine.lock().acknowledge(alert_id)
    }

    /// Mark an alert resolved
    pub fn resolve(&self, alert_id: Uuid) -> bool {
        self.engine.lock().resolve(alert_id)
    }

    /// Drop resolved alerts from the history
    pub fn clear_resolved(&self) -> usize {
        self.engine.lock().clear_resolved()
    }

    /// Number of patterns currently tracked
    pub fn pattern_count(&self) -> usize {
        self.store.lock().pattern_count()
    }

    /// Snapshot of a pattern by hash
    pub fn pattern(&self, pattern_hash: &str) -> Option<ErrorPattern> {
        self.store.lock().snapshot(pattern_hash)
    }

    /// The busiest patterns by occurrence count
    pub fn top_patterns(&self, n: usize) -> Vec<ErrorPattern> {
        self.store.lock().top_patterns(n)
    }

    /// Remove patterns idle longer than the configured retention horizon
    pub fn prune_stale(&self) -> usize {
        let removed = self
            .store
            .lock()
            .prune_stale(Duration::hours(self.config.retention_hours));
        if removed > 0 {
            info!("Pruned {} stale patterns", removed);
        }
        removed
    }
}

impl Default for AggregationSystem {
    fn default() -> Self {
        Self::new(AggregationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Severity;
    use std::sync::Arc;

    fn login_error() -> ErrorEvent {
        ErrorEvent::new("ValueError", "auth", "login", "invalid credentials")
            .with_severity(Severity::Warning)
    }

    #[test]
    fn test_high_error_rate_pipeline() {
        let system = AggregationSystem::default();
        let now = Utc::now();

        // 51 errors sharing one signature within 10 minutes
        for i in 0..51 {
            let event = login_error()
                .with_user(&format!("user-{}", i % 5))
                .with_timestamp(now - Duration::minutes(10) + Duration::seconds(i * 10));
            system.ingest_at(&event, now);
        }

        let pattern = system.top_patterns(1).remove(0);
        assert_eq!(pattern.count, 51);

        let alerts = system.evaluate_at(now);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].rule_id, "high_error_rate");

        // The same cycle run again immediately is silenced by the cooldown
        assert!(system.evaluate_at(now + Duration::seconds(30)).is_empty());
        assert_eq!(system.alerts().len(), 1);
    }

    #[test]
    fn test_evaluate_writes_back_trend_score() {
        let system = AggregationSystem::default();
        let now = Utc::now();

        // Ramping occurrences so the growth rate is positive
        for offset in [25, 25, 15, 15, 15, 5, 5, 5, 5, 5] {
            system.ingest_at(&login_error().with_timestamp(now - Duration::minutes(offset)), now);
        }
        let hash = system.top_patterns(1).remove(0).signature.pattern_hash;
        assert_eq!(system.pattern(&hash).unwrap().trend_score, 0.0);

        system.evaluate_at(now);
        assert!(system.pattern(&hash).unwrap().trend_score > 0.0);
    }

    #[test]
    fn test_custom_rule_through_facade() {
        let config = AggregationConfig {
            use_default_rules: false,
            ..AggregationConfig::default()
        };
        let system = AggregationSystem::new(config);
        system.add_rule(AlertRule::new(
            "any_error",
            "Any error",
            "pattern.count >= 1",
            Severity::Info,
            60,
        ));

        system.ingest(&login_error());
        let alerts = system.evaluate();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].rule_id, "any_error");
        assert_eq!(alerts[0].severity, Severity::Info);
    }

    #[test]
    fn test_config_rules_merge_over_defaults() {
        let mut custom = AlertRule::new(
            "high_error_rate",
            "Stricter high error rate",
            "pattern.count >= 5",
            Severity::Critical,
            30,
        );
        custom.time_window_minutes = 10;
        let config = AggregationConfig {
            rules: vec![custom],
            ..AggregationConfig::default()
        };
        let system = AggregationSystem::new(config);
        let now = Utc::now();

        for _ in 0..6 {
            system.ingest_at(&login_error().with_timestamp(now - Duration::minutes(8)), now);
        }

        let alerts = system.evaluate_at(now);
        // The overriding rule fires with its lowered threshold
        let high_rate: Vec<_> = alerts
            .iter()
            .filter(|a| a.rule_id == "high_error_rate")
            .collect();
        assert_eq!(high_rate.len(), 1);
        assert_eq!(high_rate[0].severity, Severity::Critical);
    }

    #[test]
    fn test_concurrent_ingestion_loses_no_updates() {
        let system = Arc::new(AggregationSystem::default());
        let mut handles = Vec::new();

        for worker in 0..4 {
            let system = Arc::clone(&system);
            handles.push(std::thread::spawn(move || {
                for i in 0..50 {
                    let event = login_error().with_user(&format!("w{}-{}", worker, i));
                    system.ingest(&event);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(system.pattern_count(), 1);
        let pattern = system.top_patterns(1).remove(0);
        assert_eq!(pattern.count, 200);
        assert_eq!(pattern.affected_users.len(), 200);
    }

    #[test]
    fn test_alert_workflow_through_facade() {
        let system = AggregationSystem::default();
        system.add_rule(AlertRule::new(
            "any_error",
            "Any error",
            "pattern.count >= 1",
            Severity::Warning,
            60,
        ));

        system.ingest(&login_error());
        let alerts = system.evaluate();
        let alert_id = alerts[0].alert_id;

        assert!(system.acknowledge(alert_id));
        assert!(system.resolve(alert_id));
        assert_eq!(system.clear_resolved(), 1);
        assert!(system.alerts().is_empty());
    }

    #[test]
    fn test_prune_stale_through_facade() {
        let config = AggregationConfig {
            retention_hours: 1,
            ..AggregationConfig::default()
        };
        let system = AggregationSystem::new(config);
        let now = Utc::now();

        system.ingest_at(&login_error().with_timestamp(now - Duration::hours(3)), now);
        system.ingest_at(
            &ErrorEvent::new("IOError", "storage", "write", "disk full"),
            now,
        );
        assert_eq!(system.pattern_count(), 2);

        assert_eq!(system.prune_stale(), 1);
        assert_eq!(system.pattern_count(), 1);
    }

    #[test]
    fn test_distinct_signatures_alert_independently() {
        let config = AggregationConfig {
            use_default_rules: false,
            ..AggregationConfig::default()
        };
        let system = AggregationSystem::new(config);
        system.add_rule(AlertRule::new(
            "db_only",
            "Database errors",
            "pattern.module == 'db' && pattern.count >= 2",
            Severity::Critical,
            60,
        ));
        let now = Utc::now();

        for _ in 0..3 {
            system.ingest_at(&login_error(), now);
            system.ingest_at(&ErrorEvent::new("DbError", "db", "query", "deadlock"), now);
        }

        let alerts = system.evaluate_at(now);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].pattern.signature.module, "db");
    }
}
