//! Pattern store with per-signature running aggregates
//!
//! This module provides the PatternStore, which maintains one ErrorPattern per
//! distinct pattern hash and updates it as matching errors arrive. Sample and
//! occurrence buffers are bounded FIFO queues, and the store itself carries a
//! pattern cap plus a staleness pruning pass to keep memory bounded under
//! high-cardinality signatures.

use crate::events::{ErrorEvent, Severity, Timestamp};
use crate::signature::{ErrorSignature, SignatureExtractor};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};

/// Default cap on stored raw samples per pattern
const DEFAULT_MAX_SAMPLES: usize = 20;
/// Default cap on the occurrence-timestamp history per pattern
const DEFAULT_MAX_HISTORY: usize = 10_000;
/// Default cap on the number of tracked patterns
const DEFAULT_MAX_PATTERNS: usize = 10_000;

/// The running aggregate of all occurrences sharing one signature
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorPattern {
    /// The signature all aggregated occurrences share
    pub signature: ErrorSignature,
    /// Total number of occurrences, monotonically increasing
    pub count: u64,
    /// Timestamp of the earliest recorded occurrence
    pub first_occurrence: Timestamp,
    /// Timestamp of the latest recorded occurrence
    pub last_occurrence: Timestamp,
    /// Occurrence count per severity level
    pub severity_distribution: HashMap<Severity, u64>,
    /// Distinct users that reported a matching error
    pub affected_users: BTreeSet<String>,
    /// Distinct operations a matching error was reported from
    pub affected_operations: BTreeSet<String>,
    /// Bounded FIFO of raw sample events, oldest dropped first
    pub sample_errors: VecDeque<ErrorEvent>,
    /// Bounded FIFO of occurrence timestamps, the trend analysis history
    pub occurrences: VecDeque<Timestamp>,
    /// Externally settable trend score, written back by the analysis cycle
    pub trend_score: f64,
}

impl ErrorPattern {
    fn new(signature: ErrorSignature, timestamp: Timestamp) -> Self {
        Self {
            signature,
            count: 0,
            first_occurrence: timestamp,
            last_occurrence: timestamp,
            severity_distribution: HashMap::new(),
            affected_users: BTreeSet::new(),
            affected_operations: BTreeSet::new(),
            sample_errors: VecDeque::new(),
            occurrences: VecDeque::new(),
            trend_score: 0.0,
        }
    }

    fn record(&mut self, event: &ErrorEvent, timestamp: Timestamp, caps: &BufferCaps) {
        self.count += 1;
        if timestamp < self.first_occurrence {
            self.first_occurrence = timestamp;
        }
        if timestamp > self.last_occurrence {
            self.last_occurrence = timestamp;
        }

        *self
            .severity_distribution
            .entry(event.effective_severity())
            .or_insert(0) += 1;

        if let Some(user) = &event.user_id {
            self.affected_users.insert(user.clone());
        }
        if let Some(operation) = &event.operation {
            self.affected_operations.insert(operation.clone());
        }

        self.sample_errors.push_back(event.clone());
        while self.sample_errors.len() > caps.max_samples {
            self.sample_errors.pop_front();
        }

        self.occurrences.push_back(timestamp);
        while self.occurrences.len() > caps.max_history {
            self.occurrences.pop_front();
        }
    }

    /// Age of the pattern in whole minutes relative to `now`
    pub fn age_minutes(&self, now: Timestamp) -> i64 {
        (now - self.first_occurrence).num_minutes()
    }
}

#[derive(Debug, Clone, Copy)]
struct BufferCaps {
    max_samples: usize,
    max_history: usize,
}

/// Maintains one [`ErrorPattern`] per distinct pattern hash
///
/// Writes take `&mut self`; the facade serializes concurrent producers behind
/// a lock. Read paths hand out clones so alert evaluation observes a
/// consistent snapshot of each aggregate.
pub struct PatternStore {
    patterns: HashMap<String, ErrorPattern>,
    extractor: SignatureExtractor,
    caps: BufferCaps,
    max_patterns: usize,
}

impl PatternStore {
    /// Create a store with explicit buffer caps
    ///
    /// # Arguments
    ///
    /// * `extractor` - signature extractor applied to every ingested event
    /// * `max_samples` - cap on raw samples kept per pattern (FIFO)
    /// * `max_history` - cap on occurrence timestamps kept per pattern (FIFO)
    /// * `max_patterns` - cap on tracked patterns; the least recently seen
    ///   pattern is evicted when a new signature would exceed it
    pub fn new(
        extractor: SignatureExtractor,
        max_samples: usize,
        max_history: usize,
        max_patterns: usize,
    ) -> Self {
        Self {
            patterns: HashMap::new(),
            extractor,
            caps: BufferCaps {
                max_samples,
                max_history,
            },
            max_patterns,
        }
    }

    /// Ingest a raw error event, creating or updating its pattern
    ///
    /// Always succeeds: events missing identifying fields still map to a
    /// valid (generic) signature. Returns a snapshot of the updated pattern.
    pub fn ingest(&mut self, event: &ErrorEvent) -> ErrorPattern {
        self.ingest_at(event, Utc::now())
    }

    /// Ingest with an explicit clock, used by the facade and by tests
    pub fn ingest_at(&mut self, event: &ErrorEvent, now: Timestamp) -> ErrorPattern {
        let signature = self.extractor.extract(event);
        let timestamp = event.timestamp.unwrap_or(now);

        if !self.patterns.contains_key(&signature.pattern_hash) && self.is_full() {
            self.evict_least_recent();
        }

        let caps = self.caps;
        let pattern = self
            .patterns
            .entry(signature.pattern_hash.clone())
            .or_insert_with(|| ErrorPattern::new(signature, timestamp));
        pattern.record(event, timestamp, &caps);
        pattern.clone()
    }

    /// Look up a pattern by its hash
    pub fn get(&self, pattern_hash: &str) -> Option<&ErrorPattern> {
        self.patterns.get(pattern_hash)
    }

    /// Snapshot of a pattern by its hash
    pub fn snapshot(&self, pattern_hash: &str) -> Option<ErrorPattern> {
        self.patterns.get(pattern_hash).cloned()
    }

    /// Iterate over all tracked patterns
    pub fn patterns(&self) -> impl Iterator<Item = &ErrorPattern> {
        self.patterns.values()
    }

    /// Number of tracked patterns
    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// The `n` patterns with the highest occurrence counts, descending
    pub fn top_patterns(&self, n: usize) -> Vec<ErrorPattern> {
        let mut all: Vec<&ErrorPattern> = self.patterns.values().collect();
        all.sort_by(|a, b| b.count.cmp(&a.count));
        all.into_iter().take(n).cloned().collect()
    }

    /// Write back a trend score computed by the analysis cycle
    ///
    /// Returns false when the pattern no longer exists (e.g. evicted).
    pub fn set_trend_score(&mut self, pattern_hash: &str, score: f64) -> bool {
        match self.patterns.get_mut(pattern_hash) {
            Some(pattern) => {
                pattern.trend_score = score;
                true
            }
            None => false,
        }
    }

    /// Remove patterns whose last occurrence is older than `max_age`
    ///
    /// Returns the number of patterns removed.
    pub fn prune_stale(&mut self, max_age: Duration) -> usize {
        self.prune_stale_at(max_age, Utc::now())
    }

    /// Staleness pruning with an explicit clock
    pub fn prune_stale_at(&mut self, max_age: Duration, now: Timestamp) -> usize {
        let cutoff = now - max_age;
        let before = self.patterns.len();
        self.patterns
            .retain(|_, pattern| pattern.last_occurrence >= cutoff);
        before - self.patterns.len()
    }

    fn is_full(&self) -> bool {
        self.patterns.len() >= self.max_patterns
    }

    fn evict_least_recent(&mut self) {
        let oldest = self
            .patterns
            .iter()
            .min_by_key(|(_, pattern)| pattern.last_occurrence)
            .map(|(hash, _)| hash.clone());
        if let Some(hash) = oldest {
            log::debug!("Pattern cap reached, evicting least recently seen {}", hash);
            self.patterns.remove(&hash);
        }
    }
}

impl Default for PatternStore {
    fn default() -> Self {
        Self::new(
            SignatureExtractor::with_defaults(),
            DEFAULT_MAX_SAMPLES,
            DEFAULT_MAX_HISTORY,
            DEFAULT_MAX_PATTERNS,
        )
    }
}
