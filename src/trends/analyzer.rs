//! Trend analysis over a pattern's occurrence history
//!
//! Partitions a pattern's timestamped occurrences into fixed-size windows and
//! derives growth rate (OLS slope), acceleration (mean second difference),
//! spike/sustained flags, and a naive linear projection of the next window.
//! Trends are recomputed from scratch on every analysis cycle and are not
//! persisted.

use crate::aggregator::ErrorPattern;
use crate::events::Timestamp;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

/// Policy thresholds for trend classification
///
/// These are tunable policy values, not architectural constants; they are
/// loaded from configuration and applied uniformly by the analyzer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrendConfig {
    /// Width of each aggregation window in minutes
    pub window_minutes: i64,
    /// Growth rate (occurrences per window per window index) above which a
    /// pattern is flagged as spiking
    pub spike_growth_threshold: f64,
    /// Number of trailing windows that must be non-decreasing for the
    /// sustained flag
    pub sustained_min_windows: usize,
    /// Minimum total occurrence count before a pattern can be sustained
    pub sustained_min_count: u64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            window_minutes: 10,
            spike_growth_threshold: 5.0,
            sustained_min_windows: 3,
            sustained_min_count: 20,
        }
    }
}

/// One fixed-size aggregation window
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TimeWindow {
    /// Inclusive start of the window
    pub start: Timestamp,
    /// Occurrences with `start <= ts < start + window`
    pub count: u64,
}

/// Derived time-series statistics for one pattern
///
/// References its pattern by hash; recomputed fresh on each analysis call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorTrend {
    /// Hash of the pattern this trend was computed from
    pub pattern_hash: String,
    /// Ordered, non-overlapping windows from first occurrence to now
    pub time_windows: Vec<TimeWindow>,
    /// OLS slope over window counts
    pub growth_rate: f64,
    /// Mean of second differences of window counts
    pub acceleration: f64,
    /// Naive forecast of the next window's count, when enough data exists
    pub projection: Option<f64>,
    /// Growth rate exceeded the spike threshold
    pub is_spike: bool,
    /// Positive growth held across the trailing windows of a busy pattern
    pub is_sustained: bool,
}

/// Computes [`ErrorTrend`]s from pattern occurrence histories
pub struct TrendAnalyzer {
    config: TrendConfig,
}

impl TrendAnalyzer {
    /// Create an analyzer with the given policy thresholds
    pub fn new(config: TrendConfig) -> Self {
        Self { config }
    }

    /// The policy thresholds in effect
    pub fn config(&self) -> &TrendConfig {
        &self.config
    }

    /// Analyze a pattern's occurrence history as of the current time
    pub fn analyze(&self, pattern: &ErrorPattern) -> ErrorTrend {
        self.analyze_at(pattern, Utc::now())
    }

    /// Analyze with an explicit clock, used by the facade and by tests
    pub fn analyze_at(&self, pattern: &ErrorPattern, now: Timestamp) -> ErrorTrend {
        let history: Vec<Timestamp> = pattern.occurrences.iter().copied().collect();
        let time_windows = self.create_time_windows(&history, now);

        let growth_rate = Self::linear_slope(&time_windows);
        let counts: Vec<u64> = time_windows.iter().map(|w| w.count).collect();
        let acceleration = Self::acceleration(&counts);

        let projection = if time_windows.len() >= 2 {
            let last = time_windows[time_windows.len() - 1].count as f64;
            Some((last + growth_rate).max(0.0))
        } else {
            None
        };

        let is_spike = growth_rate > self.config.spike_growth_threshold;
        let is_sustained = self.is_sustained(&counts, growth_rate, pattern.count);

        ErrorTrend {
            pattern_hash: pattern.signature.pattern_hash.clone(),
            time_windows,
            growth_rate,
            acceleration,
            projection,
            is_spike,
            is_sustained,
        }
    }

    /// Partition a history into fixed-size, non-overlapping windows
    ///
    /// Windows start at the earliest occurrence and run until `now`; the last
    /// window may be partial and still counts whatever falls in it. An empty
    /// history produces an empty window list.
    pub fn create_time_windows(&self, history: &[Timestamp], now: Timestamp) -> Vec<TimeWindow> {
        let Some(first) = history.iter().min().copied() else {
            return Vec::new();
        };
        let width = Duration::minutes(self.config.window_minutes);

        let mut sorted = history.to_vec();
        sorted.sort();

        let mut windows = Vec::new();
        let mut window_start = first;
        let mut cursor = 0;
        while window_start <= now {
            let window_end = window_start + width;
            let mut count = 0;
            while cursor < sorted.len() && sorted[cursor] < window_end {
                count += 1;
                cursor += 1;
            }
            windows.push(TimeWindow {
                start: window_start,
                count,
            });
            window_start = window_end;
        }
        windows
    }

    /// Ordinary least-squares slope over window counts
    ///
    /// x is the window index, y the count. Returns 0.0 for fewer than two
    /// windows or a degenerate denominator.
    pub fn linear_slope(windows: &[TimeWindow]) -> f64 {
        let n = windows.len();
        if n < 2 {
            return 0.0;
        }

        let n_f = n as f64;
        let mut sum_x = 0.0;
        let mut sum_y = 0.0;
        let mut sum_xy = 0.0;
        let mut sum_x2 = 0.0;
        for (i, window) in windows.iter().enumerate() {
            let x = i as f64;
            let y = window.count as f64;
            sum_x += x;
            sum_y += y;
            sum_xy += x * y;
            sum_x2 += x * x;
        }

        let denominator = n_f * sum_x2 - sum_x * sum_x;
        if denominator == 0.0 {
            return 0.0;
        }
        (n_f * sum_xy - sum_x * sum_y) / denominator
    }

    /// Mean of second differences of the count series
    ///
    /// Returns 0.0 when fewer than three data points exist.
    pub fn acceleration(counts: &[u64]) -> f64 {
        if counts.len() < 3 {
            return 0.0;
        }

        let first_diffs: Vec<f64> = counts
            .windows(2)
            .map(|pair| pair[1] as f64 - pair[0] as f64)
            .collect();
        let second_diffs: Vec<f64> = first_diffs
            .windows(2)
            .map(|pair| pair[1] - pair[0])
            .collect();
        if second_diffs.is_empty() {
            return 0.0;
        }
        second_diffs.iter().sum::<f64>() / second_diffs.len() as f64
    }

    fn is_sustained(&self, counts: &[u64], growth_rate: f64, pattern_count: u64) -> bool {
        let tail = self.config.sustained_min_windows;
        if counts.len() < tail || growth_rate <= 0.0 {
            return false;
        }
        if pattern_count <= self.config.sustained_min_count {
            return false;
        }
        counts[counts.len() - tail..]
            .windows(2)
            .all(|pair| pair[1] >= pair[0])
    }
}

impl Default for TrendAnalyzer {
    fn default() -> Self {
        Self::new(TrendConfig::default())
    }
}
