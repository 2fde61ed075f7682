/// Error types for rule evaluation and configuration
pub mod error;

/// Core event types and severity
pub mod events;

/// Signature extraction for error grouping
pub mod signature;

/// Pattern aggregation keyed by signature
pub mod aggregator;

/// Time-windowed trend analysis
pub mod trends;

/// Alert rules, conditions, and the alert engine
pub mod alerts;

/// Configuration management
pub mod config;

/// The composed aggregation system facade
pub mod system;

// Re-export commonly used types
pub use aggregator::{ErrorPattern, PatternStore};
pub use alerts::{AlertEngine, AlertRule, ErrorAlert};
pub use config::AggregationConfig;
pub use error::{ConfigError, RuleError};
pub use events::{ErrorEvent, Severity, Timestamp};
pub use signature::{ErrorSignature, SignatureExtractor};
pub use system::AggregationSystem;
pub use trends::{ErrorTrend, TrendAnalyzer, TrendConfig};
