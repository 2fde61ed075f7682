//! Core event types and enums for the error aggregation engine
//!
//! This module defines the fundamental data structures used throughout the crate
//! for representing raw error events and their severity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Timestamp type for consistent time handling across the crate
pub type Timestamp = DateTime<Utc>;

/// Severity level for error events and alerts
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational, no action required
    Info,
    /// Warning that may require attention
    Warning,
    /// Critical issue requiring immediate attention
    Critical,
}

/// A raw error event as reported by the host application
///
/// Every field except `context` is optional: error reports arrive from many
/// sources with inconsistent shapes, and ingestion must always succeed. The
/// signature extractor substitutes stable defaults for missing fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ErrorEvent {
    /// When the error occurred; defaults to ingestion time when absent
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
    /// Error class or exception name, e.g. "ValueError"
    #[serde(default)]
    pub error_type: Option<String>,
    /// Module or subsystem that reported the error
    #[serde(default)]
    pub module: Option<String>,
    /// Function or operation inside the module
    #[serde(default)]
    pub function: Option<String>,
    /// Free-text error message
    #[serde(default)]
    pub message: Option<String>,
    /// Reported severity; defaults to [`Severity::Warning`] when absent
    #[serde(default)]
    pub severity: Option<Severity>,
    /// Identifier of the affected user, if known
    #[serde(default)]
    pub user_id: Option<String>,
    /// Name of the logical operation that failed, if known
    #[serde(default)]
    pub operation: Option<String>,
    /// Arbitrary additional key-value context carried along with the event
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, serde_json::Value>,
}

impl ErrorEvent {
    /// Create an event with the three identifying fields and a message
    pub fn new(error_type: &str, module: &str, function: &str, message: &str) -> Self {
        Self {
            error_type: Some(error_type.to_string()),
            module: Some(module.to_string()),
            function: Some(function.to_string()),
            message: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// Set the severity, builder style
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    /// Set the affected user, builder style
    pub fn with_user(mut self, user_id: &str) -> Self {
        self.user_id = Some(user_id.to_string());
        self
    }

    /// Set the failing operation, builder style
    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_string());
        self
    }

    /// Set the event timestamp, builder style
    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Severity to record for this event, applying the default
    pub fn effective_severity(&self) -> Severity {
        self.severity.unwrap_or(Severity::Warning)
    }
}
