//! Signature extraction for grouping semantically-similar errors
//!
//! This module derives a stable fingerprint from a raw error event. The
//! fingerprint is the grouping key used by the pattern store: two errors with
//! the same type, module, function, and set of recognized key terms always
//! produce the same `pattern_hash`.

use crate::events::ErrorEvent;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Fallback for a missing error type
const UNKNOWN_TYPE: &str = "Unknown";
/// Fallback for a missing module or function name
const UNKNOWN_LOCATION: &str = "unknown";
/// Length of the truncated hex digest used as the grouping key
const PATTERN_HASH_LEN: usize = 16;

/// A deterministic fingerprint grouping semantically-similar errors
///
/// Immutable once computed. `pattern_hash` is the first 16 hex characters of
/// a SHA-256 digest over the identifying fields and the sorted key terms.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ErrorSignature {
    /// Error class or exception name
    pub error_type: String,
    /// Module that reported the error
    pub module: String,
    /// Function inside the module
    pub function: String,
    /// Truncated digest used as the grouping key
    pub pattern_hash: String,
    /// Domain key terms found in the message, sorted
    pub key_terms: Vec<String>,
}

/// Extracts stable signatures from raw error events
///
/// Holds the vocabulary of domain key terms scanned for in error messages.
/// Extraction is a pure function of the event: no side effects, no failures.
pub struct SignatureExtractor {
    key_terms: Vec<String>,
}

impl SignatureExtractor {
    /// Create an extractor with a custom key-term vocabulary
    pub fn new(key_terms: Vec<String>) -> Self {
        Self { key_terms }
    }

    /// Create an extractor with the default vocabulary of domain key terms
    pub fn with_defaults() -> Self {
        let terms = vec![
            "timeout".to_string(),
            "connection".to_string(),
            "deadlock".to_string(),
            "overflow".to_string(),
            "permission".to_string(),
            "memory".to_string(),
            "disk".to_string(),
            "unavailable".to_string(),
            "refused".to_string(),
            "corrupt".to_string(),
            "rate limit".to_string(),
            "authentication".to_string(),
        ];
        Self::new(terms)
    }

    /// Derive a signature from a raw error event
    ///
    /// Missing identifying fields fall back to `"Unknown"`/`"unknown"` and a
    /// missing message is treated as empty, so extraction always succeeds.
    /// Key terms are sorted before hashing: the hash does not depend on the
    /// order terms appear in the message.
    pub fn extract(&self, event: &ErrorEvent) -> ErrorSignature {
        let error_type = event.error_type.as_deref().unwrap_or(UNKNOWN_TYPE);
        let module = event.module.as_deref().unwrap_or(UNKNOWN_LOCATION);
        let function = event.function.as_deref().unwrap_or(UNKNOWN_LOCATION);
        let message = event.message.as_deref().unwrap_or("").to_lowercase();

        let mut key_terms: Vec<String> = self
            .key_terms
            .iter()
            .filter(|term| message.contains(term.as_str()))
            .cloned()
            .collect();
        key_terms.sort();

        let pattern_hash = Self::hash_components(error_type, module, function, &key_terms);

        ErrorSignature {
            error_type: error_type.to_string(),
            module: module.to_string(),
            function: function.to_string(),
            pattern_hash,
            key_terms,
        }
    }

    /// Number of terms in the vocabulary
    pub fn vocabulary_size(&self) -> usize {
        self.key_terms.len()
    }

    fn hash_components(
        error_type: &str,
        module: &str,
        function: &str,
        sorted_terms: &[String],
    ) -> String {
        let input = format!(
            "{}|{}|{}|{}",
            error_type,
            module,
            function,
            sorted_terms.join(" ")
        );
        let digest = Sha256::digest(input.as_bytes());
        let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        hex[..PATTERN_HASH_LEN].to_string()
    }
}

impl Default for SignatureExtractor {
    fn default() -> Self {
        Self::with_defaults()
    }
}
