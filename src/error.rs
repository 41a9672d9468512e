//! Error types for metric registration and recording.
//!
//! Registration errors are configuration bugs and are never retried:
//! - Unknown metric kinds in textual definitions
//! - Duplicate registrations and invalid histogram buckets
//! - Lookups of names that were never registered
//! - Errors raised by the Prometheus client itself

use thiserror::Error;

use crate::metrics::catalog::MetricKind;

/// Errors that can occur while registering, looking up or recording metrics.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Invalid metric kind '{0}': must be one of counter, gauge, histogram, summary")]
    InvalidMetricKind(String),

    #[error("Metric '{0}' not found in registry")]
    NotFound(String),

    #[error("Metric '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("Invalid buckets for histogram '{name}': {reason}")]
    InvalidBuckets { name: String, reason: String },

    #[error("Metric '{name}' of kind {kind} does not support {operation}")]
    UnsupportedOperation {
        name: String,
        kind: MetricKind,
        operation: &'static str,
    },

    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

impl MetricsError {
    /// Returns whether this error came from looking up an unregistered metric.
    pub fn is_not_found(&self) -> bool {
        matches!(self, MetricsError::NotFound(_))
    }
}
