//! The seam between the instrumentation core and the metrics store.
//!
//! A backend owns metric storage, thread-safe mutation and exposition. The
//! core only creates metrics, looks them up by name and records into them.

use std::fmt;
use std::sync::Arc;

use crate::error::MetricsError;
use crate::metrics::catalog::MetricKind;
use crate::metrics::labels::LabelSet;

/// Everything a backend needs to create one metric.
#[derive(Debug, Clone, Copy)]
pub struct MetricSpec<'a> {
    pub kind: MetricKind,
    pub name: &'a str,
    pub help: &'a str,
    pub base_labels: &'a LabelSet,
    pub buckets: Option<&'a [f64]>,
}

/// A metrics store that can create, find and remove metrics by name.
///
/// Implementations must be safe to share across worker threads.
pub trait MetricsBackend: Send + Sync {
    /// Creates and stores a metric. Fails if the name is already taken.
    fn create(&self, spec: MetricSpec<'_>) -> Result<Arc<dyn MetricHandle>, MetricsError>;

    /// Looks up a live metric by name.
    fn get(&self, name: &str) -> Option<Arc<dyn MetricHandle>>;

    /// Removes a metric. Returns whether anything was removed.
    fn unregister(&self, name: &str) -> bool;
}

/// A live, registered metric.
///
/// `labels` are the dynamic labels of one observation; the backend merges
/// them over the metric's base labels.
pub trait MetricHandle: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn kind(&self) -> MetricKind;

    /// Adds one. Supported by counters and gauges.
    fn increment(&self, labels: &LabelSet) -> Result<(), MetricsError>;

    /// Records a sample. Supported by histograms and summaries.
    fn observe(&self, labels: &LabelSet, value: f64) -> Result<(), MetricsError>;

    /// Sets the current value. Supported by gauges.
    fn set(&self, labels: &LabelSet, value: f64) -> Result<(), MetricsError>;
}

/// Error for an operation the metric's kind does not support.
pub(crate) fn unsupported(
    handle: &dyn MetricHandle,
    operation: &'static str,
) -> MetricsError {
    MetricsError::UnsupportedOperation {
        name: handle.name().to_string(),
        kind: handle.kind(),
        operation,
    }
}
