//! Typed register/get/unregister facade over a metrics backend.

use std::sync::Arc;

use tracing::debug;

use crate::config::MetricsConfig;
use crate::error::MetricsError;
use crate::metrics::backend::{MetricHandle, MetricSpec, MetricsBackend};
use crate::metrics::catalog::{MetricDefinition, MetricDescriptor};
use crate::metrics::labels::{resolve_base_labels, LabelSet};

/// The instrumentation core's only entry point into the metrics backend.
///
/// Holds no metric handles of its own: every `get` goes back to the backend,
/// so an unregister followed by a re-register is always observed.
#[derive(Clone)]
pub struct MetricRegistry {
    backend: Arc<dyn MetricsBackend>,
    config: Arc<MetricsConfig>,
}

impl std::fmt::Debug for MetricRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricRegistry")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl MetricRegistry {
    pub fn new(backend: Arc<dyn MetricsBackend>, config: Arc<MetricsConfig>) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    /// Registers a metric with labels resolved from `explicit`, the metric's
    /// custom labels and the global base labels.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyRegistered` if the name is taken, and any error the
    /// backend raises while creating the metric.
    pub fn register(
        &self,
        descriptor: &MetricDescriptor,
        explicit: LabelSet,
    ) -> Result<Arc<dyn MetricHandle>, MetricsError> {
        let base_labels = resolve_base_labels(&self.config, descriptor.name(), explicit);

        let handle = self.backend.create(MetricSpec {
            kind: descriptor.kind,
            name: descriptor.name(),
            help: &descriptor.help,
            base_labels: &base_labels,
            buckets: descriptor.buckets(),
        })?;

        debug!(
            metric = descriptor.name(),
            kind = %descriptor.kind,
            labels = ?base_labels,
            "Registered metric"
        );

        Ok(handle)
    }

    /// Registers a metric whose kind is still textual.
    ///
    /// An unknown kind fails with `InvalidMetricKind` before the backend is
    /// touched.
    pub fn register_definition(
        &self,
        definition: &MetricDefinition,
        explicit: LabelSet,
    ) -> Result<Arc<dyn MetricHandle>, MetricsError> {
        let descriptor = definition.to_descriptor()?;
        self.register(&descriptor, explicit)
    }

    /// Looks up a registered metric by name. Never creates.
    pub fn get(&self, name: &str) -> Result<Arc<dyn MetricHandle>, MetricsError> {
        self.backend
            .get(name)
            .ok_or_else(|| MetricsError::NotFound(name.to_string()))
    }

    /// Removes a metric. Unknown names are a no-op.
    pub fn unregister(&self, name: &str) -> bool {
        let removed = self.backend.unregister(name);
        if removed {
            debug!(metric = name, "Unregistered metric");
        }
        removed
    }
}
