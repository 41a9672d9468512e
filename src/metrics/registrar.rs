//! Startup registration of catalog groups and configured custom metrics.

use tracing::info;

use crate::error::MetricsError;
use crate::metrics::catalog::{
    MetricDefinition, MetricDescriptor, GLOBAL_METRICS, JOB_GC_METRIC, JOB_METRICS,
    WORKER_GC_METRICS,
};
use crate::metrics::labels::LabelSet;
use crate::metrics::registry::MetricRegistry;

/// Registers groups of metrics through a [`MetricRegistry`].
///
/// Meant to run once, before any job executes. Every method stops at the
/// first failure; registration errors are configuration bugs and are never
/// retried.
#[derive(Debug, Clone, Copy)]
pub struct Registrar<'a> {
    registry: &'a MetricRegistry,
}

impl<'a> Registrar<'a> {
    pub fn new(registry: &'a MetricRegistry) -> Self {
        Self { registry }
    }

    pub fn register_group(&self, descriptors: &[MetricDescriptor]) -> Result<(), MetricsError> {
        for descriptor in descriptors {
            self.registry.register(descriptor, LabelSet::new())?;
        }
        Ok(())
    }

    pub fn register_definitions(
        &self,
        definitions: &[MetricDefinition],
    ) -> Result<(), MetricsError> {
        for definition in definitions {
            self.registry.register_definition(definition, LabelSet::new())?;
        }
        Ok(())
    }

    pub fn register_job_metrics(&self) -> Result<(), MetricsError> {
        self.register_group(JOB_METRICS)
    }

    pub fn register_job_gc_metric(&self) -> Result<(), MetricsError> {
        self.register_group(std::slice::from_ref(&JOB_GC_METRIC))
    }

    pub fn register_worker_gc_metrics(&self) -> Result<(), MetricsError> {
        self.register_group(WORKER_GC_METRICS)
    }

    pub fn register_global_metrics(&self) -> Result<(), MetricsError> {
        self.register_group(GLOBAL_METRICS)
    }

    /// Registers everything the configuration enables: job metrics always,
    /// the GC groups and global gauges when enabled, then custom metrics.
    pub fn register_configured(&self) -> Result<(), MetricsError> {
        let config = self.registry.config();

        self.register_job_metrics()?;

        if config.gc_metrics_enabled() {
            self.register_job_gc_metric()?;
            self.register_worker_gc_metrics()?;
        }

        if config.global_metrics_enabled() {
            self.register_global_metrics()?;
        }

        self.register_definitions(config.custom_metrics())?;

        info!(
            gc_metrics = config.gc_metrics_enabled(),
            global_metrics = config.global_metrics_enabled(),
            custom_metrics = config.custom_metrics().len(),
            "Metrics registered"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MetricsConfig;
    use crate::metrics::catalog::{self, names, MetricKind};
    use crate::metrics::testing::{Call, RecordingBackend};
    use std::sync::Arc;

    fn setup(config: MetricsConfig) -> (MetricRegistry, Arc<RecordingBackend>) {
        let backend = Arc::new(RecordingBackend::new());
        (MetricRegistry::new(backend.clone(), Arc::new(config)), backend)
    }

    fn created(backend: &RecordingBackend) -> Vec<String> {
        backend
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Create { name, .. } => Some(name),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_register_every_group_round_trip() {
        let (registry, _backend) = setup(MetricsConfig::default());
        let registrar = Registrar::new(&registry);

        registrar.register_job_metrics().expect("job metrics");
        registrar.register_job_gc_metric().expect("gc metric");
        registrar.register_worker_gc_metrics().expect("worker gc");
        registrar.register_global_metrics().expect("global");

        for descriptor in catalog::all() {
            let handle = registry.get(descriptor.name()).expect("registered");
            assert_eq!(handle.kind(), descriptor.kind, "{}", descriptor.name());
        }
    }

    #[test]
    fn test_register_group_is_fail_fast() {
        let (registry, backend) = setup(MetricsConfig::default());
        let registrar = Registrar::new(&registry);

        let definitions = vec![
            MetricDefinition::new("first_ok", "counter", "ok"),
            MetricDefinition::new("second_bad", "meter", "bad"),
            MetricDefinition::new("third_ok", "gauge", "never reached"),
        ];
        let err = registrar.register_definitions(&definitions).unwrap_err();

        assert!(matches!(err, MetricsError::InvalidMetricKind(ref k) if k == "meter"));
        assert_eq!(created(&backend), vec!["first_ok".to_string()]);
    }

    #[test]
    fn test_register_group_stops_on_duplicate() {
        let (registry, backend) = setup(MetricsConfig::default());
        let registrar = Registrar::new(&registry);

        let group = [
            MetricDescriptor::new("a_total", MetricKind::Counter, "a"),
            MetricDescriptor::new("a_total", MetricKind::Counter, "a again"),
            MetricDescriptor::new("b_total", MetricKind::Counter, "b"),
        ];
        let err = registrar.register_group(&group).unwrap_err();

        assert!(matches!(err, MetricsError::AlreadyRegistered(_)));
        assert_eq!(created(&backend), vec!["a_total".to_string()]);
    }

    #[test]
    fn test_register_configured_defaults() {
        let (registry, backend) = setup(MetricsConfig::default());
        Registrar::new(&registry)
            .register_configured()
            .expect("register configured");

        let expected: Vec<String> = JOB_METRICS
            .iter()
            .chain(std::iter::once(&JOB_GC_METRIC))
            .chain(WORKER_GC_METRICS.iter())
            .chain(GLOBAL_METRICS.iter())
            .map(|d| d.name().to_string())
            .collect();
        assert_eq!(created(&backend), expected);
    }

    #[test]
    fn test_register_configured_respects_flags_and_custom_metrics() {
        let config = MetricsConfig::default()
            .with_gc_metrics(false)
            .with_global_metrics(false)
            .with_custom_metric(MetricDefinition::new("app_emails_sent", "counter", "Emails"));
        let (registry, backend) = setup(config);

        Registrar::new(&registry)
            .register_configured()
            .expect("register configured");

        let names_created = created(&backend);
        assert_eq!(
            names_created,
            vec![
                names::JOB_COUNT.to_string(),
                names::JOB_DURATION.to_string(),
                names::JOB_FAILED.to_string(),
                names::JOB_SUCCESS.to_string(),
                "app_emails_sent".to_string(),
            ]
        );
        assert!(registry.get(names::JOB_ALLOCATED_OBJECTS).is_err());
        assert!(registry.get(names::WORKERS_SIZE).is_err());
    }
}
