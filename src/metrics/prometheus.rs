//! Prometheus-backed metric storage and text exposition.
//!
//! Each registered metric is a custom collector holding one metric vector
//! per distinct set of label names, so jobs of different types can attach
//! different label keys to the same metric name. All vectors of a metric
//! are gathered into a single family at scrape time.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use tracing::debug;

use crate::error::MetricsError;
use crate::metrics::backend::{unsupported, MetricHandle, MetricSpec, MetricsBackend};
use crate::metrics::catalog::MetricKind;
use crate::metrics::labels::LabelSet;

/// A metrics backend storing everything in a `prometheus::Registry`.
#[derive(Default)]
pub struct PrometheusBackend {
    registry: Registry,
    metrics: DashMap<String, DynamicMetric>,
}

impl std::fmt::Debug for PrometheusBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusBackend")
            .field("metrics", &self.metrics.len())
            .finish()
    }
}

impl PrometheusBackend {
    /// Creates a backend with a fresh, empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend registering into an existing registry, e.g. one
    /// shared with other collectors of the host process.
    pub fn with_registry(registry: Registry) -> Self {
        Self {
            registry,
            metrics: DashMap::new(),
        }
    }

    /// The underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl MetricsBackend for PrometheusBackend {
    fn create(&self, spec: MetricSpec<'_>) -> Result<Arc<dyn MetricHandle>, MetricsError> {
        if self.metrics.contains_key(spec.name) {
            return Err(MetricsError::AlreadyRegistered(spec.name.to_string()));
        }

        let metric = DynamicMetric::new(spec)?;
        self.registry.register(Box::new(metric.clone())).map_err(|e| match e {
            prometheus::Error::AlreadyReg => MetricsError::AlreadyRegistered(spec.name.to_string()),
            other => MetricsError::Prometheus(other),
        })?;
        self.metrics.insert(spec.name.to_string(), metric.clone());

        Ok(Arc::new(metric))
    }

    fn get(&self, name: &str) -> Option<Arc<dyn MetricHandle>> {
        self.metrics
            .get(name)
            .map(|entry| Arc::new(entry.value().clone()) as Arc<dyn MetricHandle>)
    }

    fn unregister(&self, name: &str) -> bool {
        let Some((_, metric)) = self.metrics.remove(name) else {
            return false;
        };

        if let Err(e) = self.registry.unregister(Box::new(metric)) {
            debug!(metric = name, error = %e, "Metric was not present in Prometheus registry");
        }
        true
    }
}

/// Export all metrics registered in `backend` in Prometheus text format.
///
/// Encoding failures are rendered as a comment line so the output stays
/// scrapeable.
pub fn export_metrics(backend: &PrometheusBackend) -> String {
    let encoder = TextEncoder::new();
    let metric_families = backend.registry().gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}

/// One metric vector for a fixed set of label names.
#[derive(Clone)]
enum Series {
    Counter(CounterVec),
    Gauge(GaugeVec),
    Histogram(HistogramVec),
}

impl Series {
    fn collect(&self) -> Vec<MetricFamily> {
        match self {
            Series::Counter(vec) => vec.collect(),
            Series::Gauge(vec) => vec.collect(),
            Series::Histogram(vec) => vec.collect(),
        }
    }
}

struct MetricInner {
    name: String,
    help: String,
    kind: MetricKind,
    base_labels: LabelSet,
    buckets: Option<Vec<f64>>,
    desc: Desc,
    series: DashMap<Vec<String>, Series>,
}

/// A registered metric whose label names are only known at observation time.
#[derive(Clone)]
pub struct DynamicMetric {
    inner: Arc<MetricInner>,
}

impl std::fmt::Debug for DynamicMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicMetric")
            .field("name", &self.inner.name)
            .field("kind", &self.inner.kind)
            .field("base_labels", &self.inner.base_labels)
            .field("series", &self.inner.series.len())
            .finish()
    }
}

impl DynamicMetric {
    fn new(spec: MetricSpec<'_>) -> Result<Self, MetricsError> {
        let buckets = match (spec.kind, spec.buckets) {
            (MetricKind::Histogram, Some(buckets)) => {
                validate_buckets(spec.name, buckets)?;
                Some(buckets.to_vec())
            }
            _ => None,
        };

        let const_labels: HashMap<String, String> = spec
            .base_labels
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let desc = Desc::new(
            spec.name.to_string(),
            spec.help.to_string(),
            Vec::new(),
            const_labels,
        )?;

        Ok(Self {
            inner: Arc::new(MetricInner {
                name: spec.name.to_string(),
                help: spec.help.to_string(),
                kind: spec.kind,
                base_labels: spec.base_labels.clone(),
                buckets,
                desc,
                series: DashMap::new(),
            }),
        })
    }

    /// Runs `f` against the series for `labels` merged over the base labels,
    /// creating the series on first use.
    fn with_series<F>(&self, labels: &LabelSet, f: F) -> Result<(), MetricsError>
    where
        F: FnOnce(&Series, &[&str]) -> Result<(), MetricsError>,
    {
        let mut merged = self.inner.base_labels.clone();
        merged.extend(labels.iter().map(|(k, v)| (k.clone(), v.clone())));

        let names: Vec<String> = merged.keys().cloned().collect();
        let values: Vec<&str> = merged.values().map(String::as_str).collect();

        if let Some(series) = self.inner.series.get(&names) {
            return f(series.value(), &values);
        }

        let created = self.build_series(&names)?;
        let series = self.inner.series.entry(names).or_insert(created);
        f(series.value(), &values)
    }

    fn build_series(&self, label_names: &[String]) -> Result<Series, MetricsError> {
        let inner = &self.inner;
        let label_names: Vec<&str> = label_names.iter().map(String::as_str).collect();

        let series = match inner.kind {
            MetricKind::Counter => Series::Counter(CounterVec::new(
                Opts::new(inner.name.clone(), inner.help.clone()),
                &label_names,
            )?),
            MetricKind::Gauge => Series::Gauge(GaugeVec::new(
                Opts::new(inner.name.clone(), inner.help.clone()),
                &label_names,
            )?),
            // No client-side quantiles in `prometheus`: summaries are exported
            // as histograms with the default buckets.
            MetricKind::Histogram | MetricKind::Summary => {
                let mut opts = HistogramOpts::new(inner.name.clone(), inner.help.clone());
                if let Some(buckets) = &inner.buckets {
                    opts = opts.buckets(buckets.clone());
                }
                Series::Histogram(HistogramVec::new(opts, &label_names)?)
            }
        };

        Ok(series)
    }
}

fn validate_buckets(name: &str, buckets: &[f64]) -> Result<(), MetricsError> {
    if buckets.is_empty() {
        return Err(MetricsError::InvalidBuckets {
            name: name.to_string(),
            reason: "bucket list is empty".to_string(),
        });
    }

    if buckets.iter().any(|b| !b.is_finite()) {
        return Err(MetricsError::InvalidBuckets {
            name: name.to_string(),
            reason: "buckets must be finite".to_string(),
        });
    }

    if !buckets.windows(2).all(|w| w[0] < w[1]) {
        return Err(MetricsError::InvalidBuckets {
            name: name.to_string(),
            reason: "buckets must be strictly increasing".to_string(),
        });
    }

    Ok(())
}

impl Collector for DynamicMetric {
    fn desc(&self) -> Vec<&Desc> {
        vec![&self.inner.desc]
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.inner
            .series
            .iter()
            .flat_map(|entry| entry.value().collect())
            .collect()
    }
}

impl MetricHandle for DynamicMetric {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn kind(&self) -> MetricKind {
        self.inner.kind
    }

    fn increment(&self, labels: &LabelSet) -> Result<(), MetricsError> {
        if !matches!(self.inner.kind, MetricKind::Counter | MetricKind::Gauge) {
            return Err(unsupported(self, "increment"));
        }

        self.with_series(labels, |series, values| {
            match series {
                Series::Counter(vec) => vec.get_metric_with_label_values(values)?.inc(),
                Series::Gauge(vec) => vec.get_metric_with_label_values(values)?.inc(),
                Series::Histogram(_) => return Err(unsupported(self, "increment")),
            }
            Ok(())
        })
    }

    fn observe(&self, labels: &LabelSet, value: f64) -> Result<(), MetricsError> {
        if !matches!(self.inner.kind, MetricKind::Histogram | MetricKind::Summary) {
            return Err(unsupported(self, "observe"));
        }

        self.with_series(labels, |series, values| match series {
            Series::Histogram(vec) => {
                vec.get_metric_with_label_values(values)?.observe(value);
                Ok(())
            }
            _ => Err(unsupported(self, "observe")),
        })
    }

    fn set(&self, labels: &LabelSet, value: f64) -> Result<(), MetricsError> {
        if self.inner.kind != MetricKind::Gauge {
            return Err(unsupported(self, "set"));
        }

        self.with_series(labels, |series, values| match series {
            Series::Gauge(vec) => {
                vec.get_metric_with_label_values(values)?.set(value);
                Ok(())
            }
            _ => Err(unsupported(self, "set")),
        })
    }
}
