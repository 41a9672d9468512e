//! Prometheus metrics for background job workers.
//!
//! - **catalog**: the fixed set of worker metrics and their kinds
//! - **labels**: base label resolution (global > per-metric > explicit)
//! - **registry**: register/get/unregister facade over a backend
//! - **registrar**: startup registration of catalog groups
//! - **prometheus**: backend built on the `prometheus` crate
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sidekiq_prometheus::config::MetricsConfig;
//! use sidekiq_prometheus::metrics::{export_metrics, MetricRegistry, PrometheusBackend, Registrar};
//!
//! let backend = Arc::new(PrometheusBackend::new());
//! let registry = MetricRegistry::new(backend.clone(), Arc::new(MetricsConfig::from_env()?));
//! Registrar::new(&registry).register_configured()?;
//!
//! // Exposition text for a scrape endpoint
//! let metrics_text = export_metrics(&backend);
//! ```

pub mod backend;
pub mod catalog;
pub mod labels;
pub mod prometheus;
pub mod registrar;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{MetricHandle, MetricSpec, MetricsBackend};
pub use catalog::{MetricDefinition, MetricDescriptor, MetricGroup, MetricKind};
pub use labels::{label_set, resolve_base_labels, LabelSet};
pub use prometheus::{export_metrics, PrometheusBackend};
pub use registrar::Registrar;
pub use registry::MetricRegistry;
