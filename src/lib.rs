//! sidekiq_prometheus: Prometheus metrics for background job workers.
//!
//! Provides the metric catalog, base label resolution, a registry facade
//! over a metrics backend, startup registration, and middleware that
//! instruments every job execution.

pub mod cli;
pub mod config;
pub mod error;
pub mod job;
pub mod metrics;

pub use config::{ConfigError, MetricsConfig};
pub use error::MetricsError;
pub use job::{HasLabels, Job, JobMetrics};
pub use metrics::{MetricRegistry, PrometheusBackend, Registrar};
