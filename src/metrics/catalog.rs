//! The fixed catalog of metrics exported by an instrumented worker.
//!
//! Metric names are a wire contract with existing dashboards and must not
//! change. New metrics are added here, never at runtime.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MetricsError;

/// Metric names as they appear in the exposition.
pub mod names {
    pub const WORKERS_SIZE: &str = "sidekiq_workers_size";
    pub const DEAD_SIZE: &str = "sidekiq_dead_size";
    pub const ENQUEUED: &str = "sidekiq_enqueued";
    pub const QUEUE_LATENCY: &str = "sidekiq_queue_latency";
    pub const FAILED: &str = "sidekiq_failed";
    pub const PROCESSED: &str = "sidekiq_processed";
    pub const RETRY_SIZE: &str = "sidekiq_retry_size";
    pub const SCHEDULED_SIZE: &str = "sidekiq_scheduled_size";
    pub const REDIS_CONNECTED_CLIENTS: &str = "sidekiq_redis_connected_clients";
    pub const REDIS_USED_MEMORY: &str = "sidekiq_redis_used_memory";
    pub const REDIS_USED_MEMORY_PEAK: &str = "sidekiq_redis_used_memory_peak";
    pub const REDIS_KEYS: &str = "sidekiq_redis_keys";
    pub const REDIS_EXPIRES: &str = "sidekiq_redis_expires";

    pub const JOB_COUNT: &str = "sidekiq_job_count";
    pub const JOB_DURATION: &str = "sidekiq_job_duration";
    pub const JOB_FAILED: &str = "sidekiq_job_failed";
    pub const JOB_SUCCESS: &str = "sidekiq_job_success";
    pub const JOB_ALLOCATED_OBJECTS: &str = "sidekiq_job_allocated_objects";

    pub const ALLOCATED_OBJECTS: &str = "sidekiq_allocated_objects";
    pub const HEAP_FREE_SLOTS: &str = "sidekiq_heap_free_slots";
    pub const HEAP_LIVE_SLOTS: &str = "sidekiq_heap_live_slots";
    pub const MAJOR_GC_COUNT: &str = "sidekiq_major_gc_count";
    pub const MINOR_GC_COUNT: &str = "sidekiq_minor_gc_count";
    pub const RSS: &str = "sidekiq_rss";
}

/// Covers: 10 to 25M allocations per job.
pub const JOB_ALLOCATION_BUCKETS: &[f64] = &[
    10.0,
    50.0,
    100.0,
    500.0,
    1_000.0,
    2_500.0,
    5_000.0,
    10_000.0,
    50_000.0,
    100_000.0,
    500_000.0,
    1_000_000.0,
    5_000_000.0,
    10_000_000.0,
    25_000_000.0,
];

/// The kinds of metric a backend can create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
    Summary,
}

impl MetricKind {
    pub const ALL: [MetricKind; 4] = [
        MetricKind::Counter,
        MetricKind::Gauge,
        MetricKind::Histogram,
        MetricKind::Summary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
            MetricKind::Summary => "summary",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "counter" => Ok(MetricKind::Counter),
            "gauge" => Ok(MetricKind::Gauge),
            "histogram" => Ok(MetricKind::Histogram),
            "summary" => Ok(MetricKind::Summary),
            _ => Err(MetricsError::InvalidMetricKind(s.to_string())),
        }
    }
}

/// Immutable description of a metric: name, kind, help text and, for
/// histograms, optional fixed bucket boundaries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricDescriptor {
    pub name: Cow<'static, str>,
    pub kind: MetricKind,
    pub help: Cow<'static, str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buckets: Option<Cow<'static, [f64]>>,
}

impl MetricDescriptor {
    pub const fn new(name: &'static str, kind: MetricKind, help: &'static str) -> Self {
        Self {
            name: Cow::Borrowed(name),
            kind,
            help: Cow::Borrowed(help),
            buckets: None,
        }
    }

    pub const fn histogram(name: &'static str, help: &'static str, buckets: &'static [f64]) -> Self {
        Self {
            name: Cow::Borrowed(name),
            kind: MetricKind::Histogram,
            help: Cow::Borrowed(help),
            buckets: Some(Cow::Borrowed(buckets)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn buckets(&self) -> Option<&[f64]> {
        self.buckets.as_deref()
    }
}

/// A metric declared in configuration, with its kind still in textual form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDefinition {
    pub name: String,
    pub kind: String,
    #[serde(alias = "docstring")]
    pub help: String,
    #[serde(default)]
    pub buckets: Option<Vec<f64>>,
}

impl MetricDefinition {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            help: help.into(),
            buckets: None,
        }
    }

    pub fn with_buckets(mut self, buckets: Vec<f64>) -> Self {
        self.buckets = Some(buckets);
        self
    }

    /// Parses the textual kind, failing with `InvalidMetricKind` for anything
    /// outside the four supported kinds.
    pub fn to_descriptor(&self) -> Result<MetricDescriptor, MetricsError> {
        let kind = self.kind.parse::<MetricKind>()?;
        Ok(MetricDescriptor {
            name: Cow::Owned(self.name.clone()),
            kind,
            help: Cow::Owned(self.help.clone()),
            buckets: self.buckets.clone().map(Cow::Owned),
        })
    }
}

/// Gauges describing queue, worker and Redis state.
pub static GLOBAL_METRICS: &[MetricDescriptor] = &[
    MetricDescriptor::new(
        names::WORKERS_SIZE,
        MetricKind::Gauge,
        "Total number of workers processing jobs",
    ),
    MetricDescriptor::new(names::DEAD_SIZE, MetricKind::Gauge, "Total Dead Size"),
    MetricDescriptor::new(
        names::ENQUEUED,
        MetricKind::Gauge,
        "Total Size of all known queues",
    ),
    MetricDescriptor::new(
        names::QUEUE_LATENCY,
        MetricKind::Summary,
        "Latency (in seconds) of all queues",
    ),
    MetricDescriptor::new(
        names::FAILED,
        MetricKind::Gauge,
        "Number of job executions which raised an error",
    ),
    MetricDescriptor::new(
        names::PROCESSED,
        MetricKind::Gauge,
        "Number of job executions completed (success or failure)",
    ),
    MetricDescriptor::new(names::RETRY_SIZE, MetricKind::Gauge, "Total Retries Size"),
    MetricDescriptor::new(
        names::SCHEDULED_SIZE,
        MetricKind::Gauge,
        "Total Scheduled Size",
    ),
    MetricDescriptor::new(
        names::REDIS_CONNECTED_CLIENTS,
        MetricKind::Gauge,
        "Number of clients connected to Redis instance for Sidekiq",
    ),
    MetricDescriptor::new(
        names::REDIS_USED_MEMORY,
        MetricKind::Gauge,
        "Used memory from Redis.info",
    ),
    MetricDescriptor::new(
        names::REDIS_USED_MEMORY_PEAK,
        MetricKind::Gauge,
        "Used memory peak from Redis.info",
    ),
    MetricDescriptor::new(names::REDIS_KEYS, MetricKind::Gauge, "Number of redis keys"),
    MetricDescriptor::new(
        names::REDIS_EXPIRES,
        MetricKind::Gauge,
        "Number of redis keys with expiry set",
    ),
];

/// Per-job counters and the duration histogram.
pub static JOB_METRICS: &[MetricDescriptor] = &[
    MetricDescriptor::new(names::JOB_COUNT, MetricKind::Counter, "Count of Sidekiq jobs"),
    MetricDescriptor::new(
        names::JOB_DURATION,
        MetricKind::Histogram,
        "Sidekiq job processing duration",
    ),
    MetricDescriptor::new(
        names::JOB_FAILED,
        MetricKind::Counter,
        "Count of failed Sidekiq jobs",
    ),
    MetricDescriptor::new(
        names::JOB_SUCCESS,
        MetricKind::Counter,
        "Count of successful Sidekiq jobs",
    ),
];

/// Per-job allocation histogram.
pub static JOB_GC_METRIC: MetricDescriptor = MetricDescriptor::histogram(
    names::JOB_ALLOCATED_OBJECTS,
    "Count of objects allocated by a Sidekiq job",
    JOB_ALLOCATION_BUCKETS,
);

/// Per-worker-process allocation and heap statistics.
pub static WORKER_GC_METRICS: &[MetricDescriptor] = &[
    MetricDescriptor::new(
        names::ALLOCATED_OBJECTS,
        MetricKind::Counter,
        "Count of objects allocated by a Sidekiq worker",
    ),
    MetricDescriptor::new(
        names::HEAP_FREE_SLOTS,
        MetricKind::Gauge,
        "Sidekiq worker heap free slots",
    ),
    MetricDescriptor::new(
        names::HEAP_LIVE_SLOTS,
        MetricKind::Gauge,
        "Sidekiq worker heap live slots",
    ),
    MetricDescriptor::new(
        names::MAJOR_GC_COUNT,
        MetricKind::Counter,
        "Sidekiq worker major GC count",
    ),
    MetricDescriptor::new(
        names::MINOR_GC_COUNT,
        MetricKind::Counter,
        "Sidekiq worker minor GC count",
    ),
    MetricDescriptor::new(names::RSS, MetricKind::Gauge, "Sidekiq process RSS"),
];

/// Named groups of the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricGroup {
    Global,
    Job,
    JobGc,
    WorkerGc,
}

impl MetricGroup {
    pub const ALL: [MetricGroup; 4] = [
        MetricGroup::Global,
        MetricGroup::Job,
        MetricGroup::JobGc,
        MetricGroup::WorkerGc,
    ];

    pub fn descriptors(&self) -> &'static [MetricDescriptor] {
        match self {
            MetricGroup::Global => GLOBAL_METRICS,
            MetricGroup::Job => JOB_METRICS,
            MetricGroup::JobGc => std::slice::from_ref(&JOB_GC_METRIC),
            MetricGroup::WorkerGc => WORKER_GC_METRICS,
        }
    }
}

impl fmt::Display for MetricGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricGroup::Global => write!(f, "global"),
            MetricGroup::Job => write!(f, "job"),
            MetricGroup::JobGc => write!(f, "job_gc"),
            MetricGroup::WorkerGc => write!(f, "worker_gc"),
        }
    }
}

/// Every descriptor in the catalog, group by group.
pub fn all() -> impl Iterator<Item = &'static MetricDescriptor> {
    MetricGroup::ALL
        .into_iter()
        .flat_map(|group| group.descriptors().iter())
}

/// Looks up a catalog descriptor by name.
pub fn find(name: &str) -> Option<&'static MetricDescriptor> {
    all().find(|descriptor| descriptor.name() == name)
}
