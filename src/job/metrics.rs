//! Middleware recording per-job metrics around a job body.
//!
//! Every invocation increments `sidekiq_job_count` before the body runs and
//! then records exactly one outcome:
//!
//! - **Succeeded**: `sidekiq_job_success`, `sidekiq_job_duration` and (when GC
//!   metrics are enabled) `sidekiq_job_allocated_objects`
//! - **Failed**: `sidekiq_job_failed` only, whether the body returned an error
//!   or panicked

use std::fmt;
use std::time::Instant;

use tracing::{trace, warn};

use crate::error::MetricsError;
use crate::metrics::catalog::names;
use crate::metrics::labels::LabelSet;
use crate::metrics::registry::MetricRegistry;

use super::allocations::{AllocationCounter, ThreadAllocations};
use super::Job;

/// Terminal state of an instrumented job execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed,
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobOutcome::Succeeded => write!(f, "succeeded"),
            JobOutcome::Failed => write!(f, "failed"),
        }
    }
}

/// Job instrumentation middleware.
///
/// Looks metrics up by name on every call, so they must be registered (see
/// [`Registrar`](crate::metrics::Registrar)) before jobs run.
#[derive(Debug, Clone)]
pub struct JobMetrics<A = ThreadAllocations> {
    registry: MetricRegistry,
    allocations: A,
}

impl JobMetrics<ThreadAllocations> {
    /// Creates middleware reading allocation counts from
    /// [`CountingAllocator`](super::CountingAllocator).
    pub fn new(registry: MetricRegistry) -> Self {
        Self::with_allocation_counter(registry, ThreadAllocations)
    }
}

impl<A: AllocationCounter> JobMetrics<A> {
    pub fn with_allocation_counter(registry: MetricRegistry, allocations: A) -> Self {
        Self {
            registry,
            allocations,
        }
    }

    /// Runs `body` for `job` pulled from `queue`, recording job metrics.
    ///
    /// The body's `Ok` value and `Err` value are returned unchanged. Metric
    /// lookup or recording errors before the body runs, or after it succeeds,
    /// are returned as `E`. A recording error after the body failed is logged
    /// and the body's error is returned.
    pub fn call<J, T, E, F>(&self, job: &J, queue: &str, body: F) -> Result<T, E>
    where
        J: Job + ?Sized,
        F: FnOnce() -> Result<T, E>,
        E: From<MetricsError>,
    {
        let labels = job_labels(job, queue);
        self.registry.get(names::JOB_COUNT)?.increment(&labels)?;

        let guard = UnwindGuard {
            metrics: self,
            labels: &labels,
            armed: true,
        };
        let started = Instant::now();
        let allocated_before = self.allocations.allocated_objects();

        let outcome = body();

        let allocated = self
            .allocations
            .allocated_objects()
            .saturating_sub(allocated_before);
        let duration = started.elapsed().as_secs_f64();
        guard.disarm();

        match outcome {
            Ok(value) => {
                self.record_success(&labels, duration, allocated)?;
                Ok(value)
            }
            Err(err) => {
                self.record_failure(&labels);
                Err(err)
            }
        }
    }

    fn record_success(
        &self,
        labels: &LabelSet,
        duration_secs: f64,
        allocated: u64,
    ) -> Result<(), MetricsError> {
        self.registry.get(names::JOB_SUCCESS)?.increment(labels)?;
        self.registry
            .get(names::JOB_DURATION)?
            .observe(labels, duration_secs)?;

        if self.registry.config().gc_metrics_enabled() {
            self.registry
                .get(names::JOB_ALLOCATED_OBJECTS)?
                .observe(labels, allocated as f64)?;
        }

        trace!(
            outcome = %JobOutcome::Succeeded,
            labels = ?labels,
            duration_secs = duration_secs,
            allocated_objects = allocated,
            "Recorded job metrics"
        );
        Ok(())
    }

    fn record_failure(&self, labels: &LabelSet) {
        let recorded = self
            .registry
            .get(names::JOB_FAILED)
            .and_then(|metric| metric.increment(labels));

        match recorded {
            Ok(()) => trace!(outcome = %JobOutcome::Failed, labels = ?labels, "Recorded job metrics"),
            Err(e) => warn!(
                metric = names::JOB_FAILED,
                labels = ?labels,
                error = %e,
                "Failed to record job failure"
            ),
        }
    }
}

/// Base labels of a job merged with its own labels; the job's labels win.
fn job_labels<J: Job + ?Sized>(job: &J, queue: &str) -> LabelSet {
    let mut labels = LabelSet::new();
    labels.insert("class".to_string(), job.class_name().to_string());
    labels.insert("queue".to_string(), queue.to_string());

    if let Some(source) = job.label_source() {
        labels.extend(source.labels());
    }
    labels
}

/// Records a failure if the body unwinds instead of returning.
struct UnwindGuard<'a, A: AllocationCounter> {
    metrics: &'a JobMetrics<A>,
    labels: &'a LabelSet,
    armed: bool,
}

impl<A: AllocationCounter> UnwindGuard<'_, A> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<A: AllocationCounter> Drop for UnwindGuard<'_, A> {
    fn drop(&mut self) {
        if self.armed {
            self.metrics.record_failure(self.labels);
        }
    }
}
