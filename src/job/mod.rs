//! Per-job instrumentation.
//!
//! - **Job**: what the host worker hands to the middleware (class name and,
//!   optionally, job-specific labels)
//! - **JobMetrics**: middleware recording count, duration, success/failure
//!   and allocations around a job body
//! - **CountingAllocator**: global allocator wrapper feeding allocation counts
//!
//! # Example
//!
//! ```rust,ignore
//! use sidekiq_prometheus::job::{HasLabels, Job, JobMetrics};
//! use sidekiq_prometheus::metrics::{label_set, LabelSet};
//!
//! struct SendInvoice { account: String }
//!
//! impl Job for SendInvoice {
//!     fn class_name(&self) -> &str { "SendInvoice" }
//!     fn label_source(&self) -> Option<&dyn HasLabels> { Some(self) }
//! }
//!
//! impl HasLabels for SendInvoice {
//!     fn labels(&self) -> LabelSet { label_set([("account", self.account.as_str())]) }
//! }
//!
//! let middleware = JobMetrics::new(registry);
//! let result: anyhow::Result<()> = middleware.call(&job, "mailers", || job.perform());
//! ```

pub mod allocations;
pub mod metrics;

pub use allocations::{AllocationCounter, CountingAllocator, ThreadAllocations};
pub use metrics::{JobMetrics, JobOutcome};

use crate::metrics::labels::LabelSet;

/// Job-specific labels attached to every per-job metric.
pub trait HasLabels {
    fn labels(&self) -> LabelSet;
}

/// A unit of work executed by the host worker.
pub trait Job {
    /// The job's type name, reported as the `class` label.
    fn class_name(&self) -> &str;

    /// The job's label provider, if it has one.
    fn label_source(&self) -> Option<&dyn HasLabels> {
        None
    }
}
