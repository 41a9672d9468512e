//! In-memory backend that records every call, for unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::MetricsError;
use crate::metrics::backend::{unsupported, MetricHandle, MetricSpec, MetricsBackend};
use crate::metrics::catalog::MetricKind;
use crate::metrics::labels::LabelSet;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Create {
        name: String,
        kind: MetricKind,
        base_labels: LabelSet,
        buckets: Option<Vec<f64>>,
    },
    Get(String),
    Unregister(String),
    Increment(String, LabelSet),
    Observe(String, LabelSet, f64),
    Set(String, LabelSet, f64),
}

type CallLog = Arc<Mutex<Vec<Call>>>;

#[derive(Default)]
pub(crate) struct RecordingBackend {
    calls: CallLog,
    metrics: Mutex<HashMap<String, MetricKind>>,
    on_increment: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl RecordingBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Runs `hook` on every increment, to simulate work inside the backend.
    pub(crate) fn with_increment_hook(hook: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            on_increment: Some(Arc::new(hook)),
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("call log").clone()
    }

    /// Names passed to `get`, in order.
    pub(crate) fn lookups(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Get(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    /// Recording calls (increment/observe/set) only.
    pub(crate) fn recordings(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| {
                matches!(
                    call,
                    Call::Increment(..) | Call::Observe(..) | Call::Set(..)
                )
            })
            .collect()
    }

    fn handle(&self, name: &str, kind: MetricKind) -> Arc<dyn MetricHandle> {
        Arc::new(RecordingHandle {
            name: name.to_string(),
            kind,
            calls: self.calls.clone(),
            on_increment: self.on_increment.clone(),
        })
    }
}

impl MetricsBackend for RecordingBackend {
    fn create(&self, spec: MetricSpec<'_>) -> Result<Arc<dyn MetricHandle>, MetricsError> {
        let mut metrics = self.metrics.lock().expect("metrics");
        if metrics.contains_key(spec.name) {
            return Err(MetricsError::AlreadyRegistered(spec.name.to_string()));
        }
        metrics.insert(spec.name.to_string(), spec.kind);

        self.calls.lock().expect("call log").push(Call::Create {
            name: spec.name.to_string(),
            kind: spec.kind,
            base_labels: spec.base_labels.clone(),
            buckets: spec.buckets.map(<[f64]>::to_vec),
        });
        Ok(self.handle(spec.name, spec.kind))
    }

    fn get(&self, name: &str) -> Option<Arc<dyn MetricHandle>> {
        self.calls
            .lock()
            .expect("call log")
            .push(Call::Get(name.to_string()));
        let kind = *self.metrics.lock().expect("metrics").get(name)?;
        Some(self.handle(name, kind))
    }

    fn unregister(&self, name: &str) -> bool {
        self.calls
            .lock()
            .expect("call log")
            .push(Call::Unregister(name.to_string()));
        self.metrics.lock().expect("metrics").remove(name).is_some()
    }
}

struct RecordingHandle {
    name: String,
    kind: MetricKind,
    calls: CallLog,
    on_increment: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl std::fmt::Debug for RecordingHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingHandle")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

impl MetricHandle for RecordingHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> MetricKind {
        self.kind
    }

    fn increment(&self, labels: &LabelSet) -> Result<(), MetricsError> {
        if !matches!(self.kind, MetricKind::Counter | MetricKind::Gauge) {
            return Err(unsupported(self, "increment"));
        }
        if let Some(hook) = &self.on_increment {
            hook();
        }
        self.calls
            .lock()
            .expect("call log")
            .push(Call::Increment(self.name.clone(), labels.clone()));
        Ok(())
    }

    fn observe(&self, labels: &LabelSet, value: f64) -> Result<(), MetricsError> {
        if !matches!(self.kind, MetricKind::Histogram | MetricKind::Summary) {
            return Err(unsupported(self, "observe"));
        }
        self.calls
            .lock()
            .expect("call log")
            .push(Call::Observe(self.name.clone(), labels.clone(), value));
        Ok(())
    }

    fn set(&self, labels: &LabelSet, value: f64) -> Result<(), MetricsError> {
        if self.kind != MetricKind::Gauge {
            return Err(unsupported(self, "set"));
        }
        self.calls
            .lock()
            .expect("call log")
            .push(Call::Set(self.name.clone(), labels.clone(), value));
        Ok(())
    }
}
