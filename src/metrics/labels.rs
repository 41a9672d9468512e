//! Label sets and the precedence rules for merging them.

use std::collections::BTreeMap;

use crate::config::MetricsConfig;

/// Label key to label value. Ordered so series keys are deterministic.
pub type LabelSet = BTreeMap<String, String>;

/// Builds a `LabelSet` from string pairs.
pub fn label_set<K, V, I>(pairs: I) -> LabelSet
where
    K: Into<String>,
    V: Into<String>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Resolves the labels attached to `metric_name` at registration time.
///
/// Precedence, lowest to highest: `explicit`, then the custom labels
/// configured for this metric, then the global base labels. Callers cannot
/// override a global base label from an individual registration.
pub fn resolve_base_labels(
    config: &MetricsConfig,
    metric_name: &str,
    explicit: LabelSet,
) -> LabelSet {
    let mut labels = explicit;

    if let Some(custom) = config.custom_labels_for(metric_name) {
        labels.extend(custom.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    if let Some(base) = config.base_labels() {
        labels.extend(base.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    labels
}
