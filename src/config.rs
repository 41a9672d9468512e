//! Process-wide metrics configuration.
//!
//! Holds the global base labels, per-metric custom labels, which optional
//! metric groups are enabled, and any custom metrics declared by the host.
//! A `MetricsConfig` is built once at startup (from YAML, the environment
//! or builder calls) and then shared read-only behind an `Arc`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::error::MetricsError;
use crate::metrics::catalog::MetricDefinition;
use crate::metrics::labels::LabelSet;

/// Environment variable holding global base labels as `key=value,key=value`.
pub const ENV_BASE_LABELS: &str = "SIDEKIQ_PROMETHEUS_BASE_LABELS";
/// Environment variable toggling the GC/allocation metric groups.
pub const ENV_GC_METRICS: &str = "SIDEKIQ_PROMETHEUS_GC_METRICS";
/// Environment variable toggling the global queue/Redis gauges.
pub const ENV_GLOBAL_METRICS: &str = "SIDEKIQ_PROMETHEUS_GLOBAL_METRICS";

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error while reading a configuration file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid YAML for this schema.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A configuration value could not be interpreted.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// A custom metric definition is unusable.
    #[error("Invalid custom metric definition: {0}")]
    InvalidDefinition(#[from] MetricsError),
}

/// Immutable-after-construction metrics configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    base_labels: Option<LabelSet>,
    custom_labels: BTreeMap<String, LabelSet>,
    gc_metrics_enabled: bool,
    global_metrics_enabled: bool,
    custom_metrics: Vec<MetricDefinition>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            base_labels: None,
            custom_labels: BTreeMap::new(),
            gc_metrics_enabled: true,
            global_metrics_enabled: true,
            custom_metrics: Vec::new(),
        }
    }
}

/// On-disk shape of the configuration. Label maps stay as raw YAML so that
/// malformed entries can be reported and dropped instead of failing the load.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawMetricsConfig {
    base_labels: Option<serde_yaml::Value>,
    custom_labels: BTreeMap<String, serde_yaml::Value>,
    gc_metrics_enabled: Option<bool>,
    global_metrics_enabled: Option<bool>,
    custom_metrics: Vec<MetricDefinition>,
}

impl MetricsConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses configuration from a YAML document.
    ///
    /// Custom label entries that are not a flat mapping of scalars are
    /// dropped with a warning. Custom metric definitions with an unknown
    /// kind fail the load.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let raw: RawMetricsConfig = serde_yaml::from_str(yaml)?;
        let mut config = Self::default();

        if let Some(value) = raw.base_labels {
            match labels_from_yaml(&value) {
                Some(labels) => config.base_labels = Some(labels),
                None => {
                    return Err(ConfigError::InvalidValue {
                        key: "base_labels".to_string(),
                        message: "expected a mapping of label names to scalar values".to_string(),
                    })
                }
            }
        }

        for (metric, value) in raw.custom_labels {
            match labels_from_yaml(&value) {
                Some(labels) => {
                    config.custom_labels.insert(metric, labels);
                }
                None => warn!(
                    metric = %metric,
                    "Ignoring custom labels that are not a mapping of scalar values"
                ),
            }
        }

        if let Some(enabled) = raw.gc_metrics_enabled {
            config.gc_metrics_enabled = enabled;
        }
        if let Some(enabled) = raw.global_metrics_enabled {
            config.global_metrics_enabled = enabled;
        }

        for definition in &raw.custom_metrics {
            definition.to_descriptor()?;
        }
        config.custom_metrics = raw.custom_metrics;

        Ok(config)
    }

    /// Reads and parses a YAML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&content)
    }

    /// Creates configuration from environment variables over the defaults.
    ///
    /// # Environment Variables
    ///
    /// - `SIDEKIQ_PROMETHEUS_BASE_LABELS`: global base labels, `key=value,key=value`
    /// - `SIDEKIQ_PROMETHEUS_GC_METRICS`: enable GC/allocation metrics (default: true)
    /// - `SIDEKIQ_PROMETHEUS_GLOBAL_METRICS`: enable global gauges (default: true)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    /// Applies environment variable overrides on top of this configuration.
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Ok(val) = std::env::var(ENV_BASE_LABELS) {
            self.base_labels = Some(parse_label_pairs(&val, ENV_BASE_LABELS)?);
        }

        if let Ok(val) = std::env::var(ENV_GC_METRICS) {
            self.gc_metrics_enabled = parse_env_bool(&val, ENV_GC_METRICS)?;
        }

        if let Ok(val) = std::env::var(ENV_GLOBAL_METRICS) {
            self.global_metrics_enabled = parse_env_bool(&val, ENV_GLOBAL_METRICS)?;
        }

        Ok(self)
    }

    /// Sets the global base labels applied to every metric.
    pub fn with_base_labels(mut self, labels: LabelSet) -> Self {
        self.base_labels = Some(labels);
        self
    }

    /// Sets the custom labels for a single metric.
    pub fn with_custom_labels(mut self, metric: impl Into<String>, labels: LabelSet) -> Self {
        self.custom_labels.insert(metric.into(), labels);
        self
    }

    /// Enables or disables the GC/allocation metric groups.
    pub fn with_gc_metrics(mut self, enabled: bool) -> Self {
        self.gc_metrics_enabled = enabled;
        self
    }

    /// Enables or disables the global gauges.
    pub fn with_global_metrics(mut self, enabled: bool) -> Self {
        self.global_metrics_enabled = enabled;
        self
    }

    /// Declares an additional metric registered alongside the catalog.
    pub fn with_custom_metric(mut self, definition: MetricDefinition) -> Self {
        self.custom_metrics.push(definition);
        self
    }

    pub fn base_labels(&self) -> Option<&LabelSet> {
        self.base_labels.as_ref()
    }

    pub fn custom_labels_for(&self, metric: &str) -> Option<&LabelSet> {
        self.custom_labels.get(metric)
    }

    pub fn gc_metrics_enabled(&self) -> bool {
        self.gc_metrics_enabled
    }

    pub fn global_metrics_enabled(&self) -> bool {
        self.global_metrics_enabled
    }

    pub fn custom_metrics(&self) -> &[MetricDefinition] {
        &self.custom_metrics
    }
}

/// Converts a YAML mapping of scalars into a `LabelSet`.
fn labels_from_yaml(value: &serde_yaml::Value) -> Option<LabelSet> {
    let mapping = value.as_mapping()?;
    let mut labels = LabelSet::new();
    for (key, value) in mapping {
        labels.insert(yaml_scalar(key)?, yaml_scalar(value)?);
    }
    Some(labels)
}

fn yaml_scalar(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Parses `key=value,key=value` into a `LabelSet`.
fn parse_label_pairs(val: &str, key: &str) -> Result<LabelSet, ConfigError> {
    let mut labels = LabelSet::new();
    for pair in val.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (name, value) = pair.split_once('=').ok_or_else(|| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected key=value, got '{}'", pair),
        })?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("empty label name in '{}'", pair),
            });
        }
        labels.insert(name.to_string(), value.trim().to_string());
    }
    Ok(labels)
}

/// Parses a boolean environment variable value.
fn parse_env_bool(val: &str, key: &str) -> Result<bool, ConfigError> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean, got '{}'", val),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::labels::label_set;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = MetricsConfig::default();
        assert!(config.base_labels().is_none());
        assert!(config.custom_labels_for("sidekiq_job_count").is_none());
        assert!(config.gc_metrics_enabled());
        assert!(config.global_metrics_enabled());
        assert!(config.custom_metrics().is_empty());
    }

    #[test]
    fn test_builder() {
        let config = MetricsConfig::new()
            .with_base_labels(label_set([("env", "prod")]))
            .with_custom_labels("sidekiq_rss", label_set([("pod", "a")]))
            .with_gc_metrics(false)
            .with_global_metrics(false)
            .with_custom_metric(MetricDefinition::new("app_widgets", "counter", "Widgets"));

        assert_eq!(config.base_labels(), Some(&label_set([("env", "prod")])));
        assert_eq!(
            config.custom_labels_for("sidekiq_rss"),
            Some(&label_set([("pod", "a")]))
        );
        assert!(!config.gc_metrics_enabled());
        assert!(!config.global_metrics_enabled());
        assert_eq!(config.custom_metrics().len(), 1);
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
base_labels:
  env: production
  shard: 3
custom_labels:
  sidekiq_job_count:
    team: billing
    critical: true
gc_metrics_enabled: false
custom_metrics:
  - name: app_emails_sent
    kind: counter
    docstring: Emails sent by mailer jobs
"#;
        let config = MetricsConfig::from_yaml_str(yaml).expect("valid config");

        assert_eq!(
            config.base_labels(),
            Some(&label_set([("env", "production"), ("shard", "3")]))
        );
        assert_eq!(
            config.custom_labels_for("sidekiq_job_count"),
            Some(&label_set([("team", "billing"), ("critical", "true")]))
        );
        assert!(!config.gc_metrics_enabled());
        assert!(config.global_metrics_enabled());
        assert_eq!(config.custom_metrics()[0].name, "app_emails_sent");
    }

    #[test]
    fn test_malformed_custom_labels_are_dropped() {
        let yaml = r#"
custom_labels:
  sidekiq_job_count: not-a-map
  sidekiq_job_failed:
    - a
    - b
  sidekiq_job_success:
    nested:
      too: deep
  sidekiq_job_duration:
    ok: yes-please
"#;
        let config = MetricsConfig::from_yaml_str(yaml).expect("load succeeds");

        assert!(config.custom_labels_for("sidekiq_job_count").is_none());
        assert!(config.custom_labels_for("sidekiq_job_failed").is_none());
        assert!(config.custom_labels_for("sidekiq_job_success").is_none());
        assert_eq!(
            config.custom_labels_for("sidekiq_job_duration"),
            Some(&label_set([("ok", "yes-please")]))
        );
    }

    #[test]
    fn test_malformed_base_labels_fail() {
        let err = MetricsConfig::from_yaml_str("base_labels: [a, b]\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "base_labels"));
    }

    #[test]
    fn test_invalid_custom_metric_kind_fails() {
        let yaml = "custom_metrics:\n  - name: app_x\n    kind: meter\n    help: nope\n";
        let err = MetricsConfig::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidDefinition(MetricsError::InvalidMetricKind(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "global_metrics_enabled: false").expect("write");

        let config = MetricsConfig::from_file(file.path()).expect("load");
        assert!(!config.global_metrics_enabled());

        let missing = MetricsConfig::from_file("/definitely/not/here.yml");
        assert!(matches!(missing, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_parse_label_pairs() {
        assert_eq!(
            parse_label_pairs("env=prod, region = eu ,", ENV_BASE_LABELS).unwrap(),
            label_set([("env", "prod"), ("region", "eu")])
        );
        assert!(parse_label_pairs("env", ENV_BASE_LABELS).is_err());
        assert!(parse_label_pairs("=prod", ENV_BASE_LABELS).is_err());
    }

    #[test]
    fn test_parse_env_bool() {
        assert!(parse_env_bool("TRUE", ENV_GC_METRICS).unwrap());
        assert!(parse_env_bool("1", ENV_GC_METRICS).unwrap());
        assert!(!parse_env_bool("no", ENV_GC_METRICS).unwrap());
        assert!(parse_env_bool("maybe", ENV_GC_METRICS).is_err());
    }

    /// Clears the metrics environment variables when dropped.
    struct EnvGuard;

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for key in [ENV_BASE_LABELS, ENV_GC_METRICS, ENV_GLOBAL_METRICS] {
                std::env::remove_var(key);
            }
        }
    }

    // Environment variables are process-wide, so every env case lives in
    // this one test.
    #[test]
    fn test_env_overrides() {
        let _guard = EnvGuard;
        std::env::set_var(ENV_BASE_LABELS, "env=prod,region=eu");
        std::env::set_var(ENV_GC_METRICS, "false");
        std::env::remove_var(ENV_GLOBAL_METRICS);

        let config = MetricsConfig::from_env().expect("env config");
        assert_eq!(
            config.base_labels(),
            Some(&label_set([("env", "prod"), ("region", "eu")]))
        );
        assert!(!config.gc_metrics_enabled());
        assert!(config.global_metrics_enabled());

        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "gc_metrics_enabled: true").expect("write");
        writeln!(file, "base_labels:\n  env: staging").expect("write");
        let from_file = MetricsConfig::from_file(file.path()).expect("load");
        assert!(from_file.gc_metrics_enabled());

        let overridden = from_file.with_env_overrides().expect("overrides");
        assert!(!overridden.gc_metrics_enabled());
        assert_eq!(
            overridden.base_labels(),
            Some(&label_set([("env", "prod"), ("region", "eu")]))
        );

        std::env::set_var(ENV_GC_METRICS, "sometimes");
        let err = MetricsConfig::from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref key, .. } if key == ENV_GC_METRICS
        ));
    }
}
