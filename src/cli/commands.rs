//! CLI command definitions for sidekiq-prometheus.
//!
//! `catalog` lists the metrics a worker exports; `render` registers the
//! configured metrics on a fresh Prometheus registry and prints the
//! exposition text a scrape would see, optionally after one sample job.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::MetricsConfig;
use crate::job::{Job, JobMetrics};
use crate::metrics::catalog::{MetricGroup, MetricKind};
use crate::metrics::{export_metrics, MetricRegistry, PrometheusBackend, Registrar};

/// Prometheus metrics for background job workers.
#[derive(Parser)]
#[command(name = "sidekiq-prometheus")]
#[command(about = "Inspect the worker metric catalog and its Prometheus exposition")]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// List every metric in the catalog.
    #[command(alias = "ls")]
    Catalog(CatalogArgs),

    /// Register the configured metrics and print the exposition text.
    Render(RenderArgs),
}

/// Arguments for `sidekiq-prometheus catalog`.
#[derive(Parser, Debug)]
pub struct CatalogArgs {
    /// Only list one group.
    #[arg(short, long, value_enum)]
    pub group: Option<GroupArg>,

    /// Output as JSON.
    #[arg(short, long)]
    pub json: bool,
}

/// Arguments for `sidekiq-prometheus render`.
#[derive(Parser, Debug)]
pub struct RenderArgs {
    /// YAML configuration file. Environment overrides apply on top.
    #[arg(short, long, env = "SIDEKIQ_PROMETHEUS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Run one no-op job of this class through the job middleware first.
    #[arg(long)]
    pub sample_job: Option<String>,

    /// Queue the sample job is reported on.
    #[arg(short, long, default_value = "default")]
    pub queue: String,
}

/// Catalog groups selectable from the command line.
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupArg {
    Global,
    Job,
    JobGc,
    WorkerGc,
}

impl From<GroupArg> for MetricGroup {
    fn from(arg: GroupArg) -> Self {
        match arg {
            GroupArg::Global => MetricGroup::Global,
            GroupArg::Job => MetricGroup::Job,
            GroupArg::JobGc => MetricGroup::JobGc,
            GroupArg::WorkerGc => MetricGroup::WorkerGc,
        }
    }
}

/// JSON output structure for one catalog entry.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogEntry {
    pub group: MetricGroup,
    pub name: String,
    pub kind: MetricKind,
    pub help: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buckets: Option<Vec<f64>>,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli())
}

/// Run the CLI with the parsed arguments.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Catalog(args) => run_catalog_command(args),
        Commands::Render(args) => run_render_command(args),
    }
}

/// Catalog entries, group by group, optionally restricted to one group.
pub fn catalog_entries(group: Option<MetricGroup>) -> Vec<CatalogEntry> {
    MetricGroup::ALL
        .into_iter()
        .filter(|g| group.map_or(true, |selected| selected == *g))
        .flat_map(|g| {
            g.descriptors().iter().map(move |d| CatalogEntry {
                group: g,
                name: d.name().to_string(),
                kind: d.kind,
                help: d.help.to_string(),
                buckets: d.buckets().map(<[f64]>::to_vec),
            })
        })
        .collect()
}

/// A job with nothing to do, used to populate the job metrics.
struct SampleJob<'a> {
    class: &'a str,
}

impl Job for SampleJob<'_> {
    fn class_name(&self) -> &str {
        self.class
    }
}

/// Registers everything `config` enables on a fresh registry, optionally runs
/// a sample job `(class, queue)`, and returns the resulting exposition text.
pub fn render_exposition(
    config: MetricsConfig,
    sample_job: Option<(&str, &str)>,
) -> anyhow::Result<String> {
    let backend = Arc::new(PrometheusBackend::new());
    let registry = MetricRegistry::new(backend.clone(), Arc::new(config));
    Registrar::new(&registry).register_configured()?;

    if let Some((class, queue)) = sample_job {
        let middleware = JobMetrics::new(registry);
        middleware.call(&SampleJob { class }, queue, || anyhow::Ok(()))?;
        debug!(class, queue, "Ran sample job");
    }

    Ok(export_metrics(&backend))
}

fn run_catalog_command(args: CatalogArgs) -> anyhow::Result<()> {
    let entries = catalog_entries(args.group.map(MetricGroup::from));

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    let width = entries.iter().map(|e| e.name.len()).max().unwrap_or(0);
    for entry in &entries {
        println!(
            "{:<10} {:<width$} {:<9} {}",
            entry.group.to_string(),
            entry.name,
            entry.kind.as_str(),
            entry.help,
        );
    }
    Ok(())
}

fn run_render_command(args: RenderArgs) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => {
            info!(path = %path.display(), "Loading metrics configuration");
            MetricsConfig::from_file(path)?.with_env_overrides()?
        }
        None => MetricsConfig::from_env()?,
    };
    debug!(config = ?config, "Resolved metrics configuration");

    let sample_job = args.sample_job.as_deref().map(|class| (class, args.queue.as_str()));
    print!("{}", render_exposition(config, sample_job)?);
    Ok(())
}
