//! Command-line interface for sidekiq-prometheus.
//!
//! Provides commands to list the metric catalog and to render the
//! exposition of a configured registry.

mod commands;

pub use commands::{
    catalog_entries, parse_cli, render_exposition, run, run_with_cli, CatalogArgs, CatalogEntry,
    Cli, Commands, GroupArg, RenderArgs,
};
