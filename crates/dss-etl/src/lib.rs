//! DSS bundle extractor
//!
//! Pulls data bundles out of a Data Storage Service (DSS) deployment and runs
//! them through a user supplied pipeline.
//!
//! # Overview
//!
//! - **Manifest cache**: bundle manifests are fetched once and kept under
//!   `bundle_manifests/`
//! - **Content store**: every file version is stored once under `files/`,
//!   verified by sha256 before it is reused
//! - **Bundle views**: `bundles/{uuid}.{version}/` holds symlinks to the
//!   selected files of one bundle
//! - **Dispatch**: search results are paged in the background and processed
//!   by a bounded pool of workers calling [`Pipeline::transform`]; outputs are
//!   handed to [`Pipeline::load`] and the run ends with [`Pipeline::finalize`]
//!
//! ```no_run
//! use dss_etl::{Extractor, ExtractorConfig, Pipeline, BundleContext};
//! use std::sync::Arc;
//!
//! struct CountFiles;
//!
//! #[async_trait::async_trait]
//! impl Pipeline for CountFiles {
//!     type Output = usize;
//!
//!     async fn transform(&self, ctx: BundleContext) -> anyhow::Result<Option<usize>> {
//!         let Some(dir) = ctx.bundle_path else { return Ok(None) };
//!         Ok(Some(std::fs::read_dir(dir)?.count()))
//!     }
//! }
//!
//! # async fn demo() -> dss_etl::Result<()> {
//! let extractor = Extractor::new(ExtractorConfig::new("./staging"))?;
//! let report = extractor.run(Arc::new(CountFiles)).await?;
//! println!("{} bundles extracted", report.extracted);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod bundle;
pub mod commands;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod extractor;
pub mod manifest_cache;
pub mod materialize;
pub mod pipeline;
pub mod progress;
pub mod staging;
pub mod store;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use bundle::{BundleId, FileRef, Manifest};
pub use config::{DssEndpoint, ExtractorConfig, FailurePolicy};
pub use dispatch::{BundleFailure, BundleOutcome, RunReport, SkipReason};
pub use error::{EtlError, Result};
pub use extractor::Extractor;
pub use pipeline::{BundleContext, Pipeline};

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// dss-etl - extract DSS data bundles into a local staging area
#[derive(Parser, Debug)]
#[command(name = "dss-etl")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// TOML configuration file
    #[arg(short, long, env = "DSS_ETL_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Staging directory
    #[arg(long, global = true)]
    pub staging_dir: Option<PathBuf>,

    /// DSS API base URL
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// DSS replica (aws, gcp, ...)
    #[arg(long, global = true)]
    pub replica: Option<String>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract every bundle matching a query
    Extract(ExtractArgs),

    /// Materialize a single bundle
    Materialize {
        /// Bundle FQID (`<uuid>.<version>`)
        fqid: String,
    },

    /// Show what the staging directory holds
    Status,

    /// Remove bundle views
    Clean {
        /// Remove the whole staging directory, forcing a full refetch
        #[arg(short, long)]
        all: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(clap::Args, Debug, Default)]
pub struct ExtractArgs {
    /// File holding an Elasticsearch query (JSON)
    #[arg(short, long)]
    pub query: Option<PathBuf>,

    /// Bundles processed concurrently
    #[arg(long)]
    pub max_workers: Option<usize>,

    /// Result pages the pager may buffer ahead of the workers
    #[arg(long)]
    pub max_dispatchers: Option<usize>,

    /// Search results per page (at most 500)
    #[arg(long)]
    pub page_size: Option<usize>,

    /// Content-type glob selecting files (repeatable)
    #[arg(long = "content-type")]
    pub content_types: Vec<String>,

    /// File name glob selecting files (repeatable)
    #[arg(long = "filename")]
    pub filenames: Vec<String>,

    /// Transform bundles even when no file was selected
    #[arg(long)]
    pub dispatch_on_empty_bundles: bool,

    /// Stop at the first failing bundle
    #[arg(long)]
    pub fail_fast: bool,

    /// Write bundle summaries here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Do not draw a progress bar
    #[arg(long)]
    pub no_progress: bool,
}

/// Configuration subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show,
}

impl Cli {
    /// Defaults, then the config file, then the environment, then global flags
    pub fn resolve_config(&self) -> Result<ExtractorConfig> {
        let config = match &self.config {
            Some(path) => ExtractorConfig::load(path)?,
            None => ExtractorConfig::default(),
        };
        let mut config = config.merge_env()?;

        if let Some(dir) = &self.staging_dir {
            config.staging_dir = dir.clone();
        }
        if let Some(url) = &self.base_url {
            config.endpoint.base_url = url.clone();
        }
        if let Some(replica) = &self.replica {
            config.endpoint.replica = replica.clone();
        }

        Ok(config)
    }
}
