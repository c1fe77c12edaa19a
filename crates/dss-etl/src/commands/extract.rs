//! `dss-etl extract` command implementation
//!
//! Runs the built-in [`SummaryPipeline`]: one JSON line per extracted bundle,
//! plus `extract-report.json` in the staging directory.

use crate::config::{ExtractorConfig, FailurePolicy};
use crate::error::{EtlError, Result};
use crate::extractor::Extractor;
use crate::pipeline::{BundleContext, Pipeline};
use crate::staging::StagingStats;
use crate::ExtractArgs;
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::info;

pub const REPORT_FILE: &str = "extract-report.json";

/// One line of `extract` output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleSummary {
    pub uuid: String,
    pub version: String,
    /// Names of the linked files, sorted
    pub files: Vec<String>,
    /// Total size of the linked files
    pub bytes: u64,
}

/// Contents of `extract-report.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractReport {
    pub completed_at: DateTime<Utc>,
    pub bundles_loaded: usize,
    pub staging: StagingStats,
}

/// Summarizes every bundle view and writes the summaries as JSON lines
#[derive(Debug, Default)]
pub struct SummaryPipeline {
    output: Option<PathBuf>,
    loaded: AtomicUsize,
}

impl SummaryPipeline {
    /// Write to `output`, or stdout when `None`
    pub fn new(output: Option<PathBuf>) -> Self {
        Self {
            output,
            loaded: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Pipeline for SummaryPipeline {
    type Output = BundleSummary;

    async fn transform(&self, ctx: BundleContext) -> anyhow::Result<Option<BundleSummary>> {
        let mut summary = BundleSummary {
            uuid: ctx.bundle.uuid.clone(),
            version: ctx.bundle.version.clone(),
            files: Vec::new(),
            bytes: 0,
        };

        if let Some(dir) = &ctx.bundle_path {
            let mut entries = tokio::fs::read_dir(dir)
                .await
                .with_context(|| format!("reading bundle view {}", dir.display()))?;
            while let Some(entry) = entries.next_entry().await? {
                // Follows the link into the content store
                let metadata = tokio::fs::metadata(entry.path()).await?;
                summary.files.push(entry.file_name().to_string_lossy().into_owned());
                summary.bytes += metadata.len();
            }
            summary.files.sort();
        }

        Ok(Some(summary))
    }

    async fn load(&self, mut outputs: Vec<BundleSummary>) -> anyhow::Result<()> {
        outputs.sort_by(|a, b| (&a.uuid, &a.version).cmp(&(&b.uuid, &b.version)));

        let mut lines = Vec::new();
        for summary in &outputs {
            serde_json::to_writer(&mut lines, summary)?;
            lines.push(b'\n');
        }

        match &self.output {
            Some(path) => tokio::fs::write(path, &lines)
                .await
                .with_context(|| format!("writing {}", path.display()))?,
            None => {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(&lines)?;
                stdout.flush()?;
            },
        }

        self.loaded.store(outputs.len(), Ordering::SeqCst);
        info!(bundles = outputs.len(), "Loaded bundle summaries");
        Ok(())
    }

    async fn finalize(&self, extractor: &Extractor) -> anyhow::Result<()> {
        let layout = extractor.layout();
        let report = ExtractReport {
            completed_at: Utc::now(),
            bundles_loaded: self.loaded.load(Ordering::SeqCst),
            staging: layout.stats().await?,
        };

        let path = layout.root().join(REPORT_FILE);
        tokio::fs::write(&path, serde_json::to_vec_pretty(&report)?)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "Wrote extract report");
        Ok(())
    }
}

/// Fold the `extract` flags into `config`
pub fn apply_args(mut config: ExtractorConfig, args: &ExtractArgs) -> Result<ExtractorConfig> {
    if let Some(path) = &args.query {
        config.query = read_query(path)?;
    }
    if let Some(workers) = args.max_workers {
        config.max_workers = workers;
    }
    if let Some(dispatchers) = args.max_dispatchers {
        config.max_dispatchers = dispatchers;
    }
    if let Some(page_size) = args.page_size {
        config.page_size = page_size;
    }
    if !args.content_types.is_empty() {
        config.content_type_patterns = args.content_types.clone();
    }
    if !args.filenames.is_empty() {
        config.filename_patterns = args.filenames.clone();
    }
    if args.dispatch_on_empty_bundles {
        config.dispatch_on_empty_bundles = true;
    }
    if args.fail_fast {
        config.failure_policy = FailurePolicy::Abort;
    }
    config.show_progress = !args.no_progress;
    Ok(config)
}

fn read_query(path: &Path) -> Result<serde_json::Value> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        EtlError::config(format!("Cannot read query file '{}': {}", path.display(), e))
    })?;
    Ok(serde_json::from_str(&content)?)
}

pub async fn run(config: ExtractorConfig, args: &ExtractArgs) -> Result<()> {
    let config = apply_args(config, args)?;
    let extractor = Extractor::new(config)?;
    let pipeline = Arc::new(SummaryPipeline::new(args.output.clone()));

    let report = extractor.run(pipeline).await?;

    // stdout may carry the summaries, so the recap goes to stderr
    if report.total_hits == 0 {
        eprintln!("{} Query matched no bundles", "!".yellow());
        return Ok(());
    }
    eprintln!(
        "{} {} bundle(s): {} extracted, {} skipped, {} failed, {} file(s) fetched",
        "✓".green(),
        report.dispatched,
        report.extracted,
        report.skipped,
        report.failed.len(),
        report.files_fetched
    );
    for failure in &report.failed {
        eprintln!("  {} {}: {}", "✗".red(), failure.fqid, failure.error);
    }

    if report.is_success() {
        Ok(())
    } else {
        Err(EtlError::PartialFailure {
            failed: report.failed.len(),
            total: report.dispatched,
        })
    }
}
