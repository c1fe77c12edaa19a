//! Query, dispatch, collect, load, finalize
//!
//! A run pages through the search results in a background task and feeds the
//! bundle identifiers into a bounded pool of worker tasks. Each worker
//! materializes one bundle and calls the pipeline's transform. Outputs are
//! collected in completion order and handed to `load` once every bundle has
//! been processed; `finalize` runs last.
//!
//! Units never fail silently: every bundle ends up as a [`BundleOutcome`] and
//! is accounted for in the [`RunReport`].

use crate::api::{RemoteStore, SearchPage};
use crate::bundle::BundleId;
use crate::config::FailurePolicy;
use crate::error::{EtlError, Result};
use crate::extractor::Extractor;
use crate::pipeline::{BundleContext, Pipeline};
use crate::progress;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Why a bundle produced no output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No file matched the selection patterns
    EmptyBundle,
    /// The transform returned nothing
    NoOutput,
}

/// What happened to one bundle
#[derive(Debug)]
pub enum BundleOutcome<T> {
    Extracted {
        bundle: BundleId,
        output: T,
        files_fetched: usize,
    },
    Skipped {
        bundle: BundleId,
        reason: SkipReason,
        files_fetched: usize,
    },
    /// `fqid` is kept verbatim since it may not parse as a bundle identifier
    Failed { fqid: String, error: EtlError },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BundleFailure {
    pub fqid: String,
    pub error: String,
}

/// Counters of a finished run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub total_hits: u64,
    pub dispatched: usize,
    pub extracted: usize,
    pub skipped: usize,
    pub files_fetched: usize,
    pub failed: Vec<BundleFailure>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    fn record<T>(&mut self, outcome: BundleOutcome<T>, outputs: &mut Vec<T>) -> Option<EtlError> {
        self.dispatched += 1;
        match outcome {
            BundleOutcome::Extracted {
                bundle,
                output,
                files_fetched,
            } => {
                debug!(bundle = %bundle, files_fetched, "Bundle extracted");
                self.extracted += 1;
                self.files_fetched += files_fetched;
                outputs.push(output);
                None
            },
            BundleOutcome::Skipped {
                bundle,
                reason,
                files_fetched,
            } => {
                debug!(bundle = %bundle, ?reason, "Bundle skipped");
                self.skipped += 1;
                self.files_fetched += files_fetched;
                None
            },
            BundleOutcome::Failed { fqid, error } => {
                error!(bundle = %fqid, error = %error, "Bundle failed");
                self.failed.push(BundleFailure {
                    fqid,
                    error: error.to_string(),
                });
                Some(error)
            },
        }
    }
}

impl Extractor {
    /// Run the pipeline over the configured query
    pub async fn run<P: Pipeline>(&self, pipeline: Arc<P>) -> Result<RunReport> {
        let query = self.config().query.clone();
        self.run_query(&query, pipeline).await
    }

    /// Run the pipeline over every bundle matching `query`
    ///
    /// A failing search page aborts the run. Failing bundles are handled per
    /// [`FailurePolicy`]; under `Abort` the first failure is returned and
    /// `load` and `finalize` are not called.
    pub async fn run_query<P: Pipeline>(&self, query: &Value, pipeline: Arc<P>) -> Result<RunReport> {
        let span = self.span().clone();
        self.run_inner(query, pipeline).instrument(span).await
    }

    async fn run_inner<P: Pipeline>(&self, query: &Value, pipeline: Arc<P>) -> Result<RunReport> {
        let config = self.config();
        let remote = self.remote()?;

        let first = remote.search(query, config.page_size, None).await?;
        let total_hits = first.total_hits;
        if total_hits == 0 {
            warn!("Query matched no bundles");
            return Ok(RunReport::default());
        }

        info!(
            total_hits,
            max_workers = config.max_workers,
            max_dispatchers = config.max_dispatchers,
            "Dispatching bundles"
        );

        let lookahead = config.page_size.saturating_mul(config.max_dispatchers);
        let (fqids, _pager) = spawn_pager(remote, query.clone(), config.page_size, first, lookahead);

        let progress = progress::create_bundle_progress(total_hits, config.show_progress);
        let mut report = RunReport {
            total_hits,
            ..RunReport::default()
        };
        let mut outputs = Vec::new();

        {
            let outcomes = stream::unfold(fqids, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            })
            .map(|item| {
                let extractor = self.clone();
                let pipeline = Arc::clone(&pipeline);
                async move {
                    let fqid = item?;
                    Ok::<_, EtlError>(spawn_unit(extractor, pipeline, fqid).await)
                }
            })
            .buffer_unordered(config.max_workers);
            let mut outcomes = std::pin::pin!(outcomes);

            // Dropping `outcomes` on an early return aborts every unit still running
            while let Some(next) = outcomes.next().await {
                let outcome = next?;
                progress.inc(1);

                if let Some(error) = report.record(outcome, &mut outputs) {
                    if config.failure_policy == FailurePolicy::Abort {
                        progress.abandon();
                        return Err(error);
                    }
                }
            }
        }
        progress.finish_and_clear();

        info!(
            dispatched = report.dispatched,
            extracted = report.extracted,
            skipped = report.skipped,
            failed = report.failed.len(),
            files_fetched = report.files_fetched,
            "Dispatch complete"
        );

        pipeline.load(outputs).await.map_err(EtlError::Callback)?;
        pipeline.finalize(self).await.map_err(EtlError::Callback)?;

        Ok(report)
    }
}

/// Walk the result pages in the background
///
/// The channel holds `lookahead` identifiers, which bounds how far the pager
/// runs ahead of the workers. A paging error is sent down the channel and
/// ends the walk.
fn spawn_pager(
    remote: Arc<dyn RemoteStore>,
    query: Value,
    page_size: usize,
    first: SearchPage,
    lookahead: usize,
) -> (mpsc::Receiver<Result<String>>, AbortOnDrop<()>) {
    let (tx, rx) = mpsc::channel(lookahead.max(1));

    let task = async move {
        let mut page = first;
        let mut pages = 1usize;
        loop {
            for fqid in page.bundle_fqids {
                if tx.send(Ok(fqid)).await.is_err() {
                    return;
                }
            }

            let Some(cursor) = page.next else {
                debug!(pages, "Reached last search page");
                return;
            };

            match remote.search(&query, page_size, Some(&cursor)).await {
                Ok(next) => {
                    pages += 1;
                    page = next;
                },
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                },
            }
        }
    };

    let handle = tokio::spawn(task.instrument(info_span!("pager")));
    (rx, AbortOnDrop(handle))
}

/// Process one bundle on its own task
async fn spawn_unit<P: Pipeline>(
    extractor: Extractor,
    pipeline: Arc<P>,
    fqid: String,
) -> BundleOutcome<P::Output> {
    let span = info_span!(parent: extractor.span(), "bundle", bundle = %fqid);
    let task_fqid = fqid.clone();
    let task = async move {
        match extract_bundle(&extractor, pipeline.as_ref(), &task_fqid).await {
            Ok(outcome) => outcome,
            Err(error) => BundleOutcome::Failed {
                fqid: task_fqid,
                error,
            },
        }
    };

    match AbortOnDrop(tokio::spawn(task.instrument(span))).await {
        Ok(outcome) => outcome,
        Err(join_error) => BundleOutcome::Failed {
            error: EtlError::WorkerPanicked {
                fqid: fqid.clone(),
                reason: join_failure(join_error),
            },
            fqid,
        },
    }
}

async fn extract_bundle<P: Pipeline>(
    extractor: &Extractor,
    pipeline: &P,
    fqid: &str,
) -> Result<BundleOutcome<P::Output>> {
    let bundle = BundleId::parse_fqid(fqid)?;
    let materialized = extractor.materializer().materialize(&bundle, extractor.remote()?.as_ref()).await?;
    let files_fetched = materialized.fetched_files.len();

    let bundle_dir = extractor.layout().bundle_dir(&bundle);
    let bundle_path = if tokio::fs::try_exists(&bundle_dir).await? {
        Some(bundle_dir)
    } else if extractor.config().dispatch_on_empty_bundles {
        None
    } else {
        return Ok(BundleOutcome::Skipped {
            bundle,
            reason: SkipReason::EmptyBundle,
            files_fetched,
        });
    };

    let ctx = BundleContext {
        bundle: bundle.clone(),
        bundle_path,
        manifest_path: materialized.manifest_path,
        extractor: extractor.clone(),
    };

    Ok(match pipeline.transform(ctx).await.map_err(EtlError::Callback)? {
        Some(output) => BundleOutcome::Extracted {
            bundle,
            output,
            files_fetched,
        },
        None => BundleOutcome::Skipped {
            bundle,
            reason: SkipReason::NoOutput,
            files_fetched,
        },
    })
}

fn join_failure(error: JoinError) -> String {
    if error.is_panic() {
        format!("panicked: {}", panic_message(error.into_panic().as_ref()))
    } else {
        "cancelled".to_string()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic payload"
    }
}

/// Join handle that aborts its task when dropped
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl<T> Future for AbortOnDrop<T> {
    type Output = std::result::Result<T, JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx)
    }
}
