//! Transform / load / finalize hooks
//!
//! A [`Pipeline`] supplies the domain logic of a run. `transform` is called
//! once per bundle from the worker pool, `load` once with every collected
//! output, and `finalize` once at the very end. Hooks a pipeline does not need
//! can be left out; the default methods do nothing.

use crate::bundle::BundleId;
use crate::extractor::Extractor;
use async_trait::async_trait;
use std::path::PathBuf;

/// Everything a transform gets to see about one bundle
#[derive(Debug, Clone)]
pub struct BundleContext {
    pub bundle: BundleId,
    /// The bundle view, or `None` when no file was selected and empty bundles
    /// are dispatched anyway
    pub bundle_path: Option<PathBuf>,
    pub manifest_path: PathBuf,
    pub extractor: Extractor,
}

impl BundleContext {
    pub fn uuid(&self) -> &str {
        &self.bundle.uuid
    }

    pub fn version(&self) -> &str {
        &self.bundle.version
    }
}

#[async_trait]
pub trait Pipeline: Send + Sync + 'static {
    /// Value produced per bundle and handed to [`Pipeline::load`]
    type Output: Send + 'static;

    /// Turn one materialized bundle into an output
    ///
    /// Returning `Ok(None)` skips the bundle; it is not passed to `load`.
    async fn transform(&self, _ctx: BundleContext) -> anyhow::Result<Option<Self::Output>> {
        Ok(None)
    }

    /// Receive all outputs, in completion order
    async fn load(&self, _outputs: Vec<Self::Output>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn finalize(&self, _extractor: &Extractor) -> anyhow::Result<()> {
        Ok(())
    }
}
