//! Remote store access
//!
//! The extractor talks to the remote store only through [`RemoteStore`].
//! [`DssClient`] implements it over the DSS REST API; tests substitute their
//! own implementations.

pub mod client;
pub mod endpoints;
pub mod types;

pub use client::DssClient;
pub use types::*;

use crate::bundle::{BundleId, FileRef};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;

/// The three remote calls the extractor depends on
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch one page of search results
    ///
    /// `cursor` is `None` for the first page and the previous page's
    /// `next` value afterwards.
    async fn search(
        &self,
        query: &Value,
        page_size: usize,
        cursor: Option<&PageCursor>,
    ) -> Result<SearchPage>;

    /// Fetch the raw manifest document of a bundle
    async fn get_manifest(&self, bundle: &BundleId) -> Result<Value>;

    /// Fetch the bytes of one file version
    async fn get_file(&self, file: &FileRef) -> Result<Vec<u8>>;
}
