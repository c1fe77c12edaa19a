//! In-memory remote store for unit tests

#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::api::{PageCursor, RemoteStore, SearchPage};
use crate::bundle::{BundleId, FileRef};
use crate::error::{EtlError, Result};
use async_trait::async_trait;
use dss_etl_common::checksum;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub(crate) const METADATA_TYPE: &str = r#"application/json; dcp-type="metadata/biomaterial""#;
pub(crate) const BINARY_TYPE: &str = "application/octet-stream";

/// Build a file reference whose digest matches `bytes`
pub(crate) fn file_ref(
    uuid: &str,
    version: &str,
    name: &str,
    content_type: &str,
    bytes: &[u8],
) -> (FileRef, Vec<u8>) {
    let file = FileRef {
        uuid: uuid.to_string(),
        version: version.to_string(),
        name: name.to_string(),
        content_type: content_type.to_string(),
        sha256: checksum::compute_checksum(bytes),
        size: Some(bytes.len() as u64),
        indexed: content_type.starts_with("application/json"),
    };
    (file, bytes.to_vec())
}

#[derive(Default)]
pub(crate) struct FakeRemote {
    fqids: Vec<String>,
    manifests: HashMap<String, Value>,
    files: HashMap<String, Vec<u8>>,
    manifest_delays: HashMap<String, Duration>,
    file_delays: HashMap<String, Duration>,
    failing_manifests: HashSet<String>,
    failing_search_after: Option<usize>,
    searches: AtomicUsize,
    manifest_calls: Mutex<HashMap<String, usize>>,
    file_calls: Mutex<HashMap<String, usize>>,
}

impl FakeRemote {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a bundle, its manifest and make it discoverable by search
    pub(crate) fn with_bundle(mut self, fqid: &str, files: &[(FileRef, Vec<u8>)]) -> Self {
        let bundle = BundleId::parse_fqid(fqid).expect("test fqid");
        let refs: Vec<&FileRef> = files.iter().map(|(f, _)| f).collect();
        self.manifests.insert(
            bundle.uuid.clone(),
            json!({"uuid": bundle.uuid, "version": bundle.version, "files": refs}),
        );
        for (file, bytes) in files {
            self.files.insert(file.key(), bytes.clone());
        }
        self.fqids.push(fqid.to_string());
        self
    }

    /// Serve `bytes` for a file without attaching it to any bundle
    pub(crate) fn with_file(mut self, file: &FileRef, bytes: Vec<u8>) -> Self {
        self.files.insert(file.key(), bytes);
        self
    }

    /// Make search return an identifier that is not a valid FQID
    pub(crate) fn with_raw_fqid(mut self, fqid: &str) -> Self {
        self.fqids.push(fqid.to_string());
        self
    }

    pub(crate) fn with_manifest_delay(mut self, uuid: &str, delay: Duration) -> Self {
        self.manifest_delays.insert(uuid.to_string(), delay);
        self
    }

    /// Delay serving the file stored under `key`
    pub(crate) fn with_file_delay(mut self, key: &str, delay: Duration) -> Self {
        self.file_delays.insert(key.to_string(), delay);
        self
    }

    pub(crate) fn with_failing_manifest(mut self, uuid: &str) -> Self {
        self.failing_manifests.insert(uuid.to_string());
        self
    }

    /// Fail every search page request after `pages` successful ones
    pub(crate) fn with_failing_search_after(mut self, pages: usize) -> Self {
        self.failing_search_after = Some(pages);
        self
    }

    pub(crate) fn search_calls(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    pub(crate) fn manifest_fetches(&self, uuid: &str) -> usize {
        self.manifest_calls
            .lock()
            .expect("lock")
            .get(uuid)
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn file_fetches(&self, key: &str) -> usize {
        self.file_calls
            .lock()
            .expect("lock")
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn total_file_fetches(&self) -> usize {
        self.file_calls.lock().expect("lock").values().sum()
    }
}

fn not_found(url: String) -> EtlError {
    EtlError::Transport { status: 404, url }
}

#[async_trait]
impl RemoteStore for FakeRemote {
    async fn search(
        &self,
        _query: &Value,
        page_size: usize,
        cursor: Option<&PageCursor>,
    ) -> Result<SearchPage> {
        let call = self.searches.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = self.failing_search_after {
            if call >= limit {
                return Err(EtlError::Transport {
                    status: 503,
                    url: "fake://search".into(),
                });
            }
        }

        let offset = cursor.map(|c| c.0.parse::<usize>().expect("cursor")).unwrap_or(0);
        let end = (offset + page_size).min(self.fqids.len());
        let next = (end < self.fqids.len()).then(|| PageCursor(end.to_string()));

        Ok(SearchPage {
            total_hits: self.fqids.len() as u64,
            bundle_fqids: self.fqids[offset..end].to_vec(),
            next,
        })
    }

    async fn get_manifest(&self, bundle: &BundleId) -> Result<Value> {
        *self
            .manifest_calls
            .lock()
            .expect("lock")
            .entry(bundle.uuid.clone())
            .or_default() += 1;

        if let Some(delay) = self.manifest_delays.get(&bundle.uuid) {
            tokio::time::sleep(*delay).await;
        }

        if self.failing_manifests.contains(&bundle.uuid) {
            return Err(EtlError::Transport {
                status: 500,
                url: format!("fake://bundles/{}", bundle.uuid),
            });
        }

        self.manifests
            .get(&bundle.uuid)
            .cloned()
            .ok_or_else(|| not_found(format!("fake://bundles/{}", bundle.uuid)))
    }

    async fn get_file(&self, file: &FileRef) -> Result<Vec<u8>> {
        *self
            .file_calls
            .lock()
            .expect("lock")
            .entry(file.key())
            .or_default() += 1;

        if let Some(delay) = self.file_delays.get(&file.key()) {
            tokio::time::sleep(*delay).await;
        }

        self.files
            .get(&file.key())
            .cloned()
            .ok_or_else(|| not_found(format!("fake://files/{}", file.uuid)))
    }
}
