//! Read-through cache for bundle manifests
//!
//! Manifests are immutable per bundle version, so a cached copy is trusted
//! forever. An unreadable or malformed cache file counts as a miss.

use crate::api::RemoteStore;
use crate::bundle::{BundleId, Manifest};
use crate::error::Result;
use crate::staging::{self, StagingLayout};
use std::io::ErrorKind;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ManifestCache {
    layout: StagingLayout,
}

impl ManifestCache {
    pub fn new(layout: StagingLayout) -> Self {
        Self { layout }
    }

    /// Return the manifest of `bundle`, fetching and persisting it on a miss
    pub async fn get_manifest(&self, bundle: &BundleId, remote: &dyn RemoteStore) -> Result<Manifest> {
        if let Some(manifest) = self.read_cached(bundle).await {
            debug!(bundle = %bundle, "Loaded cached manifest");
            return Ok(manifest);
        }

        let raw = remote.get_manifest(bundle).await?;
        let manifest: Manifest = serde_json::from_value(raw.clone())?;

        // Concurrent writers store identical documents; the last rename wins
        staging::write_atomically(&self.layout.manifest_path(bundle), &serde_json::to_vec(&raw)?)
            .await?;
        info!(bundle = %bundle, files = manifest.files.len(), "Fetched manifest");

        Ok(manifest)
    }

    async fn read_cached(&self, bundle: &BundleId) -> Option<Manifest> {
        let path = self.layout.manifest_path(bundle);

        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(bundle = %bundle, error = %e, "Cannot read cached manifest, refetching");
                return None;
            },
        };

        match serde_json::from_slice(&content) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                warn!(bundle = %bundle, error = %e, "Cached manifest is malformed, refetching");
                None
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::test_support::{file_ref, FakeRemote, METADATA_TYPE};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_miss_fetches_and_persists_then_hits() {
        let temp = TempDir::new().unwrap();
        let layout = StagingLayout::new(temp.path());
        let cache = ManifestCache::new(layout.clone());
        let remote = FakeRemote::new().with_bundle(
            "b1.v1",
            &[file_ref("f1", "fv1", "a.json", METADATA_TYPE, b"{}")],
        );
        let bundle = BundleId::new("b1", "v1");

        let fetched = cache.get_manifest(&bundle, &remote).await.unwrap();
        assert_eq!(fetched.files.len(), 1);
        assert!(layout.manifest_path(&bundle).exists());

        let cached = cache.get_manifest(&bundle, &remote).await.unwrap();
        assert_eq!(cached, fetched);
        assert_eq!(remote.manifest_fetches("b1"), 1);
    }

    #[tokio::test]
    async fn test_malformed_cache_is_a_miss() {
        let temp = TempDir::new().unwrap();
        let layout = StagingLayout::new(temp.path());
        let cache = ManifestCache::new(layout.clone());
        let remote = FakeRemote::new().with_bundle(
            "b1.v1",
            &[file_ref("f1", "fv1", "a.json", METADATA_TYPE, b"{}")],
        );
        let bundle = BundleId::new("b1", "v1");

        staging::write_atomically(&layout.manifest_path(&bundle), b"{\"files\": [trunc")
            .await
            .unwrap();

        let manifest = cache.get_manifest(&bundle, &remote).await.unwrap();
        assert_eq!(manifest.files[0].uuid, "f1");
        assert_eq!(remote.manifest_fetches("b1"), 1);

        let repaired: Manifest =
            serde_json::from_slice(&tokio::fs::read(layout.manifest_path(&bundle)).await.unwrap())
                .unwrap();
        assert_eq!(repaired, manifest);
    }

    #[tokio::test]
    async fn test_remote_failure_propagates_and_caches_nothing() {
        let temp = TempDir::new().unwrap();
        let layout = StagingLayout::new(temp.path());
        let cache = ManifestCache::new(layout.clone());
        let remote = FakeRemote::new()
            .with_bundle("b1.v1", &[])
            .with_failing_manifest("b1");
        let bundle = BundleId::new("b1", "v1");

        let err = cache.get_manifest(&bundle, &remote).await.unwrap_err();
        assert!(err.is_transport());
        assert!(!layout.manifest_path(&bundle).exists());
    }
}
