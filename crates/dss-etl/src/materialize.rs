//! Bundle materialization
//!
//! Turns a manifest into an on-disk bundle view: selected files are fetched
//! into (or reused from) the content store and symlinked under
//! `bundles/{uuid}.{version}/{name}`. Unselected files are never touched.

use crate::api::RemoteStore;
use crate::bundle::{BundleId, FileRef};
use crate::error::{EtlError, Result};
use crate::manifest_cache::ManifestCache;
use crate::staging::StagingLayout;
use crate::store::ContentStore;
use glob::Pattern;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{debug, trace, warn};

/// Which manifest entries get fetched
///
/// A file is selected when its content type matches any content-type glob or
/// its name matches any filename glob. Matching is case-sensitive.
#[derive(Debug, Clone)]
pub struct FileSelector {
    content_types: Vec<Pattern>,
    filenames: Vec<Pattern>,
}

impl FileSelector {
    pub fn new(content_type_patterns: &[String], filename_patterns: &[String]) -> Result<Self> {
        Ok(Self {
            content_types: compile(content_type_patterns)?,
            filenames: compile(filename_patterns)?,
        })
    }

    pub fn selects(&self, file: &FileRef) -> bool {
        self.content_types
            .iter()
            .any(|p| p.matches(&file.content_type))
            || self.filenames.iter().any(|p| p.matches(&file.name))
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Pattern>> {
    patterns
        .iter()
        .map(|pattern| {
            Pattern::new(pattern).map_err(|e| EtlError::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.msg.to_string(),
            })
        })
        .collect()
}

/// What [`Materializer::materialize`] did for one bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Materialized {
    pub bundle: BundleId,
    /// Selected files that needed a network fetch
    pub fetched_files: Vec<FileRef>,
    /// Selected files served from the content store
    pub reused_files: usize,
    /// Selected files whose names cannot be used as link names
    pub skipped_files: usize,
    pub manifest_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Materializer {
    layout: StagingLayout,
    manifests: ManifestCache,
    store: ContentStore,
    selector: FileSelector,
}

impl Materializer {
    pub fn new(layout: StagingLayout, selector: FileSelector) -> Self {
        Self {
            manifests: ManifestCache::new(layout.clone()),
            store: ContentStore::new(layout.clone()),
            layout,
            selector,
        }
    }

    /// Fetch what is missing and (re)build the bundle view
    ///
    /// Calling this again for an unchanged bundle performs no network calls
    /// and leaves the view as it was.
    pub async fn materialize(&self, bundle: &BundleId, remote: &dyn RemoteStore) -> Result<Materialized> {
        bundle.validate()?;
        let manifest = self.manifests.get_manifest(bundle, remote).await?;
        let bundle_dir = self.layout.bundle_dir(bundle);

        let mut result = Materialized {
            bundle: bundle.clone(),
            fetched_files: Vec::new(),
            reused_files: 0,
            skipped_files: 0,
            manifest_path: self.layout.manifest_path(bundle),
        };

        for file in &manifest.files {
            if !self.selector.selects(file) {
                trace!(bundle = %bundle, file = %file.name, "Skipping file (no filter match)");
                continue;
            }

            if !file.has_linkable_name() {
                warn!(bundle = %bundle, file = %file.name, "Skipping file with unusable name");
                result.skipped_files += 1;
                continue;
            }

            file.validate_key()?;
            tokio::fs::create_dir_all(&bundle_dir).await?;
            self.store.ensure_dir().await?;

            let stored = self.store.fetch_or_reuse(file, remote).await?;
            self.link(bundle, file).await?;

            if stored.was_fetched {
                result.fetched_files.push(file.clone());
            } else {
                result.reused_files += 1;
            }
        }

        debug!(
            bundle = %bundle,
            fetched = result.fetched_files.len(),
            reused = result.reused_files,
            skipped = result.skipped_files,
            "Materialized bundle"
        );

        Ok(result)
    }

    /// Create the view symlink unless something already sits at its path
    async fn link(&self, bundle: &BundleId, file: &FileRef) -> Result<()> {
        let link = self.layout.link_path(bundle, file);

        if tokio::fs::symlink_metadata(&link).await.is_ok() {
            return Ok(());
        }

        trace!(bundle = %bundle, file = %file.name, "Linking file");
        match create_symlink(StagingLayout::link_target(file), &link).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(unix)]
async fn create_symlink(target: PathBuf, link: &std::path::Path) -> std::io::Result<()> {
    tokio::fs::symlink(target, link).await
}

#[cfg(windows)]
async fn create_symlink(target: PathBuf, link: &std::path::Path) -> std::io::Result<()> {
    tokio::fs::symlink_file(target, link).await
}
