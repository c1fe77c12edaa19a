//! Staging directory layout
//!
//! ```text
//! {staging}/
//!   bundle_manifests/{uuid}.{version}.json   cached manifests
//!   files/{fileUuid}.{fileVersion}           content store entries
//!   bundles/{uuid}.{version}/{fileName}      symlinks to ../../files/{key}
//! ```
//!
//! Everything under `bundles/` is derived and can be rebuilt from the other
//! two directories. Wiping the whole staging directory forces a refetch.

use crate::bundle::{BundleId, FileRef};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

pub const MANIFESTS_DIR: &str = "bundle_manifests";
pub const FILES_DIR: &str = "files";
pub const BUNDLES_DIR: &str = "bundles";

/// Path derivation for everything the extractor writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingLayout {
    root: PathBuf,
}

impl StagingLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifests_dir(&self) -> PathBuf {
        self.root.join(MANIFESTS_DIR)
    }

    pub fn files_dir(&self) -> PathBuf {
        self.root.join(FILES_DIR)
    }

    pub fn bundles_dir(&self) -> PathBuf {
        self.root.join(BUNDLES_DIR)
    }

    pub fn manifest_path(&self, bundle: &BundleId) -> PathBuf {
        self.manifests_dir().join(format!("{}.json", bundle))
    }

    pub fn file_path(&self, file: &FileRef) -> PathBuf {
        self.files_dir().join(file.key())
    }

    pub fn bundle_dir(&self, bundle: &BundleId) -> PathBuf {
        self.bundles_dir().join(bundle.fqid())
    }

    pub fn link_path(&self, bundle: &BundleId, file: &FileRef) -> PathBuf {
        self.bundle_dir(bundle).join(&file.name)
    }

    /// Link target relative to the bundle view directory
    pub fn link_target(file: &FileRef) -> PathBuf {
        Path::new("..").join("..").join(FILES_DIR).join(file.key())
    }

    /// FQIDs of all materialized bundle views, sorted
    pub async fn list_bundles(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = match fs::read_dir(self.bundles_dir()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }

        names.sort();
        Ok(names)
    }

    /// Count what is currently staged
    pub async fn stats(&self) -> Result<StagingStats> {
        let manifests = count_entries(&self.manifests_dir()).await?;
        let files = count_entries(&self.files_dir()).await?;
        let bundles = self.list_bundles().await?.len();

        Ok(StagingStats {
            manifests: manifests.count,
            files: files.count,
            file_bytes: files.bytes,
            bundles,
        })
    }

    /// Remove all bundle views, keeping manifests and stored files
    pub async fn clean_views(&self) -> Result<usize> {
        let count = self.list_bundles().await?.len();
        remove_dir_if_exists(&self.bundles_dir()).await?;
        Ok(count)
    }

    /// Remove the whole staging directory
    pub async fn clean_all(&self) -> Result<()> {
        remove_dir_if_exists(&self.root).await
    }
}

/// Summary of a staging directory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingStats {
    pub manifests: usize,
    pub files: usize,
    pub file_bytes: u64,
    pub bundles: usize,
}

struct EntryCount {
    count: usize,
    bytes: u64,
}

/// Count regular files, skipping in-flight temporaries
async fn count_entries(dir: &Path) -> Result<EntryCount> {
    let mut total = EntryCount { count: 0, bytes: 0 };
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(total),
        Err(e) => return Err(e.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        let metadata = entry.metadata().await?;
        if metadata.is_file() {
            total.count += 1;
            total.bytes += metadata.len();
        }
    }

    Ok(total)
}

async fn remove_dir_if_exists(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Write `data` to `path` through a uniquely named sibling and a rename
///
/// Concurrent writers of identical content may race freely; each rename
/// replaces the target atomically and readers never observe a partial file.
pub(crate) async fn write_atomically(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).await?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = parent.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

    if let Err(e) = fs::write(&temp_path, data).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(e.into());
    }

    if let Err(e) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(e.into());
    }

    Ok(())
}
