//! Content store
//!
//! Every distinct file version is stored once under `files/{uuid}.{version}`.
//! An existing entry is only reused after its sha256 has been recomputed and
//! matches the digest declared by the manifest; anything else is refetched.
//!
//! Concurrent requests for the same key are serialized, so a file shared by
//! several bundles in flight is fetched once and reused by the others.

use crate::api::RemoteStore;
use crate::bundle::FileRef;
use crate::error::{EtlError, Result};
use crate::staging::{self, StagingLayout};
use dss_etl_common::{checksum, CommonError};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

type KeyLock = Arc<Mutex<()>>;

/// Result of [`ContentStore::fetch_or_reuse`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub path: PathBuf,
    /// True when the bytes came from the network on this call
    pub was_fetched: bool,
}

enum EntryState {
    Valid,
    Missing,
    Mismatch { actual: String },
}

/// Clones share the in-flight key table
#[derive(Debug, Clone)]
pub struct ContentStore {
    layout: StagingLayout,
    in_flight: Arc<Mutex<HashMap<String, KeyLock>>>,
}

impl ContentStore {
    pub fn new(layout: StagingLayout) -> Self {
        Self {
            layout,
            in_flight: Arc::default(),
        }
    }

    /// Make sure `files/` exists
    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(self.layout.files_dir()).await?;
        Ok(())
    }

    /// Return a verified entry for `file`, fetching it if needed
    ///
    /// A missing or mismatching entry triggers exactly one remote fetch. The
    /// fresh bytes are verified before they are written; if they do not match
    /// either, the call fails with [`EtlError::IntegrityFault`] and the key is
    /// left as it was.
    ///
    /// Callers racing on the same key wait for the first one and then see its
    /// entry as valid.
    pub async fn fetch_or_reuse(&self, file: &FileRef, remote: &dyn RemoteStore) -> Result<StoredFile> {
        let key = file.key();
        let lock = self.acquire(&key).await;
        let result = {
            let _held = lock.lock().await;
            self.fetch_or_reuse_locked(file, remote).await
        };
        self.release(&key, lock).await;
        result
    }

    async fn acquire(&self, key: &str) -> KeyLock {
        let mut in_flight = self.in_flight.lock().await;
        Arc::clone(in_flight.entry(key.to_string()).or_default())
    }

    /// Forget the key once no other caller holds or waits on it
    async fn release(&self, key: &str, lock: KeyLock) {
        let mut in_flight = self.in_flight.lock().await;
        // One reference in the table, one here
        if Arc::strong_count(&lock) == 2 {
            in_flight.remove(key);
        }
    }

    async fn fetch_or_reuse_locked(&self, file: &FileRef, remote: &dyn RemoteStore) -> Result<StoredFile> {
        let path = self.layout.file_path(file);

        match inspect(&path, &file.sha256).await? {
            EntryState::Valid => {
                debug!(file = %file.name, key = %file.key(), "Content store hit");
                return Ok(StoredFile {
                    path,
                    was_fetched: false,
                });
            },
            EntryState::Missing => {
                debug!(file = %file.name, key = %file.key(), "Content store miss");
            },
            EntryState::Mismatch { actual } => {
                warn!(
                    file = %file.name,
                    key = %file.key(),
                    expected = %file.sha256,
                    actual = %actual,
                    "Stored content does not match manifest digest, refetching"
                );
            },
        }

        let bytes = remote.get_file(file).await?;

        match checksum::verify_checksum(&bytes, &file.sha256) {
            Ok(()) => {},
            Err(CommonError::ChecksumMismatch { expected, actual }) => {
                return Err(EtlError::IntegrityFault {
                    file: file.name.clone(),
                    key: file.key(),
                    expected,
                    actual,
                });
            },
            Err(e) => return Err(e.into()),
        }

        staging::write_atomically(&path, &bytes).await?;
        info!(file = %file.name, key = %file.key(), bytes = bytes.len(), "Fetched file");

        Ok(StoredFile {
            path,
            was_fetched: true,
        })
    }
}

/// Hash an existing entry off the async runtime
async fn inspect(path: &Path, expected: &str) -> Result<EntryState> {
    let owned = path.to_path_buf();
    let hashed = tokio::task::spawn_blocking(move || checksum::compute_file_checksum(&owned))
        .await
        .map_err(|e| EtlError::Io(std::io::Error::other(e)))?;

    match hashed {
        Ok(actual) if checksum::digests_match(&actual, expected) => Ok(EntryState::Valid),
        Ok(actual) => Ok(EntryState::Mismatch { actual }),
        Err(CommonError::Io(e)) if e.kind() == ErrorKind::NotFound => Ok(EntryState::Missing),
        Err(e) => Err(e.into()),
    }
}
