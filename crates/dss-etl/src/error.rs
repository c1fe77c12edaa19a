//! Error types for the extractor
//!
//! Variants follow the fault taxonomy the extractor reports on:
//!
//! - **Transport faults** (`Transport`, `Http`): a remote call failed. Never
//!   retried here; they fail the unit of work that issued them.
//! - **Integrity faults** (`IntegrityFault`): freshly fetched bytes do not
//!   match the digest declared in the manifest.
//! - **Callback failures** (`Callback`, `WorkerPanicked`): a pipeline hook
//!   returned an error or panicked.
//!
//! Cache misses and corrupted cache entries are not errors; they are recovered
//! by refetching and only show up in debug logs.

use dss_etl_common::CommonError;
use thiserror::Error;

/// Result type alias for extractor operations
pub type Result<T> = std::result::Result<T, EtlError>;

#[derive(Error, Debug)]
pub enum EtlError {
    /// The remote store answered with a non-success status
    #[error("Remote store returned {status} for {url}")]
    Transport { status: u16, url: String },

    /// The request could not be sent or the body could not be read
    #[error("Network request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Freshly fetched content does not match its declared digest
    #[error("Integrity fault for file {file} ({key}): expected sha256 {expected}, got {actual}")]
    IntegrityFault {
        file: String,
        key: String,
        expected: String,
        actual: String,
    },

    /// A bundle identifier is not of the form `uuid.version`
    #[error("Invalid bundle FQID '{0}': expected '<uuid>.<version>'")]
    InvalidFqid(String),

    /// A manifest entry whose uuid or version is not a plain path component
    #[error("Refusing to store file {file}: key '{key}' is not a plain file name")]
    UnsafeFileKey { file: String, key: String },

    /// A selection glob failed to compile
    #[error("Invalid glob pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Failed to render config: {0}")]
    TomlRender(#[from] toml::ser::Error),

    #[error(transparent)]
    Checksum(#[from] CommonError),

    /// A transform, load or finalize hook returned an error
    #[error("Pipeline callback failed: {0:#}")]
    Callback(anyhow::Error),

    /// A worker task panicked or was cancelled
    #[error("Worker for bundle {fqid} did not complete: {reason}")]
    WorkerPanicked { fqid: String, reason: String },

    /// The run finished but some bundles failed under the `continue` policy
    #[error("{failed} of {total} bundles failed; see the log for details")]
    PartialFailure { failed: usize, total: usize },
}

impl EtlError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a transport error for a non-success response
    pub fn transport(status: reqwest::StatusCode, url: impl Into<String>) -> Self {
        Self::Transport {
            status: status.as_u16(),
            url: url.into(),
        }
    }

    /// True for faults raised by the remote store or the network
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Http(_))
    }

    /// True for content that failed digest verification after a fresh fetch
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::IntegrityFault { .. })
    }
}
