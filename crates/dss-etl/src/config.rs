//! Extractor configuration
//!
//! Resolution order: built-in defaults, then an optional TOML file, then
//! `DSS_ETL_*` environment variables, then command-line flags.
//!
//! The whole configuration, including the remote endpoint, is plain data and
//! serde-serializable. A worker in another process can rebuild an equivalent
//! extractor from it; no live connection state is carried around.

use crate::error::{EtlError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default DSS API root
pub const DEFAULT_BASE_URL: &str = "https://dss.data.humancellatlas.org/v1";

/// Replica requested on every remote call unless configured otherwise
pub const DEFAULT_REPLICA: &str = "aws";

/// Default request timeout; file downloads can be large
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Search page size; the DSS search API accepts at most 500
pub const DEFAULT_PAGE_SIZE: usize = 500;
pub const MAX_PAGE_SIZE: usize = 500;

pub const DEFAULT_MAX_WORKERS: usize = 512;
pub const DEFAULT_MAX_DISPATCHERS: usize = 1;

/// Selects DCP metadata documents only
pub const DEFAULT_CONTENT_TYPE_PATTERN: &str = r#"application/json; dcp-type="metadata*""#;

/// Query matching every bundle that has not been administratively deleted
pub fn default_bundle_query() -> Value {
    json!({"query": {"bool": {"must_not": {"term": {"admin_deleted": true}}}}})
}

/// Serializable description of the remote store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DssEndpoint {
    /// API root, e.g. `https://dss.data.humancellatlas.org/v1`
    pub base_url: String,

    /// Replica passed on every search, manifest and file request
    pub replica: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for DssEndpoint {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            replica: DEFAULT_REPLICA.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl DssEndpoint {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }
}

/// What a failed bundle does to the rest of the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Record the failure, keep going, load and finalize the successes
    #[default]
    Continue,
    /// Stop at the first failure; load and finalize are not invoked
    Abort,
}

impl std::str::FromStr for FailurePolicy {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "continue" => Ok(Self::Continue),
            "abort" | "fail-fast" => Ok(Self::Abort),
            other => Err(EtlError::config(format!(
                "Invalid failure policy '{}': expected 'continue' or 'abort'",
                other
            ))),
        }
    }
}

/// Everything the extractor needs to run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Root of the manifest cache, content store and bundle views
    pub staging_dir: PathBuf,

    /// Content-type globs selecting files to fetch; empty means the default
    pub content_type_patterns: Vec<String>,

    /// File name globs selecting files to fetch
    pub filename_patterns: Vec<String>,

    /// Call the transform with no bundle path when nothing was selected
    pub dispatch_on_empty_bundles: bool,

    /// Upper bound on bundles processed concurrently
    pub max_workers: usize,

    /// How many pages of identifiers the pager may run ahead of the workers
    pub max_dispatchers: usize,

    pub page_size: usize,

    pub failure_policy: FailurePolicy,

    /// Draw a progress bar on stderr
    pub show_progress: bool,

    pub endpoint: DssEndpoint,

    /// Elasticsearch query document sent to the search API
    pub query: Value,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            staging_dir: PathBuf::from("./staging"),
            content_type_patterns: vec![DEFAULT_CONTENT_TYPE_PATTERN.to_string()],
            filename_patterns: Vec::new(),
            dispatch_on_empty_bundles: false,
            max_workers: DEFAULT_MAX_WORKERS,
            max_dispatchers: DEFAULT_MAX_DISPATCHERS,
            page_size: DEFAULT_PAGE_SIZE,
            failure_policy: FailurePolicy::Continue,
            show_progress: false,
            endpoint: DssEndpoint::default(),
            query: default_bundle_query(),
        }
    }
}

impl ExtractorConfig {
    /// Defaults with the given staging directory
    pub fn new(staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            ..Self::default()
        }
    }

    /// Load from a TOML file; missing keys keep their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            EtlError::config(format!("Cannot read config file '{}': {}", path.display(), e))
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Apply `DSS_ETL_*` environment overrides
    pub fn merge_env(self) -> Result<Self> {
        self.merge_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable source
    pub fn merge_env_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("DSS_ETL_STAGING_DIR") {
            self.staging_dir = PathBuf::from(dir);
        }

        if let Some(url) = lookup("DSS_ETL_BASE_URL") {
            self.endpoint.base_url = url;
        }

        if let Some(replica) = lookup("DSS_ETL_REPLICA") {
            self.endpoint.replica = replica;
        }

        if let Some(secs) = lookup("DSS_ETL_TIMEOUT_SECS") {
            self.endpoint.timeout_secs = parse_number("DSS_ETL_TIMEOUT_SECS", &secs)?;
        }

        if let Some(workers) = lookup("DSS_ETL_MAX_WORKERS") {
            self.max_workers = parse_number("DSS_ETL_MAX_WORKERS", &workers)?;
        }

        if let Some(dispatchers) = lookup("DSS_ETL_MAX_DISPATCHERS") {
            self.max_dispatchers = parse_number("DSS_ETL_MAX_DISPATCHERS", &dispatchers)?;
        }

        if let Some(size) = lookup("DSS_ETL_PAGE_SIZE") {
            self.page_size = parse_number("DSS_ETL_PAGE_SIZE", &size)?;
        }

        if let Some(policy) = lookup("DSS_ETL_FAILURE_POLICY") {
            self.failure_policy = policy.parse()?;
        }

        Ok(self)
    }

    /// Content-type patterns in effect, falling back to the default
    pub fn effective_content_type_patterns(&self) -> Vec<String> {
        if self.content_type_patterns.is_empty() {
            vec![DEFAULT_CONTENT_TYPE_PATTERN.to_string()]
        } else {
            self.content_type_patterns.clone()
        }
    }

    /// Check limits and required values
    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(EtlError::config("max_workers must be at least 1"));
        }

        if self.max_dispatchers == 0 {
            return Err(EtlError::config("max_dispatchers must be at least 1"));
        }

        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(EtlError::config(format!(
                "page_size must be between 1 and {}, got {}",
                MAX_PAGE_SIZE, self.page_size
            )));
        }

        if self.endpoint.base_url.trim().is_empty() {
            return Err(EtlError::config("endpoint.base_url must not be empty"));
        }

        if self.staging_dir.as_os_str().is_empty() {
            return Err(EtlError::config("staging_dir must not be empty"));
        }

        if !self.query.is_object() {
            return Err(EtlError::config("query must be a JSON object"));
        }

        Ok(())
    }

    /// Render as TOML, e.g. for `config show`
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| EtlError::config(format!("{} must be a number, got '{}'", key, value)))
}
