//! Wire types for the DSS search and bundle APIs

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque position in a paginated search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor(pub String);

/// One page of bundle identifiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPage {
    /// Total matches across all pages
    pub total_hits: u64,
    /// `uuid.version` identifiers on this page
    pub bundle_fqids: Vec<String>,
    /// Cursor for the following page, if any
    pub next: Option<PageCursor>,
}

/// Body of `POST /search`
#[derive(Debug, Clone, Serialize)]
pub struct SearchRequest<'a> {
    pub es_query: &'a Value,
}

/// Response of `POST /search`
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    pub total_hits: u64,
    #[serde(default)]
    pub results: Vec<SearchResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResult {
    pub bundle_fqid: String,
}

/// Response of `GET /bundles/{uuid}`; the inner document is the manifest
#[derive(Debug, Clone, Deserialize)]
pub struct BundleResponse {
    pub bundle: Value,
}
