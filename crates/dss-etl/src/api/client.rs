//! HTTP client for the DSS REST API
//!
//! Retries and authentication are left to the transport layer; every
//! non-success status is returned as [`EtlError::Transport`].

use crate::api::{endpoints, types::*, RemoteStore};
use crate::bundle::{BundleId, FileRef};
use crate::config::DssEndpoint;
use crate::error::{EtlError, Result};
use async_trait::async_trait;
use reqwest::header::LINK;
use reqwest::{Client, Response};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, trace};

const USER_AGENT: &str = concat!("dss-etl/", env!("CARGO_PKG_VERSION"));

/// API client for a DSS deployment
#[derive(Debug, Clone)]
pub struct DssClient {
    client: Client,
    endpoint: DssEndpoint,
}

impl DssClient {
    /// Build a client from its serializable description
    pub fn new(endpoint: DssEndpoint) -> Result<Self> {
        if endpoint.base_url.trim().is_empty() {
            return Err(EtlError::config("DSS base URL must not be empty"));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(endpoint.timeout_secs))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self { client, endpoint })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.endpoint.base_url
    }
}

/// Turn a non-success status into a transport fault
fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(EtlError::transport(status, response.url().as_str()))
    }
}

#[async_trait]
impl RemoteStore for DssClient {
    async fn search(
        &self,
        query: &Value,
        page_size: usize,
        cursor: Option<&PageCursor>,
    ) -> Result<SearchPage> {
        let body = SearchRequest { es_query: query };
        let per_page = page_size.to_string();

        let request = match cursor {
            // The next link already carries replica, page size and position
            Some(PageCursor(url)) => self.client.post(url),
            None => self.client.post(endpoints::search_url(&self.endpoint.base_url)).query(&[
                ("replica", self.endpoint.replica.as_str()),
                ("per_page", per_page.as_str()),
            ]),
        };

        let response = ensure_success(request.json(&body).send().await?)?;

        let next = response
            .headers()
            .get(LINK)
            .and_then(|value| value.to_str().ok())
            .and_then(endpoints::next_link)
            .map(PageCursor);

        let page: SearchResponse = response.json().await?;
        trace!(
            results = page.results.len(),
            has_next = next.is_some(),
            "Received search page"
        );

        Ok(SearchPage {
            total_hits: page.total_hits,
            bundle_fqids: page.results.into_iter().map(|r| r.bundle_fqid).collect(),
            next,
        })
    }

    async fn get_manifest(&self, bundle: &BundleId) -> Result<Value> {
        let url = endpoints::bundle_url(&self.endpoint.base_url, &bundle.uuid);
        debug!(bundle = %bundle, "Fetching manifest");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("replica", self.endpoint.replica.as_str()),
                ("version", bundle.version.as_str()),
            ])
            .send()
            .await?;

        let response: BundleResponse = ensure_success(response)?.json().await?;
        Ok(response.bundle)
    }

    async fn get_file(&self, file: &FileRef) -> Result<Vec<u8>> {
        let url = endpoints::file_url(&self.endpoint.base_url, &file.uuid);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("replica", self.endpoint.replica.as_str()),
                ("version", file.version.as_str()),
            ])
            .send()
            .await?;

        let bytes = ensure_success(response)?.bytes().await?.to_vec();
        Ok(bytes)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = DssClient::new(DssEndpoint::new("http://localhost:5000/v1")).unwrap();
        assert_eq!(client.base_url(), "http://localhost:5000/v1");
    }

    #[test]
    fn test_client_rejects_empty_base_url() {
        assert!(matches!(
            DssClient::new(DssEndpoint::new("  ")),
            Err(EtlError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_store_is_a_transport_fault() {
        let client = DssClient::new(DssEndpoint::new("http://127.0.0.1:9")).unwrap();
        let err = client
            .get_manifest(&BundleId::new("b1", "v1"))
            .await
            .unwrap_err();
        assert!(err.is_transport());
    }
}
