//! The extractor handle
//!
//! [`Extractor`] ties configuration, staging layout, materializer and remote
//! store together. It is cheap to clone; every clone shares the same state,
//! so transforms can keep one around and materialize further bundles through
//! it. Runs are implemented in [`crate::dispatch`].

use crate::api::{DssClient, RemoteStore};
use crate::bundle::BundleId;
use crate::config::ExtractorConfig;
use crate::error::Result;
use crate::materialize::{FileSelector, Materialized, Materializer};
use crate::staging::StagingLayout;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{info_span, Instrument, Span};

#[derive(Clone)]
pub struct Extractor {
    inner: Arc<Inner>,
}

struct Inner {
    config: ExtractorConfig,
    layout: StagingLayout,
    materializer: Materializer,
    remote: OnceLock<Arc<dyn RemoteStore>>,
    span: Span,
}

impl Extractor {
    /// Create an extractor talking to `config.endpoint`
    ///
    /// The HTTP client is built on first use, so constructing an extractor
    /// never touches the network.
    pub fn new(config: ExtractorConfig) -> Result<Self> {
        Self::build(config, OnceLock::new())
    }

    /// Create an extractor backed by an existing remote store
    pub fn with_remote(config: ExtractorConfig, remote: Arc<dyn RemoteStore>) -> Result<Self> {
        Self::build(config, OnceLock::from(remote))
    }

    fn build(config: ExtractorConfig, remote: OnceLock<Arc<dyn RemoteStore>>) -> Result<Self> {
        config.validate()?;

        let selector = FileSelector::new(
            &config.effective_content_type_patterns(),
            &config.filename_patterns,
        )?;
        let layout = StagingLayout::new(&config.staging_dir);
        let span = info_span!("extractor", staging = %config.staging_dir.display());

        Ok(Self {
            inner: Arc::new(Inner {
                materializer: Materializer::new(layout.clone(), selector),
                layout,
                config,
                remote,
                span,
            }),
        })
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.inner.config
    }

    pub fn layout(&self) -> &StagingLayout {
        &self.inner.layout
    }

    pub fn materializer(&self) -> &Materializer {
        &self.inner.materializer
    }

    /// Span that scopes every log line produced on behalf of this extractor
    pub fn span(&self) -> &Span {
        &self.inner.span
    }

    /// The remote store, building the HTTP client on first call
    pub fn remote(&self) -> Result<Arc<dyn RemoteStore>> {
        if let Some(remote) = self.inner.remote.get() {
            return Ok(Arc::clone(remote));
        }

        let client: Arc<dyn RemoteStore> = Arc::new(DssClient::new(self.inner.config.endpoint.clone())?);
        Ok(Arc::clone(self.inner.remote.get_or_init(|| client)))
    }

    /// Materialize a single bundle outside of a run
    pub async fn materialize(&self, bundle: &BundleId) -> Result<Materialized> {
        let remote = self.remote()?;
        self.inner
            .materializer
            .materialize(bundle, remote.as_ref())
            .instrument(info_span!(parent: &self.inner.span, "bundle", bundle = %bundle))
            .await
    }
}

impl fmt::Debug for Extractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extractor")
            .field("staging_dir", &self.inner.config.staging_dir)
            .field("endpoint", &self.inner.config.endpoint.base_url)
            .field("remote_ready", &self.inner.remote.get().is_some())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::{DssEndpoint, FailurePolicy};
    use crate::error::EtlError;
    use crate::test_support::{file_ref, FakeRemote, METADATA_TYPE};
    use tempfile::TempDir;

    #[test]
    fn test_new_does_not_build_client() {
        let temp = TempDir::new().unwrap();
        let extractor = Extractor::new(ExtractorConfig::new(temp.path())).unwrap();
        assert!(format!("{:?}", extractor).contains("remote_ready: false"));

        extractor.remote().unwrap();
        assert!(format!("{:?}", extractor).contains("remote_ready: true"));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let temp = TempDir::new().unwrap();
        let mut config = ExtractorConfig::new(temp.path());
        config.max_workers = 0;
        assert!(matches!(Extractor::new(config), Err(EtlError::Config(_))));

        let mut config = ExtractorConfig::new(temp.path());
        config.filename_patterns = vec!["[oops".into()];
        assert!(Extractor::new(config).is_err());
    }

    #[test]
    fn test_serialized_config_rebuilds_equivalent_extractor() {
        let temp = TempDir::new().unwrap();
        let mut config = ExtractorConfig::new(temp.path());
        config.endpoint = DssEndpoint::new("http://dss.example.org/v1");
        config.filename_patterns = vec!["*.json".into()];
        config.failure_policy = FailurePolicy::Abort;

        let original = Extractor::new(config.clone()).unwrap();
        let wire = serde_json::to_string(original.config()).unwrap();
        let rebuilt = Extractor::new(serde_json::from_str(&wire).unwrap()).unwrap();

        assert_eq!(rebuilt.config(), original.config());
        assert_eq!(rebuilt.layout(), original.layout());
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let temp = TempDir::new().unwrap();
        let remote = Arc::new(
            FakeRemote::new()
                .with_bundle("b1.v1", &[file_ref("f1", "fv1", "a.json", METADATA_TYPE, b"{}")]),
        );
        let extractor = Extractor::with_remote(ExtractorConfig::new(temp.path()), remote.clone()).unwrap();
        let clone = extractor.clone();

        let first = extractor.materialize(&BundleId::new("b1", "v1")).await.unwrap();
        let second = clone.materialize(&BundleId::new("b1", "v1")).await.unwrap();

        assert_eq!(first.fetched_files.len(), 1);
        assert_eq!(second.reused_files, 1);
        assert_eq!(remote.total_file_fetches(), 1);
    }
}
