//! Bundle, manifest and file reference types
//!
//! A bundle is addressed by its FQID, `"{uuid}.{version}"`. Versions are
//! opaque timestamps such as `2019-05-16T211813.058000Z` and may themselves
//! contain dots, so the FQID is split on the first separator only.

use crate::error::{EtlError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of an immutable bundle
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BundleId {
    pub uuid: String,
    pub version: String,
}

impl BundleId {
    pub fn new(uuid: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            version: version.into(),
        }
    }

    /// Parse a `uuid.version` FQID
    ///
    /// Both parts must be usable as a single path component.
    pub fn parse_fqid(fqid: &str) -> Result<Self> {
        match fqid.split_once('.') {
            Some((uuid, version)) if is_path_component(uuid) && is_path_component(version) => {
                Ok(Self::new(uuid, version))
            },
            _ => Err(EtlError::InvalidFqid(fqid.to_string())),
        }
    }

    /// Reject identifiers that would not stay inside `bundles/`
    pub fn validate(&self) -> Result<()> {
        if is_path_component(&self.uuid) && is_path_component(&self.version) {
            Ok(())
        } else {
            Err(EtlError::InvalidFqid(self.fqid()))
        }
    }

    /// The FQID form, also used as the on-disk directory name
    pub fn fqid(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.uuid, self.version)
    }
}

impl FromStr for BundleId {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_fqid(s)
    }
}

/// One file entry of a bundle manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub uuid: String,
    pub version: String,
    /// Logical file name inside the bundle
    pub name: String,
    #[serde(rename = "content-type")]
    pub content_type: String,
    /// Lowercase hex sha256 of the file bytes
    pub sha256: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default)]
    pub indexed: bool,
}

impl FileRef {
    /// Content store key, `"{uuid}.{version}"`
    pub fn key(&self) -> String {
        format!("{}.{}", self.uuid, self.version)
    }

    /// Whether the logical name can be used as a single link name
    pub fn has_linkable_name(&self) -> bool {
        is_path_component(&self.name)
    }

    /// Reject references whose store key would not stay inside `files/`
    pub fn validate_key(&self) -> Result<()> {
        if is_path_component(&self.uuid) && is_path_component(&self.version) {
            Ok(())
        } else {
            Err(EtlError::UnsafeFileKey {
                file: self.name.clone(),
                key: self.key(),
            })
        }
    }
}

/// A non-empty name that resolves to exactly one entry of its parent directory
fn is_path_component(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}

/// The cached description of a bundle
///
/// Only `files` is required; the remaining manifest fields are passed through
/// untouched by the cache and ignored here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    pub files: Vec<FileRef>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_fqid_splits_on_first_dot() {
        let id = BundleId::parse_fqid("0a1b.2019-05-16T211813.058000Z").unwrap();
        assert_eq!(id.uuid, "0a1b");
        assert_eq!(id.version, "2019-05-16T211813.058000Z");
        assert_eq!(id.to_string(), "0a1b.2019-05-16T211813.058000Z");
    }

    #[test]
    fn test_parse_fqid_rejects_malformed() {
        for bad in ["no-version", ".v1", "b1.", "", "../../escaped.v1", "b1.v1/../../x", "..\\up.v1"] {
            assert!(
                matches!(BundleId::parse_fqid(bad), Err(EtlError::InvalidFqid(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_validate_rejects_traversing_ids() {
        assert!(BundleId::new("b1", "2019-05-16T211813.058000Z").validate().is_ok());

        for (uuid, version) in [("..", "v1"), ("b1", ".."), ("../../escaped", "v1"), ("b1", "v1/x"), ("", "v1")] {
            assert!(
                matches!(BundleId::new(uuid, version).validate(), Err(EtlError::InvalidFqid(_))),
                "{uuid:?}/{version:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_manifest_deserializes_dss_shape() {
        let manifest: Manifest = serde_json::from_value(json!({
            "uuid": "b1",
            "version": "v1",
            "creator_uid": 8008,
            "files": [{
                "uuid": "f1",
                "version": "fv1",
                "name": "cell_suspension_0.json",
                "content-type": "application/json; dcp-type=\"metadata/biomaterial\"",
                "sha256": "abc",
                "size": 12,
                "indexed": true,
                "crc32c": "ffff"
            }]
        }))
        .unwrap();

        assert_eq!(manifest.files.len(), 1);
        let file = &manifest.files[0];
        assert_eq!(file.key(), "f1.fv1");
        assert_eq!(file.size, Some(12));
        assert!(file.indexed);
    }

    #[test]
    fn test_manifest_without_files_is_rejected() {
        let parsed: std::result::Result<Manifest, _> =
            serde_json::from_value(json!({"uuid": "b1"}));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_linkable_names() {
        let mut file = FileRef {
            uuid: "f".into(),
            version: "v".into(),
            name: "links.json".into(),
            content_type: "application/json".into(),
            sha256: String::new(),
            size: None,
            indexed: false,
        };
        assert!(file.has_linkable_name());

        for bad in ["", ".", "..", "nested/name.json", "..\\up"] {
            file.name = bad.into();
            assert!(!file.has_linkable_name(), "{bad:?} should not be linkable");
        }
    }

    #[test]
    fn test_file_keys_must_stay_in_store() {
        let mut file = FileRef {
            uuid: "f1".into(),
            version: "2019-05-16T211813.058000Z".into(),
            name: "donor.json".into(),
            content_type: "application/json".into(),
            sha256: String::new(),
            size: None,
            indexed: false,
        };
        assert!(file.validate_key().is_ok());

        file.uuid = "../../escaped".into();
        assert!(matches!(file.validate_key(), Err(EtlError::UnsafeFileKey { .. })));

        file.uuid = "f1".into();
        file.version = "..".into();
        assert!(file.validate_key().is_err());
    }
}
