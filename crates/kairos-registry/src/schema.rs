//! Manifest schemas as served by container registries.
//!
//! Two schemas are in circulation: the legacy Docker "schema1" manifest, whose
//! `history` entries embed the image configuration as a JSON string, and the
//! "schema2"/OCI manifest, which references a separate configuration blob.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Manifest media types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaType(String);

impl MediaType {
    /// Docker schema1 manifest.
    pub const DOCKER_MANIFEST_V1: &'static str =
        "application/vnd.docker.distribution.manifest.v1+json";

    /// Signed Docker schema1 manifest.
    pub const DOCKER_MANIFEST_V1_SIGNED: &'static str =
        "application/vnd.docker.distribution.manifest.v1+prettyjws";

    /// Docker schema2 manifest.
    pub const DOCKER_MANIFEST_V2: &'static str =
        "application/vnd.docker.distribution.manifest.v2+json";

    /// OCI image manifest.
    pub const OCI_MANIFEST: &'static str = "application/vnd.oci.image.manifest.v1+json";

    /// Docker image configuration blob.
    pub const DOCKER_CONFIG: &'static str = "application/vnd.docker.container.image.v1+json";

    /// Creates a new media type.
    #[must_use]
    pub fn new(media_type: impl Into<String>) -> Self {
        Self(media_type.into())
    }

    /// Returns the media type string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `Accept` header value for schema1 requests.
    #[must_use]
    pub fn schema1_accept() -> String {
        format!(
            "{}, {}",
            Self::DOCKER_MANIFEST_V1_SIGNED,
            Self::DOCKER_MANIFEST_V1
        )
    }

    /// `Accept` header value for schema2 requests.
    #[must_use]
    pub fn schema2_accept() -> String {
        format!("{}, {}", Self::DOCKER_MANIFEST_V2, Self::OCI_MANIFEST)
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for MediaType {
    fn default() -> Self {
        Self::new(Self::DOCKER_MANIFEST_V2)
    }
}

impl Serialize for MediaType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for MediaType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self(s))
    }
}

/// Content descriptor referenced from a schema2 manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Media type of the referenced content.
    pub media_type: MediaType,

    /// Digest of the targeted content.
    pub digest: String,

    /// Size in bytes of the content.
    pub size: u64,
}

/// Legacy schema1 manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestV1 {
    /// Schema version (always 1).
    #[serde(default)]
    pub schema_version: u32,

    /// Repository name.
    #[serde(default)]
    pub name: String,

    /// Tag name.
    #[serde(default)]
    pub tag: String,

    /// Image history, most recent entry first.
    #[serde(default)]
    pub history: Vec<V1History>,
}

impl ManifestV1 {
    /// Creates a manifest holding the given raw `v1Compatibility` blobs.
    #[must_use]
    pub fn with_history<I, S>(blobs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            schema_version: 1,
            history: blobs
                .into_iter()
                .map(|b| V1History {
                    v1_compatibility: b.into(),
                })
                .collect(),
            ..Self::default()
        }
    }
}

/// A schema1 history entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct V1History {
    /// Image configuration serialized as a JSON string.
    #[serde(rename = "v1Compatibility")]
    pub v1_compatibility: String,
}

/// Schema2 (Docker or OCI) manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestV2 {
    /// Schema version (always 2).
    #[serde(default)]
    pub schema_version: u32,

    /// Media type of this manifest.
    #[serde(default)]
    pub media_type: MediaType,

    /// Image configuration descriptor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Descriptor>,

    /// Layer descriptors.
    #[serde(default)]
    pub layers: Vec<Descriptor>,

    /// Manifest digest as reported by the registry. Not part of the document.
    #[serde(skip)]
    pub digest: Option<String>,
}

/// Metadata a registry client can derive from a schema2 manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageMetadata {
    /// Image creation time, if the configuration carries one.
    pub created: Option<DateTime<Utc>>,
}

/// Subset of an image configuration blob.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageConfig {
    /// RFC 3339 creation time.
    #[serde(default)]
    pub created: Option<String>,
}

/// Response from the `/v2/<name>/tags/list` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagListResponse {
    /// Repository name.
    pub name: String,

    /// List of tags. Some registries send `null` for empty repositories.
    #[serde(default, deserialize_with = "deserialize_null_tags")]
    pub tags: Vec<String>,
}

fn deserialize_null_tags<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_v1_deserialization() {
        let json = r#"{
            "schemaVersion": 1,
            "name": "foo/bar",
            "tag": "1.2.1",
            "architecture": "amd64",
            "fsLayers": [],
            "history": [
                {"v1Compatibility": "{\"created\":\"2024-01-02T03:04:05.123456789Z\"}"},
                {"v1Compatibility": "{\"created\":\"2023-01-01T00:00:00Z\"}"}
            ]
        }"#;

        let manifest: ManifestV1 = serde_json::from_str(json).unwrap();
        assert_eq!(manifest.schema_version, 1);
        assert_eq!(manifest.tag, "1.2.1");
        assert_eq!(manifest.history.len(), 2);
        assert!(manifest.history[0].v1_compatibility.contains("2024-01-02"));
    }

    #[test]
    fn test_manifest_v2_deserialization() {
        let json = r#"{
            "schemaVersion": 2,
            "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
            "config": {
                "mediaType": "application/vnd.docker.container.image.v1+json",
                "digest": "sha256:cfg",
                "size": 1469
            },
            "layers": [
                {"mediaType": "application/vnd.docker.image.rootfs.diff.tar.gzip", "digest": "sha256:l1", "size": 10}
            ]
        }"#;

        let manifest: ManifestV2 = serde_json::from_str(json).unwrap();
        assert_eq!(manifest.schema_version, 2);
        assert_eq!(manifest.media_type.as_str(), MediaType::DOCKER_MANIFEST_V2);
        assert_eq!(manifest.config.unwrap().digest, "sha256:cfg");
        assert_eq!(manifest.layers.len(), 1);
        assert!(manifest.digest.is_none());
    }

    #[test]
    fn test_tag_list_deserialization() {
        let json = r#"{"name": "foo/bar", "tags": ["1.2.0", "1.2.1"]}"#;
        let tags: TagListResponse = serde_json::from_str(json).unwrap();
        assert_eq!(tags.name, "foo/bar");
        assert_eq!(tags.tags.len(), 2);
    }

    #[test]
    fn test_tag_list_null_tags() {
        let json = r#"{"name": "foo/bar", "tags": null}"#;
        let tags: TagListResponse = serde_json::from_str(json).unwrap();
        assert!(tags.tags.is_empty());
    }

    #[test]
    fn test_accept_headers() {
        assert!(MediaType::schema1_accept().contains("manifest.v1+prettyjws"));
        assert!(MediaType::schema2_accept().contains(MediaType::OCI_MANIFEST));
    }
}
