//! Registry client abstraction.
//!
//! [`RegistryClient`] is the boundary between tag resolution and the registry
//! wire protocol. [`HttpRegistryClient`](crate::HttpRegistryClient) talks to a
//! real registry; [`MemoryRegistryClient`] serves canned data and counts calls,
//! which makes it suitable for tests and dry runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::error::{RegistryError, Result};
use crate::schema::{ImageMetadata, ManifestV1, ManifestV2};

/// Operations tag resolution needs from a registry.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Lists the raw tags of a repository.
    async fn tags(&self, repository: &str) -> Result<Vec<String>>;

    /// Fetches the legacy schema1 manifest of a tag.
    async fn manifest_v1(&self, repository: &str, tag: &str) -> Result<ManifestV1>;

    /// Fetches the schema2 manifest of a tag.
    async fn manifest_v2(&self, repository: &str, tag: &str) -> Result<ManifestV2>;

    /// Derives image metadata from a schema2 manifest.
    ///
    /// Returns `Ok(None)` when the registry offers nothing beyond the manifest.
    async fn tag_metadata(
        &self,
        repository: &str,
        manifest: &ManifestV2,
    ) -> Result<Option<ImageMetadata>>;
}

/// Registry client backed by in-memory data.
///
/// Lookups fall back to a default manifest when no per-tag manifest was
/// registered. Anything not registered at all fails with
/// [`RegistryError::NotFound`].
#[derive(Debug, Default)]
pub struct MemoryRegistryClient {
    tags: HashMap<String, Vec<String>>,
    manifests_v1: HashMap<(String, String), ManifestV1>,
    manifests_v2: HashMap<(String, String), ManifestV2>,
    default_v1: Option<ManifestV1>,
    default_v2: Option<ManifestV2>,
    metadata: HashMap<String, ImageMetadata>,
    tags_calls: AtomicUsize,
    manifest_v1_calls: AtomicUsize,
    manifest_v2_calls: AtomicUsize,
    metadata_calls: AtomicUsize,
}

impl MemoryRegistryClient {
    /// Creates an empty client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the tag list of a repository.
    #[must_use]
    pub fn with_tags<I, S>(mut self, repository: &str, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.insert(
            repository.to_string(),
            tags.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Registers the schema1 manifest of a tag.
    #[must_use]
    pub fn with_manifest_v1(mut self, repository: &str, tag: &str, manifest: ManifestV1) -> Self {
        self.manifests_v1
            .insert((repository.to_string(), tag.to_string()), manifest);
        self
    }

    /// Registers the schema2 manifest of a tag.
    #[must_use]
    pub fn with_manifest_v2(mut self, repository: &str, tag: &str, manifest: ManifestV2) -> Self {
        self.manifests_v2
            .insert((repository.to_string(), tag.to_string()), manifest);
        self
    }

    /// Sets the schema1 manifest served for tags without their own.
    #[must_use]
    pub fn with_default_manifest_v1(mut self, manifest: ManifestV1) -> Self {
        self.default_v1 = Some(manifest);
        self
    }

    /// Sets the schema2 manifest served for tags without their own.
    #[must_use]
    pub fn with_default_manifest_v2(mut self, manifest: ManifestV2) -> Self {
        self.default_v2 = Some(manifest);
        self
    }

    /// Registers metadata returned for schema2 manifests with the given digest.
    #[must_use]
    pub fn with_image_metadata(mut self, digest: &str, metadata: ImageMetadata) -> Self {
        self.metadata.insert(digest.to_string(), metadata);
        self
    }

    /// Number of `tags` calls served.
    #[must_use]
    pub fn tags_calls(&self) -> usize {
        self.tags_calls.load(Ordering::SeqCst)
    }

    /// Number of `manifest_v1` calls served.
    #[must_use]
    pub fn manifest_v1_calls(&self) -> usize {
        self.manifest_v1_calls.load(Ordering::SeqCst)
    }

    /// Number of `manifest_v2` calls served.
    #[must_use]
    pub fn manifest_v2_calls(&self) -> usize {
        self.manifest_v2_calls.load(Ordering::SeqCst)
    }

    /// Number of `tag_metadata` calls served.
    #[must_use]
    pub fn metadata_calls(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }

    fn not_found(repository: &str, reference: &str) -> RegistryError {
        RegistryError::NotFound {
            repository: repository.to_string(),
            reference: reference.to_string(),
        }
    }
}

#[async_trait]
impl RegistryClient for MemoryRegistryClient {
    async fn tags(&self, repository: &str) -> Result<Vec<String>> {
        self.tags_calls.fetch_add(1, Ordering::SeqCst);
        self.tags
            .get(repository)
            .cloned()
            .ok_or_else(|| Self::not_found(repository, "tags/list"))
    }

    async fn manifest_v1(&self, repository: &str, tag: &str) -> Result<ManifestV1> {
        self.manifest_v1_calls.fetch_add(1, Ordering::SeqCst);
        self.manifests_v1
            .get(&(repository.to_string(), tag.to_string()))
            .or(self.default_v1.as_ref())
            .cloned()
            .ok_or_else(|| Self::not_found(repository, tag))
    }

    async fn manifest_v2(&self, repository: &str, tag: &str) -> Result<ManifestV2> {
        self.manifest_v2_calls.fetch_add(1, Ordering::SeqCst);
        self.manifests_v2
            .get(&(repository.to_string(), tag.to_string()))
            .or(self.default_v2.as_ref())
            .cloned()
            .ok_or_else(|| Self::not_found(repository, tag))
    }

    async fn tag_metadata(
        &self,
        _repository: &str,
        manifest: &ManifestV2,
    ) -> Result<Option<ImageMetadata>> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        Ok(manifest
            .digest
            .as_ref()
            .and_then(|digest| self.metadata.get(digest))
            .cloned())
    }
}
