//! Registry endpoints and the registry of known endpoints.
//!
//! A [`RegistryEndpoint`] ties together everything tag resolution needs for
//! one registry: its API location, its credential store and its tag metadata
//! cache. [`EndpointRegistry`] maps image prefixes (`ghcr.io`, `quay.io`, ...)
//! to endpoints and infers endpoints for prefixes it has never seen.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use kairos_core::{ContainerImage, TagInfo, TagList, VersionConstraint};
use parking_lot::RwLock;

use crate::cache::TagMetadataCache;
use crate::client::RegistryClient;
use crate::config::{RegistryConfiguration, RegistryList};
use crate::credentials::{CredentialDescriptor, CredentialResolvers, CredentialStore, Credentials};
use crate::error::Result;
use crate::resolver::VersionResolver;

/// Prefix of the registry used for images without a registry component.
pub const DEFAULT_PREFIX: &str = "docker.io";

/// A container registry and its per-registry state.
#[derive(Debug)]
pub struct RegistryEndpoint {
    /// Display name.
    pub name: String,

    /// Image prefix served by this registry.
    pub prefix: String,

    /// Base URL of the registry API.
    pub api_url: String,

    /// Whether to probe the registry before use.
    pub ping: bool,

    /// Skip TLS certificate verification.
    pub insecure: bool,

    /// Namespace prefixed to single-component image names.
    pub default_namespace: String,

    /// Maximum concurrent manifest inspections per request.
    pub concurrency: usize,

    /// Tag metadata cache, owned by this endpoint.
    pub cache: TagMetadataCache,

    credentials: CredentialStore,
}

impl RegistryEndpoint {
    /// Creates an endpoint without credentials.
    ///
    /// # Examples
    ///
    /// ```
    /// use kairos_registry::RegistryEndpoint;
    ///
    /// let ep = RegistryEndpoint::new("ghcr.io", "https://ghcr.io")
    ///     .with_name("GitHub Container Registry");
    /// assert_eq!(ep.prefix, "ghcr.io");
    /// assert!(ep.credentials().is_none());
    /// ```
    #[must_use]
    pub fn new(prefix: impl Into<String>, api_url: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            name: prefix.clone(),
            prefix,
            api_url: api_url.into(),
            ping: false,
            insecure: false,
            default_namespace: String::new(),
            concurrency: VersionResolver::DEFAULT_CONCURRENCY,
            cache: TagMetadataCache::new(),
            credentials: CredentialStore::new(None, Duration::ZERO),
        }
    }

    /// Creates an endpoint from a configuration entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry fails validation.
    pub fn from_config(config: &RegistryConfiguration) -> Result<Self> {
        config.validate()?;

        let mut endpoint = Self::new(&config.prefix, &config.api_url)
            .with_ping(config.ping)
            .with_insecure(config.insecure)
            .with_default_namespace(&config.default_namespace)
            .with_credentials(config.credential_descriptor()?, config.credentials_expiry()?);

        if !config.name.is_empty() {
            endpoint.name.clone_from(&config.name);
        }
        if let Some(concurrency) = config.concurrency {
            endpoint = endpoint.with_concurrency(concurrency);
        }
        Ok(endpoint)
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets whether the registry is probed before use.
    #[must_use]
    pub const fn with_ping(mut self, ping: bool) -> Self {
        self.ping = ping;
        self
    }

    /// Sets whether TLS verification is skipped.
    #[must_use]
    pub const fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    /// Sets the default namespace.
    #[must_use]
    pub fn with_default_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.default_namespace = namespace.into();
        self
    }

    /// Sets the inspection concurrency (at least one).
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Sets the credential source and how long resolved credentials are kept.
    #[must_use]
    pub fn with_credentials(mut self, source: Option<CredentialDescriptor>, expire: Duration) -> Self {
        let resolvers = self.credentials.resolvers().clone();
        self.credentials = CredentialStore::new(source, expire).with_resolvers(resolvers);
        self
    }

    /// Replaces the credential resolvers.
    #[must_use]
    pub fn with_credential_resolvers(mut self, resolvers: CredentialResolvers) -> Self {
        let source = self.credentials.descriptor().cloned();
        let expire = self.credentials.expire();
        self.credentials = CredentialStore::new(source, expire).with_resolvers(resolvers);
        self
    }

    /// Repository path of an image within this registry.
    ///
    /// Single-component names get the default namespace, so `nginx` on
    /// Docker Hub becomes `library/nginx`.
    #[must_use]
    pub fn repository_name(&self, image: &ContainerImage) -> String {
        if self.default_namespace.is_empty() || image.name.contains('/') {
            image.name.clone()
        } else {
            format!("{}/{}", self.default_namespace, image.name)
        }
    }

    /// Resolves credentials if they are unresolved or expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read or is malformed; the
    /// previously resolved credentials stay in place.
    pub fn set_endpoint_credentials(&self, source: Option<&CredentialDescriptor>) -> Result<()> {
        self.credentials.refresh(source)
    }

    /// Currently resolved credentials.
    #[must_use]
    pub fn credentials(&self) -> Option<Credentials> {
        self.credentials.credentials()
    }

    /// When credentials were last resolved.
    #[must_use]
    pub fn credentials_updated_at(&self) -> Option<DateTime<Utc>> {
        self.credentials.updated_at()
    }

    /// The endpoint's credential store.
    #[must_use]
    pub const fn credential_store(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Lists the image's tags and resolves them against `constraint`.
    ///
    /// # Errors
    ///
    /// Returns the client's error if the tag listing fails. Failures while
    /// inspecting individual tags only exclude those tags.
    pub async fn get_tags(
        &self,
        image: &ContainerImage,
        client: &dyn RegistryClient,
        constraint: &VersionConstraint,
    ) -> Result<TagList> {
        let repository = self.repository_name(image);
        let raw_tags = client.tags(&repository).await?;

        tracing::debug!(
            endpoint = %self.prefix,
            repository = %repository,
            count = raw_tags.len(),
            "Fetched tag list"
        );

        let tags = VersionResolver::new()
            .with_concurrency(self.concurrency)
            .resolve(raw_tags.as_slice(), constraint, &repository, client, &self.cache)
            .await;
        Ok(tags)
    }

    /// Cached metadata of a tag.
    #[must_use]
    pub fn get_tag(&self, repository: &str, tag: &str) -> Option<TagInfo> {
        self.cache.get_tag(repository, tag)
    }

    /// Empties the tag metadata cache.
    pub fn clear_cache(&self) {
        self.cache.clear_cache();
    }
}

/// Known registry endpoints by prefix.
#[derive(Debug)]
pub struct EndpointRegistry {
    endpoints: RwLock<HashMap<String, Arc<RegistryEndpoint>>>,
    default_prefix: RwLock<String>,
}

impl EndpointRegistry {
    /// Creates a registry with no endpoints and `docker.io` as default prefix.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            endpoints: RwLock::new(HashMap::new()),
            default_prefix: RwLock::new(DEFAULT_PREFIX.to_string()),
        }
    }

    /// Creates a registry holding the well-known public registries.
    #[must_use]
    pub fn with_defaults() -> Self {
        let registry = Self::empty();
        let defaults = [
            RegistryEndpoint::new(DEFAULT_PREFIX, "https://registry-1.docker.io")
                .with_name("Docker Hub")
                .with_default_namespace("library")
                .with_ping(true),
            RegistryEndpoint::new("gcr.io", "https://gcr.io")
                .with_name("Google Container Registry"),
            RegistryEndpoint::new("quay.io", "https://quay.io").with_name("RedHat Quay"),
            RegistryEndpoint::new("ghcr.io", "https://ghcr.io")
                .with_name("GitHub Container Registry"),
        ];
        for endpoint in defaults {
            registry.insert(endpoint, false);
        }
        registry
    }

    /// Returns the endpoint for `prefix`.
    ///
    /// An empty prefix selects the default endpoint. A prefix that is not
    /// known yet gets an endpoint at `https://<prefix>`, which is registered
    /// for later lookups.
    ///
    /// # Examples
    ///
    /// ```
    /// use kairos_registry::EndpointRegistry;
    ///
    /// let registry = EndpointRegistry::with_defaults();
    /// assert_eq!(registry.get("").prefix, "docker.io");
    /// assert_eq!(registry.get("registry.example.com").api_url, "https://registry.example.com");
    /// ```
    #[must_use]
    pub fn get(&self, prefix: &str) -> Arc<RegistryEndpoint> {
        let prefix = if prefix.is_empty() {
            self.default_prefix.read().clone()
        } else {
            prefix.to_string()
        };

        if let Some(endpoint) = self.endpoints.read().get(&prefix) {
            return Arc::clone(endpoint);
        }

        let mut endpoints = self.endpoints.write();
        let endpoint = endpoints.entry(prefix.clone()).or_insert_with(|| {
            tracing::warn!(
                endpoint = %prefix,
                "No configuration for registry, inferring https://{prefix}"
            );
            Arc::new(RegistryEndpoint::new(&prefix, format!("https://{prefix}")))
        });
        Arc::clone(endpoint)
    }

    /// Returns the endpoint for `prefix` without inferring one.
    #[must_use]
    pub fn find(&self, prefix: &str) -> Option<Arc<RegistryEndpoint>> {
        self.endpoints.read().get(prefix).cloned()
    }

    /// The default endpoint.
    #[must_use]
    pub fn default_endpoint(&self) -> Arc<RegistryEndpoint> {
        self.get("")
    }

    /// Registers an endpoint, replacing any endpoint with the same prefix.
    pub fn insert(&self, endpoint: RegistryEndpoint, is_default: bool) -> Arc<RegistryEndpoint> {
        let endpoint = Arc::new(endpoint);
        if is_default {
            *self.default_prefix.write() = endpoint.prefix.clone();
        }
        self.endpoints
            .write()
            .insert(endpoint.prefix.clone(), Arc::clone(&endpoint));
        endpoint
    }

    /// Registers an endpoint from a configuration entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry fails validation.
    pub fn add_from_config(&self, config: &RegistryConfiguration) -> Result<Arc<RegistryEndpoint>> {
        let endpoint = RegistryEndpoint::from_config(config)?;
        tracing::info!(
            endpoint = %endpoint.prefix,
            api_url = %endpoint.api_url,
            default = config.is_default,
            "Adding registry endpoint"
        );
        Ok(self.insert(endpoint, config.is_default))
    }

    /// Registers every endpoint of a configuration document.
    ///
    /// Nothing is registered if any entry is invalid.
    ///
    /// # Errors
    ///
    /// Returns an error if the document does not parse or validate.
    pub fn load(&self, yaml: &str) -> Result<usize> {
        let list = RegistryList::parse(yaml)?;
        self.add_all(&list)
    }

    /// Registers every endpoint of a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load_file(&self, path: impl AsRef<std::path::Path>) -> Result<usize> {
        let list = RegistryList::from_file(path)?;
        self.add_all(&list)
    }

    fn add_all(&self, list: &RegistryList) -> Result<usize> {
        for config in &list.registries {
            self.add_from_config(config)?;
        }
        Ok(list.registries.len())
    }

    /// Registered prefixes, sorted.
    #[must_use]
    pub fn prefixes(&self) -> Vec<String> {
        let mut prefixes: Vec<String> = self.endpoints.read().keys().cloned().collect();
        prefixes.sort_unstable();
        prefixes
    }
}

impl Default for EndpointRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MemoryRegistryClient;
    use crate::credentials::CredentialScheme;
    use kairos_core::SortMode;

    #[test]
    fn test_defaults() {
        let registry = EndpointRegistry::with_defaults();
        assert_eq!(
            registry.prefixes(),
            vec!["docker.io", "gcr.io", "ghcr.io", "quay.io"]
        );

        let hub = registry.get("");
        assert_eq!(hub.prefix, "docker.io");
        assert_eq!(hub.api_url, "https://registry-1.docker.io");
        assert_eq!(hub.default_namespace, "library");
        assert_eq!(hub.concurrency, 5);
    }

    #[test]
    fn test_get_returns_shared_endpoint() {
        let registry = EndpointRegistry::with_defaults();
        let a = registry.get("quay.io");
        let b = registry.get("quay.io");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_infers_unknown_prefix() {
        let registry = EndpointRegistry::with_defaults();
        assert!(registry.find("registry.local:5000").is_none());

        let ep = registry.get("registry.local:5000");
        assert_eq!(ep.api_url, "https://registry.local:5000");
        assert!(Arc::ptr_eq(&ep, &registry.find("registry.local:5000").unwrap()));
    }

    #[test]
    fn test_add_from_config_replaces_and_sets_default() {
        let registry = EndpointRegistry::with_defaults();
        let before = registry.get("ghcr.io");

        let config = RegistryConfiguration {
            name: "Mirror".to_string(),
            api_url: "https://mirror.example.com".to_string(),
            prefix: "ghcr.io".to_string(),
            is_default: true,
            concurrency: Some(2),
            ..RegistryConfiguration::default()
        };
        registry.add_from_config(&config).unwrap();

        let after = registry.get("ghcr.io");
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(after.name, "Mirror");
        assert_eq!(after.api_url, "https://mirror.example.com");
        assert_eq!(after.concurrency, 2);
        assert_eq!(registry.get("").prefix, "ghcr.io");
    }

    #[test]
    fn test_load_rejects_invalid_document() {
        let registry = EndpointRegistry::empty();
        let yaml = "registries:\n- prefix: ok.io\n  api_url: https://ok.io\n- prefix: bad.io\n";
        assert!(registry.load(yaml).is_err());
        assert!(registry.find("ok.io").is_none());
    }

    #[test]
    fn test_repository_name() {
        let hub = RegistryEndpoint::new("docker.io", "https://registry-1.docker.io")
            .with_default_namespace("library");
        let nginx = ContainerImage::from_identifier("nginx:1.25").unwrap();
        let foo = ContainerImage::from_identifier("foo/bar:1.0").unwrap();
        assert_eq!(hub.repository_name(&nginx), "library/nginx");
        assert_eq!(hub.repository_name(&foo), "foo/bar");

        let plain = RegistryEndpoint::new("quay.io", "https://quay.io");
        assert_eq!(plain.repository_name(&nginx), "nginx");
    }

    #[test]
    fn test_with_credentials_keeps_resolvers() {
        let resolvers = CredentialResolvers::empty();
        let ep = RegistryEndpoint::new("x.io", "https://x.io")
            .with_credential_resolvers(resolvers)
            .with_credentials(Some(CredentialDescriptor::env("X")), Duration::from_secs(3));

        assert_eq!(ep.credential_store().expire(), Duration::from_secs(3));
        assert!(!ep.credential_store().resolvers().supports(CredentialScheme::Env));
    }

    #[tokio::test]
    async fn test_get_tags_uses_default_namespace() {
        let client = MemoryRegistryClient::new().with_tags("library/nginx", ["1.25.0", "1.24.0"]);
        let hub = RegistryEndpoint::new("docker.io", "https://registry-1.docker.io")
            .with_default_namespace("library");
        let image = ContainerImage::from_identifier("nginx").unwrap();

        let tags = hub
            .get_tags(&image, &client, &VersionConstraint::new(SortMode::SemVer))
            .await
            .unwrap();
        assert_eq!(tags.names(), vec!["1.24.0", "1.25.0"]);
    }
}
