//! # Kairos Registry
//!
//! Finds the current tag of a container image in a registry.
//!
//! Given an image and a [`VersionConstraint`](kairos_core::VersionConstraint),
//! a [`RegistryEndpoint`] lists the repository's tags, filters them and orders
//! them lexically, by semantic version or by image creation time. Creation
//! times are recovered from manifests and cached per endpoint.
//!
//! ## Features
//!
//! - **Endpoints**: Docker Hub, GCR, Quay and GHCR preconfigured; others from
//!   YAML configuration or inferred from the image prefix
//! - **Credentials**: `env:` and `ext:` sources with optional expiry,
//!   pluggable resolvers for other schemes
//! - **Metadata cache**: creation times are fetched once per tag
//! - **Bounded concurrency**: manifest inspection runs in parallel
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kairos_core::{ContainerImage, SortMode, VersionConstraint};
//! use kairos_registry::{EndpointRegistry, HttpRegistryClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let image = ContainerImage::from_identifier("ghcr.io/foo/bar:1.2.0")?;
//!
//!     let registry = EndpointRegistry::with_defaults();
//!     let endpoint = registry.get(image.registry_prefix());
//!     endpoint.set_endpoint_credentials(None)?;
//!
//!     let client = HttpRegistryClient::for_endpoint(&endpoint)?;
//!     let constraint = VersionConstraint::new(SortMode::Chronological);
//!     let tags = endpoint.get_tags(&image, &client, &constraint).await?;
//!
//!     if let Some(newest) = tags.latest() {
//!         println!("{}", newest.name);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    RegistryEndpoint                         │
//! │  ┌─────────────────┐  ┌──────────────┐  ┌────────────────┐  │
//! │  │ CredentialStore │  │ TagMetadata  │  │ VersionResolver│  │
//! │  │  (env/ext/...)  │  │    Cache     │  │ + Inspector    │  │
//! │  └─────────────────┘  └──────────────┘  └────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//!                          │ RegistryClient
//!                          ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │     HttpRegistryClient (Registry API v2) / Memory client    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod cache;
mod client;
mod config;
mod credentials;
mod endpoint;
mod error;
mod http;
mod inspector;
mod resolver;
mod schema;

#[cfg(test)]
mod proptest_tests;

pub use cache::TagMetadataCache;
pub use client::{MemoryRegistryClient, RegistryClient};
pub use config::{parse_duration, RegistryConfiguration, RegistryList};
pub use credentials::{
    CredentialDescriptor, CredentialResolvers, CredentialScheme, CredentialStore, Credentials,
    EnvCredentials, ExtCredentials, ResolveCredential,
};
pub use endpoint::{EndpointRegistry, RegistryEndpoint, DEFAULT_PREFIX};
pub use error::{RegistryError, Result};
pub use http::HttpRegistryClient;
pub use inspector::ManifestInspector;
pub use resolver::VersionResolver;
pub use schema::{
    Descriptor, ImageConfig, ImageMetadata, ManifestV1, ManifestV2, MediaType, TagListResponse,
    V1History,
};
