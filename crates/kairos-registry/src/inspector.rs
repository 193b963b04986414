//! Creation time extraction from registry manifests.
//!
//! The schema2 manifest is tried first; a client may be able to derive a
//! creation time from it through [`RegistryClient::tag_metadata`]. When that
//! yields nothing, the schema1 manifest is fetched and the `created` field of
//! its most recent history entry is parsed.
//!
//! Every failure along the way (fetch errors, empty history, malformed
//! embedded JSON, missing or unparseable timestamps) means the tag has no
//! usable creation time. Registries routinely hold such tags, so one of them
//! must never abort resolution of the others.

use chrono::{DateTime, Utc};
use kairos_core::TagInfo;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::client::RegistryClient;
use crate::error::RegistryError;
use crate::schema::ManifestV1;

/// Reasons a creation time could not be recovered.
#[derive(Debug, Error)]
pub(crate) enum ExtractionError {
    #[error("schema1 manifest unavailable: {0}")]
    Fetch(#[from] RegistryError),

    #[error("manifest has no history")]
    EmptyHistory,

    #[error("history entry is not a JSON object: {0}")]
    MalformedHistory(#[source] serde_json::Error),

    #[error("history entry has no 'created' field")]
    MissingCreated,

    #[error("'created' field is not a string")]
    CreatedNotString,

    #[error("invalid creation time '{value}': {source}")]
    InvalidTimestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Recovers tag creation times from registry manifests.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestInspector;

impl ManifestInspector {
    /// Creates a new inspector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Returns the tag's metadata, or `None` if no creation time could be
    /// determined. Failures are logged at debug level and never propagated.
    pub async fn extract_creation_time(
        &self,
        client: &dyn RegistryClient,
        repository: &str,
        tag: &str,
    ) -> Option<TagInfo> {
        match Self::inspect(client, repository, tag).await {
            Ok(info) => Some(info),
            Err(err) => {
                tracing::debug!(repository, tag, error = %err, "No usable creation time");
                None
            }
        }
    }

    async fn inspect(
        client: &dyn RegistryClient,
        repository: &str,
        tag: &str,
    ) -> Result<TagInfo, ExtractionError> {
        let mut digest = None;

        match client.manifest_v2(repository, tag).await {
            Ok(manifest) => {
                digest.clone_from(&manifest.digest);
                match client.tag_metadata(repository, &manifest).await {
                    Ok(metadata) => {
                        if let Some(created) = metadata.and_then(|m| m.created) {
                            return Ok(Self::tag_info(tag, created, digest));
                        }
                    }
                    Err(err) => {
                        tracing::trace!(repository, tag, error = %err, "schema2 metadata unavailable");
                    }
                }
            }
            Err(err) => {
                tracing::trace!(repository, tag, error = %err, "schema2 manifest unavailable");
            }
        }

        let manifest = client.manifest_v1(repository, tag).await?;
        let created = created_from_history(&manifest)?;
        Ok(Self::tag_info(tag, created, digest))
    }

    fn tag_info(tag: &str, created: DateTime<Utc>, digest: Option<String>) -> TagInfo {
        let info = TagInfo::new(tag, created);
        match digest {
            Some(digest) => info.with_digest(digest),
            None => info,
        }
    }
}

/// Parses the creation time from the most recent schema1 history entry.
pub(crate) fn created_from_history(
    manifest: &ManifestV1,
) -> Result<DateTime<Utc>, ExtractionError> {
    let entry = manifest.history.first().ok_or(ExtractionError::EmptyHistory)?;

    let blob: Map<String, Value> = serde_json::from_str(&entry.v1_compatibility)
        .map_err(ExtractionError::MalformedHistory)?;

    let created = match blob.get("created") {
        None => return Err(ExtractionError::MissingCreated),
        Some(Value::String(created)) => created,
        Some(_) => return Err(ExtractionError::CreatedNotString),
    };

    DateTime::parse_from_rfc3339(created)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|source| ExtractionError::InvalidTimestamp {
            value: created.clone(),
            source,
        })
}
