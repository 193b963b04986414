//! Tag resolution: filtering and ordering a registry's raw tag list.
//!
//! Resolution always filters first: tags rejected by the constraint never
//! reach sorting or the network. Ordering then depends on the sort mode:
//!
//! - [`SortMode::Lexical`] sorts names byte-wise.
//! - [`SortMode::SemVer`] drops tags that are not semantic versions (or are
//!   outside the constraint's range) and sorts by precedence.
//! - [`SortMode::Chronological`] needs a creation time per tag, served from
//!   the [`TagMetadataCache`] or recovered by the [`ManifestInspector`].
//!
//! All modes sort ascending; the last entry is the "newest" candidate.

use std::cmp::Ordering;

use futures::StreamExt;
use kairos_core::{parse_version, SortMode, TagInfo, TagList, VersionConstraint};
use semver::Version;

use crate::cache::TagMetadataCache;
use crate::client::RegistryClient;
use crate::inspector::ManifestInspector;

/// Resolves raw tag lists against a [`VersionConstraint`].
#[derive(Debug, Clone, Copy)]
pub struct VersionResolver {
    inspector: ManifestInspector,
    concurrency: usize,
}

impl VersionResolver {
    /// Default number of manifest inspections run at once.
    pub const DEFAULT_CONCURRENCY: usize = 5;

    /// Creates a resolver with the default concurrency.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inspector: ManifestInspector::new(),
            concurrency: Self::DEFAULT_CONCURRENCY,
        }
    }

    /// Sets how many manifest inspections may run at once (at least one).
    #[must_use]
    pub const fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = if concurrency == 0 { 1 } else { concurrency };
        self
    }

    /// Returns the configured concurrency.
    #[must_use]
    pub const fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Filters and orders `raw_tags`.
    ///
    /// An empty result is a valid outcome. Metadata failures for individual
    /// tags in chronological mode drop those tags and are never reported.
    ///
    /// # Examples
    ///
    /// ```
    /// use kairos_core::{SortMode, VersionConstraint};
    /// use kairos_registry::{MemoryRegistryClient, TagMetadataCache, VersionResolver};
    ///
    /// # #[tokio::main]
    /// # async fn main() {
    /// let client = MemoryRegistryClient::new();
    /// let cache = TagMetadataCache::new();
    /// let tags = ["1.10.0", "1.2.0", "latest"];
    ///
    /// let list = VersionResolver::new()
    ///     .resolve(&tags, &VersionConstraint::new(SortMode::SemVer), "foo/bar", &client, &cache)
    ///     .await;
    /// assert_eq!(list.names(), vec!["1.2.0", "1.10.0"]);
    /// # }
    /// ```
    pub async fn resolve(
        &self,
        raw_tags: &[impl AsRef<str> + Sync],
        constraint: &VersionConstraint,
        repository: &str,
        client: &dyn RegistryClient,
        cache: &TagMetadataCache,
    ) -> TagList {
        let candidates: Vec<&str> = raw_tags
            .iter()
            .map(AsRef::as_ref)
            .filter(|tag| constraint.accepts(tag))
            .collect();

        tracing::debug!(
            repository,
            total = raw_tags.len(),
            candidates = candidates.len(),
            sort = %constraint.sort_mode,
            "Resolving tags"
        );

        match constraint.sort_mode {
            SortMode::Lexical => order_by_name(candidates),
            SortMode::SemVer => order_by_version(candidates, constraint),
            SortMode::Chronological => {
                self.order_by_creation(candidates, repository, client, cache)
                    .await
            }
        }
    }

    async fn order_by_creation(
        &self,
        candidates: Vec<&str>,
        repository: &str,
        client: &dyn RegistryClient,
        cache: &TagMetadataCache,
    ) -> TagList {
        let inspector = self.inspector;

        let mut resolved: Vec<TagInfo> = futures::stream::iter(candidates)
            .map(|tag| async move {
                if let Some(info) = cache.get_tag(repository, tag) {
                    return Some(info);
                }
                tracing::debug!(repository, tag, "Tag metadata cache miss");

                // Extraction gate: a tag without a readable creation time is
                // excluded and leaves no cache entry behind.
                let Some(info) = inspector
                    .extract_creation_time(client, repository, tag)
                    .await
                else {
                    return None;
                };

                cache.set_tag(repository, tag, info.clone());
                Some(info)
            })
            .buffer_unordered(self.concurrency)
            .filter_map(std::future::ready)
            .collect()
            .await;

        resolved.sort_by(by_creation);
        resolved.into_iter().collect()
    }
}

impl Default for VersionResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Sorts tag names byte-wise ascending.
pub(crate) fn order_by_name(mut candidates: Vec<&str>) -> TagList {
    candidates.sort_unstable();
    candidates.into_iter().collect()
}

/// Keeps semantic versions within the constraint's range, ascending by
/// precedence. Equal versions (`1.0.0` and `v1.0.0`) are ordered by name.
pub(crate) fn order_by_version(candidates: Vec<&str>, constraint: &VersionConstraint) -> TagList {
    let mut versions: Vec<(Version, &str)> = candidates
        .into_iter()
        .filter_map(|tag| {
            let Some(version) = parse_version(tag) else {
                tracing::trace!(tag, "Not a semantic version, dropping");
                return None;
            };
            constraint.in_range(&version).then_some((version, tag))
        })
        .collect();

    versions.sort_by(|(a, a_tag), (b, b_tag)| precedence(a, b).then_with(|| a_tag.cmp(b_tag)));
    versions.into_iter().map(|(_, tag)| tag).collect()
}

/// Semantic version precedence; build metadata does not participate.
fn precedence(a: &Version, b: &Version) -> Ordering {
    (a.major, a.minor, a.patch)
        .cmp(&(b.major, b.minor, b.patch))
        .then_with(|| a.pre.cmp(&b.pre))
}

fn by_creation(a: &TagInfo, b: &TagInfo) -> Ordering {
    a.created.cmp(&b.created).then_with(|| a.name.cmp(&b.name))
}
