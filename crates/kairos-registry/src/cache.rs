//! In-memory cache of manifest-derived tag metadata.
//!
//! Each [`RegistryEndpoint`](crate::RegistryEndpoint) owns one cache. Entries
//! are keyed by repository and tag name (exact, case-sensitive) and are only
//! ever written after a successful metadata extraction, so a missing entry
//! means "not resolved yet or resolution failed", never a cached negative.
//!
//! There is no eviction: the cache lives as long as its endpoint and is only
//! emptied on request.

use std::collections::HashMap;

use kairos_core::TagInfo;
use parking_lot::RwLock;

type RepositoryTags = HashMap<String, TagInfo>;

/// Thread-safe cache of [`TagInfo`] keyed by repository and tag.
#[derive(Debug, Default)]
pub struct TagMetadataCache {
    entries: RwLock<HashMap<String, RepositoryTags>>,
}

impl TagMetadataCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the cached metadata for a tag.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::Utc;
    /// use kairos_core::TagInfo;
    /// use kairos_registry::TagMetadataCache;
    ///
    /// let cache = TagMetadataCache::new();
    /// assert!(cache.get_tag("foo/bar", "1.2.1").is_none());
    ///
    /// cache.set_tag("foo/bar", "1.2.1", TagInfo::new("1.2.1", Utc::now()));
    /// assert!(cache.get_tag("foo/bar", "1.2.1").is_some());
    /// ```
    #[must_use]
    pub fn get_tag(&self, repository: &str, tag: &str) -> Option<TagInfo> {
        let entries = self.entries.read();
        let info = entries.get(repository)?.get(tag)?.clone();
        tracing::trace!(repository, tag, "Tag metadata cache hit");
        Some(info)
    }

    /// Stores metadata for a tag, replacing any existing entry.
    ///
    /// The stored name always echoes the `tag` key.
    pub fn set_tag(&self, repository: &str, tag: &str, mut info: TagInfo) {
        tag.clone_into(&mut info.name);
        self.entries
            .write()
            .entry(repository.to_string())
            .or_default()
            .insert(tag.to_string(), info);
        tracing::trace!(repository, tag, "Cached tag metadata");
    }

    /// Removes a single entry. Returns true if something was removed.
    pub fn invalidate_tag(&self, repository: &str, tag: &str) -> bool {
        let mut entries = self.entries.write();
        let Some(tags) = entries.get_mut(repository) else {
            return false;
        };
        let removed = tags.remove(tag).is_some();
        if tags.is_empty() {
            entries.remove(repository);
        }
        removed
    }

    /// Removes every entry of a repository. Returns the number removed.
    pub fn invalidate_repository(&self, repository: &str) -> usize {
        self.entries
            .write()
            .remove(repository)
            .map_or(0, |tags| tags.len())
    }

    /// Drops all entries.
    pub fn clear_cache(&self) {
        self.entries.write().clear();
        tracing::debug!("Tag metadata cache cleared");
    }

    /// Returns the cached tag names of a repository, sorted.
    #[must_use]
    pub fn tags(&self, repository: &str) -> Vec<String> {
        let entries = self.entries.read();
        let mut names: Vec<String> = entries
            .get(repository)
            .map(|tags| tags.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Total number of cached tags across repositories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().values().map(HashMap::len).sum()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn info(name: &str, hour: u32) -> TagInfo {
        TagInfo::new(name, Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap())
    }

    #[test]
    fn test_get_missing() {
        let cache = TagMetadataCache::new();
        assert!(cache.get_tag("foo/bar", "1.0.0").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_set_and_get() {
        let cache = TagMetadataCache::new();
        cache.set_tag("foo/bar", "1.0.0", info("1.0.0", 1));

        let cached = cache.get_tag("foo/bar", "1.0.0").unwrap();
        assert_eq!(cached, info("1.0.0", 1));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_keys_are_case_sensitive() {
        let cache = TagMetadataCache::new();
        cache.set_tag("foo/bar", "Latest", info("Latest", 1));

        assert!(cache.get_tag("foo/bar", "latest").is_none());
        assert!(cache.get_tag("Foo/Bar", "Latest").is_none());
        assert!(cache.get_tag("foo/bar", "Latest").is_some());
    }

    #[test]
    fn test_set_overwrites_wholesale() {
        let cache = TagMetadataCache::new();
        cache.set_tag(
            "foo/bar",
            "1.0.0",
            info("1.0.0", 1).with_digest("sha256:old"),
        );
        cache.set_tag("foo/bar", "1.0.0", info("1.0.0", 2));

        let cached = cache.get_tag("foo/bar", "1.0.0").unwrap();
        assert_eq!(cached.created, info("1.0.0", 2).created);
        assert!(cached.digest.is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_set_normalizes_name() {
        let cache = TagMetadataCache::new();
        cache.set_tag("foo/bar", "1.0.0", info("something-else", 1));
        assert_eq!(cache.get_tag("foo/bar", "1.0.0").unwrap().name, "1.0.0");
    }

    #[test]
    fn test_clear_cache_is_idempotent() {
        let cache = TagMetadataCache::new();
        cache.set_tag("foo/bar", "1.0.0", info("1.0.0", 1));
        cache.set_tag("foo/baz", "2.0.0", info("2.0.0", 1));

        cache.clear_cache();
        assert!(cache.get_tag("foo/bar", "1.0.0").is_none());
        assert!(cache.get_tag("foo/baz", "2.0.0").is_none());
        assert!(cache.is_empty());

        cache.clear_cache();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate() {
        let cache = TagMetadataCache::new();
        cache.set_tag("foo/bar", "1.0.0", info("1.0.0", 1));
        cache.set_tag("foo/bar", "1.1.0", info("1.1.0", 2));
        cache.set_tag("foo/baz", "1.0.0", info("1.0.0", 3));

        assert!(cache.invalidate_tag("foo/bar", "1.0.0"));
        assert!(!cache.invalidate_tag("foo/bar", "1.0.0"));
        assert_eq!(cache.tags("foo/bar"), vec!["1.1.0".to_string()]);

        assert_eq!(cache.invalidate_repository("foo/baz"), 1);
        assert_eq!(cache.invalidate_repository("foo/baz"), 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_concurrent_writers() {
        let cache = TagMetadataCache::new();

        std::thread::scope(|s| {
            for worker in 0..8u32 {
                let cache = &cache;
                s.spawn(move || {
                    for i in 0..50u32 {
                        let tag = format!("{worker}.{i}.0");
                        cache.set_tag("foo/bar", &tag, info(&tag, worker));
                        assert!(cache.get_tag("foo/bar", &tag).is_some());
                    }
                });
            }
        });

        assert_eq!(cache.len(), 400);
    }
}
