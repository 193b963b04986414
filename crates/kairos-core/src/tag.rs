//! Tag metadata and ordered tag lists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata recovered from a tag's manifest.
///
/// Values are immutable once cached; callers always receive copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagInfo {
    /// Tag name.
    pub name: String,

    /// Image creation time.
    pub created: DateTime<Utc>,

    /// Manifest digest, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

impl TagInfo {
    /// Creates tag metadata without a digest.
    #[must_use]
    pub fn new(name: impl Into<String>, created: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            created,
            digest: None,
        }
    }

    /// Sets the digest.
    #[must_use]
    pub fn with_digest(mut self, digest: impl Into<String>) -> Self {
        self.digest = Some(digest.into());
        self
    }
}

/// A single entry of a [`TagList`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageTag {
    /// Tag name.
    pub name: String,

    /// Creation time, present when the list was ordered chronologically.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,

    /// Manifest digest, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

impl ImageTag {
    /// Creates an entry carrying only a name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            created: None,
            digest: None,
        }
    }
}

impl From<TagInfo> for ImageTag {
    fn from(info: TagInfo) -> Self {
        Self {
            name: info.name,
            created: Some(info.created),
            digest: info.digest,
        }
    }
}

/// Ordered list of candidate tags, lowest-ranked first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagList {
    tags: Vec<ImageTag>,
}

impl TagList {
    /// Creates an empty list.
    #[must_use]
    pub const fn new() -> Self {
        Self { tags: Vec::new() }
    }

    /// Appends a tag at the end of the list.
    pub fn push(&mut self, tag: impl Into<ImageTag>) {
        self.tags.push(tag.into());
    }

    /// Returns the entries in order.
    #[must_use]
    pub fn tags(&self) -> &[ImageTag] {
        &self.tags
    }

    /// Returns the tag names in order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.tags.iter().map(|t| t.name.as_str()).collect()
    }

    /// Returns the highest-ranked tag.
    #[must_use]
    pub fn latest(&self) -> Option<&ImageTag> {
        self.tags.last()
    }

    /// Returns true if a tag with the given name is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tags.iter().any(|t| t.name == name)
    }

    /// Number of tags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Returns true if the list holds no tags.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl From<&str> for ImageTag {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ImageTag {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl<T: Into<ImageTag>> FromIterator<T> for TagList {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            tags: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl IntoIterator for TagList {
    type Item = ImageTag;
    type IntoIter = std::vec::IntoIter<ImageTag>;

    fn into_iter(self) -> Self::IntoIter {
        self.tags.into_iter()
    }
}

impl<'a> IntoIterator for &'a TagList {
    type Item = &'a ImageTag;
    type IntoIter = std::slice::Iter<'a, ImageTag>;

    fn into_iter(self) -> Self::IntoIter {
        self.tags.iter()
    }
}
