//! Container image references.
//!
//! A reference has the general shape `[registry/]name[:tag][@digest]`. The
//! registry component is only recognised when it looks like a host: it
//! contains a `.` or a `:`, or it is `localhost`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A parsed container image reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerImage {
    /// Registry prefix (e.g. `ghcr.io`), if the reference carried one.
    pub registry: Option<String>,

    /// Image name within the registry (e.g. `foo/bar`).
    pub name: String,

    /// Tag, if present.
    pub tag: Option<String>,

    /// Content digest, if present.
    pub digest: Option<String>,
}

impl ContainerImage {
    /// Parses an image reference.
    ///
    /// # Examples
    ///
    /// ```
    /// use kairos_core::ContainerImage;
    ///
    /// let image = ContainerImage::from_identifier("ghcr.io/foo/bar:1.2.0").unwrap();
    /// assert_eq!(image.registry.as_deref(), Some("ghcr.io"));
    /// assert_eq!(image.name, "foo/bar");
    /// assert_eq!(image.tag.as_deref(), Some("1.2.0"));
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error if the name, tag or digest component is empty.
    pub fn from_identifier(identifier: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidReference {
            reference: identifier.to_string(),
            reason: reason.to_string(),
        };

        let input = identifier.trim();

        let (rest, digest) = match input.split_once('@') {
            Some((_, "")) => return Err(invalid("empty digest")),
            Some((rest, digest)) => (rest, Some(digest.to_string())),
            None => (input, None),
        };

        // A ':' after the last '/' separates the tag; earlier ones belong to a
        // registry port.
        let name_start = rest.rfind('/').map_or(0, |i| i + 1);
        let (path, tag) = match rest[name_start..].find(':') {
            Some(offset) => {
                let split = name_start + offset;
                let tag = &rest[split + 1..];
                if tag.is_empty() {
                    return Err(invalid("empty tag"));
                }
                (&rest[..split], Some(tag.to_string()))
            }
            None => (rest, None),
        };

        let (registry, name) = match path.split_once('/') {
            Some((first, remainder)) if Self::looks_like_registry(first) => {
                (Some(first.to_string()), remainder)
            }
            _ => (None, path),
        };

        if name.is_empty() || name.ends_with('/') {
            return Err(invalid("empty image name"));
        }

        Ok(Self {
            registry,
            name: name.to_string(),
            tag,
            digest,
        })
    }

    /// Returns the registry prefix, or an empty string for the default registry.
    #[must_use]
    pub fn registry_prefix(&self) -> &str {
        self.registry.as_deref().unwrap_or_default()
    }

    fn looks_like_registry(component: &str) -> bool {
        component.contains('.') || component.contains(':') || component == "localhost"
    }
}

impl fmt::Display for ContainerImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(registry) = &self.registry {
            write!(f, "{registry}/")?;
        }
        write!(f, "{}", self.name)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for ContainerImage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_identifier(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_short_name() {
        let image = ContainerImage::from_identifier("nginx").unwrap();
        assert_eq!(image.registry, None);
        assert_eq!(image.name, "nginx");
        assert_eq!(image.tag, None);
        assert_eq!(image.registry_prefix(), "");
    }

    #[test]
    fn test_parse_namespaced_with_tag() {
        let image = ContainerImage::from_identifier("foo/bar:1.2.0").unwrap();
        assert_eq!(image.registry, None);
        assert_eq!(image.name, "foo/bar");
        assert_eq!(image.tag.as_deref(), Some("1.2.0"));
    }

    #[test]
    fn test_parse_registry_with_port() {
        let image = ContainerImage::from_identifier("localhost:5000/app:v1").unwrap();
        assert_eq!(image.registry.as_deref(), Some("localhost:5000"));
        assert_eq!(image.name, "app");
        assert_eq!(image.tag.as_deref(), Some("v1"));
    }

    #[test]
    fn test_parse_localhost_without_port() {
        let image = ContainerImage::from_identifier("localhost/app").unwrap();
        assert_eq!(image.registry.as_deref(), Some("localhost"));
        assert_eq!(image.name, "app");
    }

    #[test]
    fn test_parse_digest() {
        let image =
            ContainerImage::from_identifier("quay.io/org/app:1.0@sha256:abcdef").unwrap();
        assert_eq!(image.registry.as_deref(), Some("quay.io"));
        assert_eq!(image.name, "org/app");
        assert_eq!(image.tag.as_deref(), Some("1.0"));
        assert_eq!(image.digest.as_deref(), Some("sha256:abcdef"));
    }

    #[test]
    fn test_parse_rejects_empty_tag() {
        assert!(ContainerImage::from_identifier("foo/bar:").is_err());
        assert!(ContainerImage::from_identifier("foo@").is_err());
        assert!(ContainerImage::from_identifier("ghcr.io/").is_err());
    }

    #[test]
    fn test_display_roundtrips_input() {
        for input in ["nginx", "foo/bar:1.2.0", "ghcr.io/a/b:c@sha256:00"] {
            let image: ContainerImage = input.parse().unwrap();
            assert_eq!(image.to_string(), input);
        }
    }
}
