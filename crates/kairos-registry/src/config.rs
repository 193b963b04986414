//! Registry configuration file.
//!
//! ```yaml
//! registries:
//! - name: GitHub Container Registry
//!   api_url: https://ghcr.io
//!   prefix: ghcr.io
//!   ping: no
//!   credentials: env:GHCR_CREDS
//!   credsexpire: 1h
//!   defaultns: library
//!   default: false
//!   concurrency: 5
//! ```
//!
//! Booleans accept the YAML 1.1 spellings (`yes`, `no`, `on`, `off`) that
//! hand-written registry files commonly use. Durations use the `300ms`,
//! `3s`, `5m`, `1h30m` notation.

use std::path::Path;
use std::time::Duration;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};

use crate::credentials::CredentialDescriptor;
use crate::error::{RegistryError, Result};

/// A parsed registry configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryList {
    /// Configured registries.
    #[serde(default)]
    pub registries: Vec<RegistryConfiguration>,
}

impl RegistryList {
    /// Parses and validates a configuration document.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is malformed or an entry fails validation.
    pub fn parse(yaml: &str) -> Result<Self> {
        let list: Self = serde_yaml::from_str(yaml)?;
        for registry in &list.registries {
            registry.validate()?;
        }
        Ok(list)
    }

    /// Reads and parses a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not parse.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| RegistryError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&yaml)
    }
}

/// Configuration of one registry endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfiguration {
    /// Display name.
    #[serde(default)]
    pub name: String,

    /// Base URL of the registry API.
    #[serde(default)]
    pub api_url: String,

    /// Image prefix served by this registry (e.g. `ghcr.io`).
    #[serde(default)]
    pub prefix: String,

    /// Whether to probe the registry before use.
    #[serde(default, deserialize_with = "yaml11_bool")]
    pub ping: bool,

    /// Skip TLS certificate verification.
    #[serde(default, deserialize_with = "yaml11_bool")]
    pub insecure: bool,

    /// Credential descriptor (`scheme:payload`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<String>,

    /// How long resolved credentials stay valid. Empty means forever.
    #[serde(default, rename = "credsexpire", skip_serializing_if = "Option::is_none")]
    pub creds_expire: Option<String>,

    /// Namespace prefixed to single-component image names.
    #[serde(default, rename = "defaultns")]
    pub default_namespace: String,

    /// Use this registry for images without a registry prefix.
    #[serde(default, rename = "default", deserialize_with = "yaml11_bool")]
    pub is_default: bool,

    /// Maximum concurrent manifest inspections per request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
}

impl RegistryConfiguration {
    /// Checks required fields and parses embedded values.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidConfig`] or [`RegistryError::InvalidUrl`].
    pub fn validate(&self) -> Result<()> {
        if self.prefix.is_empty() {
            return Err(RegistryError::InvalidConfig {
                reason: format!("registry '{}' has no prefix", self.name),
            });
        }
        if self.api_url.is_empty() {
            return Err(RegistryError::InvalidConfig {
                reason: format!("registry '{}' has no api_url", self.prefix),
            });
        }

        let url = url::Url::parse(&self.api_url).map_err(|_| RegistryError::InvalidUrl {
            url: self.api_url.clone(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(RegistryError::InvalidUrl {
                url: self.api_url.clone(),
            });
        }

        if self.concurrency == Some(0) {
            return Err(RegistryError::InvalidConfig {
                reason: format!("registry '{}' has zero concurrency", self.prefix),
            });
        }

        self.credential_descriptor()?;
        self.credentials_expiry()?;
        Ok(())
    }

    /// Parsed credential descriptor, if configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor does not parse.
    pub fn credential_descriptor(&self) -> Result<Option<CredentialDescriptor>> {
        self.credentials
            .as_deref()
            .filter(|c| !c.is_empty())
            .map(CredentialDescriptor::parse)
            .transpose()
    }

    /// Parsed credential expiry; zero if not configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the duration does not parse.
    pub fn credentials_expiry(&self) -> Result<Duration> {
        match self.creds_expire.as_deref() {
            None | Some("") => Ok(Duration::ZERO),
            Some(raw) => parse_duration(raw).ok_or_else(|| RegistryError::InvalidConfig {
                reason: format!("registry '{}' has invalid credsexpire '{raw}'", self.prefix),
            }),
        }
    }
}

/// Parses durations such as `300ms`, `3s`, `1.5h` or `1h30m`.
///
/// Supported units are `ns`, `us` (or `µs`), `ms`, `s`, `m` and `h`. A bare
/// `0` is accepted.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use kairos_registry::parse_duration;
///
/// assert_eq!(parse_duration("3s"), Some(Duration::from_secs(3)));
/// assert_eq!(parse_duration("1h30m"), Some(Duration::from_secs(5400)));
/// assert_eq!(parse_duration("3"), None);
/// ```
#[must_use]
pub fn parse_duration(input: &str) -> Option<Duration> {
    let input = input.trim();
    if input == "0" {
        return Some(Duration::ZERO);
    }
    if input.is_empty() {
        return None;
    }

    let is_numeric = |c: char| c.is_ascii_digit() || c == '.';
    let mut nanos: u64 = 0;
    let mut rest = input;

    while !rest.is_empty() {
        let number_end = rest.find(|c: char| !is_numeric(c)).unwrap_or(rest.len());
        let (whole, fraction) = rest[..number_end]
            .split_once('.')
            .unwrap_or((&rest[..number_end], ""));
        if whole.is_empty() && fraction.is_empty() {
            return None;
        }
        let whole: u64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
        let fraction: f64 = if fraction.is_empty() {
            0.0
        } else {
            format!("0.{fraction}").parse().ok()?
        };
        rest = &rest[number_end..];

        let unit_end = rest.find(is_numeric).unwrap_or(rest.len());
        let scale: u64 = match &rest[..unit_end] {
            "ns" => 1,
            "us" | "µs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60_000_000_000,
            "h" => 3_600_000_000_000,
            _ => return None,
        };
        rest = &rest[unit_end..];

        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let fractional = (fraction * scale as f64).round() as u64;
        nanos = nanos
            .checked_add(whole.checked_mul(scale)?)?
            .checked_add(fractional)?;
    }

    Some(Duration::from_nanos(nanos))
}

/// Parses a YAML 1.1 boolean spelling.
fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "y" | "yes" | "true" | "on" => Some(true),
        "n" | "no" | "false" | "off" => Some(false),
        _ => None,
    }
}

fn yaml11_bool<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    struct BoolVisitor;

    impl Visitor<'_> for BoolVisitor {
        type Value = bool;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a boolean or one of yes/no/on/off")
        }

        fn visit_bool<E>(self, value: bool) -> std::result::Result<bool, E>
        where
            E: de::Error,
        {
            Ok(value)
        }

        fn visit_str<E>(self, value: &str) -> std::result::Result<bool, E>
        where
            E: de::Error,
        {
            parse_bool(value).ok_or_else(|| E::invalid_value(de::Unexpected::Str(value), &self))
        }
    }

    deserializer.deserialize_any(BoolVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::CredentialScheme;

    const GHCR: &str = r"
registries:
- name: GitHub Container Registry
  api_url: https://ghcr.io
  ping: no
  prefix: ghcr.io
  credentials: env:TEST_CREDS
  credsexpire: 3s
";

    #[test]
    fn test_parse_ghcr() {
        let list = RegistryList::parse(GHCR).unwrap();
        assert_eq!(list.registries.len(), 1);

        let ghcr = &list.registries[0];
        assert_eq!(ghcr.name, "GitHub Container Registry");
        assert_eq!(ghcr.api_url, "https://ghcr.io");
        assert_eq!(ghcr.prefix, "ghcr.io");
        assert!(!ghcr.ping);
        assert!(!ghcr.insecure);
        assert!(!ghcr.is_default);
        assert_eq!(ghcr.credentials_expiry().unwrap(), Duration::from_secs(3));

        let desc = ghcr.credential_descriptor().unwrap().unwrap();
        assert_eq!(desc.scheme, CredentialScheme::Env);
        assert_eq!(desc.payload, "TEST_CREDS");
    }

    #[test]
    fn test_parse_all_fields() {
        let yaml = r"
registries:
- name: Internal
  api_url: http://registry.local:5000
  prefix: registry.local:5000
  ping: yes
  insecure: on
  defaultns: team
  default: true
  concurrency: 2
";
        let list = RegistryList::parse(yaml).unwrap();
        let reg = &list.registries[0];
        assert!(reg.ping);
        assert!(reg.insecure);
        assert!(reg.is_default);
        assert_eq!(reg.default_namespace, "team");
        assert_eq!(reg.concurrency, Some(2));
        assert!(reg.credential_descriptor().unwrap().is_none());
        assert_eq!(reg.credentials_expiry().unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_parse_empty_document() {
        let list = RegistryList::parse("registries: []").unwrap();
        assert!(list.registries.is_empty());
    }

    #[test]
    fn test_missing_prefix() {
        let yaml = "registries:\n- name: x\n  api_url: https://x.io\n";
        assert!(matches!(
            RegistryList::parse(yaml),
            Err(RegistryError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_invalid_url() {
        for url in ["not a url", "ftp://x.io"] {
            let yaml = format!("registries:\n- prefix: x.io\n  api_url: {url}\n");
            assert!(matches!(
                RegistryList::parse(&yaml),
                Err(RegistryError::InvalidUrl { .. })
            ));
        }
    }

    #[test]
    fn test_invalid_credentials_and_expiry() {
        let yaml = "registries:\n- prefix: x.io\n  api_url: https://x.io\n  credentials: TEST_CREDS\n";
        assert!(RegistryList::parse(yaml).is_err());

        let yaml = "registries:\n- prefix: x.io\n  api_url: https://x.io\n  credsexpire: soon\n";
        assert!(matches!(
            RegistryList::parse(yaml),
            Err(RegistryError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_invalid_bool() {
        let yaml = "registries:\n- prefix: x.io\n  api_url: https://x.io\n  ping: maybe\n";
        assert!(matches!(
            RegistryList::parse(yaml),
            Err(RegistryError::YamlError { .. })
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registries.conf");
        std::fs::write(&path, GHCR).unwrap();

        let list = RegistryList::from_file(&path).unwrap();
        assert_eq!(list.registries[0].prefix, "ghcr.io");

        assert!(matches!(
            RegistryList::from_file(dir.path().join("missing.conf")),
            Err(RegistryError::IoError { .. })
        ));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("0"), Some(Duration::ZERO));
        assert_eq!(parse_duration("300ms"), Some(Duration::from_millis(300)));
        assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("1.5h"), Some(Duration::from_secs(5400)));
        assert_eq!(parse_duration("2h45m30s"), Some(Duration::from_secs(9930)));
        assert_eq!(parse_duration("10us"), Some(Duration::from_micros(10)));
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("5"), None);
        assert_eq!(parse_duration("5d"), None);
        assert_eq!(parse_duration("-5s"), None);
        assert_eq!(parse_duration("s"), None);
    }

    #[test]
    fn test_parse_bool() {
        for v in ["yes", "Yes", "ON", "true", "y"] {
            assert_eq!(parse_bool(v), Some(true), "{v}");
        }
        for v in ["no", "NO", "off", "false", "n"] {
            assert_eq!(parse_bool(v), Some(false), "{v}");
        }
        assert_eq!(parse_bool("maybe"), None);
    }
}
