//! Registry credentials: where they come from and how long they are trusted.
//!
//! A [`CredentialDescriptor`] (`scheme:payload`, e.g. `env:REGISTRY_CREDS`)
//! names a credential source. [`CredentialResolvers`] maps each
//! [`CredentialScheme`] to a [`ResolveCredential`] implementation, so new
//! sources are added by registering a resolver.
//!
//! [`CredentialStore`] caches the resolved `username:password` pair of one
//! endpoint. It re-reads the source only before the first successful
//! resolution and, when an expiry is configured, once that expiry has elapsed.
//! Between those points a changed source is deliberately not noticed.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::{RegistryError, Result};

/// Kind of credential source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialScheme {
    /// Environment variable holding `username:password`.
    Env,

    /// Executable printing `username:password` on stdout.
    Ext,

    /// Field of a Kubernetes secret (`namespace/name#field`).
    Secret,

    /// Kubernetes image pull secret (`namespace/name`).
    PullSecret,
}

impl CredentialScheme {
    /// Parses a scheme name.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        match input {
            "env" => Some(Self::Env),
            "ext" => Some(Self::Ext),
            "secret" => Some(Self::Secret),
            "pullsecret" => Some(Self::PullSecret),
            _ => None,
        }
    }

    /// Returns the scheme name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Env => "env",
            Self::Ext => "ext",
            Self::Secret => "secret",
            Self::PullSecret => "pullsecret",
        }
    }
}

impl fmt::Display for CredentialScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reference to a credential source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CredentialDescriptor {
    /// Source kind.
    pub scheme: CredentialScheme,

    /// Scheme-specific location (variable name, script path, secret name).
    pub payload: String,
}

impl CredentialDescriptor {
    /// Creates a descriptor.
    #[must_use]
    pub fn new(scheme: CredentialScheme, payload: impl Into<String>) -> Self {
        Self {
            scheme,
            payload: payload.into(),
        }
    }

    /// Descriptor reading the given environment variable.
    #[must_use]
    pub fn env(variable: impl Into<String>) -> Self {
        Self::new(CredentialScheme::Env, variable)
    }

    /// Parses `scheme:payload`.
    ///
    /// # Examples
    ///
    /// ```
    /// use kairos_registry::{CredentialDescriptor, CredentialScheme};
    ///
    /// let desc = CredentialDescriptor::parse("env:TEST_CREDS").unwrap();
    /// assert_eq!(desc.scheme, CredentialScheme::Env);
    /// assert_eq!(desc.payload, "TEST_CREDS");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error for a missing separator, unknown scheme or empty payload.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let (scheme, payload) =
            input
                .split_once(':')
                .ok_or_else(|| RegistryError::InvalidConfig {
                    reason: format!("credential descriptor '{input}' is not 'scheme:payload'"),
                })?;

        let scheme = CredentialScheme::parse(scheme).ok_or_else(|| {
            RegistryError::UnsupportedCredentialScheme {
                scheme: scheme.to_string(),
            }
        })?;

        if payload.is_empty() {
            return Err(RegistryError::InvalidConfig {
                reason: format!("credential descriptor '{input}' has an empty payload"),
            });
        }

        Ok(Self::new(scheme, payload))
    }
}

impl fmt::Display for CredentialDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scheme, self.payload)
    }
}

impl std::str::FromStr for CredentialDescriptor {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// A resolved username/password pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Username.
    pub username: String,

    /// Password or token.
    pub password: String,
}

impl Credentials {
    /// Splits a raw secret at its first `:`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::CredentialFormat`] if there is no `:`.
    pub fn parse(secret: &str, descriptor: &CredentialDescriptor) -> Result<Self> {
        let (username, password) =
            secret
                .split_once(':')
                .ok_or_else(|| RegistryError::CredentialFormat {
                    descriptor: descriptor.to_string(),
                })?;

        Ok(Self {
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Reads the raw secret a descriptor points to.
pub trait ResolveCredential: Send + Sync {
    /// Returns the raw `username:password` secret.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read.
    fn resolve(&self, descriptor: &CredentialDescriptor) -> Result<String>;
}

/// Reads credentials from an environment variable.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentials;

impl ResolveCredential for EnvCredentials {
    fn resolve(&self, descriptor: &CredentialDescriptor) -> Result<String> {
        std::env::var(&descriptor.payload).map_err(|e| RegistryError::CredentialSource {
            descriptor: descriptor.to_string(),
            message: e.to_string(),
        })
    }
}

/// Runs an executable and reads credentials from its stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtCredentials;

impl ResolveCredential for ExtCredentials {
    fn resolve(&self, descriptor: &CredentialDescriptor) -> Result<String> {
        let source_error = |message: String| RegistryError::CredentialSource {
            descriptor: descriptor.to_string(),
            message,
        };

        let script = Path::new(&descriptor.payload);
        if !script.is_absolute() {
            return Err(source_error("script path must be absolute".to_string()));
        }

        let output = Command::new(script)
            .output()
            .map_err(|e| source_error(e.to_string()))?;

        if !output.status.success() {
            return Err(source_error(format!(
                "script exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8(output.stdout)
            .map_err(|_| source_error("script output is not UTF-8".to_string()))?;
        Ok(stdout.trim_end_matches(['\r', '\n']).to_string())
    }
}

/// Resolvers by scheme.
#[derive(Clone)]
pub struct CredentialResolvers {
    resolvers: HashMap<CredentialScheme, Arc<dyn ResolveCredential>>,
}

impl CredentialResolvers {
    /// Creates an empty set of resolvers.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            resolvers: HashMap::new(),
        }
    }

    /// Registers a resolver, replacing any previous one for the scheme.
    #[must_use]
    pub fn with(mut self, scheme: CredentialScheme, resolver: Arc<dyn ResolveCredential>) -> Self {
        self.resolvers.insert(scheme, resolver);
        self
    }

    /// Returns true if a resolver is registered for the scheme.
    #[must_use]
    pub fn supports(&self, scheme: CredentialScheme) -> bool {
        self.resolvers.contains_key(&scheme)
    }

    /// Reads the raw secret for a descriptor.
    ///
    /// # Errors
    ///
    /// Returns an error if no resolver handles the scheme or the source
    /// cannot be read.
    pub fn resolve(&self, descriptor: &CredentialDescriptor) -> Result<String> {
        let resolver = self.resolvers.get(&descriptor.scheme).ok_or_else(|| {
            RegistryError::UnsupportedCredentialScheme {
                scheme: descriptor.scheme.to_string(),
            }
        })?;
        resolver.resolve(descriptor)
    }
}

/// `env` and `ext` are available by default; Kubernetes schemes need a
/// resolver registered through [`CredentialResolvers::with`].
impl Default for CredentialResolvers {
    fn default() -> Self {
        Self::empty()
            .with(CredentialScheme::Env, Arc::new(EnvCredentials))
            .with(CredentialScheme::Ext, Arc::new(ExtCredentials))
    }
}

impl fmt::Debug for CredentialResolvers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut schemes: Vec<&str> = self.resolvers.keys().map(CredentialScheme::as_str).collect();
        schemes.sort_unstable();
        f.debug_struct("CredentialResolvers")
            .field("schemes", &schemes)
            .finish()
    }
}

#[derive(Debug, Clone)]
struct Resolved {
    credentials: Credentials,
    updated: DateTime<Utc>,
}

/// Per-endpoint credential cache with optional expiry.
#[derive(Debug)]
pub struct CredentialStore {
    descriptor: Option<CredentialDescriptor>,
    expire: Duration,
    resolvers: CredentialResolvers,
    state: Mutex<Option<Resolved>>,
}

impl CredentialStore {
    /// Creates an unresolved store.
    ///
    /// An `expire` of zero means credentials never expire once resolved.
    #[must_use]
    pub fn new(descriptor: Option<CredentialDescriptor>, expire: Duration) -> Self {
        Self {
            descriptor,
            expire,
            resolvers: CredentialResolvers::default(),
            state: Mutex::new(None),
        }
    }

    /// Replaces the resolver set.
    #[must_use]
    pub fn with_resolvers(mut self, resolvers: CredentialResolvers) -> Self {
        self.resolvers = resolvers;
        self
    }

    /// The configured credential source, if any.
    #[must_use]
    pub const fn descriptor(&self) -> Option<&CredentialDescriptor> {
        self.descriptor.as_ref()
    }

    /// The configured expiry.
    #[must_use]
    pub const fn expire(&self) -> Duration {
        self.expire
    }

    /// The resolvers used to read the source.
    #[must_use]
    pub const fn resolvers(&self) -> &CredentialResolvers {
        &self.resolvers
    }

    /// Resolves credentials if they were never resolved or have expired.
    ///
    /// `source` overrides the configured descriptor for this resolution.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read or does not hold a
    /// `username:password` pair. Previously resolved credentials are kept.
    pub fn refresh(&self, source: Option<&CredentialDescriptor>) -> Result<()> {
        self.refresh_at(source, Utc::now())
    }

    /// Same as [`refresh`](Self::refresh), evaluated at the given instant.
    ///
    /// # Errors
    ///
    /// See [`refresh`](Self::refresh).
    pub fn refresh_at(&self, source: Option<&CredentialDescriptor>, now: DateTime<Utc>) -> Result<()> {
        // Held across resolution so concurrent callers resolve at most once.
        let mut state = self.state.lock();

        if !self.is_due(state.as_ref(), now) {
            return Ok(());
        }

        let Some(descriptor) = source.or(self.descriptor.as_ref()) else {
            return Ok(());
        };

        let secret = self.resolvers.resolve(descriptor)?;
        let credentials = Credentials::parse(&secret, descriptor)?;

        tracing::info!(
            source = %descriptor,
            username = %credentials.username,
            "Resolved registry credentials"
        );

        *state = Some(Resolved {
            credentials,
            updated: now,
        });
        Ok(())
    }

    /// Returns a copy of the resolved credentials.
    #[must_use]
    pub fn credentials(&self) -> Option<Credentials> {
        self.state.lock().as_ref().map(|r| r.credentials.clone())
    }

    /// When the credentials were last resolved.
    #[must_use]
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().as_ref().map(|r| r.updated)
    }

    fn is_due(&self, state: Option<&Resolved>, now: DateTime<Utc>) -> bool {
        let Some(resolved) = state else {
            return true;
        };
        if self.expire.is_zero() {
            return false;
        }
        let elapsed = (now - resolved.updated).to_std().unwrap_or(Duration::ZERO);
        elapsed >= self.expire
    }
}
