//! Docker Registry HTTP API v2 client.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, ACCEPT, LINK, WWW_AUTHENTICATE};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use url::Url;

use crate::client::RegistryClient;
use crate::credentials::Credentials;
use crate::endpoint::RegistryEndpoint;
use crate::error::{RegistryError, Result};
use crate::schema::{ImageConfig, ImageMetadata, ManifestV1, ManifestV2, MediaType, TagListResponse};

/// Registry client speaking the Docker Registry HTTP API v2.
///
/// Requests carry basic auth when credentials are set. A `401` with a
/// `Bearer` challenge triggers one token request against the challenge
/// realm; the token is then reused for the repository.
#[derive(Debug)]
pub struct HttpRegistryClient {
    base_url: String,
    http: reqwest::Client,
    credentials: Option<Credentials>,
    tokens: Mutex<HashMap<String, String>>,
}

impl HttpRegistryClient {
    /// Request timeout used by [`new`](Self::new).
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Creates a client for the registry at `api_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the HTTP client cannot be
    /// created.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use kairos_registry::HttpRegistryClient;
    ///
    /// let client = HttpRegistryClient::new("https://ghcr.io")?;
    /// # Ok::<(), kairos_registry::RegistryError>(())
    /// ```
    pub fn new(api_url: &str) -> Result<Self> {
        Self::with_options(api_url, false, Self::DEFAULT_TIMEOUT)
    }

    /// Creates a client with explicit TLS verification and timeout settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the HTTP client cannot be
    /// created.
    pub fn with_options(api_url: &str, insecure: bool, timeout: Duration) -> Result<Self> {
        let parsed = Url::parse(api_url).map_err(|_| RegistryError::InvalidUrl {
            url: api_url.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(RegistryError::InvalidUrl {
                url: api_url.to_string(),
            });
        }

        let mut builder = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(format!("kairos-registry/{}", env!("CARGO_PKG_VERSION")));
        if insecure {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http = builder.build().map_err(|e| RegistryError::ConnectionFailed {
            url: api_url.to_string(),
            source: e,
        })?;

        Ok(Self {
            base_url: api_url.trim_end_matches('/').to_string(),
            http,
            credentials: None,
            tokens: Mutex::new(HashMap::new()),
        })
    }

    /// Creates a client for an endpoint, using its resolved credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint's URL is invalid.
    pub fn for_endpoint(endpoint: &RegistryEndpoint) -> Result<Self> {
        Ok(
            Self::with_options(&endpoint.api_url, endpoint.insecure, Self::DEFAULT_TIMEOUT)?
                .with_credentials(endpoint.credentials()),
        )
    }

    /// Sets the credentials used for basic auth and token requests.
    #[must_use]
    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Base URL of the registry API.
    #[must_use]
    pub fn api_url(&self) -> &str {
        &self.base_url
    }

    /// Checks that the registry answers on `/v2/`.
    ///
    /// A `401` counts as reachable: the registry is up but wants a token.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be reached or answers with
    /// another error status.
    pub async fn ping(&self) -> Result<()> {
        let url = self.url("v2/")?;
        let response = self.send(url, "", None).await?;
        let status = response.status();

        if status.is_success() || status == StatusCode::UNAUTHORIZED {
            tracing::debug!(api_url = %self.base_url, %status, "Registry is reachable");
            return Ok(());
        }
        Err(RegistryError::HttpError {
            status: status.as_u16(),
            message: response.text().await.unwrap_or_default(),
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        let raw = format!("{}/{path}", self.base_url);
        Url::parse(&raw).map_err(|_| RegistryError::InvalidUrl { url: raw })
    }

    async fn send(&self, url: Url, repository: &str, accept: Option<&str>) -> Result<Response> {
        let mut request = self.http.get(url);
        if let Some(accept) = accept {
            request = request.header(ACCEPT, accept);
        }

        let token = self.tokens.lock().get(repository).cloned();
        request = match (token, &self.credentials) {
            (Some(token), _) => request.bearer_auth(token),
            (None, Some(creds)) => request.basic_auth(&creds.username, Some(&creds.password)),
            (None, None) => request,
        };

        Ok(request.send().await?)
    }

    /// Sends a GET, answering a `Bearer` challenge once.
    async fn get(&self, url: Url, repository: &str, accept: Option<&str>) -> Result<Response> {
        let response = self.send(url.clone(), repository, accept).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let Some(challenge) = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .and_then(BearerChallenge::parse)
        else {
            return Ok(response);
        };

        let token = self.fetch_token(&challenge, repository).await?;
        self.tokens.lock().insert(repository.to_string(), token);
        self.send(url, repository, accept).await
    }

    async fn fetch_token(&self, challenge: &BearerChallenge, repository: &str) -> Result<String> {
        let mut url = Url::parse(&challenge.realm).map_err(|_| RegistryError::InvalidUrl {
            url: challenge.realm.clone(),
        })?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(service) = &challenge.service {
                query.append_pair("service", service);
            }
            let scope = challenge
                .scope
                .clone()
                .unwrap_or_else(|| format!("repository:{repository}:pull"));
            query.append_pair("scope", &scope);
        }

        tracing::debug!(realm = %challenge.realm, repository, "Requesting registry token");

        let mut request = self.http.get(url);
        if let Some(creds) = &self.credentials {
            request = request.basic_auth(&creds.username, Some(&creds.password));
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            return Err(RegistryError::AuthenticationFailed {
                message: format!(
                    "token request to {} returned {}",
                    challenge.realm,
                    response.status()
                ),
            });
        }

        let body: TokenResponse = response.json().await?;
        body.token
            .or(body.access_token)
            .ok_or_else(|| RegistryError::AuthenticationFailed {
                message: format!("no token in response from {}", challenge.realm),
            })
    }

    async fn fetch_manifest(
        &self,
        repository: &str,
        tag: &str,
        accept: &str,
    ) -> Result<(Vec<u8>, String)> {
        let url = self.url(&format!("v2/{repository}/manifests/{tag}"))?;
        let response = self.get(url, repository, Some(accept)).await?;
        let response = check_status(response, repository, tag).await?;

        let header_digest = response
            .headers()
            .get("docker-content-digest")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?;
        let digest = header_digest.unwrap_or_else(|| compute_digest(&body));

        Ok((body.to_vec(), digest))
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn tags(&self, repository: &str) -> Result<Vec<String>> {
        let mut url = self.url(&format!("v2/{repository}/tags/list"))?;
        let mut tags = Vec::new();
        let mut visited = HashSet::new();

        loop {
            visited.insert(url.clone());
            let response = self.get(url.clone(), repository, None).await?;
            let response = check_status(response, repository, "tags/list").await?;

            let next = next_link(response.headers())
                .map(|link| url.join(&link))
                .transpose()
                .map_err(|_| RegistryError::InvalidUrl { url: url.to_string() })?;

            let page: TagListResponse = response.json().await?;
            tags.extend(page.tags);

            match next {
                Some(next) if !visited.contains(&next) => url = next,
                Some(next) => {
                    tracing::warn!(repository, url = %next, "Tag list pagination loops, stopping");
                    break;
                }
                None => break,
            }
        }

        Ok(tags)
    }

    async fn manifest_v1(&self, repository: &str, tag: &str) -> Result<ManifestV1> {
        let (body, _) = self
            .fetch_manifest(repository, tag, &MediaType::schema1_accept())
            .await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn manifest_v2(&self, repository: &str, tag: &str) -> Result<ManifestV2> {
        let (body, digest) = self
            .fetch_manifest(repository, tag, &MediaType::schema2_accept())
            .await?;
        let mut manifest: ManifestV2 = serde_json::from_slice(&body)?;
        manifest.digest = Some(digest);
        Ok(manifest)
    }

    async fn tag_metadata(
        &self,
        repository: &str,
        manifest: &ManifestV2,
    ) -> Result<Option<ImageMetadata>> {
        let Some(config) = &manifest.config else {
            return Ok(None);
        };

        let url = self.url(&format!("v2/{repository}/blobs/{}", config.digest))?;
        let response = self.get(url, repository, None).await?;
        let response = check_status(response, repository, &config.digest).await?;
        let blob: ImageConfig = response.json().await?;

        let created = blob
            .created
            .as_deref()
            .and_then(|c| DateTime::parse_from_rfc3339(c).ok())
            .map(|ts| ts.with_timezone(&Utc));

        Ok(Some(ImageMetadata { created }))
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

/// Parameters of a `WWW-Authenticate: Bearer ...` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
struct BearerChallenge {
    realm: String,
    service: Option<String>,
    scope: Option<String>,
}

impl BearerChallenge {
    fn parse(header: &str) -> Option<Self> {
        let mut rest = header.trim().strip_prefix("Bearer ")?;
        let mut realm = None;
        let mut service = None;
        let mut scope = None;

        loop {
            rest = rest.trim_start_matches([' ', ',']);
            if rest.is_empty() {
                break;
            }

            let (key, after) = rest.split_once('=')?;
            let (value, tail) = if let Some(quoted) = after.strip_prefix('"') {
                quoted.split_once('"')?
            } else {
                after.split_at(after.find([',', ' ']).unwrap_or(after.len()))
            };
            let value = value.to_string();
            rest = tail;

            match key.trim() {
                "realm" => realm = Some(value),
                "service" => service = Some(value),
                "scope" => scope = Some(value),
                _ => {}
            }
        }

        Some(Self {
            realm: realm?,
            service,
            scope,
        })
    }
}

/// Maps error statuses to [`RegistryError`].
async fn check_status(response: Response, repository: &str, reference: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::NOT_FOUND => Err(RegistryError::NotFound {
            repository: repository.to_string(),
            reference: reference.to_string(),
        }),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(RegistryError::AuthenticationFailed {
                message: format!("{status} for {repository}:{reference}"),
            })
        }
        _ => Err(RegistryError::HttpError {
            status: status.as_u16(),
            message: response.text().await.unwrap_or_default(),
        }),
    }
}

/// Target of the `rel="next"` entry of a `Link` header.
fn next_link(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .find_map(|link| {
            let (target, params) = link.split_once(';')?;
            let is_next = params
                .split(';')
                .map(str::trim)
                .any(|p| p == "rel=\"next\"" || p == "rel=next");
            is_next.then(|| {
                target
                    .trim()
                    .trim_start_matches('<')
                    .trim_end_matches('>')
                    .to_string()
            })
        })
}

/// Computes the SHA-256 digest of data.
fn compute_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::fixtures::TableCredentials;
    use reqwest::header::HeaderValue;
    use std::sync::Arc;

    #[test]
    fn test_client_creation() {
        let client = HttpRegistryClient::new("https://ghcr.io/").unwrap();
        assert_eq!(client.api_url(), "https://ghcr.io");
        assert_eq!(
            client.url("v2/foo/bar/tags/list").unwrap().as_str(),
            "https://ghcr.io/v2/foo/bar/tags/list"
        );
    }

    #[test]
    fn test_client_rejects_invalid_url() {
        for url in ["not a url", "ftp://ghcr.io"] {
            assert!(matches!(
                HttpRegistryClient::new(url),
                Err(RegistryError::InvalidUrl { .. })
            ));
        }
    }

    #[test]
    fn test_for_endpoint_takes_credentials() {
        let table = Arc::new(TableCredentials::default());
        table.set("REGISTRY_CREDS", "robot:token");
        let endpoint = RegistryEndpoint::new("registry.local", "http://registry.local:5000")
            .with_insecure(true)
            .with_credentials(
                Some(crate::CredentialDescriptor::env("REGISTRY_CREDS")),
                Duration::ZERO,
            )
            .with_credential_resolvers(table.resolvers());
        endpoint.set_endpoint_credentials(None).unwrap();

        let client = HttpRegistryClient::for_endpoint(&endpoint).unwrap();
        assert_eq!(client.api_url(), "http://registry.local:5000");
        assert_eq!(client.credentials.unwrap().username, "robot");
    }

    #[test]
    fn test_compute_digest() {
        let digest = compute_digest(b"test data");
        assert!(digest.starts_with("sha256:"));
        assert_eq!(digest.len(), 7 + 64);
        assert_eq!(
            compute_digest(b""),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_bearer_challenge_full() {
        let header = r#"Bearer realm="https://auth.docker.io/token",service="registry.docker.io",scope="repository:library/nginx:pull""#;
        let challenge = BearerChallenge::parse(header).unwrap();
        assert_eq!(challenge.realm, "https://auth.docker.io/token");
        assert_eq!(challenge.service.as_deref(), Some("registry.docker.io"));
        assert_eq!(
            challenge.scope.as_deref(),
            Some("repository:library/nginx:pull")
        );
    }

    #[test]
    fn test_bearer_challenge_realm_only() {
        let challenge = BearerChallenge::parse(r#"Bearer realm="https://ghcr.io/token""#).unwrap();
        assert_eq!(challenge.realm, "https://ghcr.io/token");
        assert!(challenge.service.is_none());
        assert!(challenge.scope.is_none());
    }

    #[test]
    fn test_bearer_challenge_rejects_other_schemes() {
        assert!(BearerChallenge::parse(r#"Basic realm="Registry""#).is_none());
        assert!(BearerChallenge::parse(r#"Bearer service="x""#).is_none());
    }

    #[test]
    fn test_next_link() {
        let mut headers = HeaderMap::new();
        assert!(next_link(&headers).is_none());

        headers.insert(
            LINK,
            HeaderValue::from_static(r#"</v2/foo/bar/tags/list?last=1.2.0&n=2>; rel="next""#),
        );
        assert_eq!(
            next_link(&headers).as_deref(),
            Some("/v2/foo/bar/tags/list?last=1.2.0&n=2")
        );

        headers.insert(LINK, HeaderValue::from_static(r#"</v2/foo/bar/tags/list>; rel="prev""#));
        assert!(next_link(&headers).is_none());
    }

    #[test]
    fn test_next_link_resolves_against_base() {
        let base = Url::parse("https://ghcr.io/v2/foo/bar/tags/list").unwrap();
        let next = base.join("/v2/foo/bar/tags/list?last=1.2.0").unwrap();
        assert_eq!(next.as_str(), "https://ghcr.io/v2/foo/bar/tags/list?last=1.2.0");
    }
}
