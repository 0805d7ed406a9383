use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use secrecy::{ExposeSecret, SecretString};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use thiserror::Error;
use url::Url;

use super::pagination::{fetch_pages, LinkHeaderCursor};
use super::types::{Asset, Release, Repository};

/// REST API version this client was written against.
pub const API_VERSION: &str = "2022-11-28";

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
const API_VERSION_HEADER: HeaderName = HeaderName::from_static("x-github-api-version");

/// Errors from talking to the GitHub API.
///
/// Every variant is fatal for a run: nothing is retried.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Non-success HTTP status. Displays as `Error 404 Not Found (fetch repo)`.
    #[error("Error {status} {reason} ({label})")]
    Status {
        status: u16,
        reason: String,
        label: String,
    },
    /// Network-level error (DNS, connection, TLS, body read, etc.)
    #[error("Request failed ({label}): {source}")]
    Network {
        label: String,
        #[source]
        source: reqwest::Error,
    },
    /// Response body did not have the expected JSON shape
    #[error("Unexpected response body ({label}): {source}")]
    Decode {
        label: String,
        #[source]
        source: serde_json::Error,
    },
    /// Local file error while spooling an asset
    #[error("Failed to store asset '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("API token contains characters that are not valid in an HTTP header")]
    InvalidToken,
    #[error("Invalid API URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl ApiError {
    pub(crate) fn network(label: &str, source: reqwest::Error) -> Self {
        ApiError::Network {
            label: label.to_string(),
            source,
        }
    }

    pub(crate) fn decode(label: &str, source: serde_json::Error) -> Self {
        ApiError::Decode {
            label: label.to_string(),
            source,
        }
    }

    fn io(name: &str, source: std::io::Error) -> Self {
        ApiError::Io {
            name: name.to_string(),
            source,
        }
    }
}

/// Fails with [`ApiError::Status`] unless the response is a 2xx.
pub(crate) fn check_status(response: &reqwest::Response, label: &str) -> Result<(), ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    tracing::error!(status = status.as_u16(), label, url = %response.url(), "API request failed");
    Err(ApiError::Status {
        status: status.as_u16(),
        reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
        label: label.to_string(),
    })
}

/// Returns a copy of `base` with `name` set to `value`.
///
/// The base set is shared by every request of a run and never mutated;
/// calls needing an extra or different header derive their own set here.
pub fn derive_headers(base: &HeaderMap, name: HeaderName, value: HeaderValue) -> HeaderMap {
    let mut headers = base.clone();
    headers.insert(name, value);
    headers
}

/// Builds the headers sent with every API call.
pub fn base_headers(token: &SecretString) -> Result<HeaderMap, ApiError> {
    let mut auth = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
        .map_err(|_| ApiError::InvalidToken)?;
    auth.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
    headers.insert(AUTHORIZATION, auth);
    headers.insert(API_VERSION_HEADER, HeaderValue::from_static(API_VERSION));
    Ok(headers)
}

/// Read-only view of one repository's releases on a GitHub API host.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_root: Url,
    headers: HeaderMap,
}

impl GitHubClient {
    /// Creates a client for `api_url` (e.g. `https://api.github.com`)
    /// authenticating with `token`.
    pub fn new(api_url: &str, token: &SecretString) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(ApiError::Client)?;
        let mut api_root = Url::parse(api_url)?;
        // Url::join replaces the last segment unless the base ends in '/',
        // which matters for GitHub Enterprise roots like /api/v3.
        if !api_root.path().ends_with('/') {
            let path = format!("{}/", api_root.path());
            api_root.set_path(&path);
        }
        Ok(Self {
            http,
            api_root,
            headers: base_headers(token)?,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.api_root.join(path)?)
    }

    /// `GET /repos/{owner}/{repo}`. Not paginated.
    pub async fn repository(&self, repo: &str) -> Result<Repository, ApiError> {
        const LABEL: &str = "fetch repo";
        let url = self.endpoint(&format!("repos/{repo}"))?;
        let response = self
            .http
            .get(url)
            .headers(self.headers.clone())
            .send()
            .await
            .map_err(|source| ApiError::network(LABEL, source))?;
        check_status(&response, LABEL)?;
        let bytes = response
            .bytes()
            .await
            .map_err(|source| ApiError::network(LABEL, source))?;
        serde_json::from_slice(&bytes).map_err(|source| ApiError::decode(LABEL, source))
    }

    /// `GET /repos/{owner}/{repo}/releases`, newest first, at most `limit`.
    pub async fn releases(&self, repo: &str, limit: usize) -> Result<Vec<Release>, ApiError> {
        let url = self.endpoint(&format!("repos/{repo}/releases"))?;
        fetch_pages(
            &self.http,
            url,
            &self.headers,
            "fetch releases",
            Some(limit),
            &LinkHeaderCursor,
        )
        .await
    }

    /// Renders GitHub-flavoured markdown to HTML via `POST /markdown`.
    ///
    /// `repo` is passed as the rendering context so issue references and
    /// mentions link into the repository.
    pub async fn render_markdown(&self, text: &str, repo: &str) -> Result<String, ApiError> {
        const LABEL: &str = "asking for parsed markdown";
        let url = self.endpoint("markdown")?;
        let payload = serde_json::json!({
            "text": text,
            "mode": "gfm",
            "context": repo,
        });
        let body = serde_json::to_vec(&payload).map_err(|source| ApiError::decode(LABEL, source))?;

        let headers = derive_headers(
            &self.headers,
            CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        let response = self
            .http
            .post(url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|source| ApiError::network(LABEL, source))?;
        check_status(&response, LABEL)?;
        response
            .text()
            .await
            .map_err(|source| ApiError::network(LABEL, source))
    }

    /// Streams a release asset into a temporary file.
    ///
    /// Goes through `GET /repos/{owner}/{repo}/releases/assets/{id}` with
    /// `Accept: application/octet-stream` rather than `browser_download_url`,
    /// so the bearer token applies to assets of private repositories.
    ///
    /// The returned file keeps the asset's extension, is flushed and
    /// positioned at its start, and is deleted when dropped.
    pub async fn download_asset(&self, repo: &str, asset: &Asset) -> Result<NamedTempFile, ApiError> {
        let label = format!("downloading asset {}", asset.name);
        let url = self.endpoint(&format!("repos/{repo}/releases/assets/{}", asset.id))?;
        let headers = derive_headers(
            &self.headers,
            ACCEPT,
            HeaderValue::from_static("application/octet-stream"),
        );

        let response = self
            .http
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(|source| ApiError::network(&label, source))?;
        check_status(&response, &label)?;

        let suffix = Path::new(&asset.name)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        let mut file = tempfile::Builder::new()
            .prefix("appcast-asset-")
            .suffix(&suffix)
            .tempfile()
            .map_err(|e| ApiError::io(&asset.name, e))?;

        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|source| ApiError::network(&label, source))?;
            file.write_all(&chunk)
                .map_err(|e| ApiError::io(&asset.name, e))?;
            written += chunk.len() as u64;
        }
        file.flush().map_err(|e| ApiError::io(&asset.name, e))?;
        file.seek(SeekFrom::Start(0))
            .map_err(|e| ApiError::io(&asset.name, e))?;

        if written != asset.size {
            tracing::warn!(
                asset = %asset.name,
                expected = asset.size,
                received = written,
                "Downloaded size differs from the size reported by the API"
            );
        }
        tracing::debug!(asset = %asset.name, bytes = written, path = %file.path().display(), "Asset downloaded");
        Ok(file)
    }
}
