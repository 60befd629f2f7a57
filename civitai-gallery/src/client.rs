//! HTTP client configuration and transport abstraction.
//!
//! Every outbound request goes through a [`Transport`]. The production
//! implementation wraps a blocking `reqwest` client configured from an explicit
//! [`ClientConfig`]; tests substitute a scripted transport.

use std::fmt;
use std::io::{self, Read};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::CONTENT_DISPOSITION;

use crate::error::{FetchError, FetchResult};

/// Registry used when no base URL is configured.
pub const DEFAULT_REGISTRY_URL: &str = "https://civitai.com";

/// Environment variable holding the registry bearer token.
pub const DEFAULT_TOKEN_ENV: &str = "CIVITAI_API_KEY";

/// Default timeout for metadata requests and for connecting.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

const USER_AGENT: &str = concat!("civitai-gallery/", env!("CARGO_PKG_VERSION"));

/// Explicit client configuration shared by all components.
#[derive(Clone)]
pub struct ClientConfig {
    /// Registry base URL without a trailing slash.
    pub base_url: String,

    /// Bearer token attached to every request, if any.
    pub token: Option<String>,

    /// Timeout for metadata requests and for establishing connections.
    pub timeout: Duration,

    /// Overall limit for a single file download. `None` means no limit
    /// beyond the connect timeout.
    pub download_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_REGISTRY_URL.to_string(),
            token: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            download_timeout: None,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("download_timeout", &self.download_timeout)
            .finish()
    }
}

impl ClientConfig {
    /// Create a configuration for the given registry.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ..Default::default()
        }
    }

    /// Create the default configuration, reading the token from `token_env`.
    ///
    /// An unset or empty variable leaves the client unauthenticated.
    pub fn from_env(token_env: &str) -> Self {
        let token = std::env::var(token_env).ok().filter(|t| !t.trim().is_empty());
        Self {
            token,
            ..Default::default()
        }
    }

    /// Set the bearer token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the metadata/connect timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the overall download timeout.
    pub fn with_download_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.download_timeout = timeout;
        self
    }

    /// Metadata endpoint for a model version.
    pub fn model_version_url(&self, version_id: &str) -> String {
        format!("{}/api/v1/model-versions/{}", self.base_url, version_id)
    }

    /// Metadata endpoint for a model version looked up by file hash.
    pub fn model_version_by_hash_url(&self, sha256: &str) -> String {
        format!("{}/api/v1/model-versions/by-hash/{}", self.base_url, sha256)
    }
}

/// Which timeout policy a request falls under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Small JSON request to the registry API.
    Metadata,
    /// Streamed file download.
    Download,
}

/// A response whose body has not been read yet.
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Value of the `Content-Length` header, when present.
    pub content_length: Option<u64>,
    /// Raw value of the `Content-Disposition` header, when present.
    pub content_disposition: Option<String>,
    body: Box<dyn Read + Send>,
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .field("content_disposition", &self.content_disposition)
            .finish_non_exhaustive()
    }
}

impl HttpResponse {
    /// Create a response with the given status and body reader.
    pub fn new(status: u16, body: Box<dyn Read + Send>) -> Self {
        Self {
            status,
            content_length: None,
            content_disposition: None,
            body,
        }
    }

    /// Set the declared content length.
    pub fn with_content_length(mut self, length: Option<u64>) -> Self {
        self.content_length = length;
        self
    }

    /// Set the `Content-Disposition` header value.
    pub fn with_content_disposition(mut self, value: Option<String>) -> Self {
        self.content_disposition = value;
        self
    }

    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Read the whole body into memory.
    pub fn read_body(mut self, url: &str) -> FetchResult<Vec<u8>> {
        let mut buf = Vec::new();
        self.body
            .read_to_end(&mut buf)
            .map_err(|e| FetchError::Transport {
                url: url.to_string(),
                reason: format!("failed to read response: {}", e),
            })?;
        Ok(buf)
    }
}

impl Read for HttpResponse {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.body.read(buf)
    }
}

/// Outbound HTTP GET abstraction.
///
/// Implementations attach authentication and apply timeouts. Non-2xx answers
/// are returned as responses, not errors, so callers can map the status to
/// their own error variant.
pub trait Transport: Send + Sync {
    /// Perform a GET request with the given query parameters.
    fn get(&self, url: &str, query: &[(&str, &str)], kind: RequestKind)
        -> FetchResult<HttpResponse>;
}

/// Real transport backed by a blocking `reqwest` client.
pub struct ReqwestTransport {
    client: Client,
    token: Option<String>,
    timeout: Duration,
    download_timeout: Option<Duration>,
}

impl ReqwestTransport {
    /// Build a transport from the client configuration.
    pub fn new(config: &ClientConfig) -> FetchResult<Self> {
        // Client-wide timeout is the download limit; metadata requests narrow it per request.
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(config.timeout)
            .timeout(config.download_timeout)
            .build()
            .map_err(|e| FetchError::Transport {
                url: config.base_url.clone(),
                reason: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            token: config.token.clone(),
            timeout: config.timeout,
            download_timeout: config.download_timeout,
        })
    }

    fn timeout_secs(&self, kind: RequestKind) -> u64 {
        match kind {
            RequestKind::Metadata => self.timeout.as_secs(),
            RequestKind::Download => self.download_timeout.unwrap_or(self.timeout).as_secs(),
        }
    }
}

impl Transport for ReqwestTransport {
    fn get(
        &self,
        url: &str,
        query: &[(&str, &str)],
        kind: RequestKind,
    ) -> FetchResult<HttpResponse> {
        let mut request = self.client.get(url).query(query);
        if kind == RequestKind::Metadata {
            request = request.timeout(self.timeout);
        }
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                    timeout_secs: self.timeout_secs(kind),
                }
            } else {
                FetchError::Transport {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status().as_u16();
        let content_length = response.content_length();
        let content_disposition = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(HttpResponse::new(status, Box::new(response))
            .with_content_length(content_length)
            .with_content_disposition(content_disposition))
    }
}
