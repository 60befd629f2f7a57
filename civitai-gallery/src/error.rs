//! Error types for registry lookups, downloads and the artifact cache.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Result type for fetch and cache operations.
pub type FetchResult<T> = Result<T, FetchError>;

/// Errors that can occur while resolving, downloading or caching artifacts.
///
/// The type is `Clone` so that callers waiting on a coalesced download receive
/// the same error the downloading caller saw. I/O errors are shared through an
/// `Arc` for that reason.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The network request could not be completed.
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    /// The request exceeded the configured timeout.
    #[error("request to {url} timed out after {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },

    /// The download endpoint answered with a non-2xx status.
    #[error("HTTP {status} from {url}")]
    Http { url: String, status: u16 },

    /// The registry has no metadata for the requested version.
    #[error("model version {version_id} not found (HTTP {status})")]
    NotFound { version_id: String, status: u16 },

    /// The registry answered with something that is not version metadata.
    #[error("malformed metadata from {url}: {reason}")]
    MalformedMetadata { url: String, reason: String },

    /// The registry declares a different model type than the one requested.
    #[error("model {version_id} is a {actual} model, not a {expected} model")]
    TypeMismatch {
        version_id: String,
        expected: String,
        actual: String,
    },

    /// The target filename is unsafe or would escape the target directory.
    #[error("invalid filename {filename:?}: {reason}")]
    InvalidFilename { filename: String, reason: String },

    /// The response carried no usable filename and none was supplied.
    #[error("no filename in response from {url}")]
    MissingFilename { url: String },

    /// The downloaded content does not match the expected SHA-256 digest.
    #[error("checksum mismatch for {filename}: expected {expected}, got {actual}")]
    Integrity {
        filename: String,
        expected: String,
        actual: String,
    },

    /// The download was cancelled before it completed.
    #[error("download of {url} was cancelled")]
    Cancelled { url: String },

    /// The version id cannot be used as a cache key.
    #[error("invalid model version id {0:?}")]
    InvalidVersionId(String),

    /// The caller performing a shared download went away without a result.
    #[error("in-flight download for {0} was abandoned")]
    Abandoned(String),

    /// Local filesystem failure.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },
}

impl FetchError {
    /// Wrap an I/O error together with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    /// Whether retrying the same request may succeed.
    ///
    /// Network failures and timeouts are retryable by the caller; nothing in
    /// this crate retries automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Timeout { .. } | Self::Abandoned(_)
        )
    }
}
