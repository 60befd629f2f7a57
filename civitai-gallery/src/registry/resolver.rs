//! Memoizing metadata resolver.
//!
//! Version metadata is immutable on the registry, so once fetched it is kept
//! for the lifetime of the resolver in a bounded LRU cache backed by
//! `moka::sync::Cache`. Concurrent first lookups of the same id are coalesced
//! by moka into a single request.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use moka::sync::Cache;
use tracing::debug;

use super::types::{VersionId, VersionMetadata};
use crate::client::{ClientConfig, RequestKind, Transport};
use crate::error::{FetchError, FetchResult};

/// Default number of metadata entries kept in memory.
pub const DEFAULT_METADATA_CAPACITY: u64 = 1024;

/// Fetches and memoizes version metadata from the registry.
pub struct MetadataResolver {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
    cache: Cache<VersionId, Arc<VersionMetadata>>,
    /// Number of requests actually sent to the registry.
    fetches: AtomicU64,
}

impl MetadataResolver {
    /// Create a resolver with the default cache capacity.
    pub fn new(transport: Arc<dyn Transport>, config: ClientConfig) -> Self {
        Self::with_capacity(transport, config, DEFAULT_METADATA_CAPACITY)
    }

    /// Create a resolver holding at most `capacity` metadata entries.
    pub fn with_capacity(
        transport: Arc<dyn Transport>,
        config: ClientConfig,
        capacity: u64,
    ) -> Self {
        Self {
            transport,
            config,
            cache: Cache::new(capacity.max(1)),
            fetches: AtomicU64::new(0),
        }
    }

    /// Resolve metadata for a version, hitting the network at most once per id
    /// while the entry stays cached.
    pub fn resolve(&self, version_id: &VersionId) -> FetchResult<Arc<VersionMetadata>> {
        if let Some(meta) = self.cache.get(version_id) {
            debug!(version_id = %version_id, "metadata cache hit");
            return Ok(meta);
        }

        self.cache
            .try_get_with(version_id.clone(), || {
                let url = self.config.model_version_url(version_id.as_str());
                self.fetch(&url, version_id.as_str()).map(Arc::new)
            })
            .map_err(|e| (*e).clone())
    }

    /// Resolve metadata by the SHA-256 of a published file.
    ///
    /// Results are not memoized under a version id.
    pub fn resolve_by_hash(&self, sha256: &str) -> FetchResult<VersionMetadata> {
        let url = self.config.model_version_by_hash_url(sha256);
        self.fetch(&url, sha256)
    }

    /// Number of metadata requests sent so far.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    /// Whether metadata for `version_id` is currently cached.
    pub fn is_cached(&self, version_id: &VersionId) -> bool {
        self.cache.contains_key(version_id)
    }

    /// Drop all cached metadata.
    pub fn clear(&self) {
        self.cache.invalidate_all();
    }

    fn fetch(&self, url: &str, key: &str) -> FetchResult<VersionMetadata> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        debug!(url = %url, "fetching model version metadata");

        let response = self.transport.get(url, &[], RequestKind::Metadata)?;
        if !response.is_success() {
            return Err(FetchError::NotFound {
                version_id: key.to_string(),
                status: response.status,
            });
        }

        let body = response.read_body(url)?;
        serde_json::from_slice(&body).map_err(|e| FetchError::MalformedMetadata {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}
