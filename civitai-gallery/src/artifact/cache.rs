//! Disk-backed artifact cache keyed by version id.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::disk::{find_cached, remove_stale_partials};
use super::inflight::InFlight;
use super::kind::ArtifactKind;
use crate::download::{DownloadOptions, HttpDownloader};
use crate::error::{FetchError, FetchResult};
use crate::registry::{MetadataResolver, VersionId};
use crate::variant::{select_params, VariantPreference};

/// Default age after which a partial download is considered abandoned.
pub const DEFAULT_STALE_PARTIAL_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Resolves version ids of one [`ArtifactKind`] to files under
/// `root/<version_id>/`.
///
/// A completed (non-partial) file in the version directory is a hit and is
/// returned without touching the network. On a miss the metadata is resolved,
/// the declared model type checked against the cache's kind, a file variant
/// selected and the file downloaded. Concurrent misses for the same id share
/// one download; since the kind is fixed per cache, every waiter is owed the
/// same type check the leader performed.
pub struct ArtifactCache {
    kind: ArtifactKind,
    root: PathBuf,
    resolver: Arc<MetadataResolver>,
    downloader: Arc<HttpDownloader>,
    preference: VariantPreference,
    stale_partial_ttl: Option<Duration>,
    in_flight: InFlight<VersionId, PathBuf>,
}

impl ArtifactCache {
    /// Create a cache for `kind` artifacts rooted at `root` with the default
    /// variant preference.
    pub fn new(
        kind: ArtifactKind,
        root: impl Into<PathBuf>,
        resolver: Arc<MetadataResolver>,
        downloader: Arc<HttpDownloader>,
    ) -> Self {
        Self {
            kind,
            root: root.into(),
            resolver,
            downloader,
            preference: VariantPreference::default(),
            stale_partial_ttl: Some(DEFAULT_STALE_PARTIAL_TTL),
            in_flight: InFlight::new(),
        }
    }

    /// Set the preferred file variant.
    pub fn with_preference(mut self, preference: VariantPreference) -> Self {
        self.preference = preference;
        self
    }

    /// Set the partial-file age limit; `None` never removes partials.
    pub fn with_stale_partial_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.stale_partial_ttl = ttl;
        self
    }

    /// Kind of artifact this cache holds.
    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    /// Cache root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the files of `version_id`.
    pub fn version_dir(&self, version_id: &VersionId) -> PathBuf {
        self.root.join(version_id.as_str())
    }

    /// Cached file for `version_id`, if one is present.
    pub fn cached(&self, version_id: &VersionId) -> FetchResult<Option<PathBuf>> {
        let dir = self.version_dir(version_id);
        find_cached(&dir).map_err(|e| FetchError::io(dir, e))
    }

    /// Return the local path of `version_id`, downloading it on a miss.
    ///
    /// Fails with [`FetchError::TypeMismatch`] without downloading anything if
    /// the registry declares a model type other than this cache's kind.
    pub fn ensure(&self, version_id: &VersionId) -> FetchResult<PathBuf> {
        self.ensure_with(version_id, &DownloadOptions::default())
    }

    /// Like [`ensure`](Self::ensure) with progress and cancellation options.
    ///
    /// When another caller is already downloading the same id, this call waits
    /// for that download and its own `options` are not used.
    pub fn ensure_with(
        &self,
        version_id: &VersionId,
        options: &DownloadOptions,
    ) -> FetchResult<PathBuf> {
        if let Some(path) = self.cached(version_id)? {
            debug!(version_id = %version_id, path = %path.display(), "artifact cache hit");
            return Ok(path);
        }

        self.in_flight.run(version_id.clone(), || {
            // A previous leader may have committed while we were queued.
            if let Some(path) = self.cached(version_id)? {
                return Ok(path);
            }
            self.download(version_id, options)
        })
    }

    fn download(&self, version_id: &VersionId, options: &DownloadOptions) -> FetchResult<PathBuf> {
        let required_type = self.kind.registry_type();
        let dir = self.version_dir(version_id);
        fs::create_dir_all(&dir).map_err(|e| FetchError::io(&dir, e))?;

        if let Some(ttl) = self.stale_partial_ttl {
            if let Err(e) = remove_stale_partials(&dir, ttl) {
                warn!(dir = %dir.display(), error = %e, "failed to clean stale partial downloads");
            }
        }

        let metadata = self.resolver.resolve(version_id)?;
        if metadata.model_type() != required_type {
            return Err(FetchError::TypeMismatch {
                version_id: version_id.to_string(),
                expected: required_type.to_string(),
                actual: metadata.model_type().to_string(),
            });
        }

        let params = select_params(&metadata, &self.preference);
        info!(
            version_id = %version_id,
            model_type = required_type,
            fp = params.fp.as_deref().unwrap_or("-"),
            size = params.size.as_deref().unwrap_or("-"),
            format = params.format.as_deref().unwrap_or("-"),
            "downloading artifact"
        );
        self.downloader
            .download(&metadata.download_url, &params, &dir, options)
    }
}
