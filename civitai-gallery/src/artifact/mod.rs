//! Artifact cache: version id in, local file path out.
//!
//! This module provides:
//! - The per-kind disk cache with download de-duplication (`cache`)
//! - Cache directory helpers: lookup, statistics and cleanup (`disk`)
//! - The per-key in-flight registry (`inflight`)
//! - Artifact kinds and their registry types (`kind`)
//!
//! Loader nodes depend on the [`ArtifactSource`] trait rather than on the
//! cache itself so they can be tested with a stub source.

mod cache;
mod disk;
mod inflight;
mod kind;

use std::path::PathBuf;

pub use cache::{ArtifactCache, DEFAULT_STALE_PARTIAL_TTL};
pub use disk::{
    cache_stats, clear_cache, find_cached, remove_stale_partials, remove_stale_partials_under,
    CacheStats, CleanupResult,
};
pub use inflight::InFlight;
pub use kind::ArtifactKind;

use crate::download::DownloadOptions;
use crate::error::FetchResult;
use crate::registry::VersionId;

/// Source of model files and their preview thumbnails.
pub trait ArtifactSource: Send + Sync {
    /// Local path of `version_id`, which must be a `kind` model.
    fn ensure_with(
        &self,
        kind: ArtifactKind,
        version_id: &VersionId,
        options: &DownloadOptions,
    ) -> FetchResult<PathBuf>;

    /// Thumbnail as a `data:image/png;base64,...` URL, if one is available.
    fn thumbnail(&self, version_id: &VersionId) -> Option<String>;

    /// Local path of `version_id` with default download options.
    fn ensure(&self, kind: ArtifactKind, version_id: &VersionId) -> FetchResult<PathBuf> {
        self.ensure_with(kind, version_id, &DownloadOptions::default())
    }
}
