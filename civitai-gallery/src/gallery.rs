//! Facade wiring the resolver, downloader and caches together.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::artifact::{ArtifactCache, ArtifactKind, ArtifactSource, DEFAULT_STALE_PARTIAL_TTL};
use crate::client::{ClientConfig, ReqwestTransport, Transport};
use crate::download::{DownloadOptions, HttpDownloader, DEFAULT_CHUNK_SIZE};
use crate::error::FetchResult;
use crate::preinstall::Preinstaller;
use crate::registry::{MetadataResolver, VersionId, VersionMetadata, DEFAULT_METADATA_CAPACITY};
use crate::thumbnail::ThumbnailCache;
use crate::variant::VariantPreference;

/// Name of the thumbnail directory under the cache root.
pub const THUMBNAIL_SUBDIR: &str = "thumbnails";

/// Default cache root: `~/.cache/comfy-civitai`.
pub fn default_cache_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".cache")
        .join("comfy-civitai")
}

/// Configuration for a [`Gallery`].
#[derive(Debug, Clone)]
pub struct GalleryConfig {
    /// Root directory holding the per-kind caches and thumbnails.
    pub cache_root: PathBuf,

    /// Registry endpoint, token and timeouts.
    pub client: ClientConfig,

    /// Maximum number of metadata entries kept in memory.
    pub metadata_capacity: u64,

    /// Read size per download chunk.
    pub chunk_size: usize,

    /// Preferred file variant.
    pub preference: VariantPreference,

    /// Partial downloads older than this are removed before a new download
    /// into the same version directory. `None` keeps them forever.
    pub stale_partial_ttl: Option<Duration>,
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self {
            cache_root: default_cache_root(),
            client: ClientConfig::default(),
            metadata_capacity: DEFAULT_METADATA_CAPACITY,
            chunk_size: DEFAULT_CHUNK_SIZE,
            preference: VariantPreference::default(),
            stale_partial_ttl: Some(DEFAULT_STALE_PARTIAL_TTL),
        }
    }
}

impl GalleryConfig {
    /// Create a configuration with the given cache root.
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            cache_root: cache_root.into(),
            ..Default::default()
        }
    }

    /// Set the registry client configuration.
    pub fn with_client(mut self, client: ClientConfig) -> Self {
        self.client = client;
        self
    }

    /// Set the metadata cache capacity.
    pub fn with_metadata_capacity(mut self, capacity: u64) -> Self {
        self.metadata_capacity = capacity;
        self
    }

    /// Set the download chunk size.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the preferred file variant.
    pub fn with_preference(mut self, preference: VariantPreference) -> Self {
        self.preference = preference;
        self
    }

    /// Set the stale partial age limit.
    pub fn with_stale_partial_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.stale_partial_ttl = ttl;
        self
    }

    /// Directory of the `kind` cache.
    pub fn kind_dir(&self, kind: ArtifactKind) -> PathBuf {
        self.cache_root.join(kind.cache_subdir())
    }

    /// Directory of the thumbnail cache.
    pub fn thumbnail_dir(&self) -> PathBuf {
        self.cache_root.join(THUMBNAIL_SUBDIR)
    }
}

/// Model artifact gallery: one metadata resolver and downloader shared by the
/// checkpoint, LoRA and ControlNet caches, the thumbnail cache and preinstall.
pub struct Gallery {
    config: GalleryConfig,
    resolver: Arc<MetadataResolver>,
    checkpoints: ArtifactCache,
    loras: ArtifactCache,
    controlnets: ArtifactCache,
    thumbnails: ThumbnailCache,
    preinstaller: Preinstaller,
}

impl Gallery {
    /// Create a gallery talking to the registry over HTTP.
    pub fn new(config: GalleryConfig) -> FetchResult<Self> {
        let transport = Arc::new(ReqwestTransport::new(&config.client)?);
        Ok(Self::with_transport(config, transport))
    }

    /// Create a gallery over an arbitrary transport.
    pub fn with_transport(config: GalleryConfig, transport: Arc<dyn Transport>) -> Self {
        let resolver = Arc::new(MetadataResolver::with_capacity(
            Arc::clone(&transport),
            config.client.clone(),
            config.metadata_capacity,
        ));
        let downloader =
            Arc::new(HttpDownloader::new(transport).with_chunk_size(config.chunk_size));

        let cache = |kind: ArtifactKind| {
            ArtifactCache::new(
                kind,
                config.kind_dir(kind),
                Arc::clone(&resolver),
                Arc::clone(&downloader),
            )
            .with_preference(config.preference.clone())
            .with_stale_partial_ttl(config.stale_partial_ttl)
        };
        let checkpoints = cache(ArtifactKind::Checkpoint);
        let loras = cache(ArtifactKind::Lora);
        let controlnets = cache(ArtifactKind::ControlNet);

        let thumbnails = ThumbnailCache::new(
            config.thumbnail_dir(),
            Arc::clone(&resolver),
            Arc::clone(&downloader),
        );
        let preinstaller = Preinstaller::new(Arc::clone(&resolver), downloader);

        Self {
            config,
            resolver,
            checkpoints,
            loras,
            controlnets,
            thumbnails,
            preinstaller,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &GalleryConfig {
        &self.config
    }

    /// Cache root directory.
    pub fn cache_root(&self) -> &Path {
        &self.config.cache_root
    }

    /// Cache for `kind` artifacts.
    pub fn cache(&self, kind: ArtifactKind) -> &ArtifactCache {
        match kind {
            ArtifactKind::Checkpoint => &self.checkpoints,
            ArtifactKind::Lora => &self.loras,
            ArtifactKind::ControlNet => &self.controlnets,
        }
    }

    /// Shared metadata resolver.
    pub fn resolver(&self) -> &Arc<MetadataResolver> {
        &self.resolver
    }

    /// Thumbnail cache.
    pub fn thumbnails(&self) -> &ThumbnailCache {
        &self.thumbnails
    }

    /// Hash-addressed installer.
    pub fn preinstaller(&self) -> &Preinstaller {
        &self.preinstaller
    }

    /// Metadata of `version_id`.
    pub fn metadata(&self, version_id: &VersionId) -> FetchResult<Arc<VersionMetadata>> {
        self.resolver.resolve(version_id)
    }
}

impl ArtifactSource for Gallery {
    fn ensure_with(
        &self,
        kind: ArtifactKind,
        version_id: &VersionId,
        options: &DownloadOptions,
    ) -> FetchResult<PathBuf> {
        self.cache(kind).ensure_with(version_id, options)
    }

    fn thumbnail(&self, version_id: &VersionId) -> Option<String> {
        self.thumbnails.get_thumbnail(version_id)
    }
}
