//! civitai-gallery - model artifacts from the CivitAI registry, cached on disk
//!
//! This library backs the CivitAI gallery loader nodes. Given a model version
//! id it resolves the version's metadata, picks the file variant closest to a
//! preference, downloads it with atomic-commit semantics and remembers both the
//! metadata and the file, so repeated requests for the same version are served
//! locally.
//!
//! # Layout
//!
//! - [`client`]: explicit HTTP client configuration and the [`client::Transport`] seam
//! - [`registry`]: version metadata types and the memoizing resolver
//! - [`variant`]: file variant selection
//! - [`download`]: streamed downloads, filename safety, checksums
//! - [`artifact`]: per-kind disk caches with download de-duplication
//! - [`thumbnail`]: preview images as PNG data URLs
//! - [`gallery`]: the facade wiring everything together
//! - [`nodes`]: host-facing loader nodes
//! - [`preinstall`]: hash-addressed installs of auxiliary models
//! - [`config`], [`logging`]: INI configuration and `tracing` setup
//!
//! # Example
//!
//! ```ignore
//! use civitai_gallery::artifact::{ArtifactKind, ArtifactSource};
//! use civitai_gallery::config::ConfigFile;
//! use civitai_gallery::gallery::Gallery;
//! use civitai_gallery::registry::VersionId;
//!
//! let config = ConfigFile::load()?;
//! let gallery = Gallery::new(config.gallery_config())?;
//! let path = gallery.ensure(ArtifactKind::Lora, &VersionId::new("128713")?)?;
//! ```

pub mod artifact;
pub mod client;
pub mod config;
pub mod download;
pub mod error;
pub mod gallery;
pub mod logging;
pub mod nodes;
pub mod preinstall;
pub mod registry;
pub mod thumbnail;
pub mod variant;

pub use artifact::{ArtifactCache, ArtifactKind, ArtifactSource};
pub use error::{FetchError, FetchResult};
pub use gallery::{Gallery, GalleryConfig};
pub use registry::VersionId;
