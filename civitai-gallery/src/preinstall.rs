//! Hash-addressed installation of auxiliary models.
//!
//! Some companion node packs expect a model in their own `models/` directory.
//! [`Preinstaller::install_by_hash`] downloads the file published under a known
//! SHA-256 to a fixed location in the cache and links it into such a
//! directory under the name the registry serves it as.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::download::{validate_filename, verify_checksum, DownloadOptions, HttpDownloader};
use crate::error::{FetchError, FetchResult};
use crate::registry::MetadataResolver;
use crate::variant::DownloadParams;

/// Result of an installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreinstallOutcome {
    /// Installed file.
    pub target: PathBuf,
    /// Whether the file was downloaded by this call.
    pub downloaded: bool,
    /// Filename the registry served the file as, when downloaded.
    pub server_filename: Option<String>,
    /// Symlink created in the link directory.
    pub link: Option<PathBuf>,
}

/// Installs files identified by their SHA-256.
pub struct Preinstaller {
    resolver: Arc<MetadataResolver>,
    downloader: Arc<HttpDownloader>,
}

impl Preinstaller {
    pub fn new(resolver: Arc<MetadataResolver>, downloader: Arc<HttpDownloader>) -> Self {
        Self {
            resolver,
            downloader,
        }
    }

    /// Make sure `target_file` holds the file whose SHA-256 is `hash`.
    ///
    /// An existing `target_file` is verified and kept. Otherwise the version is
    /// looked up by hash, downloaded under the fixed target name with
    /// verification before commit, and, when `link_dir` is given and the
    /// server named the file, `link_dir/<server filename>` is replaced by a
    /// symlink to the target.
    pub fn install_by_hash(
        &self,
        hash: &str,
        target_file: &Path,
        link_dir: Option<&Path>,
        options: &DownloadOptions,
    ) -> FetchResult<PreinstallOutcome> {
        let target_name = target_file
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| FetchError::InvalidFilename {
                filename: target_file.display().to_string(),
                reason: "target has no file name".to_string(),
            })?
            .to_string();

        if target_file.exists() {
            verify_checksum(target_file, hash, &target_name)?;
            debug!(path = %target_file.display(), "preinstalled file already present");
            return Ok(PreinstallOutcome {
                target: target_file.to_path_buf(),
                downloaded: false,
                server_filename: None,
                link: None,
            });
        }

        let target_dir = match target_file.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };

        let metadata = self.resolver.resolve_by_hash(hash)?;
        let options = options
            .clone()
            .with_filename(target_name)
            .with_sha256(hash);
        let file = self.downloader.fetch(
            &metadata.download_url,
            &DownloadParams::server_default(),
            target_dir,
            &options,
        )?;
        info!(hash = %hash, path = %file.path.display(), "preinstalled file");

        let link = match (link_dir, file.server_filename.as_deref()) {
            (Some(dir), Some(name)) => Some(replace_symlink(&file.path, dir, name)?),
            _ => None,
        };

        Ok(PreinstallOutcome {
            target: file.path,
            downloaded: true,
            server_filename: file.server_filename,
            link,
        })
    }
}

/// Point `link_dir/name` at `target`, replacing an existing symlink.
///
/// A regular file or directory at the link location is left alone and
/// reported as an error.
fn replace_symlink(target: &Path, link_dir: &Path, name: &str) -> FetchResult<PathBuf> {
    validate_filename(name)?;
    fs::create_dir_all(link_dir).map_err(|e| FetchError::io(link_dir, e))?;
    let link_path = link_dir.join(name);

    if let Ok(meta) = fs::symlink_metadata(&link_path) {
        if !meta.file_type().is_symlink() {
            return Err(FetchError::io(
                &link_path,
                std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "not a symlink, refusing to replace",
                ),
            ));
        }
        fs::remove_file(&link_path).map_err(|e| FetchError::io(&link_path, e))?;
    }

    let absolute = target
        .canonicalize()
        .map_err(|e| FetchError::io(target, e))?;
    create_symlink(&absolute, &link_path)?;
    debug!(link = %link_path.display(), target = %absolute.display(), "linked preinstalled file");
    Ok(link_path)
}

#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path) -> FetchResult<()> {
    std::os::unix::fs::symlink(target, link).map_err(|e| FetchError::io(link, e))
}

#[cfg(not(unix))]
fn create_symlink(target: &Path, link: &Path) -> FetchResult<()> {
    tracing::warn!(
        link = %link.display(),
        target = %target.display(),
        "symlinks are not supported on this platform, skipping"
    );
    Ok(())
}
