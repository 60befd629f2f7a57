//! Streaming HTTP downloader with atomic commit.
//!
//! A download is written to a unique `.part` file next to its final name and
//! renamed into place only after the whole body arrived and, when requested,
//! its checksum matched. Any failure before the rename removes the partial
//! file, so a final-named file is always complete.

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::checksum::verify_checksum;
use super::filename::{parse_content_disposition, partial_path, resolve_target};
use crate::client::{HttpResponse, RequestKind, Transport};
use crate::error::{FetchError, FetchResult};
use crate::variant::DownloadParams;

/// Default read size per chunk (4 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Progress callback invoked after each chunk.
///
/// # Arguments
///
/// * `downloaded` - Bytes written so far
/// * `total` - Declared `Content-Length`, if the server sent one
pub type ProgressCallback = Arc<dyn Fn(u64, Option<u64>) + Send + Sync>;

/// Per-download options.
#[derive(Clone, Default)]
pub struct DownloadOptions {
    /// Use this filename instead of the one from `Content-Disposition`.
    pub filename: Option<String>,
    /// Verify the body against this SHA-256 before committing.
    pub expected_sha256: Option<String>,
    /// Receives cumulative progress.
    pub progress: Option<ProgressCallback>,
    /// Aborts the download between chunks when cancelled.
    pub cancel: Option<CancellationToken>,
}

impl DownloadOptions {
    /// Force the target filename.
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Require the body to hash to `sha256`.
    pub fn with_sha256(mut self, sha256: impl Into<String>) -> Self {
        self.expected_sha256 = Some(sha256.into());
        self
    }

    /// Report progress to `callback`.
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Abort when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|t| t.is_cancelled())
    }
}

/// A completed download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    /// Final path inside the target directory.
    pub path: PathBuf,
    /// Filename proposed by the server, even when the caller forced another.
    pub server_filename: Option<String>,
    /// Number of bytes written.
    pub bytes: u64,
}

/// Partial file that is deleted on drop unless committed.
struct PartialFile {
    path: PathBuf,
    committed: bool,
}

impl PartialFile {
    fn create(path: PathBuf) -> FetchResult<(Self, File)> {
        let file = File::create(&path).map_err(|e| FetchError::io(&path, e))?;
        Ok((
            Self {
                path,
                committed: false,
            },
            file,
        ))
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically move the partial file to `dest`.
    fn commit(mut self, dest: &Path) -> FetchResult<()> {
        fs::rename(&self.path, dest).map_err(|e| FetchError::io(dest, e))?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = fs::remove_file(&self.path) {
                debug!(path = %self.path.display(), error = %e, "failed to remove partial file");
            }
        }
    }
}

/// Streams files from the registry to disk.
pub struct HttpDownloader {
    transport: Arc<dyn Transport>,
    chunk_size: usize,
}

impl HttpDownloader {
    /// Create a downloader with the default chunk size.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Set the read chunk size. Zero is treated as one byte.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Configured chunk size.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Download `url` into `target_dir` and return the final path.
    pub fn download(
        &self,
        url: &str,
        params: &DownloadParams,
        target_dir: &Path,
        options: &DownloadOptions,
    ) -> FetchResult<PathBuf> {
        self.fetch(url, params, target_dir, options).map(|d| d.path)
    }

    /// Download `url` into `target_dir`, returning details about the file.
    pub fn fetch(
        &self,
        url: &str,
        params: &DownloadParams,
        target_dir: &Path,
        options: &DownloadOptions,
    ) -> FetchResult<DownloadedFile> {
        if options.is_cancelled() {
            return Err(FetchError::Cancelled {
                url: url.to_string(),
            });
        }

        fs::create_dir_all(target_dir).map_err(|e| FetchError::io(target_dir, e))?;

        let query = params.query_pairs();
        let response = self.transport.get(url, &query, RequestKind::Download)?;
        if !response.is_success() {
            return Err(FetchError::Http {
                url: url.to_string(),
                status: response.status,
            });
        }

        let server_filename = response
            .content_disposition
            .as_deref()
            .and_then(parse_content_disposition);
        let filename = options
            .filename
            .clone()
            .or_else(|| server_filename.clone())
            .ok_or_else(|| FetchError::MissingFilename {
                url: url.to_string(),
            })?;
        let dest = resolve_target(target_dir, &filename)?;

        let (partial, file) = PartialFile::create(partial_path(&dest))?;
        debug!(url = %url, partial = %partial.path().display(), "streaming download");

        let bytes = self.stream(url, response, file, partial.path(), options)?;

        if let Some(expected) = &options.expected_sha256 {
            verify_checksum(partial.path(), expected, &filename)?;
        }

        partial.commit(&dest)?;
        info!(url = %url, path = %dest.display(), bytes, "download complete");

        Ok(DownloadedFile {
            path: dest,
            server_filename,
            bytes,
        })
    }

    /// Copy the response body into `file` chunk by chunk.
    fn stream(
        &self,
        url: &str,
        mut response: HttpResponse,
        file: File,
        partial: &Path,
        options: &DownloadOptions,
    ) -> FetchResult<u64> {
        let total = response.content_length;
        let mut writer = BufWriter::new(file);
        let mut buffer = vec![0u8; self.chunk_size];
        let mut downloaded = 0u64;

        if let Some(cb) = &options.progress {
            cb(0, total);
        }

        loop {
            if options.is_cancelled() {
                return Err(FetchError::Cancelled {
                    url: url.to_string(),
                });
            }

            let bytes_read = response
                .read(&mut buffer)
                .map_err(|e| FetchError::Transport {
                    url: url.to_string(),
                    reason: format!("read error after {} bytes: {}", downloaded, e),
                })?;
            if bytes_read == 0 {
                break;
            }

            writer
                .write_all(&buffer[..bytes_read])
                .map_err(|e| FetchError::io(partial, e))?;
            downloaded += bytes_read as u64;

            if let Some(cb) = &options.progress {
                cb(downloaded, total);
            }
        }

        if let Some(expected) = total {
            if downloaded != expected {
                return Err(FetchError::Transport {
                    url: url.to_string(),
                    reason: format!(
                        "connection closed after {} of {} bytes",
                        downloaded, expected
                    ),
                });
            }
        }

        let file = writer
            .into_inner()
            .map_err(|e| FetchError::io(partial, e.into_error()))?;
        file.sync_all().map_err(|e| FetchError::io(partial, e))?;

        Ok(downloaded)
    }
}
