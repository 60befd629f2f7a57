//! On-disk layout helpers for the artifact cache.
//!
//! Each cached version lives in its own directory holding at most one
//! completed file plus any number of `.part` files from running or aborted
//! downloads. The presence of a completed file is the only cache-hit signal.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, info};

use crate::download::is_partial;

/// Result of a cleanup pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupResult {
    /// Number of files deleted.
    pub files_deleted: usize,
    /// Bytes freed by the deletion.
    pub bytes_freed: u64,
}

impl CleanupResult {
    fn merge(&mut self, other: CleanupResult) {
        self.files_deleted += other.files_deleted;
        self.bytes_freed += other.bytes_freed;
    }
}

/// Summary of a cache directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Version directories holding a completed file.
    pub entries: usize,
    /// Partial files from running or aborted downloads.
    pub partial_files: usize,
    /// Total size of all files, partial ones included.
    pub total_bytes: u64,
}

/// First completed file in a version directory, by name.
///
/// A missing directory is a miss, not an error.
pub fn find_cached(dir: &Path) -> io::Result<Option<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let mut completed = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file() && !is_partial(&path) {
            completed.push(path);
        }
    }
    completed.sort();
    Ok(completed.into_iter().next())
}

/// Delete partial files in `dir` last modified more than `max_age` ago.
///
/// Younger partials may belong to a download still running in another
/// process and are left alone.
pub fn remove_stale_partials(dir: &Path, max_age: Duration) -> io::Result<CleanupResult> {
    let mut result = CleanupResult::default();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(result),
        Err(e) => return Err(e),
    };
    let now = SystemTime::now();

    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !is_partial(&path) {
            continue;
        }
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }
        let age = meta
            .modified()
            .ok()
            .and_then(|m| now.duration_since(m).ok())
            .unwrap_or_default();
        if age <= max_age {
            continue;
        }

        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), age_secs = age.as_secs(), "removed stale partial");
                result.files_deleted += 1;
                result.bytes_freed += meta.len();
            }
            // Another process finished or removed it first.
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(result)
}

/// Apply [`remove_stale_partials`] to every version directory under `root`.
pub fn remove_stale_partials_under(root: &Path, max_age: Duration) -> io::Result<CleanupResult> {
    let mut result = CleanupResult::default();
    for dir in version_dirs(root)? {
        result.merge(remove_stale_partials(&dir, max_age)?);
    }
    if result.files_deleted > 0 {
        info!(
            root = %root.display(),
            files = result.files_deleted,
            bytes = result.bytes_freed,
            "removed stale partial downloads"
        );
    }
    Ok(result)
}

/// Collect statistics for the cache rooted at `root`.
pub fn cache_stats(root: &Path) -> io::Result<CacheStats> {
    let mut stats = CacheStats::default();
    for dir in version_dirs(root)? {
        let mut has_completed = false;
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            if !meta.is_file() {
                continue;
            }
            stats.total_bytes += meta.len();
            if is_partial(&entry.path()) {
                stats.partial_files += 1;
            } else {
                has_completed = true;
            }
        }
        if has_completed {
            stats.entries += 1;
        }
    }
    Ok(stats)
}

/// Remove every version directory under `root`.
pub fn clear_cache(root: &Path) -> io::Result<CleanupResult> {
    let mut result = CleanupResult::default();
    for dir in version_dirs(root)? {
        for entry in fs::read_dir(&dir)? {
            let meta = entry?.metadata()?;
            if meta.is_file() {
                result.files_deleted += 1;
                result.bytes_freed += meta.len();
            }
        }
        fs::remove_dir_all(&dir)?;
    }
    Ok(result)
}

fn version_dirs(root: &Path) -> io::Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}
