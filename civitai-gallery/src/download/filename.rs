//! Target filename derivation and path-safety checks.
//!
//! The registry (or whatever answers on its behalf) controls the
//! `Content-Disposition` header, so the filename it proposes is untrusted and
//! must never resolve outside the target directory.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{FetchError, FetchResult};

/// Suffix marking an in-progress download.
pub const PARTIAL_SUFFIX: &str = ".part";

/// Whether a path names a partial download.
pub fn is_partial(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().ends_with(PARTIAL_SUFFIX))
        .unwrap_or(false)
}

/// Fresh partial path for a download that is renamed to `final_path` on commit.
///
/// Each call yields a distinct name (`<name>.<pid>-<seq>.part`) so that
/// concurrent writers, in this process or another, never share a partial file.
pub fn partial_path(final_path: &Path) -> PathBuf {
    static SEQUENCE: AtomicU64 = AtomicU64::new(0);
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);

    let mut name = final_path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{}-{}{}", process::id(), seq, PARTIAL_SUFFIX));
    final_path.with_file_name(name)
}

/// `filename="..."` or `filename=token`. The extended `filename*=` form is not matched.
fn disposition_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)(?:^|;)\s*filename\s*=\s*(?:"((?:[^"\\]|\\.)*)"|([^;\s]+))"#).unwrap()
    })
}

/// Extract the filename from a `Content-Disposition` header value.
///
/// Returns `None` when the header carries no non-empty `filename` parameter.
pub fn parse_content_disposition(header: &str) -> Option<String> {
    let captures = disposition_pattern().captures(header)?;
    let name = match (captures.get(1), captures.get(2)) {
        (Some(quoted), _) => quoted.as_str().replace("\\\"", "\"").replace("\\\\", "\\"),
        (None, Some(token)) => token.as_str().to_string(),
        (None, None) => return None,
    };
    let name = name.trim().to_string();
    (!name.is_empty()).then_some(name)
}

fn invalid(filename: &str, reason: &str) -> FetchError {
    FetchError::InvalidFilename {
        filename: filename.to_string(),
        reason: reason.to_string(),
    }
}

/// Check that `filename` is a single normal path component and not a partial
/// name.
pub fn validate_filename(filename: &str) -> FetchResult<()> {
    if filename.is_empty() {
        return Err(invalid(filename, "empty filename"));
    }
    if filename.contains(['/', '\\', '\0']) {
        return Err(invalid(filename, "filename contains a path separator"));
    }
    let mut components = Path::new(filename).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => {}
        _ => return Err(invalid(filename, "filename is not a plain file name")),
    }
    if filename.ends_with(PARTIAL_SUFFIX) {
        return Err(invalid(filename, "filename uses the partial-download suffix"));
    }
    Ok(())
}

/// Resolve `filename` inside `target_dir`, rejecting anything that could land
/// elsewhere.
///
/// On top of [`validate_filename`], an existing symlink at the destination is
/// refused. `target_dir` must exist.
pub fn resolve_target(target_dir: &Path, filename: &str) -> FetchResult<PathBuf> {
    validate_filename(filename)?;

    let canonical_dir = target_dir
        .canonicalize()
        .map_err(|e| FetchError::io(target_dir, e))?;
    let candidate = canonical_dir.join(filename);
    if candidate.parent() != Some(canonical_dir.as_path()) {
        return Err(invalid(filename, "path escapes the target directory"));
    }
    if let Ok(meta) = fs::symlink_metadata(&candidate) {
        if meta.file_type().is_symlink() {
            return Err(invalid(filename, "destination is a symlink"));
        }
    }

    Ok(target_dir.join(filename))
}
