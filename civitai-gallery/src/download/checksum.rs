//! SHA-256 checksum calculation for downloaded files.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{FetchError, FetchResult};

/// Buffer size for reading files during checksum calculation (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Calculate the lowercase hexadecimal SHA-256 of a file.
pub fn calculate_file_checksum(path: &Path) -> FetchResult<String> {
    let mut file = File::open(path).map_err(|e| FetchError::io(path, e))?;

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer).map_err(|e| FetchError::io(path, e))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Verify that a file matches an expected SHA-256 digest.
///
/// The registry publishes uppercase digests, so the comparison ignores case.
/// `display_name` is used in the error instead of the on-disk name, which for
/// downloads is still the partial name.
pub fn verify_checksum(path: &Path, expected: &str, display_name: &str) -> FetchResult<()> {
    let actual = calculate_file_checksum(path)?;
    if !actual.eq_ignore_ascii_case(expected.trim()) {
        return Err(FetchError::Integrity {
            filename: display_name.to_string(),
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}
