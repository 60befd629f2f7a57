//! Download engine for model files and preview images.
//!
//! This module provides:
//! - Streamed downloads committed by atomic rename (`http`)
//! - Filename derivation and directory-escape protection (`filename`)
//! - SHA-256 verification of downloaded content (`checksum`)
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use civitai_gallery::client::{ClientConfig, ReqwestTransport};
//! use civitai_gallery::download::{DownloadOptions, HttpDownloader};
//! use civitai_gallery::variant::DownloadParams;
//!
//! let transport = Arc::new(ReqwestTransport::new(&ClientConfig::default())?);
//! let downloader = HttpDownloader::new(transport);
//! let path = downloader.download(
//!     "https://civitai.com/api/download/models/128713",
//!     &DownloadParams::server_default(),
//!     Path::new("/tmp/models"),
//!     &DownloadOptions::default(),
//! )?;
//! ```

mod checksum;
mod filename;
mod http;

pub use checksum::{calculate_file_checksum, verify_checksum};
pub use filename::{
    is_partial, parse_content_disposition, partial_path, resolve_target, validate_filename,
    PARTIAL_SUFFIX,
};
pub use http::{
    DownloadOptions, DownloadedFile, HttpDownloader, ProgressCallback, DEFAULT_CHUNK_SIZE,
};
