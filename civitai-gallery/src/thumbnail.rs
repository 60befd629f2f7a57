//! Preview thumbnails for model versions.
//!
//! The first preview image of a version is downloaded once to
//! `<dir>/<version_id>.png` and served as a small PNG data URL. The stored file
//! is whatever the registry sent (often JPEG despite the extension); the format
//! is sniffed from its content when decoding.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{DynamicImage, ImageFormat, ImageReader};
use thiserror::Error;
use tracing::{debug, warn};

use crate::download::{DownloadOptions, HttpDownloader};
use crate::error::FetchError;
use crate::registry::{MetadataResolver, VersionId};
use crate::variant::DownloadParams;

/// Longest edge of a generated thumbnail, in pixels.
pub const THUMBNAIL_MAX_EDGE: u32 = 256;

/// Decoder allocation limit (128 MB).
const MAX_DECODE_ALLOC: u64 = 128 * 1024 * 1024;

const DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Errors from thumbnail generation.
#[derive(Debug, Error)]
pub enum ThumbnailError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("failed to decode image {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to encode thumbnail: {0}")]
    Encode(#[source] image::ImageError),
}

/// On-disk cache of preview images.
pub struct ThumbnailCache {
    dir: PathBuf,
    resolver: Arc<MetadataResolver>,
    downloader: Arc<HttpDownloader>,
}

impl ThumbnailCache {
    /// Create a thumbnail cache storing images in `dir`.
    pub fn new(
        dir: impl Into<PathBuf>,
        resolver: Arc<MetadataResolver>,
        downloader: Arc<HttpDownloader>,
    ) -> Self {
        Self {
            dir: dir.into(),
            resolver,
            downloader,
        }
    }

    /// Directory holding the cached images.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the stored preview image, downloading it on first use.
    ///
    /// Returns `Ok(None)` when the version has no preview images.
    pub fn thumbnail_path(&self, version_id: &VersionId) -> Result<Option<PathBuf>, FetchError> {
        let filename = format!("{}.png", version_id);
        let path = self.dir.join(&filename);
        if path.is_file() {
            return Ok(Some(path));
        }

        let metadata = self.resolver.resolve(version_id)?;
        let Some(url) = metadata.first_image_url() else {
            debug!(version_id = %version_id, "version has no preview images");
            return Ok(None);
        };

        let options = DownloadOptions::default().with_filename(filename);
        self.downloader
            .download(url, &DownloadParams::server_default(), &self.dir, &options)
            .map(Some)
    }

    /// Thumbnail data URL, with errors.
    pub fn load_thumbnail(&self, version_id: &VersionId) -> Result<Option<String>, ThumbnailError> {
        match self.thumbnail_path(version_id)? {
            Some(path) => Ok(Some(to_data_url(&encode_thumbnail(&path)?))),
            None => Ok(None),
        }
    }

    /// Thumbnail data URL; any failure is logged and yields `None`.
    pub fn get_thumbnail(&self, version_id: &VersionId) -> Option<String> {
        match self.load_thumbnail(version_id) {
            Ok(url) => url,
            Err(e) => {
                warn!(version_id = %version_id, error = %e, "thumbnail unavailable");
                None
            }
        }
    }
}

/// Decode the image at `path` and re-encode it as an RGB PNG no larger than
/// [`THUMBNAIL_MAX_EDGE`] on either side. Smaller images keep their size.
pub fn encode_thumbnail(path: &Path) -> Result<Vec<u8>, ThumbnailError> {
    let decode_err = |source| ThumbnailError::Decode {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = ImageReader::open(path)
        .map_err(|e| decode_err(image::ImageError::IoError(e)))?
        .with_guessed_format()
        .map_err(|e| decode_err(image::ImageError::IoError(e)))?;
    let mut limits = image::Limits::default();
    limits.max_alloc = Some(MAX_DECODE_ALLOC);
    reader.limits(limits);
    let image = reader.decode().map_err(decode_err)?;

    let image = if image.width() > THUMBNAIL_MAX_EDGE || image.height() > THUMBNAIL_MAX_EDGE {
        image.thumbnail(THUMBNAIL_MAX_EDGE, THUMBNAIL_MAX_EDGE)
    } else {
        image
    };
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());

    let mut png = Cursor::new(Vec::new());
    rgb.write_to(&mut png, ImageFormat::Png)
        .map_err(ThumbnailError::Encode)?;
    Ok(png.into_inner())
}

/// Wrap PNG bytes in a `data:` URL.
pub fn to_data_url(png: &[u8]) -> String {
    format!("{}{}", DATA_URL_PREFIX, STANDARD.encode(png))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use tempfile::TempDir;

    fn write_image(dir: &Path, name: &str, width: u32, height: u32, format: ImageFormat) -> PathBuf {
        let path = dir.join(name);
        let img = RgbaImage::from_pixel(width, height, Rgba([200, 10, 10, 128]));
        DynamicImage::ImageRgba8(img)
            .to_rgb8()
            .save_with_format(&path, format)
            .unwrap();
        path
    }

    fn decode_png(bytes: &[u8]) -> DynamicImage {
        image::load_from_memory_with_format(bytes, ImageFormat::Png).unwrap()
    }

    #[test]
    fn test_large_image_is_shrunk_preserving_aspect() {
        let temp = TempDir::new().unwrap();
        let path = write_image(temp.path(), "1.png", 512, 256, ImageFormat::Png);

        let thumb = decode_png(&encode_thumbnail(&path).unwrap());

        assert_eq!((thumb.width(), thumb.height()), (256, 128));
        assert_eq!(thumb.color(), image::ColorType::Rgb8);
    }

    #[test]
    fn test_small_image_is_not_upscaled() {
        let temp = TempDir::new().unwrap();
        let path = write_image(temp.path(), "2.png", 40, 100, ImageFormat::Png);

        let thumb = decode_png(&encode_thumbnail(&path).unwrap());
        assert_eq!((thumb.width(), thumb.height()), (40, 100));
    }

    #[test]
    fn test_jpeg_content_behind_png_name() {
        let temp = TempDir::new().unwrap();
        let jpeg = write_image(temp.path(), "src.jpg", 300, 600, ImageFormat::Jpeg);
        let disguised = temp.path().join("3.png");
        std::fs::rename(&jpeg, &disguised).unwrap();

        let thumb = decode_png(&encode_thumbnail(&disguised).unwrap());
        assert_eq!((thumb.width(), thumb.height()), (128, 256));
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("4.png");
        std::fs::write(&path, b"not an image").unwrap();

        assert!(matches!(
            encode_thumbnail(&path),
            Err(ThumbnailError::Decode { .. })
        ));
    }

    #[test]
    fn test_data_url_prefix() {
        let url = to_data_url(&[1, 2, 3]);
        assert_eq!(url, "data:image/png;base64,AQID");
    }
}
