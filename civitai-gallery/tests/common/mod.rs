//! Shared test fixtures: a scripted transport and metadata builders.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{self, Cursor, Read};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use civitai_gallery::client::{ClientConfig, HttpResponse, RequestKind, Transport};
use civitai_gallery::{FetchError, FetchResult, Gallery, GalleryConfig};

pub const REGISTRY: &str = "https://registry.test";

/// Scripted answer for one URL.
#[derive(Debug, Clone)]
pub struct Route {
    pub status: u16,
    pub body: Vec<u8>,
    pub content_disposition: Option<String>,
    /// Declared length; defaults to the body length.
    pub content_length: Option<u64>,
    /// Break the connection after this many body bytes.
    pub fail_after: Option<usize>,
    /// Sleep before answering.
    pub delay: Option<Duration>,
}

impl Route {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        let body = body.into();
        Self {
            status: 200,
            content_length: Some(body.len() as u64),
            body,
            content_disposition: None,
            fail_after: None,
            delay: None,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            ..Self::ok(Vec::new())
        }
    }

    /// File download answered with `Content-Disposition: attachment; filename="<name>"`.
    pub fn file(name: &str, body: impl Into<Vec<u8>>) -> Self {
        Self::ok(body).with_disposition(&format!("attachment; filename=\"{}\"", name))
    }

    pub fn with_disposition(mut self, value: &str) -> Self {
        self.content_disposition = Some(value.to_string());
        self
    }

    pub fn failing_after(mut self, bytes: usize) -> Self {
        self.fail_after = Some(bytes);
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// One recorded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub url: String,
    pub query: Vec<(String, String)>,
    pub kind: RequestKind,
}

/// Body reader that errors out after `remaining` bytes.
struct BrokenBody {
    inner: Cursor<Vec<u8>>,
    remaining: usize,
}

impl Read for BrokenBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            ));
        }
        let limit = buf.len().min(self.remaining);
        let n = self.inner.read(&mut buf[..limit])?;
        self.remaining -= n;
        Ok(n)
    }
}

/// Transport answering from a route table and recording every request.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<String, Route>>,
    requests: Mutex<Vec<Request>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn route(&self, url: &str, route: Route) {
        self.routes.lock().insert(url.to_string(), route);
    }

    /// Serve `json` as the metadata of `version_id`.
    pub fn metadata(&self, version_id: &str, json: String) {
        self.route(&metadata_url(version_id), Route::ok(json));
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().clone()
    }

    pub fn count(&self, kind: RequestKind) -> usize {
        self.requests.lock().iter().filter(|r| r.kind == kind).count()
    }

    pub fn count_url(&self, url: &str) -> usize {
        self.requests.lock().iter().filter(|r| r.url == url).count()
    }
}

impl Transport for MockTransport {
    fn get(
        &self,
        url: &str,
        query: &[(&str, &str)],
        kind: RequestKind,
    ) -> FetchResult<HttpResponse> {
        self.requests.lock().push(Request {
            url: url.to_string(),
            query: query
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            kind,
        });

        let route = self
            .routes
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Transport {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            })?;

        if let Some(delay) = route.delay {
            thread::sleep(delay);
        }

        let body: Box<dyn Read + Send> = match route.fail_after {
            Some(remaining) => Box::new(BrokenBody {
                inner: Cursor::new(route.body),
                remaining,
            }),
            None => Box::new(Cursor::new(route.body)),
        };
        Ok(HttpResponse::new(route.status, body)
            .with_content_length(route.content_length)
            .with_content_disposition(route.content_disposition))
    }
}

pub fn metadata_url(version_id: &str) -> String {
    format!("{}/api/v1/model-versions/{}", REGISTRY, version_id)
}

pub fn by_hash_url(hash: &str) -> String {
    format!("{}/api/v1/model-versions/by-hash/{}", REGISTRY, hash)
}

pub fn download_url(version_id: &str) -> String {
    format!("https://files.test/download/{}", version_id)
}

pub fn image_url(version_id: &str) -> String {
    format!("https://images.test/{}.jpeg", version_id)
}

/// Version metadata JSON with the given type, variants `(fp, size, format)`
/// and optional preview image.
pub fn metadata_json(
    version_id: &str,
    model_type: &str,
    variants: &[(&str, &str, &str)],
    with_image: bool,
) -> String {
    let files: Vec<serde_json::Value> = variants
        .iter()
        .map(|(fp, size, format)| {
            serde_json::json!({
                "name": format!("{}-{}-{}.bin", fp, size, format),
                "metadata": {"fp": fp, "size": size, "format": format},
                "hashes": {"SHA256": "00"}
            })
        })
        .collect();
    let images: Vec<serde_json::Value> = if with_image {
        vec![serde_json::json!({"url": image_url(version_id)})]
    } else {
        Vec::new()
    };
    serde_json::json!({
        "id": version_id.parse::<u64>().ok(),
        "name": "v1.0",
        "model": {"type": model_type, "name": "Test model"},
        "files": files,
        "downloadUrl": download_url(version_id),
        "images": images
    })
    .to_string()
}

/// Gallery over `transport` caching under `root`.
pub fn gallery(root: &std::path::Path, transport: Arc<MockTransport>) -> Gallery {
    let config = GalleryConfig::new(root).with_client(ClientConfig::new(REGISTRY));
    Gallery::with_transport(config, transport)
}

/// PNG-encoded solid image of the given size.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([10, 200, 30]));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}
