//! Integration tests for the artifact cache.
//!
//! These tests drive `Gallery::ensure` end to end over a scripted transport:
//! - cache hits never touch the network
//! - declared type checks happen before any download
//! - unsafe server filenames are rejected
//! - failed, cancelled and concurrent downloads leave a consistent cache
//!
//! Run with: `cargo test --test artifact_cache`

mod common;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, SystemTime};

use filetime::{set_file_mtime, FileTime};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use civitai_gallery::client::{ClientConfig, RequestKind};
use civitai_gallery::download::DownloadOptions;
use civitai_gallery::{ArtifactKind, ArtifactSource, FetchError, Gallery, GalleryConfig, VersionId};

use common::{download_url, gallery, metadata_json, MockTransport, Route, REGISTRY};

// ============================================================================
// Helper Functions
// ============================================================================

fn id(s: &str) -> VersionId {
    VersionId::new(s).unwrap()
}

/// Transport serving one checkpoint version `1` with a single pruned fp16 file.
fn checkpoint_transport(body: &[u8]) -> Arc<MockTransport> {
    let transport = MockTransport::new();
    transport.metadata(
        "1",
        metadata_json("1", "Checkpoint", &[("fp16", "pruned", "SafeTensor")], false),
    );
    transport.route(&download_url("1"), Route::file("dreamy.safetensors", body));
    transport
}

fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .map(|entries| {
            entries
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

// ============================================================================
// Integration Tests
// ============================================================================

#[test]
fn test_second_ensure_is_served_from_disk() {
    let temp = TempDir::new().unwrap();
    let transport = checkpoint_transport(b"weights");
    let gallery = gallery(temp.path(), transport.clone());

    let first = gallery.ensure(ArtifactKind::Checkpoint, &id("1")).unwrap();
    let second = gallery.ensure(ArtifactKind::Checkpoint, &id("1")).unwrap();

    assert_eq!(first, second);
    assert_eq!(
        first,
        temp.path().join("checkpoints/1/dreamy.safetensors")
    );
    assert_eq!(fs::read(&first).unwrap(), b"weights");
    assert_eq!(transport.count(RequestKind::Metadata), 1);
    assert_eq!(transport.count(RequestKind::Download), 1);
}

#[test]
fn test_new_gallery_over_existing_cache_needs_no_network() {
    let temp = TempDir::new().unwrap();
    let transport = checkpoint_transport(b"weights");
    gallery(temp.path(), transport)
        .ensure(ArtifactKind::Checkpoint, &id("1"))
        .unwrap();

    // Fresh process: nothing routed, so any request would fail.
    let offline = MockTransport::new();
    let path = gallery(temp.path(), offline.clone())
        .ensure(ArtifactKind::Checkpoint, &id("1"))
        .unwrap();

    assert!(path.ends_with("dreamy.safetensors"));
    assert!(offline.requests().is_empty());
}

#[test]
fn test_download_uses_selected_variant_params() {
    let temp = TempDir::new().unwrap();
    let transport = MockTransport::new();
    transport.metadata(
        "7",
        metadata_json(
            "7",
            "LORA",
            &[("fp32", "full", "SafeTensor"), ("bf16", "pruned", "PickleTensor")],
            false,
        ),
    );
    transport.route(&download_url("7"), Route::file("style.pt", b"lora"));
    let gallery = gallery(temp.path(), transport.clone());

    gallery.ensure(ArtifactKind::Lora, &id("7")).unwrap();

    let download = transport
        .requests()
        .into_iter()
        .find(|r| r.kind == RequestKind::Download)
        .unwrap();
    let query: Vec<(&str, &str)> = download
        .query
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    assert_eq!(
        query,
        [("fp", "bf16"), ("size", "pruned"), ("format", "PickleTensor")]
    );
}

#[test]
fn test_no_size_match_lets_server_choose() {
    let temp = TempDir::new().unwrap();
    let transport = MockTransport::new();
    transport.metadata(
        "8",
        metadata_json("8", "Checkpoint", &[("fp32", "full", "SafeTensor")], false),
    );
    transport.route(&download_url("8"), Route::file("full.safetensors", b"x"));
    let gallery = gallery(temp.path(), transport.clone());

    gallery.ensure(ArtifactKind::Checkpoint, &id("8")).unwrap();

    let download = transport
        .requests()
        .into_iter()
        .find(|r| r.kind == RequestKind::Download)
        .unwrap();
    assert!(download.query.is_empty());
}

#[test]
fn test_type_mismatch_performs_no_download() {
    let temp = TempDir::new().unwrap();
    let transport = checkpoint_transport(b"weights");
    let gallery = gallery(temp.path(), transport.clone());

    let err = gallery.ensure(ArtifactKind::Lora, &id("1")).unwrap_err();

    assert!(matches!(
        err,
        FetchError::TypeMismatch { ref expected, ref actual, .. }
            if expected == "LORA" && actual == "Checkpoint"
    ));
    assert_eq!(transport.count(RequestKind::Download), 0);
    assert!(dir_entries(&temp.path().join("loras/1")).is_empty());
}

#[test]
fn test_traversal_filename_is_rejected() {
    let temp = TempDir::new().unwrap();
    let transport = MockTransport::new();
    transport.metadata(
        "66",
        metadata_json("66", "Checkpoint", &[("fp16", "pruned", "SafeTensor")], false),
    );
    transport.route(
        &download_url("66"),
        Route::ok(b"payload".to_vec()).with_disposition(r#"attachment; filename="../../evil""#),
    );
    let gallery = gallery(temp.path(), transport);

    let err = gallery
        .ensure(ArtifactKind::Checkpoint, &id("66"))
        .unwrap_err();

    assert!(matches!(err, FetchError::InvalidFilename { .. }));
    assert!(!temp.path().join("evil").exists());
    assert!(!temp.path().join("checkpoints/evil").exists());
    assert!(dir_entries(&temp.path().join("checkpoints/66")).is_empty());
}

#[test]
fn test_missing_disposition_is_missing_filename() {
    let temp = TempDir::new().unwrap();
    let transport = MockTransport::new();
    transport.metadata(
        "3",
        metadata_json("3", "Checkpoint", &[], false),
    );
    transport.route(&download_url("3"), Route::ok(b"x".to_vec()));
    let gallery = gallery(temp.path(), transport);

    let err = gallery
        .ensure(ArtifactKind::Checkpoint, &id("3"))
        .unwrap_err();
    assert!(matches!(err, FetchError::MissingFilename { .. }));
}

#[test]
fn test_registry_errors_propagate() {
    let temp = TempDir::new().unwrap();
    let transport = MockTransport::new();
    transport.route(&common::metadata_url("404"), Route::status(404));
    transport.metadata(
        "500",
        metadata_json("500", "Checkpoint", &[], false),
    );
    transport.route(&download_url("500"), Route::status(500));
    let gallery = gallery(temp.path(), transport);

    assert!(matches!(
        gallery.ensure(ArtifactKind::Checkpoint, &id("404")),
        Err(FetchError::NotFound { status: 404, .. })
    ));
    assert!(matches!(
        gallery.ensure(ArtifactKind::Checkpoint, &id("500")),
        Err(FetchError::Http { status: 500, .. })
    ));
}

#[test]
fn test_interrupted_download_leaves_nothing_and_retry_succeeds() {
    let temp = TempDir::new().unwrap();
    let body = vec![0x5Au8; 100];
    let transport = checkpoint_transport(&body);
    transport.route(
        &download_url("1"),
        Route::file("dreamy.safetensors", body.clone()).failing_after(40),
    );
    let gallery = gallery(temp.path(), transport.clone());
    let version_dir = temp.path().join("checkpoints/1");

    let err = gallery
        .ensure(ArtifactKind::Checkpoint, &id("1"))
        .unwrap_err();

    assert!(matches!(err, FetchError::Transport { .. }));
    assert!(err.is_retryable());
    assert!(dir_entries(&version_dir).is_empty());

    transport.route(&download_url("1"), Route::file("dreamy.safetensors", body.clone()));
    let path = gallery.ensure(ArtifactKind::Checkpoint, &id("1")).unwrap();

    assert_eq!(fs::read(&path).unwrap(), body);
    assert_eq!(dir_entries(&version_dir), ["dreamy.safetensors"]);
    // Metadata stayed memoized across the failed attempt.
    assert_eq!(transport.count(RequestKind::Metadata), 1);
}

#[test]
fn test_short_body_is_not_committed() {
    let temp = TempDir::new().unwrap();
    let transport = checkpoint_transport(b"");
    let mut route = Route::file("dreamy.safetensors", b"only-part".to_vec());
    route.content_length = Some(1000);
    transport.route(&download_url("1"), route);
    let gallery = gallery(temp.path(), transport);

    let err = gallery
        .ensure(ArtifactKind::Checkpoint, &id("1"))
        .unwrap_err();

    assert!(matches!(err, FetchError::Transport { .. }));
    assert!(dir_entries(&temp.path().join("checkpoints/1")).is_empty());
}

#[test]
fn test_concurrent_ensure_downloads_once() {
    const CALLERS: usize = 8;

    let temp = TempDir::new().unwrap();
    let transport = checkpoint_transport(b"");
    transport.route(
        &download_url("1"),
        Route::file("dreamy.safetensors", vec![1u8; 4096]).delayed(Duration::from_millis(300)),
    );
    let gallery = Arc::new(gallery(temp.path(), transport.clone()));
    let barrier = Arc::new(Barrier::new(CALLERS));

    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let gallery = Arc::clone(&gallery);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                gallery.ensure(ArtifactKind::Checkpoint, &id("1"))
            })
        })
        .collect();

    let paths: Vec<PathBuf> = handles
        .into_iter()
        .map(|h| h.join().unwrap().unwrap())
        .collect();

    assert!(paths.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(transport.count(RequestKind::Download), 1);
    assert_eq!(transport.count(RequestKind::Metadata), 1);
    assert_eq!(
        dir_entries(&temp.path().join("checkpoints/1")),
        ["dreamy.safetensors"]
    );
}

#[test]
fn test_concurrent_failure_is_shared_then_retried() {
    const CALLERS: usize = 4;

    let temp = TempDir::new().unwrap();
    let transport = checkpoint_transport(b"");
    transport.route(
        &download_url("1"),
        Route::status(503).delayed(Duration::from_millis(300)),
    );
    let gallery = Arc::new(gallery(temp.path(), transport.clone()));
    let barrier = Arc::new(Barrier::new(CALLERS));

    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let gallery = Arc::clone(&gallery);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                gallery.ensure(ArtifactKind::Checkpoint, &id("1"))
            })
        })
        .collect();

    for handle in handles {
        assert!(matches!(
            handle.join().unwrap(),
            Err(FetchError::Http { status: 503, .. })
        ));
    }
    assert_eq!(transport.count(RequestKind::Download), 1);

    transport.route(&download_url("1"), Route::file("dreamy.safetensors", b"ok".to_vec()));
    assert!(gallery.ensure(ArtifactKind::Checkpoint, &id("1")).is_ok());
    assert_eq!(transport.count(RequestKind::Download), 2);
}

#[test]
fn test_progress_and_cancellation() {
    let temp = TempDir::new().unwrap();
    let transport = checkpoint_transport(&[9u8; 64]);
    let config = GalleryConfig::new(temp.path())
        .with_client(ClientConfig::new(REGISTRY))
        .with_chunk_size(16);
    let gallery = Gallery::with_transport(config, transport);

    let token = CancellationToken::new();
    let seen = Arc::new(AtomicU64::new(0));
    let options = {
        let token = token.clone();
        let seen = Arc::clone(&seen);
        DownloadOptions::default()
            .with_cancellation(token.clone())
            .with_progress(Arc::new(move |downloaded, total| {
                assert_eq!(total, Some(64));
                seen.store(downloaded, Ordering::SeqCst);
                if downloaded >= 32 {
                    token.cancel();
                }
            }))
    };

    let err = gallery
        .ensure_with(ArtifactKind::Checkpoint, &id("1"), &options)
        .unwrap_err();

    assert!(matches!(err, FetchError::Cancelled { .. }));
    assert_eq!(seen.load(Ordering::SeqCst), 32);
    assert!(dir_entries(&temp.path().join("checkpoints/1")).is_empty());

    // A later call without the cancelled token completes.
    let path = gallery.ensure(ArtifactKind::Checkpoint, &id("1")).unwrap();
    assert_eq!(fs::read(path).unwrap(), vec![9u8; 64]);
}

#[test]
fn test_stale_partials_are_cleaned_before_download() {
    let temp = TempDir::new().unwrap();
    let transport = checkpoint_transport(b"weights");
    let gallery = gallery(temp.path(), transport);
    let version_dir = temp.path().join("checkpoints/1");
    fs::create_dir_all(&version_dir).unwrap();

    let stale = version_dir.join("dreamy.safetensors.999-0.part");
    let fresh = version_dir.join("dreamy.safetensors.999-1.part");
    fs::write(&stale, b"old").unwrap();
    fs::write(&fresh, b"new").unwrap();
    let two_days_ago = SystemTime::now() - Duration::from_secs(48 * 3600);
    set_file_mtime(&stale, FileTime::from_system_time(two_days_ago)).unwrap();

    gallery.ensure(ArtifactKind::Checkpoint, &id("1")).unwrap();

    assert_eq!(
        dir_entries(&version_dir),
        ["dreamy.safetensors", "dreamy.safetensors.999-1.part"]
    );
}

#[test]
fn test_partial_file_alone_is_not_a_hit() {
    let temp = TempDir::new().unwrap();
    let transport = checkpoint_transport(b"weights");
    let gallery = gallery(temp.path(), transport.clone());
    let version_dir = temp.path().join("checkpoints/1");
    fs::create_dir_all(&version_dir).unwrap();
    fs::write(version_dir.join("dreamy.safetensors.1-0.part"), b"half").unwrap();

    let path = gallery.ensure(ArtifactKind::Checkpoint, &id("1")).unwrap();

    assert!(path.ends_with("dreamy.safetensors"));
    assert_eq!(transport.count(RequestKind::Download), 1);
}

#[test]
fn test_concurrent_requests_of_different_kinds_are_checked_separately() {
    let temp = TempDir::new().unwrap();
    let transport = MockTransport::new();
    transport.metadata("40", metadata_json("40", "LORA", &[], false));
    transport.route(
        &download_url("40"),
        Route::file("style.safetensors", b"lora".to_vec()).delayed(Duration::from_millis(300)),
    );
    let gallery = Arc::new(gallery(temp.path(), transport.clone()));
    for kind in ArtifactKind::ALL {
        assert_eq!(gallery.cache(kind).kind(), kind);
    }

    let barrier = Arc::new(Barrier::new(2));
    let spawn = |kind: ArtifactKind| {
        let gallery = Arc::clone(&gallery);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            gallery.ensure(kind, &id("40"))
        })
    };
    let lora = spawn(ArtifactKind::Lora);
    let checkpoint = spawn(ArtifactKind::Checkpoint);

    assert_eq!(
        lora.join().unwrap().unwrap(),
        temp.path().join("loras/40/style.safetensors")
    );
    assert!(matches!(
        checkpoint.join().unwrap(),
        Err(FetchError::TypeMismatch { ref expected, .. }) if expected == "Checkpoint"
    ));
    assert_eq!(transport.count(RequestKind::Download), 1);
    assert!(!temp.path().join("checkpoints/40").join("style.safetensors").exists());
}
