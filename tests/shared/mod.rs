pub mod mock_remote;

use dropfs::{ContentCache, Overlay, OverlayOptions, RemoteStorage};
use std::sync::Arc;
use tempfile::TempDir;

pub use mock_remote::MockRemote;

/// An overlay over a fresh mock remote and a throwaway cache directory.
pub struct TestOverlay {
    pub remote: Arc<MockRemote>,
    pub overlay: Arc<Overlay>,
    pub cache_dir: TempDir,
}

#[allow(dead_code)]
impl TestOverlay {
    pub fn new() -> Self {
        Self::with_buckets(4)
    }

    pub fn with_buckets(index_buckets: usize) -> Self {
        let remote = Arc::new(MockRemote::new());
        let cache_dir = TempDir::new().expect("Failed to create cache dir");
        let overlay = build_overlay(&remote, &cache_dir, index_buckets);
        TestOverlay {
            remote,
            overlay,
            cache_dir,
        }
    }

    /// A second overlay over the same remote and cache, as after a remount.
    pub fn remount(&self) -> Arc<Overlay> {
        build_overlay(&self.remote, &self.cache_dir, 4)
    }

    pub fn cache_file(&self, path: &str) -> std::path::PathBuf {
        self.cache_dir.path().join(path.trim_start_matches('/'))
    }

    pub fn read_all(&self, path: &str) -> Vec<u8> {
        self.overlay
            .read(path, 0, 1 << 20)
            .unwrap_or_else(|e| panic!("read {} failed: {}", path, e))
    }
}

fn build_overlay(remote: &Arc<MockRemote>, cache_dir: &TempDir, index_buckets: usize) -> Arc<Overlay> {
    let cache = ContentCache::new(cache_dir.path()).expect("Failed to create content cache");
    let remote: Arc<dyn RemoteStorage> = Arc::clone(remote) as Arc<dyn RemoteStorage>;
    let options = OverlayOptions {
        index_buckets,
        ..OverlayOptions::default()
    };
    Arc::new(Overlay::new(cache, remote, options))
}
