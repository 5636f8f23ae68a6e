use dropfs::config::{get_config_path, load_config, save_config, Config};
use dropfs::RemoteRoot;
use std::sync::{Mutex, MutexGuard};
use tempfile::TempDir;

// DROPFS_CONFIG_DIR is process-wide, so tests touching it take turns.
static ENV_LOCK: Mutex<()> = Mutex::new(());

struct TestConfigContext {
    dir: TempDir,
    _guard: MutexGuard<'static, ()>,
}

impl TestConfigContext {
    fn new() -> Self {
        let guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = TempDir::new().unwrap();
        std::env::set_var("DROPFS_CONFIG_DIR", dir.path());
        TestConfigContext { dir, _guard: guard }
    }
}

impl Drop for TestConfigContext {
    fn drop(&mut self) {
        std::env::remove_var("DROPFS_CONFIG_DIR");
    }
}

#[test]
fn test_missing_config_gives_defaults() {
    let ctx = TestConfigContext::new();
    assert_eq!(get_config_path().unwrap(), ctx.dir.path().join("config.toml"));

    let config = load_config().unwrap();
    assert_eq!(config.remote.root, RemoteRoot::Dropbox);
    assert_eq!(config.remote.get_api_url(), "https://api.dropbox.com");
    assert!(config.cache.cache_root.is_none());
    assert!(config.fuse.get_auto_unmount());
}

#[test]
fn test_save_then_load() {
    let _ctx = TestConfigContext::new();

    let mut config = Config::default();
    config.remote.root = RemoteRoot::Sandbox;
    config.cache.cache_root = Some("/var/cache/dropfs".to_string());
    config.cache.index_buckets = Some(64);
    config.fuse.ttl_secs = Some(5);
    save_config(&config).unwrap();

    let loaded = load_config().unwrap();
    assert_eq!(loaded.remote.root, RemoteRoot::Sandbox);
    assert_eq!(loaded.cache.cache_root.as_deref(), Some("/var/cache/dropfs"));
    assert_eq!(loaded.cache.get_index_buckets(), 64);
    assert_eq!(loaded.fuse.get_ttl_secs(), 5);
}

#[test]
fn test_partial_file_fills_in_defaults() {
    let ctx = TestConfigContext::new();
    std::fs::write(
        ctx.dir.path().join("config.toml"),
        "[log]\nfilter = \"dropfs=debug\"\n",
    )
    .unwrap();

    let config = load_config().unwrap();
    assert_eq!(config.log.get_filter(), "dropfs=debug");
    assert_eq!(config.fuse.get_ttl_secs(), 1);
}

#[test]
fn test_unparseable_config_is_an_error() {
    let ctx = TestConfigContext::new();
    std::fs::write(ctx.dir.path().join("config.toml"), "[remote\nroot = ").unwrap();

    let err = load_config().unwrap_err();
    assert!(err.to_string().contains("parse"), "unexpected error: {}", err);
}

#[test]
fn test_invalid_values_are_rejected() {
    let ctx = TestConfigContext::new();
    std::fs::write(
        ctx.dir.path().join("config.toml"),
        "[cache]\nindex_buckets = 0\n",
    )
    .unwrap();

    let err = load_config().unwrap_err();
    assert!(err.to_string().contains("index_buckets"));
}
