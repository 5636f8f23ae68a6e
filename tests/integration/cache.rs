use crate::shared::MockRemote;

use dropfs::{ContentCache, FsError, RemoteRoot};
use std::io::Read;
use tempfile::TempDir;

fn cache() -> (TempDir, ContentCache) {
    let temp = TempDir::new().unwrap();
    let cache = ContentCache::new(temp.path().join("content")).unwrap();
    (temp, cache)
}

#[test]
fn test_open_for_read_downloads_into_nested_dirs() {
    let (_temp, cache) = cache();
    let remote = MockRemote::new();
    remote.add_file("/a/b/c.txt", b"nested");

    let mut cached = cache
        .open_for_read("/a/b/c.txt", &remote, RemoteRoot::Dropbox)
        .unwrap();
    assert!(cached.downloaded.is_some());
    let mut content = String::new();
    cached.file.read_to_string(&mut content).unwrap();
    assert_eq!(content, "nested");
    assert!(cache.root().join("a/b/c.txt").is_file());

    let again = cache
        .open_for_read("/a/b/c.txt", &remote, RemoteRoot::Dropbox)
        .unwrap();
    assert!(again.downloaded.is_none());
    assert_eq!(remote.downloads(), 1);
}

#[test]
fn test_open_for_read_missing_remote_object() {
    let (_temp, cache) = cache();
    let remote = MockRemote::new();
    let err = cache
        .open_for_read("/nope.txt", &remote, RemoteRoot::Dropbox)
        .unwrap_err();
    assert!(matches!(err, FsError::NotFound(_)));
    assert_eq!(cache.usage().unwrap().files, 0);
}

#[test]
fn test_invalidate_is_idempotent() {
    let (_temp, cache) = cache();
    cache.write_local("/x.txt", 0, b"x").unwrap();
    assert!(cache.invalidate("/x.txt").unwrap());
    assert!(!cache.invalidate("/x.txt").unwrap());
    assert!(!cache.contains("/x.txt"));
}

#[test]
fn test_invalidate_tree_and_clear() {
    let (_temp, cache) = cache();
    cache.write_local("/d/one", 0, b"1").unwrap();
    cache.write_local("/d/sub/two", 0, b"22").unwrap();
    cache.write_local("/three", 0, b"333").unwrap();

    assert_eq!(
        cache.usage().unwrap(),
        dropfs::CacheUsage { files: 3, bytes: 6 }
    );

    assert!(cache.invalidate_tree("/d").unwrap());
    assert!(!cache.contains("/d/sub/two"));
    assert!(cache.contains("/three"));

    cache.clear().unwrap();
    assert_eq!(cache.usage().unwrap().files, 0);
    assert!(cache.root().is_dir());
}

#[test]
fn test_relocate_replaces_target() {
    let (_temp, cache) = cache();
    cache.write_local("/from.txt", 0, b"moving").unwrap();
    cache.write_local("/to.txt", 0, b"stale").unwrap();

    cache.relocate("/from.txt", "/dir/to.txt").unwrap();
    assert!(!cache.contains("/from.txt"));
    assert_eq!(
        std::fs::read(cache.local_path("/dir/to.txt").unwrap()).unwrap(),
        b"moving"
    );

    // nothing cached at the source is fine
    cache.relocate("/ghost", "/to.txt").unwrap();
    assert!(!cache.contains("/to.txt"));
}

#[test]
fn test_write_uploads_whole_file() {
    let (_temp, cache) = cache();
    let remote = MockRemote::new();
    remote.add_file("/w.txt", b"0123456789");
    cache
        .open_for_read("/w.txt", &remote, RemoteRoot::Dropbox)
        .unwrap();

    let metadata = cache
        .write("/w.txt", 2, b"ab", &remote, RemoteRoot::Dropbox)
        .unwrap();
    assert_eq!(metadata.size, Some(10));
    assert_eq!(remote.content("/w.txt").unwrap(), b"01ab456789");
}

#[test]
fn test_create_file_keeps_owner_write() {
    use std::os::unix::fs::PermissionsExt;

    let (_temp, cache) = cache();
    let remote = MockRemote::new();
    cache
        .create_file("/ro.txt", 0o444, &remote, RemoteRoot::Dropbox)
        .unwrap();
    let mode = std::fs::metadata(cache.local_path("/ro.txt").unwrap())
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o600, 0o600);
    assert!(remote.exists("/ro.txt"));
}

#[test]
fn test_paths_cannot_escape_cache_root() {
    let (_temp, cache) = cache();
    assert!(cache.local_path("/../etc/passwd").is_err());
    assert!(cache.local_path("/a/./b").is_err());
}
