use crate::shared::TestOverlay;

use dropfs::FsError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Barrier};
use std::thread;
use std::time::Duration;

#[test]
fn test_concurrent_first_reads_download_once() {
    let t = TestOverlay::new();
    t.remote.add_file("/shared.bin", &[42u8; 64 * 1024]);
    t.overlay.get_attributes("/shared.bin").unwrap();

    let barrier = Arc::new(Barrier::new(8));
    let readers: Vec<_> = (0..8)
        .map(|_| {
            let overlay = Arc::clone(&t.overlay);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                overlay.read("/shared.bin", 0, 64 * 1024).unwrap()
            })
        })
        .collect();

    for reader in readers {
        assert_eq!(reader.join().unwrap().len(), 64 * 1024);
    }
    assert_eq!(t.remote.downloads(), 1);
}

#[test]
fn test_concurrent_misses_install_one_entry() {
    let t = TestOverlay::new();
    t.remote.add_file("/a.txt", b"a");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let overlay = Arc::clone(&t.overlay);
            thread::spawn(move || overlay.get_attributes("/a.txt").map(|a| a.size))
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap().unwrap(), 1);
    }
    assert_eq!(t.overlay.index_count(), 1);
    assert_eq!(t.remote.fetches(), 1, "misses on one path are serialised");
}

#[test]
fn test_concurrent_writes_to_distinct_files() {
    let t = TestOverlay::new();
    for i in 0..8 {
        t.overlay.create_file(&format!("/f{}", i), 0o644).unwrap();
    }

    let writers: Vec<_> = (0..8)
        .map(|i| {
            let overlay = Arc::clone(&t.overlay);
            thread::spawn(move || {
                let path = format!("/f{}", i);
                for round in 0..10u8 {
                    overlay.write(&path, u64::from(round), &[round]).unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    let expected: Vec<u8> = (0..10).collect();
    for i in 0..8 {
        assert_eq!(t.remote.content(&format!("/f{}", i)).unwrap(), expected);
    }
}

#[test]
fn test_opposite_renames_do_not_deadlock() {
    let t = TestOverlay::new();
    t.remote.add_file("/x", b"x");
    t.remote.add_file("/y", b"y");

    let a = {
        let overlay = Arc::clone(&t.overlay);
        thread::spawn(move || {
            for _ in 0..50 {
                let _ = overlay.rename("/x", "/y");
            }
        })
    };
    let b = {
        let overlay = Arc::clone(&t.overlay);
        thread::spawn(move || {
            for _ in 0..50 {
                let _ = overlay.rename("/y", "/x");
            }
        })
    };
    a.join().unwrap();
    b.join().unwrap();
}

#[test]
fn test_remove_racing_a_listing_stays_removed() {
    let t = TestOverlay::new();
    t.remote.add_file("/d/x", b"x");
    t.remote.add_file("/d/y", b"y");

    let (sender, receiver) = mpsc::channel();
    let overlay = Arc::clone(&t.overlay);
    t.remote.on_next_listing(move || {
        let remover = thread::spawn(move || overlay.remove("/d/x"));
        // give the removal every chance to land before the listing installs
        thread::sleep(Duration::from_millis(50));
        sender.send(remover).unwrap();
    });

    t.overlay.list_directory("/d").unwrap();
    receiver.recv().unwrap().join().unwrap().unwrap();

    assert!(!t.remote.exists("/d/x"));
    assert!(!t.overlay.is_indexed("/d/x"));
    assert!(matches!(
        t.overlay.get_attributes("/d/x"),
        Err(FsError::NotFound(_))
    ));
    assert!(t.overlay.is_indexed("/d/y"));
}

#[test]
fn test_write_racing_a_listing_keeps_the_newer_revision() {
    let t = TestOverlay::new();
    t.remote.add_file("/d/x", b"old");
    t.overlay.list_directory("/d").unwrap();

    let overlay = Arc::clone(&t.overlay);
    t.remote.on_next_listing(move || {
        overlay.write("/d/x", 0, b"NEW").unwrap();
    });
    let listed = t.overlay.list_directory("/d").unwrap();

    let remote_rev = t.remote.revision("/d/x").unwrap();
    assert_eq!(listed[0].revision.as_str(), remote_rev);
    assert_eq!(
        t.overlay.cached_metadata("/d/x").unwrap().revision.as_str(),
        remote_rev
    );
    assert!(t.cache_file("/d/x").is_file(), "fresh write was invalidated");
    assert_eq!(t.read_all("/d/x"), b"NEW");
}

#[test]
fn test_create_racing_a_listing_is_indexed() {
    let t = TestOverlay::new();
    t.remote.add_dir("/d");

    let (sender, receiver) = mpsc::channel();
    let overlay = Arc::clone(&t.overlay);
    t.remote.on_next_listing(move || {
        let creator = thread::spawn(move || overlay.create_file("/d/new", 0o644));
        thread::sleep(Duration::from_millis(50));
        sender.send(creator).unwrap();
    });

    t.overlay.list_directory("/d").unwrap();
    receiver.recv().unwrap().join().unwrap().unwrap();

    assert!(t.overlay.is_indexed("/d/new"));
    assert!(t.remote.exists("/d/new"));
}

#[test]
fn test_listing_under_a_removed_directory_is_discarded() {
    let t = TestOverlay::new();
    t.remote.add_file("/d/sub/z", b"z");
    t.overlay.get_attributes("/d").unwrap();

    let overlay = Arc::clone(&t.overlay);
    t.remote.on_next_listing(move || {
        overlay.remove_directory("/d").unwrap();
    });
    let listed = t.overlay.list_directory("/d/sub").unwrap();

    assert_eq!(listed.len(), 1, "the caller still sees what was fetched");
    assert!(!t.overlay.is_indexed("/d/sub/z"));
    assert!(!t.overlay.is_indexed("/d/sub"));
    assert!(!t.overlay.is_indexed("/d"));
}

/// Readers, listers and mutators race while the remote also changes
/// underneath. Once things settle, a listing followed by a read must match
/// the remote, and the index must agree with the remote on what exists.
#[test]
fn test_stress_reads_listings_and_mutations() {
    let t = TestOverlay::with_buckets(3);
    let files: Vec<String> = (0..6).map(|i| format!("/stress/file-{}", i)).collect();
    for path in &files {
        t.remote.add_file(path, b"initial");
    }
    t.remote.add_file("/stress/moving-a", b"moving");
    t.overlay.list_directory("/stress").unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let mut workers = Vec::new();

    for worker in 0..4 {
        let overlay = Arc::clone(&t.overlay);
        let files = files.clone();
        let stop = Arc::clone(&stop);
        workers.push(thread::spawn(move || {
            let mut n = worker;
            while !stop.load(Ordering::SeqCst) {
                let path = &files[n % files.len()];
                match n % 3 {
                    0 => {
                        overlay.list_directory("/stress").unwrap();
                    }
                    1 => {
                        overlay.get_attributes(path).unwrap();
                    }
                    _ => {
                        overlay.read(path, 0, 64).unwrap();
                    }
                }
                n += 1;
            }
        }));
    }

    {
        let overlay = Arc::clone(&t.overlay);
        let files = files.clone();
        let stop = Arc::clone(&stop);
        workers.push(thread::spawn(move || {
            let mut n = 0usize;
            while !stop.load(Ordering::SeqCst) {
                let path = &files[n % files.len()];
                overlay
                    .write(path, 0, format!("local {}", n).as_bytes())
                    .unwrap();
                n += 1;
            }
        }));
    }

    {
        let overlay = Arc::clone(&t.overlay);
        let stop = Arc::clone(&stop);
        workers.push(thread::spawn(move || {
            while !stop.load(Ordering::SeqCst) {
                let _ = overlay.rename("/stress/moving-a", "/stress/moving-b");
                let _ = overlay.rename("/stress/moving-b", "/stress/moving-a");
                let _ = overlay.create_file("/stress/scratch", 0o644);
                let _ = overlay.remove("/stress/scratch");
            }
        }));
    }

    let mutator = {
        let remote = Arc::clone(&t.remote);
        let files = files.clone();
        thread::spawn(move || {
            for round in 0..200 {
                let path = &files[round % files.len()];
                remote.set_content(path, format!("round {}", round).as_bytes());
            }
        })
    };

    mutator.join().unwrap();
    stop.store(true, Ordering::SeqCst);
    for worker in workers {
        worker.join().unwrap();
    }

    t.overlay.list_directory("/stress").unwrap();
    for path in &files {
        let local = t.overlay.read(path, 0, 64).unwrap();
        assert_eq!(local, t.remote.content(path).unwrap(), "{} diverged", path);
        assert_eq!(
            t.overlay.cached_metadata(path).unwrap().revision.as_str(),
            t.remote.revision(path).unwrap()
        );
    }
    for path in ["/stress/moving-a", "/stress/moving-b", "/stress/scratch"] {
        assert_eq!(
            t.overlay.is_indexed(path),
            t.remote.exists(path),
            "index disagrees with the remote about {}",
            path
        );
    }
    assert!(t.overlay.unsynced_paths().is_empty());
    assert_eq!(t.overlay.locked_path_count(), 0);
}
