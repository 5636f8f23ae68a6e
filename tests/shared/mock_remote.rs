//! In-memory stand-in for the remote storage service.
//!
//! Keeps a flat map of path to entry, hands out increasing revisions on
//! every change, counts calls per operation and can be told to fail.
//! Deleted entries stay behind as tombstones and show up in listings.

use dropfs::{Metadata, MetadataOptions, OverwritePolicy, RemoteError, RemoteResult, RemoteRoot, RemoteStorage};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Debug, Clone)]
struct Entry {
    is_dir: bool,
    content: Vec<u8>,
    rev: u64,
    deleted: bool,
}

#[derive(Default)]
struct Tree {
    entries: BTreeMap<String, Entry>,
    next_rev: u64,
}

impl Tree {
    fn bump(&mut self) -> u64 {
        self.next_rev += 1;
        self.next_rev
    }

    fn live(&self, path: &str) -> Option<&Entry> {
        self.entries.get(path).filter(|e| !e.deleted)
    }

    fn put(&mut self, path: &str, is_dir: bool, content: Vec<u8>) -> u64 {
        self.ensure_parents(path);
        let rev = self.bump();
        self.entries.insert(
            path.to_string(),
            Entry {
                is_dir,
                content,
                rev,
                deleted: false,
            },
        );
        rev
    }

    fn ensure_parents(&mut self, path: &str) {
        let mut parent = parent_of(path);
        let mut missing = Vec::new();
        while parent != "/" && self.live(parent).is_none() {
            missing.push(parent.to_string());
            parent = parent_of(parent);
        }
        for dir in missing.into_iter().rev() {
            let rev = self.bump();
            self.entries.insert(
                dir,
                Entry {
                    is_dir: true,
                    content: Vec::new(),
                    rev,
                    deleted: false,
                },
            );
        }
    }

    fn subtree(&self, path: &str) -> Vec<String> {
        let prefix = format!("{}/", path);
        self.entries
            .keys()
            .filter(|p| p.as_str() == path || p.starts_with(&prefix))
            .cloned()
            .collect()
    }

    fn metadata(&self, path: &str, entry: &Entry) -> Metadata {
        let rev = format!("r{}", entry.rev);
        let mut metadata = if entry.is_dir {
            Metadata::directory(path, rev)
        } else {
            Metadata::file(path, entry.content.len() as u64, rev)
        };
        if entry.deleted {
            metadata = metadata.deleted();
        }
        metadata
    }
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

type ListingHook = Box<dyn FnOnce() + Send>;

#[derive(Default)]
pub struct MockRemote {
    tree: Mutex<Tree>,
    fetches: AtomicUsize,
    downloads: AtomicUsize,
    uploads: AtomicUsize,
    fail_uploads: AtomicBool,
    fail_downloads: AtomicBool,
    fail_everything: AtomicBool,
    listing_hook: Mutex<Option<ListingHook>>,
}

#[allow(dead_code)]
impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, path: &str, content: &[u8]) -> String {
        format!("r{}", self.tree.lock().put(path, false, content.to_vec()))
    }

    pub fn add_dir(&self, path: &str) -> String {
        format!("r{}", self.tree.lock().put(path, true, Vec::new()))
    }

    /// Change a file behind the overlay's back.
    pub fn set_content(&self, path: &str, content: &[u8]) -> String {
        self.add_file(path, content)
    }

    /// Delete behind the overlay's back, leaving a tombstone.
    pub fn delete_remotely(&self, path: &str) {
        let mut tree = self.tree.lock();
        for p in tree.subtree(path) {
            if let Some(entry) = tree.entries.get_mut(&p) {
                entry.deleted = true;
            }
        }
    }

    /// Drop an entry without a trace.
    pub fn vanish(&self, path: &str) {
        let mut tree = self.tree.lock();
        for p in tree.subtree(path) {
            tree.entries.remove(&p);
        }
    }

    pub fn content(&self, path: &str) -> Option<Vec<u8>> {
        self.tree.lock().live(path).map(|e| e.content.clone())
    }

    pub fn revision(&self, path: &str) -> Option<String> {
        self.tree.lock().live(path).map(|e| format!("r{}", e.rev))
    }

    pub fn exists(&self, path: &str) -> bool {
        self.tree.lock().live(path).is_some()
    }

    pub fn is_tombstone(&self, path: &str) -> bool {
        self.tree.lock().entries.get(path).is_some_and(|e| e.deleted)
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_downloads(&self, fail: bool) {
        self.fail_downloads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_everything(&self, fail: bool) {
        self.fail_everything.store(fail, Ordering::SeqCst);
    }

    fn lookup(&self, path: &str, options: &MetadataOptions) -> RemoteResult<Metadata> {
        let tree = self.tree.lock();
        if path == "/" {
            let root = Metadata::directory("/", "r0");
            return Ok(if options.list {
                root.with_children(listing(&tree, "/"))
            } else {
                root
            });
        }

        let entry = tree.entries.get(path).ok_or(RemoteError::Status(404))?;
        let metadata = tree.metadata(path, entry);
        if options.list && entry.is_dir && !entry.deleted {
            Ok(metadata.with_children(listing(&tree, path)))
        } else {
            Ok(metadata)
        }
    }

    /// Run `hook` once, right after the next listing has been read from the
    /// tree and before it is returned to the caller.
    pub fn on_next_listing(&self, hook: impl FnOnce() + Send + 'static) {
        *self.listing_hook.lock() = Some(Box::new(hook));
    }

    fn check_available(&self) -> RemoteResult<()> {
        if self.fail_everything.load(Ordering::SeqCst) {
            return Err(RemoteError::Transport("connection refused".to_string()));
        }
        Ok(())
    }
}

impl RemoteStorage for MockRemote {
    fn fetch_metadata(
        &self,
        _root: RemoteRoot,
        path: &str,
        options: &MetadataOptions,
    ) -> RemoteResult<Metadata> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let result = self.lookup(path, options);
        if options.list {
            let hook = self.listing_hook.lock().take();
            if let Some(hook) = hook {
                hook();
            }
        }
        result
    }

    fn create_folder(&self, _root: RemoteRoot, path: &str) -> RemoteResult<Metadata> {
        self.check_available()?;
        let mut tree = self.tree.lock();
        if path == "/" || tree.live(path).is_some() {
            return Err(RemoteError::Status(403));
        }
        tree.put(path, true, Vec::new());
        let entry = tree.entries[path].clone();
        Ok(tree.metadata(path, &entry))
    }

    fn delete(&self, _root: RemoteRoot, path: &str) -> RemoteResult<Metadata> {
        self.check_available()?;
        let mut tree = self.tree.lock();
        let Some(entry) = tree.live(path).cloned() else {
            return Err(RemoteError::Status(404));
        };
        for p in tree.subtree(path) {
            if let Some(e) = tree.entries.get_mut(&p) {
                e.deleted = true;
            }
        }
        Ok(tree.metadata(path, &entry).deleted())
    }

    fn move_entry(&self, _root: RemoteRoot, from: &str, to: &str) -> RemoteResult<Metadata> {
        self.check_available()?;
        let mut tree = self.tree.lock();
        if tree.live(from).is_none() {
            return Err(RemoteError::Status(404));
        }
        if tree.live(to).is_some() {
            return Err(RemoteError::Status(403));
        }
        tree.ensure_parents(to);
        for old in tree.subtree(from) {
            let Some(mut entry) = tree.entries.remove(&old) else {
                continue;
            };
            if entry.deleted {
                continue;
            }
            entry.rev = tree.bump();
            let new = format!("{}{}", to, &old[from.len()..]);
            tree.entries.insert(new, entry);
        }
        let entry = tree.entries[to].clone();
        Ok(tree.metadata(to, &entry))
    }

    fn upload_file(
        &self,
        _root: RemoteRoot,
        path: &str,
        mut content: File,
        _overwrite: OverwritePolicy,
    ) -> RemoteResult<Metadata> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(RemoteError::Transport("upload interrupted".to_string()));
        }
        let mut bytes = Vec::new();
        content
            .read_to_end(&mut bytes)
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        let mut tree = self.tree.lock();
        if tree.live(path).is_some_and(|e| e.is_dir) {
            return Err(RemoteError::Status(403));
        }
        tree.put(path, false, bytes);
        let entry = tree.entries[path].clone();
        Ok(tree.metadata(path, &entry))
    }

    fn download_file(
        &self,
        _root: RemoteRoot,
        path: &str,
        sink: &mut dyn Write,
    ) -> RemoteResult<Metadata> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let (metadata, content) = {
            let tree = self.tree.lock();
            let entry = tree
                .live(path)
                .filter(|e| !e.is_dir)
                .ok_or(RemoteError::Status(404))?;
            (tree.metadata(path, entry), entry.content.clone())
        };
        if self.fail_downloads.load(Ordering::SeqCst) {
            // half a transfer, then the connection drops
            let _ = sink.write_all(&content[..content.len() / 2]);
            return Err(RemoteError::Transport("connection reset".to_string()));
        }
        sink.write_all(&content)
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        Ok(metadata)
    }
}

fn listing(tree: &Tree, dir: &str) -> Vec<Metadata> {
    tree.entries
        .iter()
        .filter(|(path, _)| path.as_str() != "/" && parent_of(path) == dir)
        .map(|(path, entry)| tree.metadata(path, entry))
        .collect()
}
