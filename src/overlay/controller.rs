//! The overlay controller: one short transaction per filesystem call over
//! the path index, the content cache and the remote.
//!
//! Consistency rule: a cache file is only kept while the indexed revision
//! of its path is unchanged. Directory listings are always fetched live and
//! drop cached content whose revision moved.
//!
//! Locking: every operation on a path holds that path's lock for its whole
//! read-modify-write sequence. Operations that add or remove a name also
//! hold the lock of the parent directory, which a listing holds from its
//! fetch to its install. Path locks are always acquired before the index
//! lock and, when several are needed, in sorted order.

use dashmap::DashSet;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use crate::cache::paths::{self, is_descendant, normalize};
use crate::cache::{read_range, ContentCache};
use crate::error::{FsError, FsResult, RemoteError};
use crate::index::PathIndex;
use crate::metadata::{Metadata, Revision};
use crate::overlay::locks::{PathGuard, PathLocks};
use crate::remote::{MetadataOptions, RemoteRoot, RemoteStorage};

/// Number of index buckets used when none is configured.
pub const DEFAULT_INDEX_BUCKETS: usize = 100;

#[derive(Debug, Clone, Copy)]
pub struct OverlayOptions {
    pub root: RemoteRoot,
    pub index_buckets: usize,
}

impl Default for OverlayOptions {
    fn default() -> Self {
        OverlayOptions {
            root: RemoteRoot::Dropbox,
            index_buckets: DEFAULT_INDEX_BUCKETS,
        }
    }
}

/// What `get_attributes` reports for a path.
#[derive(Debug, Clone)]
pub struct Attributes {
    pub metadata: Arc<Metadata>,
    pub size: u64,
    pub modified: Option<SystemTime>,
    /// Stat of the cache file, when the content is cached locally.
    pub local: Option<fs::Metadata>,
}

impl Attributes {
    pub fn is_dir(&self) -> bool {
        self.metadata.is_dir
    }

    pub fn revision(&self) -> &Revision {
        &self.metadata.revision
    }
}

/// Outcome of diffing a listing against the index.
#[derive(Default)]
struct ListingPlan {
    invalidate: Vec<String>,
    evict: Vec<String>,
}

pub struct Overlay {
    index: RwLock<PathIndex<Arc<Metadata>>>,
    cache: ContentCache,
    remote: RwLock<Option<Arc<dyn RemoteStorage>>>,
    root: RemoteRoot,
    locks: PathLocks,
    /// Paths whose local content is ahead of the remote after a failed upload.
    unsynced: DashSet<String>,
    /// Bumped whenever a directory disappears from under its descendants.
    subtree_epoch: AtomicU64,
}

impl Overlay {
    pub fn new(cache: ContentCache, remote: Arc<dyn RemoteStorage>, options: OverlayOptions) -> Self {
        Overlay {
            index: RwLock::new(PathIndex::create(options.index_buckets)),
            cache,
            remote: RwLock::new(Some(remote)),
            root: options.root,
            locks: PathLocks::new(),
            unsynced: DashSet::new(),
            subtree_epoch: AtomicU64::new(0),
        }
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    pub fn root(&self) -> RemoteRoot {
        self.root
    }

    fn remote(&self) -> FsResult<Arc<dyn RemoteStorage>> {
        self.remote
            .read()
            .clone()
            .ok_or(FsError::RemoteTransportFailure(RemoteError::Released))
    }

    fn lookup(&self, path: &str) -> Option<Arc<Metadata>> {
        self.index.read().get(path).cloned()
    }

    /// Replace the entry for `path`, dropping any listing payload.
    fn install(&self, path: &str, metadata: Metadata) -> Arc<Metadata> {
        let (bare, _) = metadata.split_children();
        let entry = Arc::new(bare);
        self.index.write().set(path, Arc::clone(&entry)).dispose();
        entry
    }

    fn evict_descendants(index: &mut PathIndex<Arc<Metadata>>, dir: &str) {
        let mut doomed = Vec::new();
        index.for_each(|path, _| {
            if is_descendant(path, dir) {
                doomed.push(path.to_string());
            }
            ControlFlow::Continue(())
        });
        for path in doomed {
            index.remove(&path).dispose();
        }
    }

    fn indexed_children(&self, dir: &str) -> HashMap<String, Arc<Metadata>> {
        let mut children = HashMap::new();
        self.index.read().for_each(|path, entry| {
            if path != dir && paths::parent(path) == dir {
                children.insert(path.to_string(), Arc::clone(entry));
            }
            ControlFlow::Continue(())
        });
        children
    }

    /// Lock `path` together with the directory that names it.
    fn lock_with_parent(&self, path: &str) -> Vec<PathGuard<'_>> {
        self.locks.lock_pair(paths::parent(path), path)
    }

    pub fn is_indexed(&self, path: &str) -> bool {
        self.index.read().exists(normalize(path))
    }

    /// Indexed metadata for `path` without contacting the remote.
    pub fn cached_metadata(&self, path: &str) -> Option<Arc<Metadata>> {
        self.lookup(normalize(path))
    }

    pub fn index_count(&self) -> usize {
        self.index.read().count()
    }

    /// Paths with a live lock entry, held or waited on right now.
    pub fn locked_path_count(&self) -> usize {
        self.locks.len()
    }

    pub fn is_unsynced(&self, path: &str) -> bool {
        self.unsynced.contains(normalize(path))
    }

    pub fn unsynced_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.unsynced.iter().map(|p| p.key().clone()).collect();
        paths.sort();
        paths
    }

    fn attributes_for(&self, path: &str, metadata: Arc<Metadata>) -> Attributes {
        let local = if metadata.is_dir {
            None
        } else {
            self.cache.stat(path)
        };
        let size = match &local {
            Some(stat) if self.unsynced.contains(path) => stat.len(),
            _ => metadata.size_bytes(),
        };
        let local_mtime = local.as_ref().and_then(|stat| stat.modified().ok());
        let modified = match (metadata.modified, local_mtime) {
            (Some(remote), Some(local)) => Some(remote.max(local)),
            (remote, local) => remote.or(local),
        };

        Attributes {
            metadata,
            size,
            modified,
            local,
        }
    }

    pub fn get_attributes(&self, path: &str) -> FsResult<Attributes> {
        let path = normalize(path);
        let _guard = self.locks.lock(path);

        let metadata = match self.lookup(path) {
            Some(metadata) => metadata,
            None => {
                tracing::trace!("getattr miss: {}", path);
                let fetched = self
                    .remote()?
                    .fetch_metadata(self.root, path, &MetadataOptions::default())
                    .map_err(|e| FsError::from_remote(path, e))?;
                if fetched.is_deleted {
                    tracing::debug!("{} is a tombstone", path);
                    return Err(FsError::NotFound(path.to_string()));
                }
                self.install(path, fetched)
            }
        };

        Ok(self.attributes_for(path, metadata))
    }

    pub fn access(&self, path: &str) -> FsResult<()> {
        self.get_attributes(path).map(|_| ())
    }

    /// List `dir` from the remote and reconcile the index with the result.
    ///
    /// The directory stays locked from the fetch to the install, so no name
    /// under it is added or removed in between. Children whose index entry
    /// changed while the listing was in flight keep that entry: it is at
    /// least as recent as the listing. Nothing is installed if a step fails.
    pub fn list_directory(&self, dir: &str) -> FsResult<Vec<Arc<Metadata>>> {
        let dir = normalize(dir);
        tracing::debug!("list_directory({})", dir);

        let _dir_guard = self.locks.lock(dir);
        let epoch = self.subtree_epoch.load(Ordering::SeqCst);
        let before = self.indexed_children(dir);

        let listing = self
            .remote()?
            .fetch_metadata(self.root, dir, &MetadataOptions::listing())
            .map_err(|e| FsError::from_remote(dir, e))?;
        if listing.is_deleted {
            return Err(FsError::NotFound(dir.to_string()));
        }

        let (dir_metadata, children) = listing.split_children();
        let listed: Vec<(String, Metadata)> = children
            .into_iter()
            .map(|child| (paths::join(dir, child.name()), child))
            .collect();
        let listed_paths: HashSet<&str> = listed.iter().map(|(p, _)| p.as_str()).collect();
        let vanished: Vec<&str> = before
            .keys()
            .map(String::as_str)
            .filter(|p| !listed_paths.contains(p))
            .collect();

        // children sort after their directory, so the order stays global
        let _child_guards = self
            .locks
            .lock_many(listed_paths.iter().copied().chain(vanished.iter().copied()));

        let (plan, raced) = {
            let index = self.index.read();
            let untouched = |path: &str| match (before.get(path), index.get(path)) {
                (Some(seen), Some(now)) => Arc::ptr_eq(seen, now),
                (None, None) => true,
                _ => false,
            };
            let mut plan = ListingPlan::default();
            let mut raced: HashSet<String> = HashSet::new();
            for (child_path, child) in &listed {
                if self.unsynced.contains(child_path) {
                    tracing::debug!("keeping unsynced {}", child_path);
                    continue;
                }
                if !untouched(child_path.as_str()) {
                    tracing::debug!("{} changed during the listing, keeping it", child_path);
                    raced.insert(child_path.clone());
                    continue;
                }
                if child.is_deleted {
                    plan.evict.push(child_path.clone());
                    continue;
                }
                let changed = match index.get(child_path) {
                    Some(previous) => previous.revision != child.revision,
                    // leftover from an earlier mount: nothing vouches for it
                    None => self.cache.contains(child_path),
                };
                if changed && !child.is_dir {
                    plan.invalidate.push(child_path.clone());
                }
            }
            for &path in &vanished {
                if index.exists(path) && untouched(path) && !self.unsynced.contains(path) {
                    plan.evict.push(path.to_string());
                }
            }
            (plan, raced)
        };

        for path in &plan.invalidate {
            self.cache.invalidate(path)?;
        }
        for path in &plan.evict {
            self.cache.invalidate_tree(path)?;
        }

        let mut entries = Vec::with_capacity(listed.len());
        {
            let mut index = self.index.write();
            if self.subtree_epoch.load(Ordering::SeqCst) != epoch {
                // an ancestor was removed or moved meanwhile; the listing may
                // describe a directory that no longer exists at this path
                tracing::debug!("{} moved during the listing, not indexing it", dir);
                return Ok(listed
                    .into_iter()
                    .filter(|(_, child)| !child.is_deleted)
                    .map(|(_, child)| Arc::new(child.split_children().0))
                    .collect());
            }
            for path in &plan.evict {
                tracing::debug!("evicting {}", path);
                index.remove(path).dispose();
                Self::evict_descendants(&mut index, path);
            }
            for (child_path, child) in listed {
                if self.unsynced.contains(&child_path) || raced.contains(&child_path) {
                    if let Some(kept) = index.get(&child_path) {
                        entries.push(Arc::clone(kept));
                    }
                    continue;
                }
                if child.is_deleted {
                    continue;
                }
                let (bare, _) = child.split_children();
                let entry = Arc::new(bare);
                index.set(&child_path, Arc::clone(&entry)).dispose();
                entries.push(entry);
            }
            index.set(dir, Arc::new(dir_metadata)).dispose();
        }

        Ok(entries)
    }

    pub fn create_directory(&self, path: &str) -> FsResult<Arc<Metadata>> {
        let path = normalize(path);
        let _guards = self.lock_with_parent(path);

        let created = self
            .remote()?
            .create_folder(self.root, path)
            .map_err(|e| FsError::from_remote(path, e))?;
        Ok(self.install(path, created))
    }

    fn delete_entry(&self, path: &str, subtree: bool) -> FsResult<()> {
        let path = normalize(path);
        let _guards = self.lock_with_parent(path);

        self.remote()?
            .delete(self.root, path)
            .map_err(|e| FsError::from_remote(path, e))?;

        {
            let mut index = self.index.write();
            index.remove(path).dispose();
            if subtree {
                self.subtree_epoch.fetch_add(1, Ordering::SeqCst);
                Self::evict_descendants(&mut index, path);
            }
        }
        self.unsynced.remove(path);
        if subtree {
            self.unsynced.retain(|p| !is_descendant(p, path));
            self.cache.invalidate_tree(path)?;
        } else {
            self.cache.invalidate(path)?;
        }
        Ok(())
    }

    pub fn remove(&self, path: &str) -> FsResult<()> {
        tracing::debug!("remove({})", path);
        self.delete_entry(path, false)
    }

    pub fn remove_directory(&self, path: &str) -> FsResult<()> {
        tracing::debug!("remove_directory({})", path);
        self.delete_entry(path, true)
    }

    pub fn rename(&self, from: &str, to: &str) -> FsResult<Arc<Metadata>> {
        let from = normalize(from);
        let to = normalize(to);
        tracing::debug!("rename({} -> {})", from, to);
        let _guards = self
            .locks
            .lock_many([paths::parent(from), from, paths::parent(to), to]);

        let moved = self
            .remote()?
            .move_entry(self.root, from, to)
            .map_err(|e| match e.status() {
                Some(403) | Some(409) => FsError::AlreadyExists(to.to_string()),
                _ => FsError::from_remote(from, e),
            })?;

        let entry = {
            let mut index = self.index.write();
            if moved.is_dir {
                self.subtree_epoch.fetch_add(1, Ordering::SeqCst);
            }
            index.remove(from).dispose();
            // descendants are re-fetched under their new paths on demand
            Self::evict_descendants(&mut index, from);
            Self::evict_descendants(&mut index, to);
            let (bare, _) = moved.split_children();
            let entry = Arc::new(bare);
            index.set(to, Arc::clone(&entry)).dispose();
            entry
        };

        if self.unsynced.remove(from).is_some() {
            self.unsynced.insert(to.to_string());
        }
        self.cache.relocate(from, to)?;
        Ok(entry)
    }

    /// Make sure the content of `path` is cached. Caller holds the path lock.
    fn materialize(&self, path: &str) -> FsResult<File> {
        let metadata = self
            .lookup(path)
            .ok_or_else(|| FsError::NotFound(path.to_string()))?;
        if metadata.is_dir {
            return Err(FsError::LocalIo(io::Error::from_raw_os_error(libc::EISDIR)));
        }

        let remote = self.remote()?;
        let cached = self.cache.open_for_read(path, remote.as_ref(), self.root)?;
        if let Some(fresh) = cached.downloaded {
            self.install(path, fresh);
        }
        Ok(cached.file)
    }

    pub fn open_for_read(&self, path: &str) -> FsResult<File> {
        let path = normalize(path);
        let _guard = self.locks.lock(path);
        self.materialize(path)
    }

    pub fn read(&self, path: &str, offset: u64, len: usize) -> FsResult<Vec<u8>> {
        let file = self.open_for_read(path)?;
        Ok(read_range(&file, offset, len)?)
    }

    pub fn create_file(&self, path: &str, mode: u32) -> FsResult<Arc<Metadata>> {
        let path = normalize(path);
        let _guards = self.lock_with_parent(path);

        if self.index.read().exists(path) {
            return Err(FsError::AlreadyExists(path.to_string()));
        }
        let remote = self.remote()?;
        let created = self
            .cache
            .create_file(path, mode, remote.as_ref(), self.root)?;
        self.unsynced.remove(path);
        Ok(self.install(path, created))
    }

    /// Install the result of an upload, or remember that the local copy of
    /// `path` is ahead of the remote when the upload failed.
    fn record_upload(&self, path: &str, uploaded: FsResult<Metadata>) -> FsResult<Arc<Metadata>> {
        match uploaded {
            Ok(metadata) => {
                if self.unsynced.remove(path).is_some() {
                    tracing::info!("{} is back in sync", path);
                }
                Ok(self.install(path, metadata))
            }
            Err(FsError::LocalIo(e)) => Err(FsError::LocalIo(e)),
            Err(e) => {
                tracing::warn!("Upload of {} failed, keeping local changes: {}", path, e);
                self.unsynced.insert(path.to_string());
                Err(e)
            }
        }
    }

    /// Upload the local copy of `path`. Caller holds the path lock.
    fn sync_locked(&self, path: &str) -> FsResult<Arc<Metadata>> {
        let remote = self.remote()?;
        let uploaded = self.cache.upload(path, remote.as_ref(), self.root);
        self.record_upload(path, uploaded)
    }

    /// Write locally, then upload the whole file.
    ///
    /// When the upload fails the local write stays applied, the path is
    /// marked unsynced and the error is returned. The next successful
    /// upload of the path clears the mark.
    pub fn write(&self, path: &str, offset: u64, data: &[u8]) -> FsResult<usize> {
        let path = normalize(path);
        let _guard = self.locks.lock(path);

        if !self.cache.contains(path) {
            self.materialize(path)?;
        } else if !self.index.read().exists(path) {
            return Err(FsError::NotFound(path.to_string()));
        }

        let remote = self.remote()?;
        let uploaded = self
            .cache
            .write(path, offset, data, remote.as_ref(), self.root);
        self.record_upload(path, uploaded)?;
        Ok(data.len())
    }

    pub fn truncate(&self, path: &str, size: u64) -> FsResult<Arc<Metadata>> {
        let path = normalize(path);
        let _guard = self.locks.lock(path);

        if !self.index.read().exists(path) {
            return Err(FsError::NotFound(path.to_string()));
        }
        // truncating to zero needs none of the old content
        if size > 0 && !self.cache.contains(path) {
            self.materialize(path)?;
        }
        self.cache.truncate(path, size)?;
        self.sync_locked(path)
    }

    /// Retry the upload of a path left unsynced by an earlier failure.
    pub fn flush(&self, path: &str) -> FsResult<()> {
        let path = normalize(path);
        if !self.unsynced.contains(path) {
            return Ok(());
        }
        let _guard = self.locks.lock(path);
        if !self.unsynced.contains(path) {
            return Ok(());
        }
        self.sync_locked(path).map(|_| ())
    }

    /// Drop every index entry and release the remote client.
    ///
    /// Returns the number of entries disposed. Later operations that need
    /// the remote fail with [`RemoteError::Released`].
    pub fn teardown(&self) -> usize {
        let drained = self.index.write().drain();
        let count = drained.len();
        drop(drained);

        self.remote.write().take();

        let pending = self.unsynced.len();
        if pending > 0 {
            tracing::warn!("{} path(s) were never uploaded: {:?}", pending, self.unsynced_paths());
        }
        tracing::info!("Overlay torn down, {} index entries disposed", count);
        count
    }
}
