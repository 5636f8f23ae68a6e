use dashmap::DashMap;
use parking_lot::{ArcMutexGuard, Mutex, RawMutex};
use std::sync::Arc;

/// Per-path mutual exclusion for the overlay's read-modify-write sequences.
///
/// Whenever more than one path is locked they are taken in sorted order,
/// and always before the index lock. A path's entry only lives while some
/// thread holds or waits on its lock.
#[derive(Default)]
pub struct PathLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

/// Held lock on one path. Dropping it unlocks and forgets the path's
/// mutex once nobody else is queued on it.
pub struct PathGuard<'a> {
    locks: &'a PathLocks,
    path: String,
    guard: Option<ArcMutexGuard<RawMutex, ()>>,
}

impl Drop for PathGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks.release(&self.path);
    }
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, path: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    pub fn lock(&self, path: &str) -> PathGuard<'_> {
        let guard = self.handle(path).lock_arc();
        PathGuard {
            locks: self,
            path: path.to_string(),
            guard: Some(guard),
        }
    }

    pub fn lock_many<'a, I>(&self, paths: I) -> Vec<PathGuard<'_>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut paths: Vec<&str> = paths.into_iter().collect();
        paths.sort_unstable();
        paths.dedup();
        paths.into_iter().map(|path| self.lock(path)).collect()
    }

    pub fn lock_pair(&self, a: &str, b: &str) -> Vec<PathGuard<'_>> {
        self.lock_many([a, b])
    }

    /// Forget the mutex for `path` unless another thread still holds a handle.
    fn release(&self, path: &str) {
        self.locks
            .remove_if(path, |_, lock| Arc::strong_count(lock) == 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
