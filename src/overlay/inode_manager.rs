use fuser::FUSE_ROOT_ID;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;

use crate::cache::paths::{is_descendant, rebase};

#[derive(Default)]
struct InodeTable {
    paths: HashMap<u64, String>,
    inodes: HashMap<String, u64>,
}

impl InodeTable {
    fn insert(&mut self, ino: u64, path: String) {
        self.inodes.insert(path.clone(), ino);
        self.paths.insert(ino, path);
    }
}

/// Stable inode numbers for the paths the kernel has seen.
///
/// The overlay itself is path based; this table only exists because the
/// kernel addresses everything by inode.
pub struct InodeManager {
    table: RwLock<InodeTable>,
    next_ino: Mutex<u64>,
}

impl InodeManager {
    pub fn new() -> Self {
        let mut table = InodeTable::default();
        table.insert(FUSE_ROOT_ID, "/".to_string());
        InodeManager {
            table: RwLock::new(table),
            // FUSE reserves inode 1 for the root directory
            next_ino: Mutex::new(FUSE_ROOT_ID + 1),
        }
    }

    fn alloc_inode(&self) -> u64 {
        let mut next = self.next_ino.lock();
        let ino = *next;
        *next = next.wrapping_add(1);
        ino
    }

    pub fn path_of(&self, ino: u64) -> Option<String> {
        self.table.read().paths.get(&ino).cloned()
    }

    /// Inode for `path`, allocating one the first time the path is seen.
    pub fn ino_for(&self, path: &str) -> u64 {
        if let Some(ino) = self.table.read().inodes.get(path) {
            return *ino;
        }
        let mut table = self.table.write();
        if let Some(ino) = table.inodes.get(path) {
            return *ino;
        }
        let ino = self.alloc_inode();
        table.insert(ino, path.to_string());
        ino
    }

    /// Drop `path` and everything below it.
    pub fn forget_path(&self, path: &str) {
        let mut table = self.table.write();
        let doomed: Vec<(String, u64)> = table
            .inodes
            .iter()
            .filter(|(p, _)| p.as_str() == path || is_descendant(p, path))
            .map(|(p, ino)| (p.clone(), *ino))
            .collect();
        for (p, ino) in doomed {
            if ino == FUSE_ROOT_ID {
                continue;
            }
            table.inodes.remove(&p);
            table.paths.remove(&ino);
        }
    }

    /// Move `from` and its descendants to `to`, keeping their inode numbers.
    pub fn rename(&self, from: &str, to: &str) {
        self.forget_path(to);
        let mut table = self.table.write();
        let moved: Vec<(String, String, u64)> = table
            .inodes
            .iter()
            .filter_map(|(p, ino)| rebase(p, from, to).map(|new| (p.clone(), new, *ino)))
            .collect();
        for (old, new, ino) in moved {
            table.inodes.remove(&old);
            table.insert(ino, new);
        }
    }

    pub fn len(&self) -> usize {
        self.table.read().paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InodeManager {
    fn default() -> Self {
        Self::new()
    }
}
