use fuser::FileType;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub(crate) struct DirEntry {
    pub ino: u64,
    pub kind: FileType,
    pub name: String,
}

#[derive(Debug, Clone)]
pub(crate) enum FileHandle {
    File { path: String, writable: bool },
    /// Snapshot taken at opendir so one listing serves every readdir call.
    Dir { entries: Vec<DirEntry> },
}

pub(crate) struct FileHandles {
    handles: RwLock<HashMap<u64, FileHandle>>,
    next_fh: Mutex<u64>,
}

impl FileHandles {
    pub fn new() -> Self {
        FileHandles {
            handles: RwLock::new(HashMap::new()),
            next_fh: Mutex::new(1),
        }
    }

    pub fn open(&self, handle: FileHandle) -> u64 {
        let fh = {
            let mut next = self.next_fh.lock();
            let fh = *next;
            *next = next.wrapping_add(1);
            fh
        };
        self.handles.write().insert(fh, handle);
        fh
    }

    pub fn get(&self, fh: u64) -> Option<FileHandle> {
        self.handles.read().get(&fh).cloned()
    }

    pub fn close(&self, fh: u64) -> Option<FileHandle> {
        self.handles.write().remove(&fh)
    }

    /// Point open file handles at their new path after a rename.
    pub fn retarget(&self, from: &str, to: &str) {
        for handle in self.handles.write().values_mut() {
            if let FileHandle::File { path, .. } = handle {
                if let Some(new) = crate::cache::paths::rebase(path, from, to) {
                    *path = new;
                }
            }
        }
    }
}
