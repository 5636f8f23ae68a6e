pub mod controller;
mod convert;
mod file_handle;
pub mod inode_manager;
pub mod locks;
pub mod mount;

pub use controller::{Attributes, Overlay, OverlayOptions, DEFAULT_INDEX_BUCKETS};
pub(crate) use convert::io_error_to_libc;
pub use inode_manager::InodeManager;
pub use mount::{mount_fuse, unmount_fuse, MountOptions};

use convert::{attributes_to_fileattr, file_type};
use file_handle::{DirEntry, FileHandle, FileHandles};

use fuser::{
    FileAttr, Filesystem, KernelConfig, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyWrite, Request, TimeOrNow, FUSE_ROOT_ID,
};
use std::ffi::OsStr;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::cache::paths;
use crate::error::FsError;

/// The kernel-facing side of the overlay. Translates inode based FUSE
/// calls into path based [`Overlay`] operations.
pub struct DropFs {
    overlay: Arc<Overlay>,
    inodes: InodeManager,
    handles: FileHandles,
    ttl: Duration,
    uid: u32,
    gid: u32,
}

impl DropFs {
    pub fn new(overlay: Arc<Overlay>, ttl: Duration) -> Self {
        // SAFETY: getuid/getgid have no preconditions and cannot fail.
        let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
        DropFs {
            overlay,
            inodes: InodeManager::new(),
            handles: FileHandles::new(),
            ttl,
            uid,
            gid,
        }
    }

    fn path_of(&self, ino: u64) -> Result<String, i32> {
        self.inodes.path_of(ino).ok_or(libc::ENOENT)
    }

    fn child_path(&self, parent: u64, name: &OsStr) -> Result<String, i32> {
        let parent_path = self.path_of(parent)?;
        let name = name.to_str().ok_or(libc::EINVAL)?;
        Ok(paths::join(&parent_path, name))
    }

    /// Handle path if the handle is still open, else the inode's path.
    fn handle_path(&self, ino: u64, fh: u64) -> Result<String, i32> {
        match self.handles.get(fh) {
            Some(FileHandle::File { path, .. }) => Ok(path),
            _ => self.path_of(ino),
        }
    }

    fn fail(&self, op: &str, path: &str, err: FsError) -> i32 {
        if matches!(err, FsError::NotFound(_)) {
            self.inodes.forget_path(path);
        }
        if err.is_remote() {
            tracing::warn!("{}({}) failed: {}", op, path, err);
        } else {
            tracing::debug!("{}({}) failed: {}", op, path, err);
        }
        err.errno()
    }

    fn attr_for(&self, path: &str) -> Result<FileAttr, i32> {
        match self.overlay.get_attributes(path) {
            Ok(attrs) => {
                let ino = self.inodes.ino_for(path);
                Ok(attributes_to_fileattr(&attrs, ino, self.uid, self.gid))
            }
            Err(e) => Err(self.fail("getattr", path, e)),
        }
    }

    fn new_file(&self, path: &str, mode: u32) -> Result<FileAttr, i32> {
        self.overlay
            .create_file(path, mode & 0o7777)
            .map_err(|e| self.fail("create", path, e))?;
        self.attr_for(path)
    }

    fn listing_snapshot(&self, ino: u64, path: &str) -> Result<Vec<DirEntry>, i32> {
        let children = self
            .overlay
            .list_directory(path)
            .map_err(|e| self.fail("readdir", path, e))?;

        let parent_ino = if ino == FUSE_ROOT_ID {
            FUSE_ROOT_ID
        } else {
            self.inodes.ino_for(paths::parent(path))
        };
        let mut entries = vec![
            DirEntry {
                ino,
                kind: fuser::FileType::Directory,
                name: ".".to_string(),
            },
            DirEntry {
                ino: parent_ino,
                kind: fuser::FileType::Directory,
                name: "..".to_string(),
            },
        ];
        for child in children {
            let child_path = paths::join(path, child.name());
            entries.push(DirEntry {
                ino: self.inodes.ino_for(&child_path),
                kind: file_type(child.is_dir),
                name: child.name().to_string(),
            });
        }
        Ok(entries)
    }
}

fn offset_of(offset: i64) -> Result<u64, i32> {
    u64::try_from(offset).map_err(|_| libc::EINVAL)
}

impl Filesystem for DropFs {
    fn init(
        &mut self,
        _req: &Request,
        _config: &mut KernelConfig,
    ) -> std::result::Result<(), libc::c_int> {
        tracing::info!(
            "dropfs initialized (root={}, cache={})",
            self.overlay.root(),
            self.overlay.cache().root().display()
        );
        Ok(())
    }

    fn destroy(&mut self) {
        let disposed = self.overlay.teardown();
        tracing::info!("dropfs destroyed ({} index entries disposed)", disposed);
    }

    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        tracing::debug!("lookup(parent={}, name={:?})", parent, name);
        let path = match self.child_path(parent, name) {
            Ok(path) => path,
            Err(e) => return reply.error(e),
        };
        match self.attr_for(&path) {
            Ok(attr) => reply.entry(&self.ttl, &attr, 0),
            Err(e) => reply.error(e),
        }
    }

    fn getattr(&mut self, _req: &Request, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        tracing::debug!("getattr(ino={})", ino);
        let Ok(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.attr_for(&path) {
            Ok(attr) => reply.attr(&self.ttl, &attr),
            Err(e) => reply.error(e),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request,
        ino: u64,
        mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        tracing::debug!("setattr(ino={}, size={:?}, mode={:?})", ino, size, mode);
        let path = match fh.map_or_else(|| self.path_of(ino), |fh| self.handle_path(ino, fh)) {
            Ok(path) => path,
            Err(e) => return reply.error(e),
        };

        if let Some(size) = size {
            if let Err(e) = self.overlay.truncate(&path, size) {
                reply.error(self.fail("truncate", &path, e));
                return;
            }
        }

        // permissions only live on the local copy
        if let Some(mode) = mode {
            if self.overlay.cache().contains(&path) {
                let applied = self
                    .overlay
                    .cache()
                    .local_path(&path)
                    .map_err(|e| e.errno())
                    .and_then(|local| {
                        fs::set_permissions(local, fs::Permissions::from_mode(mode & 0o777))
                            .map_err(|e| io_error_to_libc(&e))
                    });
                if let Err(e) = applied {
                    reply.error(e);
                    return;
                }
            }
        }

        match self.attr_for(&path) {
            Ok(attr) => reply.attr(&self.ttl, &attr),
            Err(e) => reply.error(e),
        }
    }

    fn access(&mut self, _req: &Request, ino: u64, _mask: i32, reply: ReplyEmpty) {
        let Ok(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.overlay.access(&path) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(self.fail("access", &path, e)),
        }
    }

    fn opendir(&mut self, _req: &Request, ino: u64, _flags: i32, reply: ReplyOpen) {
        tracing::debug!("opendir(ino={})", ino);
        let Ok(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.listing_snapshot(ino, &path) {
            Ok(entries) => {
                let fh = self.handles.open(FileHandle::Dir { entries });
                reply.opened(fh, 0);
            }
            Err(e) => reply.error(e),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        tracing::debug!("readdir(ino={}, fh={}, offset={})", ino, fh, offset);
        let Some(FileHandle::Dir { entries }) = self.handles.get(fh) else {
            reply.error(libc::EBADF);
            return;
        };
        let Ok(start) = usize::try_from(offset) else {
            reply.error(libc::EINVAL);
            return;
        };

        for (idx, entry) in entries.iter().enumerate().skip(start) {
            if reply.add(entry.ino, (idx + 1) as i64, entry.kind, &entry.name) {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(&mut self, _req: &Request, _ino: u64, fh: u64, _flags: i32, reply: ReplyEmpty) {
        self.handles.close(fh);
        reply.ok();
    }

    fn mkdir(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        tracing::debug!("mkdir(parent={}, name={:?})", parent, name);
        let path = match self.child_path(parent, name) {
            Ok(path) => path,
            Err(e) => return reply.error(e),
        };
        if let Err(e) = self.overlay.create_directory(&path) {
            reply.error(self.fail("mkdir", &path, e));
            return;
        }
        match self.attr_for(&path) {
            Ok(attr) => reply.entry(&self.ttl, &attr, 0),
            Err(e) => reply.error(e),
        }
    }

    fn unlink(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        tracing::debug!("unlink(parent={}, name={:?})", parent, name);
        let path = match self.child_path(parent, name) {
            Ok(path) => path,
            Err(e) => return reply.error(e),
        };
        match self.overlay.remove(&path) {
            Ok(()) => {
                self.inodes.forget_path(&path);
                reply.ok();
            }
            Err(e) => reply.error(self.fail("unlink", &path, e)),
        }
    }

    fn rmdir(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        tracing::debug!("rmdir(parent={}, name={:?})", parent, name);
        let path = match self.child_path(parent, name) {
            Ok(path) => path,
            Err(e) => return reply.error(e),
        };
        match self.overlay.remove_directory(&path) {
            Ok(()) => {
                self.inodes.forget_path(&path);
                reply.ok();
            }
            Err(e) => reply.error(self.fail("rmdir", &path, e)),
        }
    }

    fn rename(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
        reply: ReplyEmpty,
    ) {
        tracing::debug!(
            "rename(parent={}, name={:?}, newparent={}, newname={:?}, flags={:#x})",
            parent,
            name,
            newparent,
            newname,
            flags
        );
        // RENAME_EXCHANGE and RENAME_NOREPLACE have no remote counterpart
        if flags != 0 {
            reply.error(libc::EINVAL);
            return;
        }
        let (from, to) = match (self.child_path(parent, name), self.child_path(newparent, newname)) {
            (Ok(from), Ok(to)) => (from, to),
            (Err(e), _) | (_, Err(e)) => return reply.error(e),
        };
        match self.overlay.rename(&from, &to) {
            Ok(_) => {
                self.inodes.rename(&from, &to);
                self.handles.retarget(&from, &to);
                reply.ok();
            }
            Err(e) => reply.error(self.fail("rename", &from, e)),
        }
    }

    fn open(&mut self, _req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
        tracing::debug!("open(ino={}, flags={:#x})", ino, flags);
        let Ok(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let writable = flags & libc::O_ACCMODE != libc::O_RDONLY;

        let prepared = if writable && flags & libc::O_TRUNC != 0 {
            self.overlay.truncate(&path, 0).map(|_| ())
        } else {
            self.overlay.open_for_read(&path).map(|_| ())
        };
        if let Err(e) = prepared {
            reply.error(self.fail("open", &path, e));
            return;
        }

        let fh = self.handles.open(FileHandle::File { path, writable });
        reply.opened(fh, 0);
    }

    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        tracing::trace!("read(ino={}, fh={}, offset={}, size={})", ino, fh, offset, size);
        let path = match self.handle_path(ino, fh) {
            Ok(path) => path,
            Err(e) => return reply.error(e),
        };
        let offset = match offset_of(offset) {
            Ok(offset) => offset,
            Err(e) => return reply.error(e),
        };
        match self.overlay.read(&path, offset, size as usize) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(self.fail("read", &path, e)),
        }
    }

    fn write(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        tracing::debug!("write(ino={}, fh={}, offset={}, len={})", ino, fh, offset, data.len());
        let path = match self.handles.get(fh) {
            Some(FileHandle::File { writable: false, .. }) => return reply.error(libc::EBADF),
            _ => match self.handle_path(ino, fh) {
                Ok(path) => path,
                Err(e) => return reply.error(e),
            },
        };
        let offset = match offset_of(offset) {
            Ok(offset) => offset,
            Err(e) => return reply.error(e),
        };
        match self.overlay.write(&path, offset, data) {
            Ok(written) => reply.written(written as u32),
            Err(e) => reply.error(self.fail("write", &path, e)),
        }
    }

    fn flush(&mut self, _req: &Request, ino: u64, fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        let path = match self.handle_path(ino, fh) {
            Ok(path) => path,
            Err(e) => return reply.error(e),
        };
        match self.overlay.flush(&path) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(self.fail("flush", &path, e)),
        }
    }

    fn fsync(&mut self, _req: &Request, ino: u64, fh: u64, _datasync: bool, reply: ReplyEmpty) {
        let path = match self.handle_path(ino, fh) {
            Ok(path) => path,
            Err(e) => return reply.error(e),
        };
        match self.overlay.flush(&path) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(self.fail("fsync", &path, e)),
        }
    }

    fn release(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        if let Some(FileHandle::File { path, writable: true }) = self.handles.close(fh) {
            if let Err(e) = self.overlay.flush(&path) {
                tracing::warn!("{} is still unsynced after close: {}", path, e);
            }
        }
        reply.ok();
    }

    fn create(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        tracing::debug!("create(parent={}, name={:?}, mode={:#o})", parent, name, mode);
        let path = match self.child_path(parent, name) {
            Ok(path) => path,
            Err(e) => return reply.error(e),
        };
        match self.new_file(&path, mode) {
            Ok(attr) => {
                let writable = flags & libc::O_ACCMODE != libc::O_RDONLY;
                let fh = self.handles.open(FileHandle::File { path, writable });
                reply.created(&self.ttl, &attr, 0, fh, 0);
            }
            Err(e) => reply.error(e),
        }
    }

    fn mknod(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        _rdev: u32,
        reply: ReplyEntry,
    ) {
        tracing::debug!("mknod(parent={}, name={:?}, mode={:#o})", parent, name, mode);
        let kind = mode & libc::S_IFMT as u32;
        if kind != 0 && kind != libc::S_IFREG as u32 {
            reply.error(libc::ENOTSUP);
            return;
        }
        let path = match self.child_path(parent, name) {
            Ok(path) => path,
            Err(e) => return reply.error(e),
        };
        match self.new_file(&path, mode) {
            Ok(attr) => reply.entry(&self.ttl, &attr, 0),
            Err(e) => reply.error(e),
        }
    }
}
