use fuser::{FileAttr, FileType};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::time::UNIX_EPOCH;

use crate::overlay::controller::Attributes;

const BLOCK_SIZE: u32 = 4096;

/// Map an io error onto the errno the kernel should see.
pub(crate) fn io_error_to_libc(e: &io::Error) -> i32 {
    if let Some(code) = e.raw_os_error() {
        return code;
    }
    use io::ErrorKind::*;
    match e.kind() {
        NotFound => libc::ENOENT,
        PermissionDenied => libc::EACCES,
        AlreadyExists => libc::EEXIST,
        InvalidInput | InvalidData => libc::EINVAL,
        TimedOut => libc::ETIMEDOUT,
        Interrupted => libc::EINTR,
        WriteZero | StorageFull => libc::ENOSPC,
        OutOfMemory => libc::ENOMEM,
        WouldBlock => libc::EAGAIN,
        Unsupported => libc::ENOTSUP,
        IsADirectory => libc::EISDIR,
        NotADirectory => libc::ENOTDIR,
        DirectoryNotEmpty => libc::ENOTEMPTY,
        _ => libc::EIO,
    }
}

pub(crate) fn file_type(is_dir: bool) -> FileType {
    if is_dir {
        FileType::Directory
    } else {
        FileType::RegularFile
    }
}

/// Kernel attributes for an overlay entry. Directories are always 0755;
/// files take the mode of their cache copy when there is one.
pub(crate) fn attributes_to_fileattr(attrs: &Attributes, ino: u64, uid: u32, gid: u32) -> FileAttr {
    let is_dir = attrs.is_dir();
    let mtime = attrs.modified.unwrap_or(UNIX_EPOCH);
    let atime = attrs
        .local
        .as_ref()
        .and_then(|stat| stat.accessed().ok())
        .unwrap_or(mtime);
    let perm = match (&attrs.local, is_dir) {
        (_, true) => 0o755,
        (Some(stat), false) => (stat.permissions().mode() & 0o777) as u16,
        (None, false) => 0o644,
    };

    FileAttr {
        ino,
        size: attrs.size,
        blocks: attrs.size.div_ceil(512),
        atime,
        mtime,
        ctime: mtime,
        crtime: mtime,
        kind: file_type(is_dir),
        perm,
        nlink: if is_dir { 2 } else { 1 },
        uid,
        gid,
        rdev: 0,
        blksize: BLOCK_SIZE,
        flags: 0,
    }
}
