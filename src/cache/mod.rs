//! Local on-disk mirror of remote file content.
//!
//! The file for remote path `/a/b.txt` lives at `<cache_root>/a/b.txt`.
//! A present file is fresh as of the last revision check for its path;
//! the overlay deletes it as soon as a newer revision is observed.

pub mod paths;

use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::fs::{FileExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{FsError, FsResult};
use crate::metadata::Metadata;
use crate::remote::{OverwritePolicy, RemoteRoot, RemoteStorage};

/// Handle returned by [`ContentCache::open_for_read`].
#[derive(Debug)]
pub struct CachedFile {
    pub file: File,
    /// Metadata that came with the download, if one was needed.
    pub downloaded: Option<Metadata>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheUsage {
    pub files: u64,
    pub bytes: u64,
}

#[derive(Debug)]
pub struct ContentCache {
    root: PathBuf,
}

fn partial_path(local: &Path) -> PathBuf {
    let name = local
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    local.with_file_name(format!(".{}.partial", name))
}

fn ignore_missing(result: io::Result<()>) -> io::Result<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

impl ContentCache {
    pub fn new(root: impl Into<PathBuf>) -> FsResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(ContentCache { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn local_path(&self, path: &str) -> FsResult<PathBuf> {
        Ok(paths::local_path(&self.root, path)?)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.local_path(path).is_ok_and(|local| local.is_file())
    }

    /// Local stat of the cache file, if there is one.
    pub fn stat(&self, path: &str) -> Option<fs::Metadata> {
        let local = self.local_path(path).ok()?;
        fs::metadata(local).ok().filter(|m| m.is_file())
    }

    /// Open the cached copy of `path`, downloading it first on a miss.
    ///
    /// The download lands in a hidden sibling and is renamed into place
    /// once complete, so an interrupted transfer never leaves a file that
    /// looks fresh.
    pub fn open_for_read(
        &self,
        path: &str,
        remote: &dyn RemoteStorage,
        root: RemoteRoot,
    ) -> FsResult<CachedFile> {
        let local = self.local_path(path)?;
        if local.is_file() {
            tracing::trace!("cache hit: {}", path);
            return Ok(CachedFile {
                file: File::open(&local)?,
                downloaded: None,
            });
        }

        paths::create_parent_dirs(&local)?;
        let partial = partial_path(&local);
        let mut sink = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&partial)?;

        tracing::debug!("cache miss, downloading {}", path);
        let metadata = match remote.download_file(root, path, &mut sink) {
            Ok(metadata) => metadata,
            Err(e) => {
                drop(sink);
                if let Err(rm) = fs::remove_file(&partial) {
                    tracing::warn!("Failed to remove partial download {}: {}", partial.display(), rm);
                }
                return Err(FsError::from_remote(path, e));
            }
        };
        drop(sink);
        fs::rename(&partial, &local)?;

        Ok(CachedFile {
            file: File::open(&local)?,
            downloaded: Some(metadata),
        })
    }

    /// Delete the cached file for `path`. Returns whether one existed.
    pub fn invalidate(&self, path: &str) -> FsResult<bool> {
        let local = self.local_path(path)?;
        let removed = ignore_missing(fs::remove_file(&local))?;
        if removed {
            tracing::debug!("invalidated cached content for {}", path);
        }
        Ok(removed)
    }

    /// Delete whatever is cached at or below `path`.
    pub fn invalidate_tree(&self, path: &str) -> FsResult<bool> {
        if paths::normalize(path) == "/" {
            self.clear()?;
            return Ok(true);
        }
        let local = self.local_path(path)?;
        match fs::symlink_metadata(&local) {
            Ok(meta) if meta.is_dir() => Ok(ignore_missing(fs::remove_dir_all(&local))?),
            Ok(_) => Ok(ignore_missing(fs::remove_file(&local))?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Move cached content along with a remote rename.
    pub fn relocate(&self, from: &str, to: &str) -> FsResult<()> {
        let source = self.local_path(from)?;
        let target = self.local_path(to)?;

        self.invalidate_tree(to)?;
        if fs::symlink_metadata(&source).is_err() {
            return Ok(());
        }
        paths::create_parent_dirs(&target)?;
        fs::rename(&source, &target)?;
        Ok(())
    }

    /// Write `data` at `offset` into the local copy, creating it if needed.
    pub fn write_local(&self, path: &str, offset: u64, data: &[u8]) -> FsResult<()> {
        let local = self.local_path(path)?;
        paths::create_parent_dirs(&local)?;
        let file = OpenOptions::new().write(true).create(true).truncate(false).open(&local)?;
        file.write_all_at(data, offset)?;
        Ok(())
    }

    /// Upload the full local copy of `path`, replacing the remote object.
    pub fn upload(
        &self,
        path: &str,
        remote: &dyn RemoteStorage,
        root: RemoteRoot,
    ) -> FsResult<Metadata> {
        let local = self.local_path(path)?;
        let file = File::open(&local)?;
        tracing::debug!("uploading {}", path);
        remote
            .upload_file(root, path, file, OverwritePolicy::Overwrite)
            .map_err(|e| FsError::from_remote(path, e))
    }

    /// Local write followed by a full upload.
    ///
    /// A failed upload leaves the local write in place.
    pub fn write(
        &self,
        path: &str,
        offset: u64,
        data: &[u8],
        remote: &dyn RemoteStorage,
        root: RemoteRoot,
    ) -> FsResult<Metadata> {
        self.write_local(path, offset, data)?;
        self.upload(path, remote, root)
    }

    pub fn truncate(&self, path: &str, size: u64) -> FsResult<()> {
        let local = self.local_path(path)?;
        paths::create_parent_dirs(&local)?;
        let file = OpenOptions::new().write(true).create(true).truncate(false).open(&local)?;
        file.set_len(size)?;
        Ok(())
    }

    /// Create an empty local file and materialise it remotely.
    ///
    /// If the upload fails the local file is removed again.
    pub fn create_file(
        &self,
        path: &str,
        mode: u32,
        remote: &dyn RemoteStorage,
        root: RemoteRoot,
    ) -> FsResult<Metadata> {
        let local = self.local_path(path)?;
        paths::create_parent_dirs(&local)?;
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            // owner keeps read/write so later cache writes succeed
            .mode((mode & 0o777) | 0o600)
            .open(&local)?;

        match self.upload(path, remote, root) {
            Ok(metadata) => Ok(metadata),
            Err(e) => {
                if let Err(rm) = fs::remove_file(&local) {
                    tracing::warn!("Failed to remove {} after failed create: {}", local.display(), rm);
                }
                Err(e)
            }
        }
    }

    /// Remove every cached entry, keeping the root itself.
    pub fn clear(&self) -> FsResult<()> {
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                fs::remove_dir_all(entry.path())?;
            } else {
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }

    pub fn usage(&self) -> FsResult<CacheUsage> {
        let mut usage = CacheUsage::default();
        for entry in WalkDir::new(&self.root).min_depth(1) {
            let entry = entry.map_err(|e| FsError::LocalIo(io::Error::other(e.to_string())))?;
            if entry.file_type().is_file() {
                usage.files += 1;
                usage.bytes += entry
                    .metadata()
                    .map_err(|e| FsError::LocalIo(io::Error::other(e.to_string())))?
                    .len();
            }
        }
        Ok(usage)
    }
}

/// Read up to `len` bytes at `offset`, stopping early at end of file.
pub fn read_range(file: &File, offset: u64, len: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    let mut filled = 0;
    while filled < len {
        let n = file.read_at(&mut buf[filled..], offset + filled as u64)?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}
