//! Helpers for the slash-separated absolute paths used as index keys and
//! for mapping them under the cache root.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or("")
}

pub fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(pos) => &path[..pos],
    }
}

pub fn join(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Drop a trailing slash, keeping `/` itself intact.
pub fn normalize(path: &str) -> &str {
    match path.strip_suffix('/') {
        Some("") | None => path,
        Some(trimmed) => trimmed,
    }
}

/// True when `path` lies strictly below `ancestor`.
pub fn is_descendant(path: &str, ancestor: &str) -> bool {
    if ancestor == "/" {
        return path != "/" && path.starts_with('/');
    }
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == b'/'
}

/// Re-anchor `path` from under `from` to under `to`.
pub fn rebase(path: &str, from: &str, to: &str) -> Option<String> {
    if path == from {
        return Some(to.to_string());
    }
    if !is_descendant(path, from) {
        return None;
    }
    let rest = if from == "/" {
        &path[1..]
    } else {
        &path[from.len() + 1..]
    };
    Some(join(to, rest))
}

/// Map a remote path onto the local tree rooted at `root`.
///
/// Rejects `.` and `..` components so a remote name can never address a file
/// outside the cache root.
pub fn local_path(root: &Path, path: &str) -> io::Result<PathBuf> {
    let mut local = root.to_path_buf();
    for component in path.split('/').filter(|c| !c.is_empty()) {
        if component == "." || component == ".." {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("path '{}' contains a relative component", path),
            ));
        }
        local.push(component);
    }
    Ok(local)
}

/// Create every missing directory above `file`.
pub fn create_parent_dirs(file: &Path) -> io::Result<()> {
    match file.parent() {
        Some(dir) => fs::create_dir_all(dir),
        None => Ok(()),
    }
}
