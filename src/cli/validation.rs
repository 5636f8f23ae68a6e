use crate::error::{DropfsError, Result};
use std::path::{Path, PathBuf};

/// The mount point must already exist and be a directory.
pub fn validate_mount_point(mount_point: &Path) -> Result<PathBuf> {
    let metadata = std::fs::metadata(mount_point).map_err(|e| {
        DropfsError::Config(format!(
            "Mount point {} is not accessible: {}",
            mount_point.display(),
            e
        ))
    })?;
    if !metadata.is_dir() {
        return Err(DropfsError::Config(format!(
            "Mount point {} is not a directory",
            mount_point.display()
        )));
    }
    mount_point.canonicalize().map_err(DropfsError::from)
}

/// Keep the cache out of the mounted tree, otherwise every cache write
/// would loop back through the filesystem it serves.
pub fn validate_cache_root(cache_root: &Path, mount_point: &Path) -> Result<()> {
    let resolved = resolve_lexically(cache_root)?;
    if resolved.starts_with(mount_point) {
        return Err(DropfsError::Config(format!(
            "Cache root {} must not be inside the mount point {}",
            cache_root.display(),
            mount_point.display()
        )));
    }
    Ok(())
}

/// Canonicalize the longest existing ancestor and append the rest, so a
/// cache root that does not exist yet can still be checked.
fn resolve_lexically(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut existing = absolute.as_path();
    let mut tail = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name.to_os_string());
                existing = parent;
            }
            _ => break,
        }
    }

    let mut resolved = existing.canonicalize().unwrap_or_else(|_| existing.to_path_buf());
    for name in tail.into_iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}
