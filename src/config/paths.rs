use crate::error::{DropfsError, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

pub fn expand_tilde(path: &str) -> PathBuf {
    let path = path.trim();
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    } else if path == "~" {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home);
        }
    }
    PathBuf::from(path)
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("com", "dropfs", "dropfs")
        .ok_or_else(|| DropfsError::Config("Could not determine home directory".to_string()))
}

pub fn get_config_dir() -> Result<PathBuf> {
    if let Ok(config_dir) = std::env::var("DROPFS_CONFIG_DIR") {
        return Ok(PathBuf::from(config_dir));
    }
    Ok(project_dirs()?.config_dir().to_path_buf())
}

pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join("config.toml"))
}

/// Cache root used when neither the command line nor the config names one.
pub fn default_cache_root() -> Result<PathBuf> {
    if let Ok(cache_dir) = std::env::var("DROPFS_CACHE_DIR") {
        return Ok(PathBuf::from(cache_dir));
    }
    Ok(project_dirs()?.cache_dir().join("content"))
}

/// Token file used when neither the command line nor the config names one.
pub fn default_token_file() -> Result<PathBuf> {
    Ok(get_config_dir()?.join("token"))
}

/// Strip a trailing separator so the root joins cleanly with remote paths.
pub fn normalize_cache_root(path: &str) -> PathBuf {
    let trimmed = path.trim();
    let trimmed = match trimmed.strip_suffix('/') {
        Some(rest) if !rest.is_empty() => rest,
        _ => trimmed,
    };
    expand_tilde(trimmed)
}
