use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::ContentCache;
use crate::cli::{validate_cache_root, validate_mount_point};
use crate::config::{default_cache_root, default_token_file, expand_tilde, normalize_cache_root, Config};
use crate::error::{DropfsError, Result};
use crate::overlay::{self, MountOptions, Overlay, OverlayOptions};
use crate::remote::{Credentials, Hosts, HttpRemote, RemoteRoot};

#[derive(Debug, Clone)]
pub struct MountRequest {
    pub mount_point: PathBuf,
    pub cache_root: Option<String>,
    pub token_file: Option<PathBuf>,
    pub root: Option<RemoteRoot>,
    pub allow_other: bool,
}

/// Command line first, then config, then the platform default.
pub fn resolve_cache_root(cli: Option<&str>, config: &Config) -> Result<PathBuf> {
    match cli.or(config.cache.cache_root.as_deref()) {
        Some(path) => Ok(normalize_cache_root(path)),
        None => default_cache_root(),
    }
}

pub fn resolve_token_file(cli: Option<&Path>, config: &Config) -> Result<PathBuf> {
    if let Some(path) = cli {
        return Ok(path.to_path_buf());
    }
    match config.remote.token_file.as_deref() {
        Some(path) => Ok(expand_tilde(path)),
        None => default_token_file(),
    }
}

pub fn build_remote(config: &Config, token_file: &Path) -> Result<HttpRemote> {
    let credentials = Credentials::load(token_file)?;
    let hosts = Hosts {
        api: config.remote.get_api_url(),
        content: config.remote.get_content_url(),
    };
    HttpRemote::new(
        hosts,
        credentials,
        config.remote.timeout_secs.map(Duration::from_secs),
    )
}

pub fn mount(request: MountRequest, config: &Config) -> Result<()> {
    let mount_point = validate_mount_point(&request.mount_point)?;
    let cache_root = resolve_cache_root(request.cache_root.as_deref(), config)?;
    validate_cache_root(&cache_root, &mount_point)?;

    let token_file = resolve_token_file(request.token_file.as_deref(), config)?;
    let remote = build_remote(config, &token_file).map_err(|e| {
        DropfsError::Credentials(format!(
            "Could not set up the remote client from {}: {}",
            token_file.display(),
            e
        ))
    })?;

    let cache = ContentCache::new(&cache_root).map_err(|e| {
        DropfsError::Config(format!(
            "Cache root {} is not usable: {}",
            cache_root.display(),
            e
        ))
    })?;
    let options = OverlayOptions {
        root: request.root.unwrap_or(config.remote.root),
        index_buckets: config.cache.get_index_buckets(),
    };
    let overlay = Arc::new(Overlay::new(cache, Arc::new(remote), options));

    let mount_options = MountOptions {
        ttl_secs: config.fuse.get_ttl_secs(),
        allow_other: request.allow_other || config.fuse.allow_other,
        auto_unmount: config.fuse.get_auto_unmount(),
    };

    println!(
        "Mounting {} root at {} (cache: {})",
        options.root,
        mount_point.display(),
        cache_root.display()
    );
    println!("Unmount with 'dropfs unmount {}'", mount_point.display());

    overlay::mount_fuse(&mount_point, Arc::clone(&overlay), &mount_options)?;

    let unsynced = overlay.unsynced_paths();
    if !unsynced.is_empty() {
        eprintln!(
            "Warning: {} file(s) were changed locally but never uploaded; their content is in {}",
            unsynced.len(),
            cache_root.display()
        );
        for path in unsynced {
            eprintln!("  {}", path);
        }
    }
    Ok(())
}

pub fn unmount(mount_point: &Path) -> Result<()> {
    if overlay::unmount_fuse(mount_point)? {
        println!("Unmounted {}", mount_point.display());
        Ok(())
    } else {
        Err(DropfsError::Fuse(format!(
            "Failed to unmount {} (is it mounted?)",
            mount_point.display()
        )))
    }
}
