use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{DropfsError, Result};
use crate::overlay::{DropFs, Overlay};

#[derive(Debug, Clone)]
pub struct MountOptions {
    pub ttl_secs: u64,
    pub allow_other: bool,
    pub auto_unmount: bool,
}

impl Default for MountOptions {
    fn default() -> Self {
        MountOptions {
            ttl_secs: 1,
            allow_other: false,
            auto_unmount: true,
        }
    }
}

impl MountOptions {
    fn fuse_options(&self) -> Vec<fuser::MountOption> {
        let mut options = vec![
            fuser::MountOption::FSName("dropfs".to_string()),
            fuser::MountOption::Subtype("dropfs".to_string()),
            fuser::MountOption::DefaultPermissions,
        ];
        if self.auto_unmount {
            options.push(fuser::MountOption::AutoUnmount);
        }
        if self.allow_other {
            options.push(fuser::MountOption::AllowOther);
        }
        options
    }
}

/// Mount the overlay at `mount_point` and serve requests until it is
/// unmounted. Blocks the calling thread.
pub fn mount_fuse(mount_point: &Path, overlay: Arc<Overlay>, options: &MountOptions) -> Result<()> {
    fs::create_dir_all(mount_point).map_err(|e| {
        DropfsError::Config(format!(
            "Failed to create mount point {}: {}",
            mount_point.display(),
            e
        ))
    })?;

    let fs = DropFs::new(overlay, Duration::from_secs(options.ttl_secs));

    tracing::info!("Mounting dropfs at {}", mount_point.display());
    fuser::mount2(fs, mount_point, &options.fuse_options())
        .map_err(|e| DropfsError::Fuse(format!("FUSE mount failed: {}", e)))?;
    tracing::info!("dropfs unmounted from {}", mount_point.display());
    Ok(())
}

/// Ask the OS to unmount `mount_point`.
///
/// Returns Ok(false) when the unmount command ran but did not succeed,
/// which usually means nothing was mounted there.
pub fn unmount_fuse(mount_point: &Path) -> Result<bool> {
    let status = if cfg!(target_os = "macos") {
        std::process::Command::new("umount").arg(mount_point).status()
    } else {
        std::process::Command::new("fusermount")
            .arg("-u")
            .arg(mount_point)
            .status()
    };

    match status {
        Ok(status) => Ok(status.success()),
        Err(e) => Err(DropfsError::Fuse(format!(
            "Failed to run unmount command for {}: {}",
            mount_point.display(),
            e
        ))),
    }
}
