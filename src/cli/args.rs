use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::remote::RemoteRoot;

#[derive(Parser, Debug)]
#[command(name = "dropfs")]
#[command(about = "Mount remote Dropbox storage as a local filesystem with an on-disk content cache")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Mount the remote at MOUNT_POINT and serve it until unmounted")]
    Mount {
        #[arg(help = "Existing directory to mount on")]
        mount_point: PathBuf,

        #[arg(short, long, help = "Directory holding cached file content")]
        cache_root: Option<String>,

        #[arg(short, long, help = "File whose first line is the access token")]
        token_file: Option<PathBuf>,

        #[arg(short, long, help = "Append logs to this file instead of stderr")]
        log_file: Option<PathBuf>,

        #[arg(long, help = "Remote namespace to mount (dropbox or sandbox)")]
        root: Option<RemoteRoot>,

        #[arg(long, help = "Let other users access the mount")]
        allow_other: bool,
    },
    #[command(about = "Unmount a dropfs mount point")]
    Unmount {
        #[arg(help = "Mounted directory")]
        mount_point: PathBuf,
    },
    #[command(about = "Manage configuration")]
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
    #[command(about = "Inspect or clear the content cache")]
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    #[command(about = "Diagnose common issues and system state")]
    Doctor,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    #[command(about = "Show current configuration values")]
    Show,
    #[command(about = "Open config file in editor")]
    Edit,
    #[command(about = "Show config file path")]
    Path,
    #[command(about = "Write a config file with default values")]
    Init {
        #[arg(long, help = "Overwrite an existing config file")]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    #[command(about = "Show the number and total size of cached files")]
    Stats {
        #[arg(short, long, help = "Cache directory (defaults to the configured one)")]
        cache_root: Option<String>,
    },
    #[command(about = "Delete all cached content")]
    Clear {
        #[arg(short, long, help = "Cache directory (defaults to the configured one)")]
        cache_root: Option<String>,

        #[arg(short = 'y', long, help = "Skip confirmation prompt")]
        yes: bool,
    },
}
