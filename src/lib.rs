pub mod cache;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod index;
pub mod logging;
pub mod metadata;
pub mod overlay;
pub mod remote;

pub use cache::{CacheUsage, ContentCache};
pub use config::{load_config, save_config, Config};
pub use error::{DropfsError, FsError, FsResult, RemoteError, RemoteResult, Result};
pub use index::{Displaced, PathIndex};
pub use metadata::{Metadata, Revision};
pub use overlay::{Attributes, DropFs, Overlay, OverlayOptions};
pub use remote::{HttpRemote, MetadataOptions, OverwritePolicy, RemoteRoot, RemoteStorage};
