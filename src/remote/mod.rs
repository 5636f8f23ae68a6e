//! Remote storage collaborator.
//!
//! The overlay only talks to [`RemoteStorage`]; [`HttpRemote`] is the
//! production implementation over the service's HTTP API.

pub mod credentials;
pub mod endpoint;
pub mod http;
pub mod wire;

pub use credentials::Credentials;
pub use endpoint::{Args, Endpoint, Host, Hosts, Method, Opt};
pub use http::HttpRemote;
pub use wire::{AccountInfo, QuotaInfo};

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;

use crate::error::RemoteResult;
use crate::metadata::Metadata;

/// Namespace the paths are resolved in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RemoteRoot {
    /// The whole account.
    #[default]
    Dropbox,
    /// The application's own folder.
    Sandbox,
}

impl RemoteRoot {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteRoot::Dropbox => "dropbox",
            RemoteRoot::Sandbox => "sandbox",
        }
    }
}

impl std::fmt::Display for RemoteRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RemoteRoot {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dropbox" => Ok(RemoteRoot::Dropbox),
            "sandbox" => Ok(RemoteRoot::Sandbox),
            _ => Err(format!(
                "Invalid root '{}'. Must be one of: dropbox, sandbox",
                s
            )),
        }
    }
}

/// Optional arguments of a metadata fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataOptions {
    /// Return the directory's children inline.
    pub list: bool,
    pub include_deleted: bool,
    pub file_limit: Option<u32>,
    pub hash: Option<String>,
    pub rev: Option<String>,
}

impl MetadataOptions {
    pub fn listing() -> Self {
        MetadataOptions {
            list: true,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwritePolicy {
    /// Replace an existing object at the destination.
    Overwrite,
    /// Let the service keep both by renaming the upload.
    KeepBoth,
}

pub trait RemoteStorage: Send + Sync {
    fn fetch_metadata(
        &self,
        root: RemoteRoot,
        path: &str,
        options: &MetadataOptions,
    ) -> RemoteResult<Metadata>;

    fn create_folder(&self, root: RemoteRoot, path: &str) -> RemoteResult<Metadata>;

    fn delete(&self, root: RemoteRoot, path: &str) -> RemoteResult<Metadata>;

    fn move_entry(&self, root: RemoteRoot, from: &str, to: &str) -> RemoteResult<Metadata>;

    /// Replace the object at `path` with the whole of `content`.
    fn upload_file(
        &self,
        root: RemoteRoot,
        path: &str,
        content: File,
        overwrite: OverwritePolicy,
    ) -> RemoteResult<Metadata>;

    /// Stream the object's bytes into `sink`; the metadata arrives alongside.
    fn download_file(
        &self,
        root: RemoteRoot,
        path: &str,
        sink: &mut dyn Write,
    ) -> RemoteResult<Metadata>;
}
