//! JSON payload shapes returned by the remote service.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::error::{RemoteError, RemoteResult};
use crate::metadata::{Metadata, Revision};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMetadata {
    #[serde(default)]
    pub bytes: Option<u64>,
    #[serde(default)]
    pub is_dir: bool,
    pub path: String,
    #[serde(default)]
    pub rev: Option<String>,
    #[serde(default)]
    pub revision: Option<u64>,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub modified: Option<String>,
    #[serde(default)]
    pub contents: Vec<WireMetadata>,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub root: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

fn parse_modified(value: &str) -> Option<SystemTime> {
    match chrono::DateTime::parse_from_rfc2822(value) {
        Ok(time) => Some(SystemTime::from(time)),
        Err(e) => {
            tracing::debug!("Ignoring unparseable modified time '{}': {}", value, e);
            None
        }
    }
}

impl WireMetadata {
    pub fn into_metadata(self) -> Metadata {
        // the root folder carries no rev, only a listing hash
        let revision = self
            .rev
            .or_else(|| self.revision.map(|r| r.to_string()))
            .or(self.hash)
            .unwrap_or_default();

        Metadata {
            size: if self.is_dir {
                None
            } else {
                Some(self.bytes.unwrap_or(0))
            },
            path: self.path,
            is_dir: self.is_dir,
            revision: Revision::new(revision),
            is_deleted: self.is_deleted,
            modified: self.modified.as_deref().and_then(parse_modified),
            children: self
                .contents
                .into_iter()
                .map(WireMetadata::into_metadata)
                .collect(),
        }
    }
}

pub fn parse_metadata(json: &str) -> RemoteResult<Metadata> {
    serde_json::from_str::<WireMetadata>(json)
        .map(WireMetadata::into_metadata)
        .map_err(|e| RemoteError::Malformed(e.to_string()))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuotaInfo {
    #[serde(default)]
    pub quota: u64,
    #[serde(default)]
    pub normal: u64,
    #[serde(default)]
    pub shared: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountInfo {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub uid: Option<u64>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub quota_info: Option<QuotaInfo>,
}
