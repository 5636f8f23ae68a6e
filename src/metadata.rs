use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

use crate::cache::paths::basename;

/// Opaque version stamp the remote service assigns to an object.
///
/// Only equality is meaningful; revisions carry no ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(String);

impl Revision {
    pub fn new(rev: impl Into<String>) -> Self {
        Revision(rev.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Last-known description of one remote filesystem object.
///
/// Records are replaced wholesale when a fresher response arrives and are
/// never mutated once installed in the index.
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    pub path: String,
    pub is_dir: bool,
    /// `None` for directories.
    pub size: Option<u64>,
    pub revision: Revision,
    /// Tombstone flag, set only for entries reported deleted by the remote.
    pub is_deleted: bool,
    pub modified: Option<SystemTime>,
    /// Populated only when this record came from a directory listing.
    pub children: Vec<Metadata>,
}

impl Metadata {
    pub fn file(path: impl Into<String>, size: u64, revision: impl Into<String>) -> Self {
        Metadata {
            path: path.into(),
            is_dir: false,
            size: Some(size),
            revision: Revision::new(revision),
            is_deleted: false,
            modified: None,
            children: Vec::new(),
        }
    }

    pub fn directory(path: impl Into<String>, revision: impl Into<String>) -> Self {
        Metadata {
            path: path.into(),
            is_dir: true,
            size: None,
            revision: Revision::new(revision),
            is_deleted: false,
            modified: None,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<Metadata>) -> Self {
        self.children = children;
        self
    }

    pub fn with_modified(mut self, modified: SystemTime) -> Self {
        self.modified = Some(modified);
        self
    }

    pub fn deleted(mut self) -> Self {
        self.is_deleted = true;
        self
    }

    /// Final path component; empty for the root.
    pub fn name(&self) -> &str {
        basename(&self.path)
    }

    pub fn size_bytes(&self) -> u64 {
        self.size.unwrap_or(0)
    }

    /// Detach the listing payload, returning the bare record and its children.
    pub fn split_children(mut self) -> (Metadata, Vec<Metadata>) {
        let children = std::mem::take(&mut self.children);
        (self, children)
    }
}
