use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DropfsError>;

/// Result type for filesystem operations served by the overlay.
pub type FsResult<T> = std::result::Result<T, FsError>;

/// Result type returned by a remote storage client.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

#[derive(Error, Debug)]
pub enum DropfsError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("FUSE error: {0}")]
    Fuse(String),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Filesystem error: {0}")]
    Fs(#[from] FsError),

    #[error("Credentials error: {0}")]
    Credentials(String),

    #[error("JSON error: {0}")]
    Json(String),
}

impl From<serde_json::Error> for DropfsError {
    fn from(err: serde_json::Error) -> Self {
        DropfsError::Json(err.to_string())
    }
}

/// Errors produced by a remote storage client.
///
/// The first group is raised locally before any request leaves the process
/// (argument validation against the endpoint table). `Status` carries the
/// HTTP status the service answered with.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("missing required option '{0}'")]
    MissingOption(&'static str),

    #[error("option '{0}' is not accepted by endpoint '{1}'")]
    IllegalOption(&'static str, &'static str),

    #[error("option '{0}' was given more than once")]
    DuplicatedOption(&'static str),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("remote answered with status {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("remote client has been released")]
    Released,
}

impl RemoteError {
    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteError::Status(code) => Some(*code),
            _ => None,
        }
    }
}

/// Failure of a single filesystem operation.
#[derive(Error, Debug)]
pub enum FsError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("remote transport failure: {0}")]
    RemoteTransportFailure(RemoteError),

    #[error("local I/O error: {0}")]
    LocalIo(#[from] io::Error),
}

impl FsError {
    /// Classify a remote failure for the object at `path`.
    pub fn from_remote(path: &str, err: RemoteError) -> Self {
        match err.status() {
            Some(404) => FsError::NotFound(path.to_string()),
            Some(403) | Some(409) => FsError::AlreadyExists(path.to_string()),
            _ => FsError::RemoteTransportFailure(err),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, FsError::RemoteTransportFailure(_))
    }

    /// The libc error code reported to the kernel for this failure.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound(_) => libc::ENOENT,
            FsError::AlreadyExists(_) => libc::EEXIST,
            FsError::RemoteTransportFailure(err) => match err.status() {
                Some(401) => libc::EACCES,
                Some(507) => libc::ENOSPC,
                _ => libc::EIO,
            },
            FsError::LocalIo(err) => crate::overlay::io_error_to_libc(err),
        }
    }
}
