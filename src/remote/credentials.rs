use std::fmt;
use std::path::Path;

use crate::error::{DropfsError, Result};

/// Bearer token for the remote API.
#[derive(Clone)]
pub struct Credentials {
    token: String,
}

impl Credentials {
    pub fn from_token(token: impl Into<String>) -> Result<Self> {
        let token = token.into().trim().to_string();
        if token.is_empty() {
            return Err(DropfsError::Credentials("access token is empty".to_string()));
        }
        Ok(Credentials { token })
    }

    /// Read the token from the first non-empty line of `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DropfsError::Credentials(format!(
                "Failed to read token file {}: {}",
                path.display(),
                e
            ))
        })?;

        let token = content
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .ok_or_else(|| {
                DropfsError::Credentials(format!("Token file {} is empty", path.display()))
            })?;

        Self::from_token(token)
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .finish()
    }
}
