use crate::error::{DropfsError, Result};
use crate::remote::RemoteRoot;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RemoteConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_url: Option<String>,
    #[serde(default)]
    pub root: RemoteRoot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_file: Option<String>,
    /// Unset means the HTTP client's own default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl RemoteConfig {
    pub fn get_api_url(&self) -> String {
        self.api_url.clone().unwrap_or_else(super::default_api_url)
    }

    pub fn get_content_url(&self) -> String {
        self.content_url
            .clone()
            .unwrap_or_else(super::default_content_url)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CacheConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_root: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_buckets: Option<usize>,
}

impl CacheConfig {
    pub fn get_index_buckets(&self) -> usize {
        self.index_buckets
            .unwrap_or_else(super::default_index_buckets)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FuseConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,
    #[serde(default)]
    pub allow_other: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_unmount: Option<bool>,
}

impl FuseConfig {
    pub fn get_ttl_secs(&self) -> u64 {
        self.ttl_secs.unwrap_or_else(super::default_fuse_ttl_secs)
    }

    pub fn get_auto_unmount(&self) -> bool {
        self.auto_unmount.unwrap_or(true)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LogConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl LogConfig {
    pub fn get_filter(&self) -> String {
        self.filter.clone().unwrap_or_else(super::default_log_filter)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub fuse: FuseConfig,
    #[serde(default)]
    pub log: LogConfig,
}

const MAX_TTL_SECS: u64 = 3600;

pub fn validate_config(config: &Config) -> Result<()> {
    if config.cache.get_index_buckets() == 0 {
        return Err(DropfsError::Config(
            "cache.index_buckets must be greater than zero".to_string(),
        ));
    }

    for (key, value) in [
        ("remote.api_url", config.remote.get_api_url()),
        ("remote.content_url", config.remote.get_content_url()),
    ] {
        if value.trim().is_empty() {
            return Err(DropfsError::Config(format!("{} must not be empty", key)));
        }
        url::Url::parse(&value)
            .map_err(|e| DropfsError::Config(format!("Invalid {} '{}': {}", key, value, e)))?;
    }

    if config.remote.timeout_secs == Some(0) {
        return Err(DropfsError::Config(
            "remote.timeout_secs must be greater than zero when set".to_string(),
        ));
    }

    let ttl = config.fuse.get_ttl_secs();
    if ttl > MAX_TTL_SECS {
        eprintln!(
            "Warning: fuse.ttl_secs ({}) is above {}s. Remote changes will take a long time to show up.",
            ttl, MAX_TTL_SECS
        );
    }

    Ok(())
}
