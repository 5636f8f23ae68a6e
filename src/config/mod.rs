pub mod paths;
pub mod persistence;
pub mod schema;

pub use paths::*;
pub use persistence::*;
pub use schema::*;

fn default_api_url() -> String {
    "https://api.dropbox.com".to_string()
}

fn default_content_url() -> String {
    "https://api-content.dropbox.com".to_string()
}

fn default_index_buckets() -> usize {
    crate::overlay::DEFAULT_INDEX_BUCKETS
}

fn default_fuse_ttl_secs() -> u64 {
    1
}

fn default_log_filter() -> String {
    "info".to_string()
}
