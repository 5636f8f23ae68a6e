pub mod args;
pub mod validation;

pub use args::{Args, CacheAction, Commands, ConfigAction};
pub use validation::{validate_cache_root, validate_mount_point};
