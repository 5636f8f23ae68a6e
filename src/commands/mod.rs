pub mod cache;
pub mod config;
pub mod doctor;
pub mod mount;

pub use cache::handle_cache_command;
pub use config::handle_config_command;
pub use doctor::run_doctor;
pub use mount::{mount, unmount, MountRequest};
