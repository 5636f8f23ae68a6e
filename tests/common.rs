use std::path::{Path, PathBuf};

use assert_cmd::Command;
use tempfile::TempDir;

/// Get the path to the dropfs binary for testing.
#[allow(dead_code)]
pub fn get_dropfs_path() -> PathBuf {
    assert_cmd::cargo::cargo_bin!("dropfs").to_path_buf()
}

/// Isolated config and cache directories for one test.
///
/// Commands built through [`TestEnv::command`] see only these directories,
/// never the user's real config or cache.
#[allow(dead_code)]
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub config_dir: PathBuf,
    pub cache_dir: PathBuf,
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(dead_code)]
impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_dir = temp_dir.path().join("config");
        let cache_dir = temp_dir.path().join("cache");
        Self {
            temp_dir,
            config_dir,
            cache_dir,
        }
    }

    pub fn command(&self) -> Command {
        let mut cmd = Command::new(get_dropfs_path());
        cmd.env("DROPFS_CONFIG_DIR", &self.config_dir)
            .env("DROPFS_CACHE_DIR", &self.cache_dir)
            .env("DROPFS_LOG", "off")
            .env_remove("EDITOR");
        cmd
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// A fresh directory under the temp root, created on disk.
    pub fn dir(&self, name: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        std::fs::create_dir_all(&path).expect("Failed to create directory");
        path
    }

    pub fn write_cached(&self, relative: &str, content: &[u8]) {
        write_file(&self.cache_dir.join(relative), content);
    }
}

#[allow(dead_code)]
pub fn write_file(path: &Path, content: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create parent directory");
    }
    std::fs::write(path, content).expect("Failed to write file");
}
