use crate::cli::ConfigAction;
use crate::config::{get_config_path, load_config, save_config, Config};
use crate::error::{DropfsError, Result};

pub fn handle_config_command(action: Option<ConfigAction>) -> Result<()> {
    match action {
        Some(ConfigAction::Path) => {
            println!("Config location: {}", get_config_path()?.display());
        }
        None | Some(ConfigAction::Show) => {
            let config_path = get_config_path()?;
            let config = load_config()?;
            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("Config file: {} (not present, using defaults)", config_path.display());
            }
            println!();
            print_config(&config);
        }
        Some(ConfigAction::Init { force }) => {
            let config_path = get_config_path()?;
            if config_path.exists() && !force {
                return Err(DropfsError::Config(format!(
                    "{} already exists (use --force to overwrite)",
                    config_path.display()
                )));
            }
            save_config(&Config::default())?;
            println!("Wrote default config to {}", config_path.display());
        }
        Some(ConfigAction::Edit) => {
            let config_path = get_config_path()?;
            if !config_path.exists() {
                save_config(&Config::default())?;
                println!("Created default config at {}", config_path.display());
            }

            let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
            let status = std::process::Command::new(&editor)
                .arg(&config_path)
                .status()
                .map_err(|e| {
                    DropfsError::Config(format!(
                        "Failed to open editor '{}': {}. Set EDITOR environment variable to your preferred editor.",
                        editor, e
                    ))
                })?;

            if !status.success() {
                return Err(DropfsError::Config(format!(
                    "Editor '{}' exited with non-zero status",
                    editor
                )));
            }
            load_config()?;
        }
    }
    Ok(())
}

fn print_config(config: &Config) {
    let unset = || "(unset)".to_string();
    println!("Current configuration:");
    println!("  Remote:");
    println!("    api_url: {}", config.remote.get_api_url());
    println!("    content_url: {}", config.remote.get_content_url());
    println!("    root: {}", config.remote.root);
    println!(
        "    token_file: {}",
        config.remote.token_file.clone().unwrap_or_else(unset)
    );
    println!(
        "    timeout_secs: {}",
        config
            .remote
            .timeout_secs
            .map(|t| t.to_string())
            .unwrap_or_else(unset)
    );
    println!("  Cache:");
    println!(
        "    cache_root: {}",
        config.cache.cache_root.clone().unwrap_or_else(unset)
    );
    println!("    index_buckets: {}", config.cache.get_index_buckets());
    println!("  FUSE:");
    println!("    ttl_secs: {}", config.fuse.get_ttl_secs());
    println!("    allow_other: {}", config.fuse.allow_other);
    println!("    auto_unmount: {}", config.fuse.get_auto_unmount());
    println!("  Log:");
    println!("    file: {}", config.log.file.clone().unwrap_or_else(unset));
    println!("    filter: {}", config.log.get_filter());
}
