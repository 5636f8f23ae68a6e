use clap::Parser;

use dropfs::cli::{Args, Commands};
use dropfs::commands::{self, MountRequest};
use dropfs::config::{expand_tilde, load_config};
use dropfs::logging::init_logging;
use dropfs::Result;

fn main() {
    match run() {
        Ok(code) => {
            std::process::exit(code);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let args = Args::parse();
    // a broken config file must not lock the user out of repairing it
    let config = match &args.command {
        Commands::Config { .. } | Commands::Doctor => load_config().unwrap_or_default(),
        _ => load_config()?,
    };

    let log_file = match &args.command {
        Commands::Mount { log_file, .. } => log_file
            .clone()
            .or_else(|| config.log.file.as_deref().map(expand_tilde)),
        _ => None,
    };
    init_logging(log_file.as_deref(), &config.log.get_filter())?;

    match args.command {
        Commands::Mount {
            mount_point,
            cache_root,
            token_file,
            log_file: _,
            root,
            allow_other,
        } => {
            let request = MountRequest {
                mount_point,
                cache_root,
                token_file,
                root,
                allow_other,
            };
            commands::mount(request, &config)?;
            Ok(0)
        }
        Commands::Unmount { mount_point } => {
            commands::unmount(&mount_point)?;
            Ok(0)
        }
        Commands::Config { action } => {
            commands::handle_config_command(action)?;
            Ok(0)
        }
        Commands::Cache { action } => {
            commands::handle_cache_command(action, &config)?;
            Ok(0)
        }
        Commands::Doctor => {
            commands::run_doctor()?;
            Ok(0)
        }
    }
}
