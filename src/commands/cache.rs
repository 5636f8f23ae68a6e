use std::io::{IsTerminal, Write};

use crate::cache::ContentCache;
use crate::cli::CacheAction;
use crate::commands::mount::resolve_cache_root;
use crate::config::Config;
use crate::error::{DropfsError, Result};

pub fn handle_cache_command(action: CacheAction, config: &Config) -> Result<()> {
    match action {
        CacheAction::Stats { cache_root } => {
            let root = resolve_cache_root(cache_root.as_deref(), config)?;
            if !root.exists() {
                println!("Cache root: {} (empty, not created yet)", root.display());
                return Ok(());
            }
            let usage = ContentCache::new(&root)?.usage()?;
            println!("Cache root: {}", root.display());
            println!("  files: {}", usage.files);
            println!("  bytes: {} ({})", usage.bytes, human_size(usage.bytes));
        }
        CacheAction::Clear { cache_root, yes } => {
            let root = resolve_cache_root(cache_root.as_deref(), config)?;
            if !root.exists() {
                println!("Nothing to clear at {}", root.display());
                return Ok(());
            }
            if !yes && !confirm(&format!("Delete all cached content in {}?", root.display()))? {
                println!("Aborted.");
                return Ok(());
            }
            let cache = ContentCache::new(&root)?;
            let usage = cache.usage()?;
            cache.clear()?;
            println!(
                "Removed {} file(s), {} from {}",
                usage.files,
                human_size(usage.bytes),
                root.display()
            );
        }
    }
    Ok(())
}

fn confirm(question: &str) -> Result<bool> {
    if !std::io::stdin().is_terminal() {
        return Err(DropfsError::Config(
            "Refusing to clear the cache without a terminal; pass --yes".to_string(),
        ));
    }
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    loop {
        print!("{} [y/N]: ", question);
        stdout.flush()?;

        let mut input = String::new();
        stdin.read_line(&mut input)?;
        match input.trim().to_lowercase().as_str() {
            "" | "n" | "no" => return Ok(false),
            "y" | "yes" => return Ok(true),
            _ => eprintln!("Please enter 'y' or 'n'."),
        }
    }
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
