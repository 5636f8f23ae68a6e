use std::path::Path;

use crate::commands::mount::{build_remote, resolve_cache_root, resolve_token_file};
use crate::config::{get_config_path, load_config_from, Config};
use crate::error::Result;
use crate::remote::Credentials;

struct DiagnosticCheck {
    name: String,
    status: DiagnosticStatus,
    details: String,
}

#[derive(PartialEq, Eq)]
enum DiagnosticStatus {
    Ok,
    Warning,
    Error,
}

impl DiagnosticCheck {
    fn ok(name: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: DiagnosticStatus::Ok,
            details: details.into(),
        }
    }

    fn warning(name: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: DiagnosticStatus::Warning,
            details: details.into(),
        }
    }

    fn error(name: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: DiagnosticStatus::Error,
            details: details.into(),
        }
    }

    fn symbol(&self) -> &'static str {
        match self.status {
            DiagnosticStatus::Ok => "\u{2713}",
            DiagnosticStatus::Warning => "\u{26a0}",
            DiagnosticStatus::Error => "\u{2717}",
        }
    }
}

pub fn run_doctor() -> Result<()> {
    println!();
    println!("dropfs Diagnostics");
    println!("==================");
    println!();

    let mut checks: Vec<DiagnosticCheck> = Vec::new();
    let mut suggestions: Vec<String> = Vec::new();

    let fuse_check = check_fuse();
    if fuse_check.status == DiagnosticStatus::Error {
        suggestions.push("Install FUSE (fuse3 on Linux, macFUSE on macOS)".to_string());
    }
    checks.push(fuse_check);

    let (config_check, config) = check_config();
    if config_check.status == DiagnosticStatus::Warning {
        suggestions.push("Create config: dropfs config init".to_string());
    }
    checks.push(config_check);

    let (token_check, credentials) = check_token(&config);
    if token_check.status != DiagnosticStatus::Ok {
        suggestions.push(
            "Put an access token on the first line of the token file, or pass -t FILE".to_string(),
        );
    }
    checks.push(token_check);

    checks.push(check_cache_root(&config));

    if credentials.is_some() {
        checks.push(check_remote(&config));
    }

    for check in &checks {
        println!("{} {} - {}", check.symbol(), check.name, check.details);
    }

    if !suggestions.is_empty() {
        println!();
        println!("Suggestions:");
        for suggestion in &suggestions {
            println!("  -> {}", suggestion);
        }
    }

    println!();

    Ok(())
}

fn check_fuse() -> DiagnosticCheck {
    #[cfg(target_os = "macos")]
    {
        if Path::new("/Library/Frameworks/macFUSE.framework").exists() {
            DiagnosticCheck::ok("macFUSE", "installed")
        } else {
            DiagnosticCheck::error("macFUSE", "not installed")
        }
    }

    #[cfg(not(target_os = "macos"))]
    {
        if !Path::new("/dev/fuse").exists() {
            return DiagnosticCheck::error("FUSE", "/dev/fuse not found");
        }
        match which("fusermount3").or_else(|| which("fusermount")) {
            Some(helper) => DiagnosticCheck::ok("FUSE", format!("/dev/fuse present, {}", helper)),
            None => DiagnosticCheck::warning("FUSE", "/dev/fuse present but fusermount not in PATH"),
        }
    }
}

#[cfg(not(target_os = "macos"))]
fn which(binary: &str) -> Option<String> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(binary))
        .find(|candidate| candidate.is_file())
        .map(|candidate| candidate.display().to_string())
}

fn check_config() -> (DiagnosticCheck, Config) {
    let config_path = match get_config_path() {
        Ok(path) => path,
        Err(e) => return (DiagnosticCheck::error("Config file", e.to_string()), Config::default()),
    };

    if !config_path.exists() {
        return (
            DiagnosticCheck::warning(
                "Config file",
                format!("not found at {} (using defaults)", config_path.display()),
            ),
            Config::default(),
        );
    }

    match load_config_from(&config_path) {
        Ok(config) => (
            DiagnosticCheck::ok("Config file", format!("{} (valid)", config_path.display())),
            config,
        ),
        Err(e) => (
            DiagnosticCheck::error("Config file", e.to_string()),
            Config::default(),
        ),
    }
}

fn check_token(config: &Config) -> (DiagnosticCheck, Option<Credentials>) {
    let token_file = match resolve_token_file(None, config) {
        Ok(path) => path,
        Err(e) => return (DiagnosticCheck::error("Token file", e.to_string()), None),
    };
    if !token_file.exists() {
        return (
            DiagnosticCheck::warning("Token file", format!("not found at {}", token_file.display())),
            None,
        );
    }
    match Credentials::load(&token_file) {
        Ok(credentials) => (
            DiagnosticCheck::ok("Token file", format!("{} (readable)", token_file.display())),
            Some(credentials),
        ),
        Err(e) => (DiagnosticCheck::error("Token file", e.to_string()), None),
    }
}

fn check_cache_root(config: &Config) -> DiagnosticCheck {
    let root = match resolve_cache_root(None, config) {
        Ok(root) => root,
        Err(e) => return DiagnosticCheck::error("Cache root", e.to_string()),
    };
    if let Err(e) = std::fs::create_dir_all(&root) {
        return DiagnosticCheck::error("Cache root", format!("{}: {}", root.display(), e));
    }
    let check_file = root.join(".dropfs-doctor-write-check");
    match std::fs::write(&check_file, b"") {
        Ok(()) => {
            let _ = std::fs::remove_file(&check_file);
            DiagnosticCheck::ok("Cache root", format!("{} (writable)", root.display()))
        }
        Err(e) => DiagnosticCheck::error(
            "Cache root",
            format!("{} is not writable: {}", root.display(), e),
        ),
    }
}

fn check_remote(config: &Config) -> DiagnosticCheck {
    let remote = match resolve_token_file(None, config).and_then(|t| build_remote(config, &t)) {
        Ok(remote) => remote,
        Err(e) => return DiagnosticCheck::error("Remote", e.to_string()),
    };
    match remote.account_info() {
        Ok(info) => {
            let who = info
                .display_name
                .or(info.email)
                .unwrap_or_else(|| "unknown account".to_string());
            DiagnosticCheck::ok("Remote", format!("authenticated as {}", who))
        }
        Err(e) => DiagnosticCheck::error("Remote", e.to_string()),
    }
}
