//! Config and aliases (§4.8): the two-tier `./.fz/` (project) + `~/.fz/`
//! (user) directory layout for models, calculator aliases, and algorithm
//! plug-ins, plus the process-wide `RuntimeConfig` read once from
//! environment variables (§6 "Recognized environment variables").

use std::path::{Path, PathBuf};
use std::time::Duration;

pub const MODELS_DIR: &str = "models";
pub const CALCULATORS_DIR: &str = "calculators";
pub const ALGORITHMS_DIR: &str = "algorithms";

const CANDIDATE_EXTENSIONS: &[&str] = &["", ".json", ".yaml", ".yml", ".toml"];

pub fn project_dir() -> PathBuf {
    PathBuf::from("./.fz")
}

pub fn user_dir() -> PathBuf {
    dirs_home().join(".fz")
}

fn dirs_home() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Resolve `<kind>/<name>` under the project directory first, then the user
/// directory (§4.8: "project wins over user"), trying a small set of
/// conventional extensions when `name` doesn't already carry one.
pub fn resolve_named(kind: &str, name: &str) -> Option<PathBuf> {
    for base in [project_dir(), user_dir()] {
        let dir = base.join(kind);
        for ext in CANDIDATE_EXTENSIONS {
            let candidate = dir.join(format!("{name}{ext}"));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

pub fn list_named(kind: &str) -> Vec<String> {
    let mut names = std::collections::BTreeSet::new();
    for base in [project_dir(), user_dir()] {
        let dir = base.join(kind);
        let Ok(entries) = std::fs::read_dir(&dir) else { continue };
        for entry in entries.flatten() {
            if let Some(stem) = entry.path().file_stem() {
                names.insert(stem.to_string_lossy().into_owned());
            }
        }
    }
    names.into_iter().collect()
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_bool(name: &str) -> bool {
    matches!(std::env::var(name).as_deref(), Ok("1") | Ok("true"))
}

/// Environment-derived defaults, read once at startup (§6 table).
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub log_level: String,
    pub max_retries: u32,
    pub max_workers: usize,
    pub ssh_keepalive: Duration,
    pub ssh_auto_accept_host_keys: bool,
    pub default_interpreter: String,
    pub run_timeout: Duration,
}

impl RuntimeConfig {
    pub fn from_env() -> RuntimeConfig {
        RuntimeConfig {
            log_level: std::env::var("FZ_LOG").unwrap_or_else(|_| "info".to_string()),
            max_retries: env_u64("FZ_MAX_RETRIES", 3) as u32,
            max_workers: env_u64("FZ_MAX_WORKERS", num_cpus()) as usize,
            ssh_keepalive: Duration::from_secs(env_u64("FZ_SSH_KEEPALIVE", 30)),
            ssh_auto_accept_host_keys: env_bool("FZ_SSH_AUTO_ACCEPT_HOST_KEYS"),
            default_interpreter: std::env::var("FZ_INTERPRETER").unwrap_or_else(|_| "primary".to_string()),
            run_timeout: Duration::from_secs(env_u64("FZ_RUN_TIMEOUT", 3600)),
        }
    }
}

fn num_cpus() -> u64 {
    std::thread::available_parallelism().map(|n| n.get() as u64).unwrap_or(4)
}

pub fn ensure_plugin_dirs_exist(base: &Path) -> std::io::Result<()> {
    for kind in [MODELS_DIR, CALCULATORS_DIR, ALGORITHMS_DIR] {
        std::fs::create_dir_all(base.join(kind))?;
    }
    Ok(())
}
