//! Global tool-path resolver cache (§9 REDESIGN FLAGS: "Global tool-path
//! resolver cache. A process-wide memoizing lookup over a configured search
//! list; invalidate only on explicit reinit call. Thread-safe reads,
//! single-writer initialization.").
//!
//! Backends resolve the first token of a command line (§4.3 "Resolving tool
//! paths") through this cache instead of relying on the child process's own
//! `PATH` lookup, so that `FZ_SHELL_PATH` (§6) takes priority over the
//! platform default and both plain and `.exe`-suffixed spellings are tried.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

struct Resolver {
    search_dirs: Vec<PathBuf>,
    cache: Mutex<HashMap<String, Option<PathBuf>>>,
}

static RESOLVER: OnceLock<Resolver> = OnceLock::new();

fn resolver() -> &'static Resolver {
    RESOLVER.get_or_init(|| Resolver {
        search_dirs: search_dirs_from_env(),
        cache: Mutex::new(HashMap::new()),
    })
}

fn search_dirs_from_env() -> Vec<PathBuf> {
    let sep = if cfg!(windows) { ';' } else { ':' };
    let mut dirs = Vec::new();
    if let Ok(custom) = std::env::var("FZ_SHELL_PATH") {
        dirs.extend(custom.split(sep).filter(|s| !s.is_empty()).map(PathBuf::from));
    }
    if let Ok(path) = std::env::var("PATH") {
        dirs.extend(path.split(sep).filter(|s| !s.is_empty()).map(PathBuf::from));
    }
    dirs
}

/// Resolve `tool` (e.g. "python3") to an absolute path, trying the
/// configured search list before falling back to returning the tool name
/// unchanged (so the OS can still attempt its own lookup). Memoized for the
/// lifetime of the process.
pub fn resolve(tool: &str) -> String {
    if tool.contains(std::path::MAIN_SEPARATOR) || tool.starts_with('/') {
        return tool.to_string();
    }
    let r = resolver();
    {
        let cache = r.cache.lock().unwrap();
        if let Some(hit) = cache.get(tool) {
            return hit.clone().map(path_to_string).unwrap_or_else(|| tool.to_string());
        }
    }
    let found = search(&r.search_dirs, tool);
    let mut cache = r.cache.lock().unwrap();
    cache.insert(tool.to_string(), found.clone());
    found.map(path_to_string).unwrap_or_else(|| tool.to_string())
}

fn search(dirs: &[PathBuf], tool: &str) -> Option<PathBuf> {
    let candidates: &[String] = if cfg!(windows) {
        &[format!("{tool}.exe"), tool.to_string()]
    } else {
        &[tool.to_string()]
    };
    for dir in dirs {
        for name in candidates {
            let candidate = dir.join(name);
            if is_executable(&candidate) {
                return Some(candidate);
            }
        }
    }
    None
}

fn is_executable(path: &Path) -> bool {
    path.is_file()
}

fn path_to_string(p: PathBuf) -> String {
    p.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_tool_passthrough() {
        assert_eq!(resolve("/bin/true"), "/bin/true");
    }

    #[test]
    fn unresolvable_tool_falls_back_to_name() {
        // Extremely unlikely to exist on any PATH.
        assert_eq!(resolve("fz-definitely-not-a-real-tool-xyz"), "fz-definitely-not-a-real-tool-xyz");
    }
}
