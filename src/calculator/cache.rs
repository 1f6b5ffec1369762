//! Content-addressed cache backend (§4.3.5, §4.5): enumerates candidate case
//! directories matching a glob under the cache root; a hit requires a
//! matching fingerprint and every declared output field to currently
//! extract as non-null under the candidate. Never spawns a process.

use std::path::Path;
use std::time::{Duration, SystemTime};

use crate::calculator::{CalculatorDescriptor, CaseOutcome};
use crate::error::Result;
use crate::extractor;
use crate::fingerprint::{Fingerprint, SIDECAR_FILENAME};
use crate::model::Model;
use crate::shutdown::ShutdownFlag;

pub struct CacheBackend {
    desc: CalculatorDescriptor,
}

impl CacheBackend {
    pub fn new(desc: CalculatorDescriptor) -> Self {
        Self { desc }
    }

    /// Attempt a cache hit for `case_dir` (whose fingerprint is `target`)
    /// against every candidate directory matched by this descriptor's glob,
    /// using `model` to re-run the output extractor against each candidate.
    /// Zero matches is a miss, not an error (§8 boundary behavior).
    ///
    /// A glob match that itself carries no `.fz_hash` sidecar (e.g. a
    /// `cache://<run-dir>` pattern matching the run's root rather than one
    /// of its `name=value` case subdirectories) is expanded to its immediate
    /// child directories, so both the `cache://<run-dir>` and
    /// `cache://<run-dir>/*` spellings reach the same per-case candidates
    /// (§8 scenario 4 uses the former).
    pub fn probe(&self, case_dir: &Path, target: &Fingerprint, model: &Model) -> Result<Option<std::path::PathBuf>> {
        let pattern = &self.desc.command;
        for entry in glob::glob(pattern).map_err(|e| crate::error::Error::ConfigError(format!("invalid cache glob '{pattern}': {e}")))? {
            let matched = match entry {
                Ok(p) => p,
                Err(_) => continue,
            };
            if !matched.is_dir() {
                continue;
            }
            for candidate in candidate_dirs(&matched) {
                if candidate == case_dir {
                    continue;
                }
                let candidate_fp = match Fingerprint::read_sidecar(&candidate) {
                    Some(fp) => fp,
                    None => continue,
                };
                if !fingerprint_is_subset_match(target, &candidate_fp) {
                    continue;
                }
                let outputs = extractor::extract_all(&candidate, model)?;
                if model.output.keys().all(|field| outputs.get(field).map_or(false, |v| !v.is_null())) {
                    return Ok(Some(candidate));
                }
            }
        }
        Ok(None)
    }
}

/// `matched` itself if it carries a fingerprint sidecar directly, otherwise
/// its immediate child directories that do.
fn candidate_dirs(matched: &Path) -> Vec<std::path::PathBuf> {
    if matched.join(SIDECAR_FILENAME).is_file() {
        return vec![matched.to_path_buf()];
    }
    let Ok(entries) = std::fs::read_dir(matched) else {
        return Vec::new();
    };
    entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir() && p.join(SIDECAR_FILENAME).is_file())
        .collect()
}

/// Every filename in `target` must be present in `candidate` with an equal
/// digest (§4.5: "requires every filename in the target case fingerprint to
/// be present in the candidate with an equal content digest").
fn fingerprint_is_subset_match(target: &Fingerprint, candidate: &Fingerprint) -> bool {
    target.entries.iter().all(|(name, digest)| candidate.entries.get(name) == Some(digest))
}

impl super::Calculator for CacheBackend {
    fn run(
        &self,
        case_dir: &Path,
        _command: &str,
        _effective_timeout: Duration,
        _shutdown: &ShutdownFlag,
    ) -> Result<CaseOutcome> {
        // The scheduler calls `probe` directly before falling back to this
        // generic `Run` entry point (a cache hit never "runs" anything); if
        // reached here with no prior probe, report a miss by construction.
        let log_path = case_dir.join("log.txt");
        let start = SystemTime::now();
        std::fs::write(&log_path, format!("Command: cache probe\nTime start: {start:?}\n"))?;
        Ok(CaseOutcome {
            exit_status: None,
            stdout_path: case_dir.join("out.txt"),
            stderr_path: case_dir.join("err.txt"),
            log_path,
            error: None,
            cached: false,
        })
    }

    fn identity(&self) -> &str {
        &self.desc.uri
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn subset_match_requires_every_target_file_present_with_equal_digest() {
        let mut target = BTreeMap::new();
        target.insert("a.txt".to_string(), "aaa".to_string());
        let mut candidate = BTreeMap::new();
        candidate.insert("a.txt".to_string(), "aaa".to_string());
        candidate.insert("extra.txt".to_string(), "zzz".to_string());
        assert!(fingerprint_is_subset_match(
            &Fingerprint { entries: target.clone() },
            &Fingerprint { entries: candidate }
        ));

        let mut mismatched = BTreeMap::new();
        mismatched.insert("a.txt".to_string(), "different".to_string());
        assert!(!fingerprint_is_subset_match(
            &Fingerprint { entries: target },
            &Fingerprint { entries: mismatched }
        ));
    }

    #[test]
    fn candidate_dirs_expands_a_run_root_into_its_case_subdirectories() {
        let root = tempfile::tempdir().unwrap();
        let case_dir = root.path().join("a=1,b=10");
        std::fs::create_dir_all(&case_dir).unwrap();
        std::fs::write(case_dir.join(SIDECAR_FILENAME), "deadbeef\tinput.txt\n").unwrap();
        // A sibling directory with no sidecar must not be treated as a candidate.
        std::fs::create_dir_all(root.path().join("not-a-case")).unwrap();

        let found = candidate_dirs(root.path());
        assert_eq!(found, vec![case_dir]);
    }

    #[test]
    fn candidate_dirs_returns_the_directory_itself_when_it_carries_a_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SIDECAR_FILENAME), "deadbeef\tinput.txt\n").unwrap();
        assert_eq!(candidate_dirs(dir.path()), vec![dir.path().to_path_buf()]);
    }

    #[test]
    fn zero_glob_matches_is_a_miss_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let desc = CalculatorDescriptor::parse(&format!("cache://{}/nonexistent-*", dir.path().display())).unwrap();
        let backend = CacheBackend::new(desc);
        let target = Fingerprint::default();
        let model = Model::default();
        let hit = backend.probe(dir.path(), &target, &model).unwrap();
        assert!(hit.is_none());
    }
}
