//! Cache layer fingerprinting (§4.5, §3 "Fingerprint"): a list of
//! `(filename, 128-bit content digest)` pairs covering every compiled input
//! file in a case, stored in a sidecar `.fz_hash` file.

use std::collections::BTreeMap;
use std::path::Path;

use crate::commands::md5sum::md5;
use crate::error::Result;

pub const SIDECAR_FILENAME: &str = ".fz_hash";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fingerprint {
    /// filename -> 128-bit hex digest.
    pub entries: BTreeMap<String, String>,
}

impl Fingerprint {
    /// Compute the fingerprint for every file in `files` (paths relative to
    /// `case_dir`), digesting their on-disk content under the canonical
    /// relative filename (§4.5 step 1).
    pub fn compute(case_dir: &Path, files: &[std::path::PathBuf]) -> Result<Fingerprint> {
        let mut entries = BTreeMap::new();
        for rel in files {
            let bytes = std::fs::read(case_dir.join(rel))?;
            entries.insert(rel.display().to_string(), md5(&bytes));
        }
        Ok(Fingerprint { entries })
    }

    /// Recompute the fingerprint of every file currently on disk under
    /// `case_dir` (used for the Round-trip/idempotence testable properties
    /// and for `fz_hash` regeneration), excluding the sidecar itself, log
    /// files, and result files.
    pub fn compute_tree(case_dir: &Path, exclude: &[&str]) -> Result<Fingerprint> {
        let mut files = Vec::new();
        collect(case_dir, case_dir, exclude, &mut files)?;
        Fingerprint::compute(case_dir, &files)
    }

    /// Two fingerprints match iff they have the same filename set and each
    /// corresponding digest is equal (order-insensitive, §3).
    pub fn matches(&self, other: &Fingerprint) -> bool {
        self.entries == other.entries
    }

    /// `.fz_hash` format (§6): one entry per line, `<digest>\t<filename>`.
    pub fn to_sidecar_text(&self) -> String {
        let mut out = String::new();
        for (name, digest) in &self.entries {
            out.push_str(digest);
            out.push('\t');
            out.push_str(name);
            out.push('\n');
        }
        out
    }

    pub fn parse_sidecar(text: &str) -> Fingerprint {
        let mut entries = BTreeMap::new();
        for line in text.lines() {
            if let Some((digest, name)) = line.split_once('\t') {
                entries.insert(name.to_string(), digest.to_string());
            }
        }
        Fingerprint { entries }
    }

    pub fn write_sidecar(&self, case_dir: &Path) -> Result<()> {
        std::fs::write(case_dir.join(SIDECAR_FILENAME), self.to_sidecar_text())?;
        Ok(())
    }

    pub fn read_sidecar(case_dir: &Path) -> Option<Fingerprint> {
        let text = std::fs::read_to_string(case_dir.join(SIDECAR_FILENAME)).ok()?;
        Some(Fingerprint::parse_sidecar(&text))
    }
}

fn collect(root: &Path, dir: &Path, exclude: &[&str], out: &mut Vec<std::path::PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name();
        let name_str = name.to_string_lossy();
        if exclude.contains(&name_str.as_ref()) {
            continue;
        }
        if path.is_dir() {
            collect(root, &path, exclude, out)?;
        } else {
            out.push(path.strip_prefix(root).unwrap().to_path_buf());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_and_sidecar_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        let fp = Fingerprint::compute(dir.path(), &[std::path::PathBuf::from("a.txt")]).unwrap();
        assert_eq!(fp.entries.len(), 1);
        fp.write_sidecar(dir.path()).unwrap();
        let read_back = Fingerprint::read_sidecar(dir.path()).unwrap();
        assert_eq!(fp, read_back);
    }

    #[test]
    fn order_insensitive_equality() {
        let mut a = BTreeMap::new();
        a.insert("x".to_string(), "aaa".to_string());
        a.insert("y".to_string(), "bbb".to_string());
        let mut b = BTreeMap::new();
        b.insert("y".to_string(), "bbb".to_string());
        b.insert("x".to_string(), "aaa".to_string());
        assert!(Fingerprint { entries: a }.matches(&Fingerprint { entries: b }));
    }

    #[test]
    fn different_digest_does_not_match() {
        let mut a = BTreeMap::new();
        a.insert("x".to_string(), "aaa".to_string());
        let mut b = BTreeMap::new();
        b.insert("x".to_string(), "bbb".to_string());
        assert!(!Fingerprint { entries: a }.matches(&Fingerprint { entries: b }));
    }
}
