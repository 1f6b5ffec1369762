//! Variable discovery (§4.1 `Discover`).

use std::collections::BTreeSet;
use std::path::Path;

use crate::error::{Error, Result};
use crate::model::Model;
use crate::template::varref;

/// Probe window size for the binary-file null-byte check.
const BINARY_PROBE_BYTES: usize = 8192;

pub fn is_probably_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(BINARY_PROBE_BYTES).any(|&b| b == 0)
}

/// Return every distinct variable name referenced in the file or files
/// under `input_path`. Binary files are skipped. Fails with an `Io` error on
/// unreadable paths.
pub fn discover(input_path: &Path, model: &Model) -> Result<BTreeSet<String>> {
    let mut names = BTreeSet::new();
    for file in walk_files(input_path)? {
        let bytes = std::fs::read(&file)?;
        if is_probably_binary(&bytes) {
            continue;
        }
        let text = String::from_utf8_lossy(&bytes);
        for name in varref::discover_names(&text, model) {
            names.insert(name);
        }
    }
    Ok(names)
}

/// Enumerate every regular file under `root` (or just `root` itself if it
/// is a file), in a deterministic order.
pub fn walk_files(root: &Path) -> Result<Vec<std::path::PathBuf>> {
    if !root.exists() {
        return Err(Error::TemplateError {
            path: root.display().to_string(),
            message: "input path does not exist".to_string(),
        });
    }
    let mut out = Vec::new();
    walk_inner(root, &mut out)?;
    out.sort();
    Ok(out)
}

fn walk_inner(path: &Path, out: &mut Vec<std::path::PathBuf>) -> Result<()> {
    let meta = std::fs::symlink_metadata(path)?;
    if meta.is_dir() {
        for entry in std::fs::read_dir(path)? {
            walk_inner(&entry?.path(), out)?;
        }
    } else if meta.is_file() {
        out.push(path.to_path_buf());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn discovers_variables_in_a_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("input.txt");
        std::fs::write(&file, "x=$x\ny=$y\n").unwrap();
        let model = Model::default();
        let names = discover(dir.path(), &model).unwrap();
        assert_eq!(names, ["x".to_string(), "y".to_string()].into_iter().collect());
    }

    #[test]
    fn skips_binary_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("blob.bin");
        let mut f = std::fs::File::create(&file).unwrap();
        f.write_all(&[0u8, 1, 2, 3]).unwrap();
        let model = Model::default();
        let names = discover(dir.path(), &model).unwrap();
        assert!(names.is_empty());
    }

    #[test]
    fn missing_path_is_an_error() {
        let model = Model::default();
        assert!(discover(Path::new("/nonexistent/path/xyz"), &model).is_err());
    }
}
