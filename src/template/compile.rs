//! Template compilation (§4.1 `Compile`): normalize legacy spellings,
//! evaluate embedded expressions, substitute variable references, copy
//! non-text files unchanged. The produced tree mirrors the input tree
//! relative to `out_dir`. Compiled files are written atomically (write to a
//! temp file in the same directory, then rename — §5 "Filesystem
//! discipline").

use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::case::Case;
use crate::error::Result;
use crate::model::Model;
use crate::template::{discover, expression, legacy};
use crate::value::Value;

/// Compile every file under `input_path` into `out_dir`, substituting
/// `case`'s values. Returns the list of relative output paths written
/// (compiled inputs set, used by the cache layer to compute fingerprints).
pub fn compile(input_path: &Path, case: &Case, model: &Model, out_dir: &Path) -> Result<Vec<PathBuf>> {
    let files = discover::walk_files(input_path)?;
    let single_file = input_path.is_file();
    let mut written = Vec::new();

    for file in files {
        let rel = if single_file {
            PathBuf::from(file.file_name().unwrap())
        } else {
            file.strip_prefix(input_path).unwrap().to_path_buf()
        };
        let dest = out_dir.join(&rel);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let bytes = std::fs::read(&file)?;
        if discover::is_probably_binary(&bytes) {
            std::fs::write(&dest, &bytes)?;
        } else {
            let text = String::from_utf8_lossy(&bytes);
            let normalized = legacy::normalize(&text, model);
            let compiled = expression::process_file(
                &rel.display().to_string(),
                &normalized,
                model,
                &case_values(case),
                |name| {
                    tracing::warn!(file = %rel.display(), variable = name, "variable reference fell back to default or is unresolved");
                },
            );
            write_atomic(&dest, compiled.as_bytes())?;
        }
        written.push(rel);
    }

    Ok(written)
}

fn case_values(case: &Case) -> IndexMap<String, Value> {
    case.values.clone()
}

fn write_atomic(dest: &Path, bytes: &[u8]) -> Result<()> {
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    std::io::Write::write_all(&mut tmp, bytes)?;
    tmp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn case_with(pairs: &[(&str, Value)]) -> Case {
        let mut m = IndexMap::new();
        for (k, v) in pairs {
            m.insert(k.to_string(), v.clone());
        }
        Case::new(m)
    }

    #[test]
    fn identity_substitution_scenario() {
        // Scenario 1 (§8): template "x=$x\n"; vars {x: 42}.
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("input.txt"), "x=$x\n").unwrap();
        let model = Model::default();
        let case = case_with(&[("x", Value::Int(42))]);
        let out_dir = tempfile::tempdir().unwrap();
        compile(dir.path(), &case, &model, out_dir.path()).unwrap();
        let content = std::fs::read_to_string(out_dir.path().join("input.txt")).unwrap();
        assert_eq!(content, "x=42\n");
    }

    #[test]
    fn round_trip_with_no_variables_leaves_bytes_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("plain.txt"), "just text\nno vars\n").unwrap();
        let model = Model::default();
        let case = Case::default();
        let out_dir = tempfile::tempdir().unwrap();
        compile(dir.path(), &case, &model, out_dir.path()).unwrap();
        let content = std::fs::read_to_string(out_dir.path().join("plain.txt")).unwrap();
        assert_eq!(content, "just text\nno vars\n");
    }

    #[test]
    fn binary_files_are_copied_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = [0u8, 159, 1, 2];
        std::fs::write(dir.path().join("blob.bin"), bytes).unwrap();
        let model = Model::default();
        let case = Case::default();
        let out_dir = tempfile::tempdir().unwrap();
        compile(dir.path(), &case, &model, out_dir.path()).unwrap();
        let content = std::fs::read(out_dir.path().join("blob.bin")).unwrap();
        assert_eq!(content, bytes);
    }

    #[test]
    fn expression_scenario() {
        // Scenario 3 (§8).
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("input.txt"), "T=$T\n#@ k = $T + 273.15\nTK=@{k}\n").unwrap();
        let model = Model::default();
        let case = case_with(&[("T", Value::Int(25))]);
        let out_dir = tempfile::tempdir().unwrap();
        compile(dir.path(), &case, &model, out_dir.path()).unwrap();
        let content = std::fs::read_to_string(out_dir.path().join("input.txt")).unwrap();
        assert_eq!(content, "T=25\nTK=298.15\n");
    }
}
