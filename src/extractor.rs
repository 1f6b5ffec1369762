//! Output extractor (§4.6): for a given case directory and model, execute
//! each declared output-field command with the case directory as the
//! working directory, capture and coerce stdout, and record per-field
//! extraction errors without failing the case.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::Result;
use crate::model::Model;
use crate::toolpath;
use crate::value::{coerce_text, Value};

/// Extract every declared output field for `case_dir` under `model`.
/// A non-zero exit coerces that field to `Value::Null`; per §4.6/§7
/// `ExtractionError`, the failure is non-fatal to the case but must still be
/// observable, so it is both `tracing::warn!`-ed and appended to the case's
/// `log.txt`.
pub fn extract_all(case_dir: &Path, model: &Model) -> Result<BTreeMap<String, Value>> {
    let mut out = BTreeMap::new();
    for (field, command) in &model.output {
        let (value, error) = extract_field(case_dir, command);
        if let Some(message) = &error {
            tracing::warn!(field, command, message, "output field extraction failed; field set to null");
            log_extraction_error(case_dir, field, message);
        }
        out.insert(field.clone(), value);
    }
    Ok(out)
}

/// Append a per-field extraction failure to `case_dir/log.txt`, if present.
/// Best-effort: a failure to write the log must not itself fail extraction.
fn log_extraction_error(case_dir: &Path, field: &str, message: &str) {
    let log_path = case_dir.join("log.txt");
    let line = format!("Extraction error ({field}): {message}\n");
    if let Ok(mut f) = std::fs::OpenOptions::new().create(true).append(true).open(&log_path) {
        let _ = f.write_all(line.as_bytes());
    }
}

/// Run one output-field extraction command, tool-path-resolving its first
/// pipeline stage token. Returns the coerced value and, on non-zero exit,
/// an error message to attach to the case log (§4.6, §7 `ExtractionError`).
pub fn extract_field(case_dir: &Path, command: &str) -> (Value, Option<String>) {
    let resolved = resolve_first_token(command);
    let shell = if cfg!(windows) { "cmd" } else { "sh" };
    let flag = if cfg!(windows) { "/C" } else { "-c" };

    let output = Command::new(shell)
        .arg(flag)
        .arg(&resolved)
        .current_dir(case_dir)
        .stdin(Stdio::null())
        .output();

    match output {
        Ok(out) if out.status.success() => {
            let text = String::from_utf8_lossy(&out.stdout);
            (coerce_text(&text), None)
        }
        Ok(out) => (
            Value::Null,
            Some(format!(
                "extraction command exited with {:?}: {}",
                out.status.code(),
                String::from_utf8_lossy(&out.stderr).trim()
            )),
        ),
        Err(e) => (Value::Null, Some(format!("failed to spawn extraction command: {e}"))),
    }
}

/// Rewrite the first whitespace-delimited token of each pipeline stage
/// (split on `|`) to its resolved absolute path, leaving arguments and
/// shell syntax untouched (§4.6: "rewrites the first token of each pipeline
/// stage... cached on first lookup per process" — caching lives in
/// `toolpath::resolve` itself).
fn resolve_first_token(command: &str) -> String {
    command
        .split('|')
        .map(|stage| {
            let trimmed = stage.trim_start();
            let leading_ws = &stage[..stage.len() - trimmed.len()];
            match trimmed.split_once(char::is_whitespace) {
                Some((tool, rest)) => format!("{leading_ws}{}{rest}", toolpath::resolve(tool)),
                None => format!("{leading_ws}{}", toolpath::resolve(trimmed)),
            }
        })
        .collect::<Vec<_>>()
        .join("|")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_numeric_stdout() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("out.txt"), "42\n").unwrap();
        let (value, error) = extract_field(dir.path(), "cat out.txt");
        assert_eq!(value, Value::Int(42));
        assert!(error.is_none());
    }

    #[test]
    fn nonzero_exit_coerces_to_null_with_error_message() {
        let dir = tempfile::tempdir().unwrap();
        let (value, error) = extract_field(dir.path(), "false");
        assert_eq!(value, Value::Null);
        assert!(error.is_some());
    }

    #[test]
    fn empty_stdout_coerces_to_null() {
        let dir = tempfile::tempdir().unwrap();
        let (value, error) = extract_field(dir.path(), "true");
        assert_eq!(value, Value::Null);
        assert!(error.is_none());
    }

    #[test]
    fn resolve_first_token_preserves_pipeline_syntax() {
        let rewritten = resolve_first_token("cat out.txt | head -n1");
        assert!(rewritten.ends_with("head -n1") || rewritten.contains("head"));
        assert!(rewritten.contains('|'));
    }
}
