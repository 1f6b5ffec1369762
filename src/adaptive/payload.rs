//! Analysis payload content sniffing (§4.7 "Analysis payload dispatch"):
//! save an algorithm's free-form text report under the extension its
//! content implies, and surface parsed structured forms as first-class
//! fields.

use std::path::Path;

use crate::adaptive::AnalysisResult;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Html,
    Json,
    Markdown,
    KeyValue,
    PlainText,
}

/// Sniff `text` and return the extension-bearing kind it should be saved
/// as, per the ordered rules in §4.7: an HTML tag wins first, then a
/// successful structured-data parse, then a markdown-header pattern, then
/// key=value lines, else plain text.
pub fn sniff(text: &str) -> PayloadKind {
    let trimmed = text.trim_start();
    if looks_like_html(trimmed) {
        return PayloadKind::Html;
    }
    if serde_json::from_str::<serde_json::Value>(trimmed).is_ok() && !trimmed.is_empty() {
        return PayloadKind::Json;
    }
    if looks_like_markdown(text) {
        return PayloadKind::Markdown;
    }
    if looks_like_key_value(text) {
        return PayloadKind::KeyValue;
    }
    PayloadKind::PlainText
}

fn looks_like_html(trimmed: &str) -> bool {
    trimmed.starts_with('<')
        && trimmed
            .find('>')
            .map(|i| trimmed[1..i].chars().next().is_some_and(|c| c.is_alphabetic() || c == '!'))
            .unwrap_or(false)
}

fn looks_like_markdown(text: &str) -> bool {
    text.lines().any(|l| l.starts_with('#') || l.starts_with("## "))
}

fn looks_like_key_value(text: &str) -> bool {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    !lines.is_empty() && lines.iter().all(|l| l.splitn(2, '=').count() == 2)
}

fn extension(kind: PayloadKind) -> Option<&'static str> {
    match kind {
        PayloadKind::Html => Some("html"),
        PayloadKind::Json => Some("json"),
        PayloadKind::Markdown => Some("md"),
        PayloadKind::KeyValue => Some("txt"),
        PayloadKind::PlainText => None,
    }
}

/// Dispatch an analysis payload to disk under `base_path` (no extension),
/// choosing the extension by content sniffing. Returns without writing
/// anything for plain text with no recognizable structure — it stays
/// in-memory only, per §4.7.
pub fn dispatch(result: &AnalysisResult, base_path: &Path) -> Result<()> {
    let kind = sniff(&result.text);
    if let Some(ext) = extension(kind) {
        let path = base_path.with_extension(ext);
        std::fs::write(path, &result.text)?;
    }
    if let Some(data) = &result.data {
        let json_path = base_path.with_extension("data.json");
        let text = serde_json::to_string_pretty(&data.to_json())
            .unwrap_or_else(|_| data.canonical_string());
        std::fs::write(json_path, text)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_html() {
        assert_eq!(sniff("<html><body>report</body></html>"), PayloadKind::Html);
    }

    #[test]
    fn sniffs_json() {
        assert_eq!(sniff(r#"{"r2": 0.98}"#), PayloadKind::Json);
    }

    #[test]
    fn sniffs_markdown_header() {
        assert_eq!(sniff("# Report\n\nsome text"), PayloadKind::Markdown);
    }

    #[test]
    fn sniffs_key_value_lines() {
        assert_eq!(sniff("r2=0.98\nrmse=1.2\n"), PayloadKind::KeyValue);
    }

    #[test]
    fn falls_back_to_plain_text() {
        assert_eq!(sniff("just some prose about the fit"), PayloadKind::PlainText);
    }

    #[test]
    fn dispatch_writes_no_file_for_plain_text() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("analysis");
        let result = AnalysisResult { text: "plain prose".to_string(), data: None };
        dispatch(&result, &base).unwrap();
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[test]
    fn dispatch_writes_html_file() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("analysis");
        let result = AnalysisResult { text: "<p>hi</p>".to_string(), data: None };
        dispatch(&result, &base).unwrap();
        assert!(dir.path().join("analysis.html").exists());
    }
}
