//! Case result record and result-set rendering (§3 "Case result record",
//! §6 `--format json|table|csv|markdown|html`).

use std::collections::BTreeMap;
use std::fmt::Write as _;

use indexmap::IndexMap;
use serde::Serialize;

use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseStatus {
    Done,
    Failed,
    Interrupted,
    Cached,
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStatus::Done => "done",
            CaseStatus::Failed => "failed",
            CaseStatus::Interrupted => "interrupted",
            CaseStatus::Cached => "cached",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CaseResultRecord {
    pub inputs: IndexMap<String, Value>,
    pub outputs: BTreeMap<String, Value>,
    pub status: CaseStatus,
    pub calculator: String,
    pub error: Option<String>,
    pub command: String,
    pub path: String,
}

#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    pub rows: Vec<CaseResultRecord>,
}

impl ResultSet {
    /// Column order: input variable names (declaration order of the first
    /// row), then output field names (sorted), then the fixed metadata
    /// columns.
    fn columns(&self) -> Vec<String> {
        let mut cols = Vec::new();
        if let Some(first) = self.rows.first() {
            cols.extend(first.inputs.keys().cloned());
            cols.extend(first.outputs.keys().cloned());
        }
        cols.extend(["status", "calculator", "error", "command", "path"].map(String::from));
        cols
    }

    fn cell(row: &CaseResultRecord, col: &str) -> String {
        if let Some(v) = row.inputs.get(col) {
            return v.canonical_string();
        }
        if let Some(v) = row.outputs.get(col) {
            return if v.is_null() { String::new() } else { v.canonical_string() };
        }
        match col {
            "status" => row.status.as_str().to_string(),
            "calculator" => row.calculator.clone(),
            "error" => row.error.clone().unwrap_or_default(),
            "command" => row.command.clone(),
            "path" => row.path.clone(),
            _ => String::new(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let rows: Vec<serde_json::Value> = self
            .rows
            .iter()
            .map(|row| {
                let mut obj = serde_json::Map::new();
                for (k, v) in &row.inputs {
                    obj.insert(k.clone(), v.to_json());
                }
                for (k, v) in &row.outputs {
                    obj.insert(k.clone(), v.to_json());
                }
                obj.insert("status".to_string(), serde_json::Value::String(row.status.as_str().to_string()));
                obj.insert("calculator".to_string(), serde_json::Value::String(row.calculator.clone()));
                obj.insert(
                    "error".to_string(),
                    row.error.clone().map(serde_json::Value::String).unwrap_or(serde_json::Value::Null),
                );
                obj.insert("command".to_string(), serde_json::Value::String(row.command.clone()));
                obj.insert("path".to_string(), serde_json::Value::String(row.path.clone()));
                serde_json::Value::Object(obj)
            })
            .collect();
        serde_json::Value::Array(rows)
    }

    pub fn to_csv(&self) -> String {
        let cols = self.columns();
        let mut writer = csv::Writer::from_writer(Vec::new());
        let _ = writer.write_record(&cols);
        for row in &self.rows {
            let record: Vec<String> = cols.iter().map(|c| Self::cell(row, c)).collect();
            let _ = writer.write_record(&record);
        }
        String::from_utf8(writer.into_inner().unwrap_or_default()).unwrap_or_default()
    }

    pub fn to_table(&self) -> String {
        let cols = self.columns();
        let mut widths: Vec<usize> = cols.iter().map(|c| c.len()).collect();
        let cells: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| cols.iter().map(|c| Self::cell(row, c)).collect())
            .collect();
        for row in &cells {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(cell.len());
            }
        }
        let mut out = String::new();
        for (i, col) in cols.iter().enumerate() {
            let _ = write!(out, "{:<width$}  ", col, width = widths[i]);
        }
        out.push('\n');
        for row in &cells {
            for (i, cell) in row.iter().enumerate() {
                let _ = write!(out, "{:<width$}  ", cell, width = widths[i]);
            }
            out.push('\n');
        }
        out
    }

    pub fn to_markdown(&self) -> String {
        let cols = self.columns();
        let mut out = String::new();
        let _ = writeln!(out, "| {} |", cols.join(" | "));
        let _ = writeln!(out, "|{}|", cols.iter().map(|_| "---").collect::<Vec<_>>().join("|"));
        for row in &self.rows {
            let cells: Vec<String> = cols.iter().map(|c| Self::cell(row, c)).collect();
            let _ = writeln!(out, "| {} |", cells.join(" | "));
        }
        out
    }

    pub fn to_html(&self) -> String {
        let cols = self.columns();
        let mut out = String::from("<table>\n  <thead>\n    <tr>");
        for col in &cols {
            let _ = write!(out, "<th>{}</th>", html_escape(col));
        }
        out.push_str("</tr>\n  </thead>\n  <tbody>\n");
        for row in &self.rows {
            out.push_str("    <tr>");
            for col in &cols {
                let _ = write!(out, "<td>{}</td>", html_escape(&Self::cell(row, col)));
            }
            out.push_str("</tr>\n");
        }
        out.push_str("  </tbody>\n</table>\n");
        out
    }

    pub fn render(&self, format: &str) -> String {
        match format {
            "json" => serde_json::to_string_pretty(&self.to_json()).unwrap_or_default(),
            "csv" => self.to_csv(),
            "markdown" => self.to_markdown(),
            "html" => self.to_html(),
            _ => self.to_table(),
        }
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row() -> CaseResultRecord {
        let mut inputs = IndexMap::new();
        inputs.insert("x".to_string(), Value::Int(1));
        let mut outputs = BTreeMap::new();
        outputs.insert("y".to_string(), Value::Float(2.5));
        CaseResultRecord {
            inputs,
            outputs,
            status: CaseStatus::Done,
            calculator: "sh://true".to_string(),
            error: None,
            command: "true".to_string(),
            path: "x=1".to_string(),
        }
    }

    #[test]
    fn json_rendering_includes_status_and_outputs() {
        let rs = ResultSet { rows: vec![sample_row()] };
        let json = rs.to_json();
        assert_eq!(json[0]["status"], "done");
        assert_eq!(json[0]["y"], 2.5);
    }

    #[test]
    fn csv_rendering_has_header_and_one_data_row() {
        let rs = ResultSet { rows: vec![sample_row()] };
        let csv_text = rs.to_csv();
        assert_eq!(csv_text.lines().count(), 2);
    }

    #[test]
    fn markdown_rendering_has_separator_row() {
        let rs = ResultSet { rows: vec![sample_row()] };
        let md = rs.to_markdown();
        assert!(md.lines().nth(1).unwrap().starts_with("|---"));
    }

    #[test]
    fn html_rendering_escapes_values() {
        let mut row = sample_row();
        row.error = Some("<bad>".to_string());
        let rs = ResultSet { rows: vec![row] };
        assert!(rs.to_html().contains("&lt;bad&gt;"));
    }
}
