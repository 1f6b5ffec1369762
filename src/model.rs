//! Model descriptor (§3 "Model descriptor"): a mapping describing how to
//! read and write user files. Mutated only at load time; immutable during a
//! run.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterpreterKind {
    Primary,
    Statistical,
}

impl Default for InterpreterKind {
    fn default() -> Self {
        InterpreterKind::Primary
    }
}

fn default_varprefix() -> String {
    "$".to_string()
}

fn default_delim() -> (String, String) {
    ("{".to_string(), "}".to_string())
}

fn default_formulaprefix() -> String {
    "@".to_string()
}

fn default_commentline() -> String {
    "#".to_string()
}

fn default_timeout() -> u64 {
    3600
}

/// Separator introducing a default literal in a delimited variable
/// reference (§3 "Variable reference"): `<prefix><left><name>[<sep><default>]<right>`.
pub const DEFAULT_SEP: &str = "~";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    #[serde(default = "default_varprefix")]
    pub varprefix: String,

    /// (left, right) delimiter pair; both empty disables delimited
    /// references entirely for this model.
    #[serde(default = "default_delim")]
    pub delim: (String, String),

    #[serde(default = "default_formulaprefix")]
    pub formulaprefix: String,

    #[serde(default = "default_commentline")]
    pub commentline: String,

    #[serde(default)]
    pub interpreter: InterpreterKind,

    /// Output field name -> extraction command.
    #[serde(default)]
    pub output: IndexMap<String, String>,

    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default)]
    pub id: Option<String>,
}

impl Default for Model {
    fn default() -> Self {
        Self {
            varprefix: default_varprefix(),
            delim: default_delim(),
            formulaprefix: default_formulaprefix(),
            commentline: default_commentline(),
            interpreter: InterpreterKind::default(),
            output: IndexMap::new(),
            timeout: default_timeout(),
            id: None,
        }
    }
}

impl Model {
    /// Parse a model descriptor from JSON text, the canonical schema (§6).
    pub fn from_json(text: &str) -> Result<Model> {
        serde_json::from_str(text)
            .map_err(|e| Error::ConfigError(format!("invalid model descriptor: {e}")))
    }

    /// Parse from YAML, a convenience alternate accepted for the
    /// JSON-compatible schema.
    pub fn from_yaml(text: &str) -> Result<Model> {
        serde_yaml::from_str(text)
            .map_err(|e| Error::ConfigError(format!("invalid model descriptor (yaml): {e}")))
    }

    /// Parse from TOML, a convenience alternate.
    pub fn from_toml(text: &str) -> Result<Model> {
        toml::from_str(text)
            .map_err(|e| Error::ConfigError(format!("invalid model descriptor (toml): {e}")))
    }

    /// Load from a file path, detecting format by extension (falling back
    /// to JSON if the extension is unrecognized).
    pub fn from_path(path: &std::path::Path) -> Result<Model> {
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml(&text),
            Some("toml") => Self::from_toml(&text),
            _ => Self::from_json(&text),
        }
    }

    /// Apply CLI model-field overrides (§6 `run` options
    /// `--varprefix/--delim/--formulaprefix/--commentline/--output-cmd`).
    pub fn apply_overrides(&mut self, overrides: &ModelOverrides) {
        if let Some(v) = &overrides.varprefix {
            self.varprefix = v.clone();
        }
        if let Some((l, r)) = &overrides.delim {
            self.delim = (l.clone(), r.clone());
        }
        if let Some(v) = &overrides.formulaprefix {
            self.formulaprefix = v.clone();
        }
        if let Some(v) = &overrides.commentline {
            self.commentline = v.clone();
        }
        for (name, cmd) in &overrides.output_cmds {
            self.output.insert(name.clone(), cmd.clone());
        }
    }

    pub fn has_delim(&self) -> bool {
        !self.delim.0.is_empty() || !self.delim.1.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModelOverrides {
    pub varprefix: Option<String>,
    pub delim: Option<(String, String)>,
    pub formulaprefix: Option<String>,
    pub commentline: Option<String>,
    pub output_cmds: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_model_matches_spec_defaults() {
        let m = Model::default();
        assert_eq!(m.varprefix, "$");
        assert_eq!(m.delim, ("{".to_string(), "}".to_string()));
        assert_eq!(m.formulaprefix, "@");
        assert_eq!(m.commentline, "#");
        assert_eq!(m.timeout, 3600);
    }

    #[test]
    fn parses_minimal_json() {
        let m = Model::from_json(r#"{"varprefix": "$", "output": {"y": "cat out.txt"}}"#).unwrap();
        assert_eq!(m.varprefix, "$");
        assert_eq!(m.output.get("y"), Some(&"cat out.txt".to_string()));
        assert_eq!(m.delim, ("{".to_string(), "}".to_string()));
    }

    #[test]
    fn overrides_apply() {
        let mut m = Model::default();
        let mut overrides = ModelOverrides::default();
        overrides.varprefix = Some("%".to_string());
        overrides.output_cmds.insert("z".into(), "cat z.txt".into());
        m.apply_overrides(&overrides);
        assert_eq!(m.varprefix, "%");
        assert_eq!(m.output.get("z"), Some(&"cat z.txt".to_string()));
    }
}
