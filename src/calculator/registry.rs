//! Calculator alias resolution (§4.8): `calculators/<name>` descriptor files
//! of the form `{uri: <base>, models: {model_name: <command-tail>}}`. When a
//! calculator is given by alias, the engine composes the concrete URI by
//! appending the command-tail registered for the selected model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculatorAlias {
    pub uri: String,
    pub models: BTreeMap<String, String>,
}

impl CalculatorAlias {
    pub fn from_json(text: &str) -> Result<CalculatorAlias> {
        serde_json::from_str(text).map_err(|e| Error::ConfigError(format!("invalid calculator alias: {e}")))
    }

    pub fn from_path(path: &std::path::Path) -> Result<CalculatorAlias> {
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&text)
                .map_err(|e| Error::ConfigError(format!("invalid calculator alias (yaml): {e}"))),
            Some("toml") => {
                toml::from_str(&text).map_err(|e| Error::ConfigError(format!("invalid calculator alias (toml): {e}")))
            }
            _ => Self::from_json(&text),
        }
    }

    /// Compose the concrete URI for `model_name`, failing descriptively if
    /// the alias has no entry for that model (§4.8).
    pub fn compose(&self, model_name: &str) -> Result<String> {
        let tail = self.models.get(model_name).ok_or_else(|| {
            Error::ConfigError(format!(
                "calculator alias has no command-tail registered for model '{model_name}'"
            ))
        })?;
        Ok(format!("{}{}", self.uri, tail))
    }
}

/// Resolve a calculator spec to a concrete URI string, following the
/// precedence alias → file → inline-literal (§4.8). `spec` is tried, in
/// order, as: an alias name under `calculators/`, a file path to an alias
/// descriptor, and finally as a literal calculator URI.
pub fn resolve(spec: &str, model_name: &str) -> Result<String> {
    if let Some(path) = config::resolve_named(config::CALCULATORS_DIR, spec) {
        return CalculatorAlias::from_path(&path)?.compose(model_name);
    }
    let path = std::path::Path::new(spec);
    if path.is_file() {
        return CalculatorAlias::from_path(path)?.compose(model_name);
    }
    if spec.contains("://") {
        return Ok(spec.to_string());
    }
    Err(Error::ConfigError(format!(
        "calculator spec '{spec}' is not a known alias, a readable descriptor file, or a valid URI"
    )))
}
