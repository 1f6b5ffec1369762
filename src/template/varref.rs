//! Variable reference scanning (§3 "Variable reference"): simple
//! (`<prefix><name>`) and delimited (`<prefix><left><name>[<sep><default>]<right>`)
//! forms.

use indexmap::IndexMap;

use crate::model::{Model, DEFAULT_SEP};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct VarRefMatch {
    pub start: usize,
    pub end: usize,
    pub name: String,
    pub default: Option<String>,
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Scan `text` for every occurrence of a variable reference under `model`'s
/// syntax. Non-overlapping, left to right.
pub fn find_refs(text: &str, model: &Model) -> Vec<VarRefMatch> {
    let mut out = Vec::new();
    if model.varprefix.is_empty() {
        return out;
    }
    let prefix = model.varprefix.as_str();
    let mut i = 0;
    while i < text.len() {
        if text[i..].starts_with(prefix) {
            let after_prefix = i + prefix.len();

            if model.has_delim() && !model.delim.0.is_empty() && text[after_prefix..].starts_with(model.delim.0.as_str())
            {
                let inner_start = after_prefix + model.delim.0.len();
                if let Some(rel_end) = text[inner_start..].find(model.delim.1.as_str()) {
                    let inner = &text[inner_start..inner_start + rel_end];
                    let end = inner_start + rel_end + model.delim.1.len();
                    let (name, default) = match inner.find(DEFAULT_SEP) {
                        Some(p) => (
                            inner[..p].to_string(),
                            Some(inner[p + DEFAULT_SEP.len()..].to_string()),
                        ),
                        None => (inner.to_string(), None),
                    };
                    if is_valid_name(&name) {
                        out.push(VarRefMatch { start: i, end, name, default });
                        i = end;
                        continue;
                    }
                }
            }

            let name_start = after_prefix;
            let mut name_end = name_start;
            for (idx, c) in text[name_start..].char_indices() {
                if c.is_ascii_alphanumeric() || c == '_' {
                    name_end = name_start + idx + c.len_utf8();
                } else {
                    break;
                }
            }
            if name_end > name_start {
                out.push(VarRefMatch {
                    start: i,
                    end: name_end,
                    name: text[name_start..name_end].to_string(),
                    default: None,
                });
                i = name_end;
                continue;
            }
        }
        let step = text[i..].chars().next().map(|c| c.len_utf8()).unwrap_or(1);
        i += step;
    }
    out
}

/// Every distinct variable name referenced anywhere in `text`.
pub fn discover_names(text: &str, model: &Model) -> Vec<String> {
    let mut seen = std::collections::BTreeSet::new();
    for r in find_refs(text, model) {
        seen.insert(r.name);
    }
    seen.into_iter().collect()
}

/// Substitute every variable reference in `text` with its value from
/// `values`, honoring a reference's own default when `values` omits that
/// name. Calls `on_missing` (name) once per reference site that falls back
/// to a default or is otherwise missing, so the caller can emit the warning
/// required by §4.1 ("emit a warning; never fail").
pub fn substitute(
    text: &str,
    model: &Model,
    values: &IndexMap<String, Value>,
    mut on_missing: impl FnMut(&str),
) -> String {
    let refs = find_refs(text, model);
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for r in refs {
        out.push_str(&text[last..r.start]);
        let replacement = match values.get(&r.name) {
            Some(v) => v.canonical_string(),
            None => {
                on_missing(&r.name);
                match &r.default {
                    Some(d) => d.clone(),
                    None => text[r.start..r.end].to_string(),
                }
            }
        };
        out.push_str(&replacement);
        last = r.end;
    }
    out.push_str(&text[last..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> Model {
        Model::default()
    }

    #[test]
    fn finds_simple_ref() {
        let m = model();
        let refs = find_refs("x=$x\n", &m);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].name, "x");
        assert_eq!(refs[0].default, None);
    }

    #[test]
    fn finds_delimited_ref_with_default() {
        let m = model();
        let refs = find_refs("y=${count~10}\n", &m);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].name, "count");
        assert_eq!(refs[0].default.as_deref(), Some("10"));
    }

    #[test]
    fn substitute_uses_provided_value() {
        let m = model();
        let mut values = IndexMap::new();
        values.insert("x".to_string(), Value::Int(42));
        let mut warnings = 0;
        let out = substitute("x=$x\n", &m, &values, |_| warnings += 1);
        assert_eq!(out, "x=42\n");
        assert_eq!(warnings, 0);
    }

    #[test]
    fn substitute_falls_back_to_default_and_warns_once() {
        let m = model();
        let values = IndexMap::new();
        let mut warnings = 0;
        let out = substitute("y=${count~10}\n", &m, &values, |_| warnings += 1);
        assert_eq!(out, "y=10\n");
        assert_eq!(warnings, 1);
    }

    #[test]
    fn discover_collects_distinct_names() {
        let m = model();
        let names = discover_names("$a $b $a ${c~1}", &m);
        assert_eq!(names, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
    }
}
