//! Case factory (§4.2): expansion of variable specifications into individual
//! cases, and case-directory naming/materialization.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use crate::error::{Error, Result};
use crate::value::Value;

/// One entry of a mapping-form variable specification: either a fixed
/// scalar or a sequence of values to expand over.
#[derive(Debug, Clone)]
pub enum VarSpecEntry {
    Scalar(Value),
    Sequence(Vec<Value>),
}

impl VarSpecEntry {
    pub fn values(&self) -> Vec<Value> {
        match self {
            VarSpecEntry::Scalar(v) => vec![v.clone()],
            VarSpecEntry::Sequence(vs) => vs.clone(),
        }
    }
}

/// A variable specification (§4.2 "Inputs"): either the mapping form
/// (`name -> scalar | sequence`, expanded as a full factorial) or an
/// explicit row set (a sequence of mappings sharing the same keys).
#[derive(Debug, Clone)]
pub enum CaseSpec {
    Mapping(IndexMap<String, VarSpecEntry>),
    RowSet(Vec<IndexMap<String, Value>>),
}

/// A concrete combination of variable values (§3 "Case").
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Case {
    pub values: IndexMap<String, Value>,
}

impl Case {
    pub fn new(values: IndexMap<String, Value>) -> Self {
        Self { values }
    }

    /// Human-readable case key (§3, §4.2): `name=value,name2=value2`,
    /// concatenated in declaration order. Empty when the case has no
    /// variables at all — the single root case.
    pub fn case_key(&self) -> String {
        self.values
            .iter()
            .map(|(k, v)| format!("{}={}", k, v.canonical_string()))
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }
}

/// Parse a variable specification from JSON (§4.2 "Inputs", §6
/// `--input_variables`): either a mapping `name -> scalar | array`, or a
/// JSON array of mappings sharing the same keys (row-set form).
pub fn spec_from_json(text: &str) -> Result<CaseSpec> {
    let json: JsonValue = serde_json::from_str(text)
        .map_err(|e| Error::ConfigError(format!("invalid input variables JSON: {e}")))?;
    match json {
        JsonValue::Object(map) => {
            let mut spec = IndexMap::new();
            for (k, v) in map {
                let entry = match v {
                    JsonValue::Array(items) => VarSpecEntry::Sequence(items.iter().map(Value::from_json).collect()),
                    other => VarSpecEntry::Scalar(Value::from_json(&other)),
                };
                spec.insert(k, entry);
            }
            Ok(CaseSpec::Mapping(spec))
        }
        JsonValue::Array(rows) => {
            let mut out = Vec::with_capacity(rows.len());
            for row in rows {
                let JsonValue::Object(map) = row else {
                    return Err(Error::ConfigError(
                        "row-set input variables must be an array of objects".to_string(),
                    ));
                };
                let mut m = IndexMap::new();
                for (k, v) in map {
                    m.insert(k, Value::from_json(&v));
                }
                out.push(m);
            }
            Ok(CaseSpec::RowSet(out))
        }
        _ => Err(Error::ConfigError(
            "input variables must be a JSON object (mapping form) or array (row-set form)".to_string(),
        )),
    }
}

/// Expand a `CaseSpec` into the ordered case sequence (§4.2 "Semantics").
///
/// Mapping form: full Cartesian product of sequence-valued entries with
/// scalar entries held fixed; iteration order is declaration order, last
/// key varying fastest. An empty mapping yields exactly one case with no
/// variables (the run-directory-root case). Row-set form: exactly the rows,
/// in order.
pub fn expand(spec: &CaseSpec) -> Result<Vec<Case>> {
    let cases = match spec {
        CaseSpec::Mapping(map) => expand_mapping(map),
        CaseSpec::RowSet(rows) => rows
            .iter()
            .map(|row| Case::new(row.clone()))
            .collect(),
    };
    check_unique_keys(&cases)?;
    Ok(cases)
}

fn expand_mapping(map: &IndexMap<String, VarSpecEntry>) -> Vec<Case> {
    if map.is_empty() {
        return vec![Case::default()];
    }

    let keys: Vec<&String> = map.keys().collect();
    let mut combos: Vec<IndexMap<String, Value>> = vec![IndexMap::new()];

    // Folding left-to-right over keys while appending to the *end* of each
    // partial assignment, then expanding the last key fastest, requires the
    // last key to be the innermost loop. We build that by processing keys
    // in order and, for each, multiplying the existing partial combos by
    // this key's values, with this key's variation happening in the
    // innermost (most frequently changing) position relative to keys
    // processed so far.
    for key in &keys {
        let values = map[*key].values();
        let mut next = Vec::with_capacity(combos.len() * values.len());
        for combo in &combos {
            for v in &values {
                let mut c = combo.clone();
                c.insert((*key).clone(), v.clone());
                next.push(c);
            }
        }
        combos = next;
    }

    combos.into_iter().map(Case::new).collect()
}

fn check_unique_keys(cases: &[Case]) -> Result<()> {
    let mut seen = HashSet::new();
    for case in cases {
        let key = case.case_key();
        if !seen.insert(key.clone()) {
            return Err(Error::FatalError(format!(
                "duplicate case directory name '{}': two cases in one run must not collide",
                key
            )));
        }
    }
    Ok(())
}
