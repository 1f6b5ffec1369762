//! A small dynamically-typed value used for case variables and output fields.
//!
//! Mirrors the coercion ladder in §4.6 of the spec: structured-data parse,
//! then a restricted literal grammar (ints/floats/lists/maps), then plain
//! numeric parse, then string. Kept deliberately small — this is not a
//! general value system, just enough to round-trip case inputs and
//! extracted outputs through JSON/CSV/table rendering.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value as JsonValue;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Canonical string form used for case-key formatting (§4.2): integers
    /// without a decimal point, floats in shortest round-trip form, strings
    /// verbatim.
    pub fn canonical_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format_float_shortest(*f),
            Value::Str(s) => s.clone(),
            Value::List(items) => items
                .iter()
                .map(Value::canonical_string)
                .collect::<Vec<_>>()
                .join(","),
            Value::Map(_) => self.to_json().to_string(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Str(s) => s.parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Int(i) => JsonValue::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::Str(s) => JsonValue::String(s.clone()),
            Value::List(items) => JsonValue::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(m) => {
                let mut obj = serde_json::Map::new();
                for (k, v) in m {
                    obj.insert(k.clone(), v.to_json());
                }
                JsonValue::Object(obj)
            }
        }
    }

    pub fn from_json(v: &JsonValue) -> Value {
        match v {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Str(b.to_string()),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            JsonValue::String(s) => Value::Str(s.clone()),
            JsonValue::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
            JsonValue::Object(obj) => {
                let mut m = BTreeMap::new();
                for (k, v) in obj {
                    m.insert(k.clone(), Value::from_json(v));
                }
                Value::Map(m)
            }
        }
    }

    /// Parse a scalar spec value (as it appears in a variable specification
    /// or a case row) into a Value, trying numeric forms before falling back
    /// to string.
    pub fn parse_scalar(s: &str) -> Value {
        let trimmed = s.trim();
        if let Ok(i) = trimmed.parse::<i64>() {
            return Value::Int(i);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            return Value::Float(f);
        }
        Value::Str(s.to_string())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical_string())
    }
}

/// Shortest round-trip decimal formatting for a float, matching common
/// "shortest repr" behavior (e.g. 25.0 -> "25", 298.15 -> "298.15").
pub fn format_float_shortest(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf".to_string() } else { "-inf".to_string() };
    }
    if f == f.trunc() && f.abs() < 1e15 {
        return format!("{}", f as i64);
    }
    let mut s = format!("{}", f);
    if !s.contains('.') && !s.contains('e') {
        s.push_str(".0");
    }
    s
}

/// Coerce raw captured text (e.g. extraction-command stdout) to a Value,
/// following the ladder in §4.6: structured-data parse, then a restricted
/// literal grammar, then plain numeric, then string. A trimmed-empty string
/// coerces to Null. A one-element list collapses to its element.
pub fn coerce_text(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }

    if let Ok(json) = serde_json::from_str::<JsonValue>(trimmed) {
        return collapse_singleton(Value::from_json(&json));
    }

    if let Some(v) = parse_literal(trimmed) {
        return collapse_singleton(v);
    }

    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::Int(i);
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        return Value::Float(f);
    }

    Value::Str(trimmed.to_string())
}

fn collapse_singleton(v: Value) -> Value {
    match v {
        Value::List(mut items) if items.len() == 1 => items.pop().unwrap(),
        other => other,
    }
}

/// A restricted Python-literal-like grammar covering ints, floats, quoted
/// strings, lists, and simple `key: value` dict literals — enough to read
/// the output of extraction commands that print a repr rather than JSON.
fn parse_literal(s: &str) -> Option<Value> {
    let mut chars = s.chars().peekable();
    let v = parse_literal_value(&mut chars)?;
    skip_ws(&mut chars);
    if chars.next().is_some() {
        return None;
    }
    Some(v)
}

fn skip_ws(chars: &mut std::iter::Peekable<std::str::Chars>) {
    while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
        chars.next();
    }
}

fn parse_literal_value(chars: &mut std::iter::Peekable<std::str::Chars>) -> Option<Value> {
    skip_ws(chars);
    match chars.peek()? {
        '[' => parse_literal_list(chars),
        '{' => parse_literal_dict(chars),
        '\'' | '"' => parse_literal_string(chars),
        _ => parse_literal_number(chars),
    }
}

fn parse_literal_list(chars: &mut std::iter::Peekable<std::str::Chars>) -> Option<Value> {
    chars.next(); // [
    let mut items = Vec::new();
    skip_ws(chars);
    if chars.peek() == Some(&']') {
        chars.next();
        return Some(Value::List(items));
    }
    loop {
        let v = parse_literal_value(chars)?;
        items.push(v);
        skip_ws(chars);
        match chars.next()? {
            ',' => continue,
            ']' => break,
            _ => return None,
        }
    }
    Some(Value::List(items))
}

fn parse_literal_dict(chars: &mut std::iter::Peekable<std::str::Chars>) -> Option<Value> {
    chars.next(); // {
    let mut map = BTreeMap::new();
    skip_ws(chars);
    if chars.peek() == Some(&'}') {
        chars.next();
        return Some(Value::Map(map));
    }
    loop {
        skip_ws(chars);
        let key = match parse_literal_value(chars)? {
            Value::Str(s) => s,
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format_float_shortest(f),
            _ => return None,
        };
        skip_ws(chars);
        if chars.next()? != ':' {
            return None;
        }
        let v = parse_literal_value(chars)?;
        map.insert(key, v);
        skip_ws(chars);
        match chars.next()? {
            ',' => continue,
            '}' => break,
            _ => return None,
        }
    }
    Some(Value::Map(map))
}

fn parse_literal_string(chars: &mut std::iter::Peekable<std::str::Chars>) -> Option<Value> {
    let quote = chars.next()?;
    let mut out = String::new();
    loop {
        match chars.next()? {
            c if c == quote => break,
            '\\' => {
                let esc = chars.next()?;
                out.push(esc);
            }
            c => out.push(c),
        }
    }
    Some(Value::Str(out))
}

fn parse_literal_number(chars: &mut std::iter::Peekable<std::str::Chars>) -> Option<Value> {
    let mut s = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() || c == '.' || c == '-' || c == '+' || c == 'e' || c == 'E' {
            s.push(c);
            chars.next();
        } else {
            break;
        }
    }
    if s.is_empty() {
        return None;
    }
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::Int(i));
    }
    s.parse::<f64>().ok().map(Value::Float)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_string_formats() {
        assert_eq!(Value::Int(42).canonical_string(), "42");
        assert_eq!(Value::Float(298.15).canonical_string(), "298.15");
        assert_eq!(Value::Float(25.0).canonical_string(), "25");
        assert_eq!(Value::Str("hi".into()).canonical_string(), "hi");
    }

    #[test]
    fn coerce_empty_is_null() {
        assert_eq!(coerce_text(""), Value::Null);
        assert_eq!(coerce_text("   "), Value::Null);
    }

    #[test]
    fn coerce_numeric() {
        assert_eq!(coerce_text("42"), Value::Int(42));
        assert_eq!(coerce_text("3.14"), Value::Float(3.14));
    }

    #[test]
    fn coerce_json_list_singleton_collapses() {
        assert_eq!(coerce_text("[42]"), Value::Int(42));
        assert_eq!(
            coerce_text("[1, 2]"),
            Value::List(vec![Value::Int(1), Value::Int(2)])
        );
    }

    #[test]
    fn coerce_literal_dict() {
        let v = coerce_text("{'a': 1, 'b': 2.5}");
        match v {
            Value::Map(m) => {
                assert_eq!(m.get("a"), Some(&Value::Int(1)));
                assert_eq!(m.get("b"), Some(&Value::Float(2.5)));
            }
            other => panic!("expected map, got {:?}", other),
        }
    }

    #[test]
    fn coerce_plain_string_fallback() {
        assert_eq!(coerce_text("ok"), Value::Str("ok".to_string()));
    }
}
