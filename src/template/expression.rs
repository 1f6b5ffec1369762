//! Embedded-expression evaluation (§4.1 "Expression evaluation").
//!
//! The "primary interpreter" required by the spec (a general-purpose
//! scripting evaluator with numeric, math, and user-defined-function
//! support) is this crate's own AWK interpreter (`crate::commands::awk`) —
//! already present in the teacher tree with floating-point arithmetic,
//! math builtins (`sqrt`, `sin`, `cos`, `log`, `exp`, ...), and
//! user-defined functions, and easily embedded without going through the
//! shell dispatcher: we parse a `BEGIN`-only program and drive it directly.
//!
//! Each file gets one fresh `AwkContext` (§4.1 invariant: "sandboxed to one
//! case/file; no state leaks between files"). Context-line bodies
//! (`commentline + formulaprefix`, e.g. `#@`) accumulate, in file order,
//! into the `BEGIN` block; inline expressions (`formulaprefix + delim.left
//! + expr + delim.right`, e.g. `@{expr}`) are appended as prints separated
//! by a sentinel so their results can be recovered positionally. Variable
//! references inside both are substituted lexically before the program is
//! built, per §4.1 ("Variable references inside context lines or
//! expressions are substituted first, lexically.").
//!
//! A parse failure or a runtime panic inside the embedded interpreter is
//! caught and treated as a failure of every pending expression in the file:
//! each keeps its original marker text and a warning is logged
//! (`ExpressionWarning`, §7 — "non-fatal; original text preserved, warning
//! logged"). This is coarser than per-expression attribution, but keeps the
//! "never abort compilation" invariant intact; see DESIGN.md.

use std::panic::AssertUnwindSafe;

use indexmap::IndexMap;

use crate::commands::awk::context::AwkContext;
use crate::commands::awk::interpreter::AwkInterpreter;
use crate::commands::awk::parser::parse as parse_awk;
use crate::error::log_expression_warning;
use crate::model::Model;
use crate::template::varref;
use crate::value::Value;

const SENTINEL: char = '\u{0001}';

enum Piece {
    Text(String),
    Expr { index: usize, original: String },
}

/// Evaluate embedded expressions in `text` and return the resulting file
/// content (context lines removed, inline expressions replaced by their
/// evaluated string form). Plain (non-expression) variable references are
/// substituted as part of this pass so the whole file only needs one
/// left-to-right scan. `on_missing` is invoked once per variable reference
/// that falls back to a default or is otherwise unresolved (§4.1 "emit a
/// warning; never fail").
pub fn process_file(
    file_label: &str,
    text: &str,
    model: &Model,
    values: &IndexMap<String, Value>,
    mut on_missing: impl FnMut(&str),
) -> String {
    let mut context_stmts: Vec<String> = Vec::new();
    let mut expr_sources: Vec<String> = Vec::new();
    let mut pieces: Vec<Piece> = Vec::new();

    let context_marker = format!("{}{}", model.commentline, model.formulaprefix);

    for line in split_keep_terminators(text) {
        let trimmed = line.trim_start();
        if !context_marker.is_empty() && trimmed.starts_with(&context_marker) {
            let payload = &trimmed[context_marker.len()..];
            let substituted =
                varref::substitute(payload, model, values, |name| on_missing(name));
            context_stmts.push(substituted.trim_end_matches('\n').to_string());
            continue; // context lines are consumed, never emitted
        }

        pieces.extend(split_inline_expressions(
            line,
            model,
            values,
            &mut expr_sources,
            &mut on_missing,
        ));
    }

    let results = if expr_sources.is_empty() && context_stmts.is_empty() {
        Vec::new()
    } else {
        evaluate(file_label, &context_stmts, &expr_sources)
    };

    let mut out = String::with_capacity(text.len());
    for piece in pieces {
        match piece {
            Piece::Text(s) => out.push_str(&s),
            Piece::Expr { index, original } => match results.get(index) {
                Some(Some(value)) => out.push_str(value),
                _ => out.push_str(&original),
            },
        }
    }
    out
}

/// Split `line` (which still carries its trailing `\n`, if any) on inline
/// expression markers, substituting variable references both inside and
/// outside the markers.
fn split_inline_expressions(
    line: &str,
    model: &Model,
    values: &IndexMap<String, Value>,
    expr_sources: &mut Vec<String>,
    on_missing: &mut impl FnMut(&str),
) -> Vec<Piece> {
    let marker = &model.formulaprefix;
    let (left, right) = (&model.delim.0, &model.delim.1);
    if marker.is_empty() || left.is_empty() || right.is_empty() {
        let substituted = varref::substitute(line, model, values, |n| on_missing(n));
        return vec![Piece::Text(substituted)];
    }

    let full_open = format!("{}{}", marker, left);
    let mut pieces = Vec::new();
    let mut rest = line;
    loop {
        match rest.find(full_open.as_str()) {
            None => {
                pieces.push(Piece::Text(varref::substitute(rest, model, values, |n| on_missing(n))));
                break;
            }
            Some(pos) => {
                let before = &rest[..pos];
                pieces.push(Piece::Text(varref::substitute(before, model, values, |n| on_missing(n))));
                let after_open = pos + full_open.len();
                match rest[after_open..].find(right.as_str()) {
                    None => {
                        // Unterminated marker: treat the rest as plain text.
                        pieces.push(Piece::Text(varref::substitute(
                            &rest[pos..],
                            model,
                            values,
                            |n| on_missing(n),
                        )));
                        break;
                    }
                    Some(rel_end) => {
                        let expr_raw = &rest[after_open..after_open + rel_end];
                        let original = format!("{}{}{}{}", marker, left, expr_raw, right);
                        let substituted_expr =
                            varref::substitute(expr_raw, model, values, |n| on_missing(n));
                        let index = expr_sources.len();
                        expr_sources.push(substituted_expr);
                        pieces.push(Piece::Expr { index, original });
                        rest = &rest[after_open + rel_end + right.len()..];
                    }
                }
            }
        }
    }
    pieces
}

/// Build and run one combined AWK `BEGIN` program: context statements
/// first, then one sentinel + print per expression. Returns, for each
/// expression in order, `Some(value)` on success or `None` on failure.
fn evaluate(file_label: &str, context_stmts: &[String], expr_sources: &[String]) -> Vec<Option<String>> {
    let mut program_src = String::from("BEGIN {\n");
    for stmt in context_stmts {
        program_src.push_str(stmt);
        program_src.push('\n');
    }
    for expr in expr_sources {
        program_src.push_str(&format!("print \"\\x01\";\nprint ({});\n", expr));
    }
    program_src.push_str("}\n");

    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| -> Option<String> {
        let program = parse_awk(&program_src).ok()?;
        let ctx = AwkContext::new();
        let mut interp = AwkInterpreter::new(ctx, program);
        interp.execute_begin();
        Some(interp.get_output().to_string())
    }));

    let output = match outcome {
        Ok(Some(s)) => s,
        _ => {
            for expr in expr_sources {
                log_expression_warning(file_label, expr, "embedded expression program failed to parse or execute");
            }
            return vec![None; expr_sources.len()];
        }
    };

    let sentinel_line = format!("{}\n", SENTINEL);
    let mut segments = output.split(sentinel_line.as_str());
    segments.next(); // text before the first sentinel (always empty)
    let values: Vec<&str> = segments.collect();

    if values.len() != expr_sources.len() {
        for expr in expr_sources {
            log_expression_warning(file_label, expr, "expression result count mismatch");
        }
        return vec![None; expr_sources.len()];
    }

    values
        .into_iter()
        .map(|v| Some(v.trim_end_matches('\n').to_string()))
        .collect()
}

/// Evaluate a standalone scalar math expression over a set of named values
/// (§4.7 "output expression": "a math expression over declared output
/// names, with standard arithmetic and a small library of math functions"),
/// reusing the same embedded AWK interpreter as template expressions rather
/// than a second expression language. Conservatively returns `None` if any
/// name the expression text mentions (by a whole-word substring match) is
/// itself null, per "result may be null if any referenced output is null".
pub fn evaluate_scalar(values: &std::collections::BTreeMap<String, Value>, expr: &str) -> Option<f64> {
    for (name, v) in values {
        if v.is_null() && mentions_word(expr, name) {
            return None;
        }
    }

    let mut program_src = String::from("BEGIN {\n");
    for (name, v) in values {
        match v {
            Value::Str(s) => {
                program_src.push_str(&format!("{name} = \"{}\";\n", escape_awk_string(s)));
            }
            other => {
                if let Some(f) = other.as_f64() {
                    program_src.push_str(&format!("{name} = {f};\n"));
                }
            }
        }
    }
    program_src.push_str(&format!("print ({expr});\n}}\n"));

    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| -> Option<String> {
        let program = parse_awk(&program_src).ok()?;
        let ctx = AwkContext::new();
        let mut interp = AwkInterpreter::new(ctx, program);
        interp.execute_begin();
        Some(interp.get_output().to_string())
    }));

    match outcome {
        Ok(Some(out)) => out.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn escape_awk_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn mentions_word(haystack: &str, word: &str) -> bool {
    let is_ident = |c: char| c.is_alphanumeric() || c == '_';
    let bytes = haystack.as_bytes();
    let wlen = word.len();
    if wlen == 0 {
        return false;
    }
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(word) {
        let abs = start + pos;
        let before_ok = abs == 0 || !is_ident(haystack[..abs].chars().last().unwrap());
        let after = abs + wlen;
        let after_ok = after >= bytes.len() || !is_ident(haystack[after..].chars().next().unwrap());
        if before_ok && after_ok {
            return true;
        }
        start = abs + wlen.max(1);
        if start >= haystack.len() {
            break;
        }
    }
    false
}

/// Split text into lines, each retaining its trailing `\n` (except possibly
/// the last), so re-joining pieces reproduces line structure exactly.
fn split_keep_terminators(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if c == '\n' {
            out.push(&text[start..=i]);
            start = i + 1;
        }
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> Model {
        Model::default()
    }

    #[test]
    fn inline_expression_is_evaluated() {
        let m = model();
        let mut values = IndexMap::new();
        values.insert("T".to_string(), Value::Float(25.0));
        let out = process_file(
            "test.txt",
            "T=$T\n#@ k = $T + 273.15\nTK=@{k}\n",
            &m,
            &values,
            |_| {},
        );
        assert_eq!(out, "T=25\nTK=298.15\n");
    }

    #[test]
    fn context_line_is_removed_from_output() {
        let m = model();
        let values = IndexMap::new();
        let out = process_file("test.txt", "#@ x = 1\nhello\n", &m, &values, |_| {});
        assert_eq!(out, "hello\n");
    }

    #[test]
    fn unparseable_expression_preserves_original_text() {
        let m = model();
        let values = IndexMap::new();
        let out = process_file("test.txt", "v=@{(((}\n", &m, &values, |_| {});
        assert_eq!(out, "v=@{(((}\n");
    }

    #[test]
    fn no_expressions_is_a_no_op_besides_var_substitution() {
        let m = model();
        let mut values = IndexMap::new();
        values.insert("x".to_string(), Value::Int(7));
        let out = process_file("test.txt", "plain $x text\n", &m, &values, |_| {});
        assert_eq!(out, "plain 7 text\n");
    }

    #[test]
    fn evaluate_scalar_computes_arithmetic_over_named_outputs() {
        let mut values = std::collections::BTreeMap::new();
        values.insert("a".to_string(), Value::Float(2.0));
        values.insert("b".to_string(), Value::Float(3.5));
        let result = evaluate_scalar(&values, "a + b * 2");
        assert_eq!(result, Some(9.0));
    }

    #[test]
    fn evaluate_scalar_is_null_when_referenced_output_is_null() {
        let mut values = std::collections::BTreeMap::new();
        values.insert("a".to_string(), Value::Null);
        values.insert("b".to_string(), Value::Float(3.0));
        assert_eq!(evaluate_scalar(&values, "a + b"), None);
    }

    #[test]
    fn evaluate_scalar_ignores_unreferenced_null_outputs() {
        let mut values = std::collections::BTreeMap::new();
        values.insert("unused".to_string(), Value::Null);
        values.insert("b".to_string(), Value::Float(3.0));
        assert_eq!(evaluate_scalar(&values, "b * 2"), Some(6.0));
    }
}
