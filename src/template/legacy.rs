//! Legacy variable-reference spelling normalization (§4.1 step 1, §9 Open
//! Questions: "Legacy variable-reference spelling `?name` as alternate to
//! `$name`... the exact tokenization — in particular, whether `?` adjacent
//! to other punctuation is normalized — should be confirmed against
//! existing template corpora before re-implementation.").
//!
//! Decision recorded in DESIGN.md: `?name` is recognized as a legacy
//! variable reference only when the `?` is not itself adjacent to an
//! identifier character (so `a?b:c` ternaries are left untouched, since a
//! ternary's `?` is preceded by an identifier/closing-paren character in
//! every realistic template), and the following run is a valid variable
//! name. This errs toward not breaking shell ternary-like conditionals
//! embedded in templates over maximizing legacy-syntax coverage.

use crate::model::Model;

/// Rewrite every legacy `?name` occurrence in `text` to the canonical
/// `<varprefix>name` form for `model`.
pub fn normalize(text: &str, model: &Model) -> String {
    if model.varprefix == "?" {
        // The model already uses `?` as its canonical prefix; nothing to
        // normalize.
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '?' {
            let prev_is_ident = i > 0 && is_ident_char(chars[i - 1]);
            let mut j = i + 1;
            while j < chars.len() && is_ident_char(chars[j]) {
                j += 1;
            }
            let has_name = j > i + 1;
            if !prev_is_ident && has_name {
                out.push_str(&model.varprefix);
                out.extend(&chars[i + 1..j]);
                i = j;
                continue;
            }
        }
        out.push(c);
        i += 1;
    }
    out
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_standalone_legacy_ref() {
        let m = Model::default();
        assert_eq!(normalize("x=?x\n", &m), "x=$x\n");
    }

    #[test]
    fn leaves_ternary_like_usage_untouched() {
        let m = Model::default();
        // `a?b:c` — `?` is preceded by an identifier character, so this is
        // left alone rather than treated as a legacy variable reference.
        assert_eq!(normalize("a?b:c", &m), "a?b:c");
    }

    #[test]
    fn leaves_bare_question_mark_untouched() {
        let m = Model::default();
        assert_eq!(normalize("really?", &m), "really?");
    }
}
