//! Minimal-diff descriptor rewriting.
//!
//! Edits replace the byte range of a single scalar token. Quoting of the
//! original token is kept, so a descriptor whose identifiers are already
//! correct comes back byte-identical and a changed one differs only inside
//! the replaced values.

use super::parser::Span;

/// Replacement of one scalar token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub span: Span,
    pub value: String,
}

/// Apply `edits` to `source`.
///
/// Overlapping edits keep the first one by position; the descriptor reader
/// never produces overlapping scalar spans.
pub fn apply(source: &str, edits: &[Edit]) -> String {
    let mut sorted: Vec<&Edit> = edits.iter().collect();
    sorted.sort_by_key(|edit| edit.span.start);

    let mut out = String::with_capacity(source.len());
    let mut cursor = 0;
    for edit in sorted {
        if edit.span.start < cursor {
            continue;
        }
        out.push_str(&source[cursor..edit.span.start]);
        out.push_str(&render(&edit.value, edit.span.quoted));
        cursor = edit.span.end;
    }
    out.push_str(&source[cursor..]);
    out
}

/// Render a scalar the way the reader expects to find it again.
fn render(value: &str, quoted: bool) -> String {
    if !quoted && !value.is_empty() && value.bytes().all(is_plain) {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out.push('"');
    out
}

fn is_plain(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'$' | b'.' | b'/' | b':')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::parser::{parse, Node};

    fn span_of(source: &str, key: &str) -> Span {
        parse(source).unwrap().get(key).and_then(Node::as_scalar).unwrap().span
    }

    #[test]
    fn test_bare_value_stays_bare() {
        let src = "{\n\tID = com.old.app;\n\tOTHER = x;\n}\n";
        let edit = Edit {
            span: span_of(src, "ID"),
            value: "com.acme.app.tests".into(),
        };
        assert_eq!(
            apply(src, &[edit]),
            "{\n\tID = com.acme.app.tests;\n\tOTHER = x;\n}\n"
        );
    }

    #[test]
    fn test_quoted_value_stays_quoted() {
        let src = "{ ID = \"com.old.app\"; }";
        let edit = Edit {
            span: span_of(src, "ID"),
            value: "com.acme.app".into(),
        };
        assert_eq!(apply(src, &[edit]), "{ ID = \"com.acme.app\"; }");
    }

    #[test]
    fn test_value_needing_quotes_gets_them() {
        let src = "{ ID = old; }";
        let edit = Edit {
            span: span_of(src, "ID"),
            value: "has space".into(),
        };
        assert_eq!(apply(src, &[edit]), "{ ID = \"has space\"; }");
    }

    #[test]
    fn test_edits_applied_in_position_order() {
        let src = "{ A = a; B = b; }";
        let edits = [
            Edit {
                span: span_of(src, "B"),
                value: "bee".into(),
            },
            Edit {
                span: span_of(src, "A"),
                value: "ay".into(),
            },
        ];
        assert_eq!(apply(src, &edits), "{ A = ay; B = bee; }");
    }

    #[test]
    fn test_no_edits_is_identity() {
        let src = "// !$*UTF8*$!\n{ A = \"a\"; /* keep */ }\n";
        assert_eq!(apply(src, &[]), src);
    }
}
