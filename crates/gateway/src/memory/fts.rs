//! Query sanitization for the FTS index.
//!
//! Retrieval queries come from untrusted request text; the sanitizer must
//! never produce a string the FTS engine rejects.

use std::sync::LazyLock;

use regex::Regex;

static RE_TAGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
static RE_OPERATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(AND|OR|NOT)\b").unwrap());

fn is_operator(token: &str) -> bool {
    matches!(token, "AND" | "OR" | "NOT")
}

/// Boolean operators are binary in FTS5: a leading, trailing, or doubled
/// operator is a syntax error, so such queries degrade to a phrase.
fn operators_well_formed(tokens: &[&str]) -> bool {
    match (tokens.first(), tokens.last()) {
        (Some(first), Some(last)) if !is_operator(first) && !is_operator(last) => !tokens
            .windows(2)
            .any(|pair| is_operator(pair[0]) && is_operator(pair[1])),
        _ => false,
    }
}

/// Sanitize a raw query for FTS MATCH.
///
/// Strips markup, drops reserved punctuation, and wraps the residue in a
/// phrase match with escaped quotes — unless the caller used explicit
/// boolean operators, in which case the cleaned tokens are left bare.
/// Returns None when nothing searchable remains.
pub fn sanitize_query(raw: &str) -> Option<String> {
    let without_tags = RE_TAGS.replace_all(raw, " ");
    let has_operators = RE_OPERATOR.is_match(&without_tags);

    // Reserved punctuation (quotes, parens, asterisks, carets, colons,
    // minus, plus, braces) all become token separators.
    let cleaned: String = without_tags
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' {
                c
            } else {
                ' '
            }
        })
        .collect();

    let tokens: Vec<&str> = cleaned.split_whitespace().collect();
    if tokens.is_empty() {
        return None;
    }

    if has_operators && operators_well_formed(&tokens) {
        // Tokens are alphanumeric-only at this point, so the bare boolean
        // query cannot break the parser.
        return Some(tokens.join(" "));
    }

    let phrase = tokens.join(" ").replace('"', "\"\"");
    Some(format!("\"{}\"", phrase))
}
