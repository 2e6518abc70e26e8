//! String and attribute-name escaping.
//!
//! The rebuild engine only ever escapes `\`, `"`, newline, carriage return
//! and tab (plus a leading `${` in attribute-name context); source text that
//! arrived escaped is re-emitted unmodified, so nothing is ever
//! double-escaped.

use std::borrow::Cow;

/// Check if a name can be written as a bare attribute identifier.
pub fn is_bare_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '\'' | '-'))
}

/// Escape string content for quoted output (without surrounding quotes).
pub fn escape_string(s: &str) -> Cow<'_, str> {
    if !s
        .chars()
        .any(|c| matches!(c, '"' | '\\' | '\n' | '\r' | '\t'))
    {
        return Cow::Borrowed(s);
    }

    let mut result = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            '"' => result.push_str("\\\""),
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            c => result.push(c),
        }
    }
    Cow::Owned(result)
}

/// Escape a name for quoted attribute-name output. Same escape set as
/// [`escape_string`] plus a leading `${`, which would otherwise start an
/// interpolation.
pub fn escape_attr_name(s: &str) -> Cow<'_, str> {
    let escaped = escape_string(s);
    if escaped.starts_with("${") {
        let mut result = String::with_capacity(escaped.len() + 1);
        result.push('\\');
        result.push_str(&escaped);
        Cow::Owned(result)
    } else {
        escaped
    }
}

/// Render a name as it appears on the left of `=`: bare when possible,
/// quoted otherwise.
pub fn quote_attr_name(s: &str) -> String {
    if is_bare_name(s) {
        s.to_string()
    } else {
        format!("\"{}\"", escape_attr_name(s))
    }
}

/// Decode quoted string content (without the surrounding quotes).
///
/// Handles the escape forms the language accepts: `\"`, `\\`, `\n`, `\r`,
/// `\t`, `\${`; any other escaped character stands for itself.
pub fn unescape_string(s: &str) -> Cow<'_, str> {
    if !s.contains('\\') {
        return Cow::Borrowed(s);
    }

    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('r') => result.push('\r'),
            Some('t') => result.push('\t'),
            Some(other) => result.push(other),
            None => result.push('\\'),
        }
    }
    Cow::Owned(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_names() {
        assert!(is_bare_name("foo"));
        assert!(is_bare_name("_foo-bar'"));
        assert!(is_bare_name("python3Packages"));
        assert!(!is_bare_name(""));
        assert!(!is_bare_name("3foo"));
        assert!(!is_bare_name("bar.baz"));
        assert!(!is_bare_name("with space"));
    }

    #[test]
    fn escape_roundtrip() {
        let raw = "a \"quoted\" value\nwith\ttabs";
        let escaped = escape_string(raw);
        assert_eq!(escaped, "a \\\"quoted\\\" value\\nwith\\ttabs");
        assert_eq!(unescape_string(&escaped), raw);
    }

    #[test]
    fn plain_text_borrows() {
        assert!(matches!(escape_string("plain"), Cow::Borrowed(_)));
        assert!(matches!(unescape_string("plain"), Cow::Borrowed(_)));
    }

    #[test]
    fn leading_interpolation_in_names() {
        assert_eq!(escape_attr_name("${weird}"), "\\${weird}");
        assert_eq!(escape_attr_name("a${b}"), "a${b}");
        assert_eq!(quote_attr_name("bar.baz"), "\"bar.baz\"");
        assert_eq!(quote_attr_name("plain"), "plain");
    }
}
