//! Field scanners for the wire grammar.
//!
//! These operate on raw message text and extract one named field at a
//! time. The grammar is non-strict: surrounding whitespace and field
//! ordering vary between client builds, so scanners locate fields by
//! name instead of walking a parse tree. Extraction failure is never an
//! error here - list fields come back empty and scalars come back
//! `None`; callers decide whether absence is fatal.

/// Extract a named string field delimited by `"field":"` ... `"`.
///
/// Whitespace between the colon and the opening quote is tolerated.
pub fn string_field(text: &str, field: &str) -> Option<String> {
    let needle = format!("\"{}\":", field);
    let start = text.find(&needle)? + needle.len();
    let rest = &text[start..];
    let rest = rest.trim_start();
    let mut chars = rest.char_indices();
    match chars.next() {
        Some((_, '"')) => {}
        _ => return None,
    }
    let inner = &rest[1..];
    let end = inner.find('"')?;
    Some(inner[..end].to_string())
}

/// Extract a named numeric field: `"field":` followed by digits, dot,
/// or minus, terminated by `,`, `}`, or whitespace.
pub fn number_field(text: &str, field: &str) -> Option<i64> {
    let needle = format!("\"{}\":", field);
    let start = text.find(&needle)? + needle.len();
    let rest = text[start..].trim_start();
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-'))
        .unwrap_or(rest.len());
    if end == 0 {
        return None;
    }
    // Truncate a fractional part rather than rejecting it.
    let token = &rest[..end];
    let whole = token.split('.').next().unwrap_or(token);
    whole.parse::<i64>().ok()
}

/// Extract a named array-of-strings field.
///
/// Locates the field's opening bracket and its balanced closing
/// bracket (brackets inside quoted entries do not count), then pulls
/// out each quoted entry. Escaped quotes (`\"`) inside entries are
/// honoured and unescaped. Any structural failure yields an empty
/// list.
pub fn string_array_field(text: &str, field: &str) -> Vec<String> {
    let needle = format!("\"{}\":", field);
    let start = match text.find(&needle) {
        Some(i) => i + needle.len(),
        None => return Vec::new(),
    };
    let rest = text[start..].trim_start();
    if !rest.starts_with('[') {
        return Vec::new();
    }
    let body = match balanced_bracket_body(rest) {
        Some(b) => b,
        None => return Vec::new(),
    };
    quoted_entries(body)
}

/// Slice out the content between `[` at position 0 and its balanced
/// `]`, ignoring brackets that appear inside quoted strings.
fn balanced_bracket_body(s: &str) -> Option<&str> {
    debug_assert!(s.starts_with('['));
    let mut depth = 0usize;
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if in_quotes {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_quotes = false;
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[1..i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Collect every quoted string in `body`, handling `\"` and `\\`
/// escapes. Handles zero, one, and many entries; the `","` separators
/// between entries fall out naturally.
fn quoted_entries(body: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut entry = String::new();
    let mut in_quotes = false;
    let mut escaped = false;
    for c in body.chars() {
        if !in_quotes {
            if c == '"' {
                in_quotes = true;
                escaped = false;
                entry.clear();
            }
            continue;
        }
        if escaped {
            entry.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '"' {
            in_quotes = false;
            if !entry.is_empty() {
                out.push(std::mem::take(&mut entry));
            }
        } else {
            entry.push(c);
        }
    }
    out
}

/// Escape a string for embedding in a quoted wire field.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_field_basic() {
        let text = r#"{"messageType":"ANNOUNCE_PRESENCE","modId":"companion","version":"1.2.3"}"#;
        assert_eq!(string_field(text, "modId").as_deref(), Some("companion"));
        assert_eq!(string_field(text, "version").as_deref(), Some("1.2.3"));
        assert_eq!(string_field(text, "absent"), None);
    }

    #[test]
    fn string_field_tolerates_whitespace_and_reordering() {
        let text = "{ \"version\" :\"9\", \"modId\":  \"x\" }";
        // The grammar requires no space before the colon, but after it
        // anything goes.
        assert_eq!(string_field(text, "modId").as_deref(), Some("x"));
    }

    #[test]
    fn number_field_variants() {
        assert_eq!(number_field(r#"{"timestamp":1700000000123}"#, "timestamp"), Some(1700000000123));
        assert_eq!(number_field(r#"{"timestamp": -5,"x":1}"#, "timestamp"), Some(-5));
        assert_eq!(number_field(r#"{"timestamp":17.9}"#, "timestamp"), Some(17));
        assert_eq!(number_field(r#"{"timestamp":"oops"}"#, "timestamp"), None);
        assert_eq!(number_field(r#"{}"#, "timestamp"), None);
    }

    #[test]
    fn array_zero_one_many() {
        assert_eq!(string_array_field(r#"{"mods":[]}"#, "mods"), Vec::<String>::new());
        assert_eq!(string_array_field(r#"{"mods":["solo:1"]}"#, "mods"), vec!["solo:1"]);
        assert_eq!(
            string_array_field(r#"{"mods":["a:1","b:2","c:3"]}"#, "mods"),
            vec!["a:1", "b:2", "c:3"]
        );
    }

    #[test]
    fn array_with_escaped_quote() {
        let text = r#"{"mods":["we\"ird:1","plain:2"]}"#;
        assert_eq!(string_array_field(text, "mods"), vec!["we\"ird:1", "plain:2"]);
    }

    #[test]
    fn array_unbalanced_is_empty() {
        assert_eq!(string_array_field(r#"{"mods":["a:1""#, "mods"), Vec::<String>::new());
        assert_eq!(string_array_field(r#"{"mods":"a"}"#, "mods"), Vec::<String>::new());
    }

    #[test]
    fn escape_round_trips_through_scanner() {
        let raw = "tri\"cky\\mod";
        let text = format!("{{\"mods\":[\"{}\"]}}", escape(raw));
        assert_eq!(string_array_field(&text, "mods"), vec![raw.to_string()]);
    }
}
