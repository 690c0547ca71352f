//! Text normalization shared by ingestion and lookup.

/// Lookup key: trimmed, lowercased, inner whitespace runs collapsed to one space.
pub fn normalize_key(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Canonical column/field name: spaces become underscores, parentheses are dropped, `%` becomes `percent`.
pub fn canonical_field_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.trim().chars() {
        match ch {
            ' ' => out.push('_'),
            '(' | ')' => {}
            '%' => out.push_str("percent"),
            other => out.push(other),
        }
    }
    out
}

/// Recursively rename object keys with [`canonical_field_name`].
pub fn canonicalize_fields(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.into_iter()
                .map(|(key, inner)| (canonical_field_name(&key), canonicalize_fields(inner)))
                .collect(),
        ),
        serde_json::Value::Array(values) => {
            serde_json::Value::Array(values.into_iter().map(canonicalize_fields).collect())
        }
        other => other,
    }
}

/// Strip markup from an upstream description. `<br>` variants become newlines, every other tag is
/// dropped, and whitespace runs collapse (newlines survive, one per break).
pub fn sanitize_html(input: &str) -> String {
    let mut text = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find('<') {
        text.push_str(&rest[..start]);
        let after = &rest[start..];
        let Some(end) = after.find('>') else {
            text.push_str(after);
            rest = "";
            break;
        };
        if is_line_break(&after[1..end]) {
            text.push('\n');
        }
        rest = &after[end + 1..];
    }
    text.push_str(rest);

    text.split('\n')
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn is_line_break(tag: &str) -> bool {
    let name: String = tag
        .trim()
        .trim_end_matches('/')
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect();
    name.eq_ignore_ascii_case("br")
}
