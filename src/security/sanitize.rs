//! Markup escaping for every string leaf of body, query and path params.

use std::collections::HashMap;

use serde_json::Value;

/// Escape characters that can open markup or break out of an attribute.
pub fn escape_str(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '`' => out.push_str("&#x60;"),
            _ => out.push(c),
        }
    }
    out
}

fn needs_escape(input: &str) -> bool {
    input.contains(['&', '<', '>', '"', '\'', '`'])
}

/// Recursively escape string leaves in place. Object keys are left alone.
/// Returns whether anything changed.
pub fn sanitize_json(value: &mut Value) -> bool {
    match value {
        Value::String(s) if needs_escape(s) => {
            *s = escape_str(s);
            true
        }
        Value::Array(items) => items.iter_mut().fold(false, |changed, v| sanitize_json(v) | changed),
        Value::Object(map) => map.values_mut().fold(false, |changed, v| sanitize_json(v) | changed),
        _ => false,
    }
}

/// Escape every value of an `application/x-www-form-urlencoded` string and
/// re-encode it. `None` when nothing needed escaping.
pub fn sanitize_urlencoded(raw: &str) -> Option<String> {
    let pairs: Vec<(String, String)> = url::form_urlencoded::parse(raw.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if !pairs.iter().any(|(k, v)| needs_escape(k) || needs_escape(v)) {
        return None;
    }

    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in &pairs {
        serializer.append_pair(&escape_str(key), &escape_str(value));
    }
    Some(serializer.finish())
}

/// Path parameters after escaping, published as a request extension since
/// the matched params cannot be rewritten once routing has happened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SanitizedParams(pub HashMap<String, String>);

impl SanitizedParams {
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self(pairs.into_iter().map(|(k, v)| (k.to_string(), escape_str(v))).collect())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn escapes_markup() {
        assert_eq!(escape_str(r#"<b onclick="x">'hi'</b>"#), "&lt;b onclick=&quot;x&quot;&gt;&#x27;hi&#x27;&lt;/b&gt;");
        assert_eq!(escape_str("ada@example.com"), "ada@example.com");
    }

    #[test]
    fn sanitizes_nested_leaves_only() {
        let mut body = json!({
            "name": "<i>Ada</i>",
            "tags": ["ok", "<b>"],
            "profile": {"bio": "Tom & Jerry", "age": 36, "<key>": true}
        });
        assert!(sanitize_json(&mut body));
        assert_eq!(body["name"], "&lt;i&gt;Ada&lt;/i&gt;");
        assert_eq!(body["tags"][1], "&lt;b&gt;");
        assert_eq!(body["profile"]["bio"], "Tom &amp; Jerry");
        assert_eq!(body["profile"]["age"], 36);
        assert_eq!(body["profile"]["<key>"], true);

        let mut clean = json!({"email": "ada@example.com", "n": [1, 2]});
        assert!(!sanitize_json(&mut clean));
    }

    #[test]
    fn rewrites_query_strings() {
        assert_eq!(sanitize_urlencoded("page=2&sort=name"), None);
        let rewritten = sanitize_urlencoded("q=%3Cb%3E&page=2").unwrap();
        let pairs: Vec<_> = url::form_urlencoded::parse(rewritten.as_bytes()).into_owned().collect();
        assert_eq!(pairs, vec![("q".to_string(), "&lt;b&gt;".to_string()), ("page".to_string(), "2".to_string())]);
    }

    #[test]
    fn params_are_escaped() {
        let params = SanitizedParams::from_pairs([("id", "<x>"), ("slug", "acme")]);
        assert_eq!(params.get("id"), Some("&lt;x&gt;"));
        assert_eq!(params.get("slug"), Some("acme"));
    }
}
