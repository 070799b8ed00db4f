//! `${VAR}` expansion inside config string values.
//!
//! Expansion runs on the parsed document, so only string values change:
//! keys, numbers and booleans are left alone, and a variable holding quotes
//! or newlines cannot break the file's syntax. `${VAR:-fallback}` uses the
//! fallback when `VAR` is unset or empty. Unresolved placeholders stay as
//! written.

use serde_json::Value;

/// Expand placeholders in every string of `doc`, recursively.
pub fn expand_env_values(doc: &mut Value, lookup: &impl Fn(&str) -> Option<String>) {
    match doc {
        Value::String(s) if s.contains("${") => *s = expand_env(s, lookup),
        Value::Array(items) => items
            .iter_mut()
            .for_each(|item| expand_env_values(item, lookup)),
        Value::Object(map) => map
            .values_mut()
            .for_each(|item| expand_env_values(item, lookup)),
        _ => {},
    }
}

/// Expand placeholders in a single string.
pub fn expand_env(input: &str, lookup: &impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let body = &rest[start + 2..];
        let Some(end) = body.find('}') else {
            // Unterminated, keep the tail verbatim.
            out.push_str(&rest[start..]);
            return out;
        };
        let placeholder = &rest[start..start + 2 + end + 1];
        let (name, fallback) = match body[..end].split_once(":-") {
            Some((name, fallback)) => (name.trim(), Some(fallback)),
            None => (body[..end].trim(), None),
        };

        let value = (!name.is_empty())
            .then(|| lookup(name))
            .flatten()
            .filter(|v| !v.is_empty())
            .or_else(|| fallback.map(str::to_string));
        out.push_str(value.as_deref().unwrap_or(placeholder));
        rest = &body[end + 1..];
    }

    out.push_str(rest);
    out
}
