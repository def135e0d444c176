use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn template_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").unwrap())
}

/// Resolve a dotted path expression against `root`.
///
/// A leading `$` is stripped. The literal segment `_all` resolves to the whole
/// map (whether or not `root` carries an explicit `_all` entry). Returns `None`
/// when any segment is missing.
pub fn resolve_path(path: &str, root: &Value) -> Option<Value> {
    let path = path.trim().trim_start_matches('$');
    if path.is_empty() {
        return None;
    }

    let mut current = root;
    for (i, segment) in path.split('.').enumerate() {
        if i == 0 && segment == "_all" && root.get("_all").is_none() {
            continue;
        }
        match current.get(segment) {
            Some(next) => current = next,
            None => return None,
        }
    }
    Some(current.clone())
}

/// Substitute every `{{path}}` placeholder in `template` with the value found
/// under that path in `root`. Missing paths leave the placeholder intact.
pub fn resolve_template(template: &str, root: &Value) -> String {
    template_re()
        .replace_all(template, |caps: &regex::Captures<'_>| {
            match resolve_path(&caps[1], root) {
                Some(value) => value_to_display(&value),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Render a JSON value for interpolation: strings verbatim, everything else as
/// compact JSON.
pub fn value_to_display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}
