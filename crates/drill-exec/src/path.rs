//! Dot-path traversal over decoded response bodies.

use serde_json::Value as JsonValue;

/// Walk `root` along a `.`-separated key path. Missing keys and traversal
/// through a non-mapping yield `None`; an empty path returns the root.
pub fn lookup<'a>(root: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    if path.is_empty() {
        return Some(root);
    }
    let mut current = root;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn traverses_nested_mappings() {
        let body = json!({"data": {"user": {"id": 7}}});
        assert_eq!(lookup(&body, "data.user.id"), Some(&json!(7)));
    }

    #[test]
    fn empty_path_returns_root() {
        let body = json!({"a": 1});
        assert_eq!(lookup(&body, ""), Some(&body));
    }

    #[test]
    fn missing_key_is_absent() {
        let body = json!({"a": {"b": 1}});
        assert_eq!(lookup(&body, "a.c"), None);
        assert_eq!(lookup(&body, "x"), None);
    }

    #[test]
    fn traversal_through_non_mapping_is_absent() {
        let body = json!({"a": [1, 2, 3]});
        assert_eq!(lookup(&body, "a.0"), None);
        assert_eq!(lookup(&json!("text"), "a"), None);
    }
}
