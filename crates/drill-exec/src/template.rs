//! `{{name}}` token substitution against the execution context, with
//! lazily evaluated built-ins.

use once_cell::sync::Lazy;
use rand::Rng;
use regex::{Captures, Regex};
use serde_json::Value as JsonValue;

use drill_core::{BodySpec, Context, ContextValue};

static TOKEN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{([A-Za-z0-9_]+)\}\}").expect("token pattern compiles"));

/// Source of reserved built-in values, evaluated fresh per reference.
///
/// Injectable so tests can pin `random`/`timestamp` to deterministic values.
pub trait BuiltinSource: Send + Sync {
    /// Produce a value for a reserved name, or `None` when the name is not
    /// a built-in.
    fn resolve(&self, name: &str) -> Option<String>;
}

/// Production built-ins: `random` (alphanumeric token), `random_ip`
/// (dotted quad with octets in 1..=255), `timestamp` (Unix milliseconds).
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomBuiltins;

impl BuiltinSource for RandomBuiltins {
    fn resolve(&self, name: &str) -> Option<String> {
        match name {
            "random" => Some(random_token()),
            "random_ip" => Some(random_ip()),
            "timestamp" => Some(chrono::Utc::now().timestamp_millis().to_string()),
            _ => None,
        }
    }
}

fn random_token() -> String {
    use rand::distributions::Alphanumeric;
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect()
}

fn random_ip() -> String {
    let mut rng = rand::thread_rng();
    let octets: Vec<String> = (0..4)
        .map(|_| rng.gen_range(1..=255u16).to_string())
        .collect();
    octets.join(".")
}

/// Substitute every `{{name}}` token in `template`.
///
/// Built-ins win over context variables; unknown names are left untouched.
pub fn resolve(template: &str, context: &Context, builtins: &dyn BuiltinSource) -> String {
    TOKEN_PATTERN
        .replace_all(template, |caps: &Captures<'_>| {
            let name = &caps[1];
            if let Some(value) = builtins.resolve(name) {
                return value;
            }
            match context.get(name) {
                Some(value) => render(value),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// String form of a context value: strings bare, numbers decimalized,
/// booleans `true`/`false`, structures in JSON form, absent empty.
pub fn render(value: &ContextValue) -> String {
    match value {
        ContextValue::Absent => String::new(),
        ContextValue::Value(JsonValue::String(text)) => text.clone(),
        ContextValue::Value(other) => other.to_string(),
    }
}

/// Resolve a request body into its wire bytes. Structured bodies are
/// serialized first and substituted as text; no re-parse happens before
/// sending.
pub fn resolve_body(body: &BodySpec, context: &Context, builtins: &dyn BuiltinSource) -> Vec<u8> {
    match body {
        BodySpec::Text(text) => resolve(text, context, builtins).into_bytes(),
        BodySpec::Structured(value) => resolve(&value.to_string(), context, builtins).into_bytes(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    struct FixedBuiltins;

    impl BuiltinSource for FixedBuiltins {
        fn resolve(&self, name: &str) -> Option<String> {
            match name {
                "random" => Some("fixedtoken".into()),
                "timestamp" => Some("1700000000000".into()),
                _ => None,
            }
        }
    }

    fn context_with(entries: &[(&str, JsonValue)]) -> Context {
        entries
            .iter()
            .map(|(name, value)| (name.to_string(), ContextValue::Value(value.clone())))
            .collect()
    }

    #[test]
    fn substitutes_context_variables() {
        let context = context_with(&[("token", json!("jwt-abc-123"))]);
        let resolved = resolve("Bearer {{token}}", &context, &FixedBuiltins);
        assert_eq!(resolved, "Bearer jwt-abc-123");
    }

    #[test]
    fn unknown_names_are_left_untouched() {
        let context = Context::new();
        let resolved = resolve("/items/{{item_id}}", &context, &FixedBuiltins);
        assert_eq!(resolved, "/items/{{item_id}}");
    }

    #[test]
    fn builtins_shadow_context_variables() {
        let context = context_with(&[("random", json!("from-context"))]);
        let resolved = resolve("{{random}}", &context, &FixedBuiltins);
        assert_eq!(resolved, "fixedtoken");
    }

    #[test]
    fn renders_numbers_booleans_and_structures() {
        let context = context_with(&[
            ("count", json!(42)),
            ("ratio", json!(0.5)),
            ("ok", json!(true)),
            ("obj", json!({"a": 1})),
            ("nothing", json!(null)),
        ]);
        assert_eq!(
            resolve("{{count}}/{{ratio}}/{{ok}}/{{obj}}/{{nothing}}", &context, &FixedBuiltins),
            r#"42/0.5/true/{"a":1}/null"#
        );
    }

    #[test]
    fn absent_renders_empty() {
        let mut context = Context::new();
        context.insert("gone".into(), ContextValue::Absent);
        assert_eq!(resolve("[{{gone}}]", &context, &FixedBuiltins), "[]");
    }

    #[test]
    fn random_ip_octets_are_in_range() {
        let ip = RandomBuiltins.resolve("random_ip").expect("built-in");
        let octets: Vec<u16> = ip
            .split('.')
            .map(|octet| octet.parse().expect("decimal octet"))
            .collect();
        assert_eq!(octets.len(), 4);
        assert!(octets.iter().all(|&octet| (1..=255).contains(&octet)), "{ip}");
    }

    #[test]
    fn random_token_is_long_enough() {
        let token = RandomBuiltins.resolve("random").expect("built-in");
        assert!(token.len() >= 8);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn structured_body_is_serialized_then_substituted() {
        let context = context_with(&[("user", json!("alice"))]);
        let body = BodySpec::Structured(json!({"login": "{{user}}"}));
        let bytes = resolve_body(&body, &context, &FixedBuiltins);
        assert_eq!(
            String::from_utf8(bytes).expect("utf8 body"),
            r#"{"login":"alice"}"#
        );
    }

    proptest! {
        #[test]
        fn text_without_tokens_is_unchanged(text in "[^{}]*") {
            let context = Context::new();
            prop_assert_eq!(resolve(&text, &context, &FixedBuiltins), text);
        }

        #[test]
        fn resolution_is_deterministic_with_fixed_builtins(
            value in "[a-z0-9]{0,12}",
        ) {
            let context = context_with(&[("v", json!(value))]);
            let first = resolve("{{random}}:{{v}}:{{timestamp}}", &context, &FixedBuiltins);
            let second = resolve("{{random}}:{{v}}:{{timestamp}}", &context, &FixedBuiltins);
            prop_assert_eq!(first, second);
        }
    }
}
