//! Variable extraction from responses into the execution context.
//!
//! Extraction runs after a successful request and before assertions, so
//! assertions never see extracted variables but later steps do. A rule
//! that finds nothing writes a distinct *absent* marker; the variable is
//! still recorded.

use indexmap::IndexMap;
use serde_json::json;

use drill_core::http::HttpResponse;
use drill_core::{Context, ContextValue, ExtractRule, ExtractSource};

use crate::path;

/// Apply every extract rule of a step, writing results into `context`.
pub fn apply(
    rules: &IndexMap<String, ExtractRule>,
    response: &HttpResponse,
    context: &mut Context,
) {
    for (name, rule) in rules {
        context.insert(name.clone(), extract_one(rule, response));
    }
}

fn extract_one(rule: &ExtractRule, response: &HttpResponse) -> ContextValue {
    match rule.from {
        ExtractSource::Status => ContextValue::Value(json!(response.status)),
        ExtractSource::Header => match &rule.path {
            Some(name) => response
                .headers
                .get(name)
                .map_or(ContextValue::Absent, |value| {
                    ContextValue::Value(json!(value))
                }),
            None => ContextValue::Value(response.headers.to_json()),
        },
        ExtractSource::Body => match rule.path.as_deref() {
            Some(path) if !path.is_empty() => {
                let root = response.body.to_json();
                path::lookup(&root, path)
                    .map_or(ContextValue::Absent, |value| {
                        ContextValue::Value(value.clone())
                    })
            }
            _ => ContextValue::Value(response.body.to_json()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drill_core::http::{Headers, ResponseBody};
    use serde_json::Value as JsonValue;

    fn rules(entries: &[(&str, ExtractSource, Option<&str>)]) -> IndexMap<String, ExtractRule> {
        entries
            .iter()
            .map(|(name, from, path)| {
                (
                    name.to_string(),
                    ExtractRule {
                        from: *from,
                        path: path.map(str::to_string),
                    },
                )
            })
            .collect()
    }

    fn response() -> HttpResponse {
        HttpResponse {
            status: 201,
            headers: [("X-Session", "s-9"), ("Content-Type", "application/json")]
                .into_iter()
                .collect::<Headers>(),
            body: ResponseBody::Json(json!({"auth": {"access_token": "jwt-abc-123"}})),
        }
    }

    #[test]
    fn extracts_status_header_and_body_path() {
        let mut context = Context::new();
        apply(
            &rules(&[
                ("code", ExtractSource::Status, None),
                ("session", ExtractSource::Header, Some("x-session")),
                ("token", ExtractSource::Body, Some("auth.access_token")),
            ]),
            &response(),
            &mut context,
        );

        assert_eq!(context["code"], ContextValue::Value(json!(201)));
        assert_eq!(context["session"], ContextValue::Value(json!("s-9")));
        assert_eq!(context["token"], ContextValue::Value(json!("jwt-abc-123")));
    }

    #[test]
    fn missing_targets_record_absent() {
        let mut context = Context::new();
        apply(
            &rules(&[
                ("gone_header", ExtractSource::Header, Some("x-missing")),
                ("gone_path", ExtractSource::Body, Some("auth.refresh_token")),
            ]),
            &response(),
            &mut context,
        );

        assert!(context["gone_header"].is_absent());
        assert!(context["gone_path"].is_absent());
        assert_eq!(context.len(), 2, "absent results are still recorded");
    }

    #[test]
    fn pathless_rules_take_the_whole_source() {
        let mut context = Context::new();
        apply(
            &rules(&[
                ("all_headers", ExtractSource::Header, None),
                ("whole_body", ExtractSource::Body, None),
            ]),
            &response(),
            &mut context,
        );

        let headers = context["all_headers"].as_value().expect("header map");
        assert_eq!(headers["X-Session"], json!("s-9"));
        let body = context["whole_body"].as_value().expect("body value");
        assert_eq!(body["auth"]["access_token"], json!("jwt-abc-123"));
    }

    #[test]
    fn text_body_with_path_is_absent() {
        let text = HttpResponse {
            status: 200,
            headers: Headers::new(),
            body: ResponseBody::Text("plain".into()),
        };
        let mut context = Context::new();
        apply(&rules(&[("x", ExtractSource::Body, Some("a.b"))]), &text, &mut context);
        assert!(context["x"].is_absent());

        apply(&rules(&[("y", ExtractSource::Body, None)]), &text, &mut context);
        assert_eq!(context["y"], ContextValue::Value(JsonValue::String("plain".into())));
    }
}
