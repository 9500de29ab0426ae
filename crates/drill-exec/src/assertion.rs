//! Assertion evaluation for step responses.
//!
//! Clauses are evaluated in a fixed order so results are deterministic:
//! `status`, `blocked`, `bodyContains`, `bodyNotContains`, `headerPresent`,
//! then each `headerEquals` entry in insertion order.

use serde_json::json;

use drill_core::http::HttpResponse;
use drill_core::{AssertionResult, ExpectSpec};

/// Evaluate every present clause of `expect` against `response`.
pub fn evaluate(expect: &ExpectSpec, response: &HttpResponse) -> Vec<AssertionResult> {
    let mut results = Vec::new();

    if let Some(expected) = expect.status {
        results.push(AssertionResult::new(
            "status",
            json!(expected),
            json!(response.status),
            response.status == expected,
        ));
    }

    if let Some(expected) = expect.blocked {
        let actual = response.is_blocked();
        results.push(AssertionResult::new(
            "blocked",
            json!(expected),
            json!(actual),
            actual == expected,
        ));
    }

    if expect.body_contains.is_some() || expect.body_not_contains.is_some() {
        let body = response.body.to_display_string();
        if let Some(needle) = &expect.body_contains {
            let present = body.contains(needle.as_str());
            results.push(AssertionResult::new(
                "bodyContains",
                json!(needle),
                json!(present),
                present,
            ));
        }
        if let Some(needle) = &expect.body_not_contains {
            let present = body.contains(needle.as_str());
            results.push(AssertionResult::new(
                "bodyNotContains",
                json!(needle),
                json!(present),
                !present,
            ));
        }
    }

    if let Some(name) = &expect.header_present {
        let present = response.headers.contains(name);
        results.push(AssertionResult::new(
            "headerPresent",
            json!(name),
            json!(present),
            present,
        ));
    }

    for (name, expected) in &expect.header_equals {
        let actual = response.headers.get(name);
        let passed = actual == Some(expected.as_str());
        results.push(AssertionResult::new(
            format!("headerEquals.{name}"),
            json!(expected),
            actual.map_or(json!(null), |value| json!(value)),
            passed,
        ));
    }

    results
}

/// A step passes iff every assertion passed. An absent or empty `expect`
/// block passes on any non-error response.
pub fn passes(results: &[AssertionResult]) -> bool {
    results.iter().all(|result| result.passed)
}

/// Human-readable summary naming each failing clause.
pub fn failure_summary(results: &[AssertionResult]) -> String {
    let failures: Vec<String> = results
        .iter()
        .filter(|result| !result.passed)
        .map(|result| {
            format!(
                "{} (expected {}, got {})",
                result.field, result.expected, result.actual
            )
        })
        .collect();
    format!("Assertions failed: {}", failures.join("; "))
}
