use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Unique identifier for a step inside a scenario.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
pub struct StepId(pub String);

impl StepId {
    /// Construct a step id.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the underlying identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StepId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for StepId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// HTTP method supported by scenario steps.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

/// Request body template: either a raw text template or a structured JSON
/// value whose serialized form is templated before sending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BodySpec {
    /// Raw text body, templated in place.
    Text(String),
    /// Structured body, serialized then templated.
    Structured(JsonValue),
}

/// Templated request description carried by a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSpec {
    pub method: HttpMethod,
    /// URL template; `{{name}}` tokens are resolved against the context.
    pub url: String,
    /// Header value templates, resolution preserves insertion order.
    #[serde(default)]
    pub headers: IndexMap<String, String>,
    /// Query parameter templates appended to the resolved URL.
    #[serde(default)]
    pub query: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<BodySpec>,
}

impl RequestSpec {
    /// Construct a bare request for the given method and URL template.
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: IndexMap::new(),
            query: IndexMap::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: BodySpec) -> Self {
        self.body = Some(body);
        self
    }
}

/// Source of an extracted variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractSource {
    Body,
    Header,
    Status,
}

/// Rule mapping one variable name to a location in the response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractRule {
    pub from: ExtractSource,
    /// Dot path into the body, or a header name; absent means the whole
    /// body / header map.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Assertion clauses evaluated against a step's response.
///
/// Clause evaluation order is fixed: `status`, `blocked`, `bodyContains`,
/// `bodyNotContains`, `headerPresent`, then `headerEquals` entries in
/// insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Blocked means the response status is 403 or 429.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_contains: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_not_contains: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_present: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub header_equals: IndexMap<String, String>,
}

impl ExpectSpec {
    /// True when no clause is present; such a step passes on any response.
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.blocked.is_none()
            && self.body_contains.is_none()
            && self.body_not_contains.is_none()
            && self.header_present.is_none()
            && self.header_equals.is_empty()
    }
}

/// Conditional guard referencing an earlier step's outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhenClause {
    /// Step whose result is inspected.
    pub step: StepId,
    /// Required success state of the referenced step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub succeeded: Option<bool>,
    /// Required `actual` of the referenced step's `status` assertion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

fn default_iterations() -> u32 {
    1
}

/// A single unit of work: one HTTP exchange plus retry/iteration hints,
/// assertions, extraction rules, and flow-control clauses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: StepId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    pub request: RequestSpec,
    /// Additional attempts beyond the first.
    #[serde(default)]
    pub retries: u32,
    /// Fixed delay before every attempt, in milliseconds.
    #[serde(default)]
    pub delay_ms: u64,
    /// Upper bound of uniform random extra delay, in milliseconds.
    #[serde(default)]
    pub jitter: u64,
    /// Number of requests per attempt; the last response wins.
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect: Option<ExpectSpec>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub extract: IndexMap<String, ExtractRule>,
    /// Sibling step ids that must reach a terminal status first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<StepId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<WhenClause>,
}

impl Step {
    /// Construct a minimal step with defaults for every hint.
    pub fn new(id: impl Into<StepId>, name: impl Into<String>, request: RequestSpec) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            stage: None,
            request,
            retries: 0,
            delay_ms: 0,
            jitter: 0,
            iterations: 1,
            expect: None,
            extract: IndexMap::new(),
            depends_on: Vec::new(),
            when: None,
        }
    }
}

/// A declarative plan: named, ordered steps with their requests,
/// expectations, and flow-control clauses. Immutable once handed to the
/// engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub id: String,
    pub name: String,
    pub steps: Vec<Step>,
}

impl Scenario {
    /// Lookup a step by id.
    pub fn step(&self, id: &StepId) -> Option<&Step> {
        self.steps.iter().find(|step| &step.id == id)
    }
}

/// Supplier of validated scenarios, safe for concurrent use.
pub trait Catalog: Send + Sync {
    /// Fetch a scenario by id, or `None` when unknown.
    fn scenario(&self, id: &str) -> Option<Scenario>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn step_deserializes_with_defaults() {
        let step: Step = serde_json::from_value(json!({
            "id": "login",
            "name": "Login",
            "request": {"method": "POST", "url": "https://target/login"}
        }))
        .expect("step parses");

        assert_eq!(step.retries, 0);
        assert_eq!(step.delay_ms, 0);
        assert_eq!(step.jitter, 0);
        assert_eq!(step.iterations, 1);
        assert!(step.expect.is_none());
        assert!(step.depends_on.is_empty());
    }

    #[test]
    fn body_spec_distinguishes_text_and_structured() {
        let text: BodySpec = serde_json::from_value(json!("user={{name}}")).expect("text body");
        assert_eq!(text, BodySpec::Text("user={{name}}".into()));

        let structured: BodySpec =
            serde_json::from_value(json!({"user": "{{name}}"})).expect("structured body");
        assert!(matches!(structured, BodySpec::Structured(_)));
    }

    #[test]
    fn expect_spec_preserves_header_equals_order() {
        let expect: ExpectSpec = serde_json::from_value(json!({
            "headerEquals": {"X-Request-Id": "abc", "Content-Type": "application/json"}
        }))
        .expect("expect parses");

        let names: Vec<&String> = expect.header_equals.keys().collect();
        assert_eq!(names, ["X-Request-Id", "Content-Type"]);
        assert!(!expect.is_empty());
        assert!(ExpectSpec::default().is_empty());
    }

    #[test]
    fn depends_on_and_when_round_trip() {
        let step: Step = serde_json::from_value(json!({
            "id": "get-data",
            "name": "Get data",
            "request": {"method": "GET", "url": "https://target/data"},
            "dependsOn": ["login"],
            "when": {"step": "login", "succeeded": true}
        }))
        .expect("step parses");

        assert_eq!(step.depends_on, vec![StepId::from("login")]);
        let when = step.when.expect("when clause");
        assert_eq!(when.step, StepId::from("login"));
        assert_eq!(when.succeeded, Some(true));
        assert_eq!(when.status, None);
    }
}
