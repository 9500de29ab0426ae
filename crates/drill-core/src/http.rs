//! The `Requester` capability: one HTTP exchange with cooperative
//! cancellation and a normalized response shape.

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tokio_util::sync::CancellationToken;

use crate::scenario::HttpMethod;

/// A fully resolved request, ready to be sent. All templating has already
/// happened; the engine hands these to the `Requester` verbatim.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: IndexMap<String, String>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: IndexMap::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// Response headers with case-insensitive lookup. Original header names are
/// retained for reporting; comparisons are ASCII case-insensitive.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Headers(IndexMap<String, String>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Case-insensitive lookup returning the stored value.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(stored, _)| stored.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Case-insensitive presence check.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The full header mapping as a JSON object, original names preserved.
    pub fn to_json(&self) -> JsonValue {
        JsonValue::Object(
            self.0
                .iter()
                .map(|(name, value)| (name.clone(), JsonValue::String(value.clone())))
                .collect(),
        )
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for Headers {
    fn from_iter<T: IntoIterator<Item = (N, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }
}

/// Decoded response body: JSON when the content type says so, raw text
/// otherwise.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseBody {
    Json(JsonValue),
    Text(String),
}

impl ResponseBody {
    /// The body as a JSON value; text becomes a JSON string.
    pub fn to_json(&self) -> JsonValue {
        match self {
            ResponseBody::Json(value) => value.clone(),
            ResponseBody::Text(text) => JsonValue::String(text.clone()),
        }
    }

    /// Stringified body used for substring assertions: raw text as-is,
    /// JSON in its serialized form.
    pub fn to_display_string(&self) -> String {
        match self {
            ResponseBody::Json(value) => value.to_string(),
            ResponseBody::Text(text) => text.clone(),
        }
    }
}

/// Normalized response handed back by a `Requester`.
#[derive(Debug, Clone, Serialize)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: ResponseBody,
}

impl HttpResponse {
    /// Blocked responses are those a defensive layer answers with.
    pub fn is_blocked(&self) -> bool {
        matches!(self.status, 403 | 429)
    }
}

/// Canonical error type surfaced by `Requester` implementations.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// The cancellation token fired while the request was in flight.
    #[error("request cancelled")]
    Cancelled,
    #[error("request timed out after {0}ms")]
    Timeout(u64),
    #[error("transport error: {0}")]
    Transport(#[from] anyhow::Error),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl RequestError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RequestError::Cancelled)
    }
}

pub type RequestResult<T> = Result<T, RequestError>;

/// Capability that performs one HTTP exchange. Implementations must honor
/// the cancellation token by aborting in-flight I/O and returning
/// `RequestError::Cancelled`.
#[async_trait]
pub trait Requester: Send + Sync {
    async fn perform(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> RequestResult<HttpResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn header_lookup_ignores_case_and_keeps_original_names() {
        let headers: Headers = [("X-Request-Id", "abc"), ("Content-Type", "text/plain")]
            .into_iter()
            .collect();

        assert_eq!(headers.get("x-request-id"), Some("abc"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/plain"));
        assert!(headers.contains("content-type"));
        assert!(!headers.contains("authorization"));

        let json = headers.to_json();
        assert!(json.get("X-Request-Id").is_some(), "original casing kept");
    }

    #[test]
    fn body_display_string_keeps_raw_text() {
        let text = ResponseBody::Text("hello <body>".into());
        assert_eq!(text.to_display_string(), "hello <body>");

        let json = ResponseBody::Json(json!({"items": []}));
        assert_eq!(json.to_display_string(), r#"{"items":[]}"#);
    }

    #[test]
    fn blocked_statuses() {
        for (status, blocked) in [(403, true), (429, true), (200, false), (500, false)] {
            let response = HttpResponse {
                status,
                headers: Headers::new(),
                body: ResponseBody::Text(String::new()),
            };
            assert_eq!(response.is_blocked(), blocked, "status {status}");
        }
    }
}
