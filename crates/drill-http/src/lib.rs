//! reqwest-backed implementation of the `Requester` capability.
//!
//! Normalizes responses into the engine's shape (integer status,
//! case-insensitive headers, decoded body) and races every exchange
//! against the execution's cancellation token so an abort reaches the
//! in-flight network operation immediately.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use drill_core::http::{
    Headers, HttpRequest, HttpResponse, RequestError, RequestResult, Requester, ResponseBody,
};

/// Reqwest-backed HTTP requester.
pub struct ReqwestRequester {
    client: Client,
    timeout: Option<Duration>,
}

impl ReqwestRequester {
    /// Construct a requester from an existing `reqwest::Client`.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            timeout: None,
        }
    }

    /// Build a requester with the default TLS configuration.
    pub fn with_default_tls() -> Result<Self, reqwest::Error> {
        let client = Client::builder().build()?;
        Ok(Self::new(client))
    }

    /// Apply a per-request timeout. Timeouts surface as
    /// [`RequestError::Timeout`] and are retried like any other request
    /// error; the engine itself imposes none.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    async fn execute(&self, request: HttpRequest) -> RequestResult<HttpResponse> {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .context("invalid HTTP method")?;
        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|err| self.map_error(err))?;
        let status = response.status().as_u16();
        let mut headers = Headers::new();
        for (name, value) in response.headers() {
            if let Ok(text) = value.to_str() {
                headers.insert(name.as_str(), text);
            }
        }
        let bytes = response.bytes().await.map_err(|err| self.map_error(err))?;

        Ok(HttpResponse {
            status,
            body: decode_body(&headers, &bytes),
            headers,
        })
    }

    fn map_error(&self, err: reqwest::Error) -> RequestError {
        if err.is_timeout() {
            let millis = self.timeout.map_or(0, |timeout| timeout.as_millis() as u64);
            RequestError::Timeout(millis)
        } else {
            RequestError::Transport(anyhow::Error::new(err))
        }
    }
}

impl Default for ReqwestRequester {
    fn default() -> Self {
        ReqwestRequester::with_default_tls()
            .expect("building default reqwest client should not fail")
    }
}

#[async_trait]
impl Requester for ReqwestRequester {
    #[instrument(
        name = "requester.perform",
        skip_all,
        fields(method = request.method.as_str(), url = %request.url)
    )]
    async fn perform(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> RequestResult<HttpResponse> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RequestError::Cancelled),
            result = self.execute(request) => result,
        }
    }
}

/// Decode the body: JSON when the content type says `application/json`
/// (falling back to text on malformed payloads), raw text otherwise.
fn decode_body(headers: &Headers, bytes: &[u8]) -> ResponseBody {
    let is_json = headers
        .get("content-type")
        .is_some_and(|content_type| content_type.contains("application/json"));
    if is_json
        && let Ok(value) = serde_json::from_slice(bytes)
    {
        return ResponseBody::Json(value);
    }
    ResponseBody::Text(String::from_utf8_lossy(bytes).into_owned())
}
