//! HTTP transport seam.
//!
//! The token manager and the resource methods never talk to `reqwest`
//! directly; they build an [`HttpRequest`] and hand it to a [`Transport`].
//! Any response that arrives is a success at this layer. Callers inspect
//! `body.error` for application level failures.

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{
    Client, Method,
    header::{ACCEPT, AUTHORIZATION},
};
use serde_json::Value;

use crate::error::{Error, Result};

/// Duration to keep idle connections alive.
const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(60);

/// Upper bound for a single request, including reading the body.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Request body variants used by the Web API.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    /// `application/x-www-form-urlencoded`, used by the token endpoint.
    Form(Vec<(String, String)>),
    Json(Value),
}

/// Transport independent description of a request.
#[derive(Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Authorization values carry secrets.
        let headers: Vec<(&str, &str)> = self
            .headers
            .iter()
            .map(|(name, value)| {
                if name.eq_ignore_ascii_case(AUTHORIZATION.as_str()) {
                    (name.as_str(), "<redacted>")
                } else {
                    (name.as_str(), value.as_str())
                }
            })
            .collect();

        let body = match &self.body {
            RequestBody::Form(_) => "form",
            RequestBody::Json(_) => "json",
            RequestBody::Empty => "empty",
        };

        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &headers)
            .field("body", &body)
            .finish()
    }
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: vec![(ACCEPT.to_string(), "application/json".to_string())],
            body: RequestBody::Empty,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn bearer(self, access_token: &str) -> Self {
        self.header(AUTHORIZATION.as_str(), format!("Bearer {access_token}"))
    }

    pub fn form<K, V>(mut self, fields: &[(K, V)]) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.body = RequestBody::Form(
            fields
                .iter()
                .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string()))
                .collect(),
        );
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    /// Value of the first header named `name`, compared case-insensitively.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Value of form field `name`, if the body is a form.
    pub fn form_value(&self, name: &str) -> Option<&str> {
        match &self.body {
            RequestBody::Form(fields) => fields
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }
}

/// A received response. Empty bodies are represented as `Value::Null`.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Value,
}

impl HttpResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    /// The structured error carried in the body, if any.
    ///
    /// The Web API uses `{"error": {"status": 404, "message": "..."}}`, the
    /// accounts service `{"error": "invalid_grant", "error_description": "..."}`.
    pub fn error_message(&self) -> Option<String> {
        match self.body.get("error")? {
            Value::Null | Value::Bool(false) => None,
            Value::String(code) => Some(
                self.body
                    .get("error_description")
                    .and_then(Value::as_str)
                    .unwrap_or(code)
                    .to_string(),
            ),
            Value::Object(details) => Some(
                details
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| Value::Object(details.clone()).to_string()),
            ),
            other => Some(other.to_string()),
        }
    }

    /// Status reported inside the error body, falling back to the HTTP status.
    pub fn error_status(&self) -> u16 {
        self.body
            .get("error")
            .and_then(|e| e.get("status"))
            .and_then(Value::as_u64)
            .and_then(|s| u16::try_from(s).ok())
            .unwrap_or(self.status)
    }
}

/// Sends requests to the remote service.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// Shared transport handle.
pub type SharedTransport = Arc<dyn Transport>;

/// [`Transport`] implementation on top of `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .tcp_keepalive(KEEPALIVE_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { http })
    }

    /// Wraps an already configured client.
    pub fn with_client(http: Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        tracing::debug!(method = %request.method, url = %request.url, "sending request");

        let mut builder = self.http.request(request.method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Form(fields) => builder.form(&fields),
            RequestBody::Json(body) => builder.json(&body),
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).map_err(|e| {
                tracing::trace!("{text}");
                Error::Json(format!("response with status {status} is not JSON: {e}"))
            })?
        };

        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_error_message_from_api_shape() {
        let response = HttpResponse::new(
            404,
            json!({ "error": { "status": 404, "message": "Non existing id" } }),
        );
        assert_eq!(response.error_message().as_deref(), Some("Non existing id"));
        assert_eq!(response.error_status(), 404);
    }

    #[test]
    fn test_error_message_from_accounts_shape() {
        let response = HttpResponse::new(
            400,
            json!({ "error": "invalid_grant", "error_description": "Invalid refresh token" }),
        );
        assert_eq!(
            response.error_message().as_deref(),
            Some("Invalid refresh token")
        );
        assert_eq!(response.error_status(), 400);

        let bare = HttpResponse::new(400, json!({ "error": "invalid_client" }));
        assert_eq!(bare.error_message().as_deref(), Some("invalid_client"));
    }

    #[test]
    fn test_no_error() {
        assert_eq!(HttpResponse::new(200, json!({ "id": "x" })).error_message(), None);
        assert_eq!(HttpResponse::new(204, Value::Null).error_message(), None);
        assert_eq!(HttpResponse::new(200, json!({ "error": null })).error_message(), None);
    }

    #[test]
    fn test_debug_redacts_authorization() {
        let request = HttpRequest::get("https://api.spotify.com/v1/me").bearer("secret-token");
        let debug = format!("{request:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("<redacted>"));
        assert_eq!(request.header_value("authorization"), Some("Bearer secret-token"));
        assert_eq!(request.header_value("Accept"), Some("application/json"));
    }

    #[test]
    fn test_form_value() {
        let request = HttpRequest::post("https://accounts.spotify.com/api/token")
            .form(&[("grant_type", "refresh_token"), ("refresh_token", "r1")]);
        assert_eq!(request.form_value("grant_type"), Some("refresh_token"));
        assert_eq!(request.form_value("code"), None);
    }
}
