//! Resilient HTTP calls.
//!
//! The actual HTTP library sits behind the [`HttpClient`] trait so tests can
//! script responses. [`NetworkClient`] layers per-attempt timeouts, retries
//! and offline fallback on top of it.

use crate::config::CallOptions;
use crate::connectivity::Connectivity;
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use tracing::debug;

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET.
    Get,
    /// POST.
    Post,
    /// PATCH.
    Patch,
    /// DELETE.
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// A request to execute.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// Method.
    pub method: Method,
    /// Absolute URL.
    pub url: String,
    /// Optional JSON body.
    pub body: Option<Value>,
}

impl HttpRequest {
    /// Creates a request without a body.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            body: None,
        }
    }

    /// Creates a GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    /// Attaches a JSON body.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// A raw response.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// `Content-Type` header, if any.
    pub content_type: Option<String>,
    /// Body bytes.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a JSON response.
    pub fn json(status: u16, body: &Value) -> Self {
        Self {
            status,
            content_type: Some("application/json".to_string()),
            body: body.to_string().into_bytes(),
        }
    }

    /// Creates a plain text response.
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: Some("text/plain; charset=utf-8".to_string()),
            body: body.into().into_bytes(),
        }
    }

    /// Creates a response without a body.
    pub fn empty(status: u16) -> Self {
        Self {
            status,
            content_type: None,
            body: Vec::new(),
        }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// `application/json` or `+json` content.
    Json(Value),
    /// `text/*` content.
    Text(String),
    /// Anything else.
    Bytes(Vec<u8>),
}

impl ResponseBody {
    /// Decodes a body according to its content type.
    ///
    /// An empty JSON body decodes to `null`.
    pub fn parse(content_type: Option<&str>, body: &[u8]) -> SyncResult<Self> {
        let essence = content_type
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_ascii_lowercase())
            .unwrap_or_default();

        if essence == "application/json" || essence.ends_with("+json") {
            if body.iter().all(u8::is_ascii_whitespace) {
                return Ok(ResponseBody::Json(Value::Null));
            }
            let value = serde_json::from_slice(body)?;
            Ok(ResponseBody::Json(value))
        } else if essence.starts_with("text/") {
            Ok(ResponseBody::Text(String::from_utf8_lossy(body).into_owned()))
        } else {
            Ok(ResponseBody::Bytes(body.to_vec()))
        }
    }

    /// Decodes a JSON body into a typed value.
    pub fn into_json<T: DeserializeOwned>(self) -> SyncResult<T> {
        match self {
            ResponseBody::Json(value) => Ok(serde_json::from_value(value)?),
            ResponseBody::Text(text) => Ok(serde_json::from_str(&text)?),
            ResponseBody::Bytes(_) => Err(SyncError::Codec(
                "expected a JSON body, got binary content".to_string(),
            )),
        }
    }

    /// Extracts a human readable error message.
    ///
    /// Looks at the JSON `message` field, then `detail`, then a non-empty
    /// text body.
    pub fn error_message(&self) -> Option<String> {
        match self {
            ResponseBody::Json(value) => ["message", "detail"]
                .iter()
                .find_map(|field| match value.get(field) {
                    Some(Value::String(text)) => Some(text.clone()),
                    Some(Value::Null) | None => None,
                    Some(other) => Some(other.to_string()),
                }),
            ResponseBody::Text(text) => {
                let text = text.trim();
                (!text.is_empty()).then(|| text.to_string())
            }
            ResponseBody::Bytes(_) => None,
        }
    }
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport. Failures
/// before a status line is received are reported as
/// [`SyncError::Transport`].
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Executes a single request.
    async fn execute(&self, request: &HttpRequest) -> SyncResult<HttpResponse>;
}

/// [`HttpClient`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl ReqwestClient {
    /// Creates a client with default settings.
    pub fn new() -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| SyncError::transport_fatal(e.to_string()))?;
        Ok(Self::with_client(client))
    }

    /// Wraps an existing `reqwest` client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            api_key: None,
        }
    }

    /// Sends `X-API-Key` with every request.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn execute(&self, request: &HttpRequest) -> SyncResult<HttpResponse> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
            Method::Patch => self.client.patch(&request.url),
            Method::Delete => self.client.delete(&request.url),
        };
        if let Some(api_key) = &self.api_key {
            builder = builder.header("X-API-Key", api_key);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(transport_error)?;

        Ok(HttpResponse {
            status,
            content_type,
            body: body.to_vec(),
        })
    }
}

fn transport_error(err: reqwest::Error) -> SyncError {
    if err.is_builder() {
        SyncError::transport_fatal(err.to_string())
    } else {
        SyncError::transport_retryable(err.to_string())
    }
}

/// Executes requests with timeout, retry and offline fallback.
///
/// Each attempt runs under the call's timeout. Failed attempts are retried
/// up to `retries` times. When retries are exhausted on an offline device
/// and the call is offlineable, the fallback value is returned instead of
/// the error.
pub struct NetworkClient<C, N> {
    client: C,
    connectivity: N,
}

impl<C: HttpClient, N: Connectivity> NetworkClient<C, N> {
    /// Creates a network client.
    pub fn new(client: C, connectivity: N) -> Self {
        Self {
            client,
            connectivity,
        }
    }

    /// Returns the underlying HTTP client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Executes a request.
    pub async fn call(
        &self,
        request: &HttpRequest,
        options: &CallOptions,
    ) -> SyncResult<ResponseBody> {
        let mut retry = 0;
        loop {
            let err = match self.attempt(request, options).await {
                Ok(body) => return Ok(body),
                Err(err) => err,
            };

            if retry < options.retries {
                retry += 1;
                let delay = options.delay_before_retry(retry);
                debug!(
                    method = %request.method,
                    url = %request.url,
                    retry,
                    ?delay,
                    error = %err,
                    "retrying request"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            if options.offlineable && !self.connectivity.is_online() {
                return match &options.fallback {
                    Some(fallback) => {
                        debug!(url = %request.url, "offline, returning fallback");
                        Ok(fallback.clone())
                    }
                    None => Err(SyncError::OfflineNoFallback),
                };
            }

            return Err(err);
        }
    }

    /// Executes a request and decodes its JSON body.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        request: &HttpRequest,
        options: &CallOptions,
    ) -> SyncResult<T> {
        self.call(request, options).await?.into_json()
    }

    async fn attempt(
        &self,
        request: &HttpRequest,
        options: &CallOptions,
    ) -> SyncResult<ResponseBody> {
        let response = tokio::time::timeout(options.timeout, self.client.execute(request))
            .await
            .map_err(|_| SyncError::Timeout(options.timeout))??;

        if response.is_success() {
            return ResponseBody::parse(response.content_type.as_deref(), &response.body);
        }

        // Error bodies are best effort; an unparsable one still yields the status.
        let message = ResponseBody::parse(response.content_type.as_deref(), &response.body)
            .ok()
            .and_then(|body| body.error_message())
            .unwrap_or_else(|| reason_phrase(response.status));

        Err(SyncError::RequestFailed {
            status: response.status,
            message,
        })
    }
}

fn reason_phrase(status: u16) -> String {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {status}"))
}
