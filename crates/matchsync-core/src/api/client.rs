//! HTTP implementation of the Remote Data Source.
//!
//! The club API is a single endpoint: reads are `GET ?action=<name>&...`,
//! mutations are form-encoded `POST`s (no CORS preflight). Every response is
//! an `{ ok, error?, ... }` envelope.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde_json::Value;
use tracing::{debug, warn};

use super::source::{ReadOp, RemoteDataSource, WriteOp};
use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// The sync layer has no timeout of its own, so the transport bounds requests.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// API client for the club backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            token: None,
        })
    }

    /// Set the bearer token for authenticated requests
    pub fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    /// Create a new ApiClient with the given token, sharing the connection pool.
    pub fn with_token(&self, token: String) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: Some(token),
        }
    }

    fn auth_headers(&self) -> Result<header::HeaderMap, ApiError> {
        let mut headers = header::HeaderMap::new();
        if let Some(ref token) = self.token {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| ApiError::InvalidResponse(format!("Invalid token header: {}", e)))?;
            headers.insert(header::AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Query pairs for a read: the action name first, then the parameters.
    fn query_pairs(op: &ReadOp) -> Vec<(String, String)> {
        let mut pairs = Vec::with_capacity(op.params().len() + 1);
        pairs.push(("action".to_string(), op.name().to_string()));
        pairs.extend(op.params().iter().map(|(k, v)| (k.clone(), v.clone())));
        pairs
    }

    /// Form fields for a mutation. Objects and arrays are sent as JSON text.
    fn form_fields(op: &WriteOp) -> Vec<(String, String)> {
        let mut fields = Vec::with_capacity(op.fields().len() + 1);
        fields.push(("action".to_string(), op.name().to_string()));
        for (key, value) in op.fields() {
            let encoded = match value {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            };
            fields.push((key.clone(), encoded));
        }
        fields
    }

    /// Unwrap the `{ ok, error }` envelope into a tagged result.
    fn unwrap_envelope(body: Value) -> Result<Value, ApiError> {
        match body.get("ok").and_then(Value::as_bool) {
            Some(true) => Ok(body),
            _ => {
                let reason = body
                    .get("error")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .unwrap_or("Request failed")
                    .to_string();
                Err(ApiError::Rejected(reason))
            }
        }
    }

    /// One attempt per request. A 429 surfaces as [`ApiError::RateLimited`];
    /// callers decide whether to try again.
    async fn send(&self, label: &str, request: reqwest::RequestBuilder) -> Result<Value, ApiError> {
        let response = request.headers(self.auth_headers()?).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(action = label, status = status.as_u16(), "Request failed");
            return Err(ApiError::from_status(status, &body));
        }
        let body: Value = response.json().await?;
        debug!(action = label, "Response received");
        Self::unwrap_envelope(body)
    }
}

#[async_trait]
impl RemoteDataSource for ApiClient {
    async fn read(&self, op: &ReadOp) -> Result<Value, ApiError> {
        let query = Self::query_pairs(op);
        let request = self
            .client
            .get(&self.base_url)
            .header(header::CACHE_CONTROL, "no-store")
            .query(&query);
        self.send(op.name(), request).await
    }

    async fn write(&self, op: &WriteOp) -> Result<Value, ApiError> {
        let form = Self::form_fields(op);
        let request = self.client.post(&self.base_url).form(&form);
        self.send(op.name(), request).await
    }
}
