use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use tandem_common::auth::API_KEY_HEADER;
use tandem_common::protocol::{CallRequest, CallResponse, ErrorBody, ProcedureKind, Result, TandemError};
use tandem_common::transport::HttpTransport;
use tandem_common::QueryFetcher;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Tandem client for calling procedures over HTTP
///
/// Every call is a POST of a batch to the server's endpoint. Single calls are
/// sent as a one-element batch; [`TandemClient::batch`] sends several calls
/// in one request.
#[derive(Debug)]
pub struct TandemClient {
    endpoint: String,
    http: reqwest::Client,
    api_key: Option<String>,
    timeout: Duration,
    next_id: AtomicU64,
}

impl TandemClient {
    /// Create a client for the batch endpoint at `endpoint`
    /// (e.g. `http://127.0.0.1:3000/api/rpc`).
    ///
    /// # Errors
    ///
    /// Returns `TandemError::Config` unless the URL starts with `http://` or
    /// `https://`.
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let endpoint = endpoint.into();
        validate_http_url(&endpoint)?;
        Ok(Self {
            http: build_http(DEFAULT_TIMEOUT)?,
            endpoint,
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
            next_id: AtomicU64::new(1),
        })
    }

    /// Send `api_key` in the `X-API-Key` header of every request.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.http = build_http(timeout)?;
        self.timeout = timeout;
        Ok(self)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Send several calls in one request.
    ///
    /// Returns one outcome per call, in the order the calls were given,
    /// whatever the HTTP status of the batch.
    pub async fn batch(&self, calls: Vec<CallRequest>) -> Result<Vec<CallResponse>> {
        tracing::debug!(endpoint = %self.endpoint, calls = calls.len(), "Sending batch");

        let mut request = self.http.post(&self.endpoint).json(&calls);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = request.send().await.map_err(|e| self.map_send_error(e))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| TandemError::Transport(format!("Failed to read response body: {}", e)))?;

        match HttpTransport::parse_responses(&body) {
            Ok(responses) => Ok(responses),
            Err(_) if !status.is_success() => Err(TandemError::Transport(format!(
                "HTTP {} from {}",
                status, self.endpoint
            ))),
            Err(e) => Err(e),
        }
    }

    /// Call a procedure and return its result.
    ///
    /// # Errors
    ///
    /// A failed procedure surfaces as `TandemError::Remote` carrying the
    /// structured error body; everything else is a transport error.
    pub async fn call(&self, path: &str, kind: ProcedureKind, input: Option<Value>) -> Result<Value> {
        let mut call = CallRequest::new(self.next_id(), path, kind);
        call.input = input;
        let id = call.id;

        let mut responses = self.batch(vec![call]).await?;
        if responses.len() != 1 || responses[0].id != id {
            return Err(TandemError::InvalidResponse(format!(
                "expected one response with id {}, got {}",
                id,
                responses.len()
            )));
        }
        responses.remove(0).into_result().map_err(TandemError::Remote)
    }

    pub async fn query(&self, path: &str, input: Option<Value>) -> Result<Value> {
        self.call(path, ProcedureKind::Query, input).await
    }

    pub async fn mutate(&self, path: &str, input: Option<Value>) -> Result<Value> {
        self.call(path, ProcedureKind::Mutation, input).await
    }

    /// Typed query: serializes `input` and decodes the result into `O`.
    pub async fn query_as<I, O>(&self, path: &str, input: &I) -> Result<O>
    where
        I: Serialize + ?Sized,
        O: DeserializeOwned,
    {
        let value = self.query(path, Some(serde_json::to_value(input)?)).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Typed mutation: serializes `input` and decodes the result into `O`.
    pub async fn mutate_as<I, O>(&self, path: &str, input: &I) -> Result<O>
    where
        I: Serialize + ?Sized,
        O: DeserializeOwned,
    {
        let value = self.mutate(path, Some(serde_json::to_value(input)?)).await?;
        Ok(serde_json::from_value(value)?)
    }

    fn map_send_error(&self, err: reqwest::Error) -> TandemError {
        if err.is_timeout() {
            TandemError::Timeout(self.timeout.as_millis() as u64)
        } else if err.is_connect() {
            TandemError::Connection(format!("Failed to connect to {}: {}", self.endpoint, err))
        } else {
            TandemError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl QueryFetcher for TandemClient {
    async fn fetch(&self, path: &str, input: Option<Value>) -> std::result::Result<Value, ErrorBody> {
        self.query(path, input).await.map_err(|err| match err {
            TandemError::Remote(body) => body,
            other => ErrorBody::internal(other.to_string()).with_path(path),
        })
    }
}

fn build_http(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| TandemError::Config(format!("Failed to build HTTP client: {}", e)))
}

fn validate_http_url(url: &str) -> Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(TandemError::Config(format!(
            "Invalid endpoint: '{}' must start with http:// or https://",
            url
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = TandemClient::new("http://127.0.0.1:3000/api/rpc").unwrap();
        assert_eq!(client.endpoint(), "http://127.0.0.1:3000/api/rpc");
    }

    #[test]
    fn test_client_rejects_non_http_urls() {
        assert!(matches!(
            TandemClient::new("127.0.0.1:3000/api/rpc"),
            Err(TandemError::Config(_))
        ));
        assert!(matches!(TandemClient::new("ftp://host/rpc"), Err(TandemError::Config(_))));
    }

    #[test]
    fn test_call_ids_increase() {
        let client = TandemClient::new("https://example.com/api/rpc").unwrap();
        let first = client.next_id();
        assert!(client.next_id() > first);
    }
}
