//! HTTP Transport Utilities
//!
//! Helpers shared by the server endpoint and its tests:
//! - Parsing a batch of calls from an HTTP body
//! - Creating HTTP responses from call outcomes
//!
//! # Example
//!
//! ```
//! use tandem_common::transport::http::HttpTransport;
//! use tandem_common::protocol::{CallResponse, ProcedureKind};
//! use hyper::body::Bytes;
//! use serde_json::json;
//!
//! let body = Bytes::from(r#"[{"id":1,"path":"health.check","kind":"query"}]"#);
//! let calls = HttpTransport::parse_batch(body).unwrap();
//! assert_eq!(calls[0].kind, ProcedureKind::Query);
//!
//! let response = HttpTransport::to_http_response(vec![CallResponse::success(1, json!({}))]);
//! assert_eq!(response.status(), 200);
//! ```

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use serde::Serialize;

use crate::protocol::batch::batch_status;
use crate::protocol::error::{Result, TandemError};
use crate::protocol::{BatchPayload, CallRequest, CallResponse, ErrorBody};

/// Type alias for Hyper responses with full body
pub type HyperResponse = Response<Full<Bytes>>;

/// Default request body limit (1 MiB)
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Sent with a 500 when the real body cannot be encoded.
const SERIALIZE_FAILURE_BODY: &str = r#"[{"id":0,"error":{"code":-32603,"message":"Failed to serialize response","data":{"code":"INTERNAL_SERVER_ERROR","httpStatus":500}}}]"#;

/// HTTP transport utility functions
pub struct HttpTransport;

impl HttpTransport {
    /// Parse a single call or an array of calls from an HTTP body.
    ///
    /// # Example
    ///
    /// ```
    /// use tandem_common::transport::http::HttpTransport;
    /// use hyper::body::Bytes;
    ///
    /// let body = Bytes::from(r#"{"id":1,"path":"health.ping","kind":"query","input":{"echo":"hi"}}"#);
    /// let calls = HttpTransport::parse_batch(body).unwrap();
    /// assert_eq!(calls.len(), 1);
    /// ```
    pub fn parse_batch(body: Bytes) -> Result<Vec<CallRequest>> {
        let payload: BatchPayload = serde_json::from_slice(&body)?;
        Ok(payload.into_calls())
    }

    /// Create an HTTP response carrying every call outcome.
    ///
    /// The status is derived with [`batch_status`].
    pub fn to_http_response(responses: Vec<CallResponse>) -> HyperResponse {
        let status = StatusCode::from_u16(batch_status(&responses)).unwrap_or(StatusCode::OK);
        Self::json_response(&responses, status)
    }

    /// Create an HTTP response for a request that never reached dispatch
    /// (unparseable or oversized body).
    pub fn to_http_error(error: ErrorBody) -> HyperResponse {
        let status =
            StatusCode::from_u16(error.data.http_status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::json_response(&[CallResponse::failure(0, error)], status)
    }

    /// Parse the array of call outcomes from a response body.
    pub fn parse_responses(body: &[u8]) -> Result<Vec<CallResponse>> {
        serde_json::from_slice(body).map_err(|e| {
            TandemError::InvalidResponse(format!("Malformed batch response: {}", e))
        })
    }

    fn json_response<T: Serialize + ?Sized>(payload: &T, status: StatusCode) -> HyperResponse {
        let (body, status) = match serde_json::to_vec(payload) {
            Ok(body) => (Bytes::from(body), status),
            Err(e) => {
                tracing::error!("Failed to serialize response body: {}", e);
                (
                    Bytes::from_static(SERIALIZE_FAILURE_BODY.as_bytes()),
                    StatusCode::INTERNAL_SERVER_ERROR,
                )
            }
        };

        let mut response = Response::new(Full::new(body));
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    }
}
