//! Batch Wire Format
//!
//! A single HTTP endpoint accepts one call or an array of calls and answers
//! with an array of results in the same order.
//!
//! - Call: `{"id": 1, "path": "health.ping", "kind": "query", "input": {...}}`
//! - Success: `{"id": 1, "result": {...}}`
//! - Failure: `{"id": 1, "error": {"code": -32004, "message": "...", "data": {...}}}`
//!
//! `input` is optional; an absent input and `null` are treated the same.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::codes::ErrorCode;
use super::procedure::ProcedureKind;
use crate::schema::FieldIssue;

/// Identifier correlating a call with its result inside one batch.
pub type CallId = u64;

/// One procedure invocation on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
    /// Caller-chosen identifier echoed in the response
    pub id: CallId,
    /// Dotted procedure path
    pub path: String,
    /// Expected procedure kind
    pub kind: ProcedureKind,
    /// Serialized input, absent when the procedure takes none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
}

impl CallRequest {
    pub fn new(id: CallId, path: impl Into<String>, kind: ProcedureKind) -> Self {
        Self {
            id,
            path: path.into(),
            kind,
            input: None,
        }
    }

    pub fn with_input(mut self, input: Value) -> Self {
        self.input = Some(input);
        self
    }

    /// The input with an explicit `null` folded into "absent".
    pub fn normalized_input(&self) -> Option<Value> {
        match &self.input {
            None | Some(Value::Null) => None,
            Some(v) => Some(v.clone()),
        }
    }
}

/// Request body: a single call or an array of calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchPayload {
    Many(Vec<CallRequest>),
    Single(CallRequest),
}

impl BatchPayload {
    pub fn into_calls(self) -> Vec<CallRequest> {
        match self {
            BatchPayload::Many(calls) => calls,
            BatchPayload::Single(call) => vec![call],
        }
    }
}

/// Structured metadata attached to every error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorData {
    pub code: ErrorCode,
    pub http_status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<FieldIssue>,
}

/// Error object returned for a failed call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Numeric code (see [`super::codes`])
    pub code: i32,
    /// Human-readable description
    pub message: String,
    pub data: ErrorData,
}

impl ErrorBody {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.rpc_code(),
            message: message.into(),
            data: ErrorData {
                code,
                http_status: code.http_status(),
                path: None,
                issues: Vec::new(),
            },
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.data.path = Some(path.into());
        self
    }

    pub fn with_issues(mut self, issues: Vec<FieldIssue>) -> Self {
        self.data.issues = issues;
        self
    }

    pub fn error_code(&self) -> ErrorCode {
        self.data.code
    }

    pub fn parse_error(detail: &str) -> Self {
        Self::new(ErrorCode::ParseError, format!("Parse error: {}", detail))
    }

    pub fn payload_too_large(limit: usize) -> Self {
        Self::new(
            ErrorCode::PayloadTooLarge,
            format!("Request body too large (max {} bytes)", limit),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalServerError, message)
    }
}

impl fmt::Display for ErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.data.path {
            Some(path) => write!(f, "[{}] {}: {}", self.data.code, path, self.message),
            None => write!(f, "[{}] {}", self.data.code, self.message),
        }
    }
}

/// The outcome of one call inside a batch.
///
/// Exactly one of `result` and `error` is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallResponse {
    pub id: CallId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl CallResponse {
    pub fn success(id: CallId, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: CallId, error: ErrorBody) -> Self {
        Self {
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// HTTP status this single outcome maps to.
    pub fn http_status(&self) -> u16 {
        match &self.error {
            Some(err) => err.data.http_status,
            None => 200,
        }
    }

    /// Converts into a `Result`, treating a missing result as `null`.
    pub fn into_result(self) -> std::result::Result<Value, ErrorBody> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Aggregate HTTP status for a batch.
///
/// 200 when every call succeeded, the shared status when every call failed
/// with the same one, and 207 otherwise.
pub fn batch_status(responses: &[CallResponse]) -> u16 {
    let mut statuses = responses.iter().map(CallResponse::http_status);
    let first = match statuses.next() {
        Some(status) => status,
        None => return 200,
    };
    if statuses.all(|s| s == first) {
        first
    } else {
        207
    }
}
