//! Error Codes
//!
//! Numeric codes follow the JSON-RPC 2.0 convention of negative integers,
//! with the `-32000` to `-32099` server range used for application errors.
//!
//! - `-32700`: Parse error
//! - `-32600`: Bad request
//! - `-32602`: Input validation failed
//! - `-32603`: Internal server error
//! - `-32001`: Unauthorized
//! - `-32004`: Not found
//! - `-32005`: Method not supported
//! - `-32013`: Payload too large
//!
//! Each code also carries the HTTP status a transport should answer with.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Invalid JSON was received by the server
pub const PARSE_ERROR: i32 = -32700;
/// The payload is not a valid call
pub const BAD_REQUEST: i32 = -32600;
/// Input failed schema validation
pub const VALIDATION_ERROR: i32 = -32602;
/// Unexpected failure inside a procedure
pub const INTERNAL_SERVER_ERROR: i32 = -32603;
/// Authorization check failed
pub const UNAUTHORIZED: i32 = -32001;
/// Procedure or entity does not exist
pub const NOT_FOUND: i32 = -32004;
/// The procedure kind cannot be served over this transport
pub const METHOD_NOT_SUPPORTED: i32 = -32005;
/// Request entity too large
pub const PAYLOAD_TOO_LARGE: i32 = -32013;

/// Symbolic error code carried in every error body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ParseError,
    BadRequest,
    Validation,
    Unauthorized,
    NotFound,
    MethodNotSupported,
    PayloadTooLarge,
    InternalServerError,
}

impl ErrorCode {
    pub fn rpc_code(self) -> i32 {
        match self {
            ErrorCode::ParseError => PARSE_ERROR,
            ErrorCode::BadRequest => BAD_REQUEST,
            ErrorCode::Validation => VALIDATION_ERROR,
            ErrorCode::Unauthorized => UNAUTHORIZED,
            ErrorCode::NotFound => NOT_FOUND,
            ErrorCode::MethodNotSupported => METHOD_NOT_SUPPORTED,
            ErrorCode::PayloadTooLarge => PAYLOAD_TOO_LARGE,
            ErrorCode::InternalServerError => INTERNAL_SERVER_ERROR,
        }
    }

    pub fn http_status(self) -> u16 {
        match self {
            ErrorCode::ParseError | ErrorCode::BadRequest | ErrorCode::Validation => 400,
            ErrorCode::Unauthorized => 401,
            ErrorCode::NotFound => 404,
            ErrorCode::MethodNotSupported => 405,
            ErrorCode::PayloadTooLarge => 413,
            ErrorCode::InternalServerError => 500,
        }
    }

    pub fn from_rpc_code(code: i32) -> Option<Self> {
        let code = match code {
            PARSE_ERROR => ErrorCode::ParseError,
            BAD_REQUEST => ErrorCode::BadRequest,
            VALIDATION_ERROR => ErrorCode::Validation,
            UNAUTHORIZED => ErrorCode::Unauthorized,
            NOT_FOUND => ErrorCode::NotFound,
            METHOD_NOT_SUPPORTED => ErrorCode::MethodNotSupported,
            PAYLOAD_TOO_LARGE => ErrorCode::PayloadTooLarge,
            INTERNAL_SERVER_ERROR => ErrorCode::InternalServerError,
            _ => return None,
        };
        Some(code)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::ParseError => "PARSE_ERROR",
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::Validation => "VALIDATION",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::MethodNotSupported => "METHOD_NOT_SUPPORTED",
            ErrorCode::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            ErrorCode::InternalServerError => "INTERNAL_SERVER_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ErrorCode; 8] = [
        ErrorCode::ParseError,
        ErrorCode::BadRequest,
        ErrorCode::Validation,
        ErrorCode::Unauthorized,
        ErrorCode::NotFound,
        ErrorCode::MethodNotSupported,
        ErrorCode::PayloadTooLarge,
        ErrorCode::InternalServerError,
    ];

    #[test]
    fn test_rpc_codes_are_reversible() {
        for code in ALL {
            assert_eq!(ErrorCode::from_rpc_code(code.rpc_code()), Some(code));
        }
        assert_eq!(ErrorCode::from_rpc_code(-1), None);
    }

    #[test]
    fn test_http_statuses() {
        assert_eq!(ErrorCode::Validation.http_status(), 400);
        assert_eq!(ErrorCode::Unauthorized.http_status(), 401);
        assert_eq!(ErrorCode::NotFound.http_status(), 404);
        assert_eq!(ErrorCode::InternalServerError.http_status(), 500);
    }

    #[test]
    fn test_serialized_names_match_display() {
        for code in ALL {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code));
        }
    }
}
