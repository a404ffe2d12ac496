//! Procedure call failures
//!
//! Every failed call resolves to one variant of [`ProcedureError`], tagged
//! with the path of the procedure it concerns. Validation and authorization
//! failures are produced before a handler runs; the remaining variants wrap
//! what a handler reported.

use thiserror::Error;

use super::batch::ErrorBody;
use super::codes::ErrorCode;
use crate::schema::{summarize_issues, FieldIssue};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProcedureError {
    #[error("Invalid input for {path}: {}", summarize_issues(.issues))]
    Validation { path: String, issues: Vec<FieldIssue> },

    #[error("Unauthorized call to {path}: {message}")]
    Unauthorized { path: String, message: String },

    #[error("Not found ({path}): {message}")]
    NotFound { path: String, message: String },

    #[error("Bad request to {path}: {message}")]
    BadRequest { path: String, message: String },

    #[error("Method not supported ({path}): {message}")]
    MethodNotSupported { path: String, message: String },

    #[error("Internal error in {path}: {message}")]
    Internal { path: String, message: String },
}

impl ProcedureError {
    /// The error raised for a path with no registered procedure.
    pub fn unknown_procedure(path: &str) -> Self {
        ProcedureError::NotFound {
            path: path.to_string(),
            message: format!("No procedure registered at `{}`", path),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ProcedureError::Validation { .. } => ErrorCode::Validation,
            ProcedureError::Unauthorized { .. } => ErrorCode::Unauthorized,
            ProcedureError::NotFound { .. } => ErrorCode::NotFound,
            ProcedureError::BadRequest { .. } => ErrorCode::BadRequest,
            ProcedureError::MethodNotSupported { .. } => ErrorCode::MethodNotSupported,
            ProcedureError::Internal { .. } => ErrorCode::InternalServerError,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            ProcedureError::Validation { path, .. }
            | ProcedureError::Unauthorized { path, .. }
            | ProcedureError::NotFound { path, .. }
            | ProcedureError::BadRequest { path, .. }
            | ProcedureError::MethodNotSupported { path, .. }
            | ProcedureError::Internal { path, .. } => path,
        }
    }

    pub fn issues(&self) -> &[FieldIssue] {
        match self {
            ProcedureError::Validation { issues, .. } => issues,
            _ => &[],
        }
    }

    /// Wire representation of this failure.
    pub fn to_body(&self) -> ErrorBody {
        let message = match self {
            ProcedureError::Validation { issues, .. } => {
                format!("Input validation failed: {}", summarize_issues(issues))
            }
            ProcedureError::Unauthorized { message, .. }
            | ProcedureError::NotFound { message, .. }
            | ProcedureError::BadRequest { message, .. }
            | ProcedureError::MethodNotSupported { message, .. }
            | ProcedureError::Internal { message, .. } => message.clone(),
        };

        ErrorBody::new(self.code(), message)
            .with_path(self.path())
            .with_issues(self.issues().to_vec())
    }

    /// Rebuilds a failure from its wire representation.
    ///
    /// Codes with no call-level meaning (parse and payload errors) map to
    /// `BadRequest`.
    pub fn from_body(body: &ErrorBody) -> Self {
        let path = body.data.path.clone().unwrap_or_default();
        let message = body.message.clone();
        match body.data.code {
            ErrorCode::Validation => ProcedureError::Validation {
                path,
                issues: body.data.issues.clone(),
            },
            ErrorCode::Unauthorized => ProcedureError::Unauthorized { path, message },
            ErrorCode::NotFound => ProcedureError::NotFound { path, message },
            ErrorCode::MethodNotSupported => ProcedureError::MethodNotSupported { path, message },
            ErrorCode::InternalServerError => ProcedureError::Internal { path, message },
            ErrorCode::BadRequest | ErrorCode::ParseError | ErrorCode::PayloadTooLarge => {
                ProcedureError::BadRequest { path, message }
            }
        }
    }
}

impl From<ProcedureError> for ErrorBody {
    fn from(err: ProcedureError) -> Self {
        err.to_body()
    }
}
