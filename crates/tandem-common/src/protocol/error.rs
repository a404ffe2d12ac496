use thiserror::Error;

use super::batch::ErrorBody;

/// Errors raised outside of procedure execution: transport, configuration
/// and wire-format failures.
///
/// Outcomes of individual procedure calls are [`super::ProcedureError`]s; a
/// client that receives one over the wire surfaces it as [`TandemError::Remote`].
#[derive(Error, Debug)]
pub enum TandemError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Remote procedure failed: {0}")]
    Remote(ErrorBody),
}

impl From<std::net::AddrParseError> for TandemError {
    fn from(err: std::net::AddrParseError) -> Self {
        TandemError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TandemError>;
