//! Health procedure payloads
//!
//! Strongly-typed input and output schemas for the `health.*` procedures.
//! These types are the single source of truth for the wire format of the
//! demonstration feature, shared by the server handlers and typed clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// health.check
// ============================================================================

/// Response of `health.check`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthStatus {
    /// Always `"ok"` when the procedure responds
    pub status: String,
    /// Application version string
    pub version: String,
    /// Seconds since the process started
    pub uptime: f64,
}

impl HealthStatus {
    /// # Example
    /// ```rust
    /// use tandem_common::protocol::builtin::HealthStatus;
    ///
    /// let status = HealthStatus::ok("1.2.3", 4.5);
    /// assert_eq!(status.status, "ok");
    /// ```
    pub fn ok(version: impl Into<String>, uptime: f64) -> Self {
        Self {
            status: "ok".to_string(),
            version: version.into(),
            uptime,
        }
    }
}

// ============================================================================
// health.ping
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PingInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub echo: Option<String>,
}

/// Response of `health.ping`. `echo` is omitted when no echo was sent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PingOutput {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub echo: Option<String>,
}

impl PingOutput {
    pub fn pong(echo: Option<String>) -> Self {
        Self {
            message: "pong".to_string(),
            echo,
        }
    }
}

// ============================================================================
// health.log
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub echo: Option<String>,
}

/// Response of `health.log`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogOutput {
    pub logged: bool,
    pub timestamp: DateTime<Utc>,
}

impl LogOutput {
    pub fn logged_at(timestamp: DateTime<Utc>) -> Self {
        Self {
            logged: true,
            timestamp,
        }
    }
}
