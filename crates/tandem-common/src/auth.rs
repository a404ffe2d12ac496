//! Authentication Layer for Tandem
//!
//! Resolves the credential presented with a request to a [`Principal`]. The
//! current implementation maps shared API keys to principals; keys are read
//! from the `X-API-Key` header or an `Authorization: Bearer` header.
//!
//! # Security Model
//!
//! - API keys are shared secrets between clients and the server
//! - Keys are compared in constant time to prevent timing attacks
//! - An unknown or missing key is not a transport failure: the request simply
//!   carries no principal, and procedures that require one reject the call
//!
//! # Example
//!
//! ```
//! use tandem_common::auth::AuthConfig;
//!
//! let auth = AuthConfig::with_api_key("my-secret-key-12345", "ops");
//! assert_eq!(auth.authenticate(Some("my-secret-key-12345")).unwrap().id, "ops");
//! assert!(auth.authenticate(Some("guess")).is_none());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Header carrying a raw API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// The authenticated identity a request acts as.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
}

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[derive(Clone)]
struct ApiKey {
    secret: String,
    principal: Principal,
}

/// Authentication configuration for a Tandem server.
///
/// With no keys configured nobody authenticates, so only public procedures
/// can be called.
#[derive(Clone, Default)]
pub struct AuthConfig {
    keys: Vec<ApiKey>,
}

impl AuthConfig {
    /// Creates a configuration accepting a single API key.
    pub fn with_api_key(api_key: impl Into<String>, principal: impl Into<String>) -> Self {
        Self::disabled().add_api_key(api_key, principal)
    }

    /// Creates a configuration that never authenticates anyone.
    pub fn disabled() -> Self {
        Self { keys: Vec::new() }
    }

    /// Adds another accepted key.
    pub fn add_api_key(mut self, api_key: impl Into<String>, principal: impl Into<String>) -> Self {
        self.keys.push(ApiKey {
            secret: api_key.into(),
            principal: Principal::new(principal),
        });
        self
    }

    /// Returns whether any key is configured.
    pub fn is_enabled(&self) -> bool {
        !self.keys.is_empty()
    }

    /// Resolves a presented credential to its principal.
    ///
    /// Every configured key is compared so the time taken does not reveal
    /// which key matched.
    pub fn authenticate(&self, provided: Option<&str>) -> Option<Principal> {
        let provided = provided?;
        let mut found = None;
        for key in &self.keys {
            if constant_time_eq(&key.secret, provided) && found.is_none() {
                found = Some(key.principal.clone());
            }
        }
        found
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.keys.len() {
            0 => write!(f, "Disabled"),
            n => write!(f, "ApiKey(*****; {} key(s))", n),
        }
    }
}

/// Performs constant-time string comparison to prevent timing attacks.
///
/// Iterates through the entire strings regardless of where the first
/// difference occurs.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (byte_a, byte_b) in a.bytes().zip(b.bytes()) {
        result |= byte_a ^ byte_b;
    }

    result == 0
}

/// Picks the credential from request headers.
///
/// `X-API-Key` wins over `Authorization`; the latter must use the `Bearer`
/// scheme (case-insensitive).
///
/// # Example
///
/// ```
/// use tandem_common::auth::extract_credential;
///
/// assert_eq!(extract_credential(Some("k1"), Some("Bearer k2")), Some("k1"));
/// assert_eq!(extract_credential(None, Some("Bearer k2")), Some("k2"));
/// assert_eq!(extract_credential(None, Some("Basic abc")), None);
/// ```
pub fn extract_credential<'a>(api_key: Option<&'a str>, authorization: Option<&'a str>) -> Option<&'a str> {
    if let Some(key) = api_key.map(str::trim).filter(|k| !k.is_empty()) {
        return Some(key);
    }

    let authorization = authorization?.trim();
    let (scheme, token) = authorization.split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") {
        Some(token.trim()).filter(|t| !t.is_empty())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_config_with_api_key() {
        let auth = AuthConfig::with_api_key("test-key", "tester");
        assert!(auth.is_enabled());
        assert_eq!(auth.authenticate(Some("test-key")), Some(Principal::new("tester")));
        assert_eq!(auth.authenticate(Some("wrong-key")), None);
        assert_eq!(auth.authenticate(None), None);
    }

    #[test]
    fn test_auth_config_disabled() {
        let auth = AuthConfig::disabled();
        assert!(!auth.is_enabled());
        assert_eq!(auth.authenticate(Some("anything")), None);
        assert_eq!(auth.authenticate(Some("")), None);
    }

    #[test]
    fn test_multiple_keys_map_to_their_principals() {
        let auth = AuthConfig::with_api_key("k-one", "one").add_api_key("k-two", "two");
        assert_eq!(auth.authenticate(Some("k-two")).unwrap().id, "two");
        assert_eq!(auth.authenticate(Some("k-one")).unwrap().id, "one");
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("hello", "hello"));
        assert!(constant_time_eq("", ""));
        assert!(!constant_time_eq("hello", "world"));
        assert!(!constant_time_eq("short", "longer"));
    }

    #[test]
    fn test_extract_credential() {
        assert_eq!(extract_credential(Some(" k "), None), Some("k"));
        assert_eq!(extract_credential(Some(""), Some("bearer t")), Some("t"));
        assert_eq!(extract_credential(None, Some("Bearer")), None);
        assert_eq!(extract_credential(None, None), None);
    }

    #[test]
    fn test_auth_config_display_hides_keys() {
        let auth = AuthConfig::with_api_key("secret", "p");
        let shown = format!("{}", auth);
        assert!(!shown.contains("secret"));
        assert_eq!(format!("{}", AuthConfig::disabled()), "Disabled");
    }
}
