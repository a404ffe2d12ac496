//! Procedure identity
//!
//! Procedures are addressed by dotted paths such as `health.check`. Every
//! segment is a non-empty run of ASCII alphanumerics, `_` or `-`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Reason a dotted procedure path was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("procedure path is empty")]
    Empty,

    #[error("procedure path `{0}` has an empty segment")]
    EmptySegment(String),

    #[error("procedure path `{path}` contains invalid character `{ch}`")]
    InvalidCharacter { path: String, ch: char },
}

/// A validated dotted procedure path.
///
/// # Example
///
/// ```
/// use tandem_common::protocol::ProcedurePath;
///
/// let path = ProcedurePath::parse("health.check").unwrap();
/// assert_eq!(path.as_str(), "health.check");
/// assert!(ProcedurePath::parse("health..check").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProcedurePath(String);

impl ProcedurePath {
    pub fn parse(path: &str) -> Result<Self, PathError> {
        if path.is_empty() {
            return Err(PathError::Empty);
        }

        for segment in path.split('.') {
            if segment.is_empty() {
                return Err(PathError::EmptySegment(path.to_string()));
            }
            if let Some(ch) = segment
                .chars()
                .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
            {
                return Err(PathError::InvalidCharacter {
                    path: path.to_string(),
                    ch,
                });
            }
        }

        Ok(Self(path.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Segment-aware prefix test on raw dotted strings.
pub fn path_is_within(path: &str, prefix: &str) -> bool {
    if prefix.is_empty() {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('.'),
        None => false,
    }
}

impl fmt::Display for ProcedurePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ProcedurePath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ProcedurePath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ProcedurePath> for String {
    fn from(path: ProcedurePath) -> Self {
        path.0
    }
}

/// The kind of a procedure.
///
/// Queries read, mutations write, subscriptions stream values over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcedureKind {
    Query,
    Mutation,
    Subscription,
}

impl ProcedureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcedureKind::Query => "query",
            ProcedureKind::Mutation => "mutation",
            ProcedureKind::Subscription => "subscription",
        }
    }
}

impl fmt::Display for ProcedureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcedureKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "query" => Ok(ProcedureKind::Query),
            "mutation" => Ok(ProcedureKind::Mutation),
            "subscription" => Ok(ProcedureKind::Subscription),
            other => Err(format!("unknown procedure kind `{}`", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_paths() {
        assert!(ProcedurePath::parse("health").is_ok());
        assert!(ProcedurePath::parse("health.check").is_ok());
        assert!(ProcedurePath::parse("post.get-latest").is_ok());
        assert!(ProcedurePath::parse("a_b.c1.d2").is_ok());
    }

    #[test]
    fn test_parse_rejects_bad_paths() {
        assert_eq!(ProcedurePath::parse(""), Err(PathError::Empty));
        assert!(matches!(
            ProcedurePath::parse(".check"),
            Err(PathError::EmptySegment(_))
        ));
        assert!(matches!(
            ProcedurePath::parse("health."),
            Err(PathError::EmptySegment(_))
        ));
        assert!(matches!(
            ProcedurePath::parse("health/check"),
            Err(PathError::InvalidCharacter { ch: '/', .. })
        ));
    }

    #[test]
    fn test_is_within_respects_segments() {
        assert!(path_is_within("health.check", "health"));
        assert!(path_is_within("health.check", "health.check"));
        assert!(path_is_within("health.check", ""));
        assert!(!path_is_within("health.check", "heal"));
        assert!(!path_is_within("health.check", "health.check.deep"));
    }

    #[test]
    fn test_path_serde_validates() {
        let ok: ProcedurePath = serde_json::from_str("\"health.ping\"").unwrap();
        assert_eq!(ok.as_str(), "health.ping");
        assert!(serde_json::from_str::<ProcedurePath>("\"bad..path\"").is_err());
    }

    #[test]
    fn test_kind_round_trip_names() {
        assert_eq!(serde_json::to_string(&ProcedureKind::Mutation).unwrap(), "\"mutation\"");
        assert_eq!("subscription".parse::<ProcedureKind>(), Ok(ProcedureKind::Subscription));
        assert!("read".parse::<ProcedureKind>().is_err());
    }
}
