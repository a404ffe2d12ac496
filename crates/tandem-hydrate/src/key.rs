//! Query keys
//!
//! A key identifies one cache entry: the procedure path, the input in
//! canonical form and the shape of the query. Object members are sorted when
//! canonicalizing, so `{"a":1,"b":2}` and `{"b":2,"a":1}` address the same
//! entry.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Whether an entry holds one result or a list of pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryShape {
    Single,
    Infinite,
}

impl QueryShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryShape::Single => "single",
            QueryShape::Infinite => "infinite",
        }
    }
}

/// Identity of a cache entry.
///
/// Equality, hashing and ordering consider the path, the shape and the
/// canonical input text only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "RawKey", into = "RawKey")]
pub struct QueryKey {
    path: String,
    input: Option<Value>,
    shape: QueryShape,
    canonical: String,
}

#[derive(Serialize, Deserialize)]
struct RawKey {
    path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    input: Option<Value>,
    shape: QueryShape,
}

impl From<RawKey> for QueryKey {
    fn from(raw: RawKey) -> Self {
        QueryKey::new(raw.path, raw.input, raw.shape)
    }
}

impl From<QueryKey> for RawKey {
    fn from(key: QueryKey) -> Self {
        RawKey {
            path: key.path,
            input: key.input,
            shape: key.shape,
        }
    }
}

impl QueryKey {
    /// A `null` input is the same as no input.
    pub fn new(path: impl Into<String>, input: Option<Value>, shape: QueryShape) -> Self {
        let input = input.filter(|v| !v.is_null());
        let canonical = match &input {
            Some(value) => canonical_json(value),
            None => "null".to_string(),
        };
        Self {
            path: path.into(),
            input,
            shape,
            canonical,
        }
    }

    pub fn single(path: impl Into<String>, input: Option<Value>) -> Self {
        Self::new(path, input, QueryShape::Single)
    }

    pub fn infinite(path: impl Into<String>, input: Option<Value>) -> Self {
        Self::new(path, input, QueryShape::Infinite)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn input(&self) -> Option<&Value> {
        self.input.as_ref()
    }

    pub fn shape(&self) -> QueryShape {
        self.shape
    }

    /// Stable textual form, suitable as a map key outside Rust.
    pub fn hash_key(&self) -> String {
        format!(
            "[{},{},{}]",
            Value::String(self.path.clone()),
            self.canonical,
            Value::String(self.shape.as_str().to_string())
        )
    }
}

impl PartialEq for QueryKey {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path && self.shape == other.shape && self.canonical == other.canonical
    }
}

impl Eq for QueryKey {}

impl Hash for QueryKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
        self.shape.hash(state);
        self.canonical.hash(state);
    }
}

impl Ord for QueryKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.path
            .cmp(&other.path)
            .then_with(|| self.shape.cmp(&other.shape))
            .then_with(|| self.canonical.cmp(&other.canonical))
    }
}

impl PartialOrd for QueryKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.path, self.canonical)?;
        if self.shape == QueryShape::Infinite {
            write!(f, "[infinite]")?;
        }
        Ok(())
    }
}

/// Serializes `value` with object members sorted by key, recursively.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut members: Vec<(&String, &Value)> = map.iter().collect();
            members.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, member)) in members.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(member, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn test_member_order_does_not_matter() {
        let a = QueryKey::single("post.list", Some(json!({"limit": 10, "filter": {"b": 1, "a": [2, 1]}})));
        let b = QueryKey::single("post.list", Some(json!({"filter": {"a": [2, 1], "b": 1}, "limit": 10})));
        assert_eq!(a, b);

        let set: HashSet<_> = [a.clone(), b].into_iter().collect();
        assert_eq!(set.len(), 1);
        assert_eq!(a.hash_key(), r#"["post.list",{"filter":{"a":[2,1],"b":1},"limit":10},"single"]"#);
    }

    #[test]
    fn test_array_order_matters() {
        let a = QueryKey::single("p", Some(json!([1, 2])));
        let b = QueryKey::single("p", Some(json!([2, 1])));
        assert_ne!(a, b);
    }

    #[test]
    fn test_null_input_is_no_input() {
        assert_eq!(QueryKey::single("p", None), QueryKey::single("p", Some(Value::Null)));
    }

    #[test]
    fn test_shape_distinguishes_keys() {
        let input = Some(json!({"limit": 5}));
        assert_ne!(QueryKey::single("p", input.clone()), QueryKey::infinite("p", input));
    }

    #[test]
    fn test_serde_keeps_raw_input() {
        let key = QueryKey::infinite("post.list", Some(json!({"b": 1, "a": 2})));
        let json = serde_json::to_value(&key).unwrap();
        assert_eq!(json["path"], "post.list");
        assert_eq!(json["shape"], "infinite");
        assert_eq!(json["input"], json!({"a": 2, "b": 1}));

        let back: QueryKey = serde_json::from_value(json).unwrap();
        assert_eq!(back, key);
    }

    #[test]
    fn test_canonical_escapes_strings() {
        assert_eq!(canonical_json(&json!({"q\"": "a\nb"})), r#"{"q\"":"a\nb"}"#);
    }
}
