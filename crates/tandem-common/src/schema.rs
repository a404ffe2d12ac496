//! Input Schemas
//!
//! Procedure inputs are described with JSON Schema and checked with a
//! compiled [`jsonschema`] validator before a handler is invoked. Every
//! violation is reported as a [`FieldIssue`] naming the offending field, so
//! one failed call tells the client everything that is wrong with it.
//!
//! Field names are derived from the instance path of each error: nested
//! objects use dotted names (`author.name`) and array items use indices
//! (`tags[2]`). A missing required property is reported against the property
//! itself. Issues about the input as a whole use [`ROOT_FIELD`].
//!
//! Absent input is validated as `null`; a schema that allows the input to be
//! omitted says so with `"type": ["object", "null"]`.
//!
//! # Example
//!
//! ```
//! use tandem_common::schema::InputSchema;
//! use serde_json::json;
//!
//! let schema = InputSchema::compile(&json!({
//!     "type": "object",
//!     "properties": {
//!         "title": {"type": "string", "minLength": 1, "maxLength": 80},
//!         "draft": {"type": "boolean"}
//!     },
//!     "required": ["title"]
//! }))
//! .unwrap();
//!
//! assert!(schema.validate(Some(&json!({"title": "Hello"}))).is_ok());
//!
//! let issues = schema.validate(Some(&json!({"title": ""}))).unwrap_err();
//! assert_eq!(issues[0].field, "title");
//! ```

use std::fmt;

use jsonschema::error::ValidationErrorKind;
use jsonschema::Validator;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Field name used for issues concerning the input as a whole.
pub const ROOT_FIELD: &str = "input";

/// A single schema violation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldIssue {
    /// Dotted path of the offending field
    pub field: String,
    /// What is wrong with it
    pub message: String,
}

impl FieldIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Joins issues into one line, e.g. `title: too short; echo: expected string`.
pub fn summarize_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// The schema document itself is not valid JSON Schema.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid input schema: {0}")]
pub struct SchemaError(pub String);

/// A compiled JSON Schema contract for a procedure's raw input.
pub struct InputSchema {
    schema: Value,
    validator: Validator,
}

impl InputSchema {
    /// Compiles `schema`, detecting the draft from `$schema` when present.
    pub fn compile(schema: &Value) -> Result<Self, SchemaError> {
        let validator = jsonschema::validator_for(schema).map_err(|e| SchemaError(e.to_string()))?;
        Ok(Self {
            schema: schema.clone(),
            validator,
        })
    }

    /// The schema document this validator was compiled from.
    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Checks `input` (`None` when the caller sent none) and returns every
    /// violation, ordered by field.
    pub fn validate(&self, input: Option<&Value>) -> Result<(), Vec<FieldIssue>> {
        let null = Value::Null;
        let instance = input.unwrap_or(&null);

        let mut issues: Vec<FieldIssue> = self
            .validator
            .iter_errors(instance)
            .map(|error| {
                let mut field = field_from_pointer(&error.instance_path().to_string());
                if let ValidationErrorKind::Required { property, .. } = error.kind() {
                    if let Some(name) = property.as_str() {
                        field = child_field(&field, name);
                    }
                }
                FieldIssue::new(field, error.to_string())
            })
            .collect();

        if issues.is_empty() {
            return Ok(());
        }
        issues.sort();
        issues.dedup();
        Err(issues)
    }
}

impl fmt::Debug for InputSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputSchema").field("schema", &self.schema).finish()
    }
}

/// Converts a JSON pointer (`/author/tags/2`) into a field name
/// (`author.tags[2]`).
fn field_from_pointer(pointer: &str) -> String {
    let mut field = String::new();
    for token in pointer.split('/').skip(1) {
        let token = token.replace("~1", "/").replace("~0", "~");
        if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
            field.push('[');
            field.push_str(&token);
            field.push(']');
        } else {
            field = child_field(&field, &token);
        }
    }
    if field.is_empty() {
        ROOT_FIELD.to_string()
    } else {
        field
    }
}

fn child_field(parent: &str, name: &str) -> String {
    if parent.is_empty() || parent == ROOT_FIELD {
        name.to_string()
    } else {
        format!("{}.{}", parent, name)
    }
}
