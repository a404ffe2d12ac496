// Copyright 2025 Tandem Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Hydration snapshots
//!
//! A [`DehydratedState`] is the settled content of one render's cache,
//! captured after every prefetch finished. It travels inside the page as
//! JSON in a marker script element:
//!
//! ```html
//! <script type="application/json" id="__TANDEM_STATE__">{"queries":[...]}</script>
//! ```
//!
//! The JSON is escaped so the markup cannot be broken out of: `<`, `>` and
//! `&` and the line separators U+2028/U+2029 are written as `\u` escapes,
//! which every JSON parser reads back as the original characters.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use tandem_common::protocol::ErrorBody;

use crate::entry::QueryStatus;
use crate::error::{HydrateError, Result};
use crate::key::QueryKey;

/// `id` of the script element carrying the snapshot.
pub const STATE_SCRIPT_ID: &str = "__TANDEM_STATE__";

const SCRIPT_OPEN: &str = r#"<script type="application/json" id="__TANDEM_STATE__">"#;
const SCRIPT_CLOSE: &str = "</script>";

/// What to include when capturing a cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DehydrateOptions {
    /// Also capture failed entries. Off by default so the client refetches
    /// them itself.
    pub include_errors: bool,
}

impl DehydrateOptions {
    pub fn with_errors() -> Self {
        Self { include_errors: true }
    }
}

/// One settled cache entry inside a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DehydratedQuery {
    pub key: QueryKey,
    pub status: QueryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Serializable capture of a query cache, ordered by key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DehydratedState {
    pub queries: Vec<DehydratedQuery>,
}

impl DehydratedState {
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    pub fn get(&self, key: &QueryKey) -> Option<&DehydratedQuery> {
        self.queries.iter().find(|q| &q.key == key)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Rendered children preceded by the snapshot they were rendered with.
#[derive(Debug, Clone, PartialEq)]
pub struct HydrationBoundary {
    state: DehydratedState,
    children: String,
}

impl HydrationBoundary {
    pub fn new(state: DehydratedState, children: impl Into<String>) -> Self {
        Self {
            state,
            children: children.into(),
        }
    }

    pub fn state(&self) -> &DehydratedState {
        &self.state
    }

    pub fn children(&self) -> &str {
        &self.children
    }

    /// The marker script element followed by the children markup.
    pub fn render(&self) -> Result<String> {
        let json = escape_json_for_html(&self.state.to_json()?);
        let mut html = String::with_capacity(SCRIPT_OPEN.len() + json.len() + SCRIPT_CLOSE.len() + self.children.len());
        html.push_str(SCRIPT_OPEN);
        html.push_str(&json);
        html.push_str(SCRIPT_CLOSE);
        html.push_str(&self.children);
        Ok(html)
    }
}

impl fmt::Display for HydrationBoundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let html = self.render().map_err(|_| fmt::Error)?;
        f.write_str(&html)
    }
}

/// Escapes characters that could terminate or confuse an inline script.
pub fn escape_json_for_html(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    for ch in json.chars() {
        match ch {
            '<' => out.push_str("\\u003c"),
            '>' => out.push_str("\\u003e"),
            '&' => out.push_str("\\u0026"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            other => out.push(other),
        }
    }
    out
}

/// Reads the snapshot out of rendered markup.
///
/// Returns `Ok(None)` when the page carries no marker.
pub fn extract_state(html: &str) -> Result<Option<DehydratedState>> {
    let Some(start) = html.find(SCRIPT_OPEN) else {
        return Ok(None);
    };
    let body = &html[start + SCRIPT_OPEN.len()..];
    let end = body
        .find(SCRIPT_CLOSE)
        .ok_or_else(|| HydrateError::Markup(format!("unterminated {} script", STATE_SCRIPT_ID)))?;
    Ok(Some(DehydratedState::from_json(&body[..end])?))
}

/// Holds a snapshot until it is consumed; later takes yield nothing.
#[derive(Debug, Default)]
pub struct HydrationSlot {
    state: Mutex<Option<DehydratedState>>,
}

impl HydrationSlot {
    pub fn new(state: DehydratedState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
        }
    }

    /// A slot filled from the page's marker, or empty if there is none.
    pub fn from_html(html: &str) -> Result<Self> {
        Ok(Self {
            state: Mutex::new(extract_state(html)?),
        })
    }

    pub fn take(&self) -> Option<DehydratedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    pub fn is_consumed(&self) -> bool {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state_with(data: Value) -> DehydratedState {
        DehydratedState {
            queries: vec![DehydratedQuery {
                key: QueryKey::single("post.byId", Some(json!({"id": 1}))),
                status: QueryStatus::Success,
                data: Some(data),
                error: None,
                updated_at: Some(Utc::now()),
            }],
        }
    }

    #[test]
    fn test_render_escapes_script_breakers() {
        let state = state_with(json!({"title": "</script><script>alert(1)</script> & \u{2028}"}));
        let html = HydrationBoundary::new(state.clone(), "<main>hi</main>").render().unwrap();

        assert!(html.starts_with(SCRIPT_OPEN));
        assert!(html.ends_with("</script><main>hi</main>"));
        assert_eq!(html.matches("</script>").count(), 1);
        assert!(!html.contains('\u{2028}'));

        assert_eq!(extract_state(&html).unwrap(), Some(state));
    }

    #[test]
    fn test_extract_without_marker() {
        assert_eq!(extract_state("<main></main>").unwrap(), None);
    }

    #[test]
    fn test_extract_rejects_broken_markup() {
        let html = format!("{}{{\"queries\":[]}}", SCRIPT_OPEN);
        assert!(matches!(extract_state(&html), Err(HydrateError::Markup(_))));

        let html = format!("{}not json{}", SCRIPT_OPEN, SCRIPT_CLOSE);
        assert!(matches!(extract_state(&html), Err(HydrateError::Serialization(_))));
    }

    #[test]
    fn test_slot_yields_once() {
        let html = HydrationBoundary::new(state_with(json!(1)), "").render().unwrap();
        let slot = HydrationSlot::from_html(&html).unwrap();
        assert!(!slot.is_consumed());
        assert_eq!(slot.take().map(|s| s.len()), Some(1));
        assert!(slot.take().is_none());
        assert!(slot.is_consumed());
    }

    #[test]
    fn test_snapshot_wire_shape() {
        let value = serde_json::to_value(state_with(json!({"ok": true}))).unwrap();
        let query = &value["queries"][0];
        assert_eq!(query["key"]["path"], "post.byId");
        assert_eq!(query["status"], "success");
        assert!(query["updatedAt"].is_string());
        assert!(query.get("error").is_none());
    }
}
