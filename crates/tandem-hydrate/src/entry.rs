//! Cache entries and their lifecycle.
//!
//! ```text
//! idle ──► pending ──► success
//!             ▲   └──► error
//!             └─────── success / error, on invalidation or staleness
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use tandem_common::protocol::ErrorBody;

use crate::key::QueryKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    /// No entry exists for the key
    Idle,
    Pending,
    Success,
    Error,
}

impl QueryStatus {
    /// Whether the entry has a final outcome.
    pub fn is_settled(&self) -> bool {
        matches!(self, QueryStatus::Success | QueryStatus::Error)
    }
}

/// Data of an infinite query: the pages fetched so far and the cursor each
/// page was fetched with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfiniteData {
    pub pages: Vec<Value>,
    pub page_params: Vec<Option<Value>>,
}

impl InfiniteData {
    pub fn first(page: Value, param: Option<Value>) -> Self {
        Self {
            pages: vec![page],
            page_params: vec![param],
        }
    }

    pub fn push(&mut self, page: Value, param: Option<Value>) {
        self.pages.push(page);
        self.page_params.push(param);
    }

    pub fn last_page(&self) -> Option<&Value> {
        self.pages.last()
    }

    pub fn into_value(self) -> Value {
        serde_json::json!({ "pages": self.pages, "pageParams": self.page_params })
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        Self::deserialize(value).ok()
    }
}

/// One slot of a query cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: QueryKey,
    pub status: QueryStatus,
    /// Last successful data; kept while a refetch is pending or after it fails
    pub data: Option<Value>,
    pub error: Option<ErrorBody>,
    /// When `data` was last written
    pub updated_at: Option<DateTime<Utc>>,
    pub invalidated: bool,
}

impl CacheEntry {
    pub(crate) fn idle(key: QueryKey) -> Self {
        Self {
            key,
            status: QueryStatus::Idle,
            data: None,
            error: None,
            updated_at: None,
            invalidated: false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == QueryStatus::Pending
    }

    /// Pages of an infinite entry.
    pub fn infinite_data(&self) -> Option<InfiniteData> {
        self.data.as_ref().and_then(InfiniteData::from_value)
    }

    pub(crate) fn begin_fetch(&mut self) {
        self.status = QueryStatus::Pending;
    }

    pub(crate) fn succeed(&mut self, data: Value, at: DateTime<Utc>) {
        self.status = QueryStatus::Success;
        self.data = Some(data);
        self.error = None;
        self.updated_at = Some(at);
        self.invalidated = false;
    }

    pub(crate) fn fail(&mut self, error: ErrorBody) {
        self.status = QueryStatus::Error;
        self.error = Some(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tandem_common::protocol::ErrorCode;

    #[test]
    fn test_lifecycle_keeps_data_across_failure() {
        let mut entry = CacheEntry::idle(QueryKey::single("p", None));
        assert!(!entry.status.is_settled());

        entry.begin_fetch();
        assert!(entry.is_pending());

        entry.succeed(json!(1), Utc::now());
        assert_eq!(entry.status, QueryStatus::Success);

        entry.invalidated = true;
        entry.begin_fetch();
        entry.fail(ErrorBody::new(ErrorCode::InternalServerError, "down"));
        assert_eq!(entry.status, QueryStatus::Error);
        assert_eq!(entry.data, Some(json!(1)));
        assert!(entry.invalidated);
    }

    #[test]
    fn test_infinite_data_value_shape() {
        let mut data = InfiniteData::first(json!({"items": [1]}), None);
        data.push(json!({"items": [2]}), Some(json!(1)));
        let value = data.clone().into_value();
        assert_eq!(value["pageParams"], json!([null, 1]));
        assert_eq!(InfiniteData::from_value(&value), Some(data));
    }
}
