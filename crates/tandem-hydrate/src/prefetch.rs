//! Prefetch requests and pagination helpers.
//!
//! Infinite queries page through a procedure by injecting a `cursor` member
//! into its input and reading the next cursor from each page's `nextCursor`
//! member. A page without `nextCursor` (or with `null`) is the last one.

use serde_json::Value;

use tandem_common::protocol::ErrorBody;
use tandem_common::QueryFetcher;

use crate::entry::InfiniteData;
use crate::key::QueryKey;

/// Input member carrying the page cursor.
pub const CURSOR_FIELD: &str = "cursor";
/// Page member carrying the cursor of the following page.
pub const NEXT_CURSOR_FIELD: &str = "nextCursor";

/// A query to populate ahead of hydration.
#[derive(Debug, Clone, PartialEq)]
pub enum PrefetchQuery {
    Single {
        path: String,
        input: Option<Value>,
    },
    Infinite {
        path: String,
        input: Option<Value>,
        initial_cursor: Option<Value>,
    },
}

impl PrefetchQuery {
    pub fn single(path: impl Into<String>, input: Option<Value>) -> Self {
        PrefetchQuery::Single {
            path: path.into(),
            input,
        }
    }

    pub fn infinite(path: impl Into<String>, input: Option<Value>, initial_cursor: Option<Value>) -> Self {
        PrefetchQuery::Infinite {
            path: path.into(),
            input,
            initial_cursor,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            PrefetchQuery::Single { path, .. } | PrefetchQuery::Infinite { path, .. } => path,
        }
    }

    /// Cache key of the entry this query fills. The cursor is not part of it.
    pub fn key(&self) -> QueryKey {
        match self {
            PrefetchQuery::Single { path, input } => QueryKey::single(path.clone(), input.clone()),
            PrefetchQuery::Infinite { path, input, .. } => QueryKey::infinite(path.clone(), input.clone()),
        }
    }

    /// Fetches the entry's data: the result itself, or the first page
    /// wrapped as [`InfiniteData`].
    pub async fn run(&self, fetcher: &dyn QueryFetcher) -> Result<Value, ErrorBody> {
        match self {
            PrefetchQuery::Single { path, input } => fetcher.fetch(path, input.clone()).await,
            PrefetchQuery::Infinite {
                path,
                input,
                initial_cursor,
            } => {
                let page = fetch_page(fetcher, path, input.as_ref(), initial_cursor.clone()).await?;
                Ok(InfiniteData::first(page, initial_cursor.clone()).into_value())
            }
        }
    }
}

/// `input` with `cursor` injected.
///
/// A missing input becomes `{"cursor": ...}`. Non-object inputs are passed
/// through unchanged since there is nowhere to put the cursor.
pub fn with_cursor(input: Option<&Value>, cursor: Option<&Value>) -> Option<Value> {
    let Some(cursor) = cursor.filter(|c| !c.is_null()) else {
        return input.cloned();
    };
    match input {
        None | Some(Value::Null) => {
            let mut map = serde_json::Map::new();
            map.insert(CURSOR_FIELD.to_string(), cursor.clone());
            Some(Value::Object(map))
        }
        Some(Value::Object(map)) => {
            let mut map = map.clone();
            map.insert(CURSOR_FIELD.to_string(), cursor.clone());
            Some(Value::Object(map))
        }
        Some(other) => Some(other.clone()),
    }
}

/// Cursor of the page after `page`, if any.
pub fn next_cursor(page: &Value) -> Option<Value> {
    page.get(NEXT_CURSOR_FIELD).filter(|c| !c.is_null()).cloned()
}

pub(crate) async fn fetch_page(
    fetcher: &dyn QueryFetcher,
    path: &str,
    input: Option<&Value>,
    cursor: Option<Value>,
) -> Result<Value, ErrorBody> {
    fetcher.fetch(path, with_cursor(input, cursor.as_ref())).await
}

/// Refetches every page of `data` in order, following the cursors the new
/// pages return. Stops early when a page reports no next cursor.
pub(crate) async fn refetch_pages(
    fetcher: &dyn QueryFetcher,
    path: &str,
    input: Option<&Value>,
    data: &InfiniteData,
) -> Result<InfiniteData, ErrorBody> {
    let wanted = data.pages.len().max(1);
    let mut cursor = data.page_params.first().cloned().flatten();
    let mut refreshed = InfiniteData::default();

    for _ in 0..wanted {
        let page = fetch_page(fetcher, path, input, cursor.clone()).await?;
        let next = next_cursor(&page);
        refreshed.push(page, cursor);
        match next {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    Ok(refreshed)
}
