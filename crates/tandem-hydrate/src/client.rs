//! Client-side query cache.
//!
//! [`QueryClient`] is what runs after the page arrives: it is seeded once
//! from the page's snapshot and then serves reads from its cache, going to
//! the network only for entries that are missing, stale or invalidated.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use tandem_common::protocol::{ErrorBody, ErrorCode};
use tandem_common::QueryFetcher;

use crate::cache::{CacheConfig, QueryCache};
use crate::entry::InfiniteData;
use crate::key::QueryKey;
use crate::prefetch::{fetch_page, next_cursor, refetch_pages, PrefetchQuery};
use crate::snapshot::{DehydratedState, HydrationSlot};

pub struct QueryClient {
    cache: QueryCache,
    fetcher: Arc<dyn QueryFetcher>,
}

impl QueryClient {
    /// A client with a 30 second stale time.
    pub fn new(fetcher: Arc<dyn QueryFetcher>) -> Self {
        Self::with_config(fetcher, CacheConfig::default())
    }

    pub fn with_config(fetcher: Arc<dyn QueryFetcher>, config: CacheConfig) -> Self {
        Self {
            cache: QueryCache::new(config),
            fetcher,
        }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Seeds the cache from `state`. Returns the number of entries written.
    pub fn hydrate(&self, state: &DehydratedState) -> usize {
        self.cache.hydrate(state)
    }

    /// Consumes the slot's snapshot, if it still holds one.
    pub fn hydrate_from_slot(&self, slot: &HydrationSlot) -> bool {
        match slot.take() {
            Some(state) => {
                self.hydrate(&state);
                true
            }
            None => false,
        }
    }

    /// Data for `path`/`input`: cached when fresh, fetched otherwise.
    pub async fn query(&self, path: &str, input: Option<Value>) -> Result<Value, ErrorBody> {
        let key = QueryKey::single(path, input.clone());
        if self.cache.is_fresh(&key) {
            if let Some(data) = self.cache.data(&key) {
                tracing::debug!(key = %key, "Serving fresh cached query");
                return Ok(data);
            }
        }

        self.cache.begin_fetch(&key);
        let outcome = self.fetcher.fetch(path, input).await;
        self.cache.resolve(&key, outcome.clone());
        outcome
    }

    /// Pages loaded so far for an infinite query, fetching the first page
    /// when there is nothing fresh. A stale entry has all its pages
    /// refetched.
    pub async fn infinite_query(
        &self,
        path: &str,
        input: Option<Value>,
        initial_cursor: Option<Value>,
    ) -> Result<InfiniteData, ErrorBody> {
        let key = QueryKey::infinite(path, input.clone());
        let existing = self.cache.get(&key).and_then(|e| e.infinite_data());

        if self.cache.is_fresh(&key) {
            if let Some(data) = existing {
                return Ok(data);
            }
        }

        self.cache.begin_fetch(&key);
        let outcome = match existing {
            Some(stale) => refetch_pages(self.fetcher.as_ref(), path, input.as_ref(), &stale).await,
            None => PrefetchQuery::infinite(path, input, initial_cursor)
                .run(self.fetcher.as_ref())
                .await
                .and_then(|value| decode_pages(&key, &value)),
        };
        self.cache.resolve(&key, outcome.clone().map(InfiniteData::into_value));
        outcome
    }

    /// Whether the last loaded page of an infinite query has a successor.
    pub fn has_next_page(&self, path: &str, input: Option<Value>) -> bool {
        let key = QueryKey::infinite(path, input);
        self.cache
            .get(&key)
            .and_then(|e| e.infinite_data())
            .and_then(|data| data.last_page().and_then(next_cursor))
            .is_some()
    }

    /// Appends the next page to an infinite query.
    ///
    /// The query must have been loaded first. When the last page has no
    /// successor the data is returned unchanged.
    pub async fn fetch_next_page(&self, path: &str, input: Option<Value>) -> Result<InfiniteData, ErrorBody> {
        let key = QueryKey::infinite(path, input.clone());
        let mut data = self
            .cache
            .get(&key)
            .and_then(|e| e.infinite_data())
            .ok_or_else(|| {
                ErrorBody::new(ErrorCode::BadRequest, format!("infinite query {} has not been loaded", key))
                    .with_path(path)
            })?;

        let Some(cursor) = data.last_page().and_then(next_cursor) else {
            return Ok(data);
        };

        self.cache.begin_fetch(&key);
        match fetch_page(self.fetcher.as_ref(), path, input.as_ref(), Some(cursor.clone())).await {
            Ok(page) => {
                data.push(page, Some(cursor));
                self.cache.resolve(&key, Ok(data.clone().into_value()));
                Ok(data)
            }
            Err(error) => {
                self.cache.resolve(&key, Err(error.clone()));
                Err(error)
            }
        }
    }

    /// Marks every entry under `prefix` stale so the next read refetches.
    pub fn invalidate(&self, prefix: &str) -> usize {
        self.cache.invalidate(prefix)
    }
}

fn decode_pages(key: &QueryKey, value: &Value) -> Result<InfiniteData, ErrorBody> {
    InfiniteData::from_value(value)
        .ok_or_else(|| ErrorBody::internal(format!("infinite query {} returned malformed pages", key)))
}

impl fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryClient")
            .field("cache", &self.cache.id())
            .field("entries", &self.cache.len())
            .finish()
    }
}
