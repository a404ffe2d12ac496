//! Render Scope
//!
//! The per-render owner of a query cache. A page handler creates one scope
//! per request, threads it through its render, and finishes by dehydrating
//! it into the page.
//!
//! # Prefetch and settle
//!
//! [`RenderScope::prefetch`] marks the entry `pending`, spawns the fetch on
//! the Tokio runtime and returns at once, so several prefetches run in
//! parallel. Every spawned task is recorded in the scope's pending set;
//! [`RenderScope::dehydrate`] drains that set before capturing the cache, so
//! a snapshot never contains a `pending` entry. A task that dies without
//! resolving its entry (panic, runtime shutdown) leaves an `error` entry
//! behind instead.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tandem_hydrate::{PrefetchQuery, RenderScope};
//! # async fn render(fetcher: Arc<dyn tandem_common::QueryFetcher>) {
//! let scope = RenderScope::new(fetcher);
//! scope.prefetch(PrefetchQuery::single("health.check", None));
//! let page = scope.serialize_for_hydration("<main>...</main>").await;
//! let html = page.render().unwrap();
//! # }
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::task::JoinHandle;

use tandem_common::protocol::ErrorBody;
use tandem_common::QueryFetcher;

use crate::cache::{CacheConfig, QueryCache};
use crate::entry::QueryStatus;
use crate::key::QueryKey;
use crate::prefetch::PrefetchQuery;
use crate::snapshot::{DehydrateOptions, DehydratedState, HydrationBoundary};

type PendingSet = Vec<(QueryKey, JoinHandle<()>)>;

pub struct RenderScope {
    cache: QueryCache,
    fetcher: Arc<dyn QueryFetcher>,
    pending: Mutex<PendingSet>,
}

impl RenderScope {
    /// A scope with a fresh cache using the default [`CacheConfig`].
    pub fn new(fetcher: Arc<dyn QueryFetcher>) -> Self {
        Self::with_config(fetcher, CacheConfig::default())
    }

    pub fn with_config(fetcher: Arc<dyn QueryFetcher>, config: CacheConfig) -> Self {
        let cache = QueryCache::new(config);
        tracing::debug!(cache = cache.id(), "Render scope opened");
        Self {
            cache,
            fetcher,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// This render's cache. Never shared with another scope.
    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    fn pending(&self) -> MutexGuard<'_, PendingSet> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of prefetch tasks not yet awaited.
    pub fn pending_count(&self) -> usize {
        self.pending().len()
    }

    /// Starts populating the entry for `query` in the background.
    ///
    /// Returns `false` when nothing was started because the entry is fresh
    /// or already being fetched. Must be called from within a Tokio runtime.
    pub fn prefetch(&self, query: PrefetchQuery) -> bool {
        let key = query.key();
        if self.cache.is_fresh(&key) {
            tracing::debug!(key = %key, "Prefetch skipped, data is fresh");
            return false;
        }
        if !self.cache.begin_fetch(&key) {
            tracing::debug!(key = %key, "Prefetch skipped, fetch in flight");
            return false;
        }

        let cache = self.cache.clone();
        let fetcher = self.fetcher.clone();
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            let outcome = query.run(fetcher.as_ref()).await;
            cache.resolve(&task_key, outcome);
        });

        self.pending().push((key, handle));
        true
    }

    /// Waits for every outstanding prefetch, including ones started while
    /// waiting.
    pub async fn settle(&self) {
        loop {
            let batch = std::mem::take(&mut *self.pending());
            if batch.is_empty() {
                break;
            }
            for (key, handle) in batch {
                if let Err(err) = handle.await {
                    tracing::error!(key = %key, "Prefetch task failed: {}", err);
                    self.cache.resolve(
                        &key,
                        Err(ErrorBody::internal(format!("Prefetch task failed: {}", err))),
                    );
                }
            }
        }
    }

    /// Fetches `query` now and returns its data, reusing fresh cached data
    /// and waiting for an in-flight prefetch of the same key.
    pub async fn fetch_query(&self, query: PrefetchQuery) -> Result<Value, ErrorBody> {
        let key = query.key();
        if self.cache.status(&key) == QueryStatus::Pending {
            self.settle().await;
        }
        if self.cache.is_fresh(&key) {
            if let Some(data) = self.cache.data(&key) {
                return Ok(data);
            }
        }

        self.cache.begin_fetch(&key);
        let outcome = query.run(self.fetcher.as_ref()).await;
        self.cache.resolve(&key, outcome.clone());
        outcome
    }

    /// Settles and captures the cache with default options.
    pub async fn dehydrate(&self) -> DehydratedState {
        self.dehydrate_with(DehydrateOptions::default()).await
    }

    pub async fn dehydrate_with(&self, options: DehydrateOptions) -> DehydratedState {
        self.settle().await;
        let state = self.cache.dehydrate(options);
        tracing::debug!(cache = self.cache.id(), queries = state.len(), "Render scope dehydrated");
        state
    }

    /// Settles, captures, and wraps `children` with the snapshot marker.
    pub async fn serialize_for_hydration(&self, children: impl Into<String>) -> HydrationBoundary {
        HydrationBoundary::new(self.dehydrate().await, children)
    }
}

impl fmt::Debug for RenderScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderScope")
            .field("cache", &self.cache.id())
            .field("pending", &self.pending_count())
            .finish()
    }
}
