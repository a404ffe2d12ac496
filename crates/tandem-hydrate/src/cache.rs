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

//! Query Cache
//!
//! Keyed store of query results with the entry lifecycle described in
//! [`crate::entry`]. A cache is cheap to clone; clones share the same
//! entries. Every cache created with [`QueryCache::new`] gets a process-unique
//! id, which is how renders tell their caches apart.
//!
//! The internal lock is never held across an `.await`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;

use tandem_common::protocol::{path_is_within, ErrorBody};

use crate::entry::{CacheEntry, QueryStatus};
use crate::key::QueryKey;
use crate::snapshot::{DehydrateOptions, DehydratedQuery, DehydratedState};

static NEXT_CACHE_ID: AtomicU64 = AtomicU64::new(1);

/// Freshness and retention settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// How long successful data counts as fresh
    pub stale_time: Duration,
    /// How long settled entries are kept before [`QueryCache::collect_garbage`]
    /// drops them
    pub gc_time: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_time: Duration::from_secs(30),
            gc_time: Duration::from_secs(5 * 60),
        }
    }
}

impl CacheConfig {
    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    pub fn with_gc_time(mut self, gc_time: Duration) -> Self {
        self.gc_time = gc_time;
        self
    }
}

#[derive(Debug)]
struct CacheInner {
    id: u64,
    config: CacheConfig,
    entries: Mutex<BTreeMap<QueryKey, CacheEntry>>,
}

#[derive(Debug, Clone)]
pub struct QueryCache {
    inner: Arc<CacheInner>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl QueryCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                id: NEXT_CACHE_ID.fetch_add(1, Ordering::Relaxed),
                config,
                entries: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    fn entries(&self) -> MutexGuard<'_, BTreeMap<QueryKey, CacheEntry>> {
        self.inner.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Keys in cache order.
    pub fn keys(&self) -> Vec<QueryKey> {
        self.entries().keys().cloned().collect()
    }

    pub fn get(&self, key: &QueryKey) -> Option<CacheEntry> {
        self.entries().get(key).cloned()
    }

    /// [`QueryStatus::Idle`] when there is no entry.
    pub fn status(&self, key: &QueryKey) -> QueryStatus {
        self.entries()
            .get(key)
            .map(|e| e.status)
            .unwrap_or(QueryStatus::Idle)
    }

    pub fn data(&self, key: &QueryKey) -> Option<Value> {
        self.entries().get(key).and_then(|e| e.data.clone())
    }

    /// Successful, not invalidated, and written within the stale time.
    pub fn is_fresh(&self, key: &QueryKey) -> bool {
        let entries = self.entries();
        let Some(entry) = entries.get(key) else {
            return false;
        };
        if entry.status != QueryStatus::Success || entry.invalidated {
            return false;
        }
        let Some(updated_at) = entry.updated_at else {
            return false;
        };
        let age = (Utc::now() - updated_at).to_std().unwrap_or(Duration::ZERO);
        age < self.inner.config.stale_time
    }

    /// Moves `key` to `pending`, creating the entry if needed.
    ///
    /// Returns `false` without changing anything when a fetch for the key is
    /// already in flight.
    pub fn begin_fetch(&self, key: &QueryKey) -> bool {
        let mut entries = self.entries();
        let entry = entries
            .entry(key.clone())
            .or_insert_with(|| CacheEntry::idle(key.clone()));
        if entry.is_pending() {
            return false;
        }
        entry.begin_fetch();
        true
    }

    /// Records the outcome of a fetch.
    pub fn resolve(&self, key: &QueryKey, outcome: std::result::Result<Value, ErrorBody>) {
        let mut entries = self.entries();
        let entry = entries
            .entry(key.clone())
            .or_insert_with(|| CacheEntry::idle(key.clone()));
        match outcome {
            Ok(data) => entry.succeed(data, Utc::now()),
            Err(error) => {
                tracing::debug!(key = %key, code = %error.error_code(), "Query failed");
                entry.fail(error);
            }
        }
    }

    /// Writes data directly, as if a fetch had just succeeded.
    pub fn set_data(&self, key: &QueryKey, data: Value) {
        self.resolve(key, Ok(data));
    }

    /// Marks every entry whose path is `prefix` or lies under it as stale.
    ///
    /// An empty prefix invalidates everything. Returns the number of entries
    /// marked.
    pub fn invalidate(&self, prefix: &str) -> usize {
        let mut marked = 0;
        for entry in self.entries().values_mut() {
            if path_is_within(entry.key.path(), prefix) {
                entry.invalidated = true;
                marked += 1;
            }
        }
        tracing::debug!(cache = self.id(), prefix, marked, "Invalidated queries");
        marked
    }

    /// Captures settled entries in key order.
    ///
    /// Pending and idle entries are never captured; failed entries only when
    /// `options.include_errors` is set.
    pub fn dehydrate(&self, options: DehydrateOptions) -> DehydratedState {
        let queries = self
            .entries()
            .values()
            .filter(|entry| match entry.status {
                QueryStatus::Success => true,
                QueryStatus::Error => options.include_errors,
                QueryStatus::Pending | QueryStatus::Idle => false,
            })
            .map(|entry| DehydratedQuery {
                key: entry.key.clone(),
                status: entry.status,
                data: entry.data.clone(),
                error: entry.error.clone(),
                updated_at: entry.updated_at,
            })
            .collect();
        DehydratedState { queries }
    }

    /// Seeds the cache from a snapshot.
    ///
    /// An existing entry is only overwritten when the snapshot's data is
    /// newer or the entry has no data. Returns the number of entries written.
    pub fn hydrate(&self, state: &DehydratedState) -> usize {
        let mut entries = self.entries();
        let mut written = 0;

        for query in &state.queries {
            if !query.status.is_settled() {
                continue;
            }
            let entry = entries
                .entry(query.key.clone())
                .or_insert_with(|| CacheEntry::idle(query.key.clone()));

            let newer = match (entry.updated_at, query.updated_at) {
                (Some(existing), Some(incoming)) => incoming > existing,
                (None, _) => true,
                (Some(_), None) => false,
            };
            if !newer || entry.is_pending() {
                continue;
            }

            entry.status = query.status;
            entry.data = query.data.clone();
            entry.error = query.error.clone();
            entry.updated_at = query.updated_at;
            entry.invalidated = false;
            written += 1;
        }

        tracing::debug!(cache = self.id(), written, "Hydrated query cache");
        written
    }

    /// Drops settled entries older than the gc time, and failed entries with
    /// no data. Returns the number removed.
    pub fn collect_garbage(&self) -> usize {
        let gc_time = self.inner.config.gc_time;
        let now = Utc::now();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| {
            if entry.is_pending() {
                return true;
            }
            match entry.updated_at {
                Some(at) => (now - at).to_std().unwrap_or(Duration::ZERO) < gc_time,
                None => false,
            }
        });
        before - entries.len()
    }
}
