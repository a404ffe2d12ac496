//! Tandem Hydration Bridge
//!
//! Lets server-rendered pages pre-populate the client's query cache.
//!
//! # Overview
//!
//! - **[`RenderScope`]**: created per server-side render; owns that render's
//!   [`QueryCache`], runs prefetches and produces the snapshot
//! - **[`DehydratedState`]**: the settled cache content, embedded into the
//!   page by [`HydrationBoundary`]
//! - **[`QueryClient`]**: the client cache, seeded exactly once from the
//!   page through a [`HydrationSlot`]
//!
//! Both sides obtain data through the
//! [`QueryFetcher`](tandem_common::QueryFetcher) seam: an in-process caller
//! while rendering, HTTP afterwards.

pub mod cache;
pub mod client;
pub mod entry;
pub mod error;
pub mod key;
pub mod prefetch;
pub mod scope;
pub mod snapshot;

pub use cache::{CacheConfig, QueryCache};
pub use client::QueryClient;
pub use entry::{CacheEntry, InfiniteData, QueryStatus};
pub use error::{HydrateError, Result};
pub use key::{QueryKey, QueryShape};
pub use prefetch::PrefetchQuery;
pub use scope::RenderScope;
pub use snapshot::{extract_state, DehydrateOptions, DehydratedState, HydrationBoundary, HydrationSlot};
