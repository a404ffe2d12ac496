//! The seam through which query caches obtain results.
//!
//! A server-side render fetches through an in-process procedure caller; a
//! client fetches over HTTP. Both implement [`QueryFetcher`], so the cache and
//! hydration logic is written once against this trait.

use async_trait::async_trait;
use serde_json::Value;

use crate::protocol::ErrorBody;

#[async_trait]
pub trait QueryFetcher: Send + Sync {
    /// Runs the query procedure at `path` with `input`.
    async fn fetch(&self, path: &str, input: Option<Value>) -> Result<Value, ErrorBody>;
}
