//! Tandem Client
//!
//! Calls Tandem procedures over the batched HTTP endpoint. [`TandemClient`]
//! also implements [`QueryFetcher`](tandem_common::QueryFetcher), so a
//! hydrated `QueryClient` can refresh its entries through it.

pub mod client;

pub use client::{TandemClient, DEFAULT_TIMEOUT};
