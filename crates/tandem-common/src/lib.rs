//! Tandem Common Types
//!
//! This crate provides the shared protocol definitions, input schemas and
//! HTTP transport helpers used by every Tandem component.
//!
//! # Overview
//!
//! Tandem exposes server-defined procedures (queries, mutations and
//! subscriptions) over a single batched HTTP endpoint, and lets server-side
//! renders pre-populate a client query cache. This crate holds the pieces both
//! ends agree on:
//!
//! - **Protocol Layer**: procedure paths and kinds, the batch wire format,
//!   error codes and the error taxonomy
//! - **Schema Layer**: declarative input contracts checked before a handler runs
//! - **Auth**: API key to principal resolution
//! - **Transport**: conversion between batch payloads and HTTP messages
//! - **Fetcher**: the seam through which caches obtain query results
//!
//! # Example
//!
//! ```
//! use tandem_common::protocol::{CallRequest, CallResponse, ProcedureKind};
//! use serde_json::json;
//!
//! let call = CallRequest::new(1, "health.ping", ProcedureKind::Query)
//!     .with_input(json!({"echo": "hi"}));
//! let response = CallResponse::success(call.id, json!({"message": "pong"}));
//! assert!(response.is_success());
//! ```

pub mod auth;
pub mod fetcher;
pub mod protocol;
pub mod schema;
pub mod transport;

pub use fetcher::QueryFetcher;
pub use protocol::*;
