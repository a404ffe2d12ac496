//! Tandem Transport Layer
//!
//! HTTP utilities for the batch protocol: parsing request bodies into calls
//! and turning call outcomes into HTTP responses with the right status code.
//!
//! # Components
//!
//! - **[`HttpTransport`]**: Utility functions for HTTP/batch conversion
//! - **[`HyperResponse`]**: Type alias for full-body Hyper responses

pub mod http;

pub use http::{HttpTransport, HyperResponse, DEFAULT_MAX_BODY_BYTES};
