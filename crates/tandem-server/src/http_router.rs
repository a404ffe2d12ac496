//! Batch Router
//!
//! Dispatches the calls of one HTTP batch to the procedure registry.
//!
//! # Architecture
//!
//! - Each call gets a fresh [`RequestContext`](crate::context::RequestContext)
//!   sharing the principal resolved from the request's credential
//! - All calls of a batch run concurrently; outcomes are returned in the
//!   order the calls were sent
//! - One failing call never affects its siblings
//! - Subscriptions to registered paths are rejected with
//!   `METHOD_NOT_SUPPORTED`, since a batch response has no channel to stream
//!   values over. Unregistered paths are `NOT_FOUND` whatever their kind

use std::sync::Arc;

use futures_util::future::join_all;

use tandem_common::protocol::{CallRequest, CallResponse, ErrorBody, ProcedureError, ProcedureKind};

use crate::context::ContextFactory;
use crate::registry::Registry;

/// Routes batched calls to a [`Registry`].
#[derive(Debug, Clone)]
pub struct BatchRouter {
    registry: Arc<Registry>,
    contexts: ContextFactory,
}

impl BatchRouter {
    pub fn new(registry: Arc<Registry>, contexts: ContextFactory) -> Self {
        Self { registry, contexts }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Handles every call of a batch on behalf of the holder of `credential`.
    ///
    /// # Arguments
    ///
    /// * `calls` - The decoded batch
    /// * `credential` - API key presented with the request, if any
    ///
    /// # Returns
    ///
    /// One response per call, in request order
    pub async fn handle_batch(&self, calls: Vec<CallRequest>, credential: Option<&str>) -> Vec<CallResponse> {
        let principal = self.contexts.auth().authenticate(credential);
        tracing::debug!(
            calls = calls.len(),
            authenticated = principal.is_some(),
            "Dispatching batch"
        );

        let pending = calls.into_iter().map(|call| {
            let ctx = self.contexts.with_principal(principal.clone());
            async move {
                if !self.registry.contains(call.path.as_str()) {
                    let error = ProcedureError::unknown_procedure(call.path.as_str());
                    return CallResponse::failure(call.id, ErrorBody::from(error));
                }
                if call.kind == ProcedureKind::Subscription {
                    let error = ProcedureError::MethodNotSupported {
                        path: call.path.clone(),
                        message: "Subscriptions are not available over batch HTTP".to_string(),
                    };
                    return CallResponse::failure(call.id, ErrorBody::from(error));
                }

                let input = call.normalized_input();
                match self.registry.invoke(&call.path, call.kind, input, ctx).await {
                    Ok(result) => CallResponse::success(call.id, result),
                    Err(err) => CallResponse::failure(call.id, ErrorBody::from(err)),
                }
            }
        });

        join_all(pending).await
    }
}
