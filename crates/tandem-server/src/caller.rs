//! In-process procedure caller
//!
//! Lets server-side code (page renders, background jobs, tests) invoke
//! procedures without an HTTP round trip. Calls go through exactly the same
//! pipeline as network calls: same lookup, same validation, same auth checks.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use tandem_common::protocol::{ErrorBody, ProcedureError, ProcedureKind};
use tandem_common::QueryFetcher;

use crate::context::RequestContext;
use crate::registry::Registry;

/// Invokes procedures directly against a registry, as a fixed caller.
///
/// Each call receives a fresh context forked from the one the caller was
/// created with, so the principal is shared but request ids are not.
#[derive(Debug, Clone)]
pub struct ProcedureCaller {
    registry: Arc<Registry>,
    ctx: RequestContext,
}

impl ProcedureCaller {
    pub fn new(registry: Arc<Registry>, ctx: RequestContext) -> Self {
        Self { registry, ctx }
    }

    pub fn context(&self) -> &RequestContext {
        &self.ctx
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub async fn call(
        &self,
        path: &str,
        kind: ProcedureKind,
        input: Option<Value>,
    ) -> Result<Value, ProcedureError> {
        self.registry.invoke(path, kind, input, self.ctx.fork()).await
    }

    pub async fn query(&self, path: &str, input: Option<Value>) -> Result<Value, ProcedureError> {
        self.call(path, ProcedureKind::Query, input).await
    }

    pub async fn mutate(&self, path: &str, input: Option<Value>) -> Result<Value, ProcedureError> {
        self.call(path, ProcedureKind::Mutation, input).await
    }

    pub fn subscribe(
        &self,
        path: &str,
        input: Option<Value>,
    ) -> Result<BoxStream<'static, Result<Value, ProcedureError>>, ProcedureError> {
        self.registry.subscribe(path, input, self.ctx.fork())
    }

    /// Typed query: serializes `input` and decodes the result into `O`.
    pub async fn query_as<I, O>(&self, path: &str, input: &I) -> Result<O, ProcedureError>
    where
        I: Serialize + ?Sized,
        O: DeserializeOwned,
    {
        self.typed_call(path, ProcedureKind::Query, input).await
    }

    /// Typed mutation: serializes `input` and decodes the result into `O`.
    pub async fn mutate_as<I, O>(&self, path: &str, input: &I) -> Result<O, ProcedureError>
    where
        I: Serialize + ?Sized,
        O: DeserializeOwned,
    {
        self.typed_call(path, ProcedureKind::Mutation, input).await
    }

    async fn typed_call<I, O>(&self, path: &str, kind: ProcedureKind, input: &I) -> Result<O, ProcedureError>
    where
        I: Serialize + ?Sized,
        O: DeserializeOwned,
    {
        let input = serde_json::to_value(input).map_err(|e| ProcedureError::BadRequest {
            path: path.to_string(),
            message: format!("failed to serialize input: {}", e),
        })?;
        let output = self.call(path, kind, Some(input)).await?;
        serde_json::from_value(output).map_err(|e| ProcedureError::Internal {
            path: path.to_string(),
            message: format!("unexpected output shape: {}", e),
        })
    }
}

#[async_trait]
impl QueryFetcher for ProcedureCaller {
    async fn fetch(&self, path: &str, input: Option<Value>) -> Result<Value, ErrorBody> {
        self.query(path, input).await.map_err(ErrorBody::from)
    }
}
