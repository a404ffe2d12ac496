//! Procedure Registry
//!
//! Maps dotted paths to server-side handlers. The registry is assembled once
//! at startup with a [`RegistryBuilder`], frozen into an immutable
//! [`Registry`], and shared read-only (`Arc<Registry>`) by every request
//! handler.
//!
//! # Call pipeline
//!
//! Every invocation, whether it arrives over HTTP or through a
//! [`ProcedureCaller`], goes through the same steps:
//!
//! 1. Lookup by exact path; unknown paths fail with `NotFound`
//! 2. Kind check; calling a mutation as a query fails with `BadRequest`
//! 3. Authorization; protected procedures require a principal
//! 4. Input validation against the declared schema
//! 5. The handler, whose failures are wrapped with the procedure path
//!
//! Steps 1-4 short-circuit: the handler never runs for a call they reject.
//!
//! # Example
//!
//! ```
//! use tandem_server::registry::{Procedure, Registry};
//! use serde_json::json;
//!
//! let registry = Registry::builder()
//!     .procedure(
//!         Procedure::query("greeting.hello")
//!             .input(json!({
//!                 "type": "object",
//!                 "properties": {"name": {"type": "string"}},
//!                 "required": ["name"]
//!             }))
//!             .handler(|input, _ctx| async move {
//!                 let name = input.and_then(|i| i["name"].as_str().map(String::from));
//!                 Ok(json!({ "text": format!("hello {}", name.unwrap_or_default()) }))
//!             }),
//!     )
//!     .build()
//!     .unwrap();
//!
//! assert!(registry.contains("greeting.hello"));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::{BoxStream, Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use tandem_common::protocol::{PathError, ProcedureError, ProcedureKind, ProcedurePath};
use tandem_common::schema::{FieldIssue, InputSchema, ROOT_FIELD};

use crate::caller::ProcedureCaller;
use crate::context::RequestContext;

/// What a handler returns.
pub type HandlerResult = Result<Value, HandlerError>;

/// Failures a handler can report.
///
/// The registry wraps these with the procedure path before they leave the
/// call boundary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HandlerError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid input")]
    InvalidInput(Vec<FieldIssue>),

    #[error("{0}")]
    Internal(String),
}

impl HandlerError {
    pub fn not_found(message: impl Into<String>) -> Self {
        HandlerError::NotFound(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        HandlerError::Internal(message.into())
    }

    fn at(self, path: &str) -> ProcedureError {
        let path = path.to_string();
        match self {
            HandlerError::NotFound(message) => ProcedureError::NotFound { path, message },
            HandlerError::BadRequest(message) => ProcedureError::BadRequest { path, message },
            HandlerError::Unauthorized(message) => ProcedureError::Unauthorized { path, message },
            HandlerError::InvalidInput(issues) => ProcedureError::Validation { path, issues },
            HandlerError::Internal(message) => ProcedureError::Internal { path, message },
        }
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError::Internal(format!("failed to serialize output: {}", err))
    }
}

type UnaryFn = dyn Fn(Option<Value>, RequestContext) -> BoxFuture<'static, HandlerResult> + Send + Sync;
type StreamFn = dyn Fn(Option<Value>, RequestContext) -> BoxStream<'static, HandlerResult> + Send + Sync;

#[derive(Clone)]
enum Resolver {
    Unary(Arc<UnaryFn>),
    Stream(Arc<StreamFn>),
}

/// Who may call a procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    /// Requires an authenticated principal in the request context
    Authenticated,
}

/// A registered server-side operation.
#[derive(Clone)]
pub struct Procedure {
    path: String,
    kind: ProcedureKind,
    schema: Option<Value>,
    validator: Option<Arc<InputSchema>>,
    access: Access,
    resolver: Resolver,
}

impl Procedure {
    pub fn query(path: impl Into<String>) -> ProcedureBuilder {
        ProcedureBuilder::new(path, ProcedureKind::Query)
    }

    pub fn mutation(path: impl Into<String>) -> ProcedureBuilder {
        ProcedureBuilder::new(path, ProcedureKind::Mutation)
    }

    pub fn subscription(path: impl Into<String>) -> ProcedureBuilder {
        ProcedureBuilder::new(path, ProcedureKind::Subscription)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn kind(&self) -> ProcedureKind {
        self.kind
    }

    pub fn access(&self) -> Access {
        self.access
    }
}

impl fmt::Debug for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Procedure")
            .field("path", &self.path)
            .field("kind", &self.kind)
            .field("access", &self.access)
            .field("schema", &self.schema)
            .finish()
    }
}

/// Builder for a single [`Procedure`].
pub struct ProcedureBuilder {
    path: String,
    kind: ProcedureKind,
    schema: Option<Value>,
    access: Access,
}

impl ProcedureBuilder {
    fn new(path: impl Into<String>, kind: ProcedureKind) -> Self {
        Self {
            path: path.into(),
            kind,
            schema: None,
            access: Access::Public,
        }
    }

    /// Validate input against the JSON Schema `schema` before the handler
    /// runs. The schema is compiled when the registry is built.
    pub fn input(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Require an authenticated principal.
    pub fn protected(mut self) -> Self {
        self.access = Access::Authenticated;
        self
    }

    fn finish(self, resolver: Resolver) -> Procedure {
        Procedure {
            path: self.path,
            kind: self.kind,
            schema: self.schema,
            validator: None,
            access: self.access,
            resolver,
        }
    }

    /// Finishes a query or mutation with a handler over raw JSON input.
    pub fn handler<F, Fut>(self, handler: F) -> Procedure
    where
        F: Fn(Option<Value>, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let resolver: Arc<UnaryFn> = Arc::new(
            move |input: Option<Value>, ctx: RequestContext| -> BoxFuture<'static, HandlerResult> {
                handler(input, ctx).boxed()
            },
        );
        self.finish(Resolver::Unary(resolver))
    }

    /// Finishes a query or mutation with a handler over typed input and output.
    ///
    /// The input is decoded with serde after schema validation; an absent
    /// input decodes from `null`, or from `{}` when the type needs an object.
    /// Decode failures are reported as validation errors and the handler is
    /// not called.
    pub fn typed<I, O, F, Fut>(self, handler: F) -> Procedure
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        F: Fn(I, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, HandlerError>> + Send + 'static,
    {
        self.handler(move |input, ctx| {
            let call = decode_input::<I>(input).map(|decoded| handler(decoded, ctx));
            async move {
                let output = call?.await?;
                Ok::<_, HandlerError>(serde_json::to_value(output)?)
            }
        })
    }

    /// Finishes a subscription with a handler producing a stream of values.
    pub fn stream<F, S>(self, handler: F) -> Procedure
    where
        F: Fn(Option<Value>, RequestContext) -> S + Send + Sync + 'static,
        S: Stream<Item = HandlerResult> + Send + 'static,
    {
        let resolver: Arc<StreamFn> = Arc::new(
            move |input: Option<Value>, ctx: RequestContext| -> BoxStream<'static, HandlerResult> {
                handler(input, ctx).boxed()
            },
        );
        self.finish(Resolver::Stream(resolver))
    }
}

fn decode_input<I: DeserializeOwned>(input: Option<Value>) -> Result<I, HandlerError> {
    let raw = input.unwrap_or(Value::Null);
    let retry_empty = raw.is_null();
    match decode_value::<I>(raw) {
        Ok(decoded) => Ok(decoded),
        Err(_) if retry_empty => decode_value::<I>(Value::Object(Default::default())),
        Err(err) => Err(err),
    }
}

/// Decodes `raw`, naming the field that failed.
fn decode_value<I: DeserializeOwned>(raw: Value) -> Result<I, HandlerError> {
    serde_path_to_error::deserialize(raw).map_err(|err| {
        let field = if err.path().iter().next().is_none() {
            ROOT_FIELD.to_string()
        } else {
            err.path().to_string()
        };
        HandlerError::InvalidInput(vec![FieldIssue::new(field, err.inner().to_string())])
    })
}

/// Startup-time registry configuration errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("invalid procedure path `{path}`: {source}")]
    InvalidPath { path: String, source: PathError },

    #[error("procedure `{0}` is registered more than once")]
    Duplicate(String),

    #[error("procedure `{path}` has an invalid input schema: {message}")]
    InvalidSchema { path: String, message: String },

    #[error("procedure `{path}` is a {kind} but was given a {resolver} handler")]
    ResolverMismatch {
        path: String,
        kind: ProcedureKind,
        resolver: &'static str,
    },
}

/// Collects procedures before freezing them into a [`Registry`].
#[derive(Default)]
pub struct RegistryBuilder {
    procedures: Vec<Procedure>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn procedure(mut self, procedure: Procedure) -> Self {
        self.procedures.push(procedure);
        self
    }

    /// Shorthand for a public query with no input schema.
    pub fn query<F, Fut>(self, path: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Option<Value>, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.procedure(Procedure::query(path).handler(handler))
    }

    /// Shorthand for a public mutation with no input schema.
    pub fn mutation<F, Fut>(self, path: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Option<Value>, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.procedure(Procedure::mutation(path).handler(handler))
    }

    /// Shorthand for a public subscription with no input schema.
    pub fn subscription<F, S>(self, path: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Option<Value>, RequestContext) -> S + Send + Sync + 'static,
        S: Stream<Item = HandlerResult> + Send + 'static,
    {
        self.procedure(Procedure::subscription(path).stream(handler))
    }

    /// Shorthand for a public query over typed input and output.
    pub fn query_typed<I, O, F, Fut>(self, path: impl Into<String>, handler: F) -> Self
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        F: Fn(I, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, HandlerError>> + Send + 'static,
    {
        self.procedure(Procedure::query(path).typed(handler))
    }

    /// Mounts every procedure of `other` under `prefix`.
    ///
    /// `merge("health", b)` turns `b`'s `check` into `health.check`. An empty
    /// prefix mounts at the root.
    pub fn merge(mut self, prefix: &str, other: RegistryBuilder) -> Self {
        for mut procedure in other.procedures {
            if !prefix.is_empty() {
                procedure.path = format!("{}.{}", prefix, procedure.path);
            }
            self.procedures.push(procedure);
        }
        self
    }

    /// Validates every path, compiles every input schema and freezes the
    /// registry.
    pub fn build(self) -> Result<Registry, RegistryError> {
        let mut procedures = HashMap::with_capacity(self.procedures.len());

        for mut procedure in self.procedures {
            let path = ProcedurePath::parse(&procedure.path).map_err(|source| {
                RegistryError::InvalidPath {
                    path: procedure.path.clone(),
                    source,
                }
            })?;

            let mismatch = match (&procedure.resolver, procedure.kind) {
                (Resolver::Stream(_), ProcedureKind::Query | ProcedureKind::Mutation) => Some("stream"),
                (Resolver::Unary(_), ProcedureKind::Subscription) => Some("unary"),
                _ => None,
            };
            if let Some(resolver) = mismatch {
                return Err(RegistryError::ResolverMismatch {
                    path: procedure.path,
                    kind: procedure.kind,
                    resolver,
                });
            }

            if let Some(schema) = &procedure.schema {
                let validator = InputSchema::compile(schema).map_err(|err| RegistryError::InvalidSchema {
                    path: procedure.path.clone(),
                    message: err.0,
                })?;
                procedure.validator = Some(Arc::new(validator));
            }

            let key = String::from(path);
            if procedures.contains_key(&key) {
                return Err(RegistryError::Duplicate(key));
            }
            procedures.insert(key, procedure);
        }

        tracing::info!("Procedure registry built with {} procedures", procedures.len());
        Ok(Registry { procedures })
    }
}

/// Immutable map of procedures, shared read-only across requests.
#[derive(Debug)]
pub struct Registry {
    procedures: HashMap<String, Procedure>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn get(&self, path: &str) -> Option<&Procedure> {
        self.procedures.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.procedures.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.procedures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procedures.is_empty()
    }

    /// Registered paths in lexical order.
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.procedures.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }

    /// A caller bound to `ctx` for direct in-process invocation.
    pub fn caller(self: &Arc<Self>, ctx: RequestContext) -> ProcedureCaller {
        ProcedureCaller::new(self.clone(), ctx)
    }

    /// Runs steps 1-4 of the call pipeline.
    fn admit(
        &self,
        path: &str,
        kind: ProcedureKind,
        input: Option<&Value>,
        ctx: &RequestContext,
    ) -> Result<&Procedure, ProcedureError> {
        let procedure = self
            .get(path)
            .ok_or_else(|| ProcedureError::unknown_procedure(path))?;

        if procedure.kind != kind {
            return Err(ProcedureError::BadRequest {
                path: path.to_string(),
                message: format!("`{}` is a {}, not a {}", path, procedure.kind, kind),
            });
        }

        if procedure.access == Access::Authenticated && !ctx.is_authenticated() {
            return Err(ProcedureError::Unauthorized {
                path: path.to_string(),
                message: "Authentication required".to_string(),
            });
        }

        if let Some(validator) = &procedure.validator {
            validator.validate(input).map_err(|issues| ProcedureError::Validation {
                path: path.to_string(),
                issues,
            })?;
        }

        Ok(procedure)
    }

    /// Invokes a query or mutation.
    ///
    /// Returns the handler result unchanged on success.
    pub async fn invoke(
        &self,
        path: &str,
        kind: ProcedureKind,
        input: Option<Value>,
        ctx: RequestContext,
    ) -> Result<Value, ProcedureError> {
        let input = input.filter(|v| !v.is_null());
        let request_id = ctx.request_id();
        tracing::debug!(request_id, path, %kind, "Invoking procedure");

        let procedure = match self.admit(path, kind, input.as_ref(), &ctx) {
            Ok(procedure) => procedure,
            Err(err) => {
                tracing::debug!(request_id, path, code = %err.code(), "Call rejected before handler");
                return Err(err);
            }
        };

        let handler = match &procedure.resolver {
            Resolver::Unary(handler) => handler.clone(),
            Resolver::Stream(_) => {
                return Err(ProcedureError::MethodNotSupported {
                    path: path.to_string(),
                    message: "Subscriptions must be consumed with subscribe".to_string(),
                })
            }
        };

        let outcome = AssertUnwindSafe(handler(input, ctx)).catch_unwind().await;
        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                let err = err.at(path);
                tracing::warn!(request_id, path, code = %err.code(), "Procedure failed: {}", err);
                Err(err)
            }
            Err(_) => {
                tracing::error!(request_id, path, "Procedure handler panicked");
                Err(ProcedureError::Internal {
                    path: path.to_string(),
                    message: "Procedure handler panicked".to_string(),
                })
            }
        }
    }

    /// Opens a subscription stream.
    ///
    /// Admission errors are returned immediately; handler errors arrive as
    /// items of the stream, wrapped with the procedure path.
    pub fn subscribe(
        &self,
        path: &str,
        input: Option<Value>,
        ctx: RequestContext,
    ) -> Result<BoxStream<'static, Result<Value, ProcedureError>>, ProcedureError> {
        let input = input.filter(|v| !v.is_null());
        let procedure = self.admit(path, ProcedureKind::Subscription, input.as_ref(), &ctx)?;

        let Resolver::Stream(handler) = &procedure.resolver else {
            return Err(ProcedureError::Internal {
                path: path.to_string(),
                message: "Subscription has no stream handler".to_string(),
            });
        };

        tracing::debug!(request_id = ctx.request_id(), path, "Opening subscription");
        let owned_path = path.to_string();
        Ok(handler(input, ctx)
            .map(move |item| item.map_err(|err| err.at(&owned_path)))
            .boxed())
    }
}
