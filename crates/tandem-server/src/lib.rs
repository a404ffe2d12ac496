//! Tandem Server
//!
//! The procedure registry, the in-process caller and the batched HTTP
//! endpoint, plus the application's one feature router (`health`).

pub mod app;
pub mod caller;
pub mod config;
pub mod context;
pub mod health;
pub mod http_router;
pub mod http_server;
pub mod registry;

pub use caller::ProcedureCaller;
pub use config::ServerConfig;
pub use context::{AppInfo, ContextFactory, Database, DatabaseConfig, RequestContext};
pub use http_server::HttpServer;
pub use registry::{HandlerError, HandlerResult, Procedure, Registry, RegistryBuilder, RegistryError};
