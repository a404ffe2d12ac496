//! Server configuration
//!
//! Defaults, overridden by environment variables, overridden by whatever the
//! caller sets with the `with_*` methods (the CLI applies its flags last).
//!
//! | Variable                   | Field              |
//! |----------------------------|--------------------|
//! | `TANDEM_BIND`              | `bind`             |
//! | `TANDEM_ENDPOINT`          | `endpoint`         |
//! | `TANDEM_MAX_BODY_BYTES`    | `max_body_bytes`   |
//! | `TANDEM_API_KEY`           | `auth`             |
//! | `TANDEM_APP_VERSION`       | `app.version`      |
//! | `DATABASE_URL`             | `database.url`     |
//! | `DATABASE_MAX_CONNECTIONS` | `database.max_connections` |

use std::net::SocketAddr;

use tandem_common::auth::AuthConfig;
use tandem_common::protocol::{Result, TandemError};
use tandem_common::transport::DEFAULT_MAX_BODY_BYTES;

use crate::context::{AppInfo, ContextFactory, Database, DatabaseConfig};

pub const DEFAULT_BIND: &str = "127.0.0.1:3000";
pub const DEFAULT_ENDPOINT: &str = "/api/rpc";

/// Principal id given to callers presenting `TANDEM_API_KEY`.
pub const ENV_KEY_PRINCIPAL: &str = "api-key";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Path of the batch endpoint, starting with `/`
    pub endpoint: String,
    /// Requests with larger bodies are answered with 413
    pub max_body_bytes: usize,
    pub auth: AuthConfig,
    pub database: DatabaseConfig,
    pub app: AppInfo,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            auth: AuthConfig::disabled(),
            database: DatabaseConfig::default(),
            app: AppInfo::new(env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self {
            database: DatabaseConfig::from_lookup(&lookup),
            app: AppInfo::from_lookup(&lookup),
            ..Self::default()
        };

        if let Some(bind) = lookup("TANDEM_BIND") {
            config.bind = bind.parse()?;
        }
        if let Some(endpoint) = lookup("TANDEM_ENDPOINT") {
            config = config.with_endpoint(endpoint)?;
        }
        if let Some(limit) = lookup("TANDEM_MAX_BODY_BYTES") {
            config.max_body_bytes = limit
                .parse()
                .map_err(|_| TandemError::Config(format!("TANDEM_MAX_BODY_BYTES is not a number: {}", limit)))?;
        }
        if let Some(key) = lookup("TANDEM_API_KEY").filter(|k| !k.is_empty()) {
            config.auth = AuthConfig::with_api_key(key, ENV_KEY_PRINCIPAL);
        }

        Ok(config)
    }

    pub fn with_bind(mut self, bind: SocketAddr) -> Self {
        self.bind = bind;
        self
    }

    /// Sets the endpoint path; it must start with `/`.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Result<Self> {
        let endpoint = endpoint.into();
        if !endpoint.starts_with('/') {
            return Err(TandemError::Config(format!(
                "endpoint must start with '/': {}",
                endpoint
            )));
        }
        self.endpoint = endpoint;
        Ok(self)
    }

    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_database(mut self, database: DatabaseConfig) -> Self {
        self.database = database;
        self
    }

    pub fn with_app(mut self, app: AppInfo) -> Self {
        self.app = app;
        self
    }

    /// The factory that builds each request's context under this configuration.
    pub fn context_factory(&self) -> ContextFactory {
        ContextFactory::new(
            Database::connect(self.database.clone()),
            self.app.clone(),
            self.auth.clone(),
        )
    }
}
