//! Request Context
//!
//! Every procedure invocation receives a [`RequestContext`] built fresh by a
//! [`ContextFactory`]: a database handle, the authenticated principal (if any),
//! a request id and the application metadata. Contexts are never shared
//! between invocations; the factory itself is cheap to clone and is the only
//! process-wide piece.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tandem_common::auth::{AuthConfig, Principal};

static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_request_id() -> u64 {
    REQUEST_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Environment variable overriding the reported application version.
pub const VERSION_ENV: &str = "TANDEM_APP_VERSION";

/// Application metadata shared by all contexts.
#[derive(Debug, Clone)]
pub struct AppInfo {
    version: String,
    started_at: Instant,
}

impl AppInfo {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            started_at: Instant::now(),
        }
    }

    /// Version from `TANDEM_APP_VERSION`, falling back to the crate version.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let version = lookup(VERSION_ENV)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());
        Self::new(version)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Database connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Connection URL, e.g. `postgres://localhost/app`
    pub url: Option<String>,
    /// Upper bound for the connection pool
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
        }
    }
}

impl DatabaseConfig {
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Reads `DATABASE_URL` and `DATABASE_MAX_CONNECTIONS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            url: lookup("DATABASE_URL").filter(|u| !u.is_empty()),
            max_connections: lookup("DATABASE_MAX_CONNECTIONS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_connections),
        }
    }
}

/// Handle to the application database.
///
/// Cloning is cheap; all clones refer to the same pool settings. Opening
/// connections is left to the ORM the application plugs in, so creating a
/// handle performs no I/O.
#[derive(Debug, Clone)]
pub struct Database {
    config: Arc<DatabaseConfig>,
}

impl Database {
    pub fn connect(config: DatabaseConfig) -> Self {
        if let Some(url) = &config.url {
            tracing::debug!(backend = scheme_of(url), "Database handle configured");
        }
        Self {
            config: Arc::new(config),
        }
    }

    /// A handle with no backing database.
    pub fn detached() -> Self {
        Self::connect(DatabaseConfig::default())
    }

    pub fn is_configured(&self) -> bool {
        self.config.url.is_some()
    }

    pub fn url(&self) -> Option<&str> {
        self.config.url.as_deref()
    }

    /// URL scheme of the configured database (`postgres`, `sqlite`, ...).
    pub fn backend(&self) -> Option<&str> {
        self.config.url.as_deref().map(scheme_of)
    }

    pub fn max_connections(&self) -> u32 {
        self.config.max_connections
    }
}

fn scheme_of(url: &str) -> &str {
    url.split_once("://").map(|(scheme, _)| scheme).unwrap_or(url)
}

/// Per-invocation data handed to every procedure.
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: u64,
    principal: Option<Principal>,
    db: Database,
    app: Arc<AppInfo>,
}

impl RequestContext {
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.principal.is_some()
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn app(&self) -> &AppInfo {
        &self.app
    }

    /// A new context for another invocation by the same caller.
    ///
    /// Shares the principal and handles but gets its own request id.
    pub fn fork(&self) -> RequestContext {
        RequestContext {
            request_id: next_request_id(),
            principal: self.principal.clone(),
            db: self.db.clone(),
            app: self.app.clone(),
        }
    }
}

/// Builds a fresh [`RequestContext`] for each inbound call.
#[derive(Debug, Clone)]
pub struct ContextFactory {
    db: Database,
    app: Arc<AppInfo>,
    auth: Arc<AuthConfig>,
}

impl ContextFactory {
    pub fn new(db: Database, app: AppInfo, auth: AuthConfig) -> Self {
        Self {
            db,
            app: Arc::new(app),
            auth: Arc::new(auth),
        }
    }

    /// Detached database, metadata from the environment, no auth.
    pub fn standalone() -> Self {
        Self::new(Database::detached(), AppInfo::from_env(), AuthConfig::disabled())
    }

    /// Context for a request presenting `credential`.
    pub fn create(&self, credential: Option<&str>) -> RequestContext {
        let principal = self.auth.authenticate(credential);
        self.with_principal(principal)
    }

    /// Context with no principal.
    pub fn anonymous(&self) -> RequestContext {
        self.with_principal(None)
    }

    /// Context acting as `principal`, for trusted in-process callers.
    pub fn with_principal(&self, principal: Option<Principal>) -> RequestContext {
        RequestContext {
            request_id: next_request_id(),
            principal,
            db: self.db.clone(),
            app: self.app.clone(),
        }
    }

    pub fn app(&self) -> &AppInfo {
        &self.app
    }

    pub fn auth(&self) -> &AuthConfig {
        &self.auth
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contexts_are_fresh_per_call() {
        let factory = ContextFactory::standalone();
        let a = factory.anonymous();
        let b = factory.anonymous();
        assert_ne!(a.request_id(), b.request_id());
        assert!(!a.is_authenticated());
    }

    #[test]
    fn test_create_authenticates_credential() {
        let factory = ContextFactory::new(
            Database::detached(),
            AppInfo::new("1.0.0"),
            AuthConfig::with_api_key("key", "admin"),
        );
        let ctx = factory.create(Some("key"));
        assert_eq!(ctx.principal().unwrap().id, "admin");
        assert!(factory.create(Some("nope")).principal().is_none());
        assert!(factory.create(None).principal().is_none());
    }

    #[test]
    fn test_fork_keeps_principal_with_new_id() {
        let factory = ContextFactory::standalone();
        let ctx = factory.with_principal(Some(Principal::new("p")));
        let forked = ctx.fork();
        assert_ne!(ctx.request_id(), forked.request_id());
        assert_eq!(forked.principal(), ctx.principal());
    }

    #[test]
    fn test_database_handle() {
        let db = Database::connect(DatabaseConfig::default().with_url("postgres://localhost/app"));
        assert!(db.is_configured());
        assert_eq!(db.backend(), Some("postgres"));
        assert_eq!(db.max_connections(), 10);
        assert!(!Database::detached().is_configured());
    }

    #[test]
    fn test_app_info_uptime_is_monotonic() {
        let app = AppInfo::new("9.9.9");
        assert_eq!(app.version(), "9.9.9");
        let first = app.uptime();
        assert!(app.uptime() >= first);
    }
}
