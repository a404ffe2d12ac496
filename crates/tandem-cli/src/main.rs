// Copyright 2025 Tandem Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Tandem CLI Entry Point
//!
//! ## Usage
//!
//! ```bash
//! # Serve the procedures on the default address (127.0.0.1:3000/api/rpc)
//! tandem serve
//!
//! # Serve with authentication on a custom address
//! tandem serve -b 0.0.0.0:8080 --api-key secret
//!
//! # Call a procedure (outputs raw JSON)
//! tandem call http://127.0.0.1:3000/api/rpc health.ping -i '{"echo": "hi"}'
//!
//! # Render the status page in-process, or against a running server
//! tandem render
//! tandem render --url http://127.0.0.1:3000/api/rpc
//! ```
//!
//! Flags win over the `TANDEM_*` environment variables, which win over the
//! built-in defaults.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use argh::FromArgs;
use serde_json::Value;

use tandem_client::TandemClient;
use tandem_common::auth::AuthConfig;
use tandem_common::protocol::ProcedureKind;
use tandem_common::QueryFetcher;
use tandem_server::app::app_router;
use tandem_server::config::ENV_KEY_PRINCIPAL;
use tandem_server::{HttpServer, ServerConfig};

/// Validates that a URL string starts with http:// or https://
fn validate_http_url(url: &str, description: &str) -> Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "Invalid {}: '{}' must start with http:// or https://",
            description,
            url
        ))
    }
}

#[derive(FromArgs)]
/// Tandem - typed procedure calls with server-render hydration
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Serve(ServeArgs),
    Call(CallArgs),
    Render(RenderArgs),
}

/// Arguments for starting the procedure server.
///
/// Unset flags fall back to the environment (`TANDEM_BIND`,
/// `TANDEM_ENDPOINT`, `TANDEM_MAX_BODY_BYTES`, `TANDEM_API_KEY`).
#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// start the Tandem procedure server
struct ServeArgs {
    /// address to bind the HTTP server to
    #[argh(option, short = 'b')]
    bind: Option<String>,

    /// path of the batch endpoint (e.g. /api/rpc)
    #[argh(option, long = "endpoint")]
    endpoint: Option<String>,

    /// API key required for protected procedures
    ///
    /// Callers send it in the X-API-Key header or as a Bearer token.
    #[argh(option, long = "api-key")]
    api_key: Option<String>,

    /// maximum accepted request body in bytes
    #[argh(option, long = "max-body-bytes")]
    max_body_bytes: Option<usize>,
}

/// Arguments for making a single procedure call.
///
/// Outputs the raw JSON result to stdout. Failures go to stderr with a
/// non-zero exit code.
#[derive(FromArgs)]
#[argh(subcommand, name = "call")]
/// call a procedure on a Tandem server
struct CallArgs {
    /// URL of the batch endpoint (e.g. http://127.0.0.1:3000/api/rpc)
    #[argh(positional)]
    endpoint: String,

    /// dotted procedure path (e.g. health.ping)
    #[argh(positional)]
    path: String,

    /// JSON input for the procedure
    #[argh(option, short = 'i', long = "input")]
    input: Option<String>,

    /// procedure kind: query or mutation
    #[argh(option, short = 'k', long = "kind", default = "\"query\".into()")]
    kind: String,

    /// API key to send in the X-API-Key header
    #[argh(option, long = "api-key")]
    api_key: Option<String>,
}

/// Arguments for rendering the status page.
///
/// Without `--url` the procedures are called in-process, the way a page
/// handler living next to the registry would.
#[derive(FromArgs)]
#[argh(subcommand, name = "render")]
/// render the status page with its hydration snapshot
struct RenderArgs {
    /// fetch over HTTP from this batch endpoint instead of in-process
    #[argh(option, long = "url")]
    url: Option<String>,

    /// value echoed back by the prefetched health.ping
    #[argh(option, long = "echo")]
    echo: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // call and render write their output to stdout
    if matches!(cli.command, Commands::Serve(_)) {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    match cli.command {
        Commands::Serve(args) => run_serve(args).await,
        Commands::Call(args) => run_call(args).await,
        Commands::Render(args) => run_render(args).await,
    }
}

/// Applies the flags that were given over `base`.
fn apply_serve_args(args: &ServeArgs, base: ServerConfig) -> Result<ServerConfig> {
    let mut config = base;

    if let Some(bind) = &args.bind {
        let addr: SocketAddr = bind
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid bind address {}: {}", bind, e))?;
        config = config.with_bind(addr);
    }
    if let Some(endpoint) = &args.endpoint {
        config = config.with_endpoint(endpoint.clone())?;
    }
    if let Some(limit) = args.max_body_bytes {
        config = config.with_max_body_bytes(limit);
    }
    if let Some(key) = &args.api_key {
        config = config.with_auth(AuthConfig::with_api_key(key.clone(), ENV_KEY_PRINCIPAL));
    }

    Ok(config)
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let config = apply_serve_args(&args, ServerConfig::from_env()?)?;

    tracing::info!("Starting Tandem server version {}", config.app.version());
    if config.auth.is_enabled() {
        tracing::info!("API key authentication enabled");
    }
    if config.database.url.is_none() {
        tracing::warn!("DATABASE_URL is not set; procedures run without a database");
    }

    let registry = Arc::new(app_router().build()?);
    let server = HttpServer::new(registry, &config);
    let listener = tandem_server::http_server::bind(config.bind).await?;

    server
        .serve_with_shutdown(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown signal received");
        })
        .await?;

    Ok(())
}

fn parse_kind(kind: &str) -> Result<ProcedureKind> {
    match kind.parse::<ProcedureKind>().map_err(|e| anyhow::anyhow!(e))? {
        ProcedureKind::Subscription => Err(anyhow::anyhow!("Subscriptions cannot be called over HTTP")),
        kind => Ok(kind),
    }
}

fn parse_input(input: Option<&str>) -> Result<Option<Value>> {
    input
        .map(|raw| serde_json::from_str(raw).map_err(|e| anyhow::anyhow!("Invalid JSON in input: {}", e)))
        .transpose()
}

/// Executes the `call` subcommand and prints the raw JSON result.
async fn run_call(args: CallArgs) -> Result<()> {
    validate_http_url(&args.endpoint, "endpoint")?;
    let kind = parse_kind(&args.kind)?;
    let input = parse_input(args.input.as_deref())?;

    let mut client = TandemClient::new(args.endpoint)?;
    if let Some(key) = args.api_key {
        client = client.with_api_key(key);
    }

    let result = client.call(&args.path, kind, input).await?;
    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}

/// Executes the `render` subcommand and prints the page.
async fn run_render(args: RenderArgs) -> Result<()> {
    let fetcher: Arc<dyn QueryFetcher> = match &args.url {
        Some(url) => {
            validate_http_url(url, "endpoint")?;
            Arc::new(TandemClient::new(url.clone())?)
        }
        None => {
            let config = ServerConfig::from_env()?;
            let registry = Arc::new(app_router().build()?);
            Arc::new(registry.caller(config.context_factory().anonymous()))
        }
    };

    let html = tandem_cli::page::render_status_page(fetcher, args.echo).await?;
    print!("{}", html);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_serve_defaults() {
        let args: Cli = Cli::from_args(&["tandem"], &["serve"]).unwrap();
        match args.command {
            Commands::Serve(ServeArgs { bind, endpoint, api_key, max_body_bytes }) => {
                assert!(bind.is_none());
                assert!(endpoint.is_none());
                assert!(api_key.is_none());
                assert!(max_body_bytes.is_none());
            }
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_cli_parse_serve_flags() {
        let args: Cli = Cli::from_args(&["tandem"], &[
            "serve",
            "-b", "0.0.0.0:8080",
            "--endpoint", "/trpc",
            "--api-key", "secret",
            "--max-body-bytes", "2048",
        ]).unwrap();
        match args.command {
            Commands::Serve(args) => {
                assert_eq!(args.bind.as_deref(), Some("0.0.0.0:8080"));
                assert_eq!(args.endpoint.as_deref(), Some("/trpc"));
                assert_eq!(args.api_key.as_deref(), Some("secret"));
                assert_eq!(args.max_body_bytes, Some(2048));
            }
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_cli_parse_call() {
        let args: Cli = Cli::from_args(&["tandem"], &[
            "call",
            "http://127.0.0.1:3000/api/rpc",
            "health.ping",
            "-i", "{\"echo\":\"hi\"}",
        ]).unwrap();
        match args.command {
            Commands::Call(CallArgs { endpoint, path, input, kind, api_key }) => {
                assert_eq!(endpoint, "http://127.0.0.1:3000/api/rpc");
                assert_eq!(path, "health.ping");
                assert_eq!(input.as_deref(), Some("{\"echo\":\"hi\"}"));
                assert_eq!(kind, "query");
                assert!(api_key.is_none());
            }
            _ => panic!("Expected Call command"),
        }
    }

    #[test]
    fn test_cli_parse_render() {
        let args: Cli = Cli::from_args(&["tandem"], &["render", "--echo", "hi"]).unwrap();
        match args.command {
            Commands::Render(RenderArgs { url, echo }) => {
                assert!(url.is_none());
                assert_eq!(echo.as_deref(), Some("hi"));
            }
            _ => panic!("Expected Render command"),
        }
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::from_args(&["tandem"], &[]).is_err());
        assert!(Cli::from_args(&["tandem"], &["call", "http://127.0.0.1:3000/api/rpc"]).is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let args = ServeArgs {
            bind: Some("0.0.0.0:9000".into()),
            endpoint: None,
            api_key: Some("flag-key".into()),
            max_body_bytes: Some(10),
        };
        let base = ServerConfig::default().with_endpoint("/env").unwrap();
        let config = apply_serve_args(&args, base).unwrap();

        assert_eq!(config.bind, "0.0.0.0:9000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.endpoint, "/env");
        assert_eq!(config.max_body_bytes, 10);
        assert!(config.auth.authenticate(Some("flag-key")).is_some());
    }

    #[test]
    fn test_invalid_serve_flags() {
        let bad_bind = ServeArgs { bind: Some("nope".into()), endpoint: None, api_key: None, max_body_bytes: None };
        assert!(apply_serve_args(&bad_bind, ServerConfig::default()).is_err());

        let bad_endpoint = ServeArgs { bind: None, endpoint: Some("api".into()), api_key: None, max_body_bytes: None };
        assert!(apply_serve_args(&bad_endpoint, ServerConfig::default()).is_err());
    }

    #[test]
    fn test_parse_kind() {
        assert_eq!(parse_kind("query").unwrap(), ProcedureKind::Query);
        assert_eq!(parse_kind("mutation").unwrap(), ProcedureKind::Mutation);
        let err = parse_kind("subscription").unwrap_err();
        assert!(err.to_string().contains("cannot be called over HTTP"));
        let err = parse_kind("stream").unwrap_err();
        assert!(err.to_string().contains("unknown procedure kind `stream`"));
    }

    #[test]
    fn test_parse_input() {
        assert_eq!(parse_input(None).unwrap(), None);
        assert_eq!(parse_input(Some("{\"a\":1}")).unwrap(), Some(serde_json::json!({"a": 1})));
        assert!(parse_input(Some("{not json")).is_err());
    }

    #[test]
    fn test_validate_http_url() {
        assert!(validate_http_url("http://127.0.0.1:3000/api/rpc", "endpoint").is_ok());
        assert!(validate_http_url("https://example.com/api/rpc", "endpoint").is_ok());
        assert!(validate_http_url("127.0.0.1:3000", "endpoint").is_err());
    }
}
