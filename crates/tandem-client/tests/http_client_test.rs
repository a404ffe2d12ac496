//! HTTP Client Integration Tests
//!
//! These tests verify the client's ability to:
//! - Call procedures on a real Tandem server
//! - Surface procedure failures as structured remote errors
//! - Send batches and API keys
//! - Report transport failures (bad responses, refused connections)
//! - Refresh a hydrated query cache over HTTP

use std::convert::Infallible;
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::json;
use tokio::net::TcpListener;

use tandem_client::TandemClient;
use tandem_common::auth::AuthConfig;
use tandem_common::protocol::builtin::{HealthStatus, PingInput, PingOutput};
use tandem_common::protocol::{CallRequest, ErrorCode, ProcedureKind, TandemError};
use tandem_hydrate::{PrefetchQuery, QueryClient, RenderScope};
use tandem_server::app::app_router;
use tandem_server::registry::Procedure;
use tandem_server::{AppInfo, ContextFactory, HttpServer, ServerConfig};

async fn start_server(config: ServerConfig) -> String {
    let registry = app_router()
        .procedure(Procedure::query("account.whoami").protected().handler(|_, ctx| async move {
            Ok(json!(ctx.principal().map(|p| p.id.clone())))
        }))
        .build()
        .unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(Arc::new(registry), &config);
    tokio::spawn(server.serve(listener));
    format!("http://{}/api/rpc", addr)
}

/// Serves the same canned response to every request.
async fn start_stub(status: StatusCode, body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let service = service_fn(move |_req: Request<Incoming>| async move {
                    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
                    *response.status_mut() = status;
                    Ok::<_, Infallible>(response)
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    format!("http://{}/api/rpc", addr)
}

#[tokio::test]
async fn test_query_and_typed_calls() {
    let url = start_server(ServerConfig::default().with_app(AppInfo::new("5.0.0"))).await;
    let client = TandemClient::new(url).unwrap();

    let status: HealthStatus = client.query_as("health.check", &()).await.unwrap();
    assert_eq!(status.version, "5.0.0");

    let pong: PingOutput = client
        .query_as("health.ping", &PingInput { echo: Some("hi".into()) })
        .await
        .unwrap();
    assert_eq!(pong.echo.as_deref(), Some("hi"));

    let logged = client.mutate("health.log", None).await.unwrap();
    assert_eq!(logged["logged"], true);
}

#[tokio::test]
async fn test_procedure_failure_is_remote_error() {
    let url = start_server(ServerConfig::default()).await;
    let client = TandemClient::new(url).unwrap();

    match client.query("health.ping", Some(json!({"echo": false}))).await {
        Err(TandemError::Remote(body)) => {
            assert_eq!(body.error_code(), ErrorCode::Validation);
            assert_eq!(body.data.issues[0].field, "echo");
        }
        other => panic!("expected remote validation error, got {:?}", other),
    }

    match client.query("nope.nothing", None).await {
        Err(TandemError::Remote(body)) => assert_eq!(body.code, -32004),
        other => panic!("expected remote not-found error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_batch_returns_outcomes_in_order() {
    let url = start_server(ServerConfig::default()).await;
    let client = TandemClient::new(url).unwrap();

    let responses = client
        .batch(vec![
            CallRequest::new(3, "health.ping", ProcedureKind::Query),
            CallRequest::new(1, "missing", ProcedureKind::Query),
            CallRequest::new(2, "health.check", ProcedureKind::Query),
        ])
        .await
        .unwrap();

    let ids: Vec<_> = responses.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![3, 1, 2]);
    assert!(responses[0].is_success());
    assert!(!responses[1].is_success());
    assert!(responses[2].is_success());
}

#[tokio::test]
async fn test_api_key_header() {
    let config = ServerConfig::default().with_auth(AuthConfig::with_api_key("key-1", "ops"));
    let url = start_server(config).await;

    let anonymous = TandemClient::new(url.clone()).unwrap();
    match anonymous.query("account.whoami", None).await {
        Err(TandemError::Remote(body)) => assert_eq!(body.error_code(), ErrorCode::Unauthorized),
        other => panic!("expected unauthorized, got {:?}", other),
    }

    let authed = TandemClient::new(url).unwrap().with_api_key("key-1");
    assert_eq!(authed.query("account.whoami", None).await.unwrap(), json!("ops"));
}

#[tokio::test]
async fn test_malformed_response_is_invalid_response() {
    let url = start_stub(StatusCode::OK, "definitely not json").await;
    let client = TandemClient::new(url).unwrap();
    assert!(matches!(
        client.query("health.check", None).await,
        Err(TandemError::InvalidResponse(_))
    ));
}

#[tokio::test]
async fn test_error_status_without_batch_body_is_transport_error() {
    let url = start_stub(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>").await;
    let client = TandemClient::new(url).unwrap();
    match client.query("health.check", None).await {
        Err(TandemError::Transport(message)) => assert!(message.contains("502")),
        other => panic!("expected transport error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_mismatched_response_id_is_rejected() {
    let url = start_stub(StatusCode::OK, r#"[{"id":999999,"result":1}]"#).await;
    let client = TandemClient::new(url).unwrap();
    assert!(matches!(
        client.query("health.check", None).await,
        Err(TandemError::InvalidResponse(_))
    ));
}

#[tokio::test]
async fn test_refused_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = TandemClient::new(format!("http://{}/api/rpc", addr)).unwrap();
    assert!(matches!(
        client.query("health.check", None).await,
        Err(TandemError::Connection(_))
    ));
}

#[tokio::test]
async fn test_client_refreshes_hydrated_cache_over_http() {
    let url = start_server(ServerConfig::default()).await;

    // Server side: render through the in-process caller.
    let registry = Arc::new(app_router().build().unwrap());
    let scope = RenderScope::new(Arc::new(registry.caller(ContextFactory::standalone().anonymous())));
    scope.prefetch(PrefetchQuery::single("health.ping", Some(json!({"echo": "ssr"}))));
    let state = scope.dehydrate().await;

    // Client side: hydrate, then invalidate and refetch over HTTP.
    let client = QueryClient::new(Arc::new(TandemClient::new(url).unwrap()));
    assert_eq!(client.hydrate(&state), 1);
    client.invalidate("health");
    let pong = client.query("health.ping", Some(json!({"echo": "ssr"}))).await.unwrap();
    assert_eq!(pong, json!({"message": "pong", "echo": "ssr"}));

    let err = client.query("health.ping", Some(json!({"echo": 1}))).await.unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::Validation);
}
