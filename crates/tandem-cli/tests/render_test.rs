//! Status Page Integration Tests
//!
//! Renders the status page against a real server over HTTP and hydrates a
//! client cache from the output.

use std::sync::Arc;

use serde_json::json;
use tokio::net::TcpListener;

use tandem_cli::page::{render_status_page, STATUS_QUERY};
use tandem_client::TandemClient;
use tandem_hydrate::{HydrationSlot, QueryClient};
use tandem_server::app::app_router;
use tandem_server::{AppInfo, HttpServer, ServerConfig};

async fn start_server() -> String {
    let registry = Arc::new(app_router().build().unwrap());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = ServerConfig::default().with_app(AppInfo::new("9.9.9"));
    tokio::spawn(HttpServer::new(registry, &config).serve(listener));
    format!("http://{}/api/rpc", addr)
}

#[tokio::test]
async fn test_render_over_http_and_hydrate() {
    let url = start_server().await;
    let fetcher = Arc::new(TandemClient::new(url).unwrap());

    let html = render_status_page(fetcher.clone(), Some("cli".into())).await.unwrap();
    assert!(html.contains("Version 9.9.9"));

    let client = QueryClient::new(fetcher);
    assert!(client.hydrate_from_slot(&HydrationSlot::from_html(&html).unwrap()));

    let status = client.query(STATUS_QUERY, None).await.unwrap();
    assert_eq!(status["version"], "9.9.9");
    let pong = client.query("health.ping", Some(json!({"echo": "cli"}))).await.unwrap();
    assert_eq!(pong["echo"], "cli");
}

#[tokio::test]
async fn test_render_against_unreachable_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let fetcher = Arc::new(TandemClient::new(format!("http://{}/api/rpc", addr)).unwrap());
    let html = render_status_page(fetcher, None).await.unwrap();

    assert!(html.contains("Status: unavailable"));
    assert!(tandem_hydrate::extract_state(&html).unwrap().unwrap().is_empty());
}
