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

//! Status page rendering.
//!
//! Renders a minimal status page the way any server-rendered page uses
//! Tandem: a fresh [`RenderScope`] per render, prefetches for the data the
//! page needs, and the snapshot embedded in front of the markup so the client
//! can hydrate without refetching.

use std::sync::Arc;

use anyhow::Result;
use serde_json::{json, Value};

use tandem_common::protocol::builtin::HealthStatus;
use tandem_common::protocol::ErrorBody;
use tandem_common::QueryFetcher;
use tandem_hydrate::{PrefetchQuery, RenderScope};

/// Procedure the page body is rendered from.
pub const STATUS_QUERY: &str = "health.check";
/// Procedure prefetched for the client only.
pub const PING_QUERY: &str = "health.ping";

/// Renders the complete status page document through `fetcher`.
///
/// A failing procedure never aborts the render: the body shows the error
/// and the failed entry is left out of the snapshot so the client refetches.
pub async fn render_status_page(fetcher: Arc<dyn QueryFetcher>, echo: Option<String>) -> Result<String> {
    let scope = RenderScope::new(fetcher);
    scope.prefetch(PrefetchQuery::single(PING_QUERY, ping_input(echo)));

    let body = match scope.fetch_query(PrefetchQuery::single(STATUS_QUERY, None)).await {
        Ok(value) => status_markup(value),
        Err(err) => error_markup(&err),
    };

    let boundary = scope.serialize_for_hydration(body).await;
    tracing::debug!(queries = boundary.state().len(), "Status page rendered");

    Ok(format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>Tandem status</title></head><body>{}</body></html>\n",
        boundary.render()?
    ))
}

fn ping_input(echo: Option<String>) -> Option<Value> {
    echo.map(|echo| json!({ "echo": echo }))
}

fn status_markup(value: Value) -> String {
    match serde_json::from_value::<HealthStatus>(value) {
        Ok(status) => format!(
            "<main><h1>Status: {}</h1><p>Version {}</p><p>Up {:.1}s</p></main>",
            escape_html(&status.status),
            escape_html(&status.version),
            status.uptime
        ),
        Err(err) => format!("<main><h1>Status: unknown</h1><p>{}</p></main>", escape_html(&err.to_string())),
    }
}

fn error_markup(err: &ErrorBody) -> String {
    format!(
        "<main><h1>Status: unavailable</h1><p>{} ({})</p></main>",
        escape_html(&err.message),
        err.code
    )
}

/// Escapes text for use inside an HTML element.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_hydrate::{extract_state, QueryKey, QueryStatus};
    use tandem_server::app::app_router;
    use tandem_server::{AppInfo, ContextFactory, Registry};
    use tandem_common::auth::AuthConfig;
    use tandem_server::Database;

    fn fetcher(version: &str) -> Arc<dyn QueryFetcher> {
        let registry = Arc::new(app_router().build().unwrap());
        let contexts = ContextFactory::new(Database::detached(), AppInfo::new(version), AuthConfig::disabled());
        Arc::new(registry.caller(contexts.anonymous()))
    }

    #[tokio::test]
    async fn test_page_embeds_snapshot_and_body() {
        let html = render_status_page(fetcher("2.0.0"), Some("hello".into())).await.unwrap();

        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<h1>Status: ok</h1>"));
        assert!(html.contains("Version 2.0.0"));

        let state = extract_state(&html).unwrap().unwrap();
        assert_eq!(state.len(), 2);
        let ping = state
            .get(&QueryKey::single(PING_QUERY, Some(json!({"echo": "hello"}))))
            .unwrap();
        assert_eq!(ping.status, QueryStatus::Success);
        assert_eq!(ping.data, Some(json!({"message": "pong", "echo": "hello"})));
        assert!(state.get(&QueryKey::single(STATUS_QUERY, None)).is_some());
    }

    #[tokio::test]
    async fn test_page_survives_missing_procedures() {
        let registry = Arc::new(Registry::builder().build().unwrap());
        let caller = registry.caller(ContextFactory::standalone().anonymous());
        let html = render_status_page(Arc::new(caller), None).await.unwrap();

        assert!(html.contains("Status: unavailable"));
        assert!(html.contains("-32004"));
        assert!(extract_state(&html).unwrap().unwrap().is_empty());
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<b>\"a\" & 'b'</b>"), "&lt;b&gt;&quot;a&quot; &amp; &#39;b&#39;&lt;/b&gt;");
        assert_eq!(escape_html("plain"), "plain");
    }
}
