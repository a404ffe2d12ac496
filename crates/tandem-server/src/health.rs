//! The `health` feature: `check`, `ping` and `log`.

use chrono::Utc;
use serde_json::{json, Value};

use tandem_common::protocol::builtin::{HealthStatus, LogInput, LogOutput, PingInput, PingOutput};

use crate::registry::{HandlerError, Procedure, RegistryBuilder};

/// Procedures of the health feature, unprefixed. Mount with
/// `merge("health", health_router())`.
pub fn health_router() -> RegistryBuilder {
    RegistryBuilder::new()
        .procedure(Procedure::query("check").handler(|_, ctx| async move {
            let app = ctx.app();
            let status = HealthStatus::ok(app.version(), app.uptime().as_secs_f64());
            Ok::<_, HandlerError>(serde_json::to_value(status)?)
        }))
        .procedure(
            Procedure::query("ping")
                .input(echo_schema())
                .typed(|input: PingInput, _ctx| async move {
                    Ok::<_, HandlerError>(PingOutput::pong(input.echo))
                }),
        )
        .procedure(
            Procedure::mutation("log")
                .input(echo_schema())
                .typed(|input: LogInput, ctx| async move {
                    tracing::info!(
                        request_id = ctx.request_id(),
                        echo = input.echo.as_deref(),
                        "health.log called"
                    );
                    Ok::<_, HandlerError>(LogOutput::logged_at(Utc::now()))
                }),
        )
}

/// `{ echo?: string }`, and the whole object may be omitted.
fn echo_schema() -> Value {
    json!({
        "type": ["object", "null"],
        "properties": {"echo": {"type": "string"}}
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AppInfo, ContextFactory, Database};
    use std::sync::Arc;
    use tandem_common::auth::AuthConfig;
    use tandem_common::protocol::ProcedureKind;

    fn registry() -> Arc<crate::registry::Registry> {
        Arc::new(RegistryBuilder::new().merge("health", health_router()).build().unwrap())
    }

    fn factory() -> ContextFactory {
        ContextFactory::new(Database::detached(), AppInfo::new("2.4.0"), AuthConfig::disabled())
    }

    #[tokio::test]
    async fn test_check_reports_version_and_uptime() {
        let value = registry()
            .invoke("health.check", ProcedureKind::Query, None, factory().anonymous())
            .await
            .unwrap();
        assert_eq!(value["status"], "ok");
        assert_eq!(value["version"], "2.4.0");
        assert!(value["uptime"].as_f64().unwrap() >= 0.0);
    }

    #[tokio::test]
    async fn test_ping_echo_is_absent_without_input() {
        let caller = registry().caller(factory().anonymous());
        assert_eq!(caller.query("health.ping", None).await.unwrap(), json!({"message": "pong"}));
        assert_eq!(
            caller.query("health.ping", Some(json!({}))).await.unwrap(),
            json!({"message": "pong"})
        );
        assert_eq!(
            caller.query("health.ping", Some(json!({"echo": "hi"}))).await.unwrap(),
            json!({"message": "pong", "echo": "hi"})
        );
    }

    #[tokio::test]
    async fn test_log_never_fails() {
        let caller = registry().caller(factory().anonymous());
        for input in [None, Some(json!({"echo": "x"})), Some(Value::Null)] {
            let value = caller.mutate("health.log", input).await.unwrap();
            assert_eq!(value["logged"], true);
            assert!(value["timestamp"].is_string());
        }
    }
}
