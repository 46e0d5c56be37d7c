//! `log` activity: emit a structured log line at a normalized level.

use async_trait::async_trait;
use flowmesh_context::ExecutionContext;
use flowmesh_error::FlowError;
use serde_json::{json, Value};

use crate::{ActivityHandler, ActivityInput};

#[derive(Default)]
pub struct LogHandler;

#[async_trait]
impl ActivityHandler for LogHandler {
    fn activity_type(&self) -> &'static str {
        "log"
    }

    async fn execute(
        &self,
        input: &ActivityInput,
        config: &Value,
        _ctx: &ExecutionContext,
    ) -> Result<Value, FlowError> {
        let level = input
            .get("level")
            .and_then(Value::as_str)
            .or_else(|| config.get("level").and_then(Value::as_str))
            .unwrap_or("info")
            .to_uppercase();
        let message = input
            .get("message")
            .and_then(Value::as_str)
            .or_else(|| config.get("message").and_then(Value::as_str))
            .unwrap_or_default()
            .to_owned();

        match level.as_str() {
            "ERROR" => tracing::error!(%message, "node log"),
            "WARN" | "WARNING" => tracing::warn!(%message, "node log"),
            "DEBUG" => tracing::debug!(%message, "node log"),
            _ => tracing::info!(%message, "node log"),
        }

        Ok(json!({
            "logged": true,
            "level": level,
            "message": message,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowmesh_core::{ExecutionId, ProcessId};

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(ExecutionId::new(), ProcessId::new("p"), json!({}))
    }

    #[tokio::test]
    async fn level_defaults_to_info_uppercased() {
        let handler = LogHandler;
        let output = handler.execute(&ActivityInput::new(), &json!({}), &ctx()).await.unwrap();
        assert_eq!(output["level"], "INFO");
    }

    #[tokio::test]
    async fn config_level_is_normalized() {
        let handler = LogHandler;
        let config = json!({"level": "warn", "message": "careful"});
        let output = handler.execute(&ActivityInput::new(), &config, &ctx()).await.unwrap();
        assert_eq!(output["level"], "WARN");
        assert_eq!(output["message"], "careful");
    }
}
