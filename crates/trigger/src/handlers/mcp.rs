//! The mcp trigger: unlike rest/soap, this one owns its own HTTP
//! listener (default port 9091) and speaks JSON-RPC 2.0 over
//! `/mcp/{id}` (invoke) and `/mcp/{id}/capabilities` (describe).

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use flowmesh_dsl::FlowDefinition;
use flowmesh_error::FlowError;
use flowmesh_executor::ProcessExecutor;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::task::JoinHandle;

use crate::TriggerHandler;

const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const SERVER_ERROR: i64 = -32000;

struct McpState {
    executor: Arc<ProcessExecutor>,
    definition: FlowDefinition,
}

pub struct McpTriggerHandler {
    config: Value,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl McpTriggerHandler {
    #[must_use]
    pub fn new(config: Value) -> Self {
        Self {
            config,
            task: Mutex::new(None),
        }
    }

    fn port(&self) -> u16 {
        self.config.get("port").and_then(Value::as_u64).and_then(|p| u16::try_from(p).ok()).unwrap_or(9091)
    }
}

fn rpc_error(id: Value, code: i64, message: impl Into<String>) -> Json<Value> {
    Json(json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message.into() },
    }))
}

fn rpc_result(id: Value, result: Value) -> Json<Value> {
    Json(json!({ "jsonrpc": "2.0", "id": id, "result": result }))
}

async fn invoke(State(state): State<Arc<McpState>>, Path(id): Path<String>, body: String) -> Json<Value> {
    if id != state.definition.id.as_str() {
        return rpc_error(Value::Null, INVALID_REQUEST, format!("no mcp-triggered process mounted at `{id}`"));
    }

    let request: Value = match serde_json::from_str(&body) {
        Ok(value) => value,
        Err(err) => return rpc_error(Value::Null, PARSE_ERROR, format!("invalid JSON: {err}")),
    };

    let request_id = request.get("id").cloned().unwrap_or(Value::Null);
    if request.get("jsonrpc").and_then(Value::as_str) != Some("2.0") || request.get("method").is_none() {
        return rpc_error(request_id, INVALID_REQUEST, "request must carry `jsonrpc: \"2.0\"` and `method`");
    }

    let method = request.get("method").and_then(Value::as_str).unwrap_or_default();
    let params = request.get("params").cloned().unwrap_or_else(|| Value::Object(serde_json::Map::new()));
    let arguments = request.get("arguments").cloned().unwrap_or_else(|| Value::Object(serde_json::Map::new()));
    let trigger_data = json!({
        "tool_request": { "method": method, "params": params, "arguments": arguments },
        "client_context": { "jsonrpc": "2.0", "id": request_id.clone() },
    });
    let (ctx, result) = state.executor.execute(&state.definition, trigger_data).await;
    match result {
        Ok(()) => rpc_result(
            request_id,
            json!({ "execution_id": ctx.execution_id.to_string(), "nodes": ctx.nodes() }),
        ),
        Err(err) => rpc_error(request_id, SERVER_ERROR, err.to_string()),
    }
}

async fn capabilities(State(state): State<Arc<McpState>>, Path(id): Path<String>) -> Json<Value> {
    if id != state.definition.id.as_str() {
        return Json(json!({ "error": format!("no mcp-triggered process mounted at `{id}`") }));
    }
    Json(json!({
        "id": state.definition.id.as_str(),
        "name": state.definition.name,
        "version": state.definition.version,
    }))
}

#[async_trait]
impl TriggerHandler for McpTriggerHandler {
    fn trigger_type(&self) -> &'static str {
        "mcp"
    }

    async fn start(&self, executor: Arc<ProcessExecutor>, definition: FlowDefinition) -> Result<(), FlowError> {
        let port = self.port();
        let state = Arc::new(McpState { executor, definition });

        let app = Router::new()
            .route("/mcp/:id", post(invoke))
            .route("/mcp/:id/capabilities", get(capabilities))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
            .await
            .map_err(|err| FlowError::trigger_config(format!("mcp trigger failed to bind port {port}: {err}")))?;

        let handle = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app).await {
                tracing::warn!(error = %err, "mcp trigger listener stopped");
            }
        });
        *self.task.lock() = Some(handle);
        Ok(())
    }

    async fn stop(&self) -> Result<(), FlowError> {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_defaults_to_9091() {
        let handler = McpTriggerHandler::new(json!({}));
        assert_eq!(handler.port(), 9091);
    }

    #[test]
    fn port_is_configurable() {
        let handler = McpTriggerHandler::new(json!({ "port": 9500 }));
        assert_eq!(handler.port(), 9500);
    }
}
