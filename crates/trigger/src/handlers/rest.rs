//! The rest trigger: mounts `method + path` into the shared
//! [`RestRegistry`] so the server's HTTP router can dispatch matching
//! requests into this process. Dispatch itself happens server-side —
//! `start`/`stop` only add or remove the mount.

use std::sync::Arc;

use async_trait::async_trait;
use flowmesh_dsl::FlowDefinition;
use flowmesh_error::FlowError;
use flowmesh_executor::ProcessExecutor;
use serde_json::Value;

use crate::mount::{RestMount, RestRegistry};
use crate::TriggerHandler;

pub struct RestTriggerHandler {
    config: Value,
    registry: Arc<RestRegistry>,
}

impl RestTriggerHandler {
    #[must_use]
    pub fn new(config: Value, registry: Arc<RestRegistry>) -> Self {
        Self { config, registry }
    }

    fn method(&self) -> Result<String, FlowError> {
        self.config
            .get("method")
            .and_then(Value::as_str)
            .map(str::to_ascii_uppercase)
            .ok_or_else(|| FlowError::trigger_config("rest trigger requires a string `method` field"))
    }

    fn path(&self) -> Result<String, FlowError> {
        self.config
            .get("path")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned)
            .ok_or_else(|| FlowError::trigger_config("rest trigger requires a string `path` field"))
    }
}

#[async_trait]
impl TriggerHandler for RestTriggerHandler {
    fn trigger_type(&self) -> &'static str {
        "rest"
    }

    async fn start(&self, executor: Arc<ProcessExecutor>, definition: FlowDefinition) -> Result<(), FlowError> {
        let method = self.method()?;
        let path = self.path()?;
        self.registry.register(&method, &path, Arc::new(RestMount { executor, definition }));
        Ok(())
    }

    async fn stop(&self) -> Result<(), FlowError> {
        if let (Ok(method), Ok(path)) = (self.method(), self.path()) {
            self.registry.deregister(&method, &path);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_registers_then_stop_deregisters() {
        let registry = Arc::new(RestRegistry::new());
        let handler = RestTriggerHandler::new(serde_json::json!({ "method": "post", "path": "/orders" }), Arc::clone(&registry));
        let definition = FlowDefinition::from_json(
            r#"{"id": "p", "name": "demo", "trigger": {"id": "t", "type": "rest"}, "nodes": [], "transitions": []}"#,
        )
        .unwrap();
        handler.start(Arc::new(ProcessExecutor::with_defaults()), definition).await.unwrap();
        assert!(registry.lookup("POST", "/orders").is_some());
        handler.stop().await.unwrap();
        assert!(registry.lookup("POST", "/orders").is_none());
    }

    #[test]
    fn rejects_missing_path() {
        let registry = Arc::new(RestRegistry::new());
        let handler = RestTriggerHandler::new(serde_json::json!({ "method": "GET" }), registry);
        assert!(handler.path().is_err());
    }
}
