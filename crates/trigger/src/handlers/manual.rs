//! The manual trigger: no listener, no schedule. `Start` deploys the
//! process into a state where it can only be fired by an explicit
//! `POST /v1/test` or `ExecuteFromNode` call from the management API.

use std::sync::Arc;

use async_trait::async_trait;
use flowmesh_dsl::FlowDefinition;
use flowmesh_error::FlowError;
use flowmesh_executor::ProcessExecutor;

use crate::TriggerHandler;

#[derive(Default)]
pub struct ManualTriggerHandler;

impl ManualTriggerHandler {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TriggerHandler for ManualTriggerHandler {
    fn trigger_type(&self) -> &'static str {
        "manual"
    }

    async fn start(&self, _executor: Arc<ProcessExecutor>, _definition: FlowDefinition) -> Result<(), FlowError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), FlowError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_and_stop_are_no_ops() {
        let handler = ManualTriggerHandler::new();
        let definition = FlowDefinition::from_json(
            r#"{"id": "p", "name": "demo", "trigger": {"id": "t", "type": "manual"}, "nodes": [], "transitions": []}"#,
        )
        .unwrap();
        handler.start(Arc::new(ProcessExecutor::with_defaults()), definition).await.unwrap();
        handler.stop().await.unwrap();
    }
}
