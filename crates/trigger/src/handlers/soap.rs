//! The soap trigger: mounts a path into the shared [`SoapRegistry`],
//! the same way the rest trigger mounts into [`RestRegistry`]. The
//! server parses the SOAP envelope and builds the trigger payload;
//! `start`/`stop` only manage the mount.

use std::sync::Arc;

use async_trait::async_trait;
use flowmesh_dsl::FlowDefinition;
use flowmesh_error::FlowError;
use flowmesh_executor::ProcessExecutor;
use serde_json::Value;

use crate::mount::{SoapMount, SoapRegistry};
use crate::TriggerHandler;

pub struct SoapTriggerHandler {
    config: Value,
    registry: Arc<SoapRegistry>,
}

impl SoapTriggerHandler {
    #[must_use]
    pub fn new(config: Value, registry: Arc<SoapRegistry>) -> Self {
        Self { config, registry }
    }

    fn path(&self) -> Result<String, FlowError> {
        self.config
            .get("path")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned)
            .ok_or_else(|| FlowError::trigger_config("soap trigger requires a string `path` field"))
    }

    fn wsdl(&self) -> Option<String> {
        self.config.get("wsdl").and_then(Value::as_str).map(ToOwned::to_owned)
    }
}

#[async_trait]
impl TriggerHandler for SoapTriggerHandler {
    fn trigger_type(&self) -> &'static str {
        "soap"
    }

    async fn start(&self, executor: Arc<ProcessExecutor>, definition: FlowDefinition) -> Result<(), FlowError> {
        let path = self.path()?;
        let wsdl = self.wsdl();
        self.registry.register(&path, Arc::new(SoapMount { executor, definition, wsdl }));
        Ok(())
    }

    async fn stop(&self) -> Result<(), FlowError> {
        if let Ok(path) = self.path() {
            self.registry.deregister(&path);
        }
        Ok(())
    }
}
