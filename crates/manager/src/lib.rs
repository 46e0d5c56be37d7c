//! # Flowmesh Manager
//!
//! The trigger manager (spec §4.7): the `process_id -> handler` map and
//! the deploy/stop lifecycle that sits on top of it. Deploying an
//! already-deployed process is a hot reload — stop the old handler,
//! build and start a new one — so a trigger config edit takes effect
//! without a gap wider than one `stop`/`start` round trip.

use std::sync::Arc;

use dashmap::DashMap;
use flowmesh_core::ProcessId;
use flowmesh_dsl::FlowDefinition;
use flowmesh_error::FlowError;
use flowmesh_executor::ProcessExecutor;
use flowmesh_trigger::{self as trigger, RestRegistry, SoapRegistry, TriggerContext, TriggerHandler};

pub struct TriggerManager {
    executor: Arc<ProcessExecutor>,
    ctx: TriggerContext,
    handlers: DashMap<ProcessId, Arc<dyn TriggerHandler>>,
}

impl TriggerManager {
    #[must_use]
    pub fn new(executor: Arc<ProcessExecutor>, rest: Arc<RestRegistry>, soap: Arc<SoapRegistry>) -> Self {
        Self {
            executor,
            ctx: TriggerContext::new(rest, soap),
            handlers: DashMap::new(),
        }
    }

    /// Arm `definition`'s trigger. If the process already has a running
    /// handler, it is stopped first — deploying twice is a reload, not
    /// an error.
    pub async fn deploy(&self, definition: FlowDefinition) -> Result<(), FlowError> {
        if let Some((_, old)) = self.handlers.remove(&definition.id) {
            old.stop().await?;
        }

        let handler = trigger::build(&definition.trigger, &self.ctx)?;
        handler.start(Arc::clone(&self.executor), definition.clone()).await?;
        self.handlers.insert(definition.id, handler);
        Ok(())
    }

    /// Tear down the handler for `id`. Not an error if nothing is
    /// currently deployed for it.
    pub async fn stop(&self, id: &ProcessId) -> Result<(), FlowError> {
        if let Some((_, handler)) = self.handlers.remove(id) {
            handler.stop().await?;
        }
        Ok(())
    }

    /// Stop every live handler, collecting (rather than short-circuiting
    /// on) individual failures — used on process shutdown, where one
    /// misbehaving trigger shouldn't strand the rest.
    pub async fn stop_all(&self) {
        let ids: Vec<ProcessId> = self.handlers.iter().map(|entry| entry.key().clone()).collect();
        for id in ids {
            if let Some((_, handler)) = self.handlers.remove(&id) {
                if let Err(err) = handler.stop().await {
                    tracing::warn!(process_id = %id.as_str(), error = %err, "trigger failed to stop cleanly");
                }
            }
        }
    }

    #[must_use]
    pub fn is_deployed(&self, id: &ProcessId) -> bool {
        self.handlers.contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flow(id: &str) -> FlowDefinition {
        FlowDefinition::from_json(&format!(
            r#"{{"id": "{id}", "name": "demo", "trigger": {{"id": "t", "type": "manual"}}, "nodes": [], "transitions": []}}"#
        ))
        .unwrap()
    }

    fn manager() -> TriggerManager {
        TriggerManager::new(Arc::new(ProcessExecutor::with_defaults()), Arc::new(RestRegistry::new()), Arc::new(SoapRegistry::new()))
    }

    #[tokio::test]
    async fn deploy_then_stop_round_trips() {
        let manager = manager();
        let definition = flow("p1");
        manager.deploy(definition.clone()).await.unwrap();
        assert!(manager.is_deployed(&definition.id));
        manager.stop(&definition.id).await.unwrap();
        assert!(!manager.is_deployed(&definition.id));
    }

    #[tokio::test]
    async fn redeploying_is_a_reload_not_an_error() {
        let manager = manager();
        let definition = flow("p1");
        manager.deploy(definition.clone()).await.unwrap();
        manager.deploy(definition.clone()).await.unwrap();
        assert!(manager.is_deployed(&definition.id));
    }

    #[tokio::test]
    async fn stopping_an_undeployed_process_is_not_an_error() {
        let manager = manager();
        manager.stop(&ProcessId::new("nonexistent")).await.unwrap();
    }

    #[tokio::test]
    async fn stop_all_clears_every_handler() {
        let manager = manager();
        manager.deploy(flow("p1")).await.unwrap();
        manager.deploy(flow("p2")).await.unwrap();
        manager.stop_all().await;
        assert!(!manager.is_deployed(&ProcessId::new("p1")));
        assert!(!manager.is_deployed(&ProcessId::new("p2")));
    }

    #[test]
    fn build_rejects_unknown_trigger_type_before_registering() {
        let ctx = TriggerContext::new(Arc::new(RestRegistry::new()), Arc::new(SoapRegistry::new()));
        let bad_trigger = flowmesh_dsl::Trigger {
            id: flowmesh_core::TriggerId::new("t"),
            trigger_type: "carrier-pigeon".to_owned(),
            config: serde_json::Value::Null,
        };
        assert!(trigger::build(&bad_trigger, &ctx).is_err());
    }
}
