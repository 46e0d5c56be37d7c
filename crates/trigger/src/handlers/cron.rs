//! The cron trigger: a six-field (seconds-first) schedule, fired on
//! every tick with `{datetime: <RFC3339 UTC now>}` as the trigger data.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use cron::Schedule;
use flowmesh_dsl::FlowDefinition;
use flowmesh_error::FlowError;
use flowmesh_executor::ProcessExecutor;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::TriggerHandler;

pub struct CronTriggerHandler {
    config: Value,
    shutdown: Arc<Notify>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CronTriggerHandler {
    #[must_use]
    pub fn new(config: Value) -> Self {
        Self {
            config,
            shutdown: Arc::new(Notify::new()),
            task: Mutex::new(None),
        }
    }

    fn expression(&self) -> Result<String, FlowError> {
        self.config
            .get("expression")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned)
            .ok_or_else(|| FlowError::trigger_config("cron trigger requires a string `expression` field"))
    }
}

#[async_trait]
impl TriggerHandler for CronTriggerHandler {
    fn trigger_type(&self) -> &'static str {
        "cron"
    }

    async fn start(&self, executor: Arc<ProcessExecutor>, definition: FlowDefinition) -> Result<(), FlowError> {
        let expression = self.expression()?;
        let schedule = Schedule::from_str(&expression)
            .map_err(|err| FlowError::trigger_config(format!("invalid cron expression `{expression}`: {err}")))?;

        let shutdown = Arc::clone(&self.shutdown);
        let handle = tokio::spawn(async move {
            loop {
                let Some(next) = schedule.upcoming(Utc).next() else {
                    break;
                };
                let delay = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = shutdown.notified() => break,
                }
                let data = serde_json::json!({ "datetime": Utc::now().to_rfc3339() });
                let (_, result) = executor.execute(&definition, data).await;
                if let Err(err) = result {
                    tracing::warn!(flow = %definition.id.as_str(), error = %err, "cron-triggered run failed");
                }
            }
        });
        *self.task.lock() = Some(handle);
        Ok(())
    }

    async fn stop(&self) -> Result<(), FlowError> {
        self.shutdown.notify_one();
        if let Some(handle) = self.task.lock().take() {
            let abort = handle.abort_handle();
            if tokio::time::timeout(Duration::from_secs(30), handle).await.is_err() {
                tracing::warn!("cron trigger: in-flight job did not finish within 30s, aborting");
                abort.abort();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_expression() {
        let handler = CronTriggerHandler::new(serde_json::json!({}));
        assert!(handler.expression().is_err());
    }

    #[test]
    fn rejects_malformed_expression() {
        assert!(Schedule::from_str("not a cron expr").is_err());
    }

    #[tokio::test]
    async fn accepts_six_field_expression() {
        let handler = CronTriggerHandler::new(serde_json::json!({ "expression": "0 * * * * *" }));
        let definition = FlowDefinition::from_json(
            r#"{"id": "p", "name": "demo", "trigger": {"id": "t", "type": "cron"}, "nodes": [], "transitions": []}"#,
        )
        .unwrap();
        handler.start(Arc::new(ProcessExecutor::with_defaults()), definition).await.unwrap();
        handler.stop().await.unwrap();
    }
}
