//! # Flowmesh Audit
//!
//! Publishes per-node and lifecycle events to the `audit.logs` NATS
//! subject (spec §6). A serialization failure is retried once with
//! `input`/`output` nulled out, so a single unserializable payload
//! never silently drops the whole event.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flowmesh_core::{time, ExecutionId, ProcessId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const SUBJECT: &str = "audit.logs";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub execution_id: ExecutionId,
    pub flow_id: ProcessId,
    pub node_id: String,
    pub node_type: String,
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub input: Value,
    pub output: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditEvent {
    #[must_use]
    pub fn node(
        execution_id: ExecutionId,
        flow_id: ProcessId,
        node_id: impl Into<String>,
        node_type: impl Into<String>,
        status: impl Into<String>,
        input: Value,
        output: Value,
        error: Option<String>,
    ) -> Self {
        Self {
            execution_id,
            flow_id,
            node_id: node_id.into(),
            node_type: node_type.into(),
            status: status.into(),
            timestamp: time::now(),
            input,
            output,
            error,
        }
    }

    /// A process-level lifecycle event (`started`, `completed`,
    /// `failed`, `replayed`) — `node_id` is the process id and
    /// `node_type` is `"lifecycle"`.
    #[must_use]
    pub fn lifecycle(
        execution_id: ExecutionId,
        flow_id: ProcessId,
        status: impl Into<String>,
        input: Value,
        error: Option<String>,
    ) -> Self {
        let node_id = flow_id.as_str().to_owned();
        Self {
            execution_id,
            flow_id,
            node_id,
            node_type: "lifecycle".to_owned(),
            status: status.into(),
            timestamp: time::now(),
            input,
            output: Value::Null,
            error,
        }
    }
}

#[async_trait]
pub trait AuditEmitter: Send + Sync {
    async fn publish(&self, event: AuditEvent);
}

pub struct NatsAuditEmitter {
    client: async_nats::Client,
}

impl NatsAuditEmitter {
    #[must_use]
    pub fn new(client: async_nats::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AuditEmitter for NatsAuditEmitter {
    async fn publish(&self, event: AuditEvent) {
        let payload = match serde_json::to_vec(&event) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(error = %err, "audit event serialization failed, retrying with nulled payload");
                let fallback = AuditEvent {
                    input: Value::Null,
                    output: Value::Null,
                    ..event
                };
                match serde_json::to_vec(&fallback) {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        tracing::error!(error = %err, "audit event still unserializable after fallback, dropping");
                        return;
                    }
                }
            }
        };

        if let Err(err) = self.client.publish(SUBJECT, payload.into()).await {
            tracing::warn!(error = %err, subject = SUBJECT, "audit publish failed");
        }
    }
}

/// Drops every event. Used where no message bus is configured.
#[derive(Default)]
pub struct NoopAuditEmitter;

#[async_trait]
impl AuditEmitter for NoopAuditEmitter {
    async fn publish(&self, _event: AuditEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_event_uses_process_id_as_node_id() {
        let event = AuditEvent::lifecycle(
            ExecutionId::new(),
            ProcessId::new("p1"),
            "started",
            Value::Null,
            None,
        );
        assert_eq!(event.node_id, "p1");
        assert_eq!(event.node_type, "lifecycle");
    }

    #[test]
    fn error_field_is_omitted_from_json_when_absent() {
        let event = AuditEvent::node(
            ExecutionId::new(),
            ProcessId::new("p1"),
            "n1",
            "log",
            "success",
            Value::Null,
            Value::Null,
            None,
        );
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("\"error\""));
    }

    #[tokio::test]
    async fn noop_emitter_accepts_any_event_without_panicking() {
        let emitter = NoopAuditEmitter;
        emitter
            .publish(AuditEvent::lifecycle(
                ExecutionId::new(),
                ProcessId::new("p1"),
                "started",
                Value::Null,
                None,
            ))
            .await;
    }
}
