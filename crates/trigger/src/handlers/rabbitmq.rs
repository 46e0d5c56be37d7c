//! The rabbitmq-consumer trigger: one delivery in, one run out. Each
//! message is manually ack'd on a successful execution and nack'd with
//! requeue on a fatal one, so a broker-side retry policy can apply.

use std::sync::Arc;

use async_trait::async_trait;
use flowmesh_dsl::FlowDefinition;
use flowmesh_error::FlowError;
use flowmesh_executor::ProcessExecutor;
use futures::StreamExt;
use lapin::options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions, QueueDeclareOptions};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{Connection, ConnectionProperties};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use tokio::task::JoinHandle;

use crate::TriggerHandler;

fn amqp_value_to_json(value: &AMQPValue) -> Value {
    match value {
        AMQPValue::Boolean(b) => Value::Bool(*b),
        AMQPValue::ShortShortInt(n) => Value::from(*n),
        AMQPValue::ShortShortUInt(n) => Value::from(*n),
        AMQPValue::ShortInt(n) => Value::from(*n),
        AMQPValue::ShortUInt(n) => Value::from(*n),
        AMQPValue::LongInt(n) => Value::from(*n),
        AMQPValue::LongUInt(n) => Value::from(*n),
        AMQPValue::LongLongInt(n) => Value::from(*n),
        AMQPValue::Float(n) => Value::from(*n),
        AMQPValue::Double(n) => Value::from(*n),
        AMQPValue::ShortString(s) => Value::String(s.to_string()),
        AMQPValue::LongString(s) => Value::String(String::from_utf8_lossy(s.as_bytes()).into_owned()),
        AMQPValue::FieldArray(arr) => Value::Array(arr.as_slice().iter().map(amqp_value_to_json).collect()),
        AMQPValue::FieldTable(table) => field_table_to_json(table),
        AMQPValue::ByteArray(bytes) => Value::Array(bytes.as_slice().iter().map(|b| Value::from(*b)).collect()),
        AMQPValue::Timestamp(ts) => Value::from(*ts),
        AMQPValue::DecimalValue(decimal) => json!({ "scale": decimal.scale, "value": decimal.value }),
        AMQPValue::Void => Value::Null,
    }
}

fn field_table_to_json(table: &FieldTable) -> Value {
    let mut map = Map::new();
    for (key, value) in table.inner() {
        map.insert(key.to_string(), amqp_value_to_json(value));
    }
    Value::Object(map)
}

pub struct RabbitMqConsumerTriggerHandler {
    config: Value,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RabbitMqConsumerTriggerHandler {
    #[must_use]
    pub fn new(config: Value) -> Self {
        Self {
            config,
            task: Mutex::new(None),
        }
    }

    fn url(&self) -> Result<String, FlowError> {
        self.config
            .get("url_amqp")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned)
            .ok_or_else(|| FlowError::trigger_config("rabbitmq-consumer trigger requires `url_amqp`"))
    }

    fn queue(&self) -> Result<String, FlowError> {
        self.config
            .get("queue")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned)
            .ok_or_else(|| FlowError::trigger_config("rabbitmq-consumer trigger requires `queue`"))
    }
}

#[async_trait]
impl TriggerHandler for RabbitMqConsumerTriggerHandler {
    fn trigger_type(&self) -> &'static str {
        "rabbitmq-consumer"
    }

    async fn start(&self, executor: Arc<ProcessExecutor>, definition: FlowDefinition) -> Result<(), FlowError> {
        let url = self.url()?;
        let queue = self.queue()?;

        let connection = Connection::connect(&url, ConnectionProperties::default())
            .await
            .map_err(|err| FlowError::trigger_config(format!("amqp connect failed: {err}")))?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|err| FlowError::trigger_config(format!("amqp channel failed: {err}")))?;
        channel
            .queue_declare(&queue, QueueDeclareOptions::default(), FieldTable::default())
            .await
            .map_err(|err| FlowError::trigger_config(format!("amqp queue_declare failed: {err}")))?;

        let consumer_tag = format!("flowmesh-{}", definition.id.as_str());
        let mut consumer = channel
            .basic_consume(&queue, &consumer_tag, BasicConsumeOptions::default(), FieldTable::default())
            .await
            .map_err(|err| FlowError::trigger_config(format!("amqp basic_consume failed: {err}")))?;

        let handle = tokio::spawn(async move {
            // Keep the connection alive for the task's lifetime.
            let _connection = connection;
            while let Some(delivery) = consumer.next().await {
                let Ok(delivery) = delivery else {
                    continue;
                };
                let payload = String::from_utf8_lossy(&delivery.data).into_owned();
                let delivery_mode = delivery.properties.delivery_mode().map_or(Value::Null, |mode| Value::from(mode));
                let headers = delivery.properties.headers().as_ref().map_or(Value::Object(Map::new()), field_table_to_json);
                let trigger_data = json!({
                    "payload": payload,
                    "properties": { "delivery_mode": delivery_mode, "headers": headers },
                });
                let (_, result) = executor.execute(&definition, trigger_data).await;
                let ack_result = match result {
                    Ok(()) => delivery.ack(BasicAckOptions::default()).await,
                    Err(err) => {
                        tracing::warn!(flow = %definition.id.as_str(), error = %err, "rabbitmq-triggered run failed");
                        delivery.nack(BasicNackOptions { requeue: true, ..Default::default() }).await
                    }
                };
                if let Err(err) = ack_result {
                    tracing::warn!(error = %err, "failed to ack/nack rabbitmq delivery");
                }
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
    fn rejects_missing_url() {
        let handler = RabbitMqConsumerTriggerHandler::new(serde_json::json!({ "queue": "q" }));
        assert!(handler.url().is_err());
    }

    #[test]
    fn rejects_missing_queue() {
        let handler = RabbitMqConsumerTriggerHandler::new(serde_json::json!({ "url_amqp": "amqp://localhost" }));
        assert!(handler.queue().is_err());
    }
}
