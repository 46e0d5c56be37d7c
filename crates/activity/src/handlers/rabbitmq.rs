//! `rabbitmq-producer` activity: publish a JSON payload to an AMQP
//! routing key.

use async_trait::async_trait;
use flowmesh_context::ExecutionContext;
use flowmesh_error::FlowError;
use lapin::options::{BasicPublishOptions, ConfirmSelectOptions};
use lapin::{BasicProperties, Connection, ConnectionProperties};
use serde_json::{json, Value};

use crate::{ActivityHandler, ActivityInput};

#[derive(Default)]
pub struct RabbitMqProducerHandler;

#[async_trait]
impl ActivityHandler for RabbitMqProducerHandler {
    fn activity_type(&self) -> &'static str {
        "rabbitmq-producer"
    }

    async fn execute(
        &self,
        _input: &ActivityInput,
        config: &Value,
        _ctx: &ExecutionContext,
    ) -> Result<Value, FlowError> {
        let url = config
            .get("url_amqp")
            .and_then(Value::as_str)
            .ok_or_else(|| FlowError::config("rabbitmq-producer node requires `url_amqp`"))?;
        let routing_key = config
            .get("routing_key")
            .and_then(Value::as_str)
            .ok_or_else(|| FlowError::config("rabbitmq-producer node requires `routing_key`"))?;
        let exchange = config.get("exchange").and_then(Value::as_str).unwrap_or("");
        let payload = config.get("payload").cloned().unwrap_or(Value::Null);

        let body = serde_json::to_vec(&payload)
            .map_err(|e| FlowError::activity(format!("cannot serialize payload: {e}")))?;

        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(|e| FlowError::activity(format!("amqp connect failed: {e}")))?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| FlowError::activity(format!("amqp channel failed: {e}")))?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| FlowError::activity(format!("amqp confirm_select failed: {e}")))?;

        channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                &body,
                BasicProperties::default().with_content_type("application/json".into()),
            )
            .await
            .map_err(|e| FlowError::activity(format!("amqp publish failed: {e}")))?
            .await
            .map_err(|e| FlowError::activity(format!("amqp publish not confirmed: {e}")))?;

        Ok(json!({
            "published": true,
            "routing_key": routing_key,
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
    async fn missing_routing_key_is_a_config_error() {
        let handler = RabbitMqProducerHandler;
        let config = json!({"url_amqp": "amqp://localhost"});
        assert!(handler.execute(&ActivityInput::new(), &config, &ctx()).await.is_err());
    }
}
