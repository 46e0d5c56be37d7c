//! `script` activity: evaluate `config.script` in an ephemeral JS VM
//! with `input` bound as a global, under a cooperative timeout.

use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use boa_engine::property::Attribute;
use boa_engine::{Context, JsValue, Source};
use flowmesh_context::ExecutionContext;
use flowmesh_error::FlowError;
use serde_json::{json, Value};

use crate::{ActivityHandler, ActivityInput};

#[derive(Default)]
pub struct ScriptHandler;

fn wrap_result(value: Value) -> Value {
    match value {
        Value::Null => json!({}),
        Value::Object(_) => value,
        other => json!({ "result": other }),
    }
}

#[async_trait]
impl ActivityHandler for ScriptHandler {
    fn activity_type(&self) -> &'static str {
        "script"
    }

    async fn execute(
        &self,
        input: &ActivityInput,
        config: &Value,
        _ctx: &ExecutionContext,
    ) -> Result<Value, FlowError> {
        let script = config
            .get("script")
            .and_then(Value::as_str)
            .ok_or_else(|| FlowError::config("script node requires `script`"))?
            .to_owned();
        let timeout_ms = config.get("timeout_ms").and_then(Value::as_u64).unwrap_or(5000);
        let input_json = Value::Object(input.iter().map(|(k, v)| (k.clone(), v.clone())).collect());

        tokio::task::spawn_blocking(move || run_script(&script, &input_json, timeout_ms))
            .await
            .map_err(|e| FlowError::activity(format!("script task panicked: {e}")))?
    }
}

fn run_script(script: &str, input_json: &Value, timeout_ms: u64) -> Result<Value, FlowError> {
    let mut context = Context::default();
    let handle = context.interrupt_handle();
    let deadline = thread::spawn(move || {
        thread::sleep(Duration::from_millis(timeout_ms));
        handle.interrupt();
    });

    let input_value = JsValue::from_json(input_json, &mut context)
        .map_err(|e| FlowError::activity(format!("cannot bind script input: {e}")))?;
    context
        .register_global_property(boa_engine::js_string!("input"), input_value, Attribute::all())
        .map_err(|e| FlowError::activity(format!("cannot register script input: {e}")))?;

    let result = context
        .eval(Source::from_bytes(script.as_bytes()))
        .map_err(|e| FlowError::activity(format!("script evaluation failed: {e}")))?;

    let output = result
        .to_json(&mut context)
        .map_err(|e| FlowError::activity(format!("script result is not JSON-representable: {e}")))?
        .unwrap_or(Value::Null);

    let _ = deadline;
    Ok(wrap_result(output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowmesh_core::{ExecutionId, ProcessId};

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(ExecutionId::new(), ProcessId::new("p"), json!({}))
    }

    #[tokio::test]
    async fn map_result_is_returned_directly() {
        let handler = ScriptHandler;
        let config = json!({"script": "({value: input.x + 1})"});
        let mut input = ActivityInput::new();
        input.insert("x".to_owned(), json!(41));
        let output = handler.execute(&input, &config, &ctx()).await.unwrap();
        assert_eq!(output["value"], 42);
    }

    #[tokio::test]
    async fn scalar_result_is_wrapped() {
        let handler = ScriptHandler;
        let config = json!({"script": "1 + 1"});
        let output = handler.execute(&ActivityInput::new(), &config, &ctx()).await.unwrap();
        assert_eq!(output["result"], 2);
    }

    #[tokio::test]
    async fn null_result_becomes_empty_object() {
        let handler = ScriptHandler;
        let config = json!({"script": "null"});
        let output = handler.execute(&ActivityInput::new(), &config, &ctx()).await.unwrap();
        assert_eq!(output, json!({}));
    }

    #[tokio::test]
    async fn missing_script_is_a_config_error() {
        let handler = ScriptHandler;
        assert!(handler.execute(&ActivityInput::new(), &json!({}), &ctx()).await.is_err());
    }
}
