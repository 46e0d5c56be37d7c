//! `file` activity: create/read/delete a local file.

use async_trait::async_trait;
use flowmesh_context::ExecutionContext;
use flowmesh_error::FlowError;
use serde_json::{json, Value};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::{ActivityHandler, ActivityInput};

#[derive(Default)]
pub struct FileHandler;

#[async_trait]
impl ActivityHandler for FileHandler {
    fn activity_type(&self) -> &'static str {
        "file"
    }

    async fn execute(
        &self,
        _input: &ActivityInput,
        config: &Value,
        _ctx: &ExecutionContext,
    ) -> Result<Value, FlowError> {
        let operation = config
            .get("operation")
            .and_then(Value::as_str)
            .ok_or_else(|| FlowError::config("file node requires `operation`"))?;
        let path = config
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| FlowError::config("file node requires `path`"))?;

        match operation {
            "create" => {
                let content = config.get("content").and_then(Value::as_str).unwrap_or_default();
                let mode = config.get("mode").and_then(Value::as_str).unwrap_or("overwrite");
                let mut file = if mode == "append" {
                    fs::OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(path)
                        .await
                        .map_err(|e| FlowError::activity(format!("cannot open `{path}`: {e}")))?
                } else {
                    fs::File::create(path)
                        .await
                        .map_err(|e| FlowError::activity(format!("cannot create `{path}`: {e}")))?
                };
                file.write_all(content.as_bytes())
                    .await
                    .map_err(|e| FlowError::activity(format!("write failed: {e}")))?;
                Ok(json!({ "created": true, "path": path }))
            }
            "read" => {
                let content = fs::read_to_string(path)
                    .await
                    .map_err(|e| FlowError::activity(format!("cannot read `{path}`: {e}")))?;
                Ok(json!({ "content": content }))
            }
            "delete" => {
                fs::remove_file(path)
                    .await
                    .map_err(|e| FlowError::activity(format!("cannot delete `{path}`: {e}")))?;
                Ok(json!({ "deleted": true }))
            }
            other => Err(FlowError::config(format!(
                "unsupported file operation `{other}`, expected create/read/delete"
            ))),
        }
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
    async fn create_then_read_then_delete_round_trips() {
        let handler = FileHandler;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo.txt");
        let path_str = path.to_str().unwrap();

        let create_config = json!({"operation": "create", "path": path_str, "content": "hi"});
        handler.execute(&ActivityInput::new(), &create_config, &ctx()).await.unwrap();

        let read_config = json!({"operation": "read", "path": path_str});
        let output = handler.execute(&ActivityInput::new(), &read_config, &ctx()).await.unwrap();
        assert_eq!(output["content"], "hi");

        let delete_config = json!({"operation": "delete", "path": path_str});
        handler.execute(&ActivityInput::new(), &delete_config, &ctx()).await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn unsupported_operation_is_a_config_error() {
        let handler = FileHandler;
        let config = json!({"operation": "move", "path": "/tmp/x"});
        assert!(handler.execute(&ActivityInput::new(), &config, &ctx()).await.is_err());
    }
}
