//! `http` activity: arbitrary HTTP request with optional injected auth.

use std::time::Duration;

use async_trait::async_trait;
use flowmesh_context::ExecutionContext;
use flowmesh_error::FlowError;
use reqwest::Method;
use serde_json::{json, Value};

use crate::{ActivityHandler, ActivityInput};

pub struct HttpHandler {
    client: reqwest::Client,
}

impl Default for HttpHandler {
    fn default() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

fn str_field<'a>(config: &'a Value, key: &str) -> Option<&'a str> {
    config.get(key).and_then(Value::as_str)
}

#[async_trait]
impl ActivityHandler for HttpHandler {
    fn activity_type(&self) -> &'static str {
        "http"
    }

    async fn execute(
        &self,
        _input: &ActivityInput,
        config: &Value,
        _ctx: &ExecutionContext,
    ) -> Result<Value, FlowError> {
        let url = str_field(config, "url").ok_or_else(|| FlowError::config("http node requires `url`"))?;

        let method = str_field(config, "method")
            .map(str::to_uppercase)
            .unwrap_or_else(|| "GET".to_owned());
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|e| FlowError::config(format!("invalid http method: {e}")))?;

        let timeout_secs = config.get("timeout").and_then(Value::as_u64).unwrap_or(30);

        let mut builder = self
            .client
            .request(method, url)
            .timeout(Duration::from_secs(timeout_secs));

        if let Some(headers) = config.get("headers").and_then(Value::as_object) {
            for (name, value) in headers {
                if let Some(value) = value.as_str() {
                    builder = builder.header(name, value);
                }
            }
        }

        let has_explicit_auth = config
            .get("headers")
            .and_then(Value::as_object)
            .is_some_and(|h| h.contains_key("Authorization"));

        if !has_explicit_auth {
            if let Some(token) = str_field(config, "token") {
                builder = builder.bearer_auth(token);
            } else if let (Some(user), Some(password)) = (str_field(config, "user"), str_field(config, "password")) {
                builder = builder.basic_auth(user, Some(password));
            }
        }

        match builder.send().await {
            Ok(response) => {
                let status_code = response.status().as_u16();
                let headers: serde_json::Map<String, Value> = response
                    .headers()
                    .iter()
                    .map(|(k, v)| (k.to_string(), json!(v.to_str().unwrap_or_default())))
                    .collect();
                let body = response.text().await.unwrap_or_default();
                let error = if status_code >= 400 {
                    Some(format!("http status {status_code}"))
                } else {
                    None
                };
                Ok(json!({
                    "status_code": status_code,
                    "body": body,
                    "headers": Value::Object(headers),
                    "error": error,
                }))
            }
            Err(err) => Ok(json!({
                "status_code": 0,
                "body": "",
                "headers": {},
                "error": err.to_string(),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowmesh_core::{ExecutionId, ProcessId};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(ExecutionId::new(), ProcessId::new("p"), json!({}))
    }

    #[test]
    fn missing_url_is_a_config_error() {
        let handler = HttpHandler::default();
        let rt = tokio::runtime::Runtime::new().unwrap();
        let result = rt.block_on(handler.execute(&ActivityInput::new(), &json!({}), &ctx()));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn unreachable_host_is_a_successful_output_with_error_field() {
        let handler = HttpHandler::default();
        let config = json!({"url": "http://127.0.0.1:1"});
        let output = handler.execute(&ActivityInput::new(), &config, &ctx()).await.unwrap();
        assert_eq!(output["status_code"], 0);
        assert!(output["error"].is_string());
    }

    #[tokio::test]
    async fn successful_response_is_captured_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .mount(&server)
            .await;

        let handler = HttpHandler::default();
        let config = json!({"url": format!("{}/ok", server.uri())});
        let output = handler.execute(&ActivityInput::new(), &config, &ctx()).await.unwrap();
        assert_eq!(output["status_code"], 200);
        assert_eq!(output["body"], "hello");
    }
}
