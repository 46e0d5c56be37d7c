//! `mail` activity: send via SMTP, or stub-receive.

use async_trait::async_trait;
use flowmesh_context::ExecutionContext;
use flowmesh_error::FlowError;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde_json::{json, Value};

use crate::{ActivityHandler, ActivityInput};

#[derive(Default)]
pub struct MailHandler;

fn str_field<'a>(config: &'a Value, key: &str) -> Option<&'a str> {
    config.get(key).and_then(Value::as_str)
}

fn auth_field<'a>(config: &'a Value, key: &str) -> Option<&'a str> {
    config
        .get("auth")
        .and_then(|auth| auth.get(key))
        .and_then(Value::as_str)
        .or_else(|| str_field(config, key))
}

async fn send(config: &Value) -> Result<Value, FlowError> {
    let host = str_field(config, "host").ok_or_else(|| FlowError::config("mail node requires `host`"))?;
    let to = str_field(config, "to").ok_or_else(|| FlowError::config("mail node requires `to`"))?;
    let from = str_field(config, "from").ok_or_else(|| FlowError::config("mail node requires `from`"))?;
    let subject = str_field(config, "subject").unwrap_or_default();
    let body = str_field(config, "body").unwrap_or_default();
    let security = str_field(config, "security").unwrap_or("STARTTLS");

    let to_mailbox: Mailbox = to
        .parse()
        .map_err(|e| FlowError::config(format!("invalid `to` address: {e}")))?;
    let from_mailbox: Mailbox = from
        .parse()
        .map_err(|e| FlowError::config(format!("invalid `from` address: {e}")))?;

    let mut builder = Message::builder().from(from_mailbox).to(to_mailbox).subject(subject);
    if let Some(cc) = str_field(config, "cc") {
        let cc: Mailbox = cc.parse().map_err(|e| FlowError::config(format!("invalid `cc` address: {e}")))?;
        builder = builder.cc(cc);
    }
    let content_type = str_field(config, "content_type").unwrap_or("text/plain");
    let email = if content_type.contains("html") {
        builder
            .header(lettre::message::header::ContentType::TEXT_HTML)
            .body(body.to_owned())
    } else {
        builder.body(body.to_owned())
    }
    .map_err(|e| FlowError::activity(format!("cannot build message: {e}")))?;

    let mut transport_builder = match security {
        "TLS" => AsyncSmtpTransport::<Tokio1Executor>::relay(host),
        "NONE" => Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)),
        _ => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host),
    }
    .map_err(|e| FlowError::config(format!("invalid mail host: {e}")))?;

    if let (Some(user), Some(password)) = (auth_field(config, "user"), auth_field(config, "password")) {
        transport_builder = transport_builder.credentials(Credentials::new(user.to_owned(), password.to_owned()));
    }

    let transport = transport_builder.build();
    let response = transport
        .send(email)
        .await
        .map_err(|e| FlowError::activity(format!("smtp send failed: {e}")))?;

    Ok(json!({
        "sent": true,
        "message_id": response.message().collect::<Vec<_>>().join(""),
    }))
}

#[async_trait]
impl ActivityHandler for MailHandler {
    fn activity_type(&self) -> &'static str {
        "mail"
    }

    async fn execute(
        &self,
        _input: &ActivityInput,
        config: &Value,
        _ctx: &ExecutionContext,
    ) -> Result<Value, FlowError> {
        match config.get("action").and_then(Value::as_str).unwrap_or("send") {
            "send" => send(config).await,
            "receive" => Ok(json!({ "messages": [] })),
            other => Err(FlowError::config(format!(
                "unsupported mail action `{other}`, expected `send` or `receive`"
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
    async fn receive_is_a_stub_returning_empty_list() {
        let handler = MailHandler;
        let config = json!({"action": "receive"});
        let output = handler.execute(&ActivityInput::new(), &config, &ctx()).await.unwrap();
        assert_eq!(output["messages"], json!([]));
    }

    #[tokio::test]
    async fn send_missing_host_is_a_config_error() {
        let handler = MailHandler;
        let config = json!({"action": "send", "to": "a@b.com", "from": "c@d.com"});
        assert!(handler.execute(&ActivityInput::new(), &config, &ctx()).await.is_err());
    }
}
