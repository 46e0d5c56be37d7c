//! # Flowmesh Trigger
//!
//! Trigger handlers: the six ways a deployed process can be started
//! (spec §4.6). Every handler shares one lifecycle — `start` arms it,
//! `stop` tears it down — and owns whatever background task or mount
//! registration it needs to turn an external event into a call to
//! [`flowmesh_executor::ProcessExecutor::execute`].

pub mod mount;
pub mod soap_codec;

mod handlers;

use std::sync::Arc;

use async_trait::async_trait;
use flowmesh_dsl::{FlowDefinition, Trigger};
use flowmesh_error::FlowError;
use flowmesh_executor::ProcessExecutor;

pub use handlers::cron::CronTriggerHandler;
pub use handlers::manual::ManualTriggerHandler;
pub use handlers::mcp::McpTriggerHandler;
pub use handlers::rabbitmq::RabbitMqConsumerTriggerHandler;
pub use handlers::rest::RestTriggerHandler;
pub use handlers::soap::SoapTriggerHandler;
pub use mount::{RestMount, RestRegistry, SoapMount, SoapRegistry};

/// Common interface every trigger type implements.
#[async_trait]
pub trait TriggerHandler: Send + Sync {
    fn trigger_type(&self) -> &'static str;

    /// Arm the trigger: schedule a task, open a consumer, or register a
    /// mount. Rejects bad config synchronously (`FlowError::trigger_config`)
    /// rather than failing silently on the first event.
    async fn start(&self, executor: Arc<ProcessExecutor>, definition: FlowDefinition) -> Result<(), FlowError>;

    /// Tear the trigger down. Idempotent — stopping a trigger that was
    /// never started, or stopping it twice, is not an error.
    async fn stop(&self) -> Result<(), FlowError>;
}

/// Registries shared across every REST/SOAP-mounted trigger in the
/// process, threaded in by whoever owns the HTTP listener.
pub struct TriggerContext {
    pub rest: Arc<RestRegistry>,
    pub soap: Arc<SoapRegistry>,
}

impl TriggerContext {
    #[must_use]
    pub fn new(rest: Arc<RestRegistry>, soap: Arc<SoapRegistry>) -> Self {
        Self { rest, soap }
    }
}

/// Construct the handler for a trigger's declared `type`. The only
/// synchronous failure mode here is an unrecognized type — per-type
/// config validation happens in `start`.
pub fn build(trigger: &Trigger, ctx: &TriggerContext) -> Result<Arc<dyn TriggerHandler>, FlowError> {
    match trigger.trigger_type.as_str() {
        "manual" => Ok(Arc::new(ManualTriggerHandler::new())),
        "cron" => Ok(Arc::new(CronTriggerHandler::new(trigger.config.clone()))),
        "rabbitmq-consumer" => Ok(Arc::new(RabbitMqConsumerTriggerHandler::new(trigger.config.clone()))),
        "rest" => Ok(Arc::new(RestTriggerHandler::new(trigger.config.clone(), Arc::clone(&ctx.rest)))),
        "soap" => Ok(Arc::new(SoapTriggerHandler::new(trigger.config.clone(), Arc::clone(&ctx.soap)))),
        "mcp" => Ok(Arc::new(McpTriggerHandler::new(trigger.config.clone()))),
        other => Err(FlowError::trigger_config(format!("unknown trigger type `{other}`"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_rejects_unknown_trigger_type() {
        let ctx = TriggerContext::new(Arc::new(RestRegistry::new()), Arc::new(SoapRegistry::new()));
        let trigger = Trigger {
            id: flowmesh_core::TriggerId::new("t".to_owned()),
            trigger_type: "carrier-pigeon".to_owned(),
            config: serde_json::Value::Null,
        };
        assert!(build(&trigger, &ctx).is_err());
    }

    #[test]
    fn build_accepts_every_known_trigger_type() {
        let ctx = TriggerContext::new(Arc::new(RestRegistry::new()), Arc::new(SoapRegistry::new()));
        for kind in ["manual", "cron", "rabbitmq-consumer", "rest", "soap", "mcp"] {
            let trigger = Trigger {
                id: flowmesh_core::TriggerId::new("t".to_owned()),
                trigger_type: kind.to_owned(),
                config: serde_json::Value::Null,
            };
            assert!(build(&trigger, &ctx).is_ok(), "{kind} should build");
        }
    }
}
