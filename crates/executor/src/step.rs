//! Per-node execution step (spec §4.5 "Per-node step").

use std::time::Duration;

use flowmesh_activity::{ActivityInput, ActivityRegistry};
use flowmesh_audit::{AuditEmitter, AuditEvent};
use flowmesh_context::{ExecutionContext, NodeStatus};
use flowmesh_core::{ExecutionId, NodeId, ProcessId};
use flowmesh_dsl::Node;
use flowmesh_error::FlowError;
use flowmesh_secret::SecretResolver;
use serde_json::Value;

fn input_to_value(input: &ActivityInput) -> Value {
    Value::Object(input.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
}

/// Resolve input mapping, merge secrets into a cloned config, dispatch
/// to the registered handler with retry, record the outcome on `ctx`,
/// and emit the node's audit event. Returns whether the node
/// succeeded.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn run_node(
    node: &Node,
    ctx: &mut ExecutionContext,
    registry: &ActivityRegistry,
    resolver: &SecretResolver,
    audit: &dyn AuditEmitter,
    execution_id: ExecutionId,
    flow_id: ProcessId,
) -> bool {
    let node_id = NodeId::new(node.id.clone());
    let mapping = node.input_mapping.clone().unwrap_or_default();

    let input = match ctx.resolve_input_mapping(&mapping) {
        Ok(input) => input,
        Err(err) => {
            fail(ctx, audit, execution_id, flow_id, node, node_id, Value::Null, &err).await;
            return false;
        }
    };
    let input_value = input_to_value(&input);

    let mut config = node.config.clone().unwrap_or_else(|| Value::Object(serde_json::Map::new()));
    if let Some(script) = &node.script {
        if let Some(object) = config.as_object_mut() {
            object.insert("script".to_owned(), Value::String(script.clone()));
        }
    }
    if let Some(secret_ref) = &node.secret_ref {
        match resolver.resolve(secret_ref).await {
            Ok(resolved) => {
                if let Some(object) = config.as_object_mut() {
                    for (key, value) in resolved.expose() {
                        object.insert(key.clone(), value.clone());
                    }
                }
            }
            Err(err) => {
                fail(ctx, audit, execution_id, flow_id, node, node_id, input_value, &err).await;
                return false;
            }
        }
    }

    let Some(handler) = registry.lookup(&node.node_type) else {
        let err = FlowError::unknown_activity(&node.node_type);
        fail(ctx, audit, execution_id, flow_id, node, node_id, input_value, &err).await;
        return false;
    };

    let policy = node.retry_policy.clone().unwrap_or_default();
    let max_attempts = policy.max_attempts.max(1);
    let mut outcome = Err(FlowError::activity("handler never invoked"));
    for attempt in 0..max_attempts {
        outcome = handler.execute(&input, &config, ctx).await;
        if outcome.is_ok() {
            break;
        }
        if attempt + 1 < max_attempts {
            tokio::time::sleep(Duration::from_secs(policy.interval)).await;
        }
    }

    match outcome {
        Ok(output) => {
            ctx.set_node_output(node_id.clone(), output.clone());
            ctx.set_node_status(node_id, NodeStatus::Success);
            audit
                .publish(AuditEvent::node(
                    execution_id,
                    flow_id,
                    node.id.clone(),
                    node.node_type.clone(),
                    "success",
                    input_value,
                    output,
                    None,
                ))
                .await;
            true
        }
        Err(err) => {
            fail(ctx, audit, execution_id, flow_id, node, node_id, input_value, &err).await;
            false
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn fail(
    ctx: &mut ExecutionContext,
    audit: &dyn AuditEmitter,
    execution_id: ExecutionId,
    flow_id: ProcessId,
    node: &Node,
    node_id: NodeId,
    input_value: Value,
    err: &FlowError,
) {
    ctx.set_node_status(node_id, NodeStatus::Error);
    audit
        .publish(AuditEvent::node(
            execution_id,
            flow_id,
            node.id.clone(),
            node.node_type.clone(),
            "error",
            input_value,
            Value::Null,
            Some(err.to_string()),
        ))
        .await;
}
