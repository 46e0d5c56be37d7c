//! # Flowmesh Executor
//!
//! The graph walker (spec §4.5): runs nodes, collects outputs, routes
//! by transition kind, retries, emits audit events, and supports full
//! and partial replay.

mod graph;
mod step;

use std::collections::HashSet;
use std::sync::Arc;

use async_recursion::async_recursion;
use flowmesh_activity::ActivityRegistry;
use flowmesh_audit::{AuditEmitter, AuditEvent, NoopAuditEmitter};
use flowmesh_context::{ExecutionContext, NodeStatus};
use flowmesh_core::{ExecutionId, NodeId};
use flowmesh_dsl::{ErrorStrategy, FlowDefinition, Node};
use flowmesh_error::FlowError;
use flowmesh_secret::SecretResolver;
use serde_json::Value;

use graph::Graph;

pub struct ProcessExecutor {
    registry: ActivityRegistry,
    resolver: Arc<SecretResolver>,
    audit: Arc<dyn AuditEmitter>,
}

impl ProcessExecutor {
    #[must_use]
    pub fn new(registry: ActivityRegistry, resolver: Arc<SecretResolver>, audit: Arc<dyn AuditEmitter>) -> Self {
        Self {
            registry,
            resolver,
            audit,
        }
    }

    /// An executor with the built-in activity registry, a no-op secret
    /// resolver, and a no-op audit emitter — wire in real ones for
    /// production deployments.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(
            ActivityRegistry::with_builtins(),
            Arc::new(SecretResolver::noop()),
            Arc::new(NoopAuditEmitter),
        )
    }

    /// Run a flow from its trigger. Always returns a context — even a
    /// fatal execution error is recorded on `Err`, with the context
    /// reflecting every node that did execute before the failure.
    pub async fn execute(
        &self,
        definition: &FlowDefinition,
        trigger_data: Value,
    ) -> (ExecutionContext, Result<(), FlowError>) {
        let execution_id = ExecutionId::new();
        let mut ctx = ExecutionContext::new(execution_id.clone(), definition.id.clone(), trigger_data.clone());

        self.audit
            .publish(AuditEvent::lifecycle(
                execution_id.clone(),
                definition.id.clone(),
                "started",
                trigger_data,
                None,
            ))
            .await;

        let result = self.run_graph(definition, &mut ctx, execution_id.clone()).await;

        let status = match &result {
            Ok(()) => "completed",
            Err(_) => "failed",
        };
        self.audit
            .publish(AuditEvent::lifecycle(
                execution_id,
                definition.id.clone(),
                status,
                Value::Null,
                result.as_ref().err().map(ToString::to_string),
            ))
            .await;

        (ctx, result)
    }

    /// Resume a run from `start_node_id` with a previously-captured
    /// output, per spec §4.5's partial replay contract. The start node
    /// is marked `replayed` rather than re-executed.
    pub async fn execute_from_node(
        &self,
        definition: &FlowDefinition,
        start_node_id: &str,
        injected_output: Value,
        execution_id_hint: Option<ExecutionId>,
    ) -> (ExecutionContext, Result<(), FlowError>) {
        let execution_id = execution_id_hint.unwrap_or_default();
        let mut ctx = ExecutionContext::new(execution_id.clone(), definition.id.clone(), Value::Object(serde_json::Map::new()));

        let node_id = NodeId::new(start_node_id.to_owned());
        ctx.set_node_output(node_id.clone(), injected_output);
        ctx.set_node_status(node_id, NodeStatus::Replayed);

        self.audit
            .publish(AuditEvent::lifecycle(
                execution_id.clone(),
                definition.id.clone(),
                "replayed",
                Value::Null,
                None,
            ))
            .await;

        let graph = Graph::build(definition);
        let mut visited = HashSet::new();
        let result = self
            .route_children(start_node_id, &graph, &mut ctx, &mut visited, execution_id.clone())
            .await;

        let status = match &result {
            Ok(()) => "completed",
            Err(_) => "failed",
        };
        self.audit
            .publish(AuditEvent::lifecycle(
                execution_id,
                definition.id.clone(),
                status,
                Value::Null,
                result.as_ref().err().map(ToString::to_string),
            ))
            .await;

        (ctx, result)
    }

    async fn run_graph(
        &self,
        definition: &FlowDefinition,
        ctx: &mut ExecutionContext,
        execution_id: ExecutionId,
    ) -> Result<(), FlowError> {
        if definition.is_sequential() {
            return self.run_sequential(definition, ctx, execution_id).await;
        }

        let graph = Graph::build(definition);
        let mut visited = HashSet::new();
        for start in graph.start_nodes() {
            self.walk(start, &graph, ctx, &mut visited, execution_id.clone()).await?;
        }
        Ok(())
    }

    async fn run_sequential(
        &self,
        definition: &FlowDefinition,
        ctx: &mut ExecutionContext,
        execution_id: ExecutionId,
    ) -> Result<(), FlowError> {
        for node in &definition.nodes {
            let succeeded = step::run_node(
                node,
                ctx,
                &self.registry,
                &self.resolver,
                self.audit.as_ref(),
                execution_id.clone(),
                definition.id.clone(),
            )
            .await;
            if !succeeded {
                return Err(FlowError::activity(format!("node `{}` failed", node.id)));
            }
        }
        Ok(())
    }

    #[async_recursion]
    async fn walk<'a>(
        &self,
        node_id: &'a str,
        graph: &Graph<'a>,
        ctx: &mut ExecutionContext,
        visited: &mut HashSet<String>,
        execution_id: ExecutionId,
    ) -> Result<(), FlowError> {
        if !visited.insert(node_id.to_owned()) {
            return Err(FlowError::cycle(node_id));
        }

        let node: &Node = graph
            .nodes
            .get(node_id)
            .copied()
            .ok_or_else(|| FlowError::config(format!("transition references unknown node `{node_id}`")))?;

        let flow_id = ctx.process_id.clone();
        let succeeded = step::run_node(
            node,
            ctx,
            &self.registry,
            &self.resolver,
            self.audit.as_ref(),
            execution_id.clone(),
            flow_id,
        )
        .await;

        if succeeded {
            self.route_children(node_id, graph, ctx, visited, execution_id).await
        } else {
            self.route_error(node_id, graph, ctx, visited, execution_id).await
        }
    }

    async fn route_error<'a>(
        &self,
        node_id: &'a str,
        graph: &Graph<'a>,
        ctx: &mut ExecutionContext,
        visited: &mut HashSet<String>,
        execution_id: ExecutionId,
    ) -> Result<(), FlowError> {
        let transitions = graph.outgoing(node_id);
        let error_edges = Graph::error_edges(transitions);
        if error_edges.is_empty() {
            return match graph.error_strategy {
                ErrorStrategy::Continue => Ok(()),
                ErrorStrategy::Stop => Err(FlowError::activity(format!("node `{node_id}` failed with no error transition"))),
            };
        }

        let mut any_absorbed = false;
        for edge in &error_edges {
            if self
                .walk(edge.to.as_str(), graph, ctx, visited, execution_id.clone())
                .await
                .is_ok()
            {
                any_absorbed = true;
            }
        }

        if any_absorbed {
            Ok(())
        } else {
            Err(FlowError::activity(format!(
                "node `{node_id}` failed and no error branch recovered"
            )))
        }
    }

    async fn route_children<'a>(
        &self,
        node_id: &'a str,
        graph: &Graph<'a>,
        ctx: &mut ExecutionContext,
        visited: &mut HashSet<String>,
        execution_id: ExecutionId,
    ) -> Result<(), FlowError> {
        let transitions = graph.outgoing(node_id);
        let condition_edges = Graph::condition_edges(transitions);
        let nocondition_edges = Graph::nocondition_edges(transitions);
        let success_edges = Graph::success_edges(transitions);

        if !condition_edges.is_empty() || !nocondition_edges.is_empty() {
            for edge in &condition_edges {
                let expression = edge.condition.as_deref().unwrap_or("false");
                if flowmesh_condition::evaluate(expression, ctx) {
                    return self.walk(edge.to.as_str(), graph, ctx, visited, execution_id).await;
                }
            }
            for edge in &nocondition_edges {
                self.walk(edge.to.as_str(), graph, ctx, visited, execution_id.clone()).await?;
            }
            return Ok(());
        }

        for edge in &success_edges {
            self.walk(edge.to.as_str(), graph, ctx, visited, execution_id.clone()).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn flow(json: &str) -> FlowDefinition {
        FlowDefinition::from_json(json).unwrap()
    }

    #[tokio::test]
    async fn scenario_1_trigger_to_node_transition() {
        let definition = flow(
            r#"{
                "id": "p", "name": "demo",
                "trigger": {"id": "trg_01", "type": "manual"},
                "nodes": [{"id": "log_1", "type": "log", "config": {"level": "info"}}],
                "transitions": [{"from": "trg_01", "to": "log_1", "type": "success"}]
            }"#,
        );
        let executor = ProcessExecutor::with_defaults();
        let (ctx, result) = executor.execute(&definition, json!({})).await;
        assert!(result.is_ok());
        assert_eq!(ctx.node(&NodeId::new("log_1")).unwrap().status, Some(NodeStatus::Success));
    }

    #[tokio::test]
    async fn scenario_2_condition_true_branch() {
        let definition = flow(
            r#"{
                "id": "p", "name": "demo",
                "trigger": {"id": "trg_01", "type": "manual"},
                "nodes": [
                    {"id": "script_node", "type": "script", "config": {"script": "({value: 42})"}},
                    {"id": "on_true", "type": "log"},
                    {"id": "on_false", "type": "log"}
                ],
                "transitions": [
                    {"from": "trg_01", "to": "script_node", "type": "success"},
                    {"from": "script_node", "to": "on_true", "type": "condition", "condition": "$.nodes.script_node.output.value === 42"},
                    {"from": "script_node", "to": "on_false", "type": "nocondition"}
                ]
            }"#,
        );
        let executor = ProcessExecutor::with_defaults();
        let (ctx, result) = executor.execute(&definition, json!({})).await;
        assert!(result.is_ok());
        assert_eq!(ctx.node(&NodeId::new("on_true")).unwrap().status, Some(NodeStatus::Success));
        assert!(ctx.node(&NodeId::new("on_false")).is_none());
    }

    #[tokio::test]
    async fn scenario_3_nocondition_fallback() {
        let definition = flow(
            r#"{
                "id": "p", "name": "demo",
                "trigger": {"id": "trg_01", "type": "manual"},
                "nodes": [
                    {"id": "script_node", "type": "script", "config": {"script": "({value: 99})"}},
                    {"id": "on_true", "type": "log"},
                    {"id": "on_false", "type": "log"}
                ],
                "transitions": [
                    {"from": "trg_01", "to": "script_node", "type": "success"},
                    {"from": "script_node", "to": "on_true", "type": "condition", "condition": "$.nodes.script_node.output.value === 42"},
                    {"from": "script_node", "to": "on_false", "type": "nocondition"}
                ]
            }"#,
        );
        let executor = ProcessExecutor::with_defaults();
        let (ctx, result) = executor.execute(&definition, json!({})).await;
        assert!(result.is_ok());
        assert!(ctx.node(&NodeId::new("on_true")).is_none());
        assert_eq!(ctx.node(&NodeId::new("on_false")).unwrap().status, Some(NodeStatus::Success));
    }

    #[tokio::test]
    async fn scenario_4_error_routing_is_absorbed() {
        let definition = flow(
            r#"{
                "id": "p", "name": "demo",
                "trigger": {"id": "trg_01", "type": "manual"},
                "nodes": [
                    {"id": "bad", "type": "not_a_real_type"},
                    {"id": "on_error", "type": "log"}
                ],
                "transitions": [
                    {"from": "trg_01", "to": "bad", "type": "success"},
                    {"from": "bad", "to": "on_error", "type": "error"}
                ]
            }"#,
        );
        let executor = ProcessExecutor::with_defaults();
        let (ctx, result) = executor.execute(&definition, json!({})).await;
        assert!(result.is_ok());
        assert_eq!(ctx.node(&NodeId::new("bad")).unwrap().status, Some(NodeStatus::Error));
        assert_eq!(ctx.node(&NodeId::new("on_error")).unwrap().status, Some(NodeStatus::Success));
    }

    #[tokio::test]
    async fn scenario_5_http_node_unreachable_host_is_a_successful_output() {
        let definition = flow(
            r#"{
                "id": "p", "name": "demo",
                "trigger": {"id": "trg_01", "type": "manual"},
                "nodes": [{"id": "http_node", "type": "http", "config": {"url": "http://127.0.0.1:1"}}],
                "transitions": [{"from": "trg_01", "to": "http_node", "type": "success"}]
            }"#,
        );
        let executor = ProcessExecutor::with_defaults();
        let (ctx, result) = executor.execute(&definition, json!({})).await;
        assert!(result.is_ok());
        let record = ctx.node(&NodeId::new("http_node")).unwrap();
        assert_eq!(record.status, Some(NodeStatus::Success));
        let output = record.output.as_ref().unwrap();
        assert_eq!(output["status_code"], 0);
        assert!(output["error"].is_string());
    }

    #[tokio::test]
    async fn scenario_6_partial_replay() {
        let definition = flow(
            r#"{
                "id": "p", "name": "demo",
                "trigger": {"id": "trg_01", "type": "manual"},
                "nodes": [
                    {"id": "start_node", "type": "log"},
                    {"id": "on_true", "type": "log"},
                    {"id": "on_false", "type": "log"}
                ],
                "transitions": [
                    {"from": "trg_01", "to": "start_node", "type": "success"},
                    {"from": "start_node", "to": "on_true", "type": "condition", "condition": "$.nodes.start_node.output.score > 50"},
                    {"from": "start_node", "to": "on_false", "type": "nocondition"}
                ]
            }"#,
        );
        let executor = ProcessExecutor::with_defaults();
        let (ctx, result) = executor
            .execute_from_node(&definition, "start_node", json!({"score": 75}), None)
            .await;
        assert!(result.is_ok());
        assert_eq!(
            ctx.node(&NodeId::new("start_node")).unwrap().status,
            Some(NodeStatus::Replayed)
        );
        assert_eq!(ctx.node(&NodeId::new("on_true")).unwrap().status, Some(NodeStatus::Success));
        assert!(ctx.node(&NodeId::new("on_false")).is_none());
    }

    #[tokio::test]
    async fn boundary_empty_node_list_completes_without_error() {
        let definition = flow(
            r#"{
                "id": "p", "name": "demo",
                "trigger": {"id": "trg_01", "type": "manual"},
                "nodes": [],
                "transitions": []
            }"#,
        );
        let executor = ProcessExecutor::with_defaults();
        let (_ctx, result) = executor.execute(&definition, json!({})).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn boundary_cycle_is_detected() {
        let definition = flow(
            r#"{
                "id": "p", "name": "demo",
                "trigger": {"id": "trg_01", "type": "manual"},
                "nodes": [{"id": "a", "type": "log"}, {"id": "b", "type": "log"}],
                "transitions": [
                    {"from": "trg_01", "to": "a", "type": "success"},
                    {"from": "a", "to": "b", "type": "success"},
                    {"from": "b", "to": "a", "type": "success"}
                ]
            }"#,
        );
        let executor = ProcessExecutor::with_defaults();
        let (_ctx, result) = executor.execute(&definition, json!({})).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn error_strategy_stop_fails_a_node_with_no_error_edge() {
        let definition = flow(
            r#"{
                "id": "p", "name": "demo",
                "trigger": {"id": "trg_01", "type": "manual"},
                "nodes": [{"id": "bad", "type": "not_a_real_type"}],
                "transitions": [{"from": "trg_01", "to": "bad", "type": "success"}]
            }"#,
        );
        let executor = ProcessExecutor::with_defaults();
        let (_ctx, result) = executor.execute(&definition, json!({})).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn error_strategy_continue_absorbs_a_node_with_no_error_edge() {
        let definition = flow(
            r#"{
                "id": "p", "name": "demo",
                "settings": {"error_strategy": "continue"},
                "trigger": {"id": "trg_01", "type": "manual"},
                "nodes": [{"id": "bad", "type": "not_a_real_type"}],
                "transitions": [{"from": "trg_01", "to": "bad", "type": "success"}]
            }"#,
        );
        let executor = ProcessExecutor::with_defaults();
        let (ctx, result) = executor.execute(&definition, json!({})).await;
        assert!(result.is_ok());
        assert_eq!(ctx.node(&NodeId::new("bad")).unwrap().status, Some(NodeStatus::Error));
    }

    #[tokio::test]
    async fn sequential_mode_failure_is_fatal_even_with_error_strategy_continue() {
        let definition = flow(
            r#"{
                "id": "p", "name": "demo",
                "settings": {"error_strategy": "continue"},
                "trigger": {"id": "trg_01", "type": "manual"},
                "nodes": [
                    {"id": "bad", "type": "not_a_real_type"},
                    {"id": "after", "type": "log"}
                ]
            }"#,
        );
        let executor = ProcessExecutor::with_defaults();
        let (ctx, result) = executor.execute(&definition, json!({})).await;
        assert!(result.is_err());
        assert!(ctx.node(&NodeId::new("after")).is_none());
    }
}
