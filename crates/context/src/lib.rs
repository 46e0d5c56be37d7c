//! # Flowmesh Context
//!
//! The per-run [`ExecutionContext`]: the trigger payload, each node's
//! captured `{output, status}`, and JSONPath-style resolution over both.
//!
//! Ownership: a context belongs to exactly one [`flowmesh_executor`]
//! invocation and is never shared across runs — callers construct one
//! per `Execute`/`ExecuteFromNode` call.

mod path;

pub use path::{PathError, get_value, resolve_input_mapping};

use std::fmt;

use flowmesh_core::{ExecutionId, NodeId, ProcessId};
use flowmesh_error::FlowError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome recorded against a node after the executor attempts it.
///
/// Set on every attempted node exactly once (invariant (b) of the data
/// model): a node that is skipped entirely by routing never gets an
/// entry here at all, which is how `$.nodes.<id>` resolution tells "not
/// yet run" apart from "ran and failed".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Success,
    Error,
    /// Set by `ExecuteFromNode` on the replay's start node.
    Replayed,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Replayed => "replayed",
        };
        f.write_str(s)
    }
}

/// What the context remembers about one node after it has been attempted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Present only after a successful (or replayed) attempt — invariant
    /// (a): output never appears before the handler returns success.
    pub output: Option<Value>,
    pub status: Option<NodeStatus>,
}

/// The per-run execution context.
///
/// `trigger` is set exactly once, at construction, and never mutated
/// afterward (invariant (c)); `nodes` grows monotonically as the walk
/// proceeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub execution_id: ExecutionId,
    pub process_id: ProcessId,
    trigger: Value,
    nodes: IndexMap<NodeId, NodeRecord>,
}

impl ExecutionContext {
    /// Create a new context for a run. `trigger_data` is frozen in at
    /// construction time; there is no later `set_trigger_data` — that
    /// would violate invariant (c), so the type simply doesn't expose one.
    #[must_use]
    pub fn new(execution_id: ExecutionId, process_id: ProcessId, trigger_data: Value) -> Self {
        Self {
            execution_id,
            process_id,
            trigger: trigger_data,
            nodes: IndexMap::new(),
        }
    }

    #[must_use]
    pub fn trigger(&self) -> &Value {
        &self.trigger
    }

    /// Store a node's successful output. Must be called before
    /// [`set_node_status`](Self::set_node_status) for that node, mirroring
    /// invariant (a) ("output appears only after the handler returned
    /// success").
    pub fn set_node_output(&mut self, node_id: NodeId, output: Value) {
        self.nodes.entry(node_id).or_default().output = Some(output);
    }

    pub fn set_node_status(&mut self, node_id: NodeId, status: NodeStatus) {
        self.nodes.entry(node_id).or_default().status = Some(status);
    }

    #[must_use]
    pub fn node(&self, node_id: &NodeId) -> Option<&NodeRecord> {
        self.nodes.get(node_id)
    }

    #[must_use]
    pub fn nodes(&self) -> &IndexMap<NodeId, NodeRecord> {
        &self.nodes
    }

    /// Resolve a JSONPath-style path (see [`path`] module) against this
    /// context's root pseudo-map (`{trigger, nodes}`).
    pub fn get_value(&self, jsonpath: &str) -> Result<Value, FlowError> {
        let root = self.as_root_value();
        get_value(&root, jsonpath).map_err(Into::into)
    }

    /// Resolve a node's `input_mapping`: string values starting with `$`
    /// are treated as JSONPath and substituted; anything else passes
    /// through verbatim. Fails the whole mapping on the first
    /// unresolvable path (per the data model's input-mapping semantics).
    pub fn resolve_input_mapping(
        &self,
        mapping: &IndexMap<String, Value>,
    ) -> Result<IndexMap<String, Value>, FlowError> {
        let root = self.as_root_value();
        resolve_input_mapping(&root, mapping).map_err(Into::into)
    }

    fn as_root_value(&self) -> Value {
        let nodes_obj: serde_json::Map<String, Value> = self
            .nodes
            .iter()
            .map(|(id, record)| (id.as_str().to_owned(), serde_json::to_value(record).unwrap_or(Value::Null)))
            .collect();

        let mut root = serde_json::Map::new();
        root.insert("trigger".to_owned(), self.trigger.clone());
        root.insert("nodes".to_owned(), Value::Object(nodes_obj));
        Value::Object(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(
            ExecutionId::new(),
            ProcessId::new("proc_1"),
            json!({"user": {"id": 7}}),
        )
    }

    #[test]
    fn trigger_is_observable_exactly_as_supplied() {
        let c = ctx();
        assert_eq!(c.get_value("$.trigger.user.id").unwrap(), json!(7));
    }

    #[test]
    fn node_output_visible_after_success() {
        let mut c = ctx();
        c.set_node_output(NodeId::new("n1"), json!({"value": 42}));
        c.set_node_status(NodeId::new("n1"), NodeStatus::Success);
        assert_eq!(
            c.get_value("$.nodes.n1.output.value").unwrap(),
            json!(42)
        );
        assert_eq!(
            c.node(&NodeId::new("n1")).unwrap().status,
            Some(NodeStatus::Success)
        );
    }

    #[test]
    fn missing_node_is_a_resolution_error() {
        let c = ctx();
        assert!(c.get_value("$.nodes.nope.output").is_err());
    }
}
