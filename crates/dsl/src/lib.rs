//! # Flowmesh DSL
//!
//! The flow definition data model (spec §3): trigger, nodes, and typed
//! transitions, as loaded from a JSON document and persisted verbatim
//! under the process id. This crate owns shape and synchronous
//! validation only — graph indexing and walking belong to the
//! executor.

use flowmesh_core::{ProcessId, TriggerId};
use flowmesh_error::FlowError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryType {
    Fixed,
    Exponential,
}

impl Default for RetryType {
    fn default() -> Self {
        Self::Fixed
    }
}

/// Per-node retry policy. `max_attempts` counts the first attempt, so
/// `1` (the default) means no retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub interval: u64,
    #[serde(default, rename = "type")]
    pub retry_type: RetryType,
}

fn default_max_attempts() -> u32 {
    1
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            interval: 0,
            retry_type: RetryType::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStrategy {
    Stop,
    Continue,
}

impl Default for ErrorStrategy {
    fn default() -> Self {
        Self::Stop
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_persistence")]
    pub persistence: bool,
    /// Advisory only — there is no execution-wide cancellation yet.
    pub timeout: Option<u64>,
    #[serde(default)]
    pub error_strategy: ErrorStrategy,
}

fn default_persistence() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            persistence: default_persistence(),
            timeout: None,
            error_strategy: ErrorStrategy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    pub id: TriggerId,
    #[serde(rename = "type")]
    pub trigger_type: String,
    #[serde(default)]
    pub config: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub input_mapping: Option<IndexMap<String, Value>>,
    #[serde(default)]
    pub config: Option<Value>,
    #[serde(default)]
    pub secret_ref: Option<String>,
    #[serde(default)]
    pub script: Option<String>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub retry_policy: Option<RetryPolicy>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionType {
    Success,
    Error,
    Condition,
    Nocondition,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub transition_type: TransitionType,
    #[serde(default)]
    pub condition: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowDefinition {
    pub id: ProcessId,
    #[serde(default)]
    pub version: u32,
    pub name: String,
    #[serde(default)]
    pub settings: Settings,
    pub trigger: Trigger,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub transitions: Vec<Transition>,
}

impl FlowDefinition {
    /// Parse and validate a flow document. Malformed JSON or a
    /// violated structural invariant is a config error (spec §7), not
    /// a panic — the flow simply does not start.
    pub fn from_json(raw: &str) -> Result<Self, FlowError> {
        let definition: Self =
            serde_json::from_str(raw).map_err(|e| FlowError::config(format!("malformed flow DSL: {e}")))?;
        definition.validate()?;
        Ok(definition)
    }

    /// Structural checks independent of graph walking: unique node
    /// ids, non-empty trigger id, and `condition` present iff the
    /// transition type requires it.
    pub fn validate(&self) -> Result<(), FlowError> {
        if self.trigger.id.as_str().is_empty() {
            return Err(FlowError::config("trigger.id must not be empty"));
        }
        if self.name.trim().is_empty() {
            return Err(FlowError::config("flow name must not be empty"));
        }

        let mut seen = IndexMap::new();
        for node in &self.nodes {
            if node.id.trim().is_empty() {
                return Err(FlowError::config("node id must not be empty"));
            }
            if seen.insert(node.id.clone(), ()).is_some() {
                return Err(FlowError::config(format!("duplicate node id `{}`", node.id)));
            }
        }

        for transition in &self.transitions {
            match transition.transition_type {
                TransitionType::Condition if transition.condition.is_none() => {
                    return Err(FlowError::config(format!(
                        "condition transition {} -> {} is missing `condition`",
                        transition.from, transition.to
                    )));
                }
                TransitionType::Success | TransitionType::Error | TransitionType::Nocondition
                    if transition.condition.is_some() =>
                {
                    return Err(FlowError::config(format!(
                        "transition {} -> {} of type {:?} must not set `condition`",
                        transition.from, transition.to, transition.transition_type
                    )));
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// True when the definition has no transitions and no node uses
    /// `next` — the executor then falls back to sequential mode.
    #[must_use]
    pub fn is_sequential(&self) -> bool {
        self.transitions.is_empty() && self.nodes.iter().all(|n| n.next.is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_json() -> &'static str {
        r#"{
            "id": "p1",
            "name": "demo",
            "trigger": {"id": "trg_01", "type": "manual"},
            "nodes": [{"id": "log_1", "type": "log"}],
            "transitions": [{"from": "trg_01", "to": "log_1", "type": "success"}]
        }"#
    }

    #[test]
    fn parses_minimal_flow() {
        let flow = FlowDefinition::from_json(minimal_json()).unwrap();
        assert_eq!(flow.nodes.len(), 1);
        assert!(!flow.is_sequential());
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        assert!(FlowDefinition::from_json("{not json").is_err());
    }

    #[test]
    fn duplicate_node_ids_are_rejected() {
        let raw = r#"{
            "id": "p1", "name": "demo",
            "trigger": {"id": "trg_01", "type": "manual"},
            "nodes": [{"id": "a", "type": "log"}, {"id": "a", "type": "log"}],
            "transitions": []
        }"#;
        assert!(FlowDefinition::from_json(raw).is_err());
    }

    #[test]
    fn condition_transition_without_condition_field_is_rejected() {
        let raw = r#"{
            "id": "p1", "name": "demo",
            "trigger": {"id": "trg_01", "type": "manual"},
            "nodes": [{"id": "a", "type": "log"}, {"id": "b", "type": "log"}],
            "transitions": [{"from": "a", "to": "b", "type": "condition"}]
        }"#;
        assert!(FlowDefinition::from_json(raw).is_err());
    }

    #[test]
    fn no_transitions_and_no_next_is_sequential() {
        let raw = r#"{
            "id": "p1", "name": "demo",
            "trigger": {"id": "trg_01", "type": "manual"},
            "nodes": [{"id": "a", "type": "log"}]
        }"#;
        let flow = FlowDefinition::from_json(raw).unwrap();
        assert!(flow.is_sequential());
    }
}
