//! Graph indexing for a flow definition (spec §4.5 "Graph mode", step 1-2).

use indexmap::IndexMap;

use flowmesh_dsl::{ErrorStrategy, FlowDefinition, Node, Transition, TransitionType};

pub struct Graph<'a> {
    pub nodes: IndexMap<&'a str, &'a Node>,
    pub edges_from: IndexMap<&'a str, Vec<&'a Transition>>,
    /// Governs a node with no outgoing `error` edge: `Continue` treats
    /// that branch as simply ending, `Stop` propagates the failure.
    pub error_strategy: ErrorStrategy,
    trigger_id: &'a str,
}

impl<'a> Graph<'a> {
    pub fn build(definition: &'a FlowDefinition) -> Self {
        let nodes: IndexMap<&str, &Node> = definition.nodes.iter().map(|n| (n.id.as_str(), n)).collect();

        let mut edges_from: IndexMap<&str, Vec<&Transition>> = IndexMap::new();
        for transition in &definition.transitions {
            edges_from.entry(transition.from.as_str()).or_default().push(transition);
        }

        Self {
            nodes,
            edges_from,
            error_strategy: definition.settings.error_strategy,
            trigger_id: definition.trigger.id.as_str(),
        }
    }

    /// Nodes with no incoming edge whose `from` is itself a node id.
    /// An incoming edge from the trigger does not disqualify a node —
    /// the trigger is not in `nodes` but very commonly is a `from`.
    pub fn start_nodes(&self) -> Vec<&'a str> {
        let mut has_node_predecessor: IndexMap<&str, bool> = IndexMap::new();
        for id in self.nodes.keys() {
            has_node_predecessor.insert(id, false);
        }
        for targets in self.edges_from.values() {
            for transition in targets {
                if self.nodes.contains_key(transition.from.as_str()) {
                    if let Some(flag) = has_node_predecessor.get_mut(transition.to.as_str()) {
                        *flag = true;
                    }
                }
            }
        }
        self.nodes
            .keys()
            .copied()
            .filter(|id| !has_node_predecessor.get(id).copied().unwrap_or(false))
            .collect()
    }

    pub fn outgoing(&self, node_id: &str) -> &[&'a Transition] {
        self.edges_from.get(node_id).map_or(&[], Vec::as_slice)
    }

    pub fn error_edges(transitions: &[&'a Transition]) -> Vec<&'a Transition> {
        transitions
            .iter()
            .copied()
            .filter(|t| t.transition_type == TransitionType::Error)
            .collect()
    }

    pub fn condition_edges(transitions: &[&'a Transition]) -> Vec<&'a Transition> {
        transitions
            .iter()
            .copied()
            .filter(|t| t.transition_type == TransitionType::Condition)
            .collect()
    }

    pub fn nocondition_edges(transitions: &[&'a Transition]) -> Vec<&'a Transition> {
        transitions
            .iter()
            .copied()
            .filter(|t| t.transition_type == TransitionType::Nocondition)
            .collect()
    }

    pub fn success_edges(transitions: &[&'a Transition]) -> Vec<&'a Transition> {
        transitions
            .iter()
            .copied()
            .filter(|t| t.transition_type == TransitionType::Success)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flow(json: &str) -> FlowDefinition {
        FlowDefinition::from_json(json).unwrap()
    }

    #[test]
    fn trigger_as_from_does_not_disqualify_start_node() {
        let definition = flow(
            r#"{
                "id": "p", "name": "demo",
                "trigger": {"id": "trg_01", "type": "manual"},
                "nodes": [{"id": "log_1", "type": "log"}],
                "transitions": [{"from": "trg_01", "to": "log_1", "type": "success"}]
            }"#,
        );
        let graph = Graph::build(&definition);
        assert_eq!(graph.start_nodes(), vec!["log_1"]);
    }

    #[test]
    fn node_with_node_predecessor_is_not_a_start_node() {
        let definition = flow(
            r#"{
                "id": "p", "name": "demo",
                "trigger": {"id": "trg_01", "type": "manual"},
                "nodes": [{"id": "a", "type": "log"}, {"id": "b", "type": "log"}],
                "transitions": [
                    {"from": "trg_01", "to": "a", "type": "success"},
                    {"from": "a", "to": "b", "type": "success"}
                ]
            }"#,
        );
        let graph = Graph::build(&definition);
        assert_eq!(graph.start_nodes(), vec!["a"]);
    }
}
