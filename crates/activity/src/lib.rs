//! # Flowmesh Activity
//!
//! The activity registry and the built-in node handlers (spec §4.2).
//! Every handler implements the same contract: resolved `input`,
//! secret-merged `config`, and a read-only view of the run's
//! [`ExecutionContext`] in, a JSON output map or a [`FlowError`] out.

pub mod handlers;

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use flowmesh_context::ExecutionContext;
use flowmesh_error::FlowError;
use indexmap::IndexMap;
use serde_json::Value;

/// Resolved input mapping, keyed by the node's `input_mapping` target
/// keys.
pub type ActivityInput = IndexMap<String, Value>;

/// A uniform node handler. Implementations must not panic on bad
/// input — translate it into a [`FlowError`] so the executor can route
/// it through an `error` transition.
#[async_trait]
pub trait ActivityHandler: Send + Sync {
    fn activity_type(&self) -> &'static str;

    async fn execute(
        &self,
        input: &ActivityInput,
        config: &Value,
        ctx: &ExecutionContext,
    ) -> Result<Value, FlowError>;
}

/// Maps activity type names to handler implementations.
#[derive(Default, Clone)]
pub struct ActivityRegistry {
    handlers: Arc<DashMap<String, Arc<dyn ActivityHandler>>>,
}

impl ActivityRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, handler: Arc<dyn ActivityHandler>) {
        self.handlers.insert(handler.activity_type().to_owned(), handler);
    }

    #[must_use]
    pub fn lookup(&self, activity_type: &str) -> Option<Arc<dyn ActivityHandler>> {
        self.handlers.get(activity_type).map(|entry| Arc::clone(entry.value()))
    }

    /// A registry with every built-in handler (spec §4.2) registered.
    #[must_use]
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        handlers::register_builtins(&registry);
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl ActivityHandler for Echo {
        fn activity_type(&self) -> &'static str {
            "echo"
        }

        async fn execute(
            &self,
            input: &ActivityInput,
            _config: &Value,
            _ctx: &ExecutionContext,
        ) -> Result<Value, FlowError> {
            Ok(Value::Object(
                input.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            ))
        }
    }

    #[test]
    fn lookup_returns_none_for_unregistered_type() {
        let registry = ActivityRegistry::new();
        assert!(registry.lookup("echo").is_none());
    }

    #[test]
    fn registered_handler_is_found_by_type() {
        let registry = ActivityRegistry::new();
        registry.register(Arc::new(Echo));
        assert!(registry.lookup("echo").is_some());
    }
}
