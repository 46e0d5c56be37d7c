//! Shared HTTP mount registries for the REST and SOAP trigger types.
//!
//! A REST or SOAP trigger handler does not own a listener itself — it
//! registers a mount into one of these process-wide registries, and the
//! server binary's single axum router dispatches incoming requests by
//! looking the path up here. `Deploy`/`Stop` just add/remove entries.

use std::collections::HashMap;
use std::sync::Arc;

use flowmesh_dsl::FlowDefinition;
use flowmesh_executor::ProcessExecutor;
use parking_lot::RwLock;
use serde_json::Value;

pub struct RestMount {
    pub executor: Arc<ProcessExecutor>,
    pub definition: FlowDefinition,
}

#[derive(Default)]
pub struct RestRegistry {
    mounts: RwLock<HashMap<String, Arc<RestMount>>>,
}

impl RestRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn key(method: &str, path: &str) -> String {
        format!("{} {}", method.to_ascii_uppercase(), path)
    }

    pub fn register(&self, method: &str, path: &str, mount: Arc<RestMount>) {
        self.mounts.write().insert(Self::key(method, path), mount);
    }

    pub fn deregister(&self, method: &str, path: &str) {
        self.mounts.write().remove(&Self::key(method, path));
    }

    #[must_use]
    pub fn lookup(&self, method: &str, path: &str) -> Option<Arc<RestMount>> {
        self.mounts.read().get(&Self::key(method, path)).cloned()
    }
}

/// The trigger payload shape a REST-mounted request builds: `{method,
/// headers, body, auth}`.
#[must_use]
pub fn rest_trigger_data(method: &str, headers: &Value, body: &Value, auth: &Value) -> Value {
    serde_json::json!({
        "method": method,
        "headers": headers,
        "body": body,
        "auth": auth,
    })
}

pub struct SoapMount {
    pub executor: Arc<ProcessExecutor>,
    pub definition: FlowDefinition,
    pub wsdl: Option<String>,
}

#[derive(Default)]
pub struct SoapRegistry {
    mounts: RwLock<HashMap<String, Arc<SoapMount>>>,
}

impl SoapRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, path: &str, mount: Arc<SoapMount>) {
        self.mounts.write().insert(path.to_owned(), mount);
    }

    pub fn deregister(&self, path: &str) {
        self.mounts.write().remove(path);
    }

    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<Arc<SoapMount>> {
        self.mounts.read().get(path).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowmesh_executor::ProcessExecutor;

    fn flow() -> FlowDefinition {
        FlowDefinition::from_json(
            r#"{"id": "p", "name": "demo", "trigger": {"id": "t", "type": "rest"}, "nodes": [], "transitions": []}"#,
        )
        .unwrap()
    }

    #[test]
    fn register_then_lookup_round_trips() {
        let registry = RestRegistry::new();
        let mount = Arc::new(RestMount {
            executor: Arc::new(ProcessExecutor::with_defaults()),
            definition: flow(),
        });
        registry.register("POST", "/orders", mount);
        assert!(registry.lookup("POST", "/orders").is_some());
        assert!(registry.lookup("GET", "/orders").is_none());
    }

    #[test]
    fn deregister_removes_the_mount() {
        let registry = RestRegistry::new();
        let mount = Arc::new(RestMount {
            executor: Arc::new(ProcessExecutor::with_defaults()),
            definition: flow(),
        });
        registry.register("POST", "/orders", mount);
        registry.deregister("POST", "/orders");
        assert!(registry.lookup("POST", "/orders").is_none());
    }
}
