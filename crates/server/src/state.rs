use std::sync::Arc;

use flowmesh_executor::ProcessExecutor;
use flowmesh_manager::TriggerManager;
use flowmesh_secret::{MasterKey, SecretStore};
use flowmesh_store::ProcessStore;
use flowmesh_trigger::{RestRegistry, SoapRegistry};

#[derive(Clone)]
pub struct AppState {
    pub processes: Arc<dyn ProcessStore>,
    pub secrets: Arc<dyn SecretStore>,
    pub master_key: Arc<MasterKey>,
    pub executor: Arc<ProcessExecutor>,
    pub manager: Arc<TriggerManager>,
    pub rest: Arc<RestRegistry>,
    pub soap: Arc<SoapRegistry>,
}
