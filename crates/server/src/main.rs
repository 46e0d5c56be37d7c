//! The flowmesh server binary: loads config, wires every crate
//! together, redeploys previously-deployed processes, and serves the
//! management API plus the REST/SOAP trigger mounts.

mod error;
mod routes;
mod state;

use std::sync::Arc;

use flowmesh_activity::ActivityRegistry;
use flowmesh_audit::{AuditEmitter, NatsAuditEmitter, NoopAuditEmitter};
use flowmesh_config::ServerConfig;
use flowmesh_executor::ProcessExecutor;
use flowmesh_manager::TriggerManager;
use flowmesh_secret::{MasterKey, PostgresSecretStore, SecretResolver, SecretStore};
use flowmesh_store::{PostgresProcessStore, ProcessStatus, ProcessStore};
use flowmesh_trigger::{RestRegistry, SoapRegistry};
use sqlx::postgres::PgPoolOptions;

use state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    flowmesh_log::init(flowmesh_log::Config::default())?;

    let config = ServerConfig::load(std::env::var("FLOWMESH_CONFIG").unwrap_or_else(|_| "flowmesh.toml".to_owned()))?;

    let pool = PgPoolOptions::new().max_connections(10).connect(&config.database_url).await?;
    let processes: Arc<dyn ProcessStore> = Arc::new(PostgresProcessStore::new(pool.clone()));
    let secrets: Arc<dyn SecretStore> = Arc::new(PostgresSecretStore::new(pool));

    let key_bytes = std::fs::read(&config.secret_key_path)
        .map_err(|err| format!("reading secret key at {}: {err}", config.secret_key_path))?;
    let master_key = MasterKey::from_bytes(&key_bytes)?;
    let resolver = Arc::new(SecretResolver::new(Arc::clone(&secrets), master_key.clone()));

    let audit: Arc<dyn AuditEmitter> = match async_nats::connect(&config.nats_url).await {
        Ok(client) => Arc::new(NatsAuditEmitter::new(client)),
        Err(err) => {
            tracing::warn!(error = %err, "nats unreachable at startup, audit events will be dropped");
            Arc::new(NoopAuditEmitter)
        }
    };

    let executor = Arc::new(ProcessExecutor::new(ActivityRegistry::with_builtins(), resolver, audit));
    let rest = Arc::new(RestRegistry::new());
    let soap = Arc::new(SoapRegistry::new());
    let manager = Arc::new(TriggerManager::new(Arc::clone(&executor), Arc::clone(&rest), Arc::clone(&soap)));

    for record in processes.list().await? {
        if record.status == ProcessStatus::Deployed {
            if let Err(err) = manager.deploy(record.definition.clone()).await {
                tracing::error!(process_id = %record.definition.id.as_str(), error = %err, "failed to redeploy on startup");
            }
        }
    }

    let state = AppState {
        processes,
        secrets,
        master_key: Arc::new(master_key),
        executor,
        manager,
        rest,
        soap,
    };

    let app = routes::router(state);
    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    tracing::info!(addr = %config.http_addr, "flowmesh server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
