//! # Flowmesh Store
//!
//! Persists flow definitions and tracks their lifecycle status
//! (spec §3 "Process Record", §4.7's `Deploy`/`Stop` callers).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use flowmesh_core::{time, ProcessId};
use flowmesh_dsl::FlowDefinition;
use flowmesh_error::FlowError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    Draft,
    Deployed,
    Stopped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub definition: FlowDefinition,
    pub status: ProcessStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Persists [`FlowDefinition`]s and drives the draft → deployed →
/// stopped status machine. Status transitions themselves are enforced
/// here; the trigger manager decides *when* to call `deploy`/`stop`.
#[async_trait]
pub trait ProcessStore: Send + Sync {
    async fn save(&self, definition: FlowDefinition) -> Result<(), FlowError>;
    async fn get(&self, id: &ProcessId) -> Result<ProcessRecord, FlowError>;
    /// Ordered by `updated_at` descending.
    async fn list(&self) -> Result<Vec<ProcessRecord>, FlowError>;
    async fn deploy(&self, id: &ProcessId) -> Result<ProcessRecord, FlowError>;
    async fn stop(&self, id: &ProcessId) -> Result<ProcessRecord, FlowError>;
    async fn reset(&self, id: &ProcessId) -> Result<ProcessRecord, FlowError>;
    /// Fails if the process is currently deployed.
    async fn delete(&self, id: &ProcessId) -> Result<(), FlowError>;
}

#[derive(Debug, Default)]
pub struct InMemoryProcessStore {
    records: DashMap<ProcessId, ProcessRecord>,
}

impl InMemoryProcessStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn transition(
        &self,
        id: &ProcessId,
        to: ProcessStatus,
    ) -> Result<ProcessRecord, FlowError> {
        let mut entry = self
            .records
            .get_mut(id)
            .ok_or_else(|| FlowError::config(format!("no process `{id}`")))?;
        entry.status = to;
        entry.updated_at = time::now();
        Ok(entry.clone())
    }
}

#[async_trait]
impl ProcessStore for InMemoryProcessStore {
    async fn save(&self, definition: FlowDefinition) -> Result<(), FlowError> {
        let now = time::now();
        let id = definition.id.clone();
        let created_at = self.records.get(&id).map_or(now, |r| r.created_at);
        self.records.insert(
            id,
            ProcessRecord {
                definition,
                status: ProcessStatus::Draft,
                created_at,
                updated_at: now,
            },
        );
        Ok(())
    }

    async fn get(&self, id: &ProcessId) -> Result<ProcessRecord, FlowError> {
        self.records
            .get(id)
            .map(|entry| entry.clone())
            .ok_or_else(|| FlowError::config(format!("no process `{id}`")))
    }

    async fn list(&self) -> Result<Vec<ProcessRecord>, FlowError> {
        let mut records: Vec<ProcessRecord> = self.records.iter().map(|e| e.value().clone()).collect();
        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(records)
    }

    async fn deploy(&self, id: &ProcessId) -> Result<ProcessRecord, FlowError> {
        self.transition(id, ProcessStatus::Deployed)
    }

    async fn stop(&self, id: &ProcessId) -> Result<ProcessRecord, FlowError> {
        self.transition(id, ProcessStatus::Stopped)
    }

    async fn reset(&self, id: &ProcessId) -> Result<ProcessRecord, FlowError> {
        self.transition(id, ProcessStatus::Draft)
    }

    async fn delete(&self, id: &ProcessId) -> Result<(), FlowError> {
        let record = self
            .records
            .get(id)
            .ok_or_else(|| FlowError::config(format!("no process `{id}`")))?;
        if record.status == ProcessStatus::Deployed {
            return Err(FlowError::config("cannot delete a deployed process"));
        }
        drop(record);
        self.records.remove(id);
        Ok(())
    }
}

#[cfg(feature = "postgres")]
pub use postgres::PostgresProcessStore;

#[cfg(feature = "postgres")]
pub mod postgres {
    use sqlx::{PgPool, Row};

    use super::{
        async_trait, time, DateTime, FlowDefinition, FlowError, ProcessId, ProcessRecord, ProcessStatus,
        ProcessStore, Utc,
    };

    pub struct PostgresProcessStore {
        pool: PgPool,
    }

    impl PostgresProcessStore {
        #[must_use]
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }
    }

    fn status_to_str(s: ProcessStatus) -> &'static str {
        match s {
            ProcessStatus::Draft => "draft",
            ProcessStatus::Deployed => "deployed",
            ProcessStatus::Stopped => "stopped",
        }
    }

    fn status_from_str(s: &str) -> Result<ProcessStatus, FlowError> {
        match s {
            "draft" => Ok(ProcessStatus::Draft),
            "deployed" => Ok(ProcessStatus::Deployed),
            "stopped" => Ok(ProcessStatus::Stopped),
            other => Err(FlowError::config(format!("unknown stored process status `{other}`"))),
        }
    }

    fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<ProcessRecord, FlowError> {
        let dsl: serde_json::Value = row.try_get("dsl").map_err(|e| FlowError::config(e.to_string()))?;
        let definition: FlowDefinition =
            serde_json::from_value(dsl).map_err(|e| FlowError::config(format!("stored DSL malformed: {e}")))?;
        let status_str: String = row.try_get("status").map_err(|e| FlowError::config(e.to_string()))?;
        Ok(ProcessRecord {
            definition,
            status: status_from_str(&status_str)?,
            created_at: row
                .try_get::<DateTime<Utc>, _>("created_at")
                .map_err(|e| FlowError::config(e.to_string()))?,
            updated_at: row
                .try_get::<DateTime<Utc>, _>("updated_at")
                .map_err(|e| FlowError::config(e.to_string()))?,
        })
    }

    #[async_trait]
    impl ProcessStore for PostgresProcessStore {
        async fn save(&self, definition: FlowDefinition) -> Result<(), FlowError> {
            let dsl = serde_json::to_value(&definition)
                .map_err(|e| FlowError::config(format!("cannot serialize DSL: {e}")))?;
            sqlx::query(
                r"
                INSERT INTO processes (id, version, name, description, dsl, status, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, 'draft', now(), now())
                ON CONFLICT (id) DO UPDATE
                SET version = EXCLUDED.version,
                    name = EXCLUDED.name,
                    dsl = EXCLUDED.dsl,
                    updated_at = now()
                ",
            )
            .bind(definition.id.as_str())
            .bind(i64::from(definition.version))
            .bind(&definition.name)
            .bind(Option::<String>::None)
            .bind(dsl)
            .execute(&self.pool)
            .await
            .map_err(|e| FlowError::config(format!("store write failed: {e}")))?;
            Ok(())
        }

        async fn get(&self, id: &ProcessId) -> Result<ProcessRecord, FlowError> {
            let row = sqlx::query("SELECT dsl, status, created_at, updated_at FROM processes WHERE id = $1")
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| FlowError::config(format!("store read failed: {e}")))?
                .ok_or_else(|| FlowError::config(format!("no process `{id}`")))?;
            row_to_record(&row)
        }

        async fn list(&self) -> Result<Vec<ProcessRecord>, FlowError> {
            let rows = sqlx::query("SELECT dsl, status, created_at, updated_at FROM processes ORDER BY updated_at DESC")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| FlowError::config(format!("store read failed: {e}")))?;
            rows.iter().map(row_to_record).collect()
        }

        async fn deploy(&self, id: &ProcessId) -> Result<ProcessRecord, FlowError> {
            self.set_status(id, ProcessStatus::Deployed).await
        }

        async fn stop(&self, id: &ProcessId) -> Result<ProcessRecord, FlowError> {
            self.set_status(id, ProcessStatus::Stopped).await
        }

        async fn reset(&self, id: &ProcessId) -> Result<ProcessRecord, FlowError> {
            self.set_status(id, ProcessStatus::Draft).await
        }

        async fn delete(&self, id: &ProcessId) -> Result<(), FlowError> {
            let record = self.get(id).await?;
            if record.status == ProcessStatus::Deployed {
                return Err(FlowError::config("cannot delete a deployed process"));
            }
            sqlx::query("DELETE FROM processes WHERE id = $1")
                .bind(id.as_str())
                .execute(&self.pool)
                .await
                .map_err(|e| FlowError::config(format!("store delete failed: {e}")))?;
            Ok(())
        }
    }

    impl PostgresProcessStore {
        async fn set_status(&self, id: &ProcessId, status: ProcessStatus) -> Result<ProcessRecord, FlowError> {
            sqlx::query("UPDATE processes SET status = $1, updated_at = now() WHERE id = $2")
                .bind(status_to_str(status))
                .bind(id.as_str())
                .execute(&self.pool)
                .await
                .map_err(|e| FlowError::config(format!("store write failed: {e}")))?;
            let _ = time::now();
            self.get(id).await
        }
    }
}
