//! Secret persistence: an async trait plus an in-memory implementation
//! and, behind the `postgres` feature, a `sqlx`-backed one.

use async_trait::async_trait;
use dashmap::DashMap;
use flowmesh_core::{time, SecretId};
use flowmesh_error::FlowError;
use serde_json::Value;

use crate::model::{SecretRecord, SecretSummary, SecretType};

/// Storage for encrypted secrets. Implementations never decrypt —
/// decryption is the resolver's job, given a [`crate::crypto::MasterKey`]
/// it alone holds.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Insert a new secret or overwrite the value/metadata of an
    /// existing one with the same name.
    async fn upsert(
        &self,
        name: &str,
        secret_type: SecretType,
        encrypted_value: Vec<u8>,
        metadata: Value,
    ) -> Result<SecretId, FlowError>;

    /// Metadata-only listing — never returns `encrypted_value`.
    async fn list(&self) -> Result<Vec<SecretSummary>, FlowError>;

    async fn delete(&self, name: &str) -> Result<(), FlowError>;

    /// Fetch the full record, including the encrypted value, by name.
    /// Used only by [`crate::resolver::SecretResolver`].
    async fn get_encrypted(&self, name: &str) -> Result<SecretRecord, FlowError>;
}

/// A process-local store backed by a `DashMap`. Suitable for tests and
/// single-node deployments that don't need the secret table shared
/// across replicas.
#[derive(Debug, Default)]
pub struct InMemorySecretStore {
    records: DashMap<String, SecretRecord>,
}

impl InMemorySecretStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn upsert(
        &self,
        name: &str,
        secret_type: SecretType,
        encrypted_value: Vec<u8>,
        metadata: Value,
    ) -> Result<SecretId, FlowError> {
        let now = time::now();
        let id = self
            .records
            .get(name)
            .map_or_else(|| SecretId::new(name), |existing| existing.id.clone());
        let created_at = self.records.get(name).map_or(now, |existing| existing.created_at);

        let record = SecretRecord {
            id: id.clone(),
            name: name.to_owned(),
            secret_type,
            encrypted_value,
            metadata,
            created_at,
            updated_at: now,
        };
        self.records.insert(name.to_owned(), record);
        Ok(id)
    }

    async fn list(&self) -> Result<Vec<SecretSummary>, FlowError> {
        Ok(self.records.iter().map(|entry| entry.value().summary()).collect())
    }

    async fn delete(&self, name: &str) -> Result<(), FlowError> {
        self.records.remove(name);
        Ok(())
    }

    async fn get_encrypted(&self, name: &str) -> Result<SecretRecord, FlowError> {
        self.records
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| FlowError::secret(format!("no secret named `{name}`")))
    }
}

#[cfg(feature = "postgres")]
pub mod postgres {
    use sqlx::{PgPool, Row};

    use super::{async_trait, FlowError, SecretId, SecretRecord, SecretStore, SecretSummary, SecretType, Value};

    /// `sqlx`-backed store over the `secrets` table:
    /// `id, name, type, encrypted_val, metadata, created_at, updated_at`.
    pub struct PostgresSecretStore {
        pool: PgPool,
    }

    impl PostgresSecretStore {
        #[must_use]
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }
    }

    fn type_to_str(t: SecretType) -> &'static str {
        match t {
            SecretType::BasicAuth => "basic_auth",
            SecretType::Token => "token",
            SecretType::Certificate => "certificate",
            SecretType::ConnectionString => "connection_string",
            SecretType::AwsCredentials => "aws_credentials",
            SecretType::SshKey => "ssh_key",
            SecretType::AmqpUrl => "amqp_url",
        }
    }

    fn type_from_str(s: &str) -> Result<SecretType, FlowError> {
        match s {
            "basic_auth" => Ok(SecretType::BasicAuth),
            "token" => Ok(SecretType::Token),
            "certificate" => Ok(SecretType::Certificate),
            "connection_string" => Ok(SecretType::ConnectionString),
            "aws_credentials" => Ok(SecretType::AwsCredentials),
            "ssh_key" => Ok(SecretType::SshKey),
            "amqp_url" => Ok(SecretType::AmqpUrl),
            other => Err(FlowError::secret(format!("unknown stored secret type `{other}`"))),
        }
    }

    #[async_trait]
    impl SecretStore for PostgresSecretStore {
        async fn upsert(
            &self,
            name: &str,
            secret_type: SecretType,
            encrypted_value: Vec<u8>,
            metadata: Value,
        ) -> Result<SecretId, FlowError> {
            let id = SecretId::new(name);
            sqlx::query(
                r"
                INSERT INTO secrets (id, name, type, encrypted_val, metadata, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, now(), now())
                ON CONFLICT (name) DO UPDATE
                SET type = EXCLUDED.type,
                    encrypted_val = EXCLUDED.encrypted_val,
                    metadata = EXCLUDED.metadata,
                    updated_at = now()
                ",
            )
            .bind(id.as_str())
            .bind(name)
            .bind(type_to_str(secret_type))
            .bind(encrypted_value)
            .bind(metadata)
            .execute(&self.pool)
            .await
            .map_err(|e| FlowError::secret(format!("store write failed: {e}")))?;
            Ok(id)
        }

        async fn list(&self) -> Result<Vec<SecretSummary>, FlowError> {
            let rows = sqlx::query(
                "SELECT id, name, type, metadata, created_at, updated_at FROM secrets ORDER BY name",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(|e| FlowError::secret(format!("store read failed: {e}")))?;

            rows.into_iter()
                .map(|row| {
                    let type_str: String = row.try_get("type").map_err(|e| FlowError::secret(e.to_string()))?;
                    Ok(SecretSummary {
                        id: SecretId::new(row.try_get::<String, _>("id").map_err(|e| FlowError::secret(e.to_string()))?),
                        name: row.try_get("name").map_err(|e| FlowError::secret(e.to_string()))?,
                        secret_type: type_from_str(&type_str)?,
                        metadata: row.try_get("metadata").map_err(|e| FlowError::secret(e.to_string()))?,
                        created_at: row.try_get("created_at").map_err(|e| FlowError::secret(e.to_string()))?,
                        updated_at: row.try_get("updated_at").map_err(|e| FlowError::secret(e.to_string()))?,
                    })
                })
                .collect()
        }

        async fn delete(&self, name: &str) -> Result<(), FlowError> {
            sqlx::query("DELETE FROM secrets WHERE name = $1")
                .bind(name)
                .execute(&self.pool)
                .await
                .map_err(|e| FlowError::secret(format!("store delete failed: {e}")))?;
            Ok(())
        }

        async fn get_encrypted(&self, name: &str) -> Result<SecretRecord, FlowError> {
            let row = sqlx::query(
                "SELECT id, name, type, encrypted_val, metadata, created_at, updated_at FROM secrets WHERE name = $1",
            )
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| FlowError::secret(format!("store read failed: {e}")))?
            .ok_or_else(|| FlowError::secret(format!("no secret named `{name}`")))?;

            let type_str: String = row.try_get("type").map_err(|e| FlowError::secret(e.to_string()))?;
            Ok(SecretRecord {
                id: SecretId::new(row.try_get::<String, _>("id").map_err(|e| FlowError::secret(e.to_string()))?),
                name: row.try_get("name").map_err(|e| FlowError::secret(e.to_string()))?,
                secret_type: type_from_str(&type_str)?,
                encrypted_value: row.try_get("encrypted_val").map_err(|e| FlowError::secret(e.to_string()))?,
                metadata: row.try_get("metadata").map_err(|e| FlowError::secret(e.to_string()))?,
                created_at: row.try_get("created_at").map_err(|e| FlowError::secret(e.to_string()))?,
                updated_at: row.try_get("updated_at").map_err(|e| FlowError::secret(e.to_string()))?,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn upsert_then_get_encrypted_roundtrips() {
        let store = InMemorySecretStore::new();
        store
            .upsert("db", SecretType::ConnectionString, vec![1, 2, 3], json!({"env": "prod"}))
            .await
            .unwrap();

        let record = store.get_encrypted("db").await.unwrap();
        assert_eq!(record.encrypted_value, vec![1, 2, 3]);
        assert_eq!(record.metadata, json!({"env": "prod"}));
    }

    #[tokio::test]
    async fn list_never_carries_the_encrypted_value() {
        let store = InMemorySecretStore::new();
        store
            .upsert("db", SecretType::ConnectionString, vec![9, 9, 9], json!({}))
            .await
            .unwrap();

        let summaries = store.list().await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].name, "db");
    }

    #[tokio::test]
    async fn missing_secret_is_a_secret_error() {
        let store = InMemorySecretStore::new();
        assert!(store.get_encrypted("nope").await.is_err());
    }

    #[tokio::test]
    async fn delete_removes_the_record() {
        let store = InMemorySecretStore::new();
        store
            .upsert("db", SecretType::Token, vec![1], json!({}))
            .await
            .unwrap();
        store.delete("db").await.unwrap();
        assert!(store.get_encrypted("db").await.is_err());
    }
}
