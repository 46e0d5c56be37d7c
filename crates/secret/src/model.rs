//! Secret data model (spec §3 "Secret").

use chrono::{DateTime, Utc};
use flowmesh_core::SecretId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The kind of credential a secret carries — informs UI rendering and
/// validation, but is otherwise opaque to the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretType {
    BasicAuth,
    Token,
    Certificate,
    ConnectionString,
    AwsCredentials,
    SshKey,
    AmqpUrl,
}

/// Metadata-only view of a secret — what `List()` returns. Never
/// includes the decrypted value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretSummary {
    pub id: SecretId,
    pub name: String,
    pub secret_type: SecretType,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Full stored row, including the encrypted value. Kept internal to the
/// store/resolver boundary — nothing outside `flowmesh-secret` should
/// hold one of these.
#[derive(Debug, Clone)]
pub struct SecretRecord {
    pub id: SecretId,
    pub name: String,
    pub secret_type: SecretType,
    pub encrypted_value: Vec<u8>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SecretRecord {
    #[must_use]
    pub fn summary(&self) -> SecretSummary {
        SecretSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            secret_type: self.secret_type,
            metadata: self.metadata.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
