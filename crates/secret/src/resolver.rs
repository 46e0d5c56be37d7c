//! Resolves a secret reference to its decrypted key/value map, without
//! ever letting the plaintext escape into a `Debug` or log line.

use std::fmt;
use std::sync::Arc;

use flowmesh_error::FlowError;
use indexmap::IndexMap;
use serde_json::Value;

use crate::crypto::{self, MasterKey};
use crate::store::SecretStore;

/// A decrypted secret's key/value map. `Debug` and `Display` both print
/// `ResolvedSecret { <n fields redacted> }` — never the values —
/// mirroring the teacher's `SecureString` pattern for credential data.
#[derive(Clone)]
pub struct ResolvedSecret(IndexMap<String, Value>);

impl ResolvedSecret {
    /// Borrow the decrypted map. Callers (the executor's input-merge
    /// step) must not log or persist the returned values.
    #[must_use]
    pub fn expose(&self) -> &IndexMap<String, Value> {
        &self.0
    }

    #[must_use]
    pub fn into_map(self) -> IndexMap<String, Value> {
        self.0
    }
}

impl fmt::Debug for ResolvedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResolvedSecret {{ {} fields redacted }}", self.0.len())
    }
}

impl fmt::Display for ResolvedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Decrypts secrets on demand via a store + master key. A resolver with
/// no store configured (`noop`) fails every resolution — used where a
/// deployment has no secret backend wired up yet.
pub struct SecretResolver {
    backend: Option<(Arc<dyn SecretStore>, MasterKey)>,
}

impl SecretResolver {
    #[must_use]
    pub fn new(store: Arc<dyn SecretStore>, key: MasterKey) -> Self {
        Self {
            backend: Some((store, key)),
        }
    }

    #[must_use]
    pub fn noop() -> Self {
        Self { backend: None }
    }

    /// Resolve a secret reference by name. The decrypted plaintext must
    /// be a JSON object — any other shape is a secret error, since
    /// there is no sensible key/value merge for it.
    pub async fn resolve(&self, secret_ref: &str) -> Result<ResolvedSecret, FlowError> {
        let (store, key) = self
            .backend
            .as_ref()
            .ok_or_else(|| FlowError::secret("no secret store configured"))?;

        let record = store.get_encrypted(secret_ref).await?;
        let plaintext = crypto::decrypt(key, &record.encrypted_value)?;
        let value: Value = serde_json::from_slice(&plaintext)
            .map_err(|e| FlowError::secret(format!("decrypted value is not valid JSON: {e}")))?;
        let object = value
            .as_object()
            .ok_or_else(|| FlowError::secret("decrypted secret value is not a JSON object"))?;

        Ok(ResolvedSecret(
            object.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SecretType;
    use crate::store::InMemorySecretStore;
    use serde_json::json;

    fn key() -> MasterKey {
        MasterKey::from_bytes(&[3u8; 32]).unwrap()
    }

    #[tokio::test]
    async fn resolves_decrypted_object_into_a_map() {
        let store = Arc::new(InMemorySecretStore::new());
        let k = key();
        let plaintext = serde_json::to_vec(&json!({"user": "svc", "password": "hunter2"})).unwrap();
        let ciphertext = crypto::encrypt(&k, &plaintext).unwrap();
        store
            .upsert("db", SecretType::BasicAuth, ciphertext, json!({}))
            .await
            .unwrap();

        let resolver = SecretResolver::new(store, k);
        let resolved = resolver.resolve("db").await.unwrap();
        assert_eq!(resolved.expose().get("user").unwrap(), "svc");
    }

    #[tokio::test]
    async fn non_object_plaintext_is_a_secret_error() {
        let store = Arc::new(InMemorySecretStore::new());
        let k = key();
        let ciphertext = crypto::encrypt(&k, b"\"just a string\"").unwrap();
        store
            .upsert("bad", SecretType::Token, ciphertext, json!({}))
            .await
            .unwrap();

        let resolver = SecretResolver::new(store, k);
        assert!(resolver.resolve("bad").await.is_err());
    }

    #[tokio::test]
    async fn noop_resolver_always_fails() {
        let resolver = SecretResolver::noop();
        assert!(resolver.resolve("anything").await.is_err());
    }

    #[test]
    fn debug_never_prints_values() {
        let mut map = IndexMap::new();
        map.insert("password".to_owned(), json!("hunter2"));
        let resolved = ResolvedSecret(map);
        let printed = format!("{resolved:?}");
        assert!(!printed.contains("hunter2"));
    }
}
