//! # Flowmesh Secret
//!
//! Encrypted-at-rest secret storage and resolution (spec §4.3). Secrets
//! are stored as AES-256-GCM ciphertext; only [`resolver::SecretResolver`]
//! ever holds the master key needed to decrypt them, and the decrypted
//! form is wrapped in [`resolver::ResolvedSecret`] so it can't leak
//! through an incidental `Debug`/log call.

pub mod crypto;
pub mod model;
pub mod resolver;
pub mod store;

pub use crypto::MasterKey;
pub use model::{SecretRecord, SecretSummary, SecretType};
pub use resolver::{ResolvedSecret, SecretResolver};
pub use store::{InMemorySecretStore, SecretStore};

#[cfg(feature = "postgres")]
pub use store::postgres::PostgresSecretStore;
