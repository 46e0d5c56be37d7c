//! AES-256-GCM encrypt/decrypt for secret values at rest.
//!
//! Wire format: `nonce (12 bytes) || ciphertext`. The nonce is generated
//! fresh per encryption call and prepended rather than stored alongside,
//! so a single `BYTEA` column holds everything the decrypt path needs.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};

use flowmesh_error::FlowError;

const NONCE_LEN: usize = 12;

/// A validated 32-byte AES-256 key.
#[derive(Clone)]
pub struct MasterKey(Key<Aes256Gcm>);

impl MasterKey {
    /// Build a master key from raw bytes. Must be exactly 32 bytes
    /// (AES-256) — the data model's stated requirement.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FlowError> {
        if bytes.len() != 32 {
            return Err(FlowError::config(format!(
                "secret master key must be exactly 32 bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self(*Key::<Aes256Gcm>::from_slice(bytes)))
    }
}

/// Encrypt `plaintext`, returning `nonce || ciphertext`.
pub fn encrypt(key: &MasterKey, plaintext: &[u8]) -> Result<Vec<u8>, FlowError> {
    let cipher = Aes256Gcm::new(&key.0);
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| FlowError::secret(format!("encrypt failed: {e}")))?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(nonce.as_slice());
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt `nonce || ciphertext` produced by [`encrypt`].
pub fn decrypt(key: &MasterKey, data: &[u8]) -> Result<Vec<u8>, FlowError> {
    if data.len() < NONCE_LEN {
        return Err(FlowError::secret("ciphertext shorter than nonce"));
    }
    let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(&key.0);
    let nonce = Nonce::from_slice(nonce_bytes);
    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| FlowError::secret("decrypt failed"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> MasterKey {
        MasterKey::from_bytes(&[7u8; 32]).unwrap()
    }

    #[test]
    fn roundtrip_encrypt_decrypt() {
        let k = key();
        let plaintext = br#"{"token":"secret-value"}"#;
        let ciphertext = encrypt(&k, plaintext).unwrap();
        assert_ne!(ciphertext, plaintext);
        let decrypted = decrypt(&k, &ciphertext).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn key_must_be_32_bytes() {
        assert!(MasterKey::from_bytes(&[0u8; 16]).is_err());
        assert!(MasterKey::from_bytes(&[0u8; 32]).is_ok());
    }

    #[test]
    fn tampered_ciphertext_fails_to_decrypt() {
        let k = key();
        let mut ciphertext = encrypt(&k, b"hello").unwrap();
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0xFF;
        assert!(decrypt(&k, &ciphertext).is_err());
    }
}
