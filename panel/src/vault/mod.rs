//! Credential vault
//!
//! Symmetric encryption of stored secrets (SSH passwords, GitHub tokens) with
//! AES-256-GCM under a key derived from the application master secret.
//!
//! Ciphertexts are `base64url(nonce || ciphertext)`. The PBKDF2 salt is a
//! constant, so every process derives the same key from the same master
//! secret and previously stored rows stay readable across restarts.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE as B64, Engine as _};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use crate::errors::PanelError;

/// Fixed salt shared by every stored ciphertext. Changing it orphans them all.
const KDF_SALT: &[u8] = b"static_salt_for_bot";

const KDF_ROUNDS: u32 = 100_000;

const NONCE_LEN: usize = 12;

/// Encrypts and decrypts secrets at rest
pub struct Vault {
    cipher: Aes256Gcm,
}

impl Vault {
    /// Derive the vault key from the master secret
    pub fn new(master_secret: &SecretString) -> Self {
        let mut key = [0u8; 32];
        pbkdf2::pbkdf2_hmac::<Sha256>(
            master_secret.expose_secret().as_bytes(),
            KDF_SALT,
            KDF_ROUNDS,
            &mut key,
        );
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
        key.fill(0);
        Self { cipher }
    }

    /// Encrypt a secret. Empty input yields `None`.
    pub fn encrypt(&self, plaintext: &str) -> Result<Option<String>, PanelError> {
        if plaintext.is_empty() {
            return Ok(None);
        }

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| PanelError::CryptoError("encryption failed".to_string()))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(Some(B64.encode(blob)))
    }

    /// Decrypt a stored secret. Empty input yields `None`.
    ///
    /// A ciphertext produced under a different master secret fails with
    /// `CryptoError`; callers must ask the user to set the credential up again.
    pub fn decrypt(&self, ciphertext: &str) -> Result<Option<SecretString>, PanelError> {
        if ciphertext.is_empty() {
            return Ok(None);
        }

        let blob = B64
            .decode(ciphertext.trim())
            .map_err(|e| PanelError::CryptoError(format!("malformed ciphertext: {e}")))?;
        if blob.len() <= NONCE_LEN {
            return Err(PanelError::CryptoError("ciphertext too short".to_string()));
        }

        let (nonce, body) = blob.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), body)
            .map_err(|_| {
                PanelError::CryptoError("ciphertext was not produced by the current key".to_string())
            })?;

        let plaintext = String::from_utf8(plaintext)
            .map_err(|_| PanelError::CryptoError("decrypted secret is not UTF-8".to_string()))?;
        Ok(Some(SecretString::from(plaintext)))
    }
}
