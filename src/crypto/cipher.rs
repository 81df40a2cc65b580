//! Audit payload cipher
//!
//! Envelope format: base64(nonce_12bytes || tag_16bytes || ciphertext)

use std::path::{Path, PathBuf};

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::AeadInPlace;
use aes_gcm::Nonce;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use rand::RngCore;
use thiserror::Error;
use tracing::{debug, info};

use super::key::{write_backup, EncryptionKey, KeyBackup};
use crate::error::{AuditError, AuditResult};

pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// Decryption did not authenticate: wrong key, corrupted or tampered data.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("authentication failed: wrong key or tampered envelope")]
pub struct AuthenticationFailure;

/// Holder of the current encryption key.
///
/// Exactly one key is current. `rotate_key` replaces it after archiving the
/// outgoing key; envelopes written before a rotation no longer decrypt.
pub struct CipherBox {
    key: EncryptionKey,
    backup_dir: PathBuf,
}

impl CipherBox {
    /// Create a cipher whose key is derived from `secret`
    pub fn new(secret: &str) -> AuditResult<Self> {
        Ok(Self {
            key: EncryptionKey::derive(secret)?,
            backup_dir: PathBuf::from("."),
        })
    }

    /// Directory that receives `key_backup_*.key` files on rotation
    pub fn with_backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = dir.into();
        self
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    pub fn key_fingerprint(&self) -> String {
        self.key.fingerprint()
    }

    /// Encrypt `plaintext` under a fresh random nonce
    pub fn encrypt(&self, plaintext: &[u8]) -> AuditResult<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let mut buffer = plaintext.to_vec();
        let tag = self
            .key
            .cipher()
            .encrypt_in_place_detached(nonce, b"", &mut buffer)
            .map_err(|_| AuditError::Crypto("AES-256-GCM encryption failed".to_string()))?;

        let mut envelope = Vec::with_capacity(NONCE_LEN + TAG_LEN + buffer.len());
        envelope.extend_from_slice(&nonce_bytes);
        envelope.extend_from_slice(tag.as_slice());
        envelope.extend_from_slice(&buffer);

        Ok(STANDARD.encode(&envelope))
    }

    pub fn encrypt_str(&self, plaintext: &str) -> AuditResult<String> {
        self.encrypt(plaintext.as_bytes())
    }

    /// Decrypt an envelope produced by `encrypt` under the current key.
    ///
    /// Any envelope that does not authenticate yields `AuthenticationFailure`
    /// and no bytes at all.
    pub fn decrypt(&self, envelope: &str) -> Result<Vec<u8>, AuthenticationFailure> {
        let data = STANDARD
            .decode(envelope.trim())
            .map_err(|_| AuthenticationFailure)?;

        if data.len() < NONCE_LEN + TAG_LEN {
            debug!("Envelope too short: {} bytes", data.len());
            return Err(AuthenticationFailure);
        }

        let (nonce, rest) = data.split_at(NONCE_LEN);
        let (tag, ciphertext) = rest.split_at(TAG_LEN);

        let mut buffer = ciphertext.to_vec();
        self.key
            .cipher()
            .decrypt_in_place_detached(
                Nonce::from_slice(nonce),
                b"",
                &mut buffer,
                GenericArray::from_slice(tag),
            )
            .map_err(|_| AuthenticationFailure)?;

        Ok(buffer)
    }

    pub fn decrypt_string(&self, envelope: &str) -> Result<String, AuthenticationFailure> {
        let bytes = self.decrypt(envelope)?;
        String::from_utf8(bytes).map_err(|_| AuthenticationFailure)
    }

    /// Archive the current key, then install one derived from `new_secret`.
    ///
    /// A blank secret or a failed backup write leaves the current key in
    /// place.
    pub fn rotate_key(&mut self, new_secret: &str) -> AuditResult<KeyBackup> {
        let new_key = EncryptionKey::derive(new_secret)?;
        let backup = write_backup(&self.backup_dir, &self.key, Utc::now())?;
        let old_fingerprint = backup.fingerprint.clone();

        self.key = new_key;

        info!(
            old_key = %old_fingerprint,
            new_key = %self.key.fingerprint(),
            "Encryption key rotated"
        );
        Ok(backup)
    }
}
