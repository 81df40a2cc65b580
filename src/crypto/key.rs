//! Encryption Key Material
//!
//! Derives the 32-byte AES key from an operator secret and archives
//! outgoing keys when they are rotated away.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::KeyInit;
use aes_gcm::Aes256Gcm;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::info;
use zeroize::Zeroize;

use crate::error::{AuditError, AuditResult};

pub const KEY_LEN: usize = 32;

/// Symmetric key for the audit cipher (32 bytes for AES-256-GCM)
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey {
    bytes: [u8; KEY_LEN],
}

impl Drop for EncryptionKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

impl EncryptionKey {
    /// Derive a key as the SHA-256 digest of the secret bytes.
    ///
    /// No salt and no iteration count: already-written envelopes depend on
    /// exactly this derivation, so changing it needs a re-encryption plan.
    /// The secret is used as given; blank (whitespace-only) secrets are
    /// rejected.
    pub fn derive(secret: &str) -> AuditResult<Self> {
        if secret.trim().is_empty() {
            return Err(AuditError::empty_secret());
        }

        let digest = Sha256::digest(secret.as_bytes());
        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(&digest);
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }

    /// Base64 form written to key backup files
    pub fn encoded(&self) -> String {
        STANDARD.encode(self.bytes)
    }

    /// Short identifier that is safe to log
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.bytes);
        hex::encode(&digest[..4])
    }

    pub(crate) fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(GenericArray::from_slice(&self.bytes))
    }
}

/// Archived copy of a key that was rotated out
#[derive(Debug, Clone)]
pub struct KeyBackup {
    pub path: PathBuf,
    pub archived_at: DateTime<Utc>,
    pub fingerprint: String,
}

/// File name used for a key archived on the given date
pub fn backup_file_name(date: DateTime<Utc>) -> String {
    format!("key_backup_{}.key", date.format("%Y%m%d"))
}

/// Write the encoded key into `dir`, never overwriting an earlier backup.
///
/// A second rotation on the same day gets a numeric suffix
/// (`key_backup_YYYYMMDD_2.key`, ...).
pub(crate) fn write_backup(
    dir: &Path,
    key: &EncryptionKey,
    archived_at: DateTime<Utc>,
) -> AuditResult<KeyBackup> {
    fs::create_dir_all(dir).map_err(|e| {
        AuditError::KeyBackup(format!("Failed to create backup directory {:?}: {}", dir, e))
    })?;

    let base_name = backup_file_name(archived_at);
    let stem = base_name.trim_end_matches(".key").to_string();

    let mut attempt = 1u32;
    loop {
        let path = if attempt == 1 {
            dir.join(&base_name)
        } else {
            dir.join(format!("{}_{}.key", stem, attempt))
        };

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(key.encoded().as_bytes())
                    .and_then(|_| file.flush())
                    .map_err(|e| {
                        AuditError::KeyBackup(format!("Failed to write {:?}: {}", path, e))
                    })?;

                info!(
                    path = %path.display(),
                    fingerprint = %key.fingerprint(),
                    "Archived outgoing encryption key"
                );

                return Ok(KeyBackup {
                    path,
                    archived_at,
                    fingerprint: key.fingerprint(),
                });
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                attempt += 1;
            }
            Err(e) => {
                return Err(AuditError::KeyBackup(format!(
                    "Failed to create {:?}: {}",
                    path, e
                )));
            }
        }
    }
}
