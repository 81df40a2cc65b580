//! Audit Ledger
//!
//! Owns the write path of the chain: payloads are encoded, sealed with the
//! current key, linked to the chain head and handed to the store. Reads go
//! through the same type so that verification and decryption share one key.

use std::sync::Arc;

use chrono::Utc;
use futures::TryStreamExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::alerts::TamperSignal;
use crate::audit::entry::{chain_hash, GENESIS_HASH};
use crate::audit::verify::{ChainVerification, ChainVerifier};
use crate::codec::{self, EventData};
use crate::crypto::{AuthenticationFailure, CipherBox, KeyBackup};
use crate::database::models::{AuditRecord, NewRecord, RecordId};
use crate::database::AuditStore;
use crate::error::{AuditError, AuditResult};

/// A stored record together with its decrypted payload, if the current key
/// can open it.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenedRecord {
    pub record: AuditRecord,
    pub payload: Result<EventData, AuthenticationFailure>,
}

pub struct ChainLedger<S: AuditStore> {
    store: S,
    cipher: CipherBox,
    signal: Arc<dyn TamperSignal>,
    /// Serializes head-read + insert within this process. Other processes
    /// are caught by the store's conditional insert.
    append_lock: Mutex<()>,
}

impl<S: AuditStore> ChainLedger<S> {
    pub fn new(store: S, cipher: CipherBox, signal: Arc<dyn TamperSignal>) -> Self {
        Self {
            store,
            cipher,
            signal,
            append_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn cipher(&self) -> &CipherBox {
        &self.cipher
    }

    /// Encrypt `data`, link it to the current head and persist it
    pub async fn append(&self, event_type: &str, data: &EventData) -> AuditResult<RecordId> {
        if event_type.trim().is_empty() {
            return Err(AuditError::Misuse("event type must not be empty".to_string()));
        }

        let plaintext = codec::encode(data)?;
        let ciphertext = self.cipher.encrypt(&plaintext)?;

        let _guard = self.append_lock.lock().await;
        let previous_hash = self.last_record_hash().await?;
        let event_hash = chain_hash(&ciphertext, &previous_hash);

        let record = NewRecord {
            event_type: event_type.to_string(),
            ciphertext,
            event_hash: event_hash.clone(),
            previous_hash,
            created_at: Utc::now(),
        };

        let id = self.store.insert_linked(record).await?;
        info!(id, event_type, hash = %event_hash, "Audit event recorded");
        Ok(id)
    }

    /// `event_hash` of the newest record, or the genesis value
    pub async fn last_record_hash(&self) -> AuditResult<String> {
        Ok(self
            .store
            .latest_record()
            .await?
            .map(|record| record.event_hash)
            .unwrap_or_else(|| GENESIS_HASH.to_string()))
    }

    /// Walk the whole chain in id order. The tamper signal fires once, for
    /// the first failing record, and the walk stops there.
    pub async fn verify_chain(&self) -> AuditResult<ChainVerification> {
        let mut verifier = ChainVerifier::new();
        let broken = {
            let mut records = self.store.stream_records();
            let mut broken = None;
            while let Some(record) = records.try_next().await? {
                if let Err(report) = verifier.check(&record) {
                    broken = Some(report);
                    break;
                }
            }
            broken
        };

        match broken {
            Some(report) => {
                self.signal.on_tamper_detected(&report).await;
                Ok(ChainVerification::Broken(report))
            }
            None => Ok(verifier.finish()),
        }
    }

    pub async fn verify_integrity(&self) -> AuditResult<bool> {
        Ok(self.verify_chain().await?.is_intact())
    }

    /// Newest first
    pub async fn recent(&self, limit: u32) -> AuditResult<Vec<AuditRecord>> {
        self.store.recent_records(limit).await
    }

    /// Fetch a record and try to decrypt it with the current key.
    ///
    /// An authentication failure is reported in `payload` rather than as an
    /// error: records sealed under a rotated-out key are expected.
    pub async fn open_record(&self, id: RecordId) -> AuditResult<Option<OpenedRecord>> {
        let Some(record) = self.store.record_by_id(id).await? else {
            debug!("Record {} not found", id);
            return Ok(None);
        };

        let payload = match self.cipher.decrypt(&record.ciphertext) {
            Ok(plaintext) => Ok(codec::decode(&plaintext)?),
            Err(failure) => {
                warn!("Record {} could not be decrypted with the current key", id);
                Err(failure)
            }
        };

        Ok(Some(OpenedRecord { record, payload }))
    }

    /// Replace the key used for new appends and reads. Existing records keep
    /// their ciphertext and still verify, but only open with the old key.
    pub async fn rotate_key(&mut self, new_secret: &str) -> AuditResult<KeyBackup> {
        let _guard = self.append_lock.lock().await;
        self.cipher.rotate_key(new_secret)
    }
}
