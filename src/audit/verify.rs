//! Audit Chain Verification
//!
//! Walks records in ascending id order and stops at the first broken link.
//! Anything after a break cannot be trusted, whatever its own contents.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::audit::entry::{chain_hash, GENESIS_HASH};
use crate::database::models::AuditRecord;

/// How a record failed verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TamperKind {
    /// Recomputed digest differs from the stored `event_hash`
    HashMismatch,
    /// Stored `previous_hash` differs from the preceding record's `event_hash`
    BrokenLink,
}

/// The first record that failed verification, with diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TamperReport {
    pub record: AuditRecord,
    pub kind: TamperKind,
    /// Digest recomputed from the stored ciphertext and the verified chain
    pub expected_hash: String,
    /// `event_hash` of the last verified record, or genesis
    pub expected_previous_hash: String,
}

impl TamperReport {
    pub fn summary(&self) -> String {
        match self.kind {
            TamperKind::HashMismatch => format!(
                "record {} ({}): stored hash {} != computed {}",
                self.record.id, self.record.event_type, self.record.event_hash, self.expected_hash
            ),
            TamperKind::BrokenLink => format!(
                "record {} ({}): previous hash {} != chain head {}",
                self.record.id,
                self.record.event_type,
                self.record.previous_hash,
                self.expected_previous_hash
            ),
        }
    }
}

/// Outcome of a full chain walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainVerification {
    Intact {
        record_count: u64,
        head_hash: Option<String>,
    },
    Broken(TamperReport),
}

impl ChainVerification {
    pub fn is_intact(&self) -> bool {
        matches!(self, ChainVerification::Intact { .. })
    }

    pub fn tamper_report(&self) -> Option<&TamperReport> {
        match self {
            ChainVerification::Broken(report) => Some(report),
            ChainVerification::Intact { .. } => None,
        }
    }
}

/// Incremental verifier, fed one record at a time so callers can stream
pub struct ChainVerifier {
    previous_hash: String,
    checked: u64,
}

impl Default for ChainVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainVerifier {
    pub fn new() -> Self {
        Self {
            previous_hash: GENESIS_HASH.to_string(),
            checked: 0,
        }
    }

    /// Check the next record in id order and advance the running hash
    pub fn check(&mut self, record: &AuditRecord) -> Result<(), TamperReport> {
        let expected_hash = chain_hash(&record.ciphertext, &self.previous_hash);

        let kind = if expected_hash != record.event_hash {
            Some(TamperKind::HashMismatch)
        } else if record.previous_hash != self.previous_hash {
            Some(TamperKind::BrokenLink)
        } else {
            None
        };

        if let Some(kind) = kind {
            let report = TamperReport {
                record: record.clone(),
                kind,
                expected_hash,
                expected_previous_hash: self.previous_hash.clone(),
            };
            warn!("Audit chain broken at {}", report.summary());
            return Err(report);
        }

        debug!("Record {} verified", record.id);
        self.previous_hash = record.event_hash.clone();
        self.checked += 1;
        Ok(())
    }

    pub fn checked(&self) -> u64 {
        self.checked
    }

    pub fn finish(self) -> ChainVerification {
        info!("Audit chain verification successful: {} records", self.checked);
        let head_hash = (self.checked > 0).then_some(self.previous_hash);
        ChainVerification::Intact {
            record_count: self.checked,
            head_hash,
        }
    }
}

/// Verify an in-memory slice of records (already in ascending id order)
pub fn verify_records(records: &[AuditRecord]) -> ChainVerification {
    let mut verifier = ChainVerifier::new();
    for record in records {
        if let Err(report) = verifier.check(record) {
            return ChainVerification::Broken(report);
        }
    }
    verifier.finish()
}
