use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store-assigned, monotonically increasing record id
pub type RecordId = i64;

/// One persisted link of the audit chain. Never updated after insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditRecord {
    pub id: RecordId,
    pub event_type: String,
    pub ciphertext: String,
    pub event_hash: String,
    pub previous_hash: String,
    pub created_at: DateTime<Utc>,
}

/// A record ready to be appended; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    pub event_type: String,
    pub ciphertext: String,
    pub event_hash: String,
    pub previous_hash: String,
    pub created_at: DateTime<Utc>,
}
