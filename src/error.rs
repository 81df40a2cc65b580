use thiserror::Error;

use crate::crypto::AuthenticationFailure;

impl From<serde_json::Error> for AuditError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(format!("JSON serialization error: {}", err))
    }
}

impl From<sqlx::Error> for AuditError {
    fn from(err: sqlx::Error) -> Self {
        Self::Store(format!("Database error: {}", err))
    }
}

impl From<config::ConfigError> for AuditError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum AuditError {
    /// Wrong key, corrupted envelope or tampered ciphertext.
    #[error(transparent)]
    Authentication(#[from] AuthenticationFailure),

    /// The persistence collaborator failed. Never retried by the core.
    #[error("Store error: {0}")]
    Store(String),

    /// Another writer advanced the chain head between read and insert.
    #[error("Chain head moved: record was not linked to {expected_previous}")]
    ChainConflict { expected_previous: String },

    /// Invalid input rejected before any state was touched.
    #[error("Misuse: {0}")]
    Misuse(String),

    #[error("Cryptographic error: {0}")]
    Crypto(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Key backup error: {0}")]
    KeyBackup(String),
}

pub type AuditResult<T> = Result<T, AuditError>;

impl AuditError {
    pub fn empty_secret() -> Self {
        Self::Misuse("encryption secret must not be empty".to_string())
    }

    pub fn chain_conflict(expected_previous: &str) -> Self {
        Self::ChainConflict {
            expected_previous: expected_previous.to_string(),
        }
    }

    /// True for failures of the persistence collaborator, including lost
    /// append races.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, Self::Store(_) | Self::ChainConflict { .. })
    }
}
