//! Audit Chain
//!
//! Encrypted, hash-linked event records: each record's digest covers its
//! ciphertext and the digest of the record before it.

pub mod entry;
pub mod ledger;
pub mod verify;

pub use entry::{chain_hash, GENESIS_HASH};
pub use ledger::{ChainLedger, OpenedRecord};
pub use verify::{verify_records, ChainVerification, ChainVerifier, TamperKind, TamperReport};
