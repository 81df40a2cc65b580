//! Hash chain primitives
//!
//! `event_hash = hex(SHA-256(ciphertext || previous_hash))`, where both
//! inputs are taken as their stored text bytes. The digest covers the
//! envelope, never the plaintext, so checking it needs no key. It does not
//! cover `event_type` either.

use sha2::{Digest, Sha256};

/// `previous_hash` of the first record: 64 zero characters
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Compute the chained digest of one record
pub fn chain_hash(ciphertext: &str, previous_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ciphertext.as_bytes());
    hasher.update(previous_hash.as_bytes());
    hex::encode(hasher.finalize())
}
