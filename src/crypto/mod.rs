//! Authenticated encryption for audit payloads
//!
//! AES-256-GCM envelopes under a key derived from an operator secret,
//! with rotation that archives the outgoing key.

pub mod cipher;
pub mod key;

pub use cipher::{AuthenticationFailure, CipherBox, NONCE_LEN, TAG_LEN};
pub use key::{backup_file_name, EncryptionKey, KeyBackup, KEY_LEN};
