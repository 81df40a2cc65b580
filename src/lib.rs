pub mod alerts;
pub mod audit;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod database;
pub mod error;
pub mod queue;

pub use audit::{ChainLedger, ChainVerification, TamperReport};
pub use codec::{EventData, EventValue};
pub use crypto::{AuthenticationFailure, CipherBox};
pub use error::{AuditError, AuditResult};
