// Database schema definitions and migrations

pub const AUDIT_TRAIL_SCHEMA: &str = include_str!("../../migrations/001_secure_audit_trails.sql");

/// Table holding the hash chain
pub const AUDIT_TABLE: &str = "secure_audit_trails";
