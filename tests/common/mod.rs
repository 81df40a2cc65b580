#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use secure_audit_trail::alerts::TamperSignal;
use secure_audit_trail::audit::{ChainLedger, TamperReport};
use secure_audit_trail::crypto::CipherBox;
use secure_audit_trail::database::schema::AUDIT_TABLE;
use secure_audit_trail::database::Database;

pub const TEST_SECRET: &str = "integration-test-secret";

/// Collects every tamper report it receives
#[derive(Clone, Default)]
pub struct RecordingSignal {
    reports: Arc<Mutex<Vec<TamperReport>>>,
}

impl RecordingSignal {
    pub fn reports(&self) -> Vec<TamperReport> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl TamperSignal for RecordingSignal {
    async fn on_tamper_detected(&self, report: &TamperReport) {
        self.reports.lock().unwrap().push(report.clone());
    }
}

/// Setup an in-memory ledger with a recording tamper signal
pub async fn setup_ledger() -> (ChainLedger<Database>, RecordingSignal) {
    let database = Database::new_in_memory()
        .await
        .expect("Failed to create test database");
    let cipher = CipherBox::new(TEST_SECRET).expect("Failed to create cipher");
    let signal = RecordingSignal::default();
    let ledger = ChainLedger::new(database, cipher, Arc::new(signal.clone()));
    (ledger, signal)
}

/// Overwrite one column of a stored record, bypassing the ledger
pub async fn tamper_column(database: &Database, id: i64, column: &str, value: &str) {
    let sql = format!("UPDATE {} SET {} = ? WHERE id = ?", AUDIT_TABLE, column);
    let result = sqlx::query(&sql)
        .bind(value)
        .bind(id)
        .execute(database.pool())
        .await
        .expect("Failed to tamper with record");
    assert_eq!(result.rows_affected(), 1);
}
