mod common;

use std::sync::Arc;

use common::{setup_ledger, tamper_column, RecordingSignal, TEST_SECRET};
use futures::future::join_all;
use futures::TryStreamExt;
use secure_audit_trail::audit::{chain_hash, ChainLedger, ChainVerification, TamperKind, GENESIS_HASH};
use secure_audit_trail::codec::EventData;
use secure_audit_trail::crypto::{AuthenticationFailure, CipherBox};
use secure_audit_trail::database::models::{AuditRecord, NewRecord};
use secure_audit_trail::database::{AuditStore, Database};
use secure_audit_trail::error::AuditError;

async fn all_records(ledger: &ChainLedger<Database>) -> Vec<AuditRecord> {
    ledger.store().stream_records().try_collect().await.unwrap()
}

#[tokio::test]
async fn test_login_logout_scenario_detects_ciphertext_tampering() {
    let (ledger, signal) = setup_ledger().await;

    ledger
        .append("login", &EventData::new().with("user", "alice"))
        .await
        .unwrap();
    ledger
        .append("logout", &EventData::new().with("user", "alice"))
        .await
        .unwrap();
    assert!(ledger.verify_integrity().await.unwrap());
    assert!(signal.reports().is_empty());

    tamper_column(ledger.store(), 1, "ciphertext", "malicious_data").await;

    assert!(!ledger.verify_integrity().await.unwrap());
    let reports = signal.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].record.id, 1);
    assert_eq!(reports[0].kind, TamperKind::HashMismatch);
}

#[tokio::test]
async fn test_empty_chain_is_intact() {
    let (ledger, signal) = setup_ledger().await;

    assert_eq!(
        ledger.verify_chain().await.unwrap(),
        ChainVerification::Intact {
            record_count: 0,
            head_hash: None
        }
    );
    assert_eq!(ledger.last_record_hash().await.unwrap(), GENESIS_HASH);
    assert!(signal.reports().is_empty());
}

#[tokio::test]
async fn test_records_are_linked_in_order() {
    let (ledger, _signal) = setup_ledger().await;
    for user in ["alice", "bob", "carol"] {
        ledger
            .append("login", &EventData::new().with("user", user))
            .await
            .unwrap();
    }

    let records = all_records(&ledger).await;
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].previous_hash, GENESIS_HASH);
    for pair in records.windows(2) {
        assert!(pair[0].id < pair[1].id);
        assert_eq!(pair[1].previous_hash, pair[0].event_hash);
    }
    for record in &records {
        assert_eq!(
            record.event_hash,
            chain_hash(&record.ciphertext, &record.previous_hash)
        );
        assert!(!record.ciphertext.contains("alice"));
    }

    match ledger.verify_chain().await.unwrap() {
        ChainVerification::Intact {
            record_count,
            head_hash,
        } => {
            assert_eq!(record_count, 3);
            assert_eq!(head_hash, Some(records[2].event_hash.clone()));
        }
        ChainVerification::Broken(report) => panic!("unexpected break: {}", report.summary()),
    }
}

#[tokio::test]
async fn test_single_record_tampering_is_detected() {
    let (ledger, signal) = setup_ledger().await;
    ledger.append("login", &EventData::new()).await.unwrap();

    tamper_column(ledger.store(), 1, "event_hash", &"a".repeat(64)).await;

    let result = ledger.verify_chain().await.unwrap();
    let report = result.tamper_report().unwrap();
    assert_eq!(report.record.id, 1);
    assert_eq!(report.expected_previous_hash, GENESIS_HASH);
    assert_eq!(signal.reports().len(), 1);
}

#[tokio::test]
async fn test_any_chained_column_mutation_is_detected_at_that_record() {
    let cases = [
        ("ciphertext", "malicious_data".to_string(), TamperKind::HashMismatch),
        ("event_hash", "f".repeat(64), TamperKind::HashMismatch),
        ("previous_hash", "e".repeat(64), TamperKind::BrokenLink),
    ];

    for target in 1..=3 {
        for (column, value, kind) in &cases {
            let (ledger, signal) = setup_ledger().await;
            for i in 0..3 {
                ledger
                    .append("step", &EventData::new().with("n", i))
                    .await
                    .unwrap();
            }

            tamper_column(ledger.store(), target, column, value).await;

            assert!(!ledger.verify_integrity().await.unwrap());
            let reports = signal.reports();
            assert_eq!(reports.len(), 1, "{} on record {}", column, target);
            assert_eq!(reports[0].record.id, target, "{} on record {}", column, target);
            assert_eq!(reports[0].kind, *kind);
        }
    }
}

#[tokio::test]
async fn test_event_type_is_not_covered_by_the_chain() {
    let (ledger, signal) = setup_ledger().await;
    ledger.append("login", &EventData::new()).await.unwrap();

    tamper_column(ledger.store(), 1, "event_type", "logout").await;

    assert!(ledger.verify_integrity().await.unwrap());
    assert!(signal.reports().is_empty());
}

#[tokio::test]
async fn test_rotation_isolates_old_ciphertexts() {
    let backup_dir = tempfile::tempdir().unwrap();
    let database = Database::new_in_memory().await.unwrap();
    let cipher = CipherBox::new(TEST_SECRET)
        .unwrap()
        .with_backup_dir(backup_dir.path());
    let signal = RecordingSignal::default();
    let mut ledger = ChainLedger::new(database, cipher, Arc::new(signal.clone()));

    let before = EventData::new().with("user", "alice");
    let old_id = ledger.append("login", &before).await.unwrap();
    let old_fingerprint = ledger.cipher().key_fingerprint();

    let backup = ledger.rotate_key("a-brand-new-secret").await.unwrap();
    assert!(backup.path.exists());
    assert_eq!(backup.fingerprint, old_fingerprint);
    assert_ne!(ledger.cipher().key_fingerprint(), old_fingerprint);

    let after = EventData::new().with("user", "bob");
    let new_id = ledger.append("logout", &after).await.unwrap();

    let old = ledger.open_record(old_id).await.unwrap().unwrap();
    assert_eq!(old.payload, Err(AuthenticationFailure));
    let new = ledger.open_record(new_id).await.unwrap().unwrap();
    assert_eq!(new.payload, Ok(after));

    // The chain covers ciphertexts, so it still verifies without the old key
    assert!(ledger.verify_integrity().await.unwrap());

    // A cipher rebuilt from the old secret can still read the old record
    let old_cipher = CipherBox::new(TEST_SECRET).unwrap();
    let plaintext = old_cipher.decrypt(&old.record.ciphertext).unwrap();
    assert_eq!(secure_audit_trail::codec::decode(&plaintext).unwrap(), before);
}

#[tokio::test]
async fn test_blank_rotation_secret_changes_nothing() {
    let backup_dir = tempfile::tempdir().unwrap();
    let database = Database::new_in_memory().await.unwrap();
    let cipher = CipherBox::new(TEST_SECRET)
        .unwrap()
        .with_backup_dir(backup_dir.path());
    let mut ledger = ChainLedger::new(database, cipher, Arc::new(RecordingSignal::default()));

    let fingerprint = ledger.cipher().key_fingerprint();
    let err = ledger.rotate_key("   ").await.unwrap_err();
    assert!(matches!(err, AuditError::Misuse(_)));
    assert_eq!(ledger.cipher().key_fingerprint(), fingerprint);
    assert_eq!(std::fs::read_dir(backup_dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_recent_lists_newest_first() {
    let (ledger, _signal) = setup_ledger().await;
    for event_type in ["a", "b", "c", "d"] {
        ledger.append(event_type, &EventData::new()).await.unwrap();
    }

    let recent: Vec<String> = ledger
        .recent(3)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.event_type)
        .collect();
    assert_eq!(recent, vec!["d", "c", "b"]);
}

#[tokio::test]
async fn test_concurrent_appends_form_a_single_chain() {
    let (ledger, signal) = setup_ledger().await;
    let ledger = Arc::new(ledger);

    let appends = (0..16).map(|i| {
        let ledger = Arc::clone(&ledger);
        tokio::spawn(async move {
            ledger
                .append("concurrent", &EventData::new().with("n", i))
                .await
        })
    });

    for result in join_all(appends).await {
        result.unwrap().unwrap();
    }

    assert_eq!(all_records(&ledger).await.len(), 16);
    assert!(ledger.verify_integrity().await.unwrap());
    assert!(signal.reports().is_empty());
}

#[tokio::test]
async fn test_stale_writer_is_rejected_by_the_store() {
    let (ledger, _signal) = setup_ledger().await;
    ledger.append("login", &EventData::new()).await.unwrap();

    // A second writer that read the head before the first append landed
    let stale = NewRecord {
        event_type: "fork".to_string(),
        ciphertext: "forged".to_string(),
        event_hash: chain_hash("forged", GENESIS_HASH),
        previous_hash: GENESIS_HASH.to_string(),
        created_at: chrono::Utc::now(),
    };
    let err = ledger.store().insert_linked(stale).await.unwrap_err();
    assert!(matches!(err, AuditError::ChainConflict { .. }));
    assert!(err.is_store_failure());

    assert_eq!(all_records(&ledger).await.len(), 1);
    assert!(ledger.verify_integrity().await.unwrap());
}

#[tokio::test]
async fn test_two_ledgers_sharing_a_store_never_fork_the_chain() {
    let database = Database::new_in_memory().await.unwrap();
    let first = Arc::new(ChainLedger::new(
        database.clone(),
        CipherBox::new(TEST_SECRET).unwrap(),
        Arc::new(RecordingSignal::default()),
    ));
    let second = Arc::new(ChainLedger::new(
        database.clone(),
        CipherBox::new(TEST_SECRET).unwrap(),
        Arc::new(RecordingSignal::default()),
    ));

    let appends = (0..20).map(|i| {
        let ledger = if i % 2 == 0 {
            Arc::clone(&first)
        } else {
            Arc::clone(&second)
        };
        tokio::spawn(async move { ledger.append("shared", &EventData::new()).await })
    });

    let mut committed = 0;
    for result in join_all(appends).await {
        match result.unwrap() {
            Ok(_) => committed += 1,
            Err(AuditError::ChainConflict { .. }) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert!(committed >= 1);
    assert_eq!(all_records(&first).await.len(), committed);
    assert!(first.verify_integrity().await.unwrap());
}

#[tokio::test]
async fn test_open_record_distinguishes_missing_from_undecryptable() {
    let (ledger, _signal) = setup_ledger().await;
    let id = ledger
        .append("login", &EventData::new().with("user", "alice"))
        .await
        .unwrap();

    assert!(ledger.open_record(id + 100).await.unwrap().is_none());

    tamper_column(ledger.store(), id, "ciphertext", "bm90IGFuIGVudmVsb3Bl").await;
    let opened = ledger.open_record(id).await.unwrap().unwrap();
    assert_eq!(opened.payload, Err(AuthenticationFailure));
}
