//! Recovery tests for persistent storage.
//!
//! These tests verify that the storage layer correctly handles:
//! - Merges surviving a restart
//! - Partial writes (simulated crash mid-write)
//! - CRC corruption detection
//! - The single-shot migration guard across restarts

#![cfg(feature = "persistent")]

use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

use company_resolution::storage::{open_database, PersistentStores};
use company_resolution::{
    CanonicalCompany, Classification, CompanyStore, Contact, ContactStore, LegacyRecord,
    MergeRequest, MigrationOutcome, NewCompany, ResolutionConfig, ResolutionEngine, SourceKind,
};
use tempfile::tempdir;

const WAL_FILE: &str = "company.wal";

fn engine_over(stores: PersistentStores) -> ResolutionEngine {
    ResolutionEngine::new(
        Arc::new(stores.companies),
        Arc::new(stores.contacts),
        Arc::new(stores.cases),
        Arc::new(stores.audit),
        Arc::new(stores.mappings),
        ResolutionConfig::default(),
    )
    .unwrap()
}

fn wal_len(dir: &Path) -> u64 {
    fs::metadata(dir.join(WAL_FILE)).unwrap().len()
}

/// A committed merge is fully visible after reopening.
#[test]
fn test_merge_survives_restart() {
    let dir = tempdir().unwrap();
    let (primary_id, secondary_id, contact_id);

    {
        let stores = open_database(dir.path(), None).unwrap();
        let contact = Contact::new("Ana Ruiz", "Pharma Beta");
        contact_id = contact.id;
        stores.contacts.insert(contact).unwrap();

        let engine = engine_over(stores);
        let primary = engine
            .create_company(NewCompany::named("Laboratorios Alfa"))
            .unwrap();
        let mut beta = NewCompany::named("Pharma Beta");
        beta.domain = Some("pharmabeta.com".to_string());
        let secondary = engine.create_company(beta).unwrap();
        primary_id = primary.id;
        secondary_id = secondary.id;

        let result = engine
            .merge(&MergeRequest::new(primary_id, secondary_id))
            .unwrap();
        assert_eq!(result.contacts_updated, 1);
    }

    let stores = open_database(dir.path(), None).unwrap();
    let primary = stores.companies.get(primary_id).unwrap().unwrap();
    assert_eq!(primary.version, 2);
    assert!(primary.has_alias("Pharma Beta"));
    assert!(primary.domains.contains("pharmabeta.com"));

    let secondary = stores.companies.get(secondary_id).unwrap().unwrap();
    assert!(secondary.is_merged);
    assert_eq!(secondary.merged_into_company_id, Some(primary_id));

    let contact = stores.contacts.get(contact_id).unwrap().unwrap();
    assert_eq!(contact.company, "Laboratorios Alfa");

    let engine = engine_over(stores);
    assert_eq!(engine.audit_log().unwrap().len(), 1);
    assert_eq!(engine.resolve(secondary_id).unwrap().id, primary_id);
}

/// A torn final entry is dropped and the log stays appendable.
#[test]
fn test_torn_tail_is_truncated_on_open() {
    let dir = tempdir().unwrap();

    {
        let stores = open_database(dir.path(), None).unwrap();
        for i in 0..5 {
            stores
                .companies
                .insert(CanonicalCompany::new(format!("company {i}"), Classification::Outbound))
                .unwrap();
        }
    }

    // Chop a few bytes off the last frame, as a crash mid-write would.
    {
        let file = fs::OpenOptions::new()
            .write(true)
            .open(dir.path().join(WAL_FILE))
            .unwrap();
        let size = file.metadata().unwrap().len();
        file.set_len(size - 3).unwrap();
    }

    let recovered = {
        let stores = open_database(dir.path(), None).unwrap();
        assert_eq!(stores.replayed, 4);
        let count = stores.companies.count().unwrap();
        assert_eq!(count, 4);
        stores
            .companies
            .insert(CanonicalCompany::new("after crash", Classification::Outbound))
            .unwrap();
        count
    };

    let stores = open_database(dir.path(), None).unwrap();
    assert_eq!(stores.companies.count().unwrap(), recovered + 1);
    assert_eq!(stores.companies.search_live("after crash", 5).unwrap().len(), 1);
}

/// A complete frame with a bad checksum refuses to open.
#[test]
fn test_crc_corruption_is_detected() {
    let dir = tempdir().unwrap();

    {
        let stores = open_database(dir.path(), None).unwrap();
        stores
            .companies
            .insert(CanonicalCompany::new("Acme", Classification::Outbound))
            .unwrap();
        stores
            .companies
            .insert(CanonicalCompany::new("Globex", Classification::Outbound))
            .unwrap();
    }

    // Flip a byte inside the first entry's payload (header 5 bytes, frame
    // prefix 5 bytes).
    {
        let path = dir.path().join(WAL_FILE);
        let mut file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .unwrap();
        file.seek(SeekFrom::Start(20)).unwrap();
        let mut byte = [0u8; 1];
        file.read_exact(&mut byte).unwrap();
        byte[0] ^= 0xFF;
        file.seek(SeekFrom::Start(20)).unwrap();
        file.write_all(&byte).unwrap();
    }

    let before = wal_len(dir.path());
    assert!(open_database(dir.path(), None).is_err());
    // Corruption is reported, never "repaired" by truncation.
    assert_eq!(wal_len(dir.path()), before);
}

/// Only one process may hold the data directory.
#[test]
fn test_directory_lock_is_exclusive() {
    let dir = tempdir().unwrap();
    let engine = engine_over(open_database(dir.path(), None).unwrap());

    assert!(open_database(dir.path(), None).is_err());

    drop(engine);
    open_database(dir.path(), None).unwrap();
}

/// The migration guard holds across restarts, and the id mapping persists.
#[test]
fn test_migration_is_single_shot_across_restarts() {
    let dir = tempdir().unwrap();
    let records: Vec<LegacyRecord> = serde_json::from_str(
        r#"[
            {"source": "manual_entry", "id": "m-1", "name": "Acme", "website": "acme.com"},
            {"source": "bulk_import", "row_id": "1", "company_name": "ACME", "domains": ["www.acme.com"]},
            {"source": "external_sync", "external_id": "org-9", "display_name": "Globex"}
        ]"#,
    )
    .unwrap();

    let acme_id = {
        let engine = engine_over(open_database(dir.path(), None).unwrap());
        let outcome = engine.migrate(records.clone(), "migration").unwrap();
        assert!(matches!(outcome, MigrationOutcome::Completed(_)));
        engine
            .lookup_legacy(SourceKind::BulkImport, "1")
            .unwrap()
            .unwrap()
            .id
    };

    let engine = engine_over(open_database(dir.path(), None).unwrap());
    let outcome = engine.migrate(records, "migration").unwrap();
    assert_eq!(outcome, MigrationOutcome::Skipped { existing: 2 });

    let acme = engine
        .lookup_legacy(SourceKind::ManualEntry, "m-1")
        .unwrap()
        .unwrap();
    assert_eq!(acme.id, acme_id);
    assert!(engine.verify().unwrap().passed());
}
