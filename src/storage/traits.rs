//! Abstract storage traits for the resolution engine.
//!
//! These traits define the contract that storage backends must implement.
//! The in-memory backend serves tests and embedded use; the persistent
//! backend (feature `persistent`) adds a write-ahead log on top of the same
//! in-memory state.

use thiserror::Error;

use crate::audit::{AuditId, AuditRecord};
use crate::company::{CanonicalCompany, CompanyId, LegacyKey};
use crate::dependents::{Case, CaseId, CompanyRef, Contact, ContactId};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Company not found.
    #[error("Company not found: {0}")]
    CompanyNotFound(CompanyId),

    /// Compare-and-swap update lost against a concurrent writer.
    #[error("Version conflict for {id}: expected {expected}, stored {actual}")]
    VersionConflict {
        id: CompanyId,
        expected: u64,
        actual: u64,
    },

    /// Key already exists.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// Backend error.
    #[error("Storage backend error: {0}")]
    BackendError(String),

    /// Serialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Storage trait for canonical companies.
///
/// Companies are never deleted; retirement is an update that sets
/// `is_merged`.
pub trait CompanyStore: Send + Sync {
    /// Insert a new company. Returns error if the ID already exists.
    fn insert(&self, company: CanonicalCompany) -> Result<(), StorageError>;

    /// Get a company by ID, live or retired.
    fn get(&self, id: CompanyId) -> Result<Option<CanonicalCompany>, StorageError>;

    /// Replace a company if its stored version still equals `expected_version`.
    ///
    /// The store assigns `expected_version + 1` and returns the stored record.
    ///
    /// # Errors
    /// - `CompanyNotFound` if the ID is unknown
    /// - `VersionConflict` if another writer got there first
    fn update(
        &self,
        company: CanonicalCompany,
        expected_version: u64,
    ) -> Result<CanonicalCompany, StorageError>;

    /// All non-retired companies in insertion order.
    fn list_live(&self) -> Result<Vec<CanonicalCompany>, StorageError>;

    /// Every company, retired ones included, in insertion order.
    fn list_all(&self) -> Result<Vec<CanonicalCompany>, StorageError>;

    /// Number of stored companies, retired ones included.
    fn count(&self) -> Result<usize, StorageError>;

    /// Live companies whose name, an alias or a domain contains `query`
    /// (case-insensitive). Name prefix matches rank first.
    fn search_live(&self, query: &str, limit: usize) -> Result<Vec<CanonicalCompany>, StorageError>;

    /// Live companies carrying `name` as an alias (case-insensitive).
    fn find_live_by_alias(&self, name: &str) -> Result<Vec<CanonicalCompany>, StorageError>;

    /// Live companies whose primary name equals `name` (case-insensitive).
    fn find_live_by_name(&self, name: &str) -> Result<Vec<CanonicalCompany>, StorageError>;
}

/// Bulk rewrite of denormalized company references.
///
/// Matching is exact after trimming and ASCII case-insensitive; see
/// [`crate::dependents::references_name`].
pub trait CompanyReferences: Send + Sync {
    /// Number of records that currently reference `name`.
    fn count_references(&self, name: &str) -> Result<usize, StorageError>;

    /// Repoints every record referencing `from_name` at `to` and returns the
    /// number of records changed.
    fn rewrite_references(&self, from_name: &str, to: &CompanyRef) -> Result<usize, StorageError>;
}

/// Storage trait for contacts.
pub trait ContactStore: CompanyReferences {
    /// Insert a new contact.
    fn insert(&self, contact: Contact) -> Result<(), StorageError>;

    /// Get a contact by ID.
    fn get(&self, id: ContactId) -> Result<Option<Contact>, StorageError>;

    /// All contacts in insertion order.
    fn list(&self) -> Result<Vec<Contact>, StorageError>;
}

/// Storage trait for cases.
pub trait CaseStore: CompanyReferences {
    /// Insert a new case.
    fn insert(&self, case: Case) -> Result<(), StorageError>;

    /// Get a case by ID.
    fn get(&self, id: CaseId) -> Result<Option<Case>, StorageError>;

    /// All cases in insertion order.
    fn list(&self) -> Result<Vec<Case>, StorageError>;
}

/// Append-only audit trail.
pub trait AuditStore: Send + Sync {
    /// Append a record. Returns error if the ID already exists.
    fn append(&self, record: AuditRecord) -> Result<(), StorageError>;

    /// Get a record by ID.
    fn get(&self, id: AuditId) -> Result<Option<AuditRecord>, StorageError>;

    /// All records, oldest first.
    fn list(&self) -> Result<Vec<AuditRecord>, StorageError>;
}

/// `(source, legacy_id) -> canonical id` mapping written by the migration.
pub trait IdMappingStore: Send + Sync {
    /// Record a mapping. A key can be mapped only once.
    fn insert(&self, key: LegacyKey, id: CompanyId) -> Result<(), StorageError>;

    /// Look up the canonical id for a legacy key.
    fn lookup(&self, key: &LegacyKey) -> Result<Option<CompanyId>, StorageError>;

    /// Every mapping, ordered by key.
    fn list(&self) -> Result<Vec<(LegacyKey, CompanyId)>, StorageError>;
}
