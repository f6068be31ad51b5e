//! Persistent store implementations.
//!
//! Each store keeps the same in-memory state as its in-memory counterpart.
//! Writes validate under the state lock, append to the shared WAL, then
//! apply; a failed WAL append leaves state untouched.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::audit::{AuditId, AuditRecord};
use crate::company::{CanonicalCompany, CompanyId, LegacyKey};
use crate::dependents::{Case, CaseId, CompanyRef, Contact, ContactId};
use crate::storage::memory::{
    lock_err, AuditState, CompanyState, Dependent, DependentState, MappingState,
};
use crate::storage::traits::{
    AuditStore, CaseStore, CompanyReferences, CompanyStore, ContactStore, IdMappingStore,
    StorageError,
};

use super::file_lock::FileLock;
use super::wal::{DependentKind, WalEntryKind, WriteAheadLog};
use super::PersistentConfig;

fn wal_err(err: &std::io::Error) -> StorageError {
    StorageError::BackendError(format!("WAL write failed: {err}"))
}

/// Shared by every store of one database: keeps the directory lock alive for
/// as long as any store is.
#[derive(Debug)]
struct Backend {
    wal: WriteAheadLog,
    _lock: FileLock,
}

impl Backend {
    fn log(&self, kind: WalEntryKind) -> Result<u64, StorageError> {
        self.wal.append(kind).map_err(|e| wal_err(&e))
    }
}

/// All persistent stores of one data directory.
///
/// The stores can be moved out individually (for example into `Arc`s for a
/// [`crate::engine::ResolutionEngine`]); the directory stays locked until the
/// last of them is dropped.
#[derive(Debug)]
pub struct PersistentStores {
    /// The data directory.
    pub dir: PathBuf,
    /// Number of WAL entries applied while opening.
    pub replayed: u64,
    /// Canonical companies.
    pub companies: PersistentCompanyStore,
    /// Contacts.
    pub contacts: PersistentContactStore,
    /// Cases.
    pub cases: PersistentCaseStore,
    /// Audit log.
    pub audit: PersistentAuditStore,
    /// Legacy-key mappings.
    pub mappings: PersistentIdMappingStore,
}

impl PersistentStores {
    /// Open or create a database in `dir`, replaying its log.
    ///
    /// # Errors
    /// Fails if the directory cannot be created, another process holds the
    /// lock, or the log contains a corrupt entry.
    pub fn open(dir: &Path, config: &PersistentConfig) -> Result<Self, StorageError> {
        fs::create_dir_all(dir).map_err(|e| {
            StorageError::BackendError(format!("failed to create data directory: {e}"))
        })?;

        let lock = FileLock::acquire(dir)
            .map_err(|e| StorageError::BackendError(format!("failed to acquire lock: {e}")))?;

        let wal_path = dir.join(&config.wal_file_name);
        let wal = WriteAheadLog::open(&wal_path, config.sync_on_write)
            .map_err(|e| StorageError::BackendError(format!("failed to open WAL: {e}")))?;

        let backend = Arc::new(Backend { wal, _lock: lock });

        let mut stores = Self {
            dir: dir.to_path_buf(),
            replayed: 0,
            companies: PersistentCompanyStore::new(Arc::clone(&backend)),
            contacts: PersistentContactStore::new(Arc::clone(&backend)),
            cases: PersistentCaseStore::new(Arc::clone(&backend)),
            audit: PersistentAuditStore::new(Arc::clone(&backend)),
            mappings: PersistentIdMappingStore::new(Arc::clone(&backend)),
        };
        stores.replayed = stores.replay(&backend.wal)?;

        if stores.replayed > 0 {
            tracing::info!(
                dir = %dir.display(),
                entries = stores.replayed,
                "replayed write-ahead log"
            );
        }
        Ok(stores)
    }

    fn replay(&self, wal: &WriteAheadLog) -> Result<u64, StorageError> {
        let iter = wal
            .iter()
            .map_err(|e| StorageError::BackendError(format!("failed to iterate WAL: {e}")))?;

        let mut count = 0;
        for entry in iter {
            let entry = entry
                .map_err(|e| StorageError::BackendError(format!("corrupted WAL entry: {e}")))?;
            self.apply(entry.kind)?;
            count += 1;
        }
        Ok(count)
    }

    fn apply(&self, kind: WalEntryKind) -> Result<(), StorageError> {
        match kind {
            WalEntryKind::CompanyInsert(company) | WalEntryKind::CompanyUpdate(company) => {
                self.companies.write_state("company.replay")?.put(company);
            }
            WalEntryKind::ContactInsert(contact) => {
                self.contacts.inner.write_state("contact.replay")?.put(contact);
            }
            WalEntryKind::CaseInsert(case) => {
                self.cases.inner.write_state("case.replay")?.put(case);
            }
            WalEntryKind::ReferencesRewritten {
                target,
                from_name,
                to,
            } => {
                match target {
                    DependentKind::Contact => self
                        .contacts
                        .inner
                        .write_state("contact.replay")?
                        .rewrite_references(&from_name, &to),
                    DependentKind::Case => self
                        .cases
                        .inner
                        .write_state("case.replay")?
                        .rewrite_references(&from_name, &to),
                };
            }
            WalEntryKind::AuditAppend(record) => {
                self.audit
                    .state
                    .write()
                    .map_err(|_| lock_err("audit.replay"))?
                    .push(record);
            }
            WalEntryKind::MappingInsert { key, id } => {
                self.mappings
                    .state
                    .write()
                    .map_err(|_| lock_err("mapping.replay"))?
                    .put(key, id);
            }
        }
        Ok(())
    }

    /// Current WAL size in bytes.
    #[must_use]
    pub fn wal_size(&self) -> u64 {
        self.companies.backend.wal.size_bytes().unwrap_or(0)
    }

    /// Sequence number of the last logged mutation.
    #[must_use]
    pub fn wal_sequence(&self) -> u64 {
        self.companies.backend.wal.current_sequence()
    }
}

// --- Companies ---

/// WAL-backed company store.
#[derive(Debug)]
pub struct PersistentCompanyStore {
    backend: Arc<Backend>,
    state: RwLock<CompanyState>,
}

impl PersistentCompanyStore {
    fn new(backend: Arc<Backend>) -> Self {
        Self {
            backend,
            state: RwLock::new(CompanyState::default()),
        }
    }

    fn write_state(
        &self,
        context: &'static str,
    ) -> Result<std::sync::RwLockWriteGuard<'_, CompanyState>, StorageError> {
        self.state.write().map_err(|_| lock_err(context))
    }

    fn read_state(
        &self,
        context: &'static str,
    ) -> Result<std::sync::RwLockReadGuard<'_, CompanyState>, StorageError> {
        self.state.read().map_err(|_| lock_err(context))
    }
}

impl CompanyStore for PersistentCompanyStore {
    fn insert(&self, company: CanonicalCompany) -> Result<(), StorageError> {
        let mut state = self.write_state("company.insert")?;
        state.check_insert(&company)?;
        self.backend
            .log(WalEntryKind::CompanyInsert(company.clone()))?;
        state.put(company);
        Ok(())
    }

    fn get(&self, id: CompanyId) -> Result<Option<CanonicalCompany>, StorageError> {
        Ok(self.read_state("company.get")?.get(id))
    }

    fn update(
        &self,
        company: CanonicalCompany,
        expected_version: u64,
    ) -> Result<CanonicalCompany, StorageError> {
        let mut state = self.write_state("company.update")?;
        let stored = state.prepare_update(company, expected_version)?;
        self.backend
            .log(WalEntryKind::CompanyUpdate(stored.clone()))?;
        state.put(stored.clone());
        Ok(stored)
    }

    fn list_live(&self) -> Result<Vec<CanonicalCompany>, StorageError> {
        Ok(self.read_state("company.list_live")?.list_live())
    }

    fn list_all(&self) -> Result<Vec<CanonicalCompany>, StorageError> {
        Ok(self.read_state("company.list_all")?.list_all())
    }

    fn count(&self) -> Result<usize, StorageError> {
        Ok(self.read_state("company.count")?.count())
    }

    fn search_live(&self, query: &str, limit: usize) -> Result<Vec<CanonicalCompany>, StorageError> {
        Ok(self.read_state("company.search_live")?.search_live(query, limit))
    }

    fn find_live_by_alias(&self, name: &str) -> Result<Vec<CanonicalCompany>, StorageError> {
        Ok(self.read_state("company.find_live_by_alias")?.find_live_by_alias(name))
    }

    fn find_live_by_name(&self, name: &str) -> Result<Vec<CanonicalCompany>, StorageError> {
        Ok(self.read_state("company.find_live_by_name")?.find_live_by_name(name))
    }
}

// --- Dependents ---

#[derive(Debug)]
struct DependentLog<T: Dependent> {
    backend: Arc<Backend>,
    kind: DependentKind,
    state: RwLock<DependentState<T>>,
}

impl<T: Dependent> DependentLog<T> {
    fn new(backend: Arc<Backend>, kind: DependentKind) -> Self {
        Self {
            backend,
            kind,
            state: RwLock::new(DependentState::default()),
        }
    }

    fn write_state(
        &self,
        context: &'static str,
    ) -> Result<std::sync::RwLockWriteGuard<'_, DependentState<T>>, StorageError> {
        self.state.write().map_err(|_| lock_err(context))
    }

    fn read_state(
        &self,
        context: &'static str,
    ) -> Result<std::sync::RwLockReadGuard<'_, DependentState<T>>, StorageError> {
        self.state.read().map_err(|_| lock_err(context))
    }

    fn insert(&self, record: T, entry: WalEntryKind) -> Result<(), StorageError> {
        let mut state = self.write_state("dependent.insert")?;
        state.check_insert(&record)?;
        self.backend.log(entry)?;
        state.put(record);
        Ok(())
    }

    fn rewrite(&self, from_name: &str, to: &CompanyRef) -> Result<usize, StorageError> {
        let mut state = self.write_state("dependent.rewrite_references")?;
        if state.count_references(from_name) == 0 {
            return Ok(0);
        }
        self.backend.log(WalEntryKind::ReferencesRewritten {
            target: self.kind,
            from_name: from_name.to_string(),
            to: to.clone(),
        })?;
        Ok(state.rewrite_references(from_name, to))
    }
}

/// WAL-backed contact store.
#[derive(Debug)]
pub struct PersistentContactStore {
    inner: DependentLog<Contact>,
}

impl PersistentContactStore {
    fn new(backend: Arc<Backend>) -> Self {
        Self {
            inner: DependentLog::new(backend, DependentKind::Contact),
        }
    }
}

impl CompanyReferences for PersistentContactStore {
    fn count_references(&self, name: &str) -> Result<usize, StorageError> {
        Ok(self.inner.read_state("contact.count_references")?.count_references(name))
    }

    fn rewrite_references(&self, from_name: &str, to: &CompanyRef) -> Result<usize, StorageError> {
        self.inner.rewrite(from_name, to)
    }
}

impl ContactStore for PersistentContactStore {
    fn insert(&self, contact: Contact) -> Result<(), StorageError> {
        let entry = WalEntryKind::ContactInsert(contact.clone());
        self.inner.insert(contact, entry)
    }

    fn get(&self, id: ContactId) -> Result<Option<Contact>, StorageError> {
        Ok(self.inner.read_state("contact.get")?.get(id))
    }

    fn list(&self) -> Result<Vec<Contact>, StorageError> {
        Ok(self.inner.read_state("contact.list")?.list())
    }
}

/// WAL-backed case store.
#[derive(Debug)]
pub struct PersistentCaseStore {
    inner: DependentLog<Case>,
}

impl PersistentCaseStore {
    fn new(backend: Arc<Backend>) -> Self {
        Self {
            inner: DependentLog::new(backend, DependentKind::Case),
        }
    }
}

impl CompanyReferences for PersistentCaseStore {
    fn count_references(&self, name: &str) -> Result<usize, StorageError> {
        Ok(self.inner.read_state("case.count_references")?.count_references(name))
    }

    fn rewrite_references(&self, from_name: &str, to: &CompanyRef) -> Result<usize, StorageError> {
        self.inner.rewrite(from_name, to)
    }
}

impl CaseStore for PersistentCaseStore {
    fn insert(&self, case: Case) -> Result<(), StorageError> {
        let entry = WalEntryKind::CaseInsert(case.clone());
        self.inner.insert(case, entry)
    }

    fn get(&self, id: CaseId) -> Result<Option<Case>, StorageError> {
        Ok(self.inner.read_state("case.get")?.get(id))
    }

    fn list(&self) -> Result<Vec<Case>, StorageError> {
        Ok(self.inner.read_state("case.list")?.list())
    }
}

// --- Audit ---

/// WAL-backed audit store.
#[derive(Debug)]
pub struct PersistentAuditStore {
    backend: Arc<Backend>,
    state: RwLock<AuditState>,
}

impl PersistentAuditStore {
    fn new(backend: Arc<Backend>) -> Self {
        Self {
            backend,
            state: RwLock::new(AuditState::default()),
        }
    }
}

impl AuditStore for PersistentAuditStore {
    fn append(&self, record: AuditRecord) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("audit.append"))?;
        state.check_append(&record)?;
        self.backend.log(WalEntryKind::AuditAppend(record.clone()))?;
        state.push(record);
        Ok(())
    }

    fn get(&self, id: AuditId) -> Result<Option<AuditRecord>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("audit.get"))?;
        Ok(state.get(id))
    }

    fn list(&self) -> Result<Vec<AuditRecord>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("audit.list"))?;
        Ok(state.list())
    }
}

// --- ID mapping ---

/// WAL-backed legacy id mapping.
#[derive(Debug)]
pub struct PersistentIdMappingStore {
    backend: Arc<Backend>,
    state: RwLock<MappingState>,
}

impl PersistentIdMappingStore {
    fn new(backend: Arc<Backend>) -> Self {
        Self {
            backend,
            state: RwLock::new(MappingState::default()),
        }
    }
}

impl IdMappingStore for PersistentIdMappingStore {
    fn insert(&self, key: LegacyKey, id: CompanyId) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("mapping.insert"))?;
        state.check_insert(&key)?;
        self.backend.log(WalEntryKind::MappingInsert {
            key: key.clone(),
            id,
        })?;
        state.put(key, id);
        Ok(())
    }

    fn lookup(&self, key: &LegacyKey) -> Result<Option<CompanyId>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("mapping.lookup"))?;
        Ok(state.lookup(key))
    }

    fn list(&self) -> Result<Vec<(LegacyKey, CompanyId)>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("mapping.list"))?;
        Ok(state.list())
    }
}
