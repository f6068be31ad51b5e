//! In-memory storage backend.
//!
//! Thread-safe implementations of the storage traits. The `*State` types
//! hold the data and the validation rules; the persistent backend wraps the
//! same state types with a write-ahead log.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::sync::RwLock;

use crate::audit::{AuditId, AuditRecord};
use crate::company::{CanonicalCompany, CompanyId, LegacyKey};
use crate::dependents::{references_name, Case, CaseId, CompanyRef, Contact, ContactId};
use crate::normalize::fold_name_key;
use crate::storage::traits::{
    AuditStore, CaseStore, CompanyReferences, CompanyStore, ContactStore, IdMappingStore,
    StorageError,
};

pub(crate) fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

fn remove_from_index(index: &mut HashMap<String, HashSet<CompanyId>>, key: &str, id: CompanyId) {
    if let Some(set) = index.get_mut(key) {
        set.remove(&id);
        if set.is_empty() {
            index.remove(key);
        }
    }
}

// --- Companies ---

#[derive(Debug, Default)]
pub(crate) struct CompanyState {
    by_id: HashMap<CompanyId, CanonicalCompany>,
    order: Vec<CompanyId>,
    by_name: HashMap<String, HashSet<CompanyId>>,
    by_alias: HashMap<String, HashSet<CompanyId>>,
}

impl CompanyState {
    pub(crate) fn check_insert(&self, company: &CanonicalCompany) -> Result<(), StorageError> {
        if self.by_id.contains_key(&company.id) {
            return Err(StorageError::DuplicateKey(company.id.to_string()));
        }
        Ok(())
    }

    /// Validates a compare-and-swap update and returns the record as it
    /// will be stored.
    pub(crate) fn prepare_update(
        &self,
        mut company: CanonicalCompany,
        expected_version: u64,
    ) -> Result<CanonicalCompany, StorageError> {
        let prev = self
            .by_id
            .get(&company.id)
            .ok_or(StorageError::CompanyNotFound(company.id))?;

        if prev.version != expected_version {
            return Err(StorageError::VersionConflict {
                id: company.id,
                expected: expected_version,
                actual: prev.version,
            });
        }

        company.version = prev
            .version
            .checked_add(1)
            .ok_or_else(|| StorageError::BackendError("company version overflow".to_string()))?;
        Ok(company)
    }

    /// Stores `company` as-is, replacing any previous record with its id.
    pub(crate) fn put(&mut self, company: CanonicalCompany) {
        if let Some(prev) = self.by_id.get(&company.id) {
            let prev_name = fold_name_key(&prev.name);
            let prev_aliases: Vec<String> = prev.aliases.iter().map(|a| fold_name_key(a)).collect();
            remove_from_index(&mut self.by_name, &prev_name, company.id);
            for alias in prev_aliases {
                remove_from_index(&mut self.by_alias, &alias, company.id);
            }
        } else {
            self.order.push(company.id);
        }

        self.by_name
            .entry(fold_name_key(&company.name))
            .or_default()
            .insert(company.id);
        for alias in &company.aliases {
            self.by_alias
                .entry(fold_name_key(alias))
                .or_default()
                .insert(company.id);
        }
        self.by_id.insert(company.id, company);
    }

    pub(crate) fn get(&self, id: CompanyId) -> Option<CanonicalCompany> {
        self.by_id.get(&id).cloned()
    }

    fn iter_ordered(&self) -> impl Iterator<Item = &CanonicalCompany> {
        self.order.iter().filter_map(|id| self.by_id.get(id))
    }

    pub(crate) fn list_live(&self) -> Vec<CanonicalCompany> {
        self.iter_ordered().filter(|c| c.is_live()).cloned().collect()
    }

    pub(crate) fn list_all(&self) -> Vec<CanonicalCompany> {
        self.iter_ordered().cloned().collect()
    }

    pub(crate) fn count(&self) -> usize {
        self.by_id.len()
    }

    pub(crate) fn search_live(&self, query: &str, limit: usize) -> Vec<CanonicalCompany> {
        if limit == 0 {
            return Vec::new();
        }
        let query_key = fold_name_key(query);
        if query_key.is_empty() {
            return self
                .iter_ordered()
                .filter(|c| c.is_live())
                .take(limit)
                .cloned()
                .collect();
        }

        let mut scored: Vec<(u8, &CanonicalCompany)> = Vec::new();
        for company in self.iter_ordered().filter(|c| c.is_live()) {
            let name = fold_name_key(&company.name);
            let mut score = 0u8;
            if name.starts_with(&query_key) {
                score = 3;
            } else if name.contains(&query_key) {
                score = 2;
            }

            let in_aliases = company
                .aliases
                .iter()
                .any(|a| fold_name_key(a).contains(&query_key));
            let in_domains = company
                .domains
                .iter()
                .chain(company.domain.iter())
                .any(|d| d.contains(&query_key));
            if in_aliases || in_domains {
                score = score.max(1);
            }

            if score > 0 {
                scored.push((score, company));
            }
        }

        scored.sort_by(|(sa, a), (sb, b)| {
            sb.cmp(sa)
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.id.cmp(&b.id))
        });

        scored
            .into_iter()
            .take(limit)
            .map(|(_, c)| c.clone())
            .collect()
    }

    fn live_from_index(
        &self,
        index: &HashMap<String, HashSet<CompanyId>>,
        name: &str,
    ) -> Vec<CanonicalCompany> {
        let Some(ids) = index.get(&fold_name_key(name)) else {
            return Vec::new();
        };
        self.iter_ordered()
            .filter(|c| ids.contains(&c.id) && c.is_live())
            .cloned()
            .collect()
    }

    pub(crate) fn find_live_by_alias(&self, name: &str) -> Vec<CanonicalCompany> {
        self.live_from_index(&self.by_alias, name)
    }

    pub(crate) fn find_live_by_name(&self, name: &str) -> Vec<CanonicalCompany> {
        self.live_from_index(&self.by_name, name)
    }
}

/// Thread-safe in-memory company store.
#[derive(Debug, Default)]
pub struct InMemoryCompanyStore {
    state: RwLock<CompanyState>,
}

impl InMemoryCompanyStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CompanyStore for InMemoryCompanyStore {
    fn insert(&self, company: CanonicalCompany) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("company.insert"))?;
        state.check_insert(&company)?;
        state.put(company);
        Ok(())
    }

    fn get(&self, id: CompanyId) -> Result<Option<CanonicalCompany>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("company.get"))?;
        Ok(state.get(id))
    }

    fn update(
        &self,
        company: CanonicalCompany,
        expected_version: u64,
    ) -> Result<CanonicalCompany, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("company.update"))?;
        let stored = state.prepare_update(company, expected_version)?;
        state.put(stored.clone());
        Ok(stored)
    }

    fn list_live(&self) -> Result<Vec<CanonicalCompany>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("company.list_live"))?;
        Ok(state.list_live())
    }

    fn list_all(&self) -> Result<Vec<CanonicalCompany>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("company.list_all"))?;
        Ok(state.list_all())
    }

    fn count(&self) -> Result<usize, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("company.count"))?;
        Ok(state.count())
    }

    fn search_live(&self, query: &str, limit: usize) -> Result<Vec<CanonicalCompany>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("company.search_live"))?;
        Ok(state.search_live(query, limit))
    }

    fn find_live_by_alias(&self, name: &str) -> Result<Vec<CanonicalCompany>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("company.find_live_by_alias"))?;
        Ok(state.find_live_by_alias(name))
    }

    fn find_live_by_name(&self, name: &str) -> Result<Vec<CanonicalCompany>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("company.find_live_by_name"))?;
        Ok(state.find_live_by_name(name))
    }
}

// --- Dependents ---

/// A record holding a denormalized company reference.
pub(crate) trait Dependent: Clone {
    type Id: Copy + Eq + Hash + fmt::Debug + fmt::Display;

    fn dependent_id(&self) -> Self::Id;

    fn company_text(&self) -> &str;

    fn repoint(&mut self, from_name: &str, target: &CompanyRef) -> bool;
}

impl Dependent for Contact {
    type Id = ContactId;

    fn dependent_id(&self) -> ContactId {
        self.id
    }

    fn company_text(&self) -> &str {
        &self.company
    }

    fn repoint(&mut self, from_name: &str, target: &CompanyRef) -> bool {
        Contact::repoint(self, from_name, target)
    }
}

impl Dependent for Case {
    type Id = CaseId;

    fn dependent_id(&self) -> CaseId {
        self.id
    }

    fn company_text(&self) -> &str {
        &self.company_name
    }

    fn repoint(&mut self, from_name: &str, target: &CompanyRef) -> bool {
        Case::repoint(self, from_name, target)
    }
}

#[derive(Debug)]
pub(crate) struct DependentState<T: Dependent> {
    by_id: HashMap<T::Id, T>,
    order: Vec<T::Id>,
}

impl<T: Dependent> Default for DependentState<T> {
    fn default() -> Self {
        Self {
            by_id: HashMap::new(),
            order: Vec::new(),
        }
    }
}

impl<T: Dependent> DependentState<T> {
    pub(crate) fn check_insert(&self, record: &T) -> Result<(), StorageError> {
        let id = record.dependent_id();
        if self.by_id.contains_key(&id) {
            return Err(StorageError::DuplicateKey(id.to_string()));
        }
        Ok(())
    }

    pub(crate) fn put(&mut self, record: T) {
        let id = record.dependent_id();
        if self.by_id.insert(id, record).is_none() {
            self.order.push(id);
        }
    }

    pub(crate) fn get(&self, id: T::Id) -> Option<T> {
        self.by_id.get(&id).cloned()
    }

    pub(crate) fn list(&self) -> Vec<T> {
        self.order
            .iter()
            .filter_map(|id| self.by_id.get(id).cloned())
            .collect()
    }

    pub(crate) fn count_references(&self, name: &str) -> usize {
        self.by_id
            .values()
            .filter(|r| references_name(r.company_text(), name))
            .count()
    }

    pub(crate) fn rewrite_references(&mut self, from_name: &str, to: &CompanyRef) -> usize {
        self.by_id
            .values_mut()
            .map(|r| r.repoint(from_name, to))
            .filter(|changed| *changed)
            .count()
    }
}

/// Thread-safe in-memory contact store.
#[derive(Debug, Default)]
pub struct InMemoryContactStore {
    state: RwLock<DependentState<Contact>>,
}

impl InMemoryContactStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CompanyReferences for InMemoryContactStore {
    fn count_references(&self, name: &str) -> Result<usize, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("contact.count_references"))?;
        Ok(state.count_references(name))
    }

    fn rewrite_references(&self, from_name: &str, to: &CompanyRef) -> Result<usize, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("contact.rewrite_references"))?;
        Ok(state.rewrite_references(from_name, to))
    }
}

impl ContactStore for InMemoryContactStore {
    fn insert(&self, contact: Contact) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("contact.insert"))?;
        state.check_insert(&contact)?;
        state.put(contact);
        Ok(())
    }

    fn get(&self, id: ContactId) -> Result<Option<Contact>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("contact.get"))?;
        Ok(state.get(id))
    }

    fn list(&self) -> Result<Vec<Contact>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("contact.list"))?;
        Ok(state.list())
    }
}

/// Thread-safe in-memory case store.
#[derive(Debug, Default)]
pub struct InMemoryCaseStore {
    state: RwLock<DependentState<Case>>,
}

impl InMemoryCaseStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CompanyReferences for InMemoryCaseStore {
    fn count_references(&self, name: &str) -> Result<usize, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("case.count_references"))?;
        Ok(state.count_references(name))
    }

    fn rewrite_references(&self, from_name: &str, to: &CompanyRef) -> Result<usize, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("case.rewrite_references"))?;
        Ok(state.rewrite_references(from_name, to))
    }
}

impl CaseStore for InMemoryCaseStore {
    fn insert(&self, case: Case) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("case.insert"))?;
        state.check_insert(&case)?;
        state.put(case);
        Ok(())
    }

    fn get(&self, id: CaseId) -> Result<Option<Case>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("case.get"))?;
        Ok(state.get(id))
    }

    fn list(&self) -> Result<Vec<Case>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("case.list"))?;
        Ok(state.list())
    }
}

// --- Audit ---

#[derive(Debug, Default)]
pub(crate) struct AuditState {
    records: Vec<AuditRecord>,
    positions: HashMap<AuditId, usize>,
}

impl AuditState {
    pub(crate) fn check_append(&self, record: &AuditRecord) -> Result<(), StorageError> {
        if self.positions.contains_key(&record.id) {
            return Err(StorageError::DuplicateKey(record.id.to_string()));
        }
        Ok(())
    }

    pub(crate) fn push(&mut self, record: AuditRecord) {
        self.positions.insert(record.id, self.records.len());
        self.records.push(record);
    }

    pub(crate) fn get(&self, id: AuditId) -> Option<AuditRecord> {
        self.positions.get(&id).map(|&pos| self.records[pos].clone())
    }

    pub(crate) fn list(&self) -> Vec<AuditRecord> {
        self.records.clone()
    }
}

/// Thread-safe in-memory audit store.
#[derive(Debug, Default)]
pub struct InMemoryAuditStore {
    state: RwLock<AuditState>,
}

impl InMemoryAuditStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AuditStore for InMemoryAuditStore {
    fn append(&self, record: AuditRecord) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("audit.append"))?;
        state.check_append(&record)?;
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

#[derive(Debug, Default)]
pub(crate) struct MappingState {
    by_key: BTreeMap<LegacyKey, CompanyId>,
}

impl MappingState {
    pub(crate) fn check_insert(&self, key: &LegacyKey) -> Result<(), StorageError> {
        if self.by_key.contains_key(key) {
            return Err(StorageError::DuplicateKey(key.to_string()));
        }
        Ok(())
    }

    pub(crate) fn put(&mut self, key: LegacyKey, id: CompanyId) {
        self.by_key.insert(key, id);
    }

    pub(crate) fn lookup(&self, key: &LegacyKey) -> Option<CompanyId> {
        self.by_key.get(key).copied()
    }

    pub(crate) fn list(&self) -> Vec<(LegacyKey, CompanyId)> {
        self.by_key.iter().map(|(k, v)| (k.clone(), *v)).collect()
    }
}

/// Thread-safe in-memory legacy id mapping.
#[derive(Debug, Default)]
pub struct InMemoryIdMappingStore {
    state: RwLock<MappingState>,
}

impl InMemoryIdMappingStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdMappingStore for InMemoryIdMappingStore {
    fn insert(&self, key: LegacyKey, id: CompanyId) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("mapping.insert"))?;
        state.check_insert(&key)?;
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

/// Convenience bundle of all in-memory stores.
#[derive(Debug, Default)]
pub struct InMemoryStores {
    /// Canonical companies.
    pub companies: InMemoryCompanyStore,
    /// Contacts.
    pub contacts: InMemoryContactStore,
    /// Cases.
    pub cases: InMemoryCaseStore,
    /// Audit log.
    pub audit: InMemoryAuditStore,
    /// Legacy-key mappings.
    pub mappings: InMemoryIdMappingStore,
}

impl InMemoryStores {
    /// Create a new empty set of stores.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}
