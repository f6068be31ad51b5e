//! Storage traits and backends.
//!
//! The engine only talks to the traits in this module. `InMemoryStores` is
//! always available; the WAL-backed `PersistentStores` needs the
//! `persistent` feature.

mod memory;
mod traits;

#[cfg(feature = "persistent")]
pub mod persistent;

pub use memory::{
    InMemoryAuditStore, InMemoryCaseStore, InMemoryCompanyStore, InMemoryContactStore,
    InMemoryIdMappingStore, InMemoryStores,
};
pub use traits::{
    AuditStore, CaseStore, CompanyReferences, CompanyStore, ContactStore, IdMappingStore,
    StorageError,
};

#[cfg(feature = "persistent")]
pub use persistent::{open_database, PersistentConfig, PersistentStores};
