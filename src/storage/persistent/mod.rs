//! Persistent storage backend.
//!
//! Durable storage for companies, dependents, audit records and legacy id
//! mappings:
//! - one append-only write-ahead log, replayed on open
//! - CRC32 framing per entry to detect corruption
//! - an exclusive directory lock so only one process writes at a time
//!
//! # Layout
//!
//! ```text
//! <dir>/
//! ├── .lock          advisory lock (flock / LockFileEx)
//! └── company.wal    [header][entry][entry]...
//! ```

mod codec;
mod file_lock;
mod stores;
mod wal;

pub use file_lock::{FileLock, LOCK_FILE_NAME};
pub use stores::{
    PersistentAuditStore, PersistentCaseStore, PersistentCompanyStore, PersistentContactStore,
    PersistentIdMappingStore, PersistentStores,
};
pub use wal::{DependentKind, WalEntry, WalEntryKind, WalIterator, WriteAheadLog};

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ResolutionResult, ValidationError};

/// Configuration for persistent storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistentConfig {
    /// Whether to fsync after every write (slower but safer).
    pub sync_on_write: bool,
    /// File name of the log inside the data directory.
    pub wal_file_name: String,
}

impl Default for PersistentConfig {
    fn default() -> Self {
        Self {
            sync_on_write: true,
            wal_file_name: "company.wal".to_string(),
        }
    }
}

impl PersistentConfig {
    /// Checks the configuration.
    ///
    /// # Errors
    /// Rejects an empty log file name or one containing a path separator.
    pub fn validate(self) -> ResolutionResult<Self> {
        let name = self.wal_file_name.trim();
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(ValidationError::InvalidConfig {
                reason: format!(
                    "wal_file_name must be a plain file name (got '{}')",
                    self.wal_file_name
                ),
            }
            .into());
        }
        if name == LOCK_FILE_NAME {
            return Err(ValidationError::InvalidConfig {
                reason: format!("wal_file_name cannot be '{LOCK_FILE_NAME}'"),
            }
            .into());
        }
        Ok(self)
    }
}

/// Open or create a persistent database at the given path.
///
/// # Arguments
/// * `path` - Directory to store the database files
/// * `config` - Optional configuration (uses defaults if None)
///
/// # Errors
/// - If the configuration is invalid
/// - If the path cannot be created or accessed
/// - If another process holds the lock
/// - If WAL replay fails due to corruption
///
/// # Example
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use company_resolution::storage::open_database;
/// use company_resolution::{ResolutionConfig, ResolutionEngine};
///
/// let stores = open_database("./companies.db", None)?;
/// let engine = ResolutionEngine::new(
///     Arc::new(stores.companies),
///     Arc::new(stores.contacts),
///     Arc::new(stores.cases),
///     Arc::new(stores.audit),
///     Arc::new(stores.mappings),
///     ResolutionConfig::default(),
/// )?;
/// # Ok::<(), company_resolution::ResolutionError>(())
/// ```
pub fn open_database(
    path: impl AsRef<Path>,
    config: Option<PersistentConfig>,
) -> ResolutionResult<PersistentStores> {
    let cfg = config.unwrap_or_default().validate()?;
    Ok(PersistentStores::open(path.as_ref(), &cfg)?)
}
