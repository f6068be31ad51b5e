//! Write-ahead log.
//!
//! Every mutation is appended (and optionally fsynced) before it is applied
//! to in-memory state. On open the log is replayed from the start.
//!
//! # File Format
//! ```text
//! [MAGIC: 4 bytes][VERSION: 1 byte]
//! [ENTRY 1: codec-encoded WalEntry]
//! [ENTRY 2: codec-encoded WalEntry]
//! ...
//! ```
//!
//! A crash mid-append leaves a torn final frame. Opening the log detects it,
//! truncates the file back to the last complete entry, and appends from
//! there.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Result as IoResult, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::AuditRecord;
use crate::company::{CanonicalCompany, CompanyId, LegacyKey};
use crate::dependents::{Case, CompanyRef, Contact};

use super::codec;

/// A single entry in the write-ahead log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalEntry {
    /// Monotonically increasing sequence number.
    pub sequence: u64,
    /// When this entry was written.
    pub timestamp: DateTime<Utc>,
    /// The mutation being logged.
    pub kind: WalEntryKind,
}

/// Which dependent collection a reference rewrite touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependentKind {
    /// Contacts.
    Contact,
    /// Cases.
    Case,
}

/// The type of WAL entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WalEntryKind {
    /// New company, as stored.
    CompanyInsert(CanonicalCompany),
    /// Company after a successful compare-and-swap (version already bumped).
    CompanyUpdate(CanonicalCompany),
    /// New contact.
    ContactInsert(Contact),
    /// New case.
    CaseInsert(Case),
    /// Bulk rewrite of denormalized references.
    ReferencesRewritten {
        /// Collection that was rewritten.
        target: DependentKind,
        /// Name that was matched.
        from_name: String,
        /// Company the matches now point at.
        to: CompanyRef,
    },
    /// Audit record appended.
    AuditAppend(AuditRecord),
    /// Legacy id mapping written.
    MappingInsert {
        /// Legacy key.
        key: LegacyKey,
        /// Canonical id it maps to.
        id: CompanyId,
    },
}

#[derive(Debug)]
struct WalWriter {
    writer: BufWriter<File>,
    sequence: u64,
}

/// Write-ahead log shared by every persistent store.
///
/// Thread-safe via an internal mutex.
#[derive(Debug)]
pub struct WriteAheadLog {
    path: PathBuf,
    inner: Mutex<WalWriter>,
    sync_on_write: bool,
}

impl WriteAheadLog {
    /// Open or create a WAL file.
    ///
    /// An existing file is scanned to find the last sequence number; a torn
    /// trailing frame is cut off.
    ///
    /// # Errors
    /// Fails on I/O errors, a bad header, or a checksum mismatch before the
    /// end of the file.
    pub fn open(path: &Path, sync_on_write: bool) -> IoResult<Self> {
        let existing_len = match std::fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == ErrorKind::NotFound => 0,
            Err(e) => return Err(e),
        };

        let sequence = if existing_len >= codec::HEADER_LEN {
            let (last_sequence, valid_len) = Self::scan(path)?;
            if valid_len < existing_len {
                tracing::warn!(
                    path = %path.display(),
                    valid_len,
                    file_len = existing_len,
                    "truncating torn write-ahead log tail"
                );
                let file = OpenOptions::new().write(true).open(path)?;
                file.set_len(valid_len)?;
                file.sync_all()?;
            }
            last_sequence
        } else {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)?;
            codec::write_header(&mut file)?;
            file.sync_all()?;
            0
        };

        let file = OpenOptions::new().append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(WalWriter {
                writer: BufWriter::new(file),
                sequence,
            }),
            sync_on_write,
        })
    }

    /// Append an entry, returning its sequence number.
    ///
    /// # Errors
    /// Fails if the entry cannot be encoded or written.
    pub fn append(&self, kind: WalEntryKind) -> IoResult<u64> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        let sequence = inner.sequence + 1;
        let entry = WalEntry {
            sequence,
            timestamp: Utc::now(),
            kind,
        };
        let encoded = codec::encode(&entry)?;

        inner.writer.write_all(&encoded)?;
        inner.writer.flush()?;
        if self.sync_on_write {
            inner.writer.get_ref().sync_all()?;
        }

        inner.sequence = sequence;
        Ok(sequence)
    }

    /// Iterate over all entries, oldest first.
    ///
    /// # Errors
    /// Fails if the file cannot be opened or its header is invalid.
    pub fn iter(&self) -> IoResult<WalIterator> {
        WalIterator::new(&self.path)
    }

    /// Sequence number of the last appended entry (0 for an empty log).
    #[must_use]
    pub fn current_sequence(&self) -> u64 {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).sequence
    }

    /// Size of the log file in bytes.
    ///
    /// # Errors
    /// Fails if the file metadata cannot be read.
    pub fn size_bytes(&self) -> IoResult<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `(last sequence, byte length of the valid prefix)`.
    fn scan(path: &Path) -> IoResult<(u64, u64)> {
        let mut iter = WalIterator::new(path)?;
        let mut last_sequence = 0;
        let mut valid_len = iter.position()?;

        while let Some(entry) = iter.next() {
            last_sequence = entry?.sequence;
            valid_len = iter.position()?;
        }
        Ok((last_sequence, valid_len))
    }
}

/// Iterator over WAL entries.
///
/// Ends at end of file or at a torn trailing frame; yields an error for a
/// frame that is complete but corrupt.
pub struct WalIterator {
    reader: BufReader<File>,
    file_size: u64,
}

impl WalIterator {
    fn new(path: &Path) -> IoResult<Self> {
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        codec::read_header(&mut reader)?;
        Ok(Self { reader, file_size })
    }

    fn position(&mut self) -> IoResult<u64> {
        self.reader.stream_position()
    }
}

impl Iterator for WalIterator {
    type Item = IoResult<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.position() {
            Ok(pos) if pos >= self.file_size => return None,
            Ok(_) => {}
            Err(e) => return Some(Err(e)),
        }

        match codec::decode(&mut self.reader) {
            Ok(entry) => Some(Ok(entry)),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => None,
            Err(e) => Some(Err(e)),
        }
    }
}
