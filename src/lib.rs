//! # company-resolution
//!
//! Entity resolution and merging for company records that arrive from
//! several uncoordinated ingestion paths (manual entry, bulk import,
//! external sync).
//!
//! ## Core Concepts
//!
//! - **CanonicalCompany**: the single surviving record for a real-world company
//! - **Cluster**: two or more live records believed to be the same company
//! - **Primary / Secondary**: the record kept by a merge, and the one absorbed
//! - **Soft retirement**: a merged record is flagged and forwards to its
//!   survivor; nothing is ever deleted
//!
//! ## Pipeline
//!
//! [`normalize`] → [`index`] → [`matcher`] → [`selector`] → [`merge`], with
//! [`migration`] running the same pipeline once across every legacy source.
//!
//! ## Usage
//!
//! ```rust
//! use company_resolution::{NewCompany, ResolutionConfig, ResolutionEngine};
//!
//! let engine = ResolutionEngine::in_memory(ResolutionConfig::default())?;
//!
//! let mut acme = NewCompany::named("Acme");
//! acme.domain = Some("https://www.acme.com".to_string());
//! acme.aliases = vec!["ACME Corp".to_string()];
//! let acme = engine.create_company(acme)?;
//!
//! let mut other = NewCompany::named("Acme Mexico");
//! other.domain = Some("acme.com".to_string());
//! engine.create_company(other)?;
//!
//! let groups = engine.find_duplicates(10)?;
//! assert_eq!(groups[0].selection.primary, acme.id);
//!
//! let summary = engine.auto_merge(None, false, "operator")?;
//! assert_eq!(summary.totals.merges_succeeded, 1);
//! # Ok::<(), company_resolution::ResolutionError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod audit;
pub mod company;
pub mod dependents;
pub mod error;
pub mod normalize;

// Detection pipeline
pub mod candidate;
pub mod index;
pub mod matcher;
pub mod selector;

// Mutation, configuration and storage
pub mod config;
pub mod engine;
pub mod merge;
pub mod migration;
pub mod storage;

// Re-export primary types at crate root for convenience
pub use audit::{AuditId, AuditKind, AuditRecord};
pub use company::{CanonicalCompany, Classification, CompanyId, LegacyKey, SourceKind};
pub use config::{BatchScope, ResolutionConfig};
pub use dependents::{Case, CaseId, CompanyRef, Contact, ContactId};
pub use engine::{CompanyPatch, DuplicateGroup, NewCompany, ResolutionEngine};
pub use error::{
    ConflictError, MergeSide, NotFoundError, ResolutionError, ResolutionResult, ValidationError,
};
pub use matcher::{Cluster, MatchType};
pub use merge::{BatchMergeSummary, BatchStatus, MergeRequest, MergeResult};
pub use migration::{LegacyRecord, MigrationOutcome, VerificationReport};
pub use selector::TieBreak;
pub use storage::{
    AuditStore, CaseStore, CompanyStore, ContactStore, IdMappingStore, InMemoryStores,
    StorageError,
};
