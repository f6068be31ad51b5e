//! Persisted audit trail for merges, batch runs and migrations.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::company::CompanyId;

/// Unique identifier for an audit record (the operation id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditId(Uuid);

impl AuditId {
    /// Creates a new random audit ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for AuditId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AuditId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What one merge changed on the primary and its dependents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeDelta {
    /// Surviving record.
    pub primary_id: CompanyId,
    /// Retired record.
    pub secondary_id: CompanyId,
    /// Primary name at merge time.
    pub primary_name: String,
    /// Secondary name at merge time; becomes an alias of the primary.
    pub secondary_name: String,
    /// Aliases the primary gained.
    pub aliases_added: Vec<String>,
    /// Domains the primary gained.
    pub domains_added: Vec<String>,
    /// Industries the primary gained.
    pub industries_added: Vec<String>,
    /// Contacts repointed to the primary.
    pub contacts_updated: usize,
    /// Cases repointed to the primary.
    pub cases_updated: usize,
}

/// A merge, or a whole cluster, that failed inside a batch run; the run
/// continued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItemError {
    /// Key of the cluster the merge belonged to.
    pub cluster_key: String,
    /// Intended primary; `None` when the cluster failed before one was
    /// selected.
    pub primary_id: Option<CompanyId>,
    /// Member that could not be merged or resolved.
    pub secondary_id: CompanyId,
    /// Rendered error.
    pub error: String,
}

/// Totals of a batch auto-merge run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchTotals {
    /// Clusters detected before the limit was applied.
    pub clusters_found: usize,
    /// Clusters actually worked on.
    pub clusters_processed: usize,
    /// Merges tried, successful or not.
    pub merges_attempted: usize,
    /// Merges that committed (or would have, in a dry run).
    pub merges_succeeded: usize,
    /// Contacts repointed across all merges.
    pub contacts_updated: usize,
    /// Cases repointed across all merges.
    pub cases_updated: usize,
}

/// Totals of a migration run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationTotals {
    /// Legacy records accepted as input.
    pub legacy_records: usize,
    /// Duplicate groups formed.
    pub groups: usize,
    /// Canonical companies inserted.
    pub canonical_created: usize,
    /// Legacy-key mappings written.
    pub mappings_written: usize,
    /// Legacy merge pointers carried over as forwarding.
    pub pointers_relinked: usize,
    /// Legacy merge pointers whose target was not migrated.
    pub pointers_unresolved: usize,
}

/// The operation an audit record describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum AuditKind {
    /// A single interactive merge.
    Merge(MergeDelta),
    /// One batch auto-merge run.
    BatchMerge {
        /// Run totals.
        totals: BatchTotals,
        /// One entry per successful merge.
        details: Vec<MergeDelta>,
        /// Merges that failed.
        errors: Vec<BatchItemError>,
    },
    /// The one-time legacy consolidation.
    Migration(MigrationTotals),
}

impl AuditKind {
    /// Stable operation name.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::Merge(_) => "merge",
            Self::BatchMerge { .. } => "batch_merge",
            Self::Migration(_) => "migration",
        }
    }
}

/// One persisted audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Record id.
    pub id: AuditId,
    /// When the operation finished.
    pub timestamp: DateTime<Utc>,
    /// Operator or job that triggered the operation.
    pub initiator: String,
    /// Operation payload.
    pub kind: AuditKind,
}

impl AuditRecord {
    /// Creates a record stamped with the current time.
    #[must_use]
    pub fn new(initiator: impl Into<String>, kind: AuditKind) -> Self {
        Self {
            id: AuditId::new(),
            timestamp: Utc::now(),
            initiator: initiator.into(),
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_serialize_with_operation_tag() {
        let record = AuditRecord::new(
            "ops@example.com",
            AuditKind::Migration(MigrationTotals {
                legacy_records: 3,
                groups: 2,
                canonical_created: 2,
                mappings_written: 3,
                pointers_relinked: 0,
                pointers_unresolved: 0,
            }),
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"]["operation"], "migration");
        assert_eq!(json["kind"]["canonical_created"], 2);
        assert_eq!(record.kind.operation(), "migration");
    }

    #[test]
    fn test_batch_record_keeps_errors() {
        let err = BatchItemError {
            cluster_key: "acme.com".to_string(),
            primary_id: Some(CompanyId::new()),
            secondary_id: CompanyId::new(),
            error: "secondary already merged".to_string(),
        };
        let kind = AuditKind::BatchMerge {
            totals: BatchTotals::default(),
            details: Vec::new(),
            errors: vec![err.clone()],
        };
        let json = serde_json::to_string(&kind).unwrap();
        let back: AuditKind = serde_json::from_str(&json).unwrap();
        match back {
            AuditKind::BatchMerge { errors, .. } => assert_eq!(errors, vec![err]),
            other => panic!("unexpected kind: {other:?}"),
        }
    }
}
