//! Error types for the resolution engine.
//!
//! Errors are strongly typed using thiserror and split by how a caller
//! should react: validation problems are never worth retrying, not-found
//! errors say which side of a merge was missing, and conflicts protect the
//! name-uniqueness and single-retirement invariants.

use std::fmt;

use thiserror::Error;

use crate::company::CompanyId;
use crate::storage::StorageError;

/// Which side of a merge an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergeSide {
    /// The record that survives the merge.
    Primary,
    /// The record absorbed into the primary.
    Secondary,
}

impl fmt::Display for MergeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Secondary => write!(f, "secondary"),
        }
    }
}

/// Validation errors that occur during input validation.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("cannot merge a record with itself: {id}")]
    SelfMerge {
        id: CompanyId,
    },

    #[error("Required field '{field}' is missing")]
    MissingField {
        field: String,
    },

    #[error("'{value}' is not a company domain")]
    InvalidDomain {
        value: String,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// A referenced company could not be resolved.
#[derive(Debug, Error)]
pub enum NotFoundError {
    #[error("{side} company not found: {id}")]
    MergeParty {
        side: MergeSide,
        id: CompanyId,
    },

    #[error("Company not found: {id}")]
    Company {
        id: CompanyId,
    },
}

/// Operations rejected because they would break a store invariant.
#[derive(Debug, Error)]
pub enum ConflictError {
    #[error("secondary already merged: {id} was merged into {merged_into:?}")]
    AlreadyMerged {
        id: CompanyId,
        merged_into: Option<CompanyId>,
    },

    #[error("primary {id} is retired and cannot absorb other companies")]
    PrimaryRetired {
        id: CompanyId,
    },

    #[error("alias already claimed by another company: '{alias}' belongs to {owner}")]
    AliasClaimed {
        alias: String,
        owner: CompanyId,
    },

    #[error("name '{name}' already resolves to live company {owner}")]
    NameClaimed {
        name: String,
        owner: CompanyId,
    },

    #[error("stale version for {id}: expected {expected}, found {actual}")]
    StaleVersion {
        id: CompanyId,
        expected: u64,
        actual: u64,
    },
}

/// Top-level error type for the resolution engine.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Not found: {0}")]
    NotFound(#[from] NotFoundError),

    #[error("Conflict: {0}")]
    Conflict(#[from] ConflictError),

    #[error("Storage error: {0}")]
    Storage(StorageError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl From<StorageError> for ResolutionError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::VersionConflict {
                id,
                expected,
                actual,
            } => Self::Conflict(ConflictError::StaleVersion {
                id,
                expected,
                actual,
            }),
            StorageError::CompanyNotFound(id) => Self::NotFound(NotFoundError::Company { id }),
            other => Self::Storage(other),
        }
    }
}

impl ResolutionError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a not-found error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true if this is a conflict error.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Which merge side failed to resolve, if this is a merge lookup failure.
    #[must_use]
    pub const fn missing_side(&self) -> Option<MergeSide> {
        match self {
            Self::NotFound(NotFoundError::MergeParty { side, .. }) => Some(*side),
            _ => None,
        }
    }

    /// Returns true if the caller may retry the same request.
    ///
    /// Nothing in this crate retries on its own; this only classifies.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Conflict(e) => matches!(e, ConflictError::StaleVersion { .. }),
            Self::Storage(e) => matches!(e, StorageError::BackendError(_)),
            Self::Validation(_) | Self::NotFound(_) | Self::Internal { .. } => false,
        }
    }
}

/// Result type alias for resolution operations.
pub type ResolutionResult<T> = Result<T, ResolutionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_merge_message() {
        let id = CompanyId::new();
        let err = ValidationError::SelfMerge { id };
        let msg = format!("{err}");
        assert!(msg.contains("cannot merge a record with itself"));
    }

    #[test]
    fn test_not_found_names_the_side() {
        let id = CompanyId::new();
        let err: ResolutionError = NotFoundError::MergeParty {
            side: MergeSide::Secondary,
            id,
        }
        .into();
        assert!(err.is_not_found());
        assert_eq!(err.missing_side(), Some(MergeSide::Secondary));
        assert!(err.to_string().contains("secondary company not found"));
    }

    #[test]
    fn test_alias_claimed_message() {
        let err = ConflictError::AliasClaimed {
            alias: "Acme".to_string(),
            owner: CompanyId::new(),
        };
        assert!(err.to_string().contains("alias already claimed by another company"));
    }

    #[test]
    fn test_version_conflict_maps_to_stale_version() {
        let id = CompanyId::new();
        let err: ResolutionError = StorageError::VersionConflict {
            id,
            expected: 2,
            actual: 3,
        }
        .into();
        assert!(err.is_conflict());
        assert!(err.is_retryable());
        assert!(matches!(
            err,
            ResolutionError::Conflict(ConflictError::StaleVersion { expected: 2, actual: 3, .. })
        ));
    }

    #[test]
    fn test_missing_company_maps_to_not_found() {
        let err: ResolutionError = StorageError::CompanyNotFound(CompanyId::new()).into();
        assert!(err.is_not_found());
        assert_eq!(err.missing_side(), None);
    }

    #[test]
    fn test_retryable_classification() {
        let err: ResolutionError = ValidationError::MissingField {
            field: "name".to_string(),
        }
        .into();
        assert!(!err.is_retryable());

        let err: ResolutionError = ConflictError::AlreadyMerged {
            id: CompanyId::new(),
            merged_into: None,
        }
        .into();
        assert!(!err.is_retryable());

        let err: ResolutionError = StorageError::BackendError("poisoned lock".to_string()).into();
        assert!(err.is_retryable());

        let err = ResolutionError::internal("unexpected state");
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("unexpected state"));
    }
}
