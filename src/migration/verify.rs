//! Post-migration integrity checks.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::company::{CanonicalCompany, Classification};

/// Result of checking the canonical store after a migration.
///
/// `classification` is an enum on [`CanonicalCompany`], so "missing
/// classification" cannot occur; the classification checks instead catch a
/// fold policy that leaked a source value through.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Records checked.
    pub total: usize,
    /// Records whose id is nil.
    pub missing_id: usize,
    /// Records with a blank name.
    pub missing_name: usize,
    /// Records not carrying the default classification.
    pub non_default_classification: usize,
    /// Records carrying the default classification.
    pub default_classification_count: usize,
    /// Retired records whose forwarding target is absent or unknown.
    pub dangling_pointers: usize,
}

impl VerificationReport {
    /// Returns true if every check holds.
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.missing_id == 0
            && self.missing_name == 0
            && self.non_default_classification == 0
            && self.default_classification_count == self.total
            && self.dangling_pointers == 0
    }
}

/// Checks `companies` against the migration invariants.
#[must_use]
pub fn verify_companies(
    companies: &[CanonicalCompany],
    default_classification: Classification,
) -> VerificationReport {
    let ids: HashSet<_> = companies.iter().map(|c| c.id).collect();
    let mut report = VerificationReport {
        total: companies.len(),
        ..VerificationReport::default()
    };

    for company in companies {
        if company.id.is_nil() {
            report.missing_id += 1;
        }
        if company.name.trim().is_empty() {
            report.missing_name += 1;
        }
        if company.classification == default_classification {
            report.default_classification_count += 1;
        } else {
            report.non_default_classification += 1;
        }
        if company.is_merged
            && !company
                .merged_into_company_id
                .is_some_and(|target| ids.contains(&target))
        {
            report.dangling_pointers += 1;
        }
    }

    if !report.passed() {
        tracing::warn!(
            total = report.total,
            missing_id = report.missing_id,
            missing_name = report.missing_name,
            non_default_classification = report.non_default_classification,
            dangling_pointers = report.dangling_pointers,
            "verification failed"
        );
    }
    report
}
