//! The view of a record that duplicate detection needs.
//!
//! Live canonical companies and not-yet-consolidated legacy rows both flow
//! through the same indexer, matcher and primary selector; this trait is the
//! seam between them.

use chrono::{DateTime, Utc};

use crate::company::{CanonicalCompany, CompanyId};

/// A record under consideration for duplicate detection.
pub trait Candidate {
    /// Stable identifier used in clusters.
    fn candidate_id(&self) -> CompanyId;

    /// Display name (un-normalized).
    fn candidate_name(&self) -> &str;

    /// Every raw domain-bearing value: the primary domain first, then the rest.
    fn domain_fields(&self) -> Vec<&str>;

    /// Retired records never participate.
    fn is_retired(&self) -> bool;

    /// Whether a primary domain is present.
    fn has_domain(&self) -> bool;

    /// Whether a primary industry is present.
    fn has_industry(&self) -> bool;

    /// Domains beyond the primary one.
    fn secondary_domain_count(&self) -> usize;

    /// Industries beyond the primary one.
    fn secondary_industry_count(&self) -> usize;

    /// Number of alternate names.
    fn alias_count(&self) -> usize;

    /// Carries an identifier issued by an external system.
    fn has_external_id(&self) -> bool;

    /// Marked active/live in the system it came from.
    fn is_active(&self) -> bool;

    /// Creation timestamp, if the source recorded one.
    fn created_at(&self) -> Option<DateTime<Utc>>;

    /// Last modification timestamp, if known.
    fn updated_at(&self) -> Option<DateTime<Utc>>;
}

impl Candidate for CanonicalCompany {
    fn candidate_id(&self) -> CompanyId {
        self.id
    }

    fn candidate_name(&self) -> &str {
        &self.name
    }

    fn domain_fields(&self) -> Vec<&str> {
        self.domain
            .as_deref()
            .into_iter()
            .chain(self.domains.iter().map(String::as_str))
            .collect()
    }

    fn is_retired(&self) -> bool {
        self.is_merged
    }

    fn has_domain(&self) -> bool {
        self.domain.as_deref().is_some_and(|d| !d.trim().is_empty())
    }

    fn has_industry(&self) -> bool {
        self.industry.as_deref().is_some_and(|i| !i.trim().is_empty())
    }

    fn secondary_domain_count(&self) -> usize {
        CanonicalCompany::secondary_domain_count(self)
    }

    fn secondary_industry_count(&self) -> usize {
        CanonicalCompany::secondary_industry_count(self)
    }

    fn alias_count(&self) -> usize {
        self.aliases.len()
    }

    fn has_external_id(&self) -> bool {
        CanonicalCompany::has_external_id(self)
    }

    fn is_active(&self) -> bool {
        self.is_live()
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        Some(self.created_at)
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        Some(self.updated_at)
    }
}
