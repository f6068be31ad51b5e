//! Per-field fold policy for one group of legacy records.
//!
//! Members arrive ordered by source priority. Scalars take the first
//! non-empty value, sets take the union, flags take the logical OR and
//! `created_at` takes the earliest timestamp seen.

use chrono::Utc;

use crate::candidate::Candidate;
use crate::company::{CanonicalCompany, LegacyKey};
use crate::config::MigrationConfig;
use crate::normalize::{domain_key, normalize_domain};

use super::source::LegacyView;

/// A canonical record built from a group, plus its unresolved forwarding
/// pointer.
#[derive(Debug, Clone)]
pub(crate) struct FoldedCompany {
    pub company: CanonicalCompany,
    pub members: Vec<LegacyKey>,
    /// Legacy key the group was merged into, relinked once every group has
    /// a canonical id.
    pub forward_to: Option<LegacyKey>,
}

/// Folds `members` (priority order, non-empty) into one canonical record.
pub(crate) fn fold_group(members: &[&LegacyView], config: &MigrationConfig) -> Option<FoldedCompany> {
    let first = members.first()?;

    let name = members
        .iter()
        .map(|m| m.record.name())
        .find(|n| !n.is_empty())
        .unwrap_or_default();
    let mut company = CanonicalCompany::with_id(first.id, name, config.default_classification);

    if let Some(domain) = members
        .iter()
        .filter_map(|m| m.record.domains().first().copied())
        .find_map(normalize_domain)
    {
        company.set_domain(domain);
    }
    for member in members {
        for raw in member.record.domains() {
            if let Some(key) = domain_key(raw) {
                company.domains.insert(key);
            }
        }
    }

    if let Some(industry) = members
        .iter()
        .find_map(|m| m.record.industries().first().copied())
    {
        company.set_industry(industry);
    }
    for member in members {
        for industry in member.record.industries() {
            company.add_industry(industry);
        }
    }

    for member in members {
        company.add_alias(member.record.name());
        for alias in member.record.aliases() {
            company.add_alias(alias);
        }
        company.add_legacy_id(member.key.source, member.key.legacy_id.as_str());
    }

    let forward_to = members.iter().find_map(|m| m.record.merged_into());
    company.is_merged = forward_to.is_some();

    if let Some(earliest) = members.iter().filter_map(|m| m.created_at()).min() {
        company.created_at = earliest;
    }
    company.updated_at = Utc::now();

    Some(FoldedCompany {
        company,
        members: members.iter().map(|m| m.key.clone()).collect(),
        forward_to,
    })
}
