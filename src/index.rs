//! Candidate indexing.
//!
//! Groups live candidates by exact structural equality of their normalized
//! domains and normalized names. No similarity judgment happens here; the
//! matcher consumes these buckets.

use std::collections::{BTreeMap, HashMap};

use crate::candidate::Candidate;
use crate::company::CompanyId;
use crate::normalize::{normalize_domain, normalize_name, Domain, NormalizedName};

/// Lookup structures over a candidate population.
///
/// Bucket members keep candidate input order, which the primary selector
/// relies on for tie-breaking.
#[derive(Debug, Clone, Default)]
pub struct CandidateIndex {
    order: Vec<CompanyId>,
    positions: HashMap<CompanyId, usize>,
    by_domain: BTreeMap<Domain, Vec<CompanyId>>,
    by_name: BTreeMap<NormalizedName, Vec<CompanyId>>,
}

impl CandidateIndex {
    /// Builds both indices over `candidates`, skipping retired records and
    /// repeated ids.
    #[must_use]
    pub fn build<C: Candidate>(candidates: &[C]) -> Self {
        let mut index = Self::default();

        for candidate in candidates {
            if candidate.is_retired() {
                continue;
            }
            let id = candidate.candidate_id();
            if index.positions.contains_key(&id) {
                continue;
            }
            index.positions.insert(id, index.order.len());
            index.order.push(id);

            for raw in candidate.domain_fields() {
                let Some(domain) = normalize_domain(raw) else {
                    continue;
                };
                let bucket = index.by_domain.entry(domain).or_default();
                if !bucket.contains(&id) {
                    bucket.push(id);
                }
            }

            let name = normalize_name(candidate.candidate_name());
            if !name.is_empty() {
                index.by_name.entry(name).or_default().push(id);
            }
        }

        index
    }

    /// Number of indexed (live) candidates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true if no candidate was indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Indexed candidate ids in input order.
    #[must_use]
    pub fn order(&self) -> &[CompanyId] {
        &self.order
    }

    /// Input position of a candidate, if indexed.
    #[must_use]
    pub fn position(&self, id: CompanyId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    /// Domain buckets in key order.
    pub fn domain_buckets(&self) -> impl Iterator<Item = (&Domain, &[CompanyId])> {
        self.by_domain.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Name buckets in key order.
    pub fn name_buckets(&self) -> impl Iterator<Item = (&NormalizedName, &[CompanyId])> {
        self.by_name.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Candidates carrying `domain` (already normalized).
    #[must_use]
    pub fn ids_for_domain(&self, domain: &Domain) -> &[CompanyId] {
        self.by_domain.get(domain).map_or(&[], Vec::as_slice)
    }

    /// Candidates whose name normalizes to `name`.
    #[must_use]
    pub fn ids_for_name(&self, name: &NormalizedName) -> &[CompanyId] {
        self.by_name.get(name).map_or(&[], Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::company::{CanonicalCompany, Classification};

    fn company(name: &str, domains: &[&str]) -> CanonicalCompany {
        let mut c = CanonicalCompany::new(name, Classification::Inbound);
        for (i, raw) in domains.iter().enumerate() {
            let d = normalize_domain(raw).unwrap();
            if i == 0 {
                c.set_domain(d);
            } else {
                c.add_domain(&d);
            }
        }
        c
    }

    #[test]
    fn test_groups_by_every_normalized_domain() {
        let a = company("Acme", &["acme.com", "acme.mx"]);
        let b = company("Acme Mexico", &["https://www.acme.mx/"]);
        let c = company("Other", &["other.com"]);
        let index = CandidateIndex::build(&[a.clone(), b.clone(), c]);

        assert_eq!(index.len(), 3);
        let mx = Domain::parse("acme.mx").unwrap();
        assert_eq!(index.ids_for_domain(&mx), &[a.id, b.id]);
        let com = Domain::parse("acme.com").unwrap();
        assert_eq!(index.ids_for_domain(&com), &[a.id]);
    }

    #[test]
    fn test_groups_by_normalized_name() {
        let a = company("Acme S.A. de C.V.", &[]);
        let b = company("ACME Inc.", &[]);
        let index = CandidateIndex::build(&[a.clone(), b.clone()]);
        let key = normalize_name("acme");
        assert_eq!(index.ids_for_name(&key), &[a.id, b.id]);
    }

    #[test]
    fn test_skips_retired_and_repeated_candidates() {
        let a = company("Acme", &["acme.com"]);
        let mut b = company("Acme", &["acme.com"]);
        b.retire(a.id, "test", chrono::Utc::now());
        let index = CandidateIndex::build(&[a.clone(), b, a.clone()]);

        assert_eq!(index.len(), 1);
        assert_eq!(index.order(), &[a.id]);
        assert_eq!(index.position(a.id), Some(0));
    }

    #[test]
    fn test_rejected_domains_are_not_indexed() {
        let mut a = CanonicalCompany::new("Solo", Classification::Inbound);
        a.domain = Some("gmail.com".to_string());
        let index = CandidateIndex::build(&[a]);
        assert_eq!(index.domain_buckets().count(), 0);
    }
}
