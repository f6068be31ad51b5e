//! Duplicate clustering.
//!
//! Two independent passes over a [`CandidateIndex`]:
//!
//! - **Domain pass**: every domain bucket with two or more candidates is a
//!   cluster with confidence 100.
//! - **Name pass**: exact normalized-name buckets first (confidence 100),
//!   then a greedy single-hop fuzzy sweep over the names the exact stage left
//!   unprocessed.
//!
//! The fuzzy sweep compares every unprocessed name against the current seed
//! only. A name that misses the seed but would match another member is not
//! picked up by a second sweep.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::company::CompanyId;
use crate::index::CandidateIndex;
use crate::normalize::{NormalizedName, MIN_FUZZY_NAME_LEN};

/// Confidence assigned to exact (domain or normalized-name) matches.
pub const EXACT_CONFIDENCE: u8 = 100;

/// Which pass produced a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// Members share a normalized domain.
    ExactDomain,
    /// Members share a normalized name.
    ExactNormalizedName,
    /// Members' normalized names are similar to the cluster seed.
    FuzzyName,
}

impl MatchType {
    /// Returns true for clusters produced by the domain pass.
    #[must_use]
    pub const fn is_domain(&self) -> bool {
        matches!(self, Self::ExactDomain)
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExactDomain => write!(f, "exact_domain"),
            Self::ExactNormalizedName => write!(f, "exact_normalized_name"),
            Self::FuzzyName => write!(f, "fuzzy_name"),
        }
    }
}

/// Two or more candidates believed to be the same real-world company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    /// Which pass produced the cluster.
    pub match_type: MatchType,
    /// 0-100; kept for observability, consumers treat clusters uniformly.
    pub confidence: u8,
    /// The shared domain, or the seed's normalized name.
    pub key: String,
    /// Member ids in candidate input order.
    pub members: Vec<CompanyId>,
}

impl Cluster {
    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Always false for clusters produced by the matcher.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Fuzzy matching knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Minimum similarity ratio (0-100) for two names to match.
    pub fuzzy_threshold: u8,
    /// Normalized names shorter than this never take part in fuzzy matching.
    pub min_fuzzy_name_len: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 80,
            min_fuzzy_name_len: MIN_FUZZY_NAME_LEN,
        }
    }
}

/// Edit-distance similarity of two strings on a 0-100 scale.
///
/// # Examples
///
/// ```
/// use company_resolution::matcher::similarity_ratio;
///
/// assert_eq!(similarity_ratio("acme", "acme"), 100);
/// assert!(similarity_ratio("laboratorios alfa", "laboratorio alfa") >= 90);
/// assert!(similarity_ratio("acme", "zeta") < 50);
/// ```
#[must_use]
pub fn similarity_ratio(a: &str, b: &str) -> u8 {
    let ratio = strsim::normalized_levenshtein(a, b) * 100.0;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let score = ratio.round().clamp(0.0, 100.0) as u8;
    score
}

/// Produces duplicate clusters from a candidate index.
#[derive(Debug, Clone, Default)]
pub struct SimilarityMatcher {
    config: MatcherConfig,
}

impl SimilarityMatcher {
    /// Creates a matcher with the given configuration.
    #[must_use]
    pub const fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Runs both passes, concatenates them, sorts by cluster size
    /// (descending, stable) and keeps at most `limit` clusters.
    #[must_use]
    pub fn find_clusters(&self, index: &CandidateIndex, limit: usize) -> Vec<Cluster> {
        let mut clusters = self.domain_clusters(index);
        clusters.extend(self.name_clusters(index));
        clusters.sort_by(|a, b| b.members.len().cmp(&a.members.len()));
        clusters.truncate(limit);
        clusters
    }

    /// Domain pass: one cluster per domain bucket with two or more members.
    ///
    /// Companies sharing several domains appear in one cluster per domain;
    /// batch merging resolves members through forwarding, so later copies
    /// find nothing left to merge.
    #[must_use]
    pub fn domain_clusters(&self, index: &CandidateIndex) -> Vec<Cluster> {
        index
            .domain_buckets()
            .filter(|(_, ids)| ids.len() >= 2)
            .map(|(domain, ids)| Cluster {
                match_type: MatchType::ExactDomain,
                confidence: EXACT_CONFIDENCE,
                key: domain.as_str().to_string(),
                members: in_input_order(index, ids.iter().copied()),
            })
            .collect()
    }

    /// Name pass: exact stage then greedy single-hop fuzzy stage.
    #[must_use]
    pub fn name_clusters(&self, index: &CandidateIndex) -> Vec<Cluster> {
        let mut clusters = Vec::new();
        let mut processed: HashSet<&NormalizedName> = HashSet::new();

        for (name, ids) in index.name_buckets() {
            if ids.len() < 2 {
                continue;
            }
            processed.insert(name);
            clusters.push(Cluster {
                match_type: MatchType::ExactNormalizedName,
                confidence: EXACT_CONFIDENCE,
                key: name.as_str().to_string(),
                members: in_input_order(index, ids.iter().copied()),
            });
        }

        let pending: Vec<(&NormalizedName, &[CompanyId])> = index
            .name_buckets()
            .filter(|(name, _)| !processed.contains(name))
            .filter(|(name, _)| name.is_fuzzy_eligible(self.config.min_fuzzy_name_len))
            .collect();

        let mut joined = vec![false; pending.len()];
        for seed in 0..pending.len() {
            if joined[seed] {
                continue;
            }
            joined[seed] = true;
            let (seed_name, seed_ids) = pending[seed];

            let mut members: Vec<CompanyId> = seed_ids.to_vec();
            let mut weakest = EXACT_CONFIDENCE;
            for other in (seed + 1)..pending.len() {
                if joined[other] {
                    continue;
                }
                let (other_name, other_ids) = pending[other];
                let score = similarity_ratio(seed_name.as_str(), other_name.as_str());
                if score >= self.config.fuzzy_threshold {
                    joined[other] = true;
                    weakest = weakest.min(score);
                    members.extend_from_slice(other_ids);
                }
            }

            if members.len() < 2 {
                continue;
            }
            clusters.push(Cluster {
                match_type: MatchType::FuzzyName,
                confidence: weakest,
                key: seed_name.as_str().to_string(),
                members: in_input_order(index, members.into_iter()),
            });
        }

        clusters
    }
}

fn in_input_order(index: &CandidateIndex, ids: impl Iterator<Item = CompanyId>) -> Vec<CompanyId> {
    let unique: BTreeSet<(usize, CompanyId)> = ids
        .map(|id| (index.position(id).unwrap_or(usize::MAX), id))
        .collect();
    unique.into_iter().map(|(_, id)| id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::company::{CanonicalCompany, Classification};
    use crate::normalize::normalize_domain;

    fn company(name: &str, domain: Option<&str>) -> CanonicalCompany {
        let mut c = CanonicalCompany::new(name, Classification::Inbound);
        if let Some(d) = domain {
            c.set_domain(normalize_domain(d).unwrap());
        }
        c
    }

    fn matcher() -> SimilarityMatcher {
        SimilarityMatcher::new(MatcherConfig::default())
    }

    #[test]
    fn test_ratio_bounds() {
        assert_eq!(similarity_ratio("", ""), 100);
        assert_eq!(similarity_ratio("abc", "abc"), 100);
        assert_eq!(similarity_ratio("abc", "xyz"), 0);
    }

    #[test]
    fn test_domain_pass_clusters_shared_domain_with_full_confidence() {
        let a = company("Acme", Some("acme.com"));
        let b = company("Acme Holdings Mexico", Some("https://www.acme.com"));
        let c = company("Other", Some("other.com"));
        let index = CandidateIndex::build(&[a.clone(), b.clone(), c]);

        let clusters = matcher().domain_clusters(&index);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].match_type, MatchType::ExactDomain);
        assert_eq!(clusters[0].confidence, 100);
        assert_eq!(clusters[0].members, vec![a.id, b.id]);
        assert_eq!(clusters[0].key, "acme.com");
    }

    #[test]
    fn test_domain_pass_keeps_one_cluster_per_bucket() {
        let mut a = company("Acme", Some("acme.com"));
        a.add_domain(&normalize_domain("acme.mx").unwrap());
        let mut b = company("Acme MX", Some("acme.mx"));
        b.add_domain(&normalize_domain("acme.com").unwrap());
        let index = CandidateIndex::build(&[a.clone(), b.clone()]);

        let clusters = matcher().domain_clusters(&index);
        assert_eq!(clusters.len(), 2);
        let keys: Vec<&str> = clusters.iter().map(|c| c.key.as_str()).collect();
        assert!(keys.contains(&"acme.com") && keys.contains(&"acme.mx"));
        assert!(clusters.iter().all(|c| c.members == vec![a.id, b.id]));
    }

    #[test]
    fn test_exact_name_stage_marks_names_processed() {
        let a = company("Acme S.A.", None);
        let b = company("ACME Inc", None);
        let c = company("Acmee", None);
        let index = CandidateIndex::build(&[a.clone(), b.clone(), c.clone()]);

        let clusters = matcher().name_clusters(&index);
        assert_eq!(clusters.len(), 1, "acmee must not fuzzy-join a processed name");
        assert_eq!(clusters[0].match_type, MatchType::ExactNormalizedName);
        assert_eq!(clusters[0].members, vec![a.id, b.id]);
        assert!(!clusters[0].members.contains(&c.id));
    }

    #[test]
    fn test_fuzzy_stage_groups_similar_names() {
        let a = company("Laboratorios Alfa", None);
        let b = company("Laboratorio Alfa", None);
        let c = company("Zeta Foods", None);
        let index = CandidateIndex::build(&[a.clone(), b.clone(), c]);

        let clusters = matcher().name_clusters(&index);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].match_type, MatchType::FuzzyName);
        assert!(clusters[0].confidence >= 80);
        assert!(clusters[0].confidence < 100);
        assert_eq!(clusters[0].members, vec![a.id, b.id]);
    }

    #[test]
    fn test_fuzzy_stage_ignores_short_names() {
        let a = company("AB", None);
        let b = company("AC", None);
        let index = CandidateIndex::build(&[a, b]);
        assert!(matcher().name_clusters(&index).is_empty());
    }

    #[test]
    fn test_fuzzy_stage_is_single_hop_from_the_seed() {
        // Seed "abcdefghij" matches "abcdefghxx" (80) but not "abcdefxxxx" (60),
        // even though the latter is close to the joined member.
        let seed = company("abcdefghij", None);
        let near = company("abcdefghxx", None);
        let far = company("abcdefxxxx", None);
        let index = CandidateIndex::build(&[seed.clone(), near.clone(), far.clone()]);

        let clusters = matcher().name_clusters(&index);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].members, vec![seed.id, near.id]);
        assert!(!clusters[0].members.contains(&far.id));
    }

    #[test]
    fn test_find_clusters_sorts_by_size_and_truncates() {
        let a = company("Acme", Some("acme.com"));
        let b = company("Acme Two", Some("acme.com"));
        let c = company("Acme Three", Some("acme.com"));
        let d = company("Beta", Some("beta.com"));
        let e = company("Beta Corp", Some("beta.com"));
        let index = CandidateIndex::build(&[d, e, a, b, c]);

        let all = matcher().find_clusters(&index, usize::MAX);
        assert!(all.windows(2).all(|w| w[0].len() >= w[1].len()));
        assert_eq!(all[0].len(), 3);

        let limited = matcher().find_clusters(&index, 1);
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].key, "acme.com");
    }
}
