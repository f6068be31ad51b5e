//! One-time consolidation of legacy sources into the canonical store.
//!
//! The consolidator runs the indexer and matcher over every legacy record
//! at once, folds each connected group into a new canonical record, writes
//! the `(source, legacy id) -> canonical id` mapping and then relinks
//! forwarding pointers in a second pass. Pointers are relinked afterwards
//! because a record may point at a group that has not been folded yet.
//!
//! It refuses to run against a non-empty store.

mod fold;
mod source;
mod verify;

pub use source::{ImportedCompany, LegacyRecord, ManualCompany, SyncedOrganization};
pub use verify::{verify_companies, VerificationReport};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::audit::{AuditId, AuditKind, AuditRecord, MigrationTotals};
use crate::company::CompanyId;
use crate::config::MigrationConfig;
use crate::error::ResolutionResult;
use crate::index::CandidateIndex;
use crate::matcher::SimilarityMatcher;
use crate::storage::{AuditStore, CompanyStore, IdMappingStore};

use fold::{fold_group, FoldedCompany};
use source::LegacyView;

/// Completed migration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationReport {
    /// Run totals.
    pub totals: MigrationTotals,
    /// Post-run verification.
    pub verification: VerificationReport,
    /// The run's audit record.
    pub audit_id: AuditId,
}

/// What a call to [`MigrationConsolidator::run`] did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MigrationOutcome {
    /// The canonical store already held records; nothing was written.
    Skipped {
        /// Canonical records already present.
        existing: usize,
    },
    /// The run finished and wrote its audit record.
    Completed(MigrationReport),
}

/// Disjoint-set forest over record positions.
struct Groups {
    parent: Vec<usize>,
}

impl Groups {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn root(&mut self, mut at: usize) -> usize {
        while self.parent[at] != at {
            self.parent[at] = self.parent[self.parent[at]];
            at = self.parent[at];
        }
        at
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.root(a), self.root(b));
        if ra != rb {
            // Keep the earlier (higher priority) position as the root.
            let (keep, other) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[other] = keep;
        }
    }
}

/// Populates an empty canonical store from legacy records.
pub struct MigrationConsolidator {
    companies: Arc<dyn CompanyStore>,
    mappings: Arc<dyn IdMappingStore>,
    audit: Arc<dyn AuditStore>,
    config: MigrationConfig,
    matcher: SimilarityMatcher,
}

impl MigrationConsolidator {
    /// Creates a consolidator.
    #[must_use]
    pub fn new(
        companies: Arc<dyn CompanyStore>,
        mappings: Arc<dyn IdMappingStore>,
        audit: Arc<dyn AuditStore>,
        config: MigrationConfig,
        matcher: SimilarityMatcher,
    ) -> Self {
        Self {
            companies,
            mappings,
            audit,
            config,
            matcher,
        }
    }

    /// Runs the consolidation.
    ///
    /// # Errors
    /// Returns a storage error if any write fails. Writes already made stay
    /// in place; the store is then non-empty and a re-run is refused.
    pub fn run(
        &self,
        records: Vec<LegacyRecord>,
        initiator: &str,
    ) -> ResolutionResult<MigrationOutcome> {
        let existing = self.companies.count()?;
        if existing > 0 {
            tracing::warn!(existing, "canonical store is not empty, refusing to migrate");
            return Ok(MigrationOutcome::Skipped { existing });
        }

        let mut totals = MigrationTotals {
            legacy_records: records.len(),
            ..MigrationTotals::default()
        };
        let views = self.prepare(records);
        let folded = self.group_and_fold(&views);
        totals.groups = folded.len();

        tracing::info!(
            records = totals.legacy_records,
            groups = totals.groups,
            "consolidating legacy companies"
        );

        for group in &folded {
            self.companies.insert(group.company.clone())?;
            totals.canonical_created += 1;
            for key in &group.members {
                self.mappings.insert(key.clone(), group.company.id)?;
                totals.mappings_written += 1;
            }
        }

        self.relink(&folded, initiator, &mut totals)?;

        let verification =
            verify_companies(&self.companies.list_all()?, self.config.default_classification);

        let record = AuditRecord::new(initiator, AuditKind::Migration(totals.clone()));
        let audit_id = record.id;
        self.audit.append(record)?;

        tracing::info!(
            created = totals.canonical_created,
            mappings = totals.mappings_written,
            relinked = totals.pointers_relinked,
            unresolved = totals.pointers_unresolved,
            verified = verification.passed(),
            "migration finished"
        );

        Ok(MigrationOutcome::Completed(MigrationReport {
            totals,
            verification,
            audit_id,
        }))
    }

    /// Drops records without a legacy id or with a repeated key, then orders
    /// the rest by source priority (input order within a source).
    fn prepare(&self, records: Vec<LegacyRecord>) -> Vec<LegacyView> {
        let mut seen = HashSet::new();
        let mut views: Vec<LegacyView> = records
            .into_iter()
            .map(LegacyView::new)
            .filter(|view| {
                if view.key.legacy_id.is_empty() {
                    tracing::warn!(source = %view.key.source, "skipping legacy record without an id");
                    return false;
                }
                if !seen.insert(view.key.clone()) {
                    tracing::warn!(key = %view.key, "skipping repeated legacy key");
                    return false;
                }
                true
            })
            .collect();
        views.sort_by_key(|view| self.config.rank(view.key.source));
        views
    }

    fn group_and_fold(&self, views: &[LegacyView]) -> Vec<FoldedCompany> {
        let positions: HashMap<CompanyId, usize> =
            views.iter().enumerate().map(|(i, v)| (v.id, i)).collect();

        let index = CandidateIndex::build(views);
        let mut groups = Groups::new(views.len());
        for cluster in self.matcher.find_clusters(&index, usize::MAX) {
            let mut members = cluster.members.iter().filter_map(|id| positions.get(id));
            if let Some(&first) = members.next() {
                for &other in members {
                    groups.union(first, other);
                }
            }
        }

        let mut slot_of_root: HashMap<usize, usize> = HashMap::new();
        let mut members: Vec<Vec<&LegacyView>> = Vec::new();
        for (i, view) in views.iter().enumerate() {
            let root = groups.root(i);
            let slot = *slot_of_root.entry(root).or_insert_with(|| {
                members.push(Vec::new());
                members.len() - 1
            });
            members[slot].push(view);
        }

        members
            .iter()
            .filter_map(|group| fold_group(group, &self.config))
            .collect()
    }

    /// Rewrites each legacy forwarding pointer to the canonical id of its
    /// target. Unresolvable pointers leave the record live.
    fn relink(
        &self,
        folded: &[FoldedCompany],
        initiator: &str,
        totals: &mut MigrationTotals,
    ) -> ResolutionResult<()> {
        for group in folded {
            let Some(target_key) = &group.forward_to else {
                continue;
            };
            let Some(mut company) = self.companies.get(group.company.id)? else {
                continue;
            };
            let expected = company.version;

            match self.mappings.lookup(target_key)? {
                Some(target) if target != company.id => {
                    company.retire(target, initiator, Utc::now());
                    totals.pointers_relinked += 1;
                }
                Some(_) => {
                    tracing::debug!(id = %company.id, key = %target_key, "pointer targets its own group");
                    company.is_merged = false;
                }
                None => {
                    tracing::warn!(
                        id = %company.id,
                        key = %target_key,
                        "forwarding target not found in any legacy source"
                    );
                    company.is_merged = false;
                    totals.pointers_unresolved += 1;
                }
            }
            self.companies.update(company, expected)?;
        }
        Ok(())
    }
}
