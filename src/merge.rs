//! Merge transaction executor.
//!
//! A merge folds a secondary company into a primary, repoints contacts and
//! cases that reference the secondary by name, and retires the secondary.
//! The four writes are separate store calls in this order:
//!
//! 1. compare-and-swap update of the primary
//! 2. contact reference rewrite
//! 3. case reference rewrite
//! 4. compare-and-swap retirement of the secondary
//!
//! There is no cross-store transaction. A failure between steps leaves a
//! partially merged state that the audit trail and logs make visible; the
//! compare-and-swap writes guarantee a concurrent change is never silently
//! overwritten.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::audit::{AuditId, AuditKind, AuditRecord, BatchItemError, BatchTotals, MergeDelta};
use crate::company::{contains_ignore_case, CanonicalCompany, CompanyId};
use crate::config::BatchScope;
use crate::dependents::CompanyRef;
use crate::error::{
    ConflictError, MergeSide, NotFoundError, ResolutionError, ResolutionResult, ValidationError,
};
use crate::index::CandidateIndex;
use crate::matcher::{Cluster, SimilarityMatcher};
use crate::normalize::domain_key;
use crate::selector::PrimarySelector;
use crate::storage::{AuditStore, CaseStore, CompanyStore, ContactStore};

/// Maximum `merged_into_company_id` hops followed when forwarding an id.
pub const MAX_FORWARDING_HOPS: usize = 128;

/// Initiator recorded when the caller does not name one.
pub const DEFAULT_INITIATOR: &str = "system";

/// A request to merge `secondary` into `primary`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRequest {
    /// Surviving record.
    pub primary: CompanyId,
    /// Record to retire.
    pub secondary: CompanyId,
    /// Validate and preview without writing.
    pub dry_run: bool,
    /// Operator or job triggering the merge.
    pub initiator: String,
}

impl MergeRequest {
    /// Creates a committing request attributed to [`DEFAULT_INITIATOR`].
    #[must_use]
    pub fn new(primary: CompanyId, secondary: CompanyId) -> Self {
        Self {
            primary,
            secondary,
            dry_run: false,
            initiator: DEFAULT_INITIATOR.to_string(),
        }
    }

    /// Sets dry-run mode.
    #[must_use]
    pub const fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Sets the initiator.
    #[must_use]
    pub fn initiated_by(mut self, initiator: impl Into<String>) -> Self {
        self.initiator = initiator.into();
        self
    }
}

/// Outcome of one merge (or its dry-run preview).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeResult {
    /// Surviving record.
    pub primary_id: CompanyId,
    /// Retired record.
    pub secondary_id: CompanyId,
    /// Primary name.
    pub primary_name: String,
    /// Secondary name.
    pub secondary_name: String,
    /// Whether nothing was written.
    pub dry_run: bool,
    /// Aliases the primary gained.
    pub aliases_added: Vec<String>,
    /// Domains the primary gained.
    pub domains_added: Vec<String>,
    /// Industries the primary gained.
    pub industries_added: Vec<String>,
    /// Contacts repointed (or that would be, for a dry run).
    pub contacts_updated: usize,
    /// Cases repointed (or that would be, for a dry run).
    pub cases_updated: usize,
    /// Audit record written for a committed single merge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_id: Option<AuditId>,
}

impl MergeResult {
    /// The audit payload for this merge.
    #[must_use]
    pub fn delta(&self) -> MergeDelta {
        MergeDelta {
            primary_id: self.primary_id,
            secondary_id: self.secondary_id,
            primary_name: self.primary_name.clone(),
            secondary_name: self.secondary_name.clone(),
            aliases_added: self.aliases_added.clone(),
            domains_added: self.domains_added.clone(),
            industries_added: self.industries_added.clone(),
            contacts_updated: self.contacts_updated,
            cases_updated: self.cases_updated,
        }
    }
}

/// Parameters of a batch auto-merge run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequest {
    /// Maximum clusters to process.
    pub limit: usize,
    /// Preview every merge without writing.
    pub dry_run: bool,
    /// Operator or job triggering the run.
    pub initiator: String,
    /// Which clusters are eligible.
    pub scope: BatchScope,
}

/// How a batch run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Every merge succeeded.
    Completed,
    /// Some merges failed; the rest were applied.
    CompletedWithErrors(usize),
}

/// Summary of a batch auto-merge run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchMergeSummary {
    /// Whether nothing was written.
    pub dry_run: bool,
    /// Run totals.
    pub totals: BatchTotals,
    /// One entry per successful (or previewed) merge.
    pub details: Vec<MergeResult>,
    /// One entry per failed merge.
    pub errors: Vec<BatchItemError>,
    /// Audit record of a committed run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_id: Option<AuditId>,
}

impl BatchMergeSummary {
    /// Overall status.
    #[must_use]
    pub fn status(&self) -> BatchStatus {
        if self.errors.is_empty() {
            BatchStatus::Completed
        } else {
            BatchStatus::CompletedWithErrors(self.errors.len())
        }
    }
}

/// The primary as it will look after the merge, plus what changed.
#[derive(Debug, Clone)]
struct MergePlan {
    merged: CanonicalCompany,
    aliases_added: Vec<String>,
    domains_added: Vec<String>,
    industries_added: Vec<String>,
}

impl MergePlan {
    fn build(primary: &CanonicalCompany, secondary: &CanonicalCompany) -> Self {
        let mut merged = primary.clone();

        let mut aliases_added = Vec::new();
        for name in std::iter::once(&secondary.name).chain(secondary.aliases.iter()) {
            if merged.add_alias(name.as_str()) {
                aliases_added.push(name.trim().to_string());
            }
        }

        let before: BTreeSet<String> = primary
            .domain
            .iter()
            .chain(primary.domains.iter())
            .filter_map(|d| domain_key(d))
            .collect();
        let all: BTreeSet<String> = primary
            .domain
            .iter()
            .chain(primary.domains.iter())
            .chain(secondary.domain.iter())
            .chain(secondary.domains.iter())
            .filter_map(|d| domain_key(d))
            .collect();
        merged.domain = primary
            .domain
            .as_deref()
            .and_then(domain_key)
            .or_else(|| secondary.domain.as_deref().and_then(domain_key));
        let domains_added: Vec<String> = all.difference(&before).cloned().collect();
        merged.domains = all;

        let mut industries_added = Vec::new();
        if merged.industry.as_deref().map_or(true, |i| i.trim().is_empty()) {
            if let Some(industry) = secondary.industry.as_deref() {
                if !industry.trim().is_empty() {
                    merged.industry = Some(industry.trim().to_string());
                }
            }
        }
        for industry in secondary.industry.iter().chain(secondary.industries.iter()) {
            if merged.add_industry(industry.as_str()) {
                industries_added.push(industry.trim().to_string());
            }
        }
        if let Some(industry) = merged.industry.clone() {
            if !contains_ignore_case(&merged.industries, &industry) {
                merged.industries.insert(industry);
            }
        }

        for (source, ids) in &secondary.legacy_source_ids {
            for id in ids {
                merged.add_legacy_id(*source, id.as_str());
            }
        }
        merged.created_at = merged.created_at.min(secondary.created_at);
        merged.updated_at = Utc::now();

        Self {
            merged,
            aliases_added,
            domains_added,
            industries_added,
        }
    }
}

/// Validates and executes merges.
#[derive(Clone)]
pub struct MergeExecutor {
    companies: Arc<dyn CompanyStore>,
    contacts: Arc<dyn ContactStore>,
    cases: Arc<dyn CaseStore>,
    audit: Arc<dyn AuditStore>,
}

impl MergeExecutor {
    /// Create an executor over the given stores.
    #[must_use]
    pub fn new(
        companies: Arc<dyn CompanyStore>,
        contacts: Arc<dyn ContactStore>,
        cases: Arc<dyn CaseStore>,
        audit: Arc<dyn AuditStore>,
    ) -> Self {
        Self {
            companies,
            contacts,
            cases,
            audit,
        }
    }

    /// Merges one pair and writes an audit record for it.
    ///
    /// # Errors
    /// - `Validation(SelfMerge)` when both ids are equal
    /// - `NotFound(MergeParty)` naming the missing side
    /// - `Conflict(AlreadyMerged | PrimaryRetired | AliasClaimed)`
    /// - `Conflict(StaleVersion)` if a record changed during the merge
    pub fn merge(&self, request: &MergeRequest) -> ResolutionResult<MergeResult> {
        let mut result = self.execute(request)?;
        if !result.dry_run {
            let record = AuditRecord::new(request.initiator.clone(), AuditKind::Merge(result.delta()));
            result.audit_id = Some(record.id);
            self.audit.append(record)?;
        }
        Ok(result)
    }

    fn load(&self, id: CompanyId, side: MergeSide) -> ResolutionResult<CanonicalCompany> {
        self.companies
            .get(id)?
            .ok_or_else(|| NotFoundError::MergeParty { side, id }.into())
    }

    fn validate(
        &self,
        request: &MergeRequest,
    ) -> ResolutionResult<(CanonicalCompany, CanonicalCompany)> {
        if request.primary == request.secondary {
            return Err(ValidationError::SelfMerge {
                id: request.primary,
            }
            .into());
        }

        let primary = self.load(request.primary, MergeSide::Primary)?;
        let secondary = self.load(request.secondary, MergeSide::Secondary)?;

        if secondary.is_merged {
            return Err(ConflictError::AlreadyMerged {
                id: secondary.id,
                merged_into: secondary.merged_into_company_id,
            }
            .into());
        }
        if primary.is_merged {
            return Err(ConflictError::PrimaryRetired { id: primary.id }.into());
        }

        let claimed_by = self
            .companies
            .find_live_by_alias(&secondary.name)?
            .into_iter()
            .find(|c| c.id != primary.id && c.id != secondary.id);
        if let Some(owner) = claimed_by {
            return Err(ConflictError::AliasClaimed {
                alias: secondary.name.clone(),
                owner: owner.id,
            }
            .into());
        }

        Ok((primary, secondary))
    }

    fn execute(&self, request: &MergeRequest) -> ResolutionResult<MergeResult> {
        let (primary, secondary) = self.validate(request)?;
        let plan = MergePlan::build(&primary, &secondary);

        let mut result = MergeResult {
            primary_id: primary.id,
            secondary_id: secondary.id,
            primary_name: primary.name.clone(),
            secondary_name: secondary.name.clone(),
            dry_run: request.dry_run,
            aliases_added: plan.aliases_added,
            domains_added: plan.domains_added,
            industries_added: plan.industries_added,
            contacts_updated: 0,
            cases_updated: 0,
            audit_id: None,
        };

        if request.dry_run {
            result.contacts_updated = self.contacts.count_references(&secondary.name)?;
            result.cases_updated = self.cases.count_references(&secondary.name)?;
            tracing::info!(
                primary = %primary.id,
                secondary = %secondary.id,
                contacts = result.contacts_updated,
                cases = result.cases_updated,
                "merge preview"
            );
            return Ok(result);
        }

        let stored = self.companies.update(plan.merged, primary.version)?;
        let target = CompanyRef::from(&stored);

        result.contacts_updated = self
            .contacts
            .rewrite_references(&secondary.name, &target)
            .map_err(|e| partial(&primary, &secondary, "contact rewrite", e.into()))?;
        result.cases_updated = self
            .cases
            .rewrite_references(&secondary.name, &target)
            .map_err(|e| partial(&primary, &secondary, "case rewrite", e.into()))?;

        let mut retired = secondary.clone();
        retired.retire(primary.id, request.initiator.clone(), Utc::now());
        self.companies
            .update(retired, secondary.version)
            .map_err(|e| partial(&primary, &secondary, "secondary retirement", e.into()))?;

        tracing::info!(
            primary = %primary.id,
            secondary = %secondary.id,
            aliases_added = result.aliases_added.len(),
            domains_added = result.domains_added.len(),
            contacts_updated = result.contacts_updated,
            cases_updated = result.cases_updated,
            initiator = %request.initiator,
            "merged company"
        );
        Ok(result)
    }

    /// Follows forwarding pointers from `id` to the live company it now
    /// resolves to.
    ///
    /// # Errors
    /// - `NotFound(Company)` if `id` or a forwarding target is unknown
    /// - `Internal` on a forwarding cycle or more than
    ///   [`MAX_FORWARDING_HOPS`] hops
    pub fn resolve(&self, id: CompanyId) -> ResolutionResult<CanonicalCompany> {
        let mut visited = HashSet::new();
        let mut current = id;
        for _ in 0..=MAX_FORWARDING_HOPS {
            if !visited.insert(current) {
                return Err(ResolutionError::internal(format!(
                    "forwarding cycle while resolving {id} (revisited {current})"
                )));
            }
            let company = self
                .companies
                .get(current)?
                .ok_or(NotFoundError::Company { id: current })?;
            match (company.is_merged, company.merged_into_company_id) {
                (true, Some(next)) => current = next,
                (true, None) => {
                    return Err(ResolutionError::internal(format!(
                        "company {current} is retired without a forwarding target"
                    )))
                }
                (false, _) => return Ok(company),
            }
        }
        Err(ResolutionError::internal(format!(
            "forwarding from {id} exceeded {MAX_FORWARDING_HOPS} hops"
        )))
    }

    /// Selects a primary in each cluster and merges every secondary into it.
    ///
    /// Members are resolved through forwarding pointers first, so clusters
    /// that overlap an earlier merge in the same run fold into its survivor.
    /// Failed merges are recorded and the run continues. A committing run
    /// writes one audit record.
    ///
    /// # Errors
    /// Only store failures while listing companies or writing the audit
    /// record abort the run.
    pub fn auto_merge(
        &self,
        matcher: &SimilarityMatcher,
        selector: &PrimarySelector,
        request: &BatchRequest,
    ) -> ResolutionResult<BatchMergeSummary> {
        let live = self.companies.list_live()?;
        let index = CandidateIndex::build(&live);
        let mut clusters = match request.scope {
            BatchScope::Domain => {
                let mut clusters = matcher.domain_clusters(&index);
                clusters.sort_by(|a, b| b.len().cmp(&a.len()));
                clusters
            }
            BatchScope::All => matcher.find_clusters(&index, usize::MAX),
        };

        let mut totals = BatchTotals {
            clusters_found: clusters.len(),
            ..BatchTotals::default()
        };
        clusters.truncate(request.limit);

        tracing::info!(
            clusters = totals.clusters_found,
            limit = request.limit,
            dry_run = request.dry_run,
            scope = ?request.scope,
            "starting batch merge"
        );

        let mut details = Vec::new();
        let mut errors = Vec::new();

        for cluster in &clusters {
            let members = match self.current_members(cluster) {
                Ok(members) => members,
                Err((member, e)) => {
                    tracing::warn!(
                        cluster = %cluster.key,
                        member = %member,
                        error = %e,
                        "skipping unresolvable cluster"
                    );
                    errors.push(BatchItemError {
                        cluster_key: cluster.key.clone(),
                        primary_id: None,
                        secondary_id: member,
                        error: e.to_string(),
                    });
                    continue;
                }
            };
            let refs: Vec<&CanonicalCompany> = members.iter().collect();
            let Some(selection) = selector.select(&refs) else {
                continue;
            };
            if selection.secondaries.is_empty() {
                continue;
            }
            totals.clusters_processed += 1;

            for secondary in &selection.secondaries {
                totals.merges_attempted += 1;
                let merge = MergeRequest {
                    primary: selection.primary,
                    secondary: *secondary,
                    dry_run: request.dry_run,
                    initiator: request.initiator.clone(),
                };
                match self.execute(&merge) {
                    Ok(result) => {
                        totals.merges_succeeded += 1;
                        totals.contacts_updated += result.contacts_updated;
                        totals.cases_updated += result.cases_updated;
                        details.push(result);
                    }
                    Err(e) => {
                        tracing::warn!(
                            cluster = %cluster.key,
                            primary = %selection.primary,
                            secondary = %secondary,
                            error = %e,
                            "batch merge item failed"
                        );
                        errors.push(BatchItemError {
                            cluster_key: cluster.key.clone(),
                            primary_id: Some(selection.primary),
                            secondary_id: *secondary,
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        let mut summary = BatchMergeSummary {
            dry_run: request.dry_run,
            totals,
            details,
            errors,
            audit_id: None,
        };

        if !request.dry_run {
            let record = AuditRecord::new(
                request.initiator.clone(),
                AuditKind::BatchMerge {
                    totals: summary.totals.clone(),
                    details: summary.details.iter().map(MergeResult::delta).collect(),
                    errors: summary.errors.clone(),
                },
            );
            summary.audit_id = Some(record.id);
            self.audit.append(record)?;
        }

        tracing::info!(
            processed = summary.totals.clusters_processed,
            merged = summary.totals.merges_succeeded,
            failed = summary.errors.len(),
            contacts_updated = summary.totals.contacts_updated,
            cases_updated = summary.totals.cases_updated,
            "batch merge finished"
        );
        Ok(summary)
    }

    /// Current live records for a cluster's members, forwarded and deduped,
    /// in cluster order. On failure, returns the member that did not resolve.
    fn current_members(
        &self,
        cluster: &Cluster,
    ) -> Result<Vec<CanonicalCompany>, (CompanyId, ResolutionError)> {
        let mut seen = HashSet::new();
        let mut members = Vec::with_capacity(cluster.members.len());
        for id in &cluster.members {
            let company = self.resolve(*id).map_err(|e| (*id, e))?;
            if seen.insert(company.id) {
                members.push(company);
            }
        }
        Ok(members)
    }
}

fn partial(
    primary: &CanonicalCompany,
    secondary: &CanonicalCompany,
    step: &'static str,
    err: ResolutionError,
) -> ResolutionError {
    tracing::error!(
        primary = %primary.id,
        secondary = %secondary.id,
        step,
        error = %err,
        "merge left partially applied"
    );
    err
}
