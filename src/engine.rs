//! Resolution engine.
//!
//! [`ResolutionEngine`] is the boundary surface other services use: company
//! creation and patching, live search, duplicate review, single and batch
//! merges, the one-time migration, and lookups that follow merge forwarding.
//! It holds the stores behind trait objects so the same engine runs over the
//! in-memory and the persistent backends.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::audit::AuditRecord;
use crate::company::{CanonicalCompany, Classification, CompanyId, LegacyKey, SourceKind};
use crate::config::ResolutionConfig;
use crate::error::{ConflictError, NotFoundError, ResolutionResult, ValidationError};
use crate::index::CandidateIndex;
use crate::matcher::{Cluster, SimilarityMatcher};
use crate::merge::{BatchMergeSummary, BatchRequest, MergeExecutor, MergeRequest, MergeResult};
use crate::migration::{
    verify_companies, LegacyRecord, MigrationConsolidator, MigrationOutcome, VerificationReport,
};
use crate::normalize::{normalize_domain, Domain};
use crate::selector::{PrimarySelector, Selection};
use crate::storage::{
    AuditStore, CaseStore, CompanyStore, ContactStore, IdMappingStore, InMemoryAuditStore,
    InMemoryCaseStore, InMemoryCompanyStore, InMemoryContactStore, InMemoryIdMappingStore,
};

/// Fields accepted when creating a company.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewCompany {
    /// Display name; must not be blank.
    pub name: String,
    /// Primary domain in any common form (`https://www.acme.com/`).
    pub domain: Option<String>,
    /// Additional domains.
    pub domains: Vec<String>,
    /// Primary industry.
    pub industry: Option<String>,
    /// Alternative names.
    pub aliases: Vec<String>,
    /// Business classification.
    pub classification: Classification,
}

impl NewCompany {
    /// A company with only a name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Field changes accepted by [`ResolutionEngine::patch_company`].
///
/// `None` and empty lists leave the field alone. Aliases are only added.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanyPatch {
    /// New classification.
    pub classification: Option<Classification>,
    /// New primary domain; the previous one stays in the domain set.
    pub domain: Option<String>,
    /// New primary industry.
    pub industry: Option<String>,
    /// Aliases to add.
    pub add_aliases: Vec<String>,
}

/// One duplicate cluster with the primary the selector would keep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    /// The detected cluster.
    pub cluster: Cluster,
    /// Primary, secondaries and scores.
    pub selection: Selection,
}

/// Company resolution engine.
#[derive(Clone)]
pub struct ResolutionEngine {
    companies: Arc<dyn CompanyStore>,
    mappings: Arc<dyn IdMappingStore>,
    audit: Arc<dyn AuditStore>,
    config: ResolutionConfig,
    matcher: SimilarityMatcher,
    selector: PrimarySelector,
    merges: MergeExecutor,
}

impl std::fmt::Debug for ResolutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolutionEngine")
            .field("config", &self.config)
            .field("matcher", &self.matcher)
            .field("selector", &self.selector)
            .finish_non_exhaustive()
    }
}

impl ResolutionEngine {
    /// Create a new engine using the given stores.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if `config` fails validation.
    pub fn new(
        companies: Arc<dyn CompanyStore>,
        contacts: Arc<dyn ContactStore>,
        cases: Arc<dyn CaseStore>,
        audit: Arc<dyn AuditStore>,
        mappings: Arc<dyn IdMappingStore>,
        config: ResolutionConfig,
    ) -> ResolutionResult<Self> {
        config.validate()?;
        let merges = MergeExecutor::new(
            Arc::clone(&companies),
            contacts,
            cases,
            Arc::clone(&audit),
        );
        Ok(Self {
            companies,
            mappings,
            audit,
            matcher: SimilarityMatcher::new(config.matcher.clone()),
            selector: PrimarySelector::new(config.tie_break),
            config,
            merges,
        })
    }

    /// An engine over fresh in-memory stores.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if `config` fails validation.
    pub fn in_memory(config: ResolutionConfig) -> ResolutionResult<Self> {
        Self::new(
            Arc::new(InMemoryCompanyStore::new()),
            Arc::new(InMemoryContactStore::new()),
            Arc::new(InMemoryCaseStore::new()),
            Arc::new(InMemoryAuditStore::new()),
            Arc::new(InMemoryIdMappingStore::new()),
            config,
        )
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &ResolutionConfig {
        &self.config
    }

    /// Creates a company.
    ///
    /// # Errors
    /// - `Validation(MissingField)` for a blank name
    /// - `Validation(InvalidDomain)` for a domain that does not normalize
    /// - `Conflict(NameClaimed)` if the name or an alias already resolves to
    ///   a live company
    pub fn create_company(&self, new: NewCompany) -> ResolutionResult<CanonicalCompany> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(ValidationError::MissingField {
                field: "name".to_string(),
            }
            .into());
        }

        let primary = new.domain.as_deref().map(parse_domain).transpose()?;
        let extra = new
            .domains
            .iter()
            .map(|d| parse_domain(d))
            .collect::<ResolutionResult<Vec<_>>>()?;

        self.ensure_unclaimed(name, None)?;
        for alias in &new.aliases {
            self.ensure_unclaimed(alias, None)?;
        }

        let mut company = CanonicalCompany::new(name, new.classification);
        if let Some(domain) = primary {
            company.set_domain(domain);
        }
        for domain in &extra {
            company.add_domain(domain);
        }
        if let Some(industry) = new.industry {
            company.set_industry(industry);
        }
        for alias in new.aliases {
            company.add_alias(alias);
        }

        self.companies.insert(company.clone())?;
        tracing::info!(id = %company.id, name = %company.name, "created company");
        Ok(company)
    }

    /// Applies `patch` to a live company.
    ///
    /// With `expected_version` the write only succeeds if the stored record
    /// is still at that version.
    ///
    /// # Errors
    /// - `NotFound(Company)` for an unknown id
    /// - `Conflict(AlreadyMerged)` for a retired company
    /// - `Conflict(StaleVersion)` on a version mismatch
    /// - `Validation(InvalidDomain)` and `Conflict(NameClaimed)` as for
    ///   creation
    pub fn patch_company(
        &self,
        id: CompanyId,
        patch: CompanyPatch,
        expected_version: Option<u64>,
    ) -> ResolutionResult<CanonicalCompany> {
        let mut company = self
            .companies
            .get(id)?
            .ok_or(NotFoundError::Company { id })?;
        if company.is_merged {
            return Err(ConflictError::AlreadyMerged {
                id,
                merged_into: company.merged_into_company_id,
            }
            .into());
        }
        let expected = expected_version.unwrap_or(company.version);

        if let Some(classification) = patch.classification {
            company.classification = classification;
        }
        if let Some(raw) = patch.domain.as_deref() {
            company.set_domain(parse_domain(raw)?);
        }
        if let Some(industry) = patch.industry {
            company.set_industry(industry);
        }
        for alias in patch.add_aliases {
            self.ensure_unclaimed(&alias, Some(id))?;
            company.add_alias(alias);
        }

        let stored = self.companies.update(company, expected)?;
        tracing::debug!(id = %stored.id, version = stored.version, "patched company");
        Ok(stored)
    }

    /// Fetches a company by id, retired or not.
    ///
    /// # Errors
    /// Propagates storage errors.
    pub fn get_company(&self, id: CompanyId) -> ResolutionResult<Option<CanonicalCompany>> {
        Ok(self.companies.get(id)?)
    }

    /// Live companies whose name, alias or domain contains `query`.
    ///
    /// # Errors
    /// Propagates storage errors.
    pub fn search(&self, query: &str, limit: usize) -> ResolutionResult<Vec<CanonicalCompany>> {
        Ok(self.companies.search_live(query, limit)?)
    }

    /// Duplicate clusters over the live population, largest first, each
    /// with the primary the selector would keep.
    ///
    /// # Errors
    /// Propagates storage errors.
    pub fn find_duplicates(&self, limit: usize) -> ResolutionResult<Vec<DuplicateGroup>> {
        let live = self.companies.list_live()?;
        let index = CandidateIndex::build(&live);
        let by_id: HashMap<CompanyId, &CanonicalCompany> = live.iter().map(|c| (c.id, c)).collect();

        let groups = self
            .matcher
            .find_clusters(&index, limit)
            .into_iter()
            .filter_map(|cluster| {
                let members: Vec<&CanonicalCompany> = cluster
                    .members
                    .iter()
                    .filter_map(|id| by_id.get(id).copied())
                    .collect();
                let selection = self.selector.select(&members)?;
                Some(DuplicateGroup { cluster, selection })
            })
            .collect();
        Ok(groups)
    }

    /// Merges one pair; see [`MergeExecutor::merge`].
    ///
    /// # Errors
    /// See [`MergeExecutor::merge`].
    pub fn merge(&self, request: &MergeRequest) -> ResolutionResult<MergeResult> {
        self.merges.merge(request)
    }

    /// Runs batch auto-merge over at most `limit` clusters (the configured
    /// default when `None`).
    ///
    /// # Errors
    /// See [`MergeExecutor::auto_merge`].
    pub fn auto_merge(
        &self,
        limit: Option<usize>,
        dry_run: bool,
        initiator: &str,
    ) -> ResolutionResult<BatchMergeSummary> {
        let request = BatchRequest {
            limit: limit.unwrap_or(self.config.batch.default_limit),
            dry_run,
            initiator: initiator.to_string(),
            scope: self.config.batch.scope,
        };
        self.merges.auto_merge(&self.matcher, &self.selector, &request)
    }

    /// Runs the one-time legacy consolidation.
    ///
    /// # Errors
    /// See [`MigrationConsolidator::run`].
    pub fn migrate(
        &self,
        records: Vec<LegacyRecord>,
        initiator: &str,
    ) -> ResolutionResult<MigrationOutcome> {
        MigrationConsolidator::new(
            Arc::clone(&self.companies),
            Arc::clone(&self.mappings),
            Arc::clone(&self.audit),
            self.config.migration.clone(),
            self.matcher.clone(),
        )
        .run(records, initiator)
    }

    /// Checks every stored company against the migration invariants.
    ///
    /// # Errors
    /// Propagates storage errors.
    pub fn verify(&self) -> ResolutionResult<VerificationReport> {
        Ok(verify_companies(
            &self.companies.list_all()?,
            self.config.migration.default_classification,
        ))
    }

    /// The live company `id` resolves to after following merges.
    ///
    /// # Errors
    /// See [`MergeExecutor::resolve`].
    pub fn resolve(&self, id: CompanyId) -> ResolutionResult<CanonicalCompany> {
        self.merges.resolve(id)
    }

    /// The live company a legacy identifier now resolves to, if it was
    /// migrated.
    ///
    /// # Errors
    /// Propagates storage and forwarding errors.
    pub fn lookup_legacy(
        &self,
        source: SourceKind,
        legacy_id: &str,
    ) -> ResolutionResult<Option<CanonicalCompany>> {
        match self.mappings.lookup(&LegacyKey::new(source, legacy_id))? {
            Some(id) => self.resolve(id).map(Some),
            None => Ok(None),
        }
    }

    /// Every audit record, oldest first.
    ///
    /// # Errors
    /// Propagates storage errors.
    pub fn audit_log(&self) -> ResolutionResult<Vec<AuditRecord>> {
        Ok(self.audit.list()?)
    }

    /// Fails if `name` already resolves to a live company other than
    /// `except`.
    fn ensure_unclaimed(&self, name: &str, except: Option<CompanyId>) -> ResolutionResult<()> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(());
        }
        let owner = self
            .companies
            .find_live_by_name(name)?
            .into_iter()
            .chain(self.companies.find_live_by_alias(name)?)
            .find(|c| Some(c.id) != except);
        match owner {
            Some(owner) => Err(ConflictError::NameClaimed {
                name: name.to_string(),
                owner: owner.id,
            }
            .into()),
            None => Ok(()),
        }
    }
}

fn parse_domain(raw: &str) -> ResolutionResult<Domain> {
    normalize_domain(raw).ok_or_else(|| {
        ValidationError::InvalidDomain {
            value: raw.to_string(),
        }
        .into()
    })
}
