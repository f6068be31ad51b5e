//! Canonical company records and identity.
//!
//! A `CanonicalCompany` is the unit of truth. Records are never physically
//! deleted: a duplicate is retired by setting `is_merged` and pointing
//! `merged_into_company_id` at the survivor, so dependent records holding the
//! old id can still be forwarded.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::normalize::{normalize_name, same_name, Domain, NormalizedName};

/// Namespace for ids derived from legacy `(source, legacy_id)` pairs.
const LEGACY_NAMESPACE: Uuid = Uuid::from_u128(0x6c1f_2a0e_93d4_4b8e_a1c7_5f02_d9e4_7b31);

/// Globally unique, stable company identifier.
///
/// Assigned once and never reused, including after the company is retired.
///
/// # Examples
///
/// ```
/// use company_resolution::CompanyId;
///
/// let id = CompanyId::new();
/// assert!(!id.is_nil());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompanyId(Uuid);

impl CompanyId {
    /// Creates a new random company ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a company ID from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Derives a deterministic ID from a legacy source record key.
    ///
    /// The same `(source, legacy_id)` pair always yields the same ID.
    #[must_use]
    pub fn from_legacy(source: SourceKind, legacy_id: &str) -> Self {
        let key = format!("{}:{}", source.as_str(), legacy_id.trim());
        Self(Uuid::new_v5(&LEGACY_NAMESPACE, key.as_bytes()))
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Returns true if this is a nil (all zeros) UUID.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    /// Creates a nil company ID (for testing or sentinel values).
    #[must_use]
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Parses a hyphenated UUID string.
    ///
    /// # Errors
    /// Returns the underlying parse error for malformed input.
    pub fn parse_str(input: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(input.trim()).map(Self)
    }
}

impl Default for CompanyId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CompanyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for CompanyId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<CompanyId> for Uuid {
    fn from(id: CompanyId) -> Self {
        id.0
    }
}

/// Commercial classification of a company.
///
/// Its business meaning lives outside this crate; merges copy it verbatim
/// from the primary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Company that reached out first.
    Inbound,
    /// Company the sales team is prospecting.
    #[default]
    Outbound,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inbound => write!(f, "inbound"),
            Self::Outbound => write!(f, "outbound"),
        }
    }
}

/// Ingestion path a company record originally arrived through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Typed in by an operator.
    ManualEntry,
    /// Loaded from a spreadsheet or CSV import.
    BulkImport,
    /// Pulled from an external system that issues its own identifiers.
    ExternalSync,
}

impl SourceKind {
    /// Stable lowercase name used in keys and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ManualEntry => "manual_entry",
            Self::BulkImport => "bulk_import",
            Self::ExternalSync => "external_sync",
        }
    }

    /// Identifiers from this source are issued by an external authority
    /// rather than generated locally.
    #[must_use]
    pub const fn is_external(&self) -> bool {
        matches!(self, Self::ExternalSync)
    }

    /// Parses the stable name produced by [`SourceKind::as_str`].
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "manual_entry" | "manual" => Some(Self::ManualEntry),
            "bulk_import" | "import" => Some(Self::BulkImport),
            "external_sync" | "external" => Some(Self::ExternalSync),
            _ => None,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record's identity in the legacy system it came from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LegacyKey {
    /// Originating system.
    pub source: SourceKind,
    /// Identifier in that system.
    pub legacy_id: String,
}

impl LegacyKey {
    /// Creates a key; the legacy id is trimmed.
    #[must_use]
    pub fn new(source: SourceKind, legacy_id: impl AsRef<str>) -> Self {
        Self {
            source,
            legacy_id: legacy_id.as_ref().trim().to_string(),
        }
    }

    /// The deterministic company id derived from this key.
    #[must_use]
    pub fn derived_id(&self) -> CompanyId {
        CompanyId::from_legacy(self.source, &self.legacy_id)
    }
}

impl fmt::Display for LegacyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.legacy_id)
    }
}

/// The single surviving, authoritative record for a real-world company.
///
/// `version` is owned by the store: it starts at 1 on insert and the store
/// bumps it on every successful compare-and-swap update. Mutators on this
/// type only touch `updated_at`.
///
/// # Examples
///
/// ```
/// use company_resolution::{CanonicalCompany, Classification};
///
/// let company = CanonicalCompany::new("Acme S.A. de C.V.", Classification::Inbound);
/// assert_eq!(company.normalized_name.as_str(), "acme");
/// assert!(company.is_live());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalCompany {
    /// Stable identifier; survives retirement.
    pub id: CompanyId,

    /// Display name.
    pub name: String,

    /// Derived from `name`; recomputed by [`CanonicalCompany::set_name`].
    pub normalized_name: NormalizedName,

    /// Primary normalized domain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    /// Every known domain, including the primary `domain`.
    #[serde(default)]
    pub domains: BTreeSet<String>,

    /// Alternative names, compared case-insensitively.
    #[serde(default)]
    pub aliases: BTreeSet<String>,

    /// Primary industry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,

    /// Every known industry, including the primary `industry`.
    #[serde(default)]
    pub industries: BTreeSet<String>,

    /// Business classification.
    pub classification: Classification,

    /// Retired into another record.
    #[serde(default)]
    pub is_merged: bool,

    /// Forwarding target once retired.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_into_company_id: Option<CompanyId>,

    /// When the record was retired.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_at: Option<DateTime<Utc>>,

    /// Who retired it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_by: Option<String>,

    /// Original identifiers per source, for backward lookups after consolidation.
    #[serde(default)]
    pub legacy_source_ids: BTreeMap<SourceKind, BTreeSet<String>>,

    /// Creation time; a merge keeps the earliest.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,

    /// Optimistic concurrency version.
    pub version: u64,
}

impl CanonicalCompany {
    /// Creates a new live company with a random ID.
    #[must_use]
    pub fn new(name: impl Into<String>, classification: Classification) -> Self {
        Self::with_id(CompanyId::new(), name, classification)
    }

    /// Creates a new live company with a specific ID.
    ///
    /// Used by the migration consolidator, which derives ids from legacy keys.
    #[must_use]
    pub fn with_id(id: CompanyId, name: impl Into<String>, classification: Classification) -> Self {
        let name = name.into();
        let now = Utc::now();
        Self {
            id,
            normalized_name: normalize_name(&name),
            name,
            domain: None,
            domains: BTreeSet::new(),
            aliases: BTreeSet::new(),
            industry: None,
            industries: BTreeSet::new(),
            classification,
            is_merged: false,
            merged_into_company_id: None,
            merged_at: None,
            merged_by: None,
            legacy_source_ids: BTreeMap::new(),
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    /// Renames the company and recomputes `normalized_name`.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.normalized_name = normalize_name(&self.name);
        self.touch();
    }

    /// Sets the primary domain, also recording it in `domains`.
    pub fn set_domain(&mut self, domain: Domain) {
        self.domains.insert(domain.as_str().to_string());
        self.domain = Some(domain.into_string());
        self.touch();
    }

    /// Records an additional domain. Returns true if it was new.
    pub fn add_domain(&mut self, domain: &Domain) -> bool {
        let added = self.domains.insert(domain.as_str().to_string());
        if added {
            self.touch();
        }
        added
    }

    /// Sets the primary industry, also recording it in `industries`.
    pub fn set_industry(&mut self, industry: impl Into<String>) {
        let industry = industry.into().trim().to_string();
        if industry.is_empty() {
            return;
        }
        self.add_industry(industry.clone());
        self.industry = Some(industry);
        self.touch();
    }

    /// Records an additional industry (case-insensitive dedupe). Returns true if it was new.
    pub fn add_industry(&mut self, industry: impl Into<String>) -> bool {
        let industry = industry.into().trim().to_string();
        if industry.is_empty() || contains_ignore_case(&self.industries, &industry) {
            return false;
        }
        self.industries.insert(industry);
        self.touch();
        true
    }

    /// Adds an alternate name (case-insensitive dedupe, never the primary name).
    /// Returns true if it was new.
    pub fn add_alias(&mut self, alias: impl Into<String>) -> bool {
        let alias = alias.into().trim().to_string();
        if alias.is_empty()
            || same_name(&alias, &self.name)
            || contains_ignore_case(&self.aliases, &alias)
        {
            return false;
        }
        self.aliases.insert(alias);
        self.touch();
        true
    }

    /// Records the identifier this company carried in a legacy source.
    pub fn add_legacy_id(&mut self, source: SourceKind, legacy_id: impl Into<String>) {
        let legacy_id = legacy_id.into();
        if legacy_id.trim().is_empty() {
            return;
        }
        self.legacy_source_ids
            .entry(source)
            .or_default()
            .insert(legacy_id.trim().to_string());
    }

    /// Retires this record in favor of `survivor`.
    pub fn retire(&mut self, survivor: CompanyId, initiator: impl Into<String>, at: DateTime<Utc>) {
        self.is_merged = true;
        self.merged_into_company_id = Some(survivor);
        self.merged_at = Some(at);
        self.merged_by = Some(initiator.into());
        self.updated_at = at;
    }

    /// Returns true if this record participates in search, listing and matching.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        !self.is_merged
    }

    /// Returns true if `name` equals one of this company's aliases (case-insensitive).
    #[must_use]
    pub fn has_alias(&self, name: &str) -> bool {
        contains_ignore_case(&self.aliases, name.trim())
    }

    /// Returns true if `name` is this company's name or one of its aliases.
    #[must_use]
    pub fn answers_to(&self, name: &str) -> bool {
        same_name(&self.name, name) || self.has_alias(name)
    }

    /// Domains other than the primary one.
    #[must_use]
    pub fn secondary_domain_count(&self) -> usize {
        self.domains
            .iter()
            .filter(|d| self.domain.as_deref() != Some(d.as_str()))
            .count()
    }

    /// Industries other than the primary one.
    #[must_use]
    pub fn secondary_industry_count(&self) -> usize {
        self.industries
            .iter()
            .filter(|i| {
                self.industry
                    .as_deref()
                    .map_or(true, |p| !same_name(p, i))
            })
            .count()
    }

    /// Returns true if any legacy identifier came from an external authority.
    #[must_use]
    pub fn has_external_id(&self) -> bool {
        self.legacy_source_ids
            .iter()
            .any(|(source, ids)| source.is_external() && !ids.is_empty())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

pub(crate) fn contains_ignore_case(set: &BTreeSet<String>, value: &str) -> bool {
    set.iter().any(|v| same_name(v, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::normalize::normalize_domain;

    #[test]
    fn test_company_id_creation() {
        let id1 = CompanyId::new();
        let id2 = CompanyId::new();
        assert_ne!(id1, id2);
        assert!(!id1.is_nil());
        assert!(CompanyId::nil().is_nil());
    }

    #[test]
    fn test_legacy_ids_are_deterministic() {
        let a = CompanyId::from_legacy(SourceKind::BulkImport, "row-17");
        let b = CompanyId::from_legacy(SourceKind::BulkImport, " row-17 ");
        let c = CompanyId::from_legacy(SourceKind::ManualEntry, "row-17");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_company_id_parse_roundtrip() {
        let id = CompanyId::new();
        let parsed = CompanyId::parse_str(&id.to_string()).unwrap();
        assert_eq!(parsed, id);
        assert!(CompanyId::parse_str("not-a-uuid").is_err());
    }

    #[test]
    fn test_new_company_defaults() {
        let company = CanonicalCompany::new("Laboratorios Alfa S.A.", Classification::Outbound);
        assert_eq!(company.version, 1);
        assert!(company.is_live());
        assert_eq!(company.normalized_name.as_str(), "laboratorios alfa");
        assert!(company.aliases.is_empty());
    }

    #[test]
    fn test_set_name_recomputes_normalized_name() {
        let mut company = CanonicalCompany::new("Acme Inc", Classification::Inbound);
        assert_eq!(company.normalized_name.as_str(), "acme");
        company.set_name("Beta Holding");
        assert_eq!(company.normalized_name.as_str(), "beta");
    }

    #[test]
    fn test_alias_dedupe_is_case_insensitive() {
        let mut company = CanonicalCompany::new("Acme", Classification::Inbound);
        assert!(company.add_alias("ACME Corp"));
        assert!(!company.add_alias("acme corp"));
        assert!(!company.add_alias("acme"));
        assert!(!company.add_alias("   "));
        assert_eq!(company.aliases.len(), 1);
        assert!(company.answers_to("Acme corp"));
    }

    #[test]
    fn test_domain_and_industry_counts() {
        let mut company = CanonicalCompany::new("Acme", Classification::Inbound);
        company.set_domain(normalize_domain("https://www.acme.com/about").unwrap());
        company.add_domain(&normalize_domain("acme.mx").unwrap());
        company.set_industry("Pharma");
        company.add_industry("pharma");
        company.add_industry("Biotech");

        assert_eq!(company.domain.as_deref(), Some("acme.com"));
        assert_eq!(company.domains.len(), 2);
        assert_eq!(company.secondary_domain_count(), 1);
        assert_eq!(company.industries.len(), 2);
        assert_eq!(company.secondary_industry_count(), 1);
    }

    #[test]
    fn test_retire_sets_forwarding_pointer() {
        let survivor = CompanyId::new();
        let mut company = CanonicalCompany::new("Acme", Classification::Inbound);
        company.retire(survivor, "ops@example.com", Utc::now());
        assert!(!company.is_live());
        assert_eq!(company.merged_into_company_id, Some(survivor));
        assert_eq!(company.merged_by.as_deref(), Some("ops@example.com"));
    }

    #[test]
    fn test_external_id_detection() {
        let mut company = CanonicalCompany::new("Acme", Classification::Inbound);
        company.add_legacy_id(SourceKind::ManualEntry, "m-1");
        assert!(!company.has_external_id());
        company.add_legacy_id(SourceKind::ExternalSync, "org_991");
        assert!(company.has_external_id());
    }

    #[test]
    fn test_company_serialization() {
        let mut company = CanonicalCompany::new("Acme", Classification::Inbound);
        company.add_legacy_id(SourceKind::BulkImport, "r-1");
        let json = serde_json::to_string(&company).unwrap();
        assert!(json.contains("\"bulk_import\""));
        let back: CanonicalCompany = serde_json::from_str(&json).unwrap();
        assert_eq!(back, company);
    }

    #[test]
    fn test_source_kind_parse() {
        assert_eq!(SourceKind::parse("External_Sync"), Some(SourceKind::ExternalSync));
        assert_eq!(SourceKind::parse("manual"), Some(SourceKind::ManualEntry));
        assert_eq!(SourceKind::parse("crm"), None);
        assert_eq!(SourceKind::BulkImport.to_string(), "bulk_import");
    }
}
