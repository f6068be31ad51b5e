//! Legacy source records.
//!
//! Each ingestion path stored companies in its own shape. Records arrive as
//! one tagged enum so field extraction is per variant rather than by probing
//! untyped maps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::candidate::Candidate;
use crate::company::{CompanyId, LegacyKey, SourceKind};
use crate::normalize::normalize_domain;

/// A company typed in by hand in the old CRM.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManualCompany {
    /// Legacy id.
    pub id: String,
    /// Company name.
    pub name: String,
    /// Website in whatever form it was typed.
    pub website: Option<String>,
    /// Industry label.
    pub industry: Option<String>,
    /// Alternative names.
    pub aliases: Vec<String>,
    /// Free-text customer type; never carried forward.
    pub company_type: Option<String>,
    /// Creation time, when recorded.
    pub created_at: Option<DateTime<Utc>>,
    /// Legacy id of the manual record this one was folded into.
    pub merged_into: Option<String>,
}

/// A row from a spreadsheet import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportedCompany {
    /// Row identifier.
    pub row_id: String,
    /// Company name column.
    pub company_name: String,
    /// Domains column, first one is treated as primary.
    pub domains: Vec<String>,
    /// Primary sector.
    pub sector: Option<String>,
    /// Secondary sectors.
    pub sectors: Vec<String>,
    /// Import time.
    pub imported_at: Option<DateTime<Utc>>,
    /// Row id this row was flagged as a duplicate of.
    pub duplicate_of: Option<String>,
}

/// An organization pulled from an external directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncedOrganization {
    /// Directory identifier.
    pub external_id: String,
    /// Name shown in the directory.
    pub display_name: String,
    /// Registered legal name; kept as an alias.
    pub legal_name: Option<String>,
    /// Primary domain.
    pub primary_domain: Option<String>,
    /// Other domains.
    pub domains: Vec<String>,
    /// Industry labels, first one is treated as primary.
    pub industries: Vec<String>,
    /// False once the directory deactivated the organization.
    pub active: bool,
    /// First time the sync saw the organization.
    pub first_seen: Option<DateTime<Utc>>,
    /// External id this organization was merged into.
    pub merged_into: Option<String>,
}

impl Default for SyncedOrganization {
    fn default() -> Self {
        Self {
            external_id: String::new(),
            display_name: String::new(),
            legal_name: None,
            primary_domain: None,
            domains: Vec::new(),
            industries: Vec::new(),
            active: true,
            first_seen: None,
            merged_into: None,
        }
    }
}

/// One record from any legacy source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum LegacyRecord {
    /// Hand-entered CRM record.
    #[serde(rename = "manual_entry")]
    Manual(ManualCompany),
    /// Spreadsheet import row.
    #[serde(rename = "bulk_import")]
    Imported(ImportedCompany),
    /// External directory organization.
    #[serde(rename = "external_sync")]
    Synced(SyncedOrganization),
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl LegacyRecord {
    /// The source this record came from.
    #[must_use]
    pub const fn source(&self) -> SourceKind {
        match self {
            Self::Manual(_) => SourceKind::ManualEntry,
            Self::Imported(_) => SourceKind::BulkImport,
            Self::Synced(_) => SourceKind::ExternalSync,
        }
    }

    fn raw_id(&self) -> &str {
        match self {
            Self::Manual(r) => &r.id,
            Self::Imported(r) => &r.row_id,
            Self::Synced(r) => &r.external_id,
        }
    }

    /// `(source, legacy id)` key of this record.
    #[must_use]
    pub fn key(&self) -> LegacyKey {
        LegacyKey::new(self.source(), self.raw_id())
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Manual(r) => r.name.trim(),
            Self::Imported(r) => r.company_name.trim(),
            Self::Synced(r) => r.display_name.trim(),
        }
    }

    /// Other names the record is known by.
    #[must_use]
    pub fn aliases(&self) -> Vec<&str> {
        match self {
            Self::Manual(r) => r.aliases.iter().map(String::as_str).collect(),
            Self::Imported(_) => Vec::new(),
            Self::Synced(r) => non_empty(r.legal_name.as_deref()).into_iter().collect(),
        }
    }

    /// Raw domain values, the primary one first.
    #[must_use]
    pub fn domains(&self) -> Vec<&str> {
        match self {
            Self::Manual(r) => non_empty(r.website.as_deref()).into_iter().collect(),
            Self::Imported(r) => r.domains.iter().map(String::as_str).collect(),
            Self::Synced(r) => non_empty(r.primary_domain.as_deref())
                .into_iter()
                .chain(r.domains.iter().map(String::as_str))
                .collect(),
        }
    }

    /// Industry values, the primary one first.
    #[must_use]
    pub fn industries(&self) -> Vec<&str> {
        let values: Vec<&str> = match self {
            Self::Manual(r) => r.industry.as_deref().into_iter().collect(),
            Self::Imported(r) => r
                .sector
                .as_deref()
                .into_iter()
                .chain(r.sectors.iter().map(String::as_str))
                .collect(),
            Self::Synced(r) => r.industries.iter().map(String::as_str).collect(),
        };
        values
            .into_iter()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .collect()
    }

    /// Creation timestamp the source recorded.
    #[must_use]
    pub const fn created_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Manual(r) => r.created_at,
            Self::Imported(r) => r.imported_at,
            Self::Synced(r) => r.first_seen,
        }
    }

    /// Key of the record this one was merged into within its own source.
    #[must_use]
    pub fn merged_into(&self) -> Option<LegacyKey> {
        let target = match self {
            Self::Manual(r) => r.merged_into.as_deref(),
            Self::Imported(r) => r.duplicate_of.as_deref(),
            Self::Synced(r) => r.merged_into.as_deref(),
        };
        non_empty(target).map(|id| LegacyKey::new(self.source(), id))
    }

    /// Whether the source marked the record active.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        match self {
            Self::Synced(r) => r.active,
            Self::Manual(_) | Self::Imported(_) => true,
        }
    }
}

/// A legacy record paired with its key, as seen by the matcher.
#[derive(Debug, Clone)]
pub(crate) struct LegacyView {
    pub key: LegacyKey,
    pub id: CompanyId,
    pub record: LegacyRecord,
}

impl LegacyView {
    pub fn new(record: LegacyRecord) -> Self {
        let key = record.key();
        Self {
            id: key.derived_id(),
            key,
            record,
        }
    }
}

impl Candidate for LegacyView {
    fn candidate_id(&self) -> CompanyId {
        self.id
    }

    fn candidate_name(&self) -> &str {
        self.record.name()
    }

    fn domain_fields(&self) -> Vec<&str> {
        self.record.domains()
    }

    // Records already folded away in their own source stay out of clustering;
    // the relink pass forwards them instead.
    fn is_retired(&self) -> bool {
        self.record.merged_into().is_some()
    }

    fn has_domain(&self) -> bool {
        self.record
            .domains()
            .first()
            .is_some_and(|d| normalize_domain(d).is_some())
    }

    fn has_industry(&self) -> bool {
        !self.record.industries().is_empty()
    }

    fn secondary_domain_count(&self) -> usize {
        self.record.domains().len().saturating_sub(1)
    }

    fn secondary_industry_count(&self) -> usize {
        self.record.industries().len().saturating_sub(1)
    }

    fn alias_count(&self) -> usize {
        self.record.aliases().len()
    }

    fn has_external_id(&self) -> bool {
        self.key.source.is_external()
    }

    fn is_active(&self) -> bool {
        self.record.is_active()
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.record.created_at()
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_json_selects_the_variant() {
        let raw = r#"[
            {"source": "manual_entry", "id": "m-1", "name": "Acme", "website": "https://acme.com"},
            {"source": "bulk_import", "row_id": "7", "company_name": "ACME S.A.", "domains": ["acme.com", "acme.mx"]},
            {"source": "external_sync", "external_id": "org-9", "display_name": "Acme", "legal_name": "Acme Holdings"}
        ]"#;
        let records: Vec<LegacyRecord> = serde_json::from_str(raw).unwrap();

        assert_eq!(records[0].source(), SourceKind::ManualEntry);
        assert_eq!(records[0].domains(), vec!["https://acme.com"]);
        assert_eq!(records[1].key(), LegacyKey::new(SourceKind::BulkImport, "7"));
        assert_eq!(records[1].domains().len(), 2);
        assert_eq!(records[2].aliases(), vec!["Acme Holdings"]);
        assert!(records[2].is_active());
    }

    #[test]
    fn test_merged_into_stays_within_the_source() {
        let record = LegacyRecord::Imported(ImportedCompany {
            row_id: "12".to_string(),
            company_name: "Beta".to_string(),
            duplicate_of: Some(" 3 ".to_string()),
            ..ImportedCompany::default()
        });
        assert_eq!(
            record.merged_into(),
            Some(LegacyKey::new(SourceKind::BulkImport, "3"))
        );
        assert!(LegacyView::new(record).is_retired());
    }

    #[test]
    fn test_view_ids_are_derived_from_the_key() {
        let a = LegacyView::new(LegacyRecord::Manual(ManualCompany {
            id: "m-1".to_string(),
            name: "Acme".to_string(),
            ..ManualCompany::default()
        }));
        let b = LegacyView::new(LegacyRecord::Manual(ManualCompany {
            id: "m-1".to_string(),
            name: "Other".to_string(),
            ..ManualCompany::default()
        }));
        assert_eq!(a.id, b.id);
        assert_eq!(a.id, CompanyId::from_legacy(SourceKind::ManualEntry, "m-1"));
        assert!(!a.has_external_id());
    }
}
