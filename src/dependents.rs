//! Records owned by other subsystems that point at a company by name.
//!
//! Contacts and cases store the company as a free-text string. A merge
//! rewrites those strings, and the optional id field when present.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::company::{CanonicalCompany, CompanyId};
use crate::normalize::same_name;

/// Unique identifier for a contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContactId(Uuid);

impl ContactId {
    /// Creates a new random contact ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ContactId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a case (deal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseId(Uuid);

impl CaseId {
    /// Creates a new random case ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CaseId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The company a dependent record should point at after a rewrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyRef {
    /// Target company.
    pub id: CompanyId,
    /// Name written into the denormalized field.
    pub name: String,
}

impl From<&CanonicalCompany> for CompanyRef {
    fn from(company: &CanonicalCompany) -> Self {
        Self {
            id: company.id,
            name: company.name.clone(),
        }
    }
}

/// Returns true if a denormalized company string refers to `name`.
///
/// Exact match after trimming, Unicode case-insensitive.
#[must_use]
pub fn references_name(stored: &str, name: &str) -> bool {
    !name.trim().is_empty() && same_name(stored, name)
}

/// A person at a company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Contact id.
    pub id: ContactId,
    /// Person's name.
    pub name: String,
    /// Email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Denormalized company name.
    pub company: String,
    /// Resolved company, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<CompanyId>,
}

impl Contact {
    /// Creates a contact referencing a company by name only.
    #[must_use]
    pub fn new(name: impl Into<String>, company: impl Into<String>) -> Self {
        Self {
            id: ContactId::new(),
            name: name.into(),
            email: None,
            company: company.into(),
            company_id: None,
        }
    }

    /// Sets the email address.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Also records the company id.
    #[must_use]
    pub const fn with_company_id(mut self, id: CompanyId) -> Self {
        self.company_id = Some(id);
        self
    }

    /// Repoints the contact at `target`. Returns false if it did not
    /// reference `from_name`.
    pub fn repoint(&mut self, from_name: &str, target: &CompanyRef) -> bool {
        if !references_name(&self.company, from_name) {
            return false;
        }
        self.company.clone_from(&target.name);
        if self.company_id.is_some() {
            self.company_id = Some(target.id);
        }
        true
    }
}

/// A deal or support case tied to a company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Case {
    /// Case id.
    pub id: CaseId,
    /// Short description.
    pub title: String,
    /// Denormalized company name.
    pub company_name: String,
    /// Resolved company, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<CompanyId>,
}

impl Case {
    /// Creates a case referencing a company by name only.
    #[must_use]
    pub fn new(title: impl Into<String>, company_name: impl Into<String>) -> Self {
        Self {
            id: CaseId::new(),
            title: title.into(),
            company_name: company_name.into(),
            company_id: None,
        }
    }

    /// Also records the company id.
    #[must_use]
    pub const fn with_company_id(mut self, id: CompanyId) -> Self {
        self.company_id = Some(id);
        self
    }

    /// Repoints the case at `target`. Returns false if it did not
    /// reference `from_name`.
    pub fn repoint(&mut self, from_name: &str, target: &CompanyRef) -> bool {
        if !references_name(&self.company_name, from_name) {
            return false;
        }
        self.company_name.clone_from(&target.name);
        if self.company_id.is_some() {
            self.company_id = Some(target.id);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::company::Classification;

    #[test]
    fn test_name_match_is_exact_and_case_insensitive() {
        assert!(references_name("Pharma Beta", "pharma beta"));
        assert!(references_name("  PHARMA BETA ", "Pharma Beta"));
        assert!(!references_name("Pharma Beta Labs", "Pharma Beta"));
        assert!(!references_name("", ""));
        assert!(references_name("óptica beta", "ÓPTICA BETA"));
        assert!(references_name("Compañía Ñandú", "COMPAÑÍA ÑANDÚ"));
        assert!(!references_name("Optica Beta", "Óptica Beta"));
    }

    #[test]
    fn test_contact_repoint_updates_name_and_existing_id() {
        let old = CanonicalCompany::new("Pharma Beta", Classification::Inbound);
        let new = CanonicalCompany::new("Laboratorios Alfa", Classification::Inbound);
        let target = CompanyRef::from(&new);

        let mut linked = Contact::new("Ana", "Pharma Beta").with_company_id(old.id);
        assert!(linked.repoint("pharma beta", &target));
        assert_eq!(linked.company, "Laboratorios Alfa");
        assert_eq!(linked.company_id, Some(new.id));

        let mut by_name = Contact::new("Luis", "Pharma Beta");
        assert!(by_name.repoint("Pharma Beta", &target));
        assert_eq!(by_name.company_id, None);

        let mut other = Contact::new("Eva", "Zeta");
        assert!(!other.repoint("Pharma Beta", &target));
        assert_eq!(other.company, "Zeta");
    }

    #[test]
    fn test_case_repoint_matches_company_name() {
        let target = CompanyRef {
            id: CompanyId::new(),
            name: "Acme".to_string(),
        };
        let mut case = Case::new("Renewal", "ACME Inc");
        assert!(!case.repoint("Acme", &target));
        assert!(case.repoint("acme inc", &target));
        assert_eq!(case.company_name, "Acme");
    }
}
