//! End-to-end merge tests over the in-memory backend.

use std::sync::Arc;

use company_resolution::storage::{
    CompanyReferences, InMemoryAuditStore, InMemoryCaseStore, InMemoryCompanyStore,
    InMemoryContactStore, InMemoryIdMappingStore,
};
use company_resolution::{
    AuditKind, AuditStore, Case, CaseStore, CompanyStore, ConflictError, Contact, ContactStore,
    MergeRequest, MergeSide, NewCompany, ResolutionConfig, ResolutionEngine, ResolutionError,
    ValidationError,
};

struct Harness {
    companies: Arc<InMemoryCompanyStore>,
    contacts: Arc<InMemoryContactStore>,
    cases: Arc<InMemoryCaseStore>,
    audit: Arc<InMemoryAuditStore>,
    engine: ResolutionEngine,
}

fn harness() -> Harness {
    let companies = Arc::new(InMemoryCompanyStore::new());
    let contacts = Arc::new(InMemoryContactStore::new());
    let cases = Arc::new(InMemoryCaseStore::new());
    let audit = Arc::new(InMemoryAuditStore::new());
    let engine = ResolutionEngine::new(
        companies.clone(),
        contacts.clone(),
        cases.clone(),
        audit.clone(),
        Arc::new(InMemoryIdMappingStore::new()),
        ResolutionConfig::default(),
    )
    .unwrap();
    Harness {
        companies,
        contacts,
        cases,
        audit,
        engine,
    }
}

fn company(name: &str, domain: Option<&str>) -> NewCompany {
    let mut new = NewCompany::named(name);
    new.domain = domain.map(str::to_string);
    new
}

#[test]
fn test_merge_repoints_contacts_and_cases() {
    let h = harness();
    let alfa = h
        .engine
        .create_company(company("Laboratorios Alfa", Some("alfa.mx")))
        .unwrap();
    let beta = h
        .engine
        .create_company(company("Pharma Beta", Some("pharmabeta.com")))
        .unwrap();

    let ana = Contact::new("Ana Ruiz", "Pharma Beta").with_company_id(beta.id);
    let ana_id = ana.id;
    h.contacts.insert(ana).unwrap();
    h.contacts.insert(Contact::new("Luis Paz", "Laboratorios Alfa")).unwrap();
    let deal = Case::new("Q3 renewal", "pharma beta");
    let deal_id = deal.id;
    h.cases.insert(deal).unwrap();

    let result = h
        .engine
        .merge(&MergeRequest::new(alfa.id, beta.id).initiated_by("ops@example.com"))
        .unwrap();
    assert_eq!(result.contacts_updated, 1);
    assert_eq!(result.cases_updated, 1);

    let ana = h.contacts.get(ana_id).unwrap().unwrap();
    assert_eq!(ana.company, "Laboratorios Alfa");
    assert_eq!(ana.company_id, Some(alfa.id));
    let deal = h.cases.get(deal_id).unwrap().unwrap();
    assert_eq!(deal.company_name, "Laboratorios Alfa");

    let audit = h.audit.list().unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].initiator, "ops@example.com");
    match &audit[0].kind {
        AuditKind::Merge(delta) => {
            assert_eq!(delta.secondary_name, "Pharma Beta");
            assert_eq!(delta.contacts_updated, 1);
            assert_eq!(delta.domains_added, vec!["pharmabeta.com"]);
        }
        other => panic!("unexpected audit kind: {other:?}"),
    }
}

#[test]
fn test_merge_loses_no_information() {
    let h = harness();
    let mut primary = company("Acme", Some("acme.com"));
    primary.industry = Some("Manufacturing".to_string());
    let primary = h.engine.create_company(primary).unwrap();

    let mut secondary = company("Acme Iberia", Some("acme.es"));
    secondary.domains = vec!["acme.pt".to_string()];
    secondary.industry = Some("Logistics".to_string());
    secondary.aliases = vec!["Acme Portugal".to_string()];
    let secondary = h.engine.create_company(secondary).unwrap();
    let before = h.companies.get(secondary.id).unwrap().unwrap();

    h.engine
        .merge(&MergeRequest::new(primary.id, secondary.id))
        .unwrap();

    let after = h.companies.get(primary.id).unwrap().unwrap();
    for domain in &before.domains {
        assert!(after.domains.contains(domain), "lost domain {domain}");
    }
    for industry in &before.industries {
        assert!(after.industries.contains(industry), "lost industry {industry}");
    }
    for alias in &before.aliases {
        assert!(after.has_alias(alias), "lost alias {alias}");
    }
    assert!(after.has_alias(&before.name));
    assert_eq!(after.domain.as_deref(), Some("acme.com"));
    assert_eq!(after.industry.as_deref(), Some("Manufacturing"));

    let retired = h.companies.get(secondary.id).unwrap().unwrap();
    assert!(retired.is_merged);
    assert_eq!(retired.merged_into_company_id, Some(primary.id));
    assert!(h.engine.search("Iberia", 10).unwrap().iter().all(|c| c.id == primary.id));
}

#[test]
fn test_self_merge_is_rejected_without_mutation() {
    let h = harness();
    let acme = h.engine.create_company(company("Acme", None)).unwrap();

    let err = h.engine.merge(&MergeRequest::new(acme.id, acme.id)).unwrap_err();
    assert!(matches!(
        err,
        ResolutionError::Validation(ValidationError::SelfMerge { .. })
    ));
    assert_eq!(h.companies.get(acme.id).unwrap().unwrap(), acme);
    assert!(h.audit.list().unwrap().is_empty());
}

#[test]
fn test_missing_side_is_reported() {
    let h = harness();
    let acme = h.engine.create_company(company("Acme", None)).unwrap();
    let ghost = company_resolution::CompanyId::new();

    let err = h.engine.merge(&MergeRequest::new(ghost, acme.id)).unwrap_err();
    assert_eq!(err.missing_side(), Some(MergeSide::Primary));
    let err = h.engine.merge(&MergeRequest::new(acme.id, ghost)).unwrap_err();
    assert_eq!(err.missing_side(), Some(MergeSide::Secondary));
}

#[test]
fn test_alias_collision_is_rejected_without_mutation() {
    let h = harness();
    let p = h.engine.create_company(company("Primary Co", None)).unwrap();
    let mut q = NewCompany::named("Quorum Holdings");
    q.aliases = vec!["Sigma".to_string()];
    let q = h.engine.create_company(q).unwrap();
    // Written straight to the store: the engine itself refuses to create a
    // company under a claimed name.
    let s = company_resolution::CanonicalCompany::new(
        "sigma",
        company_resolution::Classification::Outbound,
    );
    h.companies.insert(s.clone()).unwrap();

    let err = h.engine.merge(&MergeRequest::new(p.id, s.id)).unwrap_err();
    assert!(matches!(
        err,
        ResolutionError::Conflict(ConflictError::AliasClaimed { owner, .. }) if owner == q.id
    ));

    assert_eq!(h.companies.get(p.id).unwrap().unwrap(), p);
    assert_eq!(h.companies.get(q.id).unwrap().unwrap(), q);
    assert_eq!(h.companies.get(s.id).unwrap().unwrap(), s);
}

#[test]
fn test_accented_names_match_dependents_regardless_of_case() {
    let h = harness();
    let p = h.engine.create_company(company("Grupo Visión", None)).unwrap();
    let s = h.engine.create_company(company("Óptica Beta", None)).unwrap();
    h.contacts.insert(Contact::new("Inés", "óptica beta")).unwrap();
    h.cases.insert(Case::new("Renovación", "ÓPTICA BETA")).unwrap();

    let result = h.engine.merge(&MergeRequest::new(p.id, s.id)).unwrap();
    assert_eq!(result.contacts_updated, 1);
    assert_eq!(result.cases_updated, 1);
    assert_eq!(h.contacts.count_references("Grupo Visión").unwrap(), 1);
    assert_eq!(h.cases.count_references("grupo visión").unwrap(), 1);
}

#[test]
fn test_accented_alias_claim_is_case_insensitive() {
    let h = harness();
    let p = h.engine.create_company(company("Grupo Visión", None)).unwrap();
    let mut q = NewCompany::named("Lentes Quetzal");
    q.aliases = vec!["óptica beta".to_string()];
    let q = h.engine.create_company(q).unwrap();

    let err = h
        .engine
        .create_company(company("ÓPTICA BETA", None))
        .unwrap_err();
    assert!(matches!(
        err,
        ResolutionError::Conflict(ConflictError::NameClaimed { owner, .. }) if owner == q.id
    ));

    let s = company_resolution::CanonicalCompany::new(
        "ÓPTICA BETA",
        company_resolution::Classification::Outbound,
    );
    h.companies.insert(s.clone()).unwrap();
    let err = h.engine.merge(&MergeRequest::new(p.id, s.id)).unwrap_err();
    assert!(matches!(
        err,
        ResolutionError::Conflict(ConflictError::AliasClaimed { owner, .. }) if owner == q.id
    ));
    assert_eq!(h.companies.get(s.id).unwrap().unwrap(), s);
}

#[test]
fn test_dry_run_leaves_state_untouched() {
    let h = harness();
    let p = h.engine.create_company(company("Acme", Some("acme.com"))).unwrap();
    let s = h
        .engine
        .create_company(company("Acme Norte", Some("acme-norte.com")))
        .unwrap();
    h.contacts.insert(Contact::new("Eva", "ACME NORTE")).unwrap();

    let preview = h
        .engine
        .merge(&MergeRequest::new(p.id, s.id).dry_run(true))
        .unwrap();
    assert!(preview.dry_run);
    assert_eq!(preview.contacts_updated, 1);
    assert_eq!(preview.domains_added, vec!["acme-norte.com"]);

    let p_after = h.companies.get(p.id).unwrap().unwrap();
    let s_after = h.companies.get(s.id).unwrap().unwrap();
    assert_eq!(
        serde_json::to_vec(&p_after).unwrap(),
        serde_json::to_vec(&p).unwrap()
    );
    assert_eq!(
        serde_json::to_vec(&s_after).unwrap(),
        serde_json::to_vec(&s).unwrap()
    );
    assert_eq!(h.contacts.count_references("Acme Norte").unwrap(), 1);
    assert!(h.audit.list().unwrap().is_empty());

    // The same pair still merges for real afterwards.
    let result = h.engine.merge(&MergeRequest::new(p.id, s.id)).unwrap();
    assert_eq!(result.contacts_updated, 1);
}

#[test]
fn test_repeated_merge_conflicts() {
    let h = harness();
    let p = h.engine.create_company(company("Acme", None)).unwrap();
    let s = h.engine.create_company(company("Acme Sur", None)).unwrap();
    h.engine.merge(&MergeRequest::new(p.id, s.id)).unwrap();

    let err = h.engine.merge(&MergeRequest::new(p.id, s.id)).unwrap_err();
    assert!(err.is_conflict());
    assert!(!err.is_retryable());
    assert_eq!(h.audit.list().unwrap().len(), 1);
}
