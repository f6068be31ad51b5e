//! Domain and company-name normalization.
//!
//! Pure functions. Both normalizers are deterministic and idempotent, which
//! is what lets the indexer group records by exact structural equality.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Normalized names shorter than this (in characters) never take part in
/// fuzzy matching.
pub const MIN_FUZZY_NAME_LEN: usize = 3;

/// Upper bound on suffix-removal passes. Each pass strips until no listed
/// suffix matches the tail, so a stack like "Labs México S.A." clears in one.
const MAX_SUFFIX_PASSES: usize = 3;

/// Webmail and ISP domains that identify a mailbox provider, not a company.
const PUBLIC_EMAIL_PROVIDERS: &[&str] = &[
    "gmail.com",
    "googlemail.com",
    "hotmail.com",
    "hotmail.es",
    "hotmail.com.mx",
    "outlook.com",
    "outlook.es",
    "live.com",
    "live.com.mx",
    "msn.com",
    "yahoo.com",
    "yahoo.com.mx",
    "yahoo.es",
    "ymail.com",
    "icloud.com",
    "me.com",
    "aol.com",
    "protonmail.com",
    "proton.me",
    "gmx.com",
    "mail.com",
    "zoho.com",
    "yandex.com",
    "prodigy.net.mx",
];

/// Trailing tokens removed from names, already in normalized form.
///
/// Order matters: after every strip the list is retried from the top, so
/// longer phrases sit before their shorter prefixes.
const NAME_SUFFIXES: &[&str] = &[
    // countries and regions
    "de mexico",
    "mexico",
    "usa",
    "united states",
    "espana",
    "spain",
    "colombia",
    "argentina",
    "chile",
    "peru",
    "brasil",
    "brazil",
    "latam",
    "latinoamerica",
    "international",
    "internacional",
    "global",
    // legal-entity suffixes
    "s a p i de c v",
    "sapi de cv",
    "s de r l de c v",
    "s de rl de cv",
    "s a de c v",
    "sa de cv",
    "s a b de c v",
    "s c",
    "s a s",
    "sas",
    "s a",
    "sa",
    "s l",
    "sl",
    "s r l",
    "srl",
    "ltda",
    "cia",
    "inc",
    "incorporated",
    "corp",
    "corporation",
    "co",
    "company",
    "ltd",
    "limited",
    "llc",
    "llp",
    "lp",
    "plc",
    "gmbh",
    "ag",
    "bv",
    "spa",
    "pty",
    // generic industry words
    "pharmaceuticals",
    "pharmaceutical",
    "pharma",
    "farmaceutica",
    "farmaceuticos",
    "laboratories",
    "laboratory",
    "laboratorios",
    "labs",
    "lab",
    "technologies",
    "technology",
    "healthcare",
    // generic corporate words
    "group",
    "grupo",
    "holding",
    "holdings",
    "solutions",
    "soluciones",
    "services",
    "servicios",
    "enterprises",
    "industries",
    "corporativo",
    "partners",
];

/// A lowercase company domain with scheme, `www.`, path and port removed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Domain(String);

impl Domain {
    /// Normalizes `raw`; see [`normalize_domain`].
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        normalize_domain(raw)
    }

    /// Returns the normalized domain string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the domain, returning the inner string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A company name after accent folding, punctuation removal and suffix stripping.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedName(String);

impl NormalizedName {
    /// Returns the normalized string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if nothing survived normalization.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Length in characters (not bytes).
    #[must_use]
    pub fn char_len(&self) -> usize {
        self.0.chars().count()
    }

    /// Returns true if the name is long enough to be compared fuzzily.
    #[must_use]
    pub fn is_fuzzy_eligible(&self, min_len: usize) -> bool {
        self.char_len() >= min_len
    }
}

impl fmt::Display for NormalizedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalizes a raw domain-bearing string (URL, bare host, `www.` host).
///
/// Returns `None` for email addresses, public mailbox providers and strings
/// that reduce to nothing, none of which identify a company.
///
/// # Examples
///
/// ```
/// use company_resolution::normalize::normalize_domain;
///
/// let d = normalize_domain("HTTPS://www.Acme.com:443/contact").unwrap();
/// assert_eq!(d.as_str(), "acme.com");
/// assert!(normalize_domain("sales@acme.com").is_none());
/// assert!(normalize_domain("gmail.com").is_none());
/// ```
#[must_use]
pub fn normalize_domain(raw: &str) -> Option<Domain> {
    let lowered = raw.trim().to_lowercase();
    if lowered.is_empty() || lowered.contains('@') {
        return None;
    }

    let mut host = match lowered.find("://") {
        Some(pos) => &lowered[pos + 3..],
        None => lowered.as_str(),
    };
    while let Some(rest) = host.strip_prefix("www.") {
        host = rest;
    }
    if let Some(end) = host.find(['/', ':', '?', '#']) {
        host = &host[..end];
    }
    let host = host.trim().trim_end_matches('.');

    if host.is_empty() || host.chars().any(char::is_whitespace) {
        return None;
    }
    if PUBLIC_EMAIL_PROVIDERS.contains(&host) {
        return None;
    }
    Some(Domain(host.to_string()))
}

/// Key used when folding domain sets: the normalized domain, or the trimmed
/// lowercase raw value when it does not normalize, so folding never drops
/// what a record carried.
pub(crate) fn domain_key(raw: &str) -> Option<String> {
    normalize_domain(raw).map(Domain::into_string).or_else(|| {
        let lowered = raw.trim().to_lowercase();
        (!lowered.is_empty()).then_some(lowered)
    })
}

/// Case-folded comparison key for display names and aliases.
///
/// Trimmed and lowercased with full Unicode case mapping. Accents are kept:
/// "ÓPTICA" and "óptica" share a key, "Optica" does not.
///
/// # Examples
///
/// ```
/// use company_resolution::normalize::fold_name_key;
///
/// assert_eq!(fold_name_key(" ÓPTICA Beta "), fold_name_key("óptica beta"));
/// assert_ne!(fold_name_key("Óptica"), fold_name_key("Optica"));
/// ```
#[must_use]
pub fn fold_name_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Returns true if two display names are equal under [`fold_name_key`].
#[must_use]
pub fn same_name(a: &str, b: &str) -> bool {
    fold_name_key(a) == fold_name_key(b)
}

/// Normalizes a company name for matching.
///
/// Lowercases, folds accented Latin characters, turns punctuation into
/// spaces, strips trailing country/legal/industry/corporate suffix tokens
/// (up to three passes, never removing the last remaining token) and
/// collapses whitespace.
///
/// # Examples
///
/// ```
/// use company_resolution::normalize::normalize_name;
///
/// let n = normalize_name("Laboratorios Alfa S.A. de C.V. México");
/// assert_eq!(n.as_str(), "laboratorios alfa");
/// ```
#[must_use]
pub fn normalize_name(raw: &str) -> NormalizedName {
    let folded: String = raw
        .to_lowercase()
        .chars()
        .map(fold_accent)
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    let mut tokens: Vec<&str> = folded.split_whitespace().collect();

    for _ in 0..MAX_SUFFIX_PASSES {
        let before = tokens.len();
        while NAME_SUFFIXES
            .iter()
            .any(|suffix| strip_suffix(&mut tokens, suffix))
        {}
        if tokens.len() == before {
            break;
        }
    }

    NormalizedName(tokens.join(" "))
}

fn strip_suffix(tokens: &mut Vec<&str>, suffix: &str) -> bool {
    let suffix_tokens: Vec<&str> = suffix.split(' ').collect();
    if tokens.len() <= suffix_tokens.len() || !tokens.ends_with(&suffix_tokens) {
        return false;
    }
    tokens.truncate(tokens.len() - suffix_tokens.len());
    true
}

fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'ä' | 'â' | 'ã' | 'å' => 'a',
        'é' | 'è' | 'ë' | 'ê' => 'e',
        'í' | 'ì' | 'ï' | 'î' => 'i',
        'ó' | 'ò' | 'ö' | 'ô' | 'õ' => 'o',
        'ú' | 'ù' | 'ü' | 'û' => 'u',
        'ñ' => 'n',
        'ç' => 'c',
        'ý' | 'ÿ' => 'y',
        other => other,
    }
}
