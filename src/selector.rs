//! Primary selection within a duplicate cluster.
//!
//! Each member gets an additive completeness score; the highest score
//! survives. Ties fall back to [`TieBreak`].

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::candidate::Candidate;
use crate::company::CompanyId;

const NAME_POINTS: u32 = 10;
const DOMAIN_POINTS: u32 = 5;
const INDUSTRY_POINTS: u32 = 5;
const SECONDARY_DOMAIN_POINTS: u32 = 2;
const SECONDARY_DOMAIN_CAP: u32 = 10;
const SECONDARY_INDUSTRY_POINTS: u32 = 3;
const SECONDARY_INDUSTRY_CAP: u32 = 9;
const ALIAS_CAP: u32 = 5;
const EXTERNAL_ID_POINTS: u32 = 20;
const ACTIVE_POINTS: u32 = 10;
const CREATED_AT_POINTS: u32 = 5;

/// How to order members whose completeness scores are equal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Keep candidate input order (earlier wins).
    #[default]
    InputOrder,
    /// Prefer the member modified most recently; input order after that.
    MostRecentlyUpdated,
}

impl TieBreak {
    /// Parses `input_order` / `most_recently_updated`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "input_order" | "input" => Some(Self::InputOrder),
            "most_recently_updated" | "recent" => Some(Self::MostRecentlyUpdated),
            _ => None,
        }
    }
}

/// Additive completeness score of a record.
///
/// | signal | points |
/// |---|---|
/// | non-empty name | 10 |
/// | domain present | 5 |
/// | industry present | 5 |
/// | each secondary domain | 2, max 10 |
/// | each secondary industry | 3, max 9 |
/// | each alias | 1, max 5 |
/// | externally issued identifier | 20 |
/// | active in its source | 10 |
/// | creation timestamp known | 5 |
#[must_use]
pub fn completeness_score<C: Candidate + ?Sized>(candidate: &C) -> u32 {
    let mut score = 0;
    if !candidate.candidate_name().trim().is_empty() {
        score += NAME_POINTS;
    }
    if candidate.has_domain() {
        score += DOMAIN_POINTS;
    }
    if candidate.has_industry() {
        score += INDUSTRY_POINTS;
    }
    score += capped(candidate.secondary_domain_count(), SECONDARY_DOMAIN_POINTS, SECONDARY_DOMAIN_CAP);
    score += capped(
        candidate.secondary_industry_count(),
        SECONDARY_INDUSTRY_POINTS,
        SECONDARY_INDUSTRY_CAP,
    );
    score += capped(candidate.alias_count(), 1, ALIAS_CAP);
    if candidate.has_external_id() {
        score += EXTERNAL_ID_POINTS;
    }
    if candidate.is_active() {
        score += ACTIVE_POINTS;
    }
    if candidate.created_at().is_some() {
        score += CREATED_AT_POINTS;
    }
    score
}

fn capped(count: usize, points: u32, cap: u32) -> u32 {
    u32::try_from(count)
        .unwrap_or(u32::MAX)
        .saturating_mul(points)
        .min(cap)
}

/// Outcome of primary selection over one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    /// Highest-scoring member.
    pub primary: CompanyId,
    /// Remaining members, highest score first.
    pub secondaries: Vec<CompanyId>,
    /// Every member's score in final rank order.
    pub scores: Vec<(CompanyId, u32)>,
}

impl Selection {
    /// Score of a member, if it took part.
    #[must_use]
    pub fn score_of(&self, id: CompanyId) -> Option<u32> {
        self.scores.iter().find(|(m, _)| *m == id).map(|(_, s)| *s)
    }
}

/// Picks the survivor of a cluster.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrimarySelector {
    tie_break: TieBreak,
}

impl PrimarySelector {
    /// Creates a selector with the given tie-break rule.
    #[must_use]
    pub const fn new(tie_break: TieBreak) -> Self {
        Self { tie_break }
    }

    /// Ranks `members` (given in input order) and returns the winner.
    ///
    /// Returns `None` for an empty slice. Deterministic for a given input
    /// order.
    #[must_use]
    pub fn select<C: Candidate>(&self, members: &[&C]) -> Option<Selection> {
        let mut ranked: Vec<(&C, u32)> = members
            .iter()
            .map(|c| (*c, completeness_score(*c)))
            .collect();

        // Stable sort: equal keys keep input order.
        ranked.sort_by(|(a, sa), (b, sb)| {
            sb.cmp(sa).then_with(|| match self.tie_break {
                TieBreak::InputOrder => Ordering::Equal,
                TieBreak::MostRecentlyUpdated => b.updated_at().cmp(&a.updated_at()),
            })
        });

        let scores: Vec<(CompanyId, u32)> = ranked
            .iter()
            .map(|(c, s)| (c.candidate_id(), *s))
            .collect();
        let (primary, _) = *scores.first()?;
        let secondaries = scores.iter().skip(1).map(|(id, _)| *id).collect();

        Some(Selection {
            primary,
            secondaries,
            scores,
        })
    }
}
