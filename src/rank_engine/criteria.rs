//! Classification criteria attached to a rank, and the staging operations
//! that validate them against the catalog before commit.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::rank_engine::{
    canonical_key::CanonicalKey,
    catalog::Catalog,
    engine::RankEngine,
    rank::Rank,
    types::{
        CatalogEntity, FACET_ONLY_TERM, FacetId, RankError, RankResult, RankType, TermId,
    },
};

/// One (facet, term) pair. `term_id == 0` marks a facet-only criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Criterion {
    pub facet_id: FacetId,
    pub term_id: TermId,
}

impl Criterion {
    pub const fn facet(facet_id: FacetId) -> Self {
        Self {
            facet_id,
            term_id: FACET_ONLY_TERM,
        }
    }

    pub const fn term(facet_id: FacetId, term_id: TermId) -> Self {
        Self { facet_id, term_id }
    }

    pub const fn is_facet_only(&self) -> bool {
        self.term_id == FACET_ONLY_TERM
    }

    /// Term criteria are identified by term id alone, since a term can move
    /// to another facet after it was staged.
    pub const fn same_target(&self, other: &Criterion) -> bool {
        if self.is_facet_only() || other.is_facet_only() {
            self.facet_id == other.facet_id && self.term_id == other.term_id
        } else {
            self.term_id == other.term_id
        }
    }
}

/// The staged criteria of a rank, one variant per rank type. Each variant
/// carries its own arity: `Facet` and `SingleTerm` hold at most one
/// criterion, `CombinedTerm` any number of distinct terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RankCriteriaSet {
    Facet(Option<FacetId>),
    SingleTerm(Option<Criterion>),
    CombinedTerm(IndexSet<Criterion>),
}

impl RankCriteriaSet {
    pub fn empty(rank_type: RankType) -> Self {
        match rank_type {
            RankType::Facet => RankCriteriaSet::Facet(None),
            RankType::SingleTerm => RankCriteriaSet::SingleTerm(None),
            RankType::CombinedTerm => RankCriteriaSet::CombinedTerm(IndexSet::new()),
        }
    }

    /// Rebuilds a set from stored criterion rows.
    pub(crate) fn from_rows(rank_type: RankType, rows: Vec<Criterion>) -> Self {
        let mut set = Self::empty(rank_type);
        for criterion in rows {
            set.insert(criterion);
        }
        set
    }

    pub fn rank_type(&self) -> RankType {
        match self {
            RankCriteriaSet::Facet(_) => RankType::Facet,
            RankCriteriaSet::SingleTerm(_) => RankType::SingleTerm,
            RankCriteriaSet::CombinedTerm(_) => RankType::CombinedTerm,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RankCriteriaSet::Facet(f) => usize::from(f.is_some()),
            RankCriteriaSet::SingleTerm(c) => usize::from(c.is_some()),
            RankCriteriaSet::CombinedTerm(set) => set.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn criteria(&self) -> Vec<Criterion> {
        match self {
            RankCriteriaSet::Facet(f) => f.iter().map(|f| Criterion::facet(*f)).collect(),
            RankCriteriaSet::SingleTerm(c) => c.iter().copied().collect(),
            RankCriteriaSet::CombinedTerm(set) => set.iter().copied().collect(),
        }
    }

    /// The ids that identify this context: the facet for `Facet`, the terms
    /// otherwise.
    pub fn context_ids(&self) -> Vec<u64> {
        match self {
            RankCriteriaSet::Facet(f) => f.iter().copied().collect(),
            RankCriteriaSet::SingleTerm(c) => c.iter().map(|c| c.term_id).collect(),
            RankCriteriaSet::CombinedTerm(set) => set.iter().map(|c| c.term_id).collect(),
        }
    }

    pub fn canonical_key(&self) -> Option<CanonicalKey> {
        CanonicalKey::for_ids(self.rank_type(), &self.context_ids())
    }

    pub fn contains_term(&self, term_id: TermId) -> bool {
        self.criteria().iter().any(|c| c.term_id == term_id)
    }

    /// Adds a criterion if the variant has room for it and it is not already
    /// present.
    pub(crate) fn insert(&mut self, criterion: Criterion) -> bool {
        match self {
            RankCriteriaSet::Facet(slot) if slot.is_none() => {
                *slot = Some(criterion.facet_id);
                true
            }
            RankCriteriaSet::SingleTerm(slot) if slot.is_none() => {
                *slot = Some(criterion);
                true
            }
            RankCriteriaSet::CombinedTerm(set) => {
                if set.iter().any(|c| c.term_id == criterion.term_id) {
                    return false;
                }
                set.insert(criterion)
            }
            _ => false,
        }
    }

    pub(crate) fn remove_where(&mut self, matches: impl Fn(&Criterion) -> bool) -> bool {
        match self {
            RankCriteriaSet::Facet(slot) => match *slot {
                Some(f) if matches(&Criterion::facet(f)) => {
                    *slot = None;
                    true
                }
                _ => false,
            },
            RankCriteriaSet::SingleTerm(slot) => match *slot {
                Some(c) if matches(&c) => {
                    *slot = None;
                    true
                }
                _ => false,
            },
            RankCriteriaSet::CombinedTerm(set) => {
                let before = set.len();
                set.retain(|c| !matches(c));
                set.len() != before
            }
        }
    }
}

/// Result of staging criteria on a rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CriteriaOutcome {
    Added,
    DuplicateIgnored,
    /// A single-criterion rank already holds a different criterion.
    OtherCriteriaExists,
    ResourceNotRelatedToFacet,
    ResourceNotRelatedToTerm,
    /// A combined batch contained both already-present and unrelated ids.
    DuplicateAndUnrelated,
}

impl CriteriaOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CriteriaOutcome::Added)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    NotFound,
}

/// Parses a comma or whitespace separated id list from an outer surface.
pub fn parse_id_list(raw: &str) -> RankResult<Vec<u64>> {
    let ids = raw
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<u64>()
                .map_err(|_| RankError::Validation(format!("`{part}` is not a numeric id")))
        })
        .collect::<RankResult<Vec<_>>>()?;
    if ids.is_empty() {
        return Err(RankError::Validation("criteria id list is empty".to_string()));
    }
    Ok(ids)
}

impl<C: Catalog> RankEngine<C> {
    /// Stages criteria on `rank` after checking them against the catalog.
    ///
    /// `facet` and `single_term` ranks take exactly one id and never replace
    /// an existing criterion. `combined_term` ranks take a batch; every id is
    /// checked and the valid ones are staged even when others are rejected.
    /// Repeated ids within one batch are collapsed.
    pub fn add_criteria(&self, rank: &mut Rank, ids: &[u64]) -> RankResult<CriteriaOutcome> {
        rank.ensure_not_deleted()?;
        let resource_id = rank
            .resource_id()
            .ok_or(RankError::MissingAttribute("resource_id"))?;
        let rank_type = rank.rank_type().ok_or(RankError::MissingAttribute("type"))?;
        if ids.is_empty() {
            return Err(RankError::Validation("no criteria ids given".to_string()));
        }

        let outcome = match rank_type {
            RankType::Facet => {
                self.add_facet_criterion(rank, resource_id, single_id(rank_type, ids)?)?
            }
            RankType::SingleTerm => {
                self.add_term_criterion(rank, resource_id, single_id(rank_type, ids)?)?
            }
            RankType::CombinedTerm => self.add_combined_criteria(rank, resource_id, ids)?,
        };

        debug!(
            rank_id = ?rank.rank_id(),
            resource_id,
            rank_type = %rank_type,
            ?ids,
            ?outcome,
            "staged rank criteria"
        );
        Ok(outcome)
    }

    fn add_facet_criterion(
        &self,
        rank: &mut Rank,
        resource_id: u64,
        facet_id: FacetId,
    ) -> RankResult<CriteriaOutcome> {
        if !self.catalog.exists(CatalogEntity::Facet, facet_id)? {
            return Err(RankError::UnknownId {
                kind: CatalogEntity::Facet,
                id: facet_id,
            });
        }
        if self.config.require_facet_relation
            && !self.catalog.related_facets(resource_id)?.contains(&facet_id)
        {
            return Ok(CriteriaOutcome::ResourceNotRelatedToFacet);
        }
        Ok(stage_single(rank, Criterion::facet(facet_id)))
    }

    fn add_term_criterion(
        &self,
        rank: &mut Rank,
        resource_id: u64,
        term_id: TermId,
    ) -> RankResult<CriteriaOutcome> {
        if !self.catalog.exists(CatalogEntity::Term, term_id)? {
            return Err(RankError::UnknownId {
                kind: CatalogEntity::Term,
                id: term_id,
            });
        }
        if !self.catalog.related_terms(resource_id)?.contains(&term_id) {
            return Ok(CriteriaOutcome::ResourceNotRelatedToTerm);
        }
        let facet_id = self
            .catalog
            .facet_of(term_id)?
            .ok_or_else(|| RankError::Catalog(format!("term {term_id} has no facet")))?;
        Ok(stage_single(rank, Criterion::term(facet_id, term_id)))
    }

    fn add_combined_criteria(
        &self,
        rank: &mut Rank,
        resource_id: u64,
        ids: &[u64],
    ) -> RankResult<CriteriaOutcome> {
        let related = self.catalog.related_terms(resource_id)?;
        let requested: IndexSet<TermId> = ids.iter().copied().collect();

        let mut duplicates = Vec::new();
        let mut unrelated = Vec::new();
        let mut staged = Vec::new();
        for term_id in requested {
            let already_staged = rank.criteria().is_some_and(|c| c.contains_term(term_id));
            if already_staged {
                duplicates.push(term_id);
                continue;
            }
            let facet_id = if related.contains(&term_id)
                && self.catalog.exists(CatalogEntity::Term, term_id)?
            {
                self.catalog.facet_of(term_id)?
            } else {
                None
            };
            match facet_id {
                Some(facet_id) => staged.push(Criterion::term(facet_id, term_id)),
                None => unrelated.push(term_id),
            }
        }

        if let Some(set) = rank.criteria_mut() {
            for criterion in staged {
                set.insert(criterion);
            }
        }

        if !unrelated.is_empty() {
            debug!(resource_id, ?unrelated, "combined criteria not related to resource");
        }
        Ok(match (duplicates.is_empty(), unrelated.is_empty()) {
            (true, true) => CriteriaOutcome::Added,
            (false, true) => CriteriaOutcome::DuplicateIgnored,
            (true, false) => CriteriaOutcome::ResourceNotRelatedToTerm,
            (false, false) => CriteriaOutcome::DuplicateAndUnrelated,
        })
    }

    /// Unstages the criterion identified by `id`: a facet id for `facet`
    /// ranks, a term id otherwise.
    pub fn remove_criteria(&self, rank: &mut Rank, id: u64) -> RankResult<RemoveOutcome> {
        rank.ensure_not_deleted()?;
        let rank_type = rank.rank_type().ok_or(RankError::MissingAttribute("type"))?;

        let removed = if rank_type.is_term_based() {
            // a term deleted from the catalog can still be unstaged by id
            let facet_id = self.catalog.facet_of(id)?;
            rank.criteria_mut().is_some_and(|set| {
                set.remove_where(|c| c.term_id == id && facet_id.is_none_or(|f| f == c.facet_id))
            })
        } else {
            rank.criteria_mut()
                .is_some_and(|set| set.remove_where(|c| c.is_facet_only() && c.facet_id == id))
        };

        Ok(if removed {
            RemoveOutcome::Removed
        } else {
            RemoveOutcome::NotFound
        })
    }
}

fn single_id(rank_type: RankType, ids: &[u64]) -> RankResult<u64> {
    match ids {
        [id] => Ok(*id),
        _ => Err(RankError::Validation(format!(
            "{rank_type} ranks take exactly one criteria id, got {}",
            ids.len()
        ))),
    }
}

fn stage_single(rank: &mut Rank, criterion: Criterion) -> CriteriaOutcome {
    let Some(set) = rank.criteria_mut() else {
        return CriteriaOutcome::OtherCriteriaExists;
    };
    match set.criteria().first() {
        Some(existing) if existing.same_target(&criterion) => CriteriaOutcome::DuplicateIgnored,
        Some(_) => CriteriaOutcome::OtherCriteriaExists,
        None => {
            set.insert(criterion);
            CriteriaOutcome::Added
        }
    }
}
