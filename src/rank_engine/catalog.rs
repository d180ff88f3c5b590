//! The resource/term/facet catalog the engine validates against.
//!
//! The engine does not own these entities; it only asks whether an id
//! exists, which terms a resource carries, and which facet a term sits under.

use std::collections::{HashMap, HashSet};

use crate::rank_engine::types::{CatalogEntity, FacetId, RankResult, ResourceId, TermId};

pub trait Catalog {
    fn exists(&self, kind: CatalogEntity, id: u64) -> RankResult<bool>;

    fn related_terms(&self, resource_id: ResourceId) -> RankResult<HashSet<TermId>>;

    fn facet_of(&self, term_id: TermId) -> RankResult<Option<FacetId>>;

    /// Facets reachable from a resource through its terms.
    fn related_facets(&self, resource_id: ResourceId) -> RankResult<HashSet<FacetId>> {
        let mut facets = HashSet::new();
        for term_id in self.related_terms(resource_id)? {
            if let Some(facet_id) = self.facet_of(term_id)? {
                facets.insert(facet_id);
            }
        }
        Ok(facets)
    }
}

impl<C: Catalog + ?Sized> Catalog for &C {
    fn exists(&self, kind: CatalogEntity, id: u64) -> RankResult<bool> {
        (**self).exists(kind, id)
    }

    fn related_terms(&self, resource_id: ResourceId) -> RankResult<HashSet<TermId>> {
        (**self).related_terms(resource_id)
    }

    fn facet_of(&self, term_id: TermId) -> RankResult<Option<FacetId>> {
        (**self).facet_of(term_id)
    }
}

/// A catalog held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    resources: HashMap<ResourceId, HashSet<TermId>>,
    terms: HashMap<TermId, FacetId>,
    facets: HashSet<FacetId>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_facet(mut self, facet_id: FacetId) -> Self {
        self.add_facet(facet_id);
        self
    }

    pub fn with_term(mut self, term_id: TermId, facet_id: FacetId) -> Self {
        self.add_term(term_id, facet_id);
        self
    }

    pub fn with_resource(mut self, resource_id: ResourceId, terms: &[TermId]) -> Self {
        self.add_resource(resource_id, terms);
        self
    }

    pub fn add_facet(&mut self, facet_id: FacetId) {
        self.facets.insert(facet_id);
    }

    pub fn add_term(&mut self, term_id: TermId, facet_id: FacetId) {
        self.facets.insert(facet_id);
        self.terms.insert(term_id, facet_id);
    }

    pub fn add_resource(&mut self, resource_id: ResourceId, terms: &[TermId]) {
        self.resources
            .entry(resource_id)
            .or_default()
            .extend(terms.iter().copied());
    }

    pub fn remove_resource(&mut self, resource_id: ResourceId) -> bool {
        self.resources.remove(&resource_id).is_some()
    }

    pub fn unlink_term(&mut self, resource_id: ResourceId, term_id: TermId) -> bool {
        self.resources
            .get_mut(&resource_id)
            .is_some_and(|terms| terms.remove(&term_id))
    }

    pub fn move_term(&mut self, term_id: TermId, facet_id: FacetId) {
        self.add_term(term_id, facet_id);
    }

    pub fn remove_term(&mut self, term_id: TermId) -> bool {
        for terms in self.resources.values_mut() {
            terms.remove(&term_id);
        }
        self.terms.remove(&term_id).is_some()
    }

    /// Drops the facet together with every term filed under it.
    pub fn remove_facet(&mut self, facet_id: FacetId) -> bool {
        let orphaned: Vec<TermId> = self
            .terms
            .iter()
            .filter(|(_, f)| **f == facet_id)
            .map(|(t, _)| *t)
            .collect();
        for term_id in orphaned {
            self.remove_term(term_id);
        }
        self.facets.remove(&facet_id)
    }
}

impl Catalog for InMemoryCatalog {
    fn exists(&self, kind: CatalogEntity, id: u64) -> RankResult<bool> {
        Ok(match kind {
            CatalogEntity::Resource => self.resources.contains_key(&id),
            CatalogEntity::Term => self.terms.contains_key(&id),
            CatalogEntity::Facet => self.facets.contains(&id),
        })
    }

    fn related_terms(&self, resource_id: ResourceId) -> RankResult<HashSet<TermId>> {
        Ok(self.resources.get(&resource_id).cloned().unwrap_or_default())
    }

    fn facet_of(&self, term_id: TermId) -> RankResult<Option<FacetId>> {
        Ok(self.terms.get(&term_id).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> InMemoryCatalog {
        InMemoryCatalog::new()
            .with_term(5, 2)
            .with_term(9, 3)
            .with_facet(4)
            .with_resource(101, &[5, 9])
            .with_resource(202, &[5])
    }

    #[test]
    fn test_exists_by_kind() {
        let catalog = sample();
        assert!(catalog.exists(CatalogEntity::Resource, 101).unwrap());
        assert!(catalog.exists(CatalogEntity::Term, 9).unwrap());
        assert!(catalog.exists(CatalogEntity::Facet, 4).unwrap());
        assert!(!catalog.exists(CatalogEntity::Term, 101).unwrap());
        assert!(!catalog.exists(CatalogEntity::Resource, 5).unwrap());
    }

    #[test]
    fn test_related_facets() {
        let catalog = sample();
        let facets = catalog.related_facets(101).unwrap();
        assert_eq!(facets, HashSet::from([2, 3]));
        assert!(catalog.related_facets(999).unwrap().is_empty());
    }

    #[test]
    fn test_remove_facet_drops_its_terms() {
        let mut catalog = sample();
        assert!(catalog.remove_facet(2));
        assert_eq!(catalog.facet_of(5).unwrap(), None);
        assert_eq!(catalog.related_terms(202).unwrap(), HashSet::new());
        assert_eq!(catalog.related_terms(101).unwrap(), HashSet::from([9]));
    }

    #[test]
    fn test_move_and_unlink_term() {
        let mut catalog = sample();
        catalog.move_term(5, 4);
        assert_eq!(catalog.facet_of(5).unwrap(), Some(4));
        assert!(catalog.unlink_term(101, 5));
        assert!(!catalog.unlink_term(101, 5));
        assert!(!catalog.related_terms(101).unwrap().contains(&5));
    }
}
