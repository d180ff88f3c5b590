//! Cascading rank deletion for catalog changes.

use std::collections::BTreeSet;
use tracing::{debug, error, warn};

use crate::rank_engine::{
    catalog::Catalog,
    engine::RankEngine,
    storage_core::storage_methods::StorageMethods,
    types::{FacetId, RankId, RankResult, ResourceId, TermId},
};

/// A change in the external catalog that invalidates ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogChange {
    ResourceDeleted(ResourceId),
    ResourceTermUnlinked {
        resource_id: ResourceId,
        term_id: TermId,
    },
    TermFacetChanged(TermId),
    TermDeleted(TermId),
    FacetDeleted(FacetId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub change: CatalogChange,
    pub affected: Vec<RankId>,
    pub deleted: Vec<RankId>,
    pub failed: Vec<(RankId, String)>,
}

impl CleanupReport {
    /// True if at least one affected rank could not be deleted.
    pub fn is_partial_failure(&self) -> bool {
        !self.failed.is_empty()
    }
}

impl<C: Catalog> RankEngine<C> {
    /// Ranks a catalog change invalidates.
    pub fn affected_ranks(&self, change: CatalogChange) -> RankResult<BTreeSet<RankId>> {
        let rtxn = self.storage.env.read_txn()?;
        let storage = &self.storage;
        Ok(match change {
            CatalogChange::ResourceDeleted(resource_id) => storage
                .ranks_for_resource(&rtxn, resource_id)?
                .into_iter()
                .map(|(rank_id, _)| rank_id)
                .collect(),
            CatalogChange::ResourceTermUnlinked {
                resource_id,
                term_id,
            } => {
                let mut affected = BTreeSet::new();
                for rank_id in storage.ranks_with_term(&rtxn, term_id)? {
                    let held_by_resource = storage
                        .get_rank(&rtxn, rank_id)?
                        .is_some_and(|r| r.resource_id == resource_id);
                    if held_by_resource {
                        affected.insert(rank_id);
                    }
                }
                affected
            }
            CatalogChange::TermFacetChanged(term_id) | CatalogChange::TermDeleted(term_id) => {
                storage.ranks_with_term(&rtxn, term_id)?
            }
            CatalogChange::FacetDeleted(facet_id) => storage.ranks_with_facet(&rtxn, facet_id)?,
        })
    }

    /// Deletes every rank invalidated by `change`.
    ///
    /// Best effort: a failed deletion is recorded in the report and the
    /// remaining ranks are still processed.
    pub fn cleanup(&self, change: CatalogChange) -> RankResult<CleanupReport> {
        let affected: Vec<RankId> = self.affected_ranks(change)?.into_iter().collect();
        let mut report = CleanupReport {
            change,
            affected: affected.clone(),
            deleted: Vec::new(),
            failed: Vec::new(),
        };

        for rank_id in affected {
            match self.delete_by_id(rank_id) {
                Ok(true) => report.deleted.push(rank_id),
                Ok(false) => debug!(rank_id, "rank already gone during cleanup"),
                Err(e) => {
                    if e.is_storage_failure() {
                        error!(rank_id, ?change, error = %e, "storage failure deleting rank during cleanup");
                    } else {
                        warn!(rank_id, ?change, error = %e, "failed to delete rank during cleanup");
                    }
                    report.failed.push((rank_id, e.to_string()));
                }
            }
        }

        debug!(
            ?change,
            affected = report.affected.len(),
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            "catalog cleanup finished"
        );
        Ok(report)
    }
}
