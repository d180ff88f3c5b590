use std::collections::BTreeMap;
use tracing::trace;

use crate::rank_engine::{
    canonical_key::CanonicalKey,
    catalog::Catalog,
    engine::RankEngine,
    rank_cache::RankedEntry,
    storage_core::storage_methods::StorageMethods,
    types::{RankId, RankResult, RankType, ResourceId},
};

impl<C: Catalog> RankEngine<C> {
    /// Ranks under a context, best first, read from the `rank_data` cache.
    ///
    /// `None` means the cache holds nothing for the context: either no such
    /// ranks exist or the cache predates them. Use
    /// [`RankEngine::ranked_list_current`] when freshness matters.
    pub fn ranked_list(
        &self,
        rank_type: RankType,
        context_ids: &[u64],
    ) -> RankResult<Option<Vec<RankedEntry>>> {
        let Some(key) = CanonicalKey::for_ids(rank_type, context_ids) else {
            self.cache.metrics.record_miss();
            return Ok(None);
        };

        let rtxn = self.storage.env.read_txn()?;
        let entries = self.cache.lookup(&rtxn, rank_type, &key)?;
        if entries.is_empty() {
            self.cache.metrics.record_miss();
            trace!(rank_type = %rank_type, canonical_key = %key, "rank_data miss");
            return Ok(None);
        }

        self.cache.metrics.record_hit();
        Ok(Some(entries.iter().map(RankedEntry::from).collect()))
    }

    /// Ranks under a context, best first, computed from the normalized
    /// store. A rank matches only if its criteria are exactly the requested
    /// set.
    pub fn ranked_list_current(
        &self,
        rank_type: RankType,
        context_ids: &[u64],
    ) -> RankResult<Option<Vec<RankedEntry>>> {
        if CanonicalKey::for_ids(rank_type, context_ids).is_none() {
            return Ok(None);
        }

        let rtxn = self.storage.env.read_txn()?;
        let records = self
            .storage
            .exact_context_matches(&rtxn, rank_type, context_ids)?;
        if records.is_empty() {
            return Ok(None);
        }
        Ok(Some(records.iter().map(RankedEntry::from).collect()))
    }

    /// Every rank id held by a resource, grouped by type.
    pub fn rank_by_resource(
        &self,
        resource_id: ResourceId,
    ) -> RankResult<BTreeMap<RankType, Vec<RankId>>> {
        let rtxn = self.storage.env.read_txn()?;
        let mut grouped: BTreeMap<RankType, Vec<RankId>> = BTreeMap::new();
        for (rank_id, rank_type) in self.storage.ranks_for_resource(&rtxn, resource_id)? {
            grouped.entry(rank_type).or_default().push(rank_id);
        }
        Ok(grouped)
    }
}
