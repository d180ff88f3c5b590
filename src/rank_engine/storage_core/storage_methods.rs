use heed3::{RoTxn, RwTxn};
use std::collections::{BTreeSet, HashMap};

use crate::rank_engine::{
    criteria::Criterion,
    storage_core::{RankRecord, RankStorage, read_id},
    types::{FACET_ONLY_TERM, FacetId, RankError, RankId, RankResult, RankType, ResourceId, TermId},
};

pub trait StorageMethods {
    fn get_rank(&self, txn: &RoTxn, rank_id: RankId) -> RankResult<Option<RankRecord>>;

    fn get_criteria(&self, txn: &RoTxn, rank_id: RankId) -> RankResult<Vec<Criterion>>;

    /// Writes the rank row and its resource index entry.
    fn put_rank(&self, txn: &mut RwTxn, record: &RankRecord) -> RankResult<()>;

    /// Removes the rank row and its resource index entry.
    fn drop_rank(&self, txn: &mut RwTxn, record: &RankRecord) -> RankResult<bool>;

    /// Inserts criterion rows and their index entries.
    fn put_criteria(&self, txn: &mut RwTxn, rank_id: RankId, criteria: &[Criterion])
    -> RankResult<()>;

    /// Removes every criterion row of a rank; returns how many were removed.
    fn drop_criteria(&self, txn: &mut RwTxn, rank_id: RankId) -> RankResult<usize>;

    fn ranks_for_resource(
        &self,
        txn: &RoTxn,
        resource_id: ResourceId,
    ) -> RankResult<Vec<(RankId, RankType)>>;

    fn ranks_with_term(&self, txn: &RoTxn, term_id: TermId) -> RankResult<BTreeSet<RankId>>;

    /// Ranks with any criterion under the facet, facet-only or term.
    fn ranks_with_facet(&self, txn: &RoTxn, facet_id: FacetId) -> RankResult<BTreeSet<RankId>>;

    /// Ranks of `rank_type` whose context is exactly `context_ids`: every id
    /// is one of the rank's criteria and the rank has no others. Ordered by
    /// value ascending, then id.
    fn exact_context_matches(
        &self,
        txn: &RoTxn,
        rank_type: RankType,
        context_ids: &[u64],
    ) -> RankResult<Vec<RankRecord>>;
}

impl StorageMethods for RankStorage {
    fn get_rank(&self, txn: &RoTxn, rank_id: RankId) -> RankResult<Option<RankRecord>> {
        match self.ranks_db.get(txn, &Self::rank_key(rank_id))? {
            Some(bytes) => Ok(Some(RankRecord::from_bincode_bytes(bytes)?)),
            None => Ok(None),
        }
    }

    fn get_criteria(&self, txn: &RoTxn, rank_id: RankId) -> RankResult<Vec<Criterion>> {
        let prefix = Self::rank_key(rank_id);
        self.criteria_db
            .prefix_iter(txn, &prefix)?
            .map(|result| {
                let (key, _) = result?;
                Ok(Criterion::term(read_id(key, 1)?, read_id(key, 2)?))
            })
            .collect()
    }

    fn put_rank(&self, txn: &mut RwTxn, record: &RankRecord) -> RankResult<()> {
        let bytes = record.to_bincode_bytes()?;
        self.ranks_db
            .put(txn, &Self::rank_key(record.rank_id), &bytes)?;
        self.resource_index_db.put(
            txn,
            &Self::resource_index_key(record.resource_id, record.rank_id),
            &[record.rank_type.tag()],
        )?;
        Ok(())
    }

    fn drop_rank(&self, txn: &mut RwTxn, record: &RankRecord) -> RankResult<bool> {
        self.resource_index_db.delete(
            txn,
            &Self::resource_index_key(record.resource_id, record.rank_id),
        )?;
        Ok(self.ranks_db.delete(txn, &Self::rank_key(record.rank_id))?)
    }

    fn put_criteria(
        &self,
        txn: &mut RwTxn,
        rank_id: RankId,
        criteria: &[Criterion],
    ) -> RankResult<()> {
        for criterion in criteria {
            self.criteria_db
                .put(txn, &Self::criteria_row_key(rank_id, criterion), &())?;
            self.criterion_index_db
                .put(txn, &Self::criterion_index_key(criterion, rank_id), &())?;
            if !criterion.is_facet_only() {
                self.term_index_db
                    .put(txn, &Self::term_index_key(criterion.term_id, rank_id), &())?;
            }
        }
        Ok(())
    }

    fn drop_criteria(&self, txn: &mut RwTxn, rank_id: RankId) -> RankResult<usize> {
        let existing = self.get_criteria(txn, rank_id)?;
        for criterion in &existing {
            self.criteria_db
                .delete(txn, &Self::criteria_row_key(rank_id, criterion))?;
            self.criterion_index_db
                .delete(txn, &Self::criterion_index_key(criterion, rank_id))?;
            if !criterion.is_facet_only() {
                self.term_index_db
                    .delete(txn, &Self::term_index_key(criterion.term_id, rank_id))?;
            }
        }
        Ok(existing.len())
    }

    fn ranks_for_resource(
        &self,
        txn: &RoTxn,
        resource_id: ResourceId,
    ) -> RankResult<Vec<(RankId, RankType)>> {
        let prefix = resource_id.to_be_bytes();
        self.resource_index_db
            .prefix_iter(txn, &prefix)?
            .map(|result| {
                let (key, value) = result?;
                let rank_id = read_id(key, 1)?;
                let rank_type = value
                    .first()
                    .copied()
                    .and_then(RankType::from_tag)
                    .ok_or_else(|| {
                        RankError::DecodeError(format!("bad type tag for rank {rank_id}"))
                    })?;
                Ok((rank_id, rank_type))
            })
            .collect()
    }

    fn ranks_with_term(&self, txn: &RoTxn, term_id: TermId) -> RankResult<BTreeSet<RankId>> {
        let prefix = term_id.to_be_bytes();
        self.term_index_db
            .prefix_iter(txn, &prefix)?
            .map(|result| {
                let (key, _) = result?;
                read_id(key, 1)
            })
            .collect()
    }

    fn ranks_with_facet(&self, txn: &RoTxn, facet_id: FacetId) -> RankResult<BTreeSet<RankId>> {
        let prefix = facet_id.to_be_bytes();
        self.criterion_index_db
            .prefix_iter(txn, &prefix)?
            .map(|result| {
                let (key, _) = result?;
                read_id(key, 2)
            })
            .collect()
    }

    fn exact_context_matches(
        &self,
        txn: &RoTxn,
        rank_type: RankType,
        context_ids: &[u64],
    ) -> RankResult<Vec<RankRecord>> {
        let wanted: BTreeSet<u64> = context_ids.iter().copied().collect();
        if wanted.is_empty() {
            return Ok(Vec::new());
        }

        let mut membership: HashMap<RankId, usize> = HashMap::new();
        for &id in &wanted {
            let members = match rank_type {
                RankType::Facet => self.facet_only_members(txn, id)?,
                RankType::SingleTerm | RankType::CombinedTerm => self.ranks_with_term(txn, id)?,
            };
            for rank_id in members {
                *membership.entry(rank_id).or_insert(0) += 1;
            }
        }

        let mut matches = Vec::new();
        for (rank_id, count) in membership {
            if count != wanted.len() {
                continue;
            }
            let Some(record) = self.get_rank(txn, rank_id)? else {
                continue;
            };
            if record.rank_type != rank_type {
                continue;
            }
            if self.criteria_count(txn, rank_id)? != wanted.len() {
                continue;
            }
            matches.push(record);
        }
        matches.sort_by_key(|r| (r.value, r.rank_id));
        Ok(matches)
    }
}

impl RankStorage {
    fn facet_only_members(&self, txn: &RoTxn, facet_id: FacetId) -> RankResult<BTreeSet<RankId>> {
        let prefix = Self::criterion_index_prefix(facet_id, FACET_ONLY_TERM);
        self.criterion_index_db
            .prefix_iter(txn, &prefix)?
            .map(|result| {
                let (key, _) = result?;
                read_id(key, 2)
            })
            .collect()
    }

    fn criteria_count(&self, txn: &RoTxn, rank_id: RankId) -> RankResult<usize> {
        let prefix = Self::rank_key(rank_id);
        Ok(self.criteria_db.prefix_iter(txn, &prefix)?.count())
    }
}
