//! Commit, update and delete of ranks in the normalized store.
//!
//! Every write here opens one LMDB write transaction and either commits it
//! whole or drops it, which aborts it. A rank row never exists without its
//! criterion rows and index entries, and vice versa.

use std::collections::HashSet;
use tracing::{debug, trace};

use crate::rank_engine::{
    catalog::Catalog,
    duplicates::{DuplicateCandidate, DuplicateKind, find_duplicate},
    engine::RankEngine,
    rank::{Rank, RankState},
    storage_core::{RankRecord, storage_methods::StorageMethods},
    types::{CatalogEntity, RankError, RankId, RankResult, RankType, RankValue},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Created(RankId),
    Updated(RankId),
    /// Nothing was written; the rank collides with an existing one.
    Duplicate(DuplicateKind),
}

impl CommitOutcome {
    pub fn rank_id(&self) -> Option<RankId> {
        match self {
            CommitOutcome::Created(id) | CommitOutcome::Updated(id) => Some(*id),
            CommitOutcome::Duplicate(_) => None,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, CommitOutcome::Duplicate(_))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitOptions {
    /// Overrides the configured duplicate check for this commit. Skipping it
    /// is meant for administrative renumbering.
    pub check_duplicates: Option<bool>,
}

impl CommitOptions {
    pub fn skip_duplicate_check() -> Self {
        Self {
            check_duplicates: Some(false),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The rank was never committed, or was already deleted.
    NotPersisted,
}

impl<C: Catalog> RankEngine<C> {
    pub fn commit(&self, rank: &mut Rank) -> RankResult<CommitOutcome> {
        self.commit_with(rank, CommitOptions::default())
    }

    /// Writes `rank` and its criteria, replacing any previously committed
    /// criteria. A transient rank receives its id here.
    pub fn commit_with(&self, rank: &mut Rank, options: CommitOptions) -> RankResult<CommitOutcome> {
        rank.ensure_not_deleted()?;
        let (rank_type, resource_id, value, criteria) = rank.required_attributes()?;
        let criteria_rows = criteria.criteria();
        let context_ids = criteria.context_ids();

        if !self.catalog.exists(CatalogEntity::Resource, resource_id)? {
            return Err(RankError::UnknownId {
                kind: CatalogEntity::Resource,
                id: resource_id,
            });
        }

        let mut wtxn = self.storage.env.write_txn()?;

        let check_duplicates = options
            .check_duplicates
            .unwrap_or(self.config.check_duplicates);
        if check_duplicates {
            let candidate = DuplicateCandidate {
                rank_id: rank.rank_id(),
                rank_type,
                resource_id,
                value,
                context_ids: &context_ids,
            };
            if let Some(duplicate) = find_duplicate(&self.storage, &wtxn, &candidate)? {
                wtxn.abort();
                debug!(
                    rank_id = ?rank.rank_id(),
                    resource_id,
                    value,
                    ?duplicate,
                    "rank commit rejected as duplicate"
                );
                return Ok(CommitOutcome::Duplicate(duplicate));
            }
        }

        let (rank_id, created) = match rank.rank_id() {
            Some(rank_id) => {
                let previous = self
                    .storage
                    .get_rank(&wtxn, rank_id)?
                    .ok_or(RankError::RankNotFound(rank_id))?;
                if previous.rank_type != rank_type {
                    return Err(RankError::InvalidState(format!(
                        "rank {rank_id} is stored as {}, not {rank_type}",
                        previous.rank_type
                    )));
                }
                // the resource index is keyed by resource, so a moved rank
                // must drop its old entry before the new row is written
                self.storage.drop_rank(&mut wtxn, &previous)?;
                let dropped = self.storage.drop_criteria(&mut wtxn, rank_id)?;
                trace!(rank_id, dropped, "replacing rank criteria");
                (rank_id, false)
            }
            None => (self.storage.next_rank_id(&mut wtxn)?, true),
        };

        let record = RankRecord {
            rank_id,
            value,
            rank_type,
            resource_id,
        };
        self.storage.put_rank(&mut wtxn, &record)?;
        self.storage.put_criteria(&mut wtxn, rank_id, &criteria_rows)?;
        wtxn.commit()?;

        rank.mark_persisted(rank_id);
        debug!(
            rank_id,
            resource_id,
            value,
            rank_type = %rank_type,
            created,
            "committed rank"
        );

        Ok(if created {
            CommitOutcome::Created(rank_id)
        } else {
            CommitOutcome::Updated(rank_id)
        })
    }

    /// Overwrites only the value of a persisted rank.
    ///
    /// Skips the duplicate check and leaves criteria untouched, so two ranks
    /// can end up sharing a value in one context. Meant for bulk
    /// renumbering.
    pub fn update_value_unchecked(&self, rank: &mut Rank, value: RankValue) -> RankResult<()> {
        let rank_id = match (rank.state(), rank.rank_id()) {
            (RankState::Persisted, Some(rank_id)) => rank_id,
            _ => {
                return Err(RankError::InvalidState(
                    "quick value update needs a persisted rank".to_string(),
                ));
            }
        };

        let mut wtxn = self.storage.env.write_txn()?;
        self.write_value(&mut wtxn, rank_id, value)?;
        wtxn.commit()?;

        rank.store_value(value);
        debug!(rank_id, value, "updated rank value without duplicate check");
        Ok(())
    }

    /// Removes a persisted rank, its criteria and its cache entry.
    pub fn delete(&self, rank: &mut Rank) -> RankResult<DeleteOutcome> {
        let rank_id = match (rank.state(), rank.rank_id()) {
            (RankState::Persisted, Some(rank_id)) => rank_id,
            _ => return Ok(DeleteOutcome::NotPersisted),
        };
        let deleted = self.delete_by_id(rank_id)?;
        rank.mark_deleted();
        Ok(if deleted {
            DeleteOutcome::Deleted
        } else {
            DeleteOutcome::NotPersisted
        })
    }

    /// Deletes criterion rows, then the cache entry, then the rank row, in
    /// one transaction. Returns false if no such rank exists.
    pub fn delete_by_id(&self, rank_id: RankId) -> RankResult<bool> {
        let mut wtxn = self.storage.env.write_txn()?;
        let Some(record) = self.storage.get_rank(&wtxn, rank_id)? else {
            wtxn.abort();
            return Ok(false);
        };

        let dropped = self.storage.drop_criteria(&mut wtxn, rank_id)?;
        let cached = self.cache.delete(&mut wtxn, rank_id)?;
        self.storage.drop_rank(&mut wtxn, &record)?;
        wtxn.commit()?;

        debug!(
            rank_id,
            resource_id = record.resource_id,
            criteria_dropped = dropped,
            cached,
            "deleted rank"
        );
        Ok(true)
    }

    /// Loads a committed rank with its criteria.
    pub fn load_rank(&self, rank_id: RankId) -> RankResult<Option<Rank>> {
        let rtxn = self.storage.env.read_txn()?;
        let Some(record) = self.storage.get_rank(&rtxn, rank_id)? else {
            return Ok(None);
        };
        let criteria = self.storage.get_criteria(&rtxn, rank_id)?;
        Ok(Some(Rank::from_record(&record, criteria)))
    }

    /// Assigns values `1..=n` to the ranks of one context in the order
    /// given, in a single transaction and without duplicate checks.
    ///
    /// Every id in `ordered` must currently hold exactly this context.
    /// Ranks of the context left out of `ordered` keep their values.
    pub fn renumber(
        &self,
        rank_type: RankType,
        context_ids: &[u64],
        ordered: &[RankId],
    ) -> RankResult<usize> {
        let mut wtxn = self.storage.env.write_txn()?;
        let members: HashSet<RankId> = self
            .storage
            .exact_context_matches(&wtxn, rank_type, context_ids)?
            .iter()
            .map(|r| r.rank_id)
            .collect();

        let mut seen = HashSet::new();
        for &rank_id in ordered {
            if !members.contains(&rank_id) {
                return Err(RankError::Validation(format!(
                    "rank {rank_id} is not ranked under this context"
                )));
            }
            if !seen.insert(rank_id) {
                return Err(RankError::Validation(format!(
                    "rank {rank_id} listed twice"
                )));
            }
        }

        for (position, &rank_id) in ordered.iter().enumerate() {
            let value = RankValue::try_from(position + 1)
                .map_err(|_| RankError::Validation("too many ranks to renumber".to_string()))?;
            self.write_value(&mut wtxn, rank_id, value)?;
        }
        wtxn.commit()?;

        debug!(rank_type = %rank_type, ?context_ids, renumbered = ordered.len(), "renumbered context");
        Ok(ordered.len())
    }

    fn write_value(
        &self,
        wtxn: &mut heed3::RwTxn,
        rank_id: RankId,
        value: RankValue,
    ) -> RankResult<()> {
        let mut record = self
            .storage
            .get_rank(wtxn, rank_id)?
            .ok_or(RankError::RankNotFound(rank_id))?;
        record.value = value;
        self.storage.put_rank(wtxn, &record)
    }
}
