//! Collision checks run before a rank is written.
//!
//! Within one classification context a resource may hold at most one rank,
//! and a value may be held by at most one resource. The check runs inside
//! the commit's write transaction; LMDB admits a single writer, so no other
//! commit can interleave between the check and the insert.

use heed3::RoTxn;

use crate::rank_engine::{
    storage_core::storage_methods::StorageMethods,
    types::{RankId, RankResult, RankType, RankValue, ResourceId},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateKind {
    /// The resource is already ranked under this context.
    ResourceAlreadyRanked { existing: RankId },
    /// Another resource already holds this value under this context.
    ValueTaken { existing: RankId },
}

impl DuplicateKind {
    pub fn existing_rank(&self) -> RankId {
        match self {
            DuplicateKind::ResourceAlreadyRanked { existing }
            | DuplicateKind::ValueTaken { existing } => *existing,
        }
    }
}

/// What a commit is about to write.
#[derive(Debug, Clone)]
pub struct DuplicateCandidate<'a> {
    /// Excluded from matches when updating a persisted rank.
    pub rank_id: Option<RankId>,
    pub rank_type: RankType,
    pub resource_id: ResourceId,
    pub value: RankValue,
    pub context_ids: &'a [u64],
}

/// Returns the first collision `candidate` would cause, checking resource
/// collisions before value collisions.
pub fn find_duplicate<S: StorageMethods>(
    storage: &S,
    txn: &RoTxn,
    candidate: &DuplicateCandidate<'_>,
) -> RankResult<Option<DuplicateKind>> {
    let peers: Vec<_> = storage
        .exact_context_matches(txn, candidate.rank_type, candidate.context_ids)?
        .into_iter()
        .filter(|peer| Some(peer.rank_id) != candidate.rank_id)
        .collect();

    if let Some(peer) = peers
        .iter()
        .find(|peer| peer.resource_id == candidate.resource_id)
    {
        return Ok(Some(DuplicateKind::ResourceAlreadyRanked {
            existing: peer.rank_id,
        }));
    }

    Ok(peers
        .iter()
        .find(|peer| peer.value == candidate.value)
        .map(|peer| DuplicateKind::ValueTaken {
            existing: peer.rank_id,
        }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rank_engine::{
        config::EngineConfig,
        criteria::Criterion,
        storage_core::{RankRecord, RankStorage},
    };
    use tempfile::TempDir;

    fn seeded_storage() -> (TempDir, RankStorage) {
        let dir = TempDir::new().unwrap();
        let storage =
            RankStorage::new(&EngineConfig::new(dir.path()).with_db_max_size_mb(16)).unwrap();
        let mut wtxn = storage.env.write_txn().unwrap();
        let record = RankRecord {
            rank_id: 1,
            value: 3,
            rank_type: RankType::SingleTerm,
            resource_id: 101,
        };
        storage.put_rank(&mut wtxn, &record).unwrap();
        storage
            .put_criteria(&mut wtxn, 1, &[Criterion::term(2, 5)])
            .unwrap();
        wtxn.commit().unwrap();
        (dir, storage)
    }

    fn candidate(rank_id: Option<RankId>, resource_id: ResourceId, value: RankValue) -> DuplicateCandidate<'static> {
        DuplicateCandidate {
            rank_id,
            rank_type: RankType::SingleTerm,
            resource_id,
            value,
            context_ids: &[5],
        }
    }

    #[test]
    fn test_resource_collision() {
        let (_dir, storage) = seeded_storage();
        let rtxn = storage.env.read_txn().unwrap();
        let dup = find_duplicate(&storage, &rtxn, &candidate(None, 101, 7)).unwrap();
        assert_eq!(dup, Some(DuplicateKind::ResourceAlreadyRanked { existing: 1 }));
    }

    #[test]
    fn test_value_collision() {
        let (_dir, storage) = seeded_storage();
        let rtxn = storage.env.read_txn().unwrap();
        let dup = find_duplicate(&storage, &rtxn, &candidate(None, 202, 3)).unwrap();
        assert_eq!(dup, Some(DuplicateKind::ValueTaken { existing: 1 }));
        assert_eq!(dup.unwrap().existing_rank(), 1);
    }

    #[test]
    fn test_self_is_excluded() {
        let (_dir, storage) = seeded_storage();
        let rtxn = storage.env.read_txn().unwrap();
        let dup = find_duplicate(&storage, &rtxn, &candidate(Some(1), 101, 3)).unwrap();
        assert_eq!(dup, None);
    }

    #[test]
    fn test_other_context_is_not_a_collision() {
        let (_dir, storage) = seeded_storage();
        let rtxn = storage.env.read_txn().unwrap();
        let other = DuplicateCandidate {
            context_ids: &[9],
            ..candidate(None, 101, 3)
        };
        assert_eq!(find_duplicate(&storage, &rtxn, &other).unwrap(), None);

        let other_type = DuplicateCandidate {
            rank_type: RankType::CombinedTerm,
            ..candidate(None, 101, 3)
        };
        assert_eq!(find_duplicate(&storage, &rtxn, &other_type).unwrap(), None);
    }
}
