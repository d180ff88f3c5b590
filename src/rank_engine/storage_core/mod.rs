pub mod storage_methods;

use heed3::{Database, Env, EnvOpenOptions, RoTxn, RwTxn, types::*};
use serde::{Deserialize, Serialize};
use std::fs;

use crate::rank_engine::{
    config::EngineConfig,
    criteria::Criterion,
    types::{FacetId, RankError, RankId, RankResult, RankType, RankValue, ResourceId, TermId},
};

const DB_RANKS: &str = "ranks";
const DB_RANK_CRITERIA: &str = "rank_criteria";
const DB_CRITERION_INDEX: &str = "criterion_index";
const DB_TERM_INDEX: &str = "term_index";
const DB_RESOURCE_INDEX: &str = "resource_index";
const DB_METADATA: &str = "metadata";

/// Normalized databases plus the three `rank_data` cache databases.
const MAX_DBS: u32 = 12;

const NEXT_RANK_ID_KEY: &[u8] = b"next_rank_id";

/// The stored rank row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankRecord {
    pub rank_id: RankId,
    pub value: RankValue,
    pub rank_type: RankType,
    pub resource_id: ResourceId,
}

impl RankRecord {
    pub fn to_bincode_bytes(&self) -> RankResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bincode_bytes(bytes: &[u8]) -> RankResult<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Normalized source of truth for ranks and their criteria.
///
/// `ranks` holds one row per rank, `rank_criteria` one row per criterion
/// keyed `rank | facet | term`. The three index databases are maintained in
/// the same write transaction as the rows they mirror:
/// `criterion_index` (`facet | term | rank`), `term_index` (`term | rank`)
/// and `resource_index` (`resource | rank`, valued with the type tag).
pub struct RankStorage {
    pub env: Env,
    pub ranks_db: Database<Bytes, Bytes>,
    pub criteria_db: Database<Bytes, Unit>,
    pub criterion_index_db: Database<Bytes, Unit>,
    pub term_index_db: Database<Bytes, Unit>,
    pub resource_index_db: Database<Bytes, Bytes>,
    pub metadata_db: Database<Bytes, Bytes>,
}

impl RankStorage {
    pub fn new(config: &EngineConfig) -> RankResult<Self> {
        fs::create_dir_all(&config.db_path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(config.map_size_bytes())
                .max_dbs(MAX_DBS)
                .max_readers(config.max_readers)
                .open(&config.db_path)?
        };

        let mut wtxn = env.write_txn()?;
        let ranks_db = env.create_database(&mut wtxn, Some(DB_RANKS))?;
        let criteria_db = env.create_database(&mut wtxn, Some(DB_RANK_CRITERIA))?;
        let criterion_index_db = env.create_database(&mut wtxn, Some(DB_CRITERION_INDEX))?;
        let term_index_db = env.create_database(&mut wtxn, Some(DB_TERM_INDEX))?;
        let resource_index_db = env.create_database(&mut wtxn, Some(DB_RESOURCE_INDEX))?;
        let metadata_db = env.create_database(&mut wtxn, Some(DB_METADATA))?;
        wtxn.commit()?;

        tracing::debug!(
            path = %config.db_path.display(),
            map_size_mb = config.db_max_size_mb,
            "opened rank storage"
        );

        Ok(Self {
            env,
            ranks_db,
            criteria_db,
            criterion_index_db,
            term_index_db,
            resource_index_db,
            metadata_db,
        })
    }

    #[inline(always)]
    pub fn rank_key(rank_id: RankId) -> [u8; 8] {
        rank_id.to_be_bytes()
    }

    #[inline(always)]
    pub fn criteria_row_key(rank_id: RankId, criterion: &Criterion) -> [u8; 24] {
        pack_ids([rank_id, criterion.facet_id, criterion.term_id])
    }

    #[inline(always)]
    pub fn criterion_index_key(criterion: &Criterion, rank_id: RankId) -> [u8; 24] {
        pack_ids([criterion.facet_id, criterion.term_id, rank_id])
    }

    #[inline(always)]
    pub fn criterion_index_prefix(facet_id: FacetId, term_id: TermId) -> [u8; 16] {
        pack_ids([facet_id, term_id])
    }

    #[inline(always)]
    pub fn term_index_key(term_id: TermId, rank_id: RankId) -> [u8; 16] {
        pack_ids([term_id, rank_id])
    }

    #[inline(always)]
    pub fn resource_index_key(resource_id: ResourceId, rank_id: RankId) -> [u8; 16] {
        pack_ids([resource_id, rank_id])
    }

    /// Allocates the next rank id inside `txn`; aborting the txn releases it.
    pub fn next_rank_id(&self, txn: &mut RwTxn) -> RankResult<RankId> {
        let next = match self.metadata_db.get(txn, NEXT_RANK_ID_KEY)? {
            Some(bytes) => read_id(bytes, 0)?,
            None => 1,
        };
        let following = next
            .checked_add(1)
            .ok_or_else(|| RankError::InvalidState("rank id space exhausted".to_string()))?;
        self.metadata_db
            .put(txn, NEXT_RANK_ID_KEY, &following.to_be_bytes())?;
        Ok(next)
    }

    pub fn rank_count(&self, txn: &RoTxn) -> RankResult<u64> {
        Ok(self.ranks_db.len(txn)?)
    }
}

fn pack_ids<const N: usize, const B: usize>(ids: [u64; N]) -> [u8; B] {
    debug_assert_eq!(N * 8, B);
    let mut key = [0u8; B];
    for (i, id) in ids.iter().enumerate() {
        key[i * 8..(i + 1) * 8].copy_from_slice(&id.to_be_bytes());
    }
    key
}

/// Reads the big-endian id at the `index`th 8-byte slot of a composite key.
pub fn read_id(key: &[u8], index: usize) -> RankResult<u64> {
    let start = index * 8;
    key.get(start..start + 8)
        .and_then(|slot| <[u8; 8]>::try_from(slot).ok())
        .map(u64::from_be_bytes)
        .ok_or_else(|| {
            RankError::DecodeError(format!(
                "key of {} bytes has no id slot {index}",
                key.len()
            ))
        })
}
