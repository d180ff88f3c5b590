use chrono::{DateTime, Utc};
use heed3::{Database, Env, RoTxn, RwTxn, types::*};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::rank_engine::{
    canonical_key::CanonicalKey,
    criteria::RankCriteriaSet,
    storage_core::{RankRecord, RankStorage, storage_methods::StorageMethods},
    types::{RankError, RankId, RankResult, RankType, RankValue, ResourceId},
};

const DB_RANK_DATA: &str = "rank_data";
const DB_RANK_DATA_BY_KEY: &str = "rank_data_by_key";
const DB_RANK_DATA_META: &str = "rank_data_meta";

const GENERATION_KEY: &[u8] = b"generation";

/// One derived row per rank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub rank_id: RankId,
    pub resource_id: ResourceId,
    pub value: RankValue,
    pub rank_type: RankType,
    pub canonical_key: CanonicalKey,
}

/// A rank as returned by ranked lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub rank_id: RankId,
    pub resource_id: ResourceId,
    pub value: RankValue,
}

impl From<&CacheEntry> for RankedEntry {
    fn from(entry: &CacheEntry) -> Self {
        Self {
            rank_id: entry.rank_id,
            resource_id: entry.resource_id,
            value: entry.value,
        }
    }
}

impl From<&RankRecord> for RankedEntry {
    fn from(record: &RankRecord) -> Self {
        Self {
            rank_id: record.rank_id,
            resource_id: record.resource_id,
            value: record.value,
        }
    }
}

/// Describes the cache contents written by the last successful rebuild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheGeneration {
    pub populated_at: DateTime<Utc>,
    pub entries: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopulateReport {
    pub entries_written: u64,
    /// Ranks with no criteria rows; they have no context and are not cached.
    pub ranks_skipped: u64,
    pub duration_ms: u64,
}

#[derive(Debug, Default)]
pub struct RankCacheMetrics {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
}

impl RankCacheMetrics {
    pub fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn get_misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn hit_rate(&self) -> f64 {
        let hits = self.get_hits();
        let total = hits + self.get_misses();
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}

/// The materialized `rank_data` lookup.
///
/// `entries_db` maps rank id to its [`CacheEntry`]; `key_index_db` maps
/// `type tag | key digest | rank id` to nothing, so a prefix scan over one
/// context's digest yields its ranks. Rebuilt in bulk by
/// [`populate`]; only deletes touch it incrementally.
pub struct RankCache {
    pub entries_db: Database<Bytes, Bytes>,
    pub key_index_db: Database<Bytes, Unit>,
    pub meta_db: Database<Bytes, Bytes>,
    pub metrics: RankCacheMetrics,
}

impl RankCache {
    pub fn new(env: &Env, wtxn: &mut RwTxn) -> RankResult<Self> {
        let entries_db = env
            .database_options()
            .types::<Bytes, Bytes>()
            .name(DB_RANK_DATA)
            .create(wtxn)?;
        let key_index_db = env
            .database_options()
            .types::<Bytes, Unit>()
            .name(DB_RANK_DATA_BY_KEY)
            .create(wtxn)?;
        let meta_db = env
            .database_options()
            .types::<Bytes, Bytes>()
            .name(DB_RANK_DATA_META)
            .create(wtxn)?;

        Ok(Self {
            entries_db,
            key_index_db,
            meta_db,
            metrics: RankCacheMetrics::new(),
        })
    }

    pub fn make_index_key(rank_type: RankType, key: &CanonicalKey, rank_id: RankId) -> Vec<u8> {
        let mut index_key = key.index_prefix(rank_type).to_vec();
        index_key.extend_from_slice(&rank_id.to_be_bytes());
        index_key
    }

    pub fn get(&self, txn: &RoTxn, rank_id: RankId) -> RankResult<Option<CacheEntry>> {
        let Some(data) = self.entries_db.get(txn, &rank_id.to_be_bytes())? else {
            return Ok(None);
        };
        Ok(Some(bincode::deserialize(data)?))
    }

    pub fn set(&self, txn: &mut RwTxn, entry: &CacheEntry) -> RankResult<()> {
        let value_bytes = bincode::serialize(entry)?;
        self.entries_db
            .put(txn, &entry.rank_id.to_be_bytes(), &value_bytes)?;
        let index_key = Self::make_index_key(entry.rank_type, &entry.canonical_key, entry.rank_id);
        self.key_index_db.put(txn, &index_key, &())?;
        Ok(())
    }

    /// Drops one rank's entry and its index row.
    pub fn delete(&self, txn: &mut RwTxn, rank_id: RankId) -> RankResult<bool> {
        let Some(entry) = self.get(txn, rank_id)? else {
            return Ok(false);
        };
        let index_key = Self::make_index_key(entry.rank_type, &entry.canonical_key, rank_id);
        self.key_index_db.delete(txn, &index_key)?;
        Ok(self.entries_db.delete(txn, &rank_id.to_be_bytes())?)
    }

    /// Entries cached under `key`, ordered by value ascending. Rows that
    /// share the digest but not the key are dropped.
    pub fn lookup(
        &self,
        txn: &RoTxn,
        rank_type: RankType,
        key: &CanonicalKey,
    ) -> RankResult<Vec<CacheEntry>> {
        let prefix = key.index_prefix(rank_type);
        let rank_ids = self
            .key_index_db
            .prefix_iter(txn, &prefix[..])?
            .map(|result| {
                let (index_key, _) = result?;
                let tail = index_key.get(prefix.len()..).unwrap_or_default();
                let bytes = <[u8; 8]>::try_from(tail).map_err(|_| {
                    RankError::DecodeError(format!("malformed rank_data index key for `{key}`"))
                })?;
                Ok(RankId::from_be_bytes(bytes))
            })
            .collect::<RankResult<Vec<_>>>()?;

        let mut entries = Vec::with_capacity(rank_ids.len());
        for rank_id in rank_ids {
            match self.get(txn, rank_id)? {
                Some(entry) if entry.rank_type == rank_type && entry.canonical_key == *key => {
                    entries.push(entry)
                }
                _ => {}
            }
        }
        entries.sort_by_key(|e| (e.value, e.rank_id));
        Ok(entries)
    }

    pub fn generation(&self, txn: &RoTxn) -> RankResult<Option<CacheGeneration>> {
        let Some(data) = self.meta_db.get(txn, GENERATION_KEY)? else {
            return Ok(None);
        };
        Ok(Some(bincode::deserialize(data)?))
    }

    pub fn entry_count(&self, txn: &RoTxn) -> RankResult<u64> {
        Ok(self.entries_db.len(txn)?)
    }

    pub fn clear_all(&self, txn: &mut RwTxn) -> RankResult<()> {
        self.entries_db.clear(txn)?;
        self.key_index_db.clear(txn)?;
        Ok(())
    }

    fn set_generation(&self, txn: &mut RwTxn, generation: &CacheGeneration) -> RankResult<()> {
        let bytes = bincode::serialize(generation)?;
        self.meta_db.put(txn, GENERATION_KEY, &bytes)?;
        Ok(())
    }
}

/// Rebuilds the whole cache from the normalized store in one write
/// transaction.
///
/// The cache is cleared and refilled inside that transaction, so readers see
/// either the previous generation or the new one. Any failure aborts the
/// transaction and leaves the previous generation in place.
pub fn populate(storage: &RankStorage, cache: &RankCache) -> RankResult<PopulateReport> {
    let start = Instant::now();
    let mut wtxn = storage.env.write_txn()?;

    let records = storage
        .ranks_db
        .iter(&wtxn)?
        .map(|result| {
            let (_, bytes) = result?;
            RankRecord::from_bincode_bytes(bytes)
        })
        .collect::<RankResult<Vec<_>>>()?;

    cache.clear_all(&mut wtxn)?;

    let mut entries_written = 0u64;
    let mut ranks_skipped = 0u64;
    for record in &records {
        let criteria = storage.get_criteria(&wtxn, record.rank_id)?;
        let set = RankCriteriaSet::from_rows(record.rank_type, criteria);
        let Some(canonical_key) = set.canonical_key() else {
            tracing::warn!(
                rank_id = record.rank_id,
                rank_type = %record.rank_type,
                "rank has no criteria, not cached"
            );
            ranks_skipped += 1;
            continue;
        };
        cache.set(
            &mut wtxn,
            &CacheEntry {
                rank_id: record.rank_id,
                resource_id: record.resource_id,
                value: record.value,
                rank_type: record.rank_type,
                canonical_key,
            },
        )?;
        entries_written += 1;
    }

    cache.set_generation(
        &mut wtxn,
        &CacheGeneration {
            populated_at: Utc::now(),
            entries: entries_written,
        },
    )?;
    wtxn.commit()?;

    let report = PopulateReport {
        entries_written,
        ranks_skipped,
        duration_ms: start.elapsed().as_millis() as u64,
    };
    tracing::debug!(
        entries_written = report.entries_written,
        ranks_skipped = report.ranks_skipped,
        duration_ms = report.duration_ms,
        "rebuilt rank_data cache"
    );
    Ok(report)
}
