use crate::rank_engine::{
    catalog::Catalog,
    config::EngineConfig,
    rank_cache::{CacheGeneration, PopulateReport, RankCache, populate},
    storage_core::RankStorage,
    types::RankResult,
};

/// Entry point for every rank operation.
///
/// Owns the normalized store, the derived `rank_data` cache (both in one
/// LMDB environment) and the catalog used to validate ids. Writes are
/// synchronous and each runs in a single write transaction.
///
/// Every read method opens its own read transaction. The environment uses
/// thread-local read slots, so do not call them while this thread holds a
/// transaction on `storage.env`.
pub struct RankEngine<C> {
    pub storage: RankStorage,
    pub cache: RankCache,
    pub(crate) catalog: C,
    pub(crate) config: EngineConfig,
}

impl<C: Catalog> RankEngine<C> {
    pub fn open(config: EngineConfig, catalog: C) -> RankResult<Self> {
        let storage = RankStorage::new(&config)?;
        let mut wtxn = storage.env.write_txn()?;
        let cache = RankCache::new(&storage.env, &mut wtxn)?;
        wtxn.commit()?;

        Ok(Self {
            storage,
            cache,
            catalog,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    /// Catalog changes made through here are not cascaded; pair them with
    /// [`RankEngine::cleanup`].
    pub fn catalog_mut(&mut self) -> &mut C {
        &mut self.catalog
    }

    /// Rebuilds the `rank_data` cache from the normalized store.
    pub fn populate(&self) -> RankResult<PopulateReport> {
        populate(&self.storage, &self.cache)
    }

    /// The last successful rebuild, or `None` if the cache was never built.
    pub fn cache_generation(&self) -> RankResult<Option<CacheGeneration>> {
        let rtxn = self.storage.env.read_txn()?;
        self.cache.generation(&rtxn)
    }

    pub fn rank_count(&self) -> RankResult<u64> {
        let rtxn = self.storage.env.read_txn()?;
        self.storage.rank_count(&rtxn)
    }
}
