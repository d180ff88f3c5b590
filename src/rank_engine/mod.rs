pub mod canonical_key;
pub mod catalog;
pub mod cleanup;
pub mod config;
pub mod criteria;
pub mod duplicates;
pub mod engine;
pub mod query;
pub mod rank;
pub mod rank_cache;
pub mod repository;
pub mod storage_core;
pub mod types;

#[cfg(test)]
mod tests;

pub use canonical_key::CanonicalKey;
pub use catalog::{Catalog, InMemoryCatalog};
pub use cleanup::{CatalogChange, CleanupReport};
pub use config::EngineConfig;
pub use criteria::{CriteriaOutcome, Criterion, RankCriteriaSet, RemoveOutcome, parse_id_list};
pub use duplicates::DuplicateKind;
pub use engine::RankEngine;
pub use rank::{Rank, RankState};
pub use rank_cache::{CacheEntry, CacheGeneration, PopulateReport, RankedEntry};
pub use repository::{CommitOptions, CommitOutcome, DeleteOutcome};
pub use types::{RankError, RankResult, RankType};
