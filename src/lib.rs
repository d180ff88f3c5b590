//! Criteria-scoped ranking engine.
//!
//! A rank attaches an ordinal value to a resource under a classification
//! context (a facet, a single term, or a combination of terms). Ranks live in
//! a normalized LMDB store; a derived `rank_data` cache keyed by the
//! context's canonical key serves fast ordered lookups.
//!
//! ```ignore
//! use helix_rank::rank_engine::{EngineConfig, InMemoryCatalog, Rank, RankEngine, RankType};
//!
//! let engine = RankEngine::open(EngineConfig::new("./ranks"), catalog)?;
//! let mut rank = Rank::new();
//! rank.set_rank_type(RankType::SingleTerm)?;
//! rank.set_resource(101)?;
//! rank.set_value(3)?;
//! engine.add_criteria(&mut rank, &[5])?;
//! engine.commit(&mut rank)?;
//! engine.populate()?;
//! let listing = engine.ranked_list(RankType::SingleTerm, &[5])?;
//! ```

pub mod rank_engine;
