use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub type RankId = u64;
pub type ResourceId = u64;
pub type TermId = u64;
pub type FacetId = u64;
pub type RankValue = u32;

/// Term id carried by facet-only criteria.
pub const FACET_ONLY_TERM: TermId = 0;

pub type RankResult<T> = Result<T, RankError>;

/// The classification shape of a rank. Fixed once set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankType {
    Facet,
    SingleTerm,
    CombinedTerm,
}

impl RankType {
    pub const ALL: [RankType; 3] = [RankType::Facet, RankType::SingleTerm, RankType::CombinedTerm];

    /// One-byte tag used inside composite storage keys.
    pub const fn tag(self) -> u8 {
        match self {
            RankType::Facet => 1,
            RankType::SingleTerm => 2,
            RankType::CombinedTerm => 3,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(RankType::Facet),
            2 => Some(RankType::SingleTerm),
            3 => Some(RankType::CombinedTerm),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            RankType::Facet => "facet",
            RankType::SingleTerm => "single_term",
            RankType::CombinedTerm => "combined_term",
        }
    }

    pub const fn is_term_based(self) -> bool {
        !matches!(self, RankType::Facet)
    }
}

impl fmt::Display for RankType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RankType {
    type Err = RankError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "facet" => Ok(RankType::Facet),
            "single_term" => Ok(RankType::SingleTerm),
            "combined_term" => Ok(RankType::CombinedTerm),
            other => Err(RankError::Validation(format!("unknown rank type `{other}`"))),
        }
    }
}

/// Catalog entity kinds the engine references by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogEntity {
    Resource,
    Term,
    Facet,
}

impl fmt::Display for CatalogEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CatalogEntity::Resource => "resource",
            CatalogEntity::Term => "term",
            CatalogEntity::Facet => "facet",
        })
    }
}

#[derive(Debug, Error)]
pub enum RankError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Missing required attribute `{0}`")]
    MissingAttribute(&'static str),
    #[error("Unknown {kind} id {id}")]
    UnknownId { kind: CatalogEntity, id: u64 },
    #[error("Rank {0} not found")]
    RankNotFound(RankId),
    #[error("Invalid rank state: {0}")]
    InvalidState(String),
    #[error("Catalog error: {0}")]
    Catalog(String),
    #[error("Storage error: {0}")]
    Storage(#[from] heed3::Error),
    #[error("Encoding error: {0}")]
    Encoding(#[from] bincode::Error),
    #[error("Decode error: {0}")]
    DecodeError(String),
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RankError {
    /// Storage and encoding failures are the ones that abort a transaction.
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            RankError::Storage(_) | RankError::Encoding(_) | RankError::DecodeError(_) | RankError::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_type_tag_roundtrip() {
        for ty in RankType::ALL {
            assert_eq!(RankType::from_tag(ty.tag()), Some(ty));
        }
        assert_eq!(RankType::from_tag(0), None);
        assert_eq!(RankType::from_tag(9), None);
    }

    #[test]
    fn test_rank_type_parse() {
        assert_eq!("facet".parse::<RankType>().unwrap(), RankType::Facet);
        assert_eq!(" combined_term ".parse::<RankType>().unwrap(), RankType::CombinedTerm);
        let err = "popularity".parse::<RankType>().unwrap_err();
        assert!(matches!(err, RankError::Validation(_)));
        assert!(err.to_string().contains("popularity"));
    }

    #[test]
    fn test_error_display() {
        let err = RankError::UnknownId {
            kind: CatalogEntity::Term,
            id: 42,
        };
        assert_eq!(err.to_string(), "Unknown term id 42");
        assert_eq!(
            RankError::MissingAttribute("value").to_string(),
            "Missing required attribute `value`"
        );
    }

    #[test]
    fn test_storage_failure_classification() {
        assert!(RankError::DecodeError("bad row".into()).is_storage_failure());
        assert!(!RankError::MissingAttribute("value").is_storage_failure());
        assert!(!RankError::RankNotFound(7).is_storage_failure());
    }
}
