//! Canonical keys for classification contexts.
//!
//! A context's criteria set is reduced to one string so that "which ranks
//! share this context" becomes a single equality lookup. Keys are compared,
//! never decoded: the ids that produced a key live in the criteria rows.

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;
use twox_hash::XxHash3_64;

use crate::rank_engine::types::RankType;

/// Joins combined-term ids. Bare concatenation lets `[1, 23]` and `[231]`
/// collide, so ids are framed by a separator.
const COMBINED_SEPARATOR: &str = ",";


#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CanonicalKey(String);

impl CanonicalKey {
    /// Builds the key for `ids` under `rank_type`.
    ///
    /// `facet` and `single_term` contexts are keyed by their sole id; any other
    /// arity has no key. `combined_term` ids are deduplicated and sorted
    /// descending before joining, so permutations share a key.
    pub fn for_ids(rank_type: RankType, ids: &[u64]) -> Option<Self> {
        match rank_type {
            RankType::Facet | RankType::SingleTerm => match ids {
                [id] => Some(Self(id.to_string())),
                _ => None,
            },
            RankType::CombinedTerm => {
                if ids.is_empty() {
                    return None;
                }
                let joined = ids
                    .iter()
                    .copied()
                    .unique()
                    .sorted_unstable_by(|a, b| b.cmp(a))
                    .join(COMBINED_SEPARATOR);
                Some(Self(joined))
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// xxh3 digest of the key. Combined keys grow with their term count and
    /// LMDB caps keys at 511 bytes, so index rows carry the digest instead.
    pub fn digest(&self) -> u64 {
        XxHash3_64::oneshot(self.0.as_bytes())
    }

    /// Prefix shared by every index row of this key under `rank_type`:
    /// type tag followed by the big-endian digest. Digests can collide, so
    /// rows found under a prefix must be checked against the full key.
    pub fn index_prefix(&self, rank_type: RankType) -> [u8; 9] {
        let mut prefix = [0u8; 9];
        prefix[0] = rank_type.tag();
        prefix[1..].copy_from_slice(&self.digest().to_be_bytes());
        prefix
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_single_id_keys() {
        let key = CanonicalKey::for_ids(RankType::SingleTerm, &[5]).unwrap();
        assert_eq!(key.as_str(), "5");
        let key = CanonicalKey::for_ids(RankType::Facet, &[12]).unwrap();
        assert_eq!(key.as_str(), "12");
    }

    #[test]
    fn test_single_arity_enforced() {
        assert!(CanonicalKey::for_ids(RankType::SingleTerm, &[]).is_none());
        assert!(CanonicalKey::for_ids(RankType::SingleTerm, &[5, 9]).is_none());
        assert!(CanonicalKey::for_ids(RankType::Facet, &[1, 2]).is_none());
        assert!(CanonicalKey::for_ids(RankType::CombinedTerm, &[]).is_none());
    }

    #[test]
    fn test_combined_sorted_descending() {
        let key = CanonicalKey::for_ids(RankType::CombinedTerm, &[5, 120, 9]).unwrap();
        assert_eq!(key.as_str(), "120,9,5");
    }

    #[test]
    fn test_combined_repeated_ids_collapse() {
        let a = CanonicalKey::for_ids(RankType::CombinedTerm, &[5, 9, 5]).unwrap();
        let b = CanonicalKey::for_ids(RankType::CombinedTerm, &[9, 5]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_digit_framing_does_not_collide() {
        let a = CanonicalKey::for_ids(RankType::CombinedTerm, &[1, 23]).unwrap();
        let b = CanonicalKey::for_ids(RankType::CombinedTerm, &[231]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_index_prefix_scoped_by_type() {
        let key = CanonicalKey::for_ids(RankType::Facet, &[7]).unwrap();
        let facet_prefix = key.index_prefix(RankType::Facet);
        let term_prefix = key.index_prefix(RankType::SingleTerm);
        assert_ne!(facet_prefix, term_prefix);
        assert_eq!(facet_prefix[0], RankType::Facet.tag());
        assert_eq!(facet_prefix[1..], key.digest().to_be_bytes());
    }

    #[test]
    fn test_index_prefix_is_fixed_size_for_long_keys() {
        let ids: Vec<u64> = (1_000_000..1_000_400).collect();
        let key = CanonicalKey::for_ids(RankType::CombinedTerm, &ids).unwrap();
        assert!(key.as_str().len() > 511);
        assert_eq!(key.index_prefix(RankType::CombinedTerm).len(), 9);

        let shorter = CanonicalKey::for_ids(RankType::CombinedTerm, &ids[1..]).unwrap();
        assert_ne!(
            key.index_prefix(RankType::CombinedTerm),
            shorter.index_prefix(RankType::CombinedTerm)
        );
    }

    proptest! {
        #[test]
        fn prop_combined_key_is_order_independent(
            ids in proptest::collection::vec(1u64..10_000, 1..12),
            seed in any::<u64>(),
        ) {
            let mut shuffled = ids.clone();
            // rotate, then reverse on even seeds
            let len = shuffled.len();
            shuffled.rotate_left((seed as usize) % len);
            if seed % 2 == 0 {
                shuffled.reverse();
            }
            prop_assert_eq!(
                CanonicalKey::for_ids(RankType::CombinedTerm, &ids),
                CanonicalKey::for_ids(RankType::CombinedTerm, &shuffled)
            );
        }

        #[test]
        fn prop_distinct_sets_have_distinct_keys(
            a in proptest::collection::btree_set(1u64..500, 1..6),
            b in proptest::collection::btree_set(1u64..500, 1..6),
        ) {
            let a: Vec<u64> = a.into_iter().collect();
            let b: Vec<u64> = b.into_iter().collect();
            let same = a == b;
            let ka = CanonicalKey::for_ids(RankType::CombinedTerm, &a);
            let kb = CanonicalKey::for_ids(RankType::CombinedTerm, &b);
            prop_assert_eq!(ka == kb, same);
        }
    }
}
