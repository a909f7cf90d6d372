//! Hash wiring for the commitment tree.
//!
//! The production deployment pins a field-native two-input hash (Poseidon)
//! out of band. This crate only fixes the default wiring used when no other
//! hash is injected, so that devnets and tests share one deterministic tree.

use crate::constants::{DS_MERKLE_NODE, DS_ZERO_LEAF, HASH32_LEN};
use crate::serialization::hash32;
use crate::types::Hash32;

/// Default two-input node hash: `BLAKE3(DS_MERKLE_NODE || left || right)`.
pub fn hash_pair(left: &Hash32, right: &Hash32) -> Hash32 {
    let mut bytes = [0u8; 2 * HASH32_LEN];
    let (lo, hi) = bytes.split_at_mut(HASH32_LEN);
    lo.copy_from_slice(left.as_bytes());
    hi.copy_from_slice(right.as_bytes());
    hash32(DS_MERKLE_NODE, &bytes)
}

/// Default public zero leaf: `BLAKE3(DS_ZERO_LEAF)`.
///
/// Nobody knows an opening for it, so empty slots can never be withdrawn.
pub fn zero_leaf() -> Hash32 {
    hash32(DS_ZERO_LEAF, &[])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_pair_is_order_sensitive() {
        let a = Hash32([1u8; 32]);
        let b = Hash32([2u8; 32]);
        assert_ne!(hash_pair(&a, &b), hash_pair(&b, &a));
    }

    #[test]
    fn zero_leaf_is_not_all_zero() {
        assert_ne!(zero_leaf(), Hash32::zero());
    }
}
