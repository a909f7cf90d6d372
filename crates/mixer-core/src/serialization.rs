// Consensus-critical. Changes alter every replica's state digest.
//! Canonical serialization helpers.
//!
//! Rule: everything that is hashed or compared across replicas is encoded with
//! Borsh. JSON is for tooling output only.

use crate::constants::HASH32_LEN;
use crate::types::{CoreError, Hash32};

/// Encode a value with canonical Borsh encoding.
pub fn to_bytes<T: borsh::BorshSerialize>(v: &T) -> Result<Vec<u8>, CoreError> {
    borsh::to_vec(v).map_err(|_| CoreError::InvalidValue("borsh serialization failed"))
}

/// Hash bytes with blake3 under a domain separator and return 32 bytes.
pub fn hash32(domain_sep: &[u8], bytes: &[u8]) -> Hash32 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(domain_sep);
    hasher.update(bytes);
    let out = hasher.finalize();
    let mut arr = [0u8; HASH32_LEN];
    arr.copy_from_slice(out.as_bytes());
    Hash32(arr)
}

/// Serde adapter for variable-length byte strings as (optionally `0x`-prefixed) hex.
///
/// Use with `#[serde(with = "mixer_core::hex_bytes")]`.
#[cfg(feature = "serde")]
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize bytes as a lowercase hex string.
    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    /// Deserialize a hex string into bytes.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = <String as Deserialize>::deserialize(deserializer)?;
        hex::decode(s.strip_prefix("0x").unwrap_or(&s)).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_separation_changes_output() {
        let a = hash32(b"A", b"payload");
        let b = hash32(b"B", b"payload");
        assert_ne!(a, b);
        assert_eq!(a, hash32(b"A", b"payload"));
    }

    #[test]
    fn borsh_amount_is_little_endian_u64() {
        let bytes = to_bytes(&crate::Amount::from_units(258)).expect("encode");
        assert_eq!(bytes, vec![2, 1, 0, 0, 0, 0, 0, 0]);
    }
}
