// Consensus-critical. Changes alter every replica's state digest.
//! Canonical value types for the mixer ledger.
//!
//! Everything here is a plain fixed-width value. Types that cross the replica
//! boundary derive Borsh so their encoding is canonical.

use crate::constants::*;
use borsh::{BorshDeserialize, BorshSerialize};
use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Errors related to parsing, validation, or construction of core types.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Hex string had an unexpected byte length.
    #[error("invalid hex length: expected {expected} bytes, got {got} bytes")]
    InvalidHexLength {
        /// Expected number of bytes.
        expected: usize,
        /// Actual number of bytes provided.
        got: usize,
    },

    /// Hex decoding failed.
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// Arithmetic overflow or underflow occurred.
    #[error("amount overflow or underflow")]
    AmountOverflow,

    /// A value violated protocol constraints.
    #[error("invalid value: {0}")]
    InvalidValue(&'static str),
}

/// Parse an optionally `0x`-prefixed hex string into a fixed-width array.
fn parse_fixed_hex<const N: usize>(s: &str) -> Result<[u8; N], CoreError> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s)?;
    if bytes.len() != N {
        return Err(CoreError::InvalidHexLength {
            expected: N,
            got: bytes.len(),
        });
    }
    let mut arr = [0u8; N];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

macro_rules! fixed_bytes {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize,
        )]
        pub struct $name(pub [u8; $len]);

        impl $name {
            /// Returns the all-zero value.
            pub const fn zero() -> Self {
                Self([0u8; $len])
            }

            /// Returns the underlying byte array.
            pub const fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), hex::encode(self.0))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(value: [u8; $len]) -> Self {
                Self(value)
            }
        }

        impl From<$name> for [u8; $len] {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_fixed_hex::<$len>(s).map(Self)
            }
        }

        // Human-facing encodings carry hex strings, not byte arrays.
        #[cfg(feature = "serde")]
        impl Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        #[cfg(feature = "serde")]
        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = <String as Deserialize>::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

fixed_bytes!(
    /// Fixed-size 32-byte hash / field element (tree nodes, roots, digests).
    Hash32,
    HASH32_LEN
);

fixed_bytes!(
    /// Depositor-supplied hiding commitment. Becomes a tree leaf once accepted.
    Commitment,
    COMMITMENT_LEN
);

fixed_bytes!(
    /// One-time spend tag revealed at withdrawal.
    Nullifier,
    NULLIFIER_LEN
);

fixed_bytes!(
    /// Host-chain account address (custody, depositors, recipients).
    Address,
    ADDRESS_LEN
);

impl From<Commitment> for Hash32 {
    fn from(cm: Commitment) -> Self {
        Self(cm.0)
    }
}

/// Amount in the smallest unit of the custody asset.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Amount(pub u64);

impl Amount {
    /// Returns a zero amount.
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Constructs an amount from base units.
    pub const fn from_units(units: u64) -> Self {
        Self(units)
    }

    /// Returns the underlying unit value.
    pub const fn units(self) -> u64 {
        self.0
    }

    /// Whether the amount is zero.
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Checked addition.
    pub fn checked_add(self, other: Amount) -> Result<Self, CoreError> {
        self.0
            .checked_add(other.0)
            .map(Self)
            .ok_or(CoreError::AmountOverflow)
    }

    /// Checked subtraction.
    pub fn checked_sub(self, other: Amount) -> Result<Self, CoreError> {
        self.0
            .checked_sub(other.0)
            .map(Self)
            .ok_or(CoreError::AmountOverflow)
    }
}

impl fmt::Debug for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Amount({} units)", self.0)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} units", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prefixed_and_bare_hex() {
        let bare: Commitment = "11".repeat(32).parse().expect("bare hex");
        let prefixed: Commitment = format!("0x{}", "11".repeat(32)).parse().expect("0x hex");
        assert_eq!(bare, prefixed);
        assert_eq!(bare, Commitment([0x11; 32]));
    }

    #[test]
    fn rejects_wrong_length() {
        let err = "aa".repeat(19).parse::<Address>().expect_err("too short");
        assert!(matches!(
            err,
            CoreError::InvalidHexLength {
                expected: 20,
                got: 19
            }
        ));
    }

    #[test]
    fn amount_checked_sub_underflows() {
        let one = Amount::from_units(1);
        assert!(Amount::zero().checked_sub(one).is_err());
        assert_eq!(one.checked_sub(one).expect("sub"), Amount::zero());
        assert!(Amount(u64::MAX).checked_add(one).is_err());
    }
}
