//! Protocol-wide constants for the mixer ledger.

/// Ledger format version. Bumped whenever the state digest layout changes.
pub const PROTOCOL_VERSION: u16 = 0;

/// Length in bytes of a 32-byte hash / field element.
pub const HASH32_LEN: usize = 32;

/// Length in bytes of a deposit commitment.
pub const COMMITMENT_LEN: usize = 32;

/// Length in bytes of a nullifier.
pub const NULLIFIER_LEN: usize = 32;

/// Length in bytes of an account address on the host chain.
pub const ADDRESS_LEN: usize = 20;

/// Default commitment tree height (2^20 = 1,048,576 leaves).
pub const DEFAULT_TREE_HEIGHT: u8 = 20;

/// Largest supported commitment tree height.
///
/// Leaf indices are `u64`; capacity `2^height` must fit with room to spare.
pub const MAX_TREE_HEIGHT: u8 = 32;

/// Default fixed denomination, in the smallest unit of the custody asset.
pub const DEFAULT_DENOMINATION: u64 = 1;

/// Largest page size the query service hands out.
pub const MAX_PAGE_LIMIT: u64 = 100;

/// Domain separator for internal commitment tree nodes.
pub const DS_MERKLE_NODE: &[u8] = b"MIXER::MERKLE_NODE::V0";

/// Domain separator used to derive the public zero leaf.
pub const DS_ZERO_LEAF: &[u8] = b"MIXER::ZERO_LEAF::V0";

/// Domain separator for the canonical ledger state digest.
pub const DS_STATE_DIGEST: &[u8] = b"MIXER::STATE_DIGEST::V0";

/// Domain separator for development (non-zk) withdrawal proofs.
///
/// Never accepted by a production verifier.
pub const DS_MOCK_PROOF: &[u8] = b"MIXER::MOCK_PROOF::V0";
