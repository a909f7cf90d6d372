//! Ledger state.
//!
//! The single replicated object every instruction acts on. Tracks:
//! - the denomination and the running custody total
//! - deposit records in insertion order (leaf order)
//! - the commitment tree
//! - the nullifier registry
//!
//! Mutation happens only through [`LedgerState::apply`] (see `apply.rs`).
//! Everything in this file is read-only or construction.

use borsh::{BorshDeserialize, BorshSerialize};
use hashbrown::HashMap;
use mixer_core::{
    hash32, to_bytes, Address, Amount, Commitment, Hash32, Nullifier, DS_STATE_DIGEST,
    PROTOCOL_VERSION,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::LedgerConfig;
use crate::error::StateError;
use crate::merkle::{root_from_leaves, CommitmentTree, TreeConfig};
use crate::nullifier::NullifierRegistry;

/// One accepted deposit. Created once, never mutated or removed.
#[derive(Clone, Copy, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DepositRecord {
    /// Deposited commitment.
    pub commitment: Commitment,
    /// Tree position; equals the record's position in insertion order.
    pub leaf_index: u64,
    /// Logical timestamp of the accepting input.
    pub accepted_at: u64,
}

/// Canonical snapshot hashed by [`LedgerState::state_digest`].
#[derive(BorshSerialize)]
struct DigestSnapshot {
    version: u16,
    denomination: Amount,
    total_value: Amount,
    root: Hash32,
    leaf_count: u64,
    nullifiers: Vec<Nullifier>,
    halted: bool,
}

/// Authoritative mixer state.
#[derive(Clone, Debug)]
pub struct LedgerState {
    pub(crate) config: LedgerConfig,
    pub(crate) denomination: Amount,
    pub(crate) records: Vec<DepositRecord>,
    pub(crate) by_commitment: HashMap<Commitment, u64>,
    pub(crate) tree: CommitmentTree,
    pub(crate) nullifiers: NullifierRegistry,
    pub(crate) total_value: Amount,
    pub(crate) halted: bool,
    pub(crate) last_processed_at: Option<u64>,
    pub(crate) processed: u64,
}

impl LedgerState {
    /// Create an empty ledger.
    pub fn new(config: LedgerConfig) -> Result<Self, StateError> {
        config.validate()?;
        Ok(Self {
            tree: CommitmentTree::new(config.tree)?,
            denomination: config.denomination,
            records: Vec::new(),
            by_commitment: HashMap::new(),
            nullifiers: NullifierRegistry::new(),
            total_value: Amount::zero(),
            halted: false,
            last_processed_at: None,
            processed: 0,
            config,
        })
    }

    /// Configuration the ledger was created with.
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Tree parameters.
    pub fn tree_config(&self) -> &TreeConfig {
        self.tree.config()
    }

    /// Custody address.
    pub fn custody(&self) -> Address {
        self.config.custody
    }

    /// Current denomination.
    pub fn denomination(&self) -> Amount {
        self.denomination
    }

    /// Net value held in custody.
    pub fn total_value(&self) -> Amount {
        self.total_value
    }

    /// Current commitment root.
    pub fn root(&self) -> Hash32 {
        self.tree.root()
    }

    /// Commitment tree, read-only.
    pub fn tree(&self) -> &CommitmentTree {
        &self.tree
    }

    /// Number of accepted deposits.
    pub fn deposit_count(&self) -> u64 {
        self.records.len() as u64
    }

    /// Deposit records in insertion order.
    pub fn records(&self) -> &[DepositRecord] {
        &self.records
    }

    /// Record at `leaf_index`.
    pub fn record(&self, leaf_index: u64) -> Option<&DepositRecord> {
        usize::try_from(leaf_index)
            .ok()
            .and_then(|i| self.records.get(i))
    }

    /// Leaf index of an accepted commitment.
    pub fn leaf_index_of(&self, cm: &Commitment) -> Option<u64> {
        self.by_commitment.get(cm).copied()
    }

    /// Whether `cm` was already accepted.
    pub fn contains_commitment(&self, cm: &Commitment) -> bool {
        self.by_commitment.contains_key(cm)
    }

    /// Whether `nf` was already spent.
    pub fn is_spent(&self, nf: &Nullifier) -> bool {
        self.nullifiers.contains(nf)
    }

    /// Spent nullifiers, read-only.
    pub fn nullifiers(&self) -> &NullifierRegistry {
        &self.nullifiers
    }

    /// Whether an emergency withdrawal halted the ledger.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Logical timestamp of the last processed input.
    pub fn last_processed_at(&self) -> Option<u64> {
        self.last_processed_at
    }

    /// Number of inputs processed to a terminal outcome.
    pub fn processed_count(&self) -> u64 {
        self.processed
    }

    /// Cheap structural invariants, checked after every instruction.
    pub fn check_invariants(&self) -> Result<(), StateError> {
        let count = self.deposit_count();
        if self.tree.len() != count {
            return Err(StateError::Invariant("leaf count differs from record count"));
        }
        if self.by_commitment.len() != self.records.len() {
            return Err(StateError::Invariant("commitment index differs from records"));
        }
        if self.nullifiers.len() as u64 > count {
            return Err(StateError::Invariant("more nullifiers than deposits"));
        }
        Ok(())
    }

    /// Full audit: structural invariants, contiguous leaf indices, and the
    /// root recomputed from the records in insertion order.
    pub fn audit(&self) -> Result<(), StateError> {
        self.check_invariants()?;
        for (pos, rec) in self.records.iter().enumerate() {
            if rec.leaf_index != pos as u64 {
                return Err(StateError::Invariant("leaf indices are not contiguous"));
            }
            if self.leaf_index_of(&rec.commitment) != Some(rec.leaf_index) {
                return Err(StateError::Invariant("commitment index points elsewhere"));
            }
        }
        let leaves: Vec<Hash32> = self.records.iter().map(|r| r.commitment.into()).collect();
        if root_from_leaves(self.tree.config(), &leaves) != self.root() {
            return Err(StateError::Invariant("root does not match deposit records"));
        }
        Ok(())
    }

    /// Hash of the canonical state snapshot. Equal across replicas iff their
    /// denomination, total, root, leaf count, nullifier set and halt flag agree.
    pub fn state_digest(&self) -> Result<Hash32, StateError> {
        let snapshot = DigestSnapshot {
            version: PROTOCOL_VERSION,
            denomination: self.denomination,
            total_value: self.total_value,
            root: self.root(),
            leaf_count: self.deposit_count(),
            nullifiers: self.nullifiers.sorted(),
            halted: self.halted,
        };
        let bytes =
            to_bytes(&snapshot).map_err(|_| StateError::Invariant("snapshot encoding failed"))?;
        Ok(hash32(DS_STATE_DIGEST, &bytes))
    }
}
