//! Incremental commitment tree.
//!
//! Fixed-height, append-only binary hash tree over accepted commitments.
//! Nodes live in an explicit array per level, indexed by `(level, position)`,
//! so the root and every intermediate hash depend only on the sequence of
//! inserted leaves. No map iteration order is ever observed.
//!
//! Empty slots are seeded with a public zero leaf; `zeros[level]` is the root
//! of an empty subtree at that level, which gives the empty tree a
//! well-defined root.

use borsh::{BorshDeserialize, BorshSerialize};
use mixer_core::{hash_pair, zero_leaf, Hash32, DEFAULT_TREE_HEIGHT, MAX_TREE_HEIGHT};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::TreeError;

/// Two-input node hash. Fixed at construction, never chosen per call.
pub type NodeHasher = fn(&Hash32, &Hash32) -> Hash32;

/// Fixed tree parameters.
#[derive(Clone, Copy, Debug)]
pub struct TreeConfig {
    /// Number of levels above the leaves; capacity is `2^height`.
    pub height: u8,
    /// Value of an unoccupied leaf slot.
    pub zero_leaf: Hash32,
    /// Node hash.
    pub hasher: NodeHasher,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            height: DEFAULT_TREE_HEIGHT,
            zero_leaf: zero_leaf(),
            hasher: hash_pair,
        }
    }
}

impl TreeConfig {
    /// Default hash wiring at a custom height.
    pub fn with_height(height: u8) -> Self {
        Self {
            height,
            ..Self::default()
        }
    }

    /// Maximum number of leaves.
    pub const fn capacity(&self) -> u64 {
        match 1u64.checked_shl(self.height as u32) {
            Some(cap) => cap,
            None => u64::MAX,
        }
    }

    /// Empty-subtree roots for levels `0..=height`.
    pub fn zero_hashes(&self) -> Vec<Hash32> {
        let mut zeros = Vec::with_capacity(usize::from(self.height) + 1);
        let mut node = self.zero_leaf;
        zeros.push(node);
        for _ in 0..self.height {
            node = (self.hasher)(&node, &node);
            zeros.push(node);
        }
        zeros
    }
}

/// Which side of the path the sibling sits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Side {
    /// Sibling is the left child; the running node is on the right.
    Left,
    /// Sibling is the right child; the running node is on the left.
    Right,
}

/// One step of an inclusion path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PathNode {
    /// Sibling hash at this level.
    pub sibling: Hash32,
    /// Sibling position.
    pub side: Side,
}

/// Inclusion path from a leaf up to the root, leaf level first.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MerklePath {
    /// Index of the leaf this path starts from.
    pub leaf_index: u64,
    /// Siblings from the leaf level upwards.
    pub nodes: Vec<PathNode>,
}

impl MerklePath {
    /// Fold the path over `leaf` and return the implied root.
    pub fn compute_root(&self, leaf: Hash32, hasher: NodeHasher) -> Hash32 {
        self.nodes.iter().fold(leaf, |acc, step| match step.side {
            Side::Left => hasher(&step.sibling, &acc),
            Side::Right => hasher(&acc, &step.sibling),
        })
    }

    /// Whether the sides agree with the bits of `leaf_index` for a tree of `height`.
    pub fn is_well_formed(&self, height: u8) -> bool {
        if self.nodes.len() != usize::from(height) {
            return false;
        }
        if self.leaf_index.checked_shr(u32::from(height)).unwrap_or(0) != 0 {
            return false;
        }
        self.nodes.iter().enumerate().all(|(level, step)| {
            let bit = u32::try_from(level)
                .ok()
                .and_then(|shift| self.leaf_index.checked_shr(shift))
                .unwrap_or(0)
                & 1;
            match step.side {
                Side::Left => bit == 1,
                Side::Right => bit == 0,
            }
        })
    }

    /// Full check: shape matches `config` and walking from `leaf` reaches `root`.
    pub fn verify(&self, config: &TreeConfig, leaf: Hash32, root: &Hash32) -> bool {
        self.is_well_formed(config.height) && self.compute_root(leaf, config.hasher) == *root
    }
}

/// Append-only fixed-height commitment tree.
#[derive(Clone, Debug)]
pub struct CommitmentTree {
    config: TreeConfig,
    /// `zeros[level]` = root of an empty subtree at `level`.
    zeros: Vec<Hash32>,
    /// `levels[level][position]`; level 0 holds the leaves. Only populated
    /// positions are stored, so `levels[level].len()` is
    /// `ceil(len / 2^level)`.
    levels: Vec<Vec<Hash32>>,
}

impl CommitmentTree {
    /// Create an empty tree.
    pub fn new(config: TreeConfig) -> Result<Self, TreeError> {
        if config.height == 0 || config.height > MAX_TREE_HEIGHT {
            return Err(TreeError::Corrupt("tree height out of range"));
        }
        Ok(Self {
            zeros: config.zero_hashes(),
            levels: vec![Vec::new(); usize::from(config.height) + 1],
            config,
        })
    }

    /// Tree parameters.
    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Tree height.
    pub fn height(&self) -> u8 {
        self.config.height
    }

    /// Maximum number of leaves.
    pub fn capacity(&self) -> u64 {
        self.config.capacity()
    }

    /// Number of leaves inserted so far.
    pub fn len(&self) -> u64 {
        self.levels
            .first()
            .map_or(0, |leaves| leaves.len() as u64)
    }

    /// Whether no leaf was inserted yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether another insert would fail with `CapacityExceeded`.
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity()
    }

    /// Append `leaf` at the next free index and rehash its ancestors.
    ///
    /// Returns the assigned leaf index.
    pub fn insert(&mut self, leaf: Hash32) -> Result<u64, TreeError> {
        let index = self.len();
        if index >= self.capacity() {
            return Err(TreeError::CapacityExceeded {
                capacity: self.capacity(),
            });
        }

        let hasher = self.config.hasher;
        let height = usize::from(self.config.height);
        let mut node = leaf;
        let mut pos = to_usize(index)?;

        self.levels
            .first_mut()
            .ok_or(TreeError::Corrupt("missing leaf level"))?
            .push(leaf);

        for level in 0..height {
            let parent = if pos & 1 == 0 {
                let right = self.node_or_zero(level, pos + 1)?;
                hasher(&node, &right)
            } else {
                let left = self
                    .levels
                    .get(level)
                    .and_then(|nodes| nodes.get(pos - 1))
                    .copied()
                    .ok_or(TreeError::Corrupt("missing left sibling"))?;
                hasher(&left, &node)
            };
            pos >>= 1;
            self.set_node(level + 1, pos, parent)?;
            node = parent;
        }

        Ok(index)
    }

    /// Current root.
    pub fn root(&self) -> Hash32 {
        let height = usize::from(self.config.height);
        self.levels
            .get(height)
            .and_then(|top| top.first())
            .or_else(|| self.zeros.get(height))
            .copied()
            .unwrap_or(self.config.zero_leaf)
    }

    /// Leaf value at `index`.
    pub fn leaf(&self, index: u64) -> Option<Hash32> {
        let pos = usize::try_from(index).ok()?;
        self.levels.first().and_then(|leaves| leaves.get(pos)).copied()
    }

    /// Inclusion path for the leaf at `leaf_index`.
    pub fn path(&self, leaf_index: u64) -> Result<MerklePath, TreeError> {
        let len = self.len();
        if leaf_index >= len {
            return Err(TreeError::IndexOutOfRange {
                index: leaf_index,
                len,
            });
        }

        let mut pos = to_usize(leaf_index)?;
        let mut nodes = Vec::with_capacity(usize::from(self.config.height));
        for level in 0..usize::from(self.config.height) {
            let (sibling_pos, side) = if pos & 1 == 0 {
                (pos + 1, Side::Right)
            } else {
                (pos - 1, Side::Left)
            };
            nodes.push(PathNode {
                sibling: self.node_or_zero(level, sibling_pos)?,
                side,
            });
            pos >>= 1;
        }

        Ok(MerklePath { leaf_index, nodes })
    }

    fn node_or_zero(&self, level: usize, pos: usize) -> Result<Hash32, TreeError> {
        let zero = self
            .zeros
            .get(level)
            .copied()
            .ok_or(TreeError::Corrupt("missing zero hash"))?;
        Ok(self
            .levels
            .get(level)
            .and_then(|nodes| nodes.get(pos))
            .copied()
            .unwrap_or(zero))
    }

    fn set_node(&mut self, level: usize, pos: usize, value: Hash32) -> Result<(), TreeError> {
        let nodes = self
            .levels
            .get_mut(level)
            .ok_or(TreeError::Corrupt("missing tree level"))?;
        match nodes.len().cmp(&pos) {
            core::cmp::Ordering::Equal => nodes.push(value),
            core::cmp::Ordering::Greater => {
                if let Some(slot) = nodes.get_mut(pos) {
                    *slot = value;
                }
            }
            core::cmp::Ordering::Less => return Err(TreeError::Corrupt("gap in tree level")),
        }
        Ok(())
    }
}

/// Root of a tree holding exactly `leaves`, recomputed level by level.
///
/// Used to audit the incremental tree against its leaf sequence.
pub fn root_from_leaves(config: &TreeConfig, leaves: &[Hash32]) -> Hash32 {
    let zeros = config.zero_hashes();
    let mut layer: Vec<Hash32> = leaves.to_vec();
    for zero in zeros.iter().take(usize::from(config.height)) {
        layer = layer
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => (config.hasher)(left, right),
                [left] => (config.hasher)(left, zero),
                _ => *zero,
            })
            .collect();
    }
    layer
        .first()
        .or_else(|| zeros.last())
        .copied()
        .unwrap_or(config.zero_leaf)
}

fn to_usize(index: u64) -> Result<usize, TreeError> {
    usize::try_from(index).map_err(|_| TreeError::Corrupt("index exceeds address space"))
}
