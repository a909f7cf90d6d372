//! Nullifier registry.
//!
//! Membership is all that matters for replay; iteration order is never
//! observed except through [`NullifierRegistry::sorted`], which is canonical.

use hashbrown::HashSet;

use mixer_core::Nullifier;

/// Monotonic set of spent nullifiers.
#[derive(Clone, Debug, Default)]
pub struct NullifierRegistry {
    set: HashSet<Nullifier>,
}

impl NullifierRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            set: HashSet::new(),
        }
    }

    /// Returns `true` if the nullifier was already recorded.
    pub fn contains(&self, nf: &Nullifier) -> bool {
        self.set.contains(nf)
    }

    /// Record a nullifier.
    ///
    /// Returns `true` if it was newly recorded, `false` (no-op) if already present.
    pub fn record(&mut self, nf: Nullifier) -> bool {
        self.set.insert(nf)
    }

    /// Number of spent nullifiers.
    pub fn len(&self) -> usize {
        self.set.len()
    }

    /// Whether nothing was spent yet.
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// All nullifiers in ascending byte order.
    pub fn sorted(&self) -> Vec<Nullifier> {
        let mut out: Vec<Nullifier> = self.set.iter().copied().collect();
        out.sort_unstable();
        out
    }
}
