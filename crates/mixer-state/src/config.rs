//! Ledger configuration.

use mixer_core::{Address, Amount, DEFAULT_DENOMINATION, MAX_TREE_HEIGHT};

use crate::error::StateError;
use crate::merkle::TreeConfig;

/// Fixed parameters a ledger is created with.
///
/// Every replica must be constructed from an identical config.
#[derive(Clone, Copy, Debug)]
pub struct LedgerConfig {
    /// Commitment tree parameters.
    pub tree: TreeConfig,
    /// Denomination at start-up.
    pub denomination: Amount,
    /// Address holding deposited funds.
    pub custody: Address,
    /// Only this address may change the denomination or halt the ledger.
    /// `None` leaves those instructions open to any sender.
    pub admin: Option<Address>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            tree: TreeConfig::default(),
            denomination: Amount::from_units(DEFAULT_DENOMINATION),
            custody: Address::zero(),
            admin: None,
        }
    }
}

impl LedgerConfig {
    /// Reject configurations the ledger cannot run with.
    pub fn validate(&self) -> Result<(), StateError> {
        if self.tree.height == 0 || self.tree.height > MAX_TREE_HEIGHT {
            return Err(StateError::Config("tree height must be in 1..=32"));
        }
        if self.denomination.is_zero() {
            return Err(StateError::Config("denomination must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        LedgerConfig::default().validate().expect("default config");
    }

    #[test]
    fn zero_denomination_is_rejected() {
        let cfg = LedgerConfig {
            denomination: Amount::zero(),
            ..LedgerConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(StateError::Config(_))));
    }
}
