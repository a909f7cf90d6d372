//! Read-only projections of the ledger.
//!
//! A [`QueryService`] borrows the ledger immutably, so it can only observe
//! state between instructions.

use mixer_core::{Amount, Hash32, Nullifier, MAX_PAGE_LIMIT};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::QueryError;
use crate::ledger::{DepositRecord, LedgerState};
use crate::merkle::MerklePath;

/// Mixer overview.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MixerSummary {
    /// Current denomination.
    pub denomination: Amount,
    /// Number of accepted deposits.
    pub deposit_count: u64,
    /// Number of spent nullifiers.
    pub nullifier_count: u64,
    /// Net value in custody.
    pub total_value: Amount,
    /// Current commitment root.
    pub root: Hash32,
    /// Commitment tree height.
    pub tree_height: u8,
    /// Whether the ledger was halted.
    pub halted: bool,
}

/// One page of deposit history, most recent first.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DepositPage {
    /// Records on this page.
    pub deposits: Vec<DepositRecord>,
    /// 1-based page number.
    pub page: u64,
    /// Requested page size.
    pub limit: u64,
    /// Total number of deposits.
    pub total: u64,
    /// `ceil(total / limit)`.
    pub total_pages: u64,
}

/// Liveness as seen from outside the instruction stream.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Health {
    /// No input processed yet.
    Idle,
    /// Last input is recent enough.
    Healthy,
    /// Nothing processed for longer than the threshold.
    Stale,
}

/// Advisory health report.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HealthStatus {
    /// Overall status.
    pub status: Health,
    /// Timestamp of the last processed input.
    pub last_processed_at: Option<u64>,
    /// `now - last_processed_at`, saturating.
    pub idle_secs: Option<u64>,
    /// Inputs processed so far.
    pub processed: u64,
}

/// Read-only view over a ledger.
#[derive(Clone, Copy, Debug)]
pub struct QueryService<'a> {
    ledger: &'a LedgerState,
}

impl<'a> QueryService<'a> {
    /// Borrow `ledger` for queries.
    pub fn new(ledger: &'a LedgerState) -> Self {
        Self { ledger }
    }

    /// Denomination, counts, total value, root and tree height.
    pub fn summary(&self) -> MixerSummary {
        MixerSummary {
            denomination: self.ledger.denomination(),
            deposit_count: self.ledger.deposit_count(),
            nullifier_count: self.ledger.nullifiers().len() as u64,
            total_value: self.ledger.total_value(),
            root: self.ledger.root(),
            tree_height: self.ledger.tree().height(),
            halted: self.ledger.is_halted(),
        }
    }

    /// Deposit history, most recent first. `page` is 1-based.
    ///
    /// Pages past the end are empty rather than an error.
    pub fn deposits(&self, page: u64, limit: u64) -> Result<DepositPage, QueryError> {
        if page == 0 {
            return Err(QueryError::InvalidPagination("page starts at 1"));
        }
        if limit == 0 || limit > MAX_PAGE_LIMIT {
            return Err(QueryError::InvalidPagination("limit must be in 1..=100"));
        }

        let records = self.ledger.records();
        let total = records.len() as u64;
        let skip = (page - 1).saturating_mul(limit);
        let deposits = records
            .iter()
            .rev()
            .skip(usize::try_from(skip).unwrap_or(usize::MAX))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .copied()
            .collect();

        Ok(DepositPage {
            deposits,
            page,
            limit,
            total,
            total_pages: total.div_ceil(limit),
        })
    }

    /// Whether `nf` was already spent.
    pub fn is_nullifier_used(&self, nf: &Nullifier) -> bool {
        self.ledger.is_spent(nf)
    }

    /// Inclusion path for the leaf at `leaf_index`.
    pub fn inclusion_path(&self, leaf_index: u64) -> Result<MerklePath, QueryError> {
        let len = self.ledger.deposit_count();
        if leaf_index >= len {
            return Err(QueryError::IndexOutOfRange {
                index: leaf_index,
                len,
            });
        }
        self.ledger
            .tree()
            .path(leaf_index)
            .map_err(|_| QueryError::IndexOutOfRange {
                index: leaf_index,
                len,
            })
    }

    /// Health from the time elapsed since the last processed input.
    pub fn health(&self, now: u64, max_idle_secs: u64) -> HealthStatus {
        let last = self.ledger.last_processed_at();
        let idle_secs = last.map(|t| now.saturating_sub(t));
        let status = match idle_secs {
            None => Health::Idle,
            Some(idle) if idle > max_idle_secs => Health::Stale,
            Some(_) => Health::Healthy,
        };
        HealthStatus {
            status,
            last_processed_at: last,
            idle_secs,
            processed: self.ledger.processed_count(),
        }
    }
}
