//! Rejection reasons, fatal state errors, and query errors.

use mixer_core::Amount;
use thiserror::Error;

/// Why an instruction was rejected.
///
/// A rejection is a normal per-instruction outcome: it is reported to the host
/// as a notice and never stops processing of later instructions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum RejectReason {
    /// Amount does not equal the current denomination.
    #[error("denomination mismatch: expected {expected}, got {got}")]
    DenominationMismatch {
        /// Current denomination.
        expected: Amount,
        /// Amount carried by the instruction.
        got: Amount,
    },

    /// The commitment was already accepted.
    #[error("duplicate commitment")]
    DuplicateCommitment,

    /// The nullifier was already spent.
    #[error("nullifier already used")]
    NullifierAlreadyUsed,

    /// The inclusion proof does not resolve to an accepted leaf under the current root.
    #[error("unknown commitment")]
    UnknownCommitment,

    /// The external verifier rejected the withdrawal proof (or failed).
    #[error("invalid proof")]
    InvalidProof,

    /// Arguments could not be decoded or were out of domain.
    #[error("malformed instruction")]
    MalformedInstruction,

    /// The commitment tree is full. Indicates a tree height chosen too small.
    #[error("commitment tree capacity exceeded")]
    CapacityExceeded,

    /// Caller is not the configured admin.
    #[error("unauthorized")]
    Unauthorized,

    /// Denomination cannot change while deposits are outstanding.
    #[error("deposits outstanding: total value {0}")]
    OutstandingDeposits(Amount),

    /// The ledger was halted by an emergency withdrawal.
    #[error("ledger halted")]
    Halted,

    /// Custody does not hold enough value to pay out.
    #[error("insufficient custody value")]
    InsufficientCustody,

    /// Accepting the deposit would overflow the running total.
    #[error("total value overflow")]
    ValueOverflow,
}

impl RejectReason {
    /// Stable machine-readable code, used in notices and RPC responses.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::DenominationMismatch { .. } => "DenominationMismatch",
            Self::DuplicateCommitment => "DuplicateCommitment",
            Self::NullifierAlreadyUsed => "NullifierAlreadyUsed",
            Self::UnknownCommitment => "UnknownCommitment",
            Self::InvalidProof => "InvalidProof",
            Self::MalformedInstruction => "MalformedInstruction",
            Self::CapacityExceeded => "CapacityExceeded",
            Self::Unauthorized => "Unauthorized",
            Self::OutstandingDeposits(_) => "OutstandingDeposits",
            Self::Halted => "Halted",
            Self::InsufficientCustody => "InsufficientCustody",
            Self::ValueOverflow => "ValueOverflow",
        }
    }
}

/// Fatal errors. The host must stop processing when it sees one of these.
#[derive(Debug, Error)]
pub enum StateError {
    /// A ledger invariant no longer holds; continuing risks replica divergence.
    #[error("ledger invariant violated: {0}")]
    Invariant(&'static str),

    /// Configuration rejected at construction time.
    #[error("invalid configuration: {0}")]
    Config(&'static str),

    /// Internal commitment tree error.
    #[error("merkle error: {0}")]
    Merkle(#[from] TreeError),
}

/// Commitment tree errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum TreeError {
    /// The tree already holds `2^height` leaves.
    #[error("tree is full ({capacity} leaves)")]
    CapacityExceeded {
        /// Maximum number of leaves.
        capacity: u64,
    },

    /// Requested leaf index is not populated.
    #[error("leaf index {index} out of range (leaf count {len})")]
    IndexOutOfRange {
        /// Requested index.
        index: u64,
        /// Current leaf count.
        len: u64,
    },

    /// Tree storage is inconsistent with its leaf count.
    #[error("corrupt tree: {0}")]
    Corrupt(&'static str),
}

/// Read-only query errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum QueryError {
    /// Requested leaf index is not populated.
    #[error("leaf index {index} out of range (leaf count {len})")]
    IndexOutOfRange {
        /// Requested index.
        index: u64,
        /// Current leaf count.
        len: u64,
    },

    /// Page or limit outside the accepted range.
    #[error("invalid pagination: {0}")]
    InvalidPagination(&'static str),
}
