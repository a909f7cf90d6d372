//! Instructions delivered by the host, and the effects emitted in response.

use borsh::{BorshDeserialize, BorshSerialize};
use mixer_core::{Address, Amount, Commitment, Nullifier};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::RejectReason;
use crate::merkle::MerklePath;

/// Opaque zero-knowledge proof bytes, handed to the verifier untouched.
#[derive(Clone, PartialEq, Eq, Debug, Default, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ZkProof(
    #[cfg_attr(feature = "serde", serde(with = "mixer_core::hex_bytes"))] pub Vec<u8>,
);

/// Reference to the accepted leaf a withdrawal spends from.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct InclusionProof {
    /// Commitment claimed to sit at `path.leaf_index`.
    pub commitment: Commitment,
    /// Path from that leaf to the current root.
    pub path: MerklePath,
}

/// Closed set of instructions the ledger understands.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "snake_case"))]
pub enum Instruction {
    /// Lock `amount` against `commitment`.
    Deposit {
        /// Must equal the current denomination.
        amount: Amount,
        /// New tree leaf.
        commitment: Commitment,
    },
    /// Pay `amount` to `recipient` by spending `nullifier`.
    Withdraw {
        /// One-time spend tag.
        nullifier: Nullifier,
        /// Payout address.
        recipient: Address,
        /// Must equal the current denomination.
        amount: Amount,
        /// Leaf reference checked against the current root.
        inclusion: InclusionProof,
        /// Evidence for the external verifier.
        proof: ZkProof,
    },
    /// Change the fixed denomination.
    SetDenomination {
        /// New denomination; must be positive.
        amount: Amount,
    },
    /// Halt deposits and withdrawals.
    EmergencyWithdraw,
}

impl Instruction {
    /// Short name used in logs and notices.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Deposit { .. } => "deposit",
            Self::Withdraw { .. } => "withdraw",
            Self::SetDenomination { .. } => "set_denomination",
            Self::EmergencyWithdraw => "emergency_withdraw",
        }
    }

    /// Whether the ledger gates this instruction on the configured admin.
    pub const fn requires_admin(&self) -> bool {
        matches!(self, Self::SetDenomination { .. } | Self::EmergencyWithdraw)
    }
}

/// Decode canonical Borsh instruction bytes.
///
/// Unknown variants, truncated input and trailing bytes all decode to
/// `MalformedInstruction`.
pub fn decode_instruction(bytes: &[u8]) -> Result<Instruction, RejectReason> {
    Instruction::try_from_slice(bytes).map_err(|_| RejectReason::MalformedInstruction)
}

/// Host-supplied context for one input.
#[derive(Clone, Copy, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct InputMetadata {
    /// Account that submitted the input.
    pub sender: Address,
    /// Position of the input in the host's ordered stream.
    pub input_index: u64,
    /// Logical timestamp assigned by the host.
    pub timestamp: u64,
}

/// Directed value movement for the host to execute.
#[derive(Clone, Copy, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Transfer {
    /// Source account.
    pub from: Address,
    /// Destination account.
    pub to: Address,
    /// Amount moved.
    pub amount: Amount,
}

/// Side effect emitted for the host.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Effect {
    /// Human-readable informational bytes.
    Notice(Vec<u8>),
    /// Fund movement. Only ever emitted on accept.
    Transfer(Transfer),
}

/// Terminal decision for one instruction.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Verdict {
    /// Instruction applied.
    Accept,
    /// Instruction rejected; ledger untouched.
    Reject(RejectReason),
}

/// Verdict plus the effects to emit, in order.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Outcome {
    /// Accept or reject.
    pub verdict: Verdict,
    /// Effects, in emission order.
    pub effects: Vec<Effect>,
}

impl Outcome {
    pub(crate) fn accept(effects: Vec<Effect>) -> Self {
        Self {
            verdict: Verdict::Accept,
            effects,
        }
    }

    pub(crate) fn reject(reason: RejectReason, notice: String) -> Self {
        Self {
            verdict: Verdict::Reject(reason),
            effects: vec![Effect::Notice(notice.into_bytes())],
        }
    }

    /// Whether the instruction was accepted.
    pub fn is_accept(&self) -> bool {
        self.verdict == Verdict::Accept
    }

    /// Rejection reason, if any.
    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self.verdict {
            Verdict::Accept => None,
            Verdict::Reject(reason) => Some(reason),
        }
    }

    /// Transfers carried by this outcome.
    pub fn transfers(&self) -> impl Iterator<Item = &Transfer> {
        self.effects.iter().filter_map(|e| match e {
            Effect::Transfer(t) => Some(t),
            Effect::Notice(_) => None,
        })
    }

    /// Notices carried by this outcome, lossily decoded.
    pub fn notices(&self) -> impl Iterator<Item = String> + '_ {
        self.effects.iter().filter_map(|e| match e {
            Effect::Notice(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
            Effect::Transfer(_) => None,
        })
    }
}
