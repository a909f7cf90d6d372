//! Withdrawal proof verification capability.
//!
//! The ledger never looks inside a proof. It hands the public inputs and the
//! proof bytes to a [`ProofVerifier`] and treats anything but `Ok(true)` as a
//! rejection. Implementations must be pure: same inputs, same answer, on every
//! replica. The verification key / circuit is pinned at construction.

use borsh::{BorshDeserialize, BorshSerialize};
use mixer_core::{hash32, to_bytes, Address, Amount, CoreError, Hash32, Nullifier, DS_MOCK_PROOF};
use thiserror::Error;

use crate::instruction::ZkProof;

/// Public inputs bound by a withdrawal proof.
#[derive(Clone, Copy, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct PublicInputs {
    /// Commitment tree root at verification time.
    pub root: Hash32,
    /// Nullifier being spent.
    pub nullifier: Nullifier,
    /// Payout address.
    pub recipient: Address,
    /// Payout amount.
    pub amount: Amount,
}

/// Verifier failure (as opposed to a clean "proof is false").
#[derive(Debug, Error)]
pub enum VerifierError {
    /// Proof bytes could not be parsed by the verifier.
    #[error("malformed proof: {0}")]
    MalformedProof(&'static str),

    /// Public inputs could not be encoded.
    #[error("public input encoding failed: {0}")]
    Encoding(#[from] CoreError),
}

/// Pure proof verification function.
pub trait ProofVerifier {
    /// Check `proof` against `inputs`.
    fn verify(&self, inputs: &PublicInputs, proof: &ZkProof) -> Result<bool, VerifierError>;
}

impl<V: ProofVerifier + ?Sized> ProofVerifier for &V {
    fn verify(&self, inputs: &PublicInputs, proof: &ZkProof) -> Result<bool, VerifierError> {
        (**self).verify(inputs, proof)
    }
}

/// Development verifier: a proof is the domain-separated hash of its public inputs.
///
/// It proves nothing about knowledge of a commitment opening. Devnets and tests only.
#[derive(Clone, Copy, Debug, Default)]
pub struct DigestVerifier;

impl DigestVerifier {
    /// Build the proof this verifier accepts for `inputs`.
    pub fn prove(inputs: &PublicInputs) -> Result<ZkProof, VerifierError> {
        let bytes = to_bytes(inputs)?;
        Ok(ZkProof(hash32(DS_MOCK_PROOF, &bytes).as_bytes().to_vec()))
    }
}

impl ProofVerifier for DigestVerifier {
    fn verify(&self, inputs: &PublicInputs, proof: &ZkProof) -> Result<bool, VerifierError> {
        if proof.0.len() != 32 {
            return Err(VerifierError::MalformedProof("expected 32 bytes"));
        }
        Ok(Self::prove(inputs)? == *proof)
    }
}
