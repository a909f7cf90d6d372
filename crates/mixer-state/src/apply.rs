//! Deposit / withdrawal state machine.
//!
//! Each input runs to a terminal Accept or Reject before the next one is
//! looked at. Every check happens before the first mutation, so a rejected
//! input leaves the ledger byte-identical. Effects are built only from
//! already-validated values.

use mixer_core::{Address, Amount, Commitment, Nullifier};
use tracing::{debug, error, info};

use crate::error::{RejectReason, StateError, TreeError};
use crate::instruction::{
    decode_instruction, Effect, InclusionProof, InputMetadata, Instruction, Outcome, Transfer,
    ZkProof,
};
use crate::ledger::{DepositRecord, LedgerState};
use crate::verifier::{ProofVerifier, PublicInputs};

/// Withdrawal arguments, borrowed from the instruction.
struct WithdrawArgs<'a> {
    nullifier: &'a Nullifier,
    recipient: &'a Address,
    amount: Amount,
    inclusion: &'a InclusionProof,
    proof: &'a ZkProof,
}

impl LedgerState {
    /// Apply one decoded instruction.
    ///
    /// `Ok` carries the verdict and effects; rejections are not errors.
    /// `Err` means a ledger invariant broke and the host must halt.
    pub fn apply<V: ProofVerifier + ?Sized>(
        &mut self,
        verifier: &V,
        meta: &InputMetadata,
        ix: &Instruction,
    ) -> Result<Outcome, StateError> {
        let outcome = match ix {
            Instruction::Deposit { amount, commitment } => {
                self.apply_deposit(meta, *amount, commitment)?
            }
            Instruction::Withdraw {
                nullifier,
                recipient,
                amount,
                inclusion,
                proof,
            } => self.apply_withdraw(
                verifier,
                meta,
                &WithdrawArgs {
                    nullifier,
                    recipient,
                    amount: *amount,
                    inclusion,
                    proof,
                },
            )?,
            Instruction::SetDenomination { amount } => self.apply_set_denomination(meta, *amount),
            Instruction::EmergencyWithdraw => self.apply_emergency_withdraw(meta),
        };

        if let Some(reason) = outcome.reject_reason() {
            match reason {
                RejectReason::CapacityExceeded => error!(
                    input = meta.input_index,
                    instruction = ix.name(),
                    "commitment tree full; tree height is too small for this deployment"
                ),
                _ => info!(
                    input = meta.input_index,
                    instruction = ix.name(),
                    reason = reason.code(),
                    "instruction rejected"
                ),
            }
        } else {
            debug!(
                input = meta.input_index,
                instruction = ix.name(),
                root = %self.root(),
                total_value = self.total_value.units(),
                "instruction accepted"
            );
        }

        self.finish(meta, outcome)
    }

    /// Decode canonical instruction bytes and apply them.
    pub fn apply_raw<V: ProofVerifier + ?Sized>(
        &mut self,
        verifier: &V,
        meta: &InputMetadata,
        bytes: &[u8],
    ) -> Result<Outcome, StateError> {
        match decode_instruction(bytes) {
            Ok(ix) => self.apply(verifier, meta, &ix),
            Err(_) => self.reject_malformed(meta, "undecodable instruction bytes"),
        }
    }

    /// Reject an input the host could not decode.
    pub fn reject_malformed(
        &mut self,
        meta: &InputMetadata,
        detail: &str,
    ) -> Result<Outcome, StateError> {
        info!(input = meta.input_index, detail, "malformed instruction");
        let reason = RejectReason::MalformedInstruction;
        let outcome = Outcome::reject(reason, format!("rejected {}: {detail}", reason.code()));
        self.finish(meta, outcome)
    }

    fn finish(&mut self, meta: &InputMetadata, outcome: Outcome) -> Result<Outcome, StateError> {
        if let Err(e) = self.check_invariants() {
            error!(input = meta.input_index, error = %e, "ledger invariant violated; halting");
            return Err(e);
        }
        self.last_processed_at = Some(meta.timestamp);
        self.processed = self.processed.saturating_add(1);
        Ok(outcome)
    }

    fn apply_deposit(
        &mut self,
        meta: &InputMetadata,
        amount: Amount,
        commitment: &Commitment,
    ) -> Result<Outcome, StateError> {
        if let Err(reason) = self.check_deposit(amount, commitment) {
            return Ok(reject(reason, "deposit"));
        }
        let Ok(new_total) = self.total_value.checked_add(self.denomination) else {
            return Ok(reject(RejectReason::ValueOverflow, "deposit"));
        };

        let leaf_index = match self.tree.insert((*commitment).into()) {
            Ok(index) => index,
            // Checked above; reaching this means the tree and records disagree.
            Err(TreeError::CapacityExceeded { .. }) => {
                return Err(StateError::Invariant("tree full after capacity check"))
            }
            Err(e) => return Err(e.into()),
        };
        if leaf_index != self.deposit_count() {
            return Err(StateError::Invariant("leaf index out of step with records"));
        }

        self.records.push(DepositRecord {
            commitment: *commitment,
            leaf_index,
            accepted_at: meta.timestamp,
        });
        self.by_commitment.insert(*commitment, leaf_index);
        self.total_value = new_total;

        Ok(Outcome::accept(vec![
            notice(format!(
                "deposit accepted: leaf_index={leaf_index} commitment={commitment} root={}",
                self.root()
            )),
            Effect::Transfer(Transfer {
                from: meta.sender,
                to: self.config.custody,
                amount,
            }),
        ]))
    }

    fn check_deposit(&self, amount: Amount, commitment: &Commitment) -> Result<(), RejectReason> {
        if self.halted {
            return Err(RejectReason::Halted);
        }
        self.check_denomination(amount)?;
        if self.contains_commitment(commitment) {
            return Err(RejectReason::DuplicateCommitment);
        }
        if self.tree.is_full() {
            return Err(RejectReason::CapacityExceeded);
        }
        Ok(())
    }

    fn apply_withdraw<V: ProofVerifier + ?Sized>(
        &mut self,
        verifier: &V,
        meta: &InputMetadata,
        args: &WithdrawArgs<'_>,
    ) -> Result<Outcome, StateError> {
        let new_total = match self.check_withdraw(verifier, args) {
            Ok(total) => total,
            Err(reason) => return Ok(reject(reason, "withdraw")),
        };

        if !self.nullifiers.record(*args.nullifier) {
            return Err(StateError::Invariant("nullifier recorded twice"));
        }
        self.total_value = new_total;

        debug!(input = meta.input_index, nullifier = %args.nullifier, "nullifier spent");

        Ok(Outcome::accept(vec![
            notice(format!(
                "withdrawal accepted: nullifier={} recipient={}",
                args.nullifier, args.recipient
            )),
            Effect::Transfer(Transfer {
                from: self.config.custody,
                to: *args.recipient,
                amount: args.amount,
            }),
        ]))
    }

    /// All withdrawal checks, in order. Returns the post-withdrawal total.
    ///
    /// The verifier runs after every structural check and before any mutation.
    fn check_withdraw<V: ProofVerifier + ?Sized>(
        &self,
        verifier: &V,
        args: &WithdrawArgs<'_>,
    ) -> Result<Amount, RejectReason> {
        if self.halted {
            return Err(RejectReason::Halted);
        }
        self.check_denomination(args.amount)?;
        if self.nullifiers.contains(args.nullifier) {
            return Err(RejectReason::NullifierAlreadyUsed);
        }
        if !self.inclusion_resolves(args.inclusion) {
            return Err(RejectReason::UnknownCommitment);
        }

        let inputs = PublicInputs {
            root: self.root(),
            nullifier: *args.nullifier,
            recipient: *args.recipient,
            amount: args.amount,
        };
        match verifier.verify(&inputs, args.proof) {
            Ok(true) => {}
            Ok(false) => return Err(RejectReason::InvalidProof),
            Err(e) => {
                info!(error = %e, "proof verifier failed");
                return Err(RejectReason::InvalidProof);
            }
        }

        self.total_value
            .checked_sub(args.amount)
            .map_err(|_| RejectReason::InsufficientCustody)
    }

    /// The proof must name an accepted leaf and its path must walk to the current root.
    fn inclusion_resolves(&self, inclusion: &InclusionProof) -> bool {
        let Some(record) = self.record(inclusion.path.leaf_index) else {
            return false;
        };
        record.commitment == inclusion.commitment
            && inclusion
                .path
                .verify(self.tree.config(), inclusion.commitment.into(), &self.root())
    }

    fn check_denomination(&self, amount: Amount) -> Result<(), RejectReason> {
        if amount == self.denomination {
            Ok(())
        } else {
            Err(RejectReason::DenominationMismatch {
                expected: self.denomination,
                got: amount,
            })
        }
    }

    fn check_admin(&self, sender: &Address) -> Result<(), RejectReason> {
        match self.config.admin {
            Some(admin) if admin != *sender => Err(RejectReason::Unauthorized),
            Some(_) | None => Ok(()),
        }
    }

    fn apply_set_denomination(&mut self, meta: &InputMetadata, amount: Amount) -> Outcome {
        if amount.is_zero() {
            return reject(RejectReason::MalformedInstruction, "set_denomination");
        }
        if let Err(reason) = self.check_admin(&meta.sender) {
            return reject(reason, "set_denomination");
        }
        if !self.total_value.is_zero() {
            return reject(
                RejectReason::OutstandingDeposits(self.total_value),
                "set_denomination",
            );
        }

        let previous = self.denomination;
        self.denomination = amount;
        info!(from = previous.units(), to = amount.units(), "denomination changed");
        Outcome::accept(vec![notice(format!(
            "denomination changed from {previous} to {amount}"
        ))])
    }

    fn apply_emergency_withdraw(&mut self, meta: &InputMetadata) -> Outcome {
        if let Err(reason) = self.check_admin(&meta.sender) {
            return reject(reason, "emergency_withdraw");
        }
        // TODO: open a proof-free redemption path for outstanding depositors
        // once its unlinkability requirements are designed.
        self.halted = true;
        info!(
            outstanding = self.total_value.units(),
            "emergency withdraw: deposits and withdrawals halted"
        );
        Outcome::accept(vec![notice(format!(
            "emergency withdraw: ledger halted with {} outstanding",
            self.total_value
        ))])
    }
}

fn notice(text: String) -> Effect {
    Effect::Notice(text.into_bytes())
}

fn reject(reason: RejectReason, what: &str) -> Outcome {
    Outcome::reject(reason, format!("{what} rejected: {} ({reason})", reason.code()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::instruction::Verdict;
    use crate::merkle::TreeConfig;
    use crate::verifier::{DigestVerifier, VerifierError};
    use mixer_core::Hash32;

    struct RejectAll;

    impl ProofVerifier for RejectAll {
        fn verify(&self, _: &PublicInputs, _: &ZkProof) -> Result<bool, VerifierError> {
            Ok(false)
        }
    }

    struct Broken;

    impl ProofVerifier for Broken {
        fn verify(&self, _: &PublicInputs, _: &ZkProof) -> Result<bool, VerifierError> {
            Err(VerifierError::MalformedProof("test"))
        }
    }

    /// Development verifier that counts how often it is consulted.
    #[derive(Default)]
    struct Counting {
        calls: std::cell::Cell<u32>,
    }

    impl ProofVerifier for Counting {
        fn verify(&self, inputs: &PublicInputs, proof: &ZkProof) -> Result<bool, VerifierError> {
            self.calls.set(self.calls.get() + 1);
            DigestVerifier.verify(inputs, proof)
        }
    }

    const ADMIN: Address = Address([0xad; 20]);
    const CUSTODY: Address = Address([0xcc; 20]);

    fn ledger(height: u8) -> LedgerState {
        LedgerState::new(LedgerConfig {
            tree: TreeConfig::with_height(height),
            denomination: Amount::from_units(1),
            custody: CUSTODY,
            admin: Some(ADMIN),
        })
        .unwrap()
    }

    fn meta(index: u64) -> InputMetadata {
        InputMetadata {
            sender: Address([0x11; 20]),
            input_index: index,
            timestamp: 1_000 + index,
        }
    }

    fn admin_meta(index: u64) -> InputMetadata {
        InputMetadata {
            sender: ADMIN,
            ..meta(index)
        }
    }

    fn deposit(state: &mut LedgerState, n: u8) -> Outcome {
        let ix = Instruction::Deposit {
            amount: state.denomination(),
            commitment: Commitment([n; 32]),
        };
        state.apply(&DigestVerifier, &meta(u64::from(n)), &ix).unwrap()
    }

    fn withdraw_ix(state: &LedgerState, leaf: u64, nf: u8) -> Instruction {
        let record = *state.record(leaf).unwrap();
        let recipient = Address([0x22; 20]);
        let nullifier = Nullifier([nf; 32]);
        let proof = DigestVerifier::prove(&PublicInputs {
            root: state.root(),
            nullifier,
            recipient,
            amount: state.denomination(),
        })
        .unwrap();
        Instruction::Withdraw {
            nullifier,
            recipient,
            amount: state.denomination(),
            inclusion: InclusionProof {
                commitment: record.commitment,
                path: state.tree().path(leaf).unwrap(),
            },
            proof,
        }
    }

    #[test]
    fn deposit_emits_notice_then_transfer_to_custody() {
        let mut state = ledger(4);
        let out = deposit(&mut state, 1);
        assert_eq!(out.verdict, Verdict::Accept);
        let transfers: Vec<_> = out.transfers().copied().collect();
        assert_eq!(
            transfers,
            vec![Transfer {
                from: Address([0x11; 20]),
                to: CUSTODY,
                amount: Amount::from_units(1),
            }]
        );
        assert!(matches!(out.effects.first(), Some(Effect::Notice(_))));
        assert_eq!(state.record(0).unwrap().accepted_at, 1_001);
    }

    #[test]
    fn full_tree_rejects_without_mutation() {
        let mut state = ledger(1);
        assert!(deposit(&mut state, 1).is_accept());
        assert!(deposit(&mut state, 2).is_accept());
        let digest = state.state_digest().unwrap();
        let out = deposit(&mut state, 3);
        assert_eq!(out.reject_reason(), Some(RejectReason::CapacityExceeded));
        assert_eq!(state.state_digest().unwrap(), digest);
        assert_eq!(out.transfers().count(), 0);
    }

    #[test]
    fn failing_verifier_leaves_registry_untouched() {
        let mut state = ledger(4);
        deposit(&mut state, 1);
        let ix = withdraw_ix(&state, 0, 7);
        for verifier in [&RejectAll as &dyn ProofVerifier, &Broken] {
            let out = state.apply(verifier, &meta(10), &ix).unwrap();
            assert_eq!(out.reject_reason(), Some(RejectReason::InvalidProof));
            assert!(!state.is_spent(&Nullifier([7; 32])));
            assert_eq!(state.total_value(), Amount::from_units(1));
        }
    }

    #[test]
    fn proof_is_bound_to_root_at_verification_time() {
        let mut state = ledger(4);
        deposit(&mut state, 1);
        let stale = withdraw_ix(&state, 0, 7);
        deposit(&mut state, 2);
        // Path was built for the old root as well, so it no longer resolves.
        let out = state.apply(&DigestVerifier, &meta(10), &stale).unwrap();
        assert_eq!(out.reject_reason(), Some(RejectReason::UnknownCommitment));
    }

    #[test]
    fn inclusion_must_match_record_and_root() {
        let mut state = ledger(4);
        deposit(&mut state, 1);
        deposit(&mut state, 2);

        let Instruction::Withdraw {
            nullifier,
            recipient,
            amount,
            mut inclusion,
            proof,
        } = withdraw_ix(&state, 1, 7)
        else {
            unreachable!()
        };

        // Real leaf, wrong commitment.
        inclusion.commitment = Commitment([1; 32]);
        let ix = Instruction::Withdraw {
            nullifier,
            recipient,
            amount,
            inclusion: inclusion.clone(),
            proof: proof.clone(),
        };
        let out = state.apply(&DigestVerifier, &meta(10), &ix).unwrap();
        assert_eq!(out.reject_reason(), Some(RejectReason::UnknownCommitment));

        // Right commitment, tampered sibling.
        inclusion.commitment = Commitment([2; 32]);
        inclusion.path.nodes[0].sibling = Hash32([0xff; 32]);
        let ix = Instruction::Withdraw {
            nullifier,
            recipient,
            amount,
            inclusion,
            proof,
        };
        let out = state.apply(&DigestVerifier, &meta(11), &ix).unwrap();
        assert_eq!(out.reject_reason(), Some(RejectReason::UnknownCommitment));
    }

    #[test]
    fn custody_cannot_go_negative() {
        let mut state = ledger(4);
        deposit(&mut state, 1);
        let first = withdraw_ix(&state, 0, 7);
        assert!(state.apply(&DigestVerifier, &meta(10), &first).unwrap().is_accept());
        // Same leaf, fresh nullifier: the development verifier does not bind
        // nullifiers to leaves, the custody total still caps payouts.
        let second = withdraw_ix(&state, 0, 8);
        let out = state.apply(&DigestVerifier, &meta(11), &second).unwrap();
        assert_eq!(out.reject_reason(), Some(RejectReason::InsufficientCustody));
        assert_eq!(state.total_value(), Amount::zero());
    }

    #[test]
    fn set_denomination_is_gated() {
        let mut state = ledger(4);
        let ix = Instruction::SetDenomination {
            amount: Amount::from_units(5),
        };

        let out = state.apply(&DigestVerifier, &meta(0), &ix).unwrap();
        assert_eq!(out.reject_reason(), Some(RejectReason::Unauthorized));

        deposit(&mut state, 1);
        let out = state.apply(&DigestVerifier, &admin_meta(2), &ix).unwrap();
        assert_eq!(
            out.reject_reason(),
            Some(RejectReason::OutstandingDeposits(Amount::from_units(1)))
        );

        let zero = Instruction::SetDenomination {
            amount: Amount::zero(),
        };
        let out = state.apply(&DigestVerifier, &admin_meta(3), &zero).unwrap();
        assert_eq!(out.reject_reason(), Some(RejectReason::MalformedInstruction));
        assert_eq!(state.denomination(), Amount::from_units(1));
    }

    #[test]
    fn set_denomination_applies_when_custody_empty() {
        let mut state = ledger(4);
        let ix = Instruction::SetDenomination {
            amount: Amount::from_units(5),
        };
        let out = state.apply(&DigestVerifier, &admin_meta(0), &ix).unwrap();
        assert!(out.is_accept());
        assert_eq!(out.transfers().count(), 0);
        assert_eq!(state.denomination(), Amount::from_units(5));
    }

    #[test]
    fn emergency_withdraw_halts_deposits_and_withdrawals() {
        let mut state = ledger(4);
        deposit(&mut state, 1);
        let wd = withdraw_ix(&state, 0, 7);

        let out = state
            .apply(&DigestVerifier, &meta(5), &Instruction::EmergencyWithdraw)
            .unwrap();
        assert_eq!(out.reject_reason(), Some(RejectReason::Unauthorized));

        let out = state
            .apply(&DigestVerifier, &admin_meta(6), &Instruction::EmergencyWithdraw)
            .unwrap();
        assert!(out.is_accept());
        assert!(state.is_halted());

        assert_eq!(deposit(&mut state, 2).reject_reason(), Some(RejectReason::Halted));
        let out = state.apply(&DigestVerifier, &meta(8), &wd).unwrap();
        assert_eq!(out.reject_reason(), Some(RejectReason::Halted));
    }

    #[test]
    fn raw_garbage_is_malformed_and_counted() {
        let mut state = ledger(4);
        let out = state.apply_raw(&DigestVerifier, &meta(0), &[0xff, 0x00]).unwrap();
        assert_eq!(out.reject_reason(), Some(RejectReason::MalformedInstruction));
        assert_eq!(out.notices().count(), 1);
        assert_eq!(state.processed_count(), 1);
        assert_eq!(state.last_processed_at(), Some(1_000));
    }

    #[test]
    fn verifier_runs_only_after_structural_checks() {
        let mut state = ledger(4);
        deposit(&mut state, 1);
        deposit(&mut state, 2);
        let verifier = Counting::default();

        // Wrong amount.
        let Instruction::Withdraw {
            nullifier,
            recipient,
            inclusion,
            proof,
            ..
        } = withdraw_ix(&state, 0, 7)
        else {
            unreachable!()
        };
        let wrong_amount = Instruction::Withdraw {
            nullifier,
            recipient,
            amount: Amount::from_units(2),
            inclusion: inclusion.clone(),
            proof: proof.clone(),
        };
        let out = state.apply(&verifier, &meta(10), &wrong_amount).unwrap();
        assert!(matches!(
            out.reject_reason(),
            Some(RejectReason::DenominationMismatch { .. })
        ));
        assert_eq!(verifier.calls.get(), 0);

        // Unknown leaf.
        let mut unknown = inclusion;
        unknown.path.leaf_index = 9;
        let unknown_leaf = Instruction::Withdraw {
            nullifier,
            recipient,
            amount: Amount::from_units(1),
            inclusion: unknown,
            proof,
        };
        let out = state.apply(&verifier, &meta(11), &unknown_leaf).unwrap();
        assert_eq!(out.reject_reason(), Some(RejectReason::UnknownCommitment));
        assert_eq!(verifier.calls.get(), 0);

        // Accepted: exactly one call.
        let ok = withdraw_ix(&state, 0, 7);
        assert!(state.apply(&verifier, &meta(12), &ok).unwrap().is_accept());
        assert_eq!(verifier.calls.get(), 1);

        // Spent nullifier.
        let replay = withdraw_ix(&state, 1, 7);
        let out = state.apply(&verifier, &meta(13), &replay).unwrap();
        assert_eq!(out.reject_reason(), Some(RejectReason::NullifierAlreadyUsed));
        assert_eq!(verifier.calls.get(), 1);

        // Halted.
        let halt = Instruction::EmergencyWithdraw;
        assert!(state.apply(&verifier, &admin_meta(14), &halt).unwrap().is_accept());
        let halted = withdraw_ix(&state, 1, 8);
        let out = state.apply(&verifier, &meta(15), &halted).unwrap();
        assert_eq!(out.reject_reason(), Some(RejectReason::Halted));
        assert_eq!(verifier.calls.get(), 1);
    }
}
