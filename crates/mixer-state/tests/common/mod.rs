#![allow(dead_code)]

use mixer_core::{Address, Amount, Commitment, Nullifier};
use mixer_state::{
    DigestVerifier, InclusionProof, InputMetadata, Instruction, LedgerConfig, LedgerState,
    PublicInputs, TreeConfig,
};

pub const CUSTODY: Address = Address([0xcc; 20]);
pub const DEPOSITOR: Address = Address([0x11; 20]);
pub const RECIPIENT: Address = Address([0x22; 20]);

pub fn ledger(height: u8, denomination: u64) -> LedgerState {
    LedgerState::new(LedgerConfig {
        tree: TreeConfig::with_height(height),
        denomination: Amount::from_units(denomination),
        custody: CUSTODY,
        admin: None,
    })
    .expect("valid config")
}

pub fn meta(index: u64) -> InputMetadata {
    InputMetadata {
        sender: DEPOSITOR,
        input_index: index,
        timestamp: 1_700_000_000 + index,
    }
}

pub fn commitment(n: u8) -> Commitment {
    let mut bytes = [0u8; 32];
    bytes[0] = 0xc0;
    bytes[31] = n;
    Commitment(bytes)
}

pub fn nullifier(n: u8) -> Nullifier {
    let mut bytes = [0u8; 32];
    bytes[0] = 0x4e;
    bytes[31] = n;
    Nullifier(bytes)
}

pub fn deposit_ix(amount: u64, n: u8) -> Instruction {
    Instruction::Deposit {
        amount: Amount::from_units(amount),
        commitment: commitment(n),
    }
}

/// Withdrawal of leaf `leaf` with a development proof bound to the current root.
pub fn withdraw_ix(state: &LedgerState, leaf: u64, nf: Nullifier, amount: u64) -> Instruction {
    let record = *state.record(leaf).expect("leaf exists");
    let amount = Amount::from_units(amount);
    let proof = DigestVerifier::prove(&PublicInputs {
        root: state.root(),
        nullifier: nf,
        recipient: RECIPIENT,
        amount,
    })
    .expect("prove");
    Instruction::Withdraw {
        nullifier: nf,
        recipient: RECIPIENT,
        amount,
        inclusion: InclusionProof {
            commitment: record.commitment,
            path: state.tree().path(leaf).expect("path"),
        },
        proof,
    }
}
