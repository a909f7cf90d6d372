mod common;

use common::*;
use mixer_core::{hash_pair, zero_leaf, Commitment, Hash32};
use mixer_state::{DigestVerifier, Instruction, QueryService};
use proptest::prelude::*;

const HEIGHT: u8 = 6;

/// Naive full-tree evaluation: every node recomputed from scratch.
fn reference_node(leaves: &[Hash32], level: u8, index: usize) -> Hash32 {
    if level == 0 {
        return leaves.get(index).copied().unwrap_or_else(zero_leaf);
    }
    let left = reference_node(leaves, level - 1, 2 * index);
    let right = reference_node(leaves, level - 1, 2 * index + 1);
    hash_pair(&left, &right)
}

fn dedup_in_order(raw: Vec<[u8; 32]>) -> Vec<Commitment> {
    let mut seen = std::collections::BTreeSet::new();
    raw.into_iter()
        .filter(|b| seen.insert(*b))
        .map(Commitment)
        .collect()
}

proptest! {
    #[test]
    fn replayed_root_matches_reference(raw in prop::collection::vec(any::<[u8; 32]>(), 0..=64)) {
        let commitments = dedup_in_order(raw);
        let mut state = ledger(HEIGHT, 1);
        for (i, cm) in commitments.iter().enumerate() {
            let ix = Instruction::Deposit { amount: state.denomination(), commitment: *cm };
            let out = state.apply(&DigestVerifier, &meta(i as u64), &ix).expect("apply");
            prop_assert!(out.is_accept());
            prop_assert_eq!(out.transfers().count(), 1);
        }

        let leaves: Vec<Hash32> = commitments.iter().map(|c| (*c).into()).collect();
        prop_assert_eq!(state.root(), reference_node(&leaves, HEIGHT, 0));
        prop_assert!(state.audit().is_ok());

        let q = QueryService::new(&state);
        for (i, leaf) in leaves.iter().enumerate() {
            let path = q.inclusion_path(i as u64).expect("path");
            prop_assert!(path.verify(state.tree_config(), *leaf, &state.root()));
        }
    }

    #[test]
    fn duplicate_commitment_never_moves_the_root(
        raw in prop::collection::vec(any::<[u8; 32]>(), 1..=16),
        pick in any::<prop::sample::Index>(),
    ) {
        let commitments = dedup_in_order(raw);
        let mut state = ledger(HEIGHT, 1);
        for (i, cm) in commitments.iter().enumerate() {
            let ix = Instruction::Deposit { amount: state.denomination(), commitment: *cm };
            state.apply(&DigestVerifier, &meta(i as u64), &ix).expect("apply");
        }
        let root = state.root();
        let count = state.deposit_count();

        let dup = commitments[pick.index(commitments.len())];
        let ix = Instruction::Deposit { amount: state.denomination(), commitment: dup };
        let out = state.apply(&DigestVerifier, &meta(99), &ix).expect("apply");
        prop_assert!(!out.is_accept());
        prop_assert_eq!(state.root(), root);
        prop_assert_eq!(state.deposit_count(), count);
    }
}

#[test]
fn empty_tree_matches_reference() {
    let state = ledger(HEIGHT, 1);
    assert_eq!(state.root(), reference_node(&[], HEIGHT, 0));
}
