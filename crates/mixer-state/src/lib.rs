#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! Mixer state machine.
//!
//! Responsibilities:
//! - Maintain the append-only commitment tree
//! - Maintain the nullifier registry (spent tags)
//! - Decide each deposit / withdrawal / admin instruction and emit its effects
//! - Serve read-only queries between instructions
//!
//! Zero-knowledge proofs stay opaque here: they are passed to an injected
//! [`ProofVerifier`] together with the public inputs the ledger controls.

pub mod apply;
pub mod config;
pub mod error;
pub mod instruction;
pub mod ledger;
pub mod merkle;
pub mod nullifier;
pub mod query;
pub mod verifier;

pub use config::*;
pub use error::*;
pub use instruction::*;
pub use ledger::*;
pub use merkle::*;
pub use nullifier::*;
pub use query::*;
pub use verifier::*;
