//! Single-writer host around the ledger.
//!
//! Assigns input indices and logical timestamps, routes every input through
//! one `LedgerState`, and refuses further input after a fatal error.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{anyhow, bail, Context};
use mixer_core::Address;
use mixer_state::{
    DigestVerifier, InputMetadata, Instruction, LedgerConfig, LedgerState, Outcome, QueryService,
    StateError,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{error, info, warn};

/// One input as it appears in a replay log or a `submit` request.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    /// Submitting account.
    pub sender: Address,
    /// Logical timestamp. Only replay logs carry one; live requests are
    /// stamped by the node clock.
    #[serde(default)]
    pub timestamp: Option<u64>,
    /// Instruction object, decoded separately so a bad one is still an input.
    pub instruction: Value,
}

/// Result of one processed input.
#[derive(Debug)]
pub struct Submission {
    /// Position in the input stream.
    pub input_index: u64,
    /// Timestamp the ledger saw.
    pub timestamp: u64,
    /// Verdict and effects.
    pub outcome: Outcome,
}

/// Counts from a replayed log.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStats {
    pub accepted: u64,
    pub rejected: u64,
}

pub struct Node {
    ledger: LedgerState,
    verifier: DigestVerifier,
    next_input: u64,
    last_timestamp: u64,
    max_idle_secs: u64,
    fatal: Option<String>,
}

impl Node {
    pub fn new(config: LedgerConfig, max_idle_secs: u64) -> Result<Self, StateError> {
        Ok(Self {
            ledger: LedgerState::new(config)?,
            verifier: DigestVerifier,
            next_input: 0,
            last_timestamp: 0,
            max_idle_secs,
            fatal: None,
        })
    }

    pub fn ledger(&self) -> &LedgerState {
        &self.ledger
    }

    pub fn query(&self) -> QueryService<'_> {
        QueryService::new(&self.ledger)
    }

    pub fn max_idle_secs(&self) -> u64 {
        self.max_idle_secs
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal.is_some()
    }

    /// Apply a decoded instruction.
    pub fn submit(
        &mut self,
        sender: Address,
        timestamp: u64,
        ix: &Instruction,
    ) -> anyhow::Result<Submission> {
        let verifier = self.verifier;
        self.process(sender, timestamp, |ledger, meta| {
            ledger.apply(&verifier, meta, ix)
        })
    }

    /// Apply canonical Borsh instruction bytes.
    pub fn submit_raw(
        &mut self,
        sender: Address,
        timestamp: u64,
        bytes: &[u8],
    ) -> anyhow::Result<Submission> {
        let verifier = self.verifier;
        self.process(sender, timestamp, |ledger, meta| {
            ledger.apply_raw(&verifier, meta, bytes)
        })
    }

    /// Apply an envelope at `timestamp`, turning an undecodable instruction
    /// into a rejection. The envelope's own timestamp is not consulted.
    pub fn submit_envelope(
        &mut self,
        env: Envelope,
        timestamp: u64,
    ) -> anyhow::Result<Submission> {
        match serde_json::from_value::<Instruction>(env.instruction) {
            Ok(ix) => self.submit(env.sender, timestamp, &ix),
            Err(e) => {
                let detail = e.to_string();
                self.process(env.sender, timestamp, |ledger, meta| {
                    ledger.reject_malformed(meta, &detail)
                })
            }
        }
    }

    /// Replay a newline-delimited JSON log of envelopes. Blank lines are skipped.
    pub fn replay_reader<R: BufRead>(&mut self, reader: R) -> anyhow::Result<ReplayStats> {
        let mut stats = ReplayStats::default();
        for (n, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("reading replay line {}", n + 1))?;
            if line.trim().is_empty() {
                continue;
            }
            let env: Envelope = serde_json::from_str(&line)
                .with_context(|| format!("replay line {} is not an input envelope", n + 1))?;
            let timestamp = env.timestamp.unwrap_or(self.last_timestamp);
            let submission = self.submit_envelope(env, timestamp)?;
            if submission.outcome.is_accept() {
                stats.accepted += 1;
            } else {
                stats.rejected += 1;
            }
        }
        Ok(stats)
    }

    pub fn replay_file(&mut self, path: &Path) -> anyhow::Result<ReplayStats> {
        let file =
            File::open(path).with_context(|| format!("opening replay log {}", path.display()))?;
        let stats = self.replay_reader(BufReader::new(file))?;
        info!(
            path = %path.display(),
            accepted = stats.accepted,
            rejected = stats.rejected,
            "replay complete"
        );
        Ok(stats)
    }

    fn process<F>(&mut self, sender: Address, timestamp: u64, f: F) -> anyhow::Result<Submission>
    where
        F: FnOnce(&mut LedgerState, &InputMetadata) -> Result<Outcome, StateError>,
    {
        if let Some(reason) = &self.fatal {
            bail!("ledger stopped after fatal error: {reason}");
        }
        if timestamp < self.last_timestamp {
            warn!(
                timestamp,
                last = self.last_timestamp,
                "timestamp went backwards; clamping"
            );
        }
        let meta = InputMetadata {
            sender,
            input_index: self.next_input,
            timestamp: timestamp.max(self.last_timestamp),
        };
        match f(&mut self.ledger, &meta) {
            Ok(outcome) => {
                self.next_input += 1;
                self.last_timestamp = meta.timestamp;
                Ok(Submission {
                    input_index: meta.input_index,
                    timestamp: meta.timestamp,
                    outcome,
                })
            }
            Err(e) => {
                error!(input = meta.input_index, error = %e, "fatal ledger error; refusing further input");
                self.fatal = Some(e.to_string());
                Err(anyhow!(e))
            }
        }
    }
}
