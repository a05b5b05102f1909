//! The interface between the worker loop and a proof-of-work solver.
//!
//! A solver is constructed once per worker, inside the worker, and then
//! invoked repeatedly for one bounded batch of attempts at a time. The
//! worker loop re-polls for a new job between two invocations, so a batch
//! should be short enough to keep job switches responsive.

pub mod sha256d;

use serde::Deserialize;
use serde::Serialize;

use crate::models::device::DeviceId;
use crate::models::mining_context::MiningContext;

/// Which solver implementation a worker should instantiate. This is what
/// crosses the process boundary, not the solver itself.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "kebab-case")]
pub enum SolverKind {
    /// double SHA-256 over the block header, on the CPU
    #[default]
    Sha256d,
}

/// A candidate found by a solver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solution {
    pub nonce2: Vec<u8>,
    pub payload: Vec<u8>,
}

/// Outcome of one bounded solver invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SolveBatch {
    /// number of candidates tried, solutions included
    pub attempts: u64,
    pub solutions: Vec<Solution>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SolverError {
    #[error("device {device} is not available: {reason}")]
    DeviceUnavailable { device: DeviceId, reason: String },

    #[error(
        "no nonce space left: nonce1 ({nonce1_len} bytes) and solver nonce \
        ({solver_nonce_len} bytes) fill the whole header nonce"
    )]
    NonceSpaceExhausted {
        nonce1_len: usize,
        solver_nonce_len: usize,
    },

    #[error("solver failed: {0}")]
    Failed(String),
}

pub trait Solver: Send + Sized {
    /// Bind a solver to `device`. `verbose` enables the solver's own
    /// diagnostics.
    fn new(device: DeviceId, verbose: bool) -> Result<Self, SolverError>;

    /// Try one batch of nonce2 values, starting at counter `first_nonce2`
    /// and trying at most `max_attempts` of them.
    ///
    /// Must return after a bounded amount of work.
    fn solve(
        &mut self,
        context: &MiningContext,
        first_nonce2: u64,
        max_attempts: u64,
    ) -> Result<SolveBatch, SolverError>;
}
