use serde::Deserialize;
use serde::Serialize;

use super::job::Job;
use super::job::HEADER_NONCE_LEN;
use super::nonce::Nonce1;
use super::nonce::SolverNonce;

/// Everything a worker needs before it may start solving: the job, the
/// session nonce and its own nonce prefix.
///
/// A context only exists in complete form. Partial state (a job without
/// nonce1 or the other way around) stays on the frontend and is never sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiningContext {
    pub job: Job,
    pub nonce1: Nonce1,
    pub solver_nonce: SolverNonce,
}

impl MiningContext {
    pub fn new(job: Job, nonce1: Nonce1, solver_nonce: SolverNonce) -> Self {
        Self {
            job,
            nonce1,
            solver_nonce,
        }
    }

    /// number of nonce bytes left for the solver to enumerate, or `None` if
    /// nonce1 and the solver nonce already overflow the header nonce.
    pub fn nonce2_len(&self) -> Option<usize> {
        HEADER_NONCE_LEN.checked_sub(self.nonce1.len() + self.solver_nonce.len())
    }

    /// Number of distinct nonce2 values, saturating at `u64::MAX`. Zero if
    /// nonce1 and the solver nonce overflow the header nonce.
    pub fn nonce2_space(&self) -> u64 {
        match self.nonce2_len() {
            None => 0,
            Some(len) if len >= 8 => u64::MAX,
            Some(len) => 1u64 << (8 * len),
        }
    }
}
