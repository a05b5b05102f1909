use sha2::Digest;
use sha2::Sha256;
use tracing::trace;

use super::SolveBatch;
use super::Solution;
use super::Solver;
use super::SolverError;
use crate::models::device::DeviceId;
use crate::models::job::HEADER_NONCE_LEN;
use crate::models::job::HEADER_PREFIX_LEN;
use crate::models::mining_context::MiningContext;

/// Number of nonce2 values tried per invocation.
pub const DEFAULT_BATCH_SIZE: u64 = 1 << 14;

/// Reference solver: searches nonce2 values whose double SHA-256 header
/// digest meets the job's share target.
///
/// It ignores the device it is bound to and runs on the calling thread.
#[derive(Debug)]
pub struct Sha256dSolver {
    device: DeviceId,
    verbose: bool,
    batch_size: u64,
}

impl Sha256dSolver {
    pub fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

impl Solver for Sha256dSolver {
    fn new(device: DeviceId, verbose: bool) -> Result<Self, SolverError> {
        Ok(Self {
            device,
            verbose,
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    fn solve(
        &mut self,
        context: &MiningContext,
        first_nonce2: u64,
        max_attempts: u64,
    ) -> Result<SolveBatch, SolverError> {
        let nonce2_len = context.nonce2_len().filter(|len| *len > 0).ok_or(
            SolverError::NonceSpaceExhausted {
                nonce1_len: context.nonce1.len(),
                solver_nonce_len: context.solver_nonce.len(),
            },
        )?;

        let mut header = Vec::with_capacity(HEADER_PREFIX_LEN + HEADER_NONCE_LEN);
        header.extend_from_slice(&context.job.header_prefix());
        header.extend_from_slice(context.nonce1.as_bytes());
        header.extend_from_slice(context.solver_nonce.as_bytes());
        let nonce2_offset = header.len();
        header.resize(nonce2_offset + nonce2_len, 0);

        let attempts = self.batch_size.min(max_attempts);
        let mut solutions = vec![];
        for i in 0..attempts {
            let nonce2 = encode_nonce2(first_nonce2.wrapping_add(i), nonce2_len);
            header[nonce2_offset..].copy_from_slice(&nonce2);

            let digest = sha256d(&header);
            if meets_target(&digest, &context.job.target) {
                solutions.push(Solution {
                    nonce2,
                    payload: digest.to_vec(),
                });
            }
        }

        if self.verbose {
            trace!(
                "{}: tried {} nonces from {} on job {}, {} solution(s)",
                self.device,
                attempts,
                first_nonce2,
                context.job.job_id,
                solutions.len()
            );
        }

        Ok(SolveBatch {
            attempts,
            solutions,
        })
    }
}

/// little-endian counter, truncated or zero-padded to `len` bytes
fn encode_nonce2(counter: u64, len: usize) -> Vec<u8> {
    let mut nonce2 = vec![0u8; len];
    let bytes = counter.to_le_bytes();
    let n = len.min(bytes.len());
    nonce2[..n].copy_from_slice(&bytes[..n]);
    nonce2
}

fn sha256d(data: &[u8]) -> [u8; 32] {
    Sha256::digest(Sha256::digest(data)).into()
}

/// The digest is interpreted as a little-endian 256-bit number, the target
/// as big-endian.
fn meets_target(digest: &[u8; 32], target: &[u8; 32]) -> bool {
    let mut digest_be = *digest;
    digest_be.reverse();
    digest_be <= *target
}

#[cfg(test)]
mod sha256d_tests {
    use super::*;
    use crate::models::nonce::Nonce1;
    use crate::models::nonce::SolverNonce;
    use crate::tests::shared::job_with_target;

    fn context(target: [u8; 32]) -> MiningContext {
        MiningContext::new(
            job_with_target("j", target),
            Nonce1::from(vec![1, 2, 3, 4]),
            SolverNonce::from(vec![9, 9]),
        )
    }

    fn solver(batch_size: u64) -> Sha256dSolver {
        Sha256dSolver::new(DeviceId::new(0, 0), false)
            .unwrap()
            .with_batch_size(batch_size)
    }

    #[test]
    fn trivial_target_accepts_every_attempt() {
        let batch = solver(16).solve(&context([0xff; 32]), 0, u64::MAX).unwrap();
        assert_eq!(16, batch.attempts);
        assert_eq!(16, batch.solutions.len());
        assert_eq!(26, batch.solutions[0].nonce2.len());
        assert_eq!(encode_nonce2(5, 26), batch.solutions[5].nonce2);
    }

    #[test]
    fn batch_is_cut_short_at_max_attempts() {
        let batch = solver(16).solve(&context([0xff; 32]), 0, 5).unwrap();
        assert_eq!(5, batch.attempts);
        assert_eq!(5, batch.solutions.len());
    }

    #[test]
    fn impossible_target_accepts_nothing() {
        let batch = solver(64).solve(&context([0; 32]), 1000, u64::MAX).unwrap();
        assert_eq!(64, batch.attempts);
        assert!(batch.solutions.is_empty());
    }

    #[test]
    fn solution_payload_is_header_digest() {
        let ctx = context([0xff; 32]);
        let batch = solver(1).solve(&ctx, 7, u64::MAX).unwrap();

        let mut header = ctx.job.header_prefix().to_vec();
        header.extend_from_slice(ctx.nonce1.as_bytes());
        header.extend_from_slice(ctx.solver_nonce.as_bytes());
        header.extend_from_slice(&encode_nonce2(7, 26));
        assert_eq!(sha256d(&header).to_vec(), batch.solutions[0].payload);
    }

    #[test]
    fn full_nonce_prefix_is_rejected() {
        let ctx = MiningContext::new(
            job_with_target("j", [0xff; 32]),
            Nonce1::from(vec![0; 16]),
            SolverNonce::from(vec![0; 16]),
        );
        assert_eq!(
            Err(SolverError::NonceSpaceExhausted {
                nonce1_len: 16,
                solver_nonce_len: 16
            }),
            solver(1).solve(&ctx, 0, u64::MAX)
        );
    }

    #[test]
    fn target_comparison_is_big_endian() {
        let mut target = [0u8; 32];
        target[0] = 0x01;

        let mut digest = [0u8; 32];
        digest[31] = 0x01; // most significant byte once reversed
        assert!(meets_target(&digest, &target));

        digest[31] = 0x02;
        assert!(!meets_target(&digest, &target));
    }

    #[test]
    fn nonce2_encoding_pads_and_truncates() {
        assert_eq!(vec![1, 0, 0, 0, 0, 0, 0, 0, 0, 0], encode_nonce2(1, 10));
        assert_eq!(vec![0x34, 0x12], encode_nonce2(0x1234, 2));
    }
}
