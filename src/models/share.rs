use std::sync::Arc;

use serde::Serialize;

use super::device::DeviceId;
use super::job::Job;

/// A solution that is ready to be submitted upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Share {
    pub device: DeviceId,
    pub job: Job,
    pub nonce2: Vec<u8>,
    pub solution: Vec<u8>,
}

/// Callback registered together with a job. Invoked once per found
/// solution of that job.
pub type OnShare = Arc<dyn Fn(Share) + Send + Sync>;

/// Callback that accounts solve attempts reported by a worker.
pub type SolutionCounterFn = Arc<dyn Fn(u64) + Send + Sync>;

/// One line of share output, as printed by the frontend binary.
#[derive(Debug, Clone, Serialize)]
pub struct ShareRecord<'a> {
    pub device: String,
    pub job_id: &'a str,
    pub nonce2: String,
    pub solution: String,
}

impl<'a> From<&'a Share> for ShareRecord<'a> {
    fn from(share: &'a Share) -> Self {
        Self {
            device: share.device.to_string(),
            job_id: &share.job.job_id,
            nonce2: hex::encode(&share.nonce2),
            solution: hex::encode(&share.solution),
        }
    }
}
