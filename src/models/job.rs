use serde::Deserialize;
use serde::Serialize;

/// Length in bytes of the header nonce field. The nonce is split into
/// `nonce1 || solver_nonce || nonce2`.
pub const HEADER_NONCE_LEN: usize = 32;

/// Length in bytes of the serialized header, excluding the nonce.
pub const HEADER_PREFIX_LEN: usize = 4 + 32 + 32 + 32 + 4 + 4;

/// A unit of mining work as announced by the upstream pool.
///
/// Jobs are immutable once received. They are cloned across the process
/// boundary, so everything here must be serializable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub version: u32,
    #[serde(with = "hex::serde")]
    pub prev_hash: [u8; 32],
    #[serde(with = "hex::serde")]
    pub merkle_root: [u8; 32],
    #[serde(with = "hex::serde")]
    pub reserved: [u8; 32],
    pub time: u32,
    pub bits: u32,

    /// Share target, big-endian. A candidate is a solution when its
    /// (byte-reversed) digest is less than or equal to this value.
    #[serde(with = "hex::serde")]
    pub target: [u8; 32],

    #[serde(default)]
    pub clean_jobs: bool,
}

impl Job {
    /// Header bytes that precede the nonce, all integers little-endian.
    pub fn header_prefix(&self) -> [u8; HEADER_PREFIX_LEN] {
        let mut prefix = [0u8; HEADER_PREFIX_LEN];
        let mut offset = 0;
        for chunk in [
            &self.version.to_le_bytes()[..],
            &self.prev_hash[..],
            &self.merkle_root[..],
            &self.reserved[..],
            &self.time.to_le_bytes()[..],
            &self.bits.to_le_bytes()[..],
        ] {
            prefix[offset..offset + chunk.len()].copy_from_slice(chunk);
            offset += chunk.len();
        }
        prefix
    }
}
