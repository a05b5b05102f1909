pub mod device;
pub mod job;
pub mod mining_context;
pub mod nonce;
pub mod share;
pub mod worker_message;
