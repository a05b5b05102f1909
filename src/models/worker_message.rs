use serde::Deserialize;
use serde::Serialize;

use super::job::Job;
use super::mining_context::MiningContext;

/// Messages flowing frontend -> worker over the job channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerCommand {
    /// Replace the current mining context.
    Mine(MiningContext),

    /// Stop solving and exit the worker loop.
    Shutdown,
}

impl WorkerCommand {
    pub fn get_type(&self) -> String {
        match self {
            WorkerCommand::Mine(_) => "mine".to_string(),
            WorkerCommand::Shutdown => "shutdown".to_string(),
        }
    }
}

/// Message flowing worker -> frontend over the result channel.
///
/// `attempts` is the number of solve attempts since the previous message.
/// The worker resets its counter once the message is enqueued, so summing
/// `attempts` over all messages never counts an attempt twice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolutionMessage {
    pub job: Job,
    #[serde(with = "hex::serde")]
    pub nonce2: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub solution: Vec<u8>,
    pub attempts: u64,
}
