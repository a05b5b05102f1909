//! The backend half: everything that runs inside the worker, plus the
//! launchers the frontend uses to start one.

pub mod errors;
pub mod launcher;
pub mod stdio;
pub mod supervisor;
pub mod worker_loop;

use std::fmt::Display;
use std::time::Duration;

use crate::models::device::DeviceId;
use crate::models::nonce::SolverNonce;
use crate::solver::SolverKind;

/// How long a worker without a complete mining context sleeps between
/// two polls of the job channel.
pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_secs(2);

/// Everything a worker needs to construct its solver and loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerParams {
    pub solver_nonce: SolverNonce,
    pub device: DeviceId,
    pub solver: SolverKind,
    pub verbose: bool,
    pub idle_interval: Duration,
}

/// How a worker ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// the worker loop returned normally
    Clean,

    /// the worker failed; details were logged where it happened
    Fatal(String),

    /// the worker process exited with an unexpected code
    ExitCode(i32),

    /// the worker process ended without an exit code, e.g. killed by a
    /// signal
    NoExitCode,

    /// the worker was torn down by its coordinator
    Terminated,
}

impl WorkerExit {
    /// exit code for a worker process that ended this way
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Clean | Self::Terminated => crate::SUCCESS_EXIT_CODE,
            Self::Fatal(_) | Self::NoExitCode => crate::WORKER_FATAL_EXIT_CODE,
            Self::ExitCode(code) => *code,
        }
    }
}

impl Display for WorkerExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Clean => write!(f, "finished cleanly"),
            Self::Fatal(reason) => write!(f, "fatal error: {}", reason),
            Self::ExitCode(code) => write!(f, "exited with code {}", code),
            Self::NoExitCode => write!(f, "terminated without exit code"),
            Self::Terminated => write!(f, "terminated by coordinator"),
        }
    }
}
