use crate::channel::errors::ChannelError;
use crate::solver::SolverError;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Solver(#[from] SolverError),

    #[error("cannot deliver results to the frontend")]
    ResultChannel(#[from] ChannelError),
}

/// represents an error starting a worker
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("could not start worker")]
    Spawn(#[from] std::io::Error),

    #[error("worker stdin unavailable")]
    StdinUnavailable,

    #[error("worker stdout unavailable")]
    StdoutUnavailable,
}
