use std::any::Any;
use std::panic::AssertUnwindSafe;

use anyhow::Context;
use tracing::error;
use tracing::info;

use super::worker_loop::WorkerLoop;
use super::WorkerExit;
use super::WorkerParams;
use crate::channel::JobReceiver;
use crate::channel::ResultSender;
use crate::macros::fn_name;
use crate::macros::log_scope_duration;
use crate::solver::sha256d::Sha256dSolver;
use crate::solver::Solver;
use crate::solver::SolverKind;

/// Body of a worker: builds the solver and runs the worker loop until it
/// returns.
///
/// Every failure, returned or panicked, is caught here and logged as
/// `FATAL` together with its cause chain before the worker ends. A failing
/// worker is never restarted; the frontend learns about it from the result
/// channel closing.
pub fn run_worker<S: Solver>(
    params: WorkerParams,
    results: ResultSender,
    mut jobs: JobReceiver,
) -> WorkerExit {
    log_scope_duration!(fn_name!());
    let device = params.device;

    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| -> anyhow::Result<()> {
        let worker = WorkerLoop::<S>::new(params, results)
            .with_context(|| format!("{}: could not instantiate solver", device))?;
        worker
            .run(&mut jobs)
            .with_context(|| format!("{}: worker loop failed", device))?;
        Ok(())
    }));

    match outcome {
        Ok(Ok(())) => {
            info!("{}: worker exited", device);
            WorkerExit::Clean
        }
        Ok(Err(e)) => {
            error!("FATAL: {:?}", e);
            WorkerExit::Fatal(format!("{:#}", e))
        }
        Err(panic) => {
            let reason = panic_message(panic.as_ref());
            error!("FATAL: {}: worker panicked: {}", device, reason);
            WorkerExit::Fatal(format!("panic: {}", reason))
        }
    }
}

/// [run_worker] for the solver named in `params`.
pub fn run_worker_for_kind(
    params: WorkerParams,
    results: ResultSender,
    jobs: JobReceiver,
) -> WorkerExit {
    match params.solver {
        SolverKind::Sha256d => run_worker::<Sha256dSolver>(params, results, jobs),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
