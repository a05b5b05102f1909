use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::errors::WorkerError;
use super::WorkerParams;
use crate::channel::JobReceiver;
use crate::channel::ResultSender;
use crate::channel::TryRecvError;
use crate::macros::fn_name;
use crate::macros::log_slow_scope;
use crate::models::job::Job;
use crate::models::mining_context::MiningContext;
use crate::models::worker_message::SolutionMessage;
use crate::models::worker_message::WorkerCommand;
use crate::solver::Solution;
use crate::solver::Solver;

/// solver invocations slower than this are logged
const SLOW_SOLVE_THRESHOLD_SECS: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// no complete mining context received yet
    NoContext,
    HasContext,
}

/// Outcome of one iteration of the worker loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// nothing to work on; the caller should back off
    Idle,
    /// one solver batch was run
    Solved,
    /// shutdown requested or the frontend is gone
    Exit,
}

/// The backend loop: polls the job channel without blocking, solves the
/// current context in batches and reports every solution.
#[derive(Debug)]
pub struct WorkerLoop<S: Solver> {
    params: WorkerParams,
    solver: S,
    results: ResultSender,
    context: Option<MiningContext>,

    /// next nonce2 counter to hand to the solver. Restarts for every new
    /// context.
    next_nonce2: u64,

    /// solve attempts since the last submitted solution
    attempts: u64,

    /// every nonce2 of the current context has been tried
    exhausted: bool,
}

impl<S: Solver> WorkerLoop<S> {
    /// Instantiates the solver for `params.device`.
    pub fn new(params: WorkerParams, results: ResultSender) -> Result<Self, WorkerError> {
        debug!(
            "{}: instantiating {} solver, verbose: {}",
            params.device, params.solver, params.verbose
        );
        let solver = S::new(params.device, params.verbose)?;
        Ok(Self::with_solver(params, solver, results))
    }

    pub fn with_solver(params: WorkerParams, solver: S, results: ResultSender) -> Self {
        Self {
            params,
            solver,
            results,
            context: None,
            next_nonce2: 0,
            attempts: 0,
            exhausted: false,
        }
    }

    pub fn state(&self) -> WorkerState {
        match self.context {
            None => WorkerState::NoContext,
            Some(_) => WorkerState::HasContext,
        }
    }

    pub fn current_job_id(&self) -> Option<&str> {
        self.context.as_ref().map(|c| c.job.job_id.as_str())
    }

    /// solve attempts not yet reported to the frontend
    pub fn unreported_attempts(&self) -> u64 {
        self.attempts
    }

    /// Runs until a shutdown command arrives or the job channel disconnects.
    ///
    /// Sleeps for the idle interval whenever there is nothing to solve, so a
    /// worker without context never spins.
    pub fn run(mut self, jobs: &mut JobReceiver) -> Result<(), WorkerError> {
        info!(
            "{}: worker started, solver nonce: {}",
            self.params.device, self.params.solver_nonce
        );
        loop {
            match self.step(jobs)? {
                Step::Exit => break,
                Step::Idle => std::thread::sleep(self.params.idle_interval),
                Step::Solved => {}
            }
        }
        info!("{}: worker loop finished", self.params.device);
        Ok(())
    }

    /// One non-blocking poll of the job channel, followed by one solver batch
    /// if a context is available.
    pub fn step(&mut self, jobs: &mut JobReceiver) -> Result<Step, WorkerError> {
        match jobs.try_recv_latest() {
            Ok(WorkerCommand::Mine(context)) => self.replace_context(context),
            Ok(WorkerCommand::Shutdown) => {
                info!("{}: shutdown requested", self.params.device);
                return Ok(Step::Exit);
            }
            Err(TryRecvError::Disconnected) => {
                info!("{}: job channel closed", self.params.device);
                return Ok(Step::Exit);
            }
            Err(TryRecvError::Empty) if self.context.is_none() => {
                debug!("{}: no job or nonce1 yet, waiting", self.params.device);
                return Ok(Step::Idle);
            }
            Err(TryRecvError::Empty) => {
                trace!("{}: no new job, running PoW on current job", self.params.device);
            }
        }

        if self.exhausted {
            return Ok(Step::Idle);
        }

        self.do_pow()?;
        Ok(Step::Solved)
    }

    fn replace_context(&mut self, context: MiningContext) {
        info!(
            "{}: received mining job_id:{}, nonce1:{}, solver_nonce:{}",
            self.params.device, context.job.job_id, context.nonce1, context.solver_nonce
        );
        if self.context.as_ref() != Some(&context) {
            self.next_nonce2 = 0;
            self.exhausted = false;
        }
        self.context = Some(context);
    }

    /// Runs one solver batch on the current context. Does nothing without a
    /// context.
    ///
    /// The batch never goes past the last nonce2 value. Once every value has
    /// been tried, the context is marked exhausted and the worker idles
    /// until new work arrives.
    pub fn do_pow(&mut self) -> Result<(), WorkerError> {
        let Some(context) = self.context.as_ref() else {
            return Ok(());
        };
        let nonce2_space = context.nonce2_space();

        let batch = {
            log_slow_scope!(fn_name!(), SLOW_SOLVE_THRESHOLD_SECS);
            self.solver.solve(
                context,
                self.next_nonce2,
                nonce2_space.saturating_sub(self.next_nonce2),
            )?
        };
        let job = context.job.clone();

        self.next_nonce2 = self.next_nonce2.saturating_add(batch.attempts);
        self.attempts += batch.attempts;
        if self.next_nonce2 >= nonce2_space {
            warn!(
                "{}: tried all {} nonce2 values of job {}, waiting for new work",
                self.params.device, nonce2_space, job.job_id
            );
            self.exhausted = true;
        }

        for solution in batch.solutions {
            self.submit_solution(job.clone(), solution)?;
        }
        Ok(())
    }

    fn submit_solution(&mut self, job: Job, solution: Solution) -> Result<(), WorkerError> {
        debug!(
            "{}: solution for job {}, nonce2: {}",
            self.params.device,
            job.job_id,
            hex::encode(&solution.nonce2)
        );
        self.results.send(SolutionMessage {
            job,
            nonce2: solution.nonce2,
            solution: solution.payload,
            attempts: self.attempts,
        })?;
        self.attempts = 0;
        Ok(())
    }
}
