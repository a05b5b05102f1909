//! The frontend half: one [GpuMiner] per device.
//!
//! A coordinator keeps the upstream state (nonce1, the latest job and its
//! share callback), turns it into complete mining contexts for its worker and
//! turns the worker's results into shares. It never blocks the runtime: jobs
//! are enqueued without waiting and results are awaited asynchronously.

use std::fmt::Display;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::channel::job_channel;
use crate::channel::result_channel;
use crate::channel::JobReceiver;
use crate::channel::JobSender;
use crate::channel::ResultReceiver;
use crate::channel::ResultSender;
use crate::models::device::DeviceId;
use crate::models::job::Job;
use crate::models::mining_context::MiningContext;
use crate::models::nonce::Nonce1;
use crate::models::nonce::SolverNonce;
use crate::models::share::OnShare;
use crate::models::share::Share;
use crate::models::share::SolutionCounterFn;
use crate::models::worker_message::SolutionMessage;
use crate::models::worker_message::WorkerCommand;
use crate::solver::SolverKind;
use crate::worker::errors::LaunchError;
use crate::worker::launcher::WorkerLauncher;
use crate::worker::WorkerExit;
use crate::worker::WorkerParams;
use crate::worker::DEFAULT_IDLE_INTERVAL;

pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorSettings {
    /// passed to the worker's solver
    pub verbose_solver: bool,
    pub idle_interval: Duration,

    /// how long the worker may take to exit after `Shutdown` before it is
    /// terminated
    pub shutdown_grace: Duration,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            verbose_solver: false,
            idle_interval: DEFAULT_IDLE_INTERVAL,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("could not launch worker")]
    Launch(#[from] LaunchError),

    #[error("coordinator was already started")]
    AlreadyStarted,

    #[error("worker exited unexpectedly: {0}")]
    WorkerExited(WorkerExit),
}

/// state received from upstream
#[derive(Default)]
struct UpstreamState {
    nonce1: Option<Nonce1>,
    last_received_job: Option<Job>,
    on_share: Option<OnShare>,
}

/// worker ends of the channel pair, until the worker is launched
#[derive(Debug)]
struct WorkerEnds {
    jobs: JobReceiver,
    results_tx: ResultSender,
    results: ResultReceiver,
}

/// Coordinates one worker on one device.
pub struct GpuMiner {
    device: DeviceId,
    solver: SolverKind,
    solver_nonce: SolverNonce,
    settings: CoordinatorSettings,
    launcher: Arc<dyn WorkerLauncher>,
    count_solutions: SolutionCounterFn,

    upstream: Mutex<UpstreamState>,
    job_tx: JobSender,
    worker_ends: Mutex<Option<WorkerEnds>>,
    stop_tx: watch::Sender<bool>,
}

impl std::fmt::Debug for GpuMiner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuMiner")
            .field("device", &self.device)
            .field("solver", &self.solver)
            .field("solver_nonce", &self.solver_nonce)
            .field("settings", &self.settings)
            .field("launcher", &self.launcher)
            .finish_non_exhaustive()
    }
}

impl Display for GpuMiner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Async-frontend-{}", self.device)
    }
}

impl GpuMiner {
    /// Creates the coordinator and its channel pair. The worker is not
    /// started before [Self::run].
    pub fn new(
        solver_nonce: SolverNonce,
        count_solutions: SolutionCounterFn,
        device: DeviceId,
        solver: SolverKind,
        launcher: Arc<dyn WorkerLauncher>,
        settings: CoordinatorSettings,
    ) -> Self {
        let (job_tx, jobs) = job_channel();
        let (results_tx, results) = result_channel();
        let (stop_tx, _) = watch::channel(false);

        Self {
            device,
            solver,
            solver_nonce,
            settings,
            launcher,
            count_solutions,
            upstream: Mutex::new(UpstreamState::default()),
            job_tx,
            worker_ends: Mutex::new(Some(WorkerEnds {
                jobs,
                results_tx,
                results,
            })),
            stop_tx,
        }
    }

    pub fn solver_nonce(&self) -> &SolverNonce {
        &self.solver_nonce
    }

    fn lock_upstream(&self) -> MutexGuard<'_, UpstreamState> {
        self.upstream.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records the session nonce and queues a fresh context for the worker
    /// if a job is known.
    pub fn set_nonce1(&self, nonce1: Nonce1) {
        debug!("{}: new nonce1 {}", self, nonce1);
        self.lock_upstream().nonce1 = Some(nonce1);
        self.enqueue_last_mining_job();
    }

    /// Records the job and the callback for its shares, then queues a fresh
    /// context for the worker if nonce1 is known.
    pub fn register_new_job(&self, job: Job, on_share: OnShare) {
        debug!("{}: registered job {}", self, job.job_id);
        {
            let mut upstream = self.lock_upstream();
            upstream.last_received_job = Some(job);
            upstream.on_share = Some(on_share);
        }
        self.enqueue_last_mining_job();
    }

    /// Queues the last received job for the worker, provided nonce1 is known
    /// too. Returns whether something was queued.
    pub fn enqueue_last_mining_job(&self) -> bool {
        let context = {
            let upstream = self.lock_upstream();
            match (&upstream.last_received_job, &upstream.nonce1) {
                (Some(job), Some(nonce1)) => {
                    MiningContext::new(job.clone(), nonce1.clone(), self.solver_nonce.clone())
                }
                _ => {
                    debug!("{}: no job or nonce1 yet, nothing to queue", self);
                    return false;
                }
            }
        };

        info!("{}: Queueing new job: 0x{}", self, context.job.job_id);
        match self.job_tx.send(WorkerCommand::Mine(context)) {
            Ok(()) => true,
            Err(e) => {
                warn!("{}: could not queue job, worker is gone: {}", self, e);
                false
            }
        }
    }

    /// accounts solve attempts reported by the worker
    pub fn count_solutions(&self, attempts: u64) {
        (self.count_solutions)(attempts);
    }

    /// Hands a solution to the share callback of the last registered job.
    pub fn submit_solution(&self, job: Job, nonce2: Vec<u8>, solution: Vec<u8>) {
        let on_share = self.lock_upstream().on_share.clone();
        let Some(on_share) = on_share else {
            warn!(
                "{}: dropping solution for job {}, no share callback registered",
                self, job.job_id
            );
            return;
        };
        on_share(Share {
            device: self.device,
            job,
            nonce2,
            solution,
        });
    }

    fn worker_params(&self) -> WorkerParams {
        WorkerParams {
            solver_nonce: self.solver_nonce.clone(),
            device: self.device,
            solver: self.solver,
            verbose: self.settings.verbose_solver,
            idle_interval: self.settings.idle_interval,
        }
    }

    /// Starts the worker and forwards its results until [Self::stop] is
    /// called, then tears the worker down.
    ///
    /// Can only run once per coordinator. If the worker exits on its own,
    /// returns [CoordinatorError::WorkerExited]; the worker is not
    /// restarted.
    pub async fn run(&self) -> Result<WorkerExit, CoordinatorError> {
        let ends = self
            .worker_ends
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(WorkerEnds {
            jobs,
            results_tx,
            mut results,
        }) = ends
        else {
            return Err(CoordinatorError::AlreadyStarted);
        };

        debug!("{}: starting worker backend", self);
        let worker = self
            .launcher
            .launch(self.worker_params(), jobs, results_tx)
            .await?;
        info!("{}: started {}", self, worker.description());

        let mut stop_rx = self.stop_tx.subscribe();
        let mut worker_gone = false;
        while !*stop_rx.borrow_and_update() {
            tokio::select! {
                message = results.recv() => match message {
                    Some(message) => self.apply_result(message),
                    None => {
                        worker_gone = true;
                        break;
                    }
                },
                _ = stop_rx.changed() => {}
            }
        }

        if worker_gone {
            let exit = worker.wait().await;
            error!("{}: worker exited unexpectedly: {}", self, exit);
            return Err(CoordinatorError::WorkerExited(exit));
        }

        info!("{}: stopping worker", self);
        if self.job_tx.send(WorkerCommand::Shutdown).is_err() {
            debug!("{}: worker already disconnected", self);
        }

        // solutions already found are still submitted
        let deadline = Instant::now() + self.settings.shutdown_grace;
        let drained = tokio::time::timeout_at(deadline, async {
            while let Some(message) = results.recv().await {
                self.apply_result(message);
            }
        })
        .await;
        if drained.is_err() {
            warn!("{}: worker still sending results after grace period", self);
        }

        let exit = worker
            .shutdown(deadline.saturating_duration_since(Instant::now()))
            .await;
        info!("{}: worker {}", self, exit);
        Ok(exit)
    }

    fn apply_result(&self, message: SolutionMessage) {
        debug!("{}: received solution for job {}", self, message.job.job_id);
        self.count_solutions(message.attempts);
        self.submit_solution(message.job, message.nonce2, message.solution);
    }

    /// Makes [Self::run] return. Safe to call from any task, any number of
    /// times.
    pub fn stop(&self) {
        if !self.stop_tx.send_replace(true) {
            info!("{}: stop requested", self);
        }
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop_tx.borrow()
    }
}
