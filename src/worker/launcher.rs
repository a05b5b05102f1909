//! Starting workers and tearing them down again.
//!
//! A launcher receives the worker's ends of the channel pair and returns a
//! [WorkerHandle]. [ProcessLauncher] runs the worker as a child process and
//! bridges the channels over its stdin/stdout. [InProcessLauncher] runs it
//! on a dedicated thread of the current process.

use std::path::PathBuf;
use std::process::ExitStatus;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tokio::process::Child;
use tokio::task::JoinError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::errors::LaunchError;
use super::supervisor::run_worker;
use super::supervisor::run_worker_for_kind;
use super::WorkerExit;
use super::WorkerParams;
use crate::channel::codec::pump_jobs_to_pipe;
use crate::channel::codec::pump_pipe_to_results;
use crate::channel::JobReceiver;
use crate::channel::ResultSender;
use crate::config_models::worker_args::WorkerArgs;
use crate::solver::Solver;

/// file name of the worker executable
pub const WORKER_BINARY_NAME: &str = "gpu-miner-worker";

#[async_trait::async_trait]
pub trait WorkerLauncher: Send + Sync + std::fmt::Debug {
    /// Starts one worker. The worker owns `jobs` and `results` from here
    /// on; when it ends, `results` is dropped and the frontend's result
    /// receiver reports the channel as closed.
    async fn launch(
        &self,
        params: WorkerParams,
        jobs: JobReceiver,
        results: ResultSender,
    ) -> Result<WorkerHandle, LaunchError>;
}

/// A running worker.
#[derive(Debug)]
pub struct WorkerHandle {
    description: String,
    cancel: CancellationToken,
    task: JoinHandle<WorkerExit>,
}

impl WorkerHandle {
    pub fn description(&self) -> &str {
        &self.description
    }

    /// waits for the worker to end on its own.
    pub async fn wait(self) -> WorkerExit {
        exit_from_join(self.task.await)
    }

    /// Gives the worker `grace` to end on its own, then terminates it.
    pub async fn shutdown(self, grace: Duration) -> WorkerExit {
        let WorkerHandle {
            description,
            cancel,
            mut task,
        } = self;

        match tokio::time::timeout(grace, &mut task).await {
            Ok(joined) => exit_from_join(joined),
            Err(_) => {
                info!(
                    "{} did not exit within {:?}, terminating",
                    description, grace
                );
                cancel.cancel();
                exit_from_join(task.await)
            }
        }
    }
}

fn exit_from_join(joined: Result<WorkerExit, JoinError>) -> WorkerExit {
    match joined {
        Ok(exit) => exit,
        Err(e) if e.is_panic() => WorkerExit::Fatal("worker supervision panicked".to_string()),
        Err(_) => WorkerExit::Terminated,
    }
}

/// Runs every worker as a `gpu-miner-worker` child process.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    worker_path: PathBuf,
}

impl ProcessLauncher {
    pub fn new(worker_path: PathBuf) -> Self {
        Self { worker_path }
    }

    /// Expects the worker executable in the same directory as the running
    /// executable. This lets a debug build of the frontend run a debug build
    /// of the worker, and works for an installed package alike.
    ///
    /// note: the path is not checked here. Launching fails if it is missing.
    pub fn next_to_current_exe() -> Result<Self, std::io::Error> {
        let mut exe_path = std::env::current_exe()?;
        exe_path.set_file_name(format!(
            "{}{}",
            WORKER_BINARY_NAME,
            std::env::consts::EXE_SUFFIX
        ));
        Ok(Self::new(exe_path))
    }

    pub fn worker_path(&self) -> &PathBuf {
        &self.worker_path
    }
}

#[async_trait::async_trait]
impl WorkerLauncher for ProcessLauncher {
    async fn launch(
        &self,
        params: WorkerParams,
        jobs: JobReceiver,
        results: ResultSender,
    ) -> Result<WorkerHandle, LaunchError> {
        let mut child = tokio::process::Command::new(&self.worker_path)
            .args(WorkerArgs::from(&params).to_cli_args())
            .kill_on_drop(true)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdin = child.stdin.take().ok_or(LaunchError::StdinUnavailable)?;
        let stdout = child.stdout.take().ok_or(LaunchError::StdoutUnavailable)?;

        let child_process_id = match child.id() {
            Some(id) => id.to_string(),
            None => "??".to_string(),
        };
        let description = format!("worker {} (pid {})", params.device, child_process_id);
        debug!("started {}", description);

        // the worker logs to stderr; stdout carries results
        if let Some(stderr) = child.stderr.take() {
            let prefix = description.clone();
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = reader.next_line().await {
                    info!("[{}]: {}", prefix, line);
                }
            });
        }

        let job_pump = tokio::spawn(async move {
            if let Err(e) = pump_jobs_to_pipe(jobs, stdin).await {
                debug!("job pipe to worker closed: {}", e);
            }
        });

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let name = description.clone();
        let task = tokio::spawn(async move {
            let exit = supervise_child(&name, child, stdout, results, token).await;
            job_pump.abort();
            debug!("{} ended: {}", name, exit);
            exit
        });

        Ok(WorkerHandle {
            description,
            cancel,
            task,
        })
    }
}

/// Forwards results until the worker closes stdout, then reaps it. Kills the
/// worker as soon as `cancel` fires.
async fn supervise_child(
    name: &str,
    mut child: Child,
    stdout: tokio::process::ChildStdout,
    results: ResultSender,
    cancel: CancellationToken,
) -> WorkerExit {
    let pumped = tokio::select! {
        pumped = pump_pipe_to_results(stdout, results) => pumped,
        _ = cancel.cancelled() => return kill(name, &mut child).await,
    };
    if let Err(e) = pumped {
        warn!("{}: result pipe failed: {}", name, e);
    }

    tokio::select! {
        status = child.wait() => exit_from_status(status),
        _ = cancel.cancelled() => kill(name, &mut child).await,
    }
}

async fn kill(name: &str, child: &mut Child) -> WorkerExit {
    match child.kill().await {
        Ok(()) => debug!("killed {}", name),
        Err(e) => warn!("could not kill {}: {}", name, e),
    }
    WorkerExit::Terminated
}

fn exit_from_status(status: Result<ExitStatus, std::io::Error>) -> WorkerExit {
    match status {
        Ok(status) => match status.code() {
            Some(crate::SUCCESS_EXIT_CODE) => WorkerExit::Clean,
            Some(crate::WORKER_FATAL_EXIT_CODE) => {
                WorkerExit::Fatal("worker reported a fatal error".to_string())
            }
            Some(code) => WorkerExit::ExitCode(code),
            None => WorkerExit::NoExitCode,
        },
        Err(e) => WorkerExit::Fatal(format!("could not wait for worker: {}", e)),
    }
}

type WorkerBody = fn(WorkerParams, ResultSender, JobReceiver) -> WorkerExit;

/// Runs every worker on its own thread inside the current process.
///
/// There is no crash isolation beyond what the supervisor's catch-all
/// provides, and a worker thread cannot be killed: on termination it is
/// detached and left to notice the closed job channel.
#[derive(Debug, Clone, Copy)]
pub struct InProcessLauncher {
    body: WorkerBody,
}

impl Default for InProcessLauncher {
    fn default() -> Self {
        Self {
            body: run_worker_for_kind,
        }
    }
}

impl InProcessLauncher {
    /// launches workers with solver `S` regardless of the requested kind.
    pub fn with_solver<S: Solver + 'static>() -> Self {
        Self {
            body: run_worker::<S>,
        }
    }
}

#[async_trait::async_trait]
impl WorkerLauncher for InProcessLauncher {
    async fn launch(
        &self,
        params: WorkerParams,
        jobs: JobReceiver,
        results: ResultSender,
    ) -> Result<WorkerHandle, LaunchError> {
        let description = format!("worker {} (in-process)", params.device);
        let body = self.body;
        let thread = std::thread::Builder::new()
            .name(format!("worker-{}", params.device))
            .spawn(move || body(params, results, jobs))?;
        debug!("started {}", description);

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let name = description.clone();
        let task = tokio::spawn(async move {
            let joined = tokio::task::spawn_blocking(move || thread.join());
            tokio::select! {
                joined = joined => match joined {
                    Ok(Ok(exit)) => exit,
                    _ => WorkerExit::Fatal("worker thread panicked".to_string()),
                },
                _ = token.cancelled() => {
                    warn!("{} cannot be killed, detaching it", name);
                    WorkerExit::Terminated
                }
            }
        });

        Ok(WorkerHandle {
            description,
            cancel,
            task,
        })
    }
}

#[cfg(test)]
mod launcher_tests {
    use super::*;
    use crate::channel::job_channel;
    use crate::channel::result_channel;
    use crate::models::worker_message::WorkerCommand;
    use crate::tests::shared::mining_context;
    use crate::tests::shared::worker_params;
    use crate::tests::shared::SteadySolver;
    use crate::tests::shared::UnavailableSolver;

    fn params() -> WorkerParams {
        worker_params(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn in_process_worker_delivers_results_and_shuts_down() {
        let (job_tx, job_rx) = job_channel();
        let (result_tx, mut result_rx) = result_channel();
        let handle = InProcessLauncher::with_solver::<SteadySolver>()
            .launch(params(), job_rx, result_tx)
            .await
            .unwrap();

        job_tx
            .send(WorkerCommand::Mine(mining_context("j1")))
            .unwrap();
        let message = result_rx.recv().await.unwrap();
        assert_eq!("j1", message.job.job_id);

        job_tx.send(WorkerCommand::Shutdown).unwrap();
        assert_eq!(
            WorkerExit::Clean,
            handle.shutdown(Duration::from_secs(5)).await
        );
    }

    #[tokio::test]
    async fn failed_in_process_worker_closes_result_channel() {
        let (_job_tx, job_rx) = job_channel();
        let (result_tx, mut result_rx) = result_channel();
        let handle = InProcessLauncher::with_solver::<UnavailableSolver>()
            .launch(params(), job_rx, result_tx)
            .await
            .unwrap();

        assert!(result_rx.recv().await.is_none());
        assert!(matches!(handle.wait().await, WorkerExit::Fatal(_)));
    }

    #[tokio::test]
    async fn unresponsive_in_process_worker_is_detached_after_grace() {
        let (_job_tx, job_rx) = job_channel();
        let (result_tx, _result_rx) = result_channel();
        let handle = InProcessLauncher::with_solver::<SteadySolver>()
            .launch(params(), job_rx, result_tx)
            .await
            .unwrap();

        // no shutdown sent, so the worker keeps idling
        assert_eq!(
            WorkerExit::Terminated,
            handle.shutdown(Duration::from_millis(50)).await
        );
    }

    #[tokio::test]
    async fn missing_worker_executable_fails_to_launch() {
        let (_job_tx, job_rx) = job_channel();
        let (result_tx, _result_rx) = result_channel();
        let launcher = ProcessLauncher::new(PathBuf::from("/nonexistent/gpu-miner-worker"));

        let launched = launcher.launch(params(), job_rx, result_tx).await;
        assert!(matches!(launched, Err(LaunchError::Spawn(_))));
    }

    #[test]
    fn worker_is_expected_next_to_current_exe() {
        let launcher = ProcessLauncher::next_to_current_exe().unwrap();
        let file_name = launcher.worker_path().file_stem().unwrap();
        assert_eq!(WORKER_BINARY_NAME, file_name);
    }

    #[cfg(unix)]
    #[test]
    fn exit_status_mapping() {
        use std::os::unix::process::ExitStatusExt;

        let status = |raw| Ok(ExitStatus::from_raw(raw));
        assert_eq!(WorkerExit::Clean, exit_from_status(status(0)));
        assert_eq!(WorkerExit::ExitCode(3), exit_from_status(status(3 << 8)));
        assert!(matches!(
            exit_from_status(status(crate::WORKER_FATAL_EXIT_CODE << 8)),
            WorkerExit::Fatal(_)
        ));
        // killed by SIGKILL
        assert_eq!(WorkerExit::NoExitCode, exit_from_status(status(9)));
    }
}
