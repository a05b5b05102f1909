#![deny(clippy::shadow_unrelated)]

pub mod accounting;
pub mod channel;
pub mod config_models;
pub mod coordinator;
pub mod job_feed;
pub(crate) mod macros;
pub mod models;
pub mod solver;
pub mod worker;


use std::env;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use anyhow::Result;
use tokio::io::AsyncBufRead;
use tokio::io::BufReader;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::accounting::report_rate;
use crate::accounting::SolutionCounter;
use crate::config_models::cli_args;
use crate::coordinator::CoordinatorSettings;
use crate::coordinator::GpuMiner;
use crate::job_feed::run_job_feed;
use crate::models::nonce::SolverNonce;
use crate::models::share::OnShare;
use crate::models::share::Share;
use crate::models::share::ShareRecord;
use crate::worker::launcher::InProcessLauncher;
use crate::worker::launcher::ProcessLauncher;
use crate::worker::launcher::WorkerLauncher;

pub const SUCCESS_EXIT_CODE: i32 = 0;

/// exit code of a worker process whose solver or loop failed
pub const WORKER_FATAL_EXIT_CODE: i32 = 160;

/// exit code of the frontend when at least one worker died on its own
pub const WORKER_DIED_EXIT_CODE: i32 = 161;

/// Starts one coordinator per device, feeds them upstream events and prints
/// their shares until interrupted with ctrl-c.
///
/// Returns the process exit code.
pub async fn initialize(args: cli_args::Args) -> Result<i32> {
    info!(
        "Starting gpu-miner on {} device(s) with the {} solver",
        args.devices.len(),
        args.solver
    );

    let launcher: Arc<dyn WorkerLauncher> = if args.in_process {
        warn!("running workers in-process; a crashing solver ends the miner");
        Arc::new(InProcessLauncher::default())
    } else {
        let launcher = match &args.worker_path {
            Some(path) => ProcessLauncher::new(path.clone()),
            None => ProcessLauncher::next_to_current_exe()
                .context("could not locate the worker executable")?,
        };
        info!("worker executable: {}", launcher.worker_path().display());
        Arc::new(launcher)
    };

    let settings = CoordinatorSettings {
        verbose_solver: args.verbose_solver,
        idle_interval: args.idle_interval.into(),
        shutdown_grace: args.shutdown_grace.into(),
    };
    let counter = SolutionCounter::new();
    let miners: Vec<Arc<GpuMiner>> = args
        .devices
        .iter()
        .map(|device| {
            Arc::new(GpuMiner::new(
                SolverNonce::random(args.solver_nonce_len),
                counter.callback(),
                *device,
                args.solver,
                launcher.clone(),
                settings,
            ))
        })
        .collect();

    let mut coordinators = JoinSet::new();
    for miner in &miners {
        info!("{}: solver nonce {}", miner, miner.solver_nonce());
        let miner = miner.clone();
        coordinators.spawn(async move {
            let outcome = miner.run().await;
            (miner, outcome)
        });
    }

    let stats_cancel = CancellationToken::new();
    tokio::spawn(report_rate(
        counter.clone(),
        args.stats_interval.into(),
        stats_cancel.clone(),
    ));

    let on_share: OnShare = Arc::new(print_share);
    let feed_input: Box<dyn AsyncBufRead + Unpin + Send> = match &args.job_feed {
        Some(path) => Box::new(BufReader::new(
            tokio::fs::File::open(path)
                .await
                .with_context(|| format!("could not open job feed {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    let started = Instant::now();
    tokio::select! {
        fed = run_job_feed(feed_input, &miners, on_share) => {
            let events = fed?;
            info!("job feed ended after {} event(s), mining on until ctrl-c", events);
            tokio::signal::ctrl_c().await?;
        }
        interrupted = tokio::signal::ctrl_c() => interrupted?,
    }

    info!("shutting down after {:?}", started.elapsed());
    for miner in &miners {
        miner.stop();
    }

    let mut exit_code = SUCCESS_EXIT_CODE;
    while let Some(joined) = coordinators.join_next().await {
        match joined {
            Ok((miner, Ok(exit))) => info!("{}: worker {}", miner, exit),
            Ok((miner, Err(e))) => {
                error!("{}: {:#}", miner, anyhow::Error::from(e));
                exit_code = WORKER_DIED_EXIT_CODE;
            }
            Err(e) => {
                error!("coordinator task failed: {}", e);
                exit_code = WORKER_DIED_EXIT_CODE;
            }
        }
    }
    stats_cancel.cancel();

    info!(
        "mined {} share(s) in {} attempts",
        counter.solutions(),
        counter.attempts()
    );
    Ok(exit_code)
}

/// prints `share` to stdout as one line of JSON
fn print_share(share: Share) {
    let record = ShareRecord::from(&share);
    let line = match serde_json::to_string(&record) {
        Ok(line) => line,
        Err(e) => {
            error!("could not serialize share: {}", e);
            return;
        }
    };
    let mut stdout = std::io::stdout().lock();
    if let Err(e) = writeln!(stdout, "{}", line).and_then(|()| stdout.flush()) {
        error!("could not print share: {}", e);
    }
}

/// Logs the duration of a scope at debug level when it exceeds a
/// threshold, or always if no threshold is given. See the
/// `log_slow_scope!` and `log_scope_duration!` macros.
#[derive(Debug)]
pub struct ScopeDurationLogger<'a> {
    start: Instant,
    description: &'a str,
    log_slow_fn_threshold: Option<f64>,
    location: &'static std::panic::Location<'static>,
}

impl<'a> ScopeDurationLogger<'a> {
    #[track_caller]
    pub fn new(description: &'a str, log_slow_fn_threshold: Option<f64>) -> Self {
        Self {
            start: Instant::now(),
            description,
            log_slow_fn_threshold,
            location: std::panic::Location::caller(),
        }
    }

    #[track_caller]
    pub fn new_with_threshold(description: &'a str, log_slow_fn_threshold: f64) -> Self {
        Self::new(description, Some(log_slow_fn_threshold))
    }

    #[track_caller]
    pub fn new_default_threshold(description: &'a str) -> Self {
        Self::new_with_threshold(
            description,
            env::var("LOG_SLOW_SCOPE_THRESHOLD")
                .ok()
                .and_then(|t| t.parse().ok())
                .unwrap_or(0.001),
        )
    }

    #[track_caller]
    pub fn new_without_threshold(description: &'a str) -> Self {
        Self::new(description, None)
    }
}

impl Drop for ScopeDurationLogger<'_> {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();

        match self.log_slow_fn_threshold {
            Some(threshold) if duration >= threshold => tracing::debug!(
                "executed {} in {} secs.  exceeds slow scope threshold of {} secs.  location: {}",
                self.description,
                duration,
                threshold,
                self.location,
            ),
            Some(_) => {}
            None => tracing::debug!(
                "executed {} in {} secs.  location: {}",
                self.description,
                duration,
                self.location,
            ),
        }
    }
}
