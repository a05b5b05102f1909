use std::path::PathBuf;

use clap::builder::RangedI64ValueParser;
use clap::Parser;

use super::parse_nonzero_duration;
use crate::accounting::DEFAULT_STATS_INTERVAL;
use crate::coordinator::DEFAULT_SHUTDOWN_GRACE;
use crate::models::device::DeviceId;
use crate::solver::SolverKind;
use crate::worker::DEFAULT_IDLE_INTERVAL;

/// The `gpu-miner` command-line program mines on one or more devices, each
/// driven by its own worker process.
///
/// Upstream work is read as JSON lines, either from a file or from stdin:
///
///   {"nonce1": "<hex>"}
///
///   {"job": {"job_id": "...", "version": 4, "prev_hash": "<hex>", ...}}
///
/// Found shares are printed to stdout, one JSON object per line.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about)]
pub struct Args {
    /// Device to mine on, as <platform>:<device>. Repeat to mine on several
    /// devices; every device gets its own worker.
    #[clap(long = "device", value_name = "PLATFORM:DEVICE", default_value = "0:0")]
    pub devices: Vec<DeviceId>,

    /// Solver implementation the workers instantiate.
    #[clap(long, default_value_t = SolverKind::Sha256d)]
    pub solver: SolverKind,

    /// File to read upstream events from. Reads stdin if unset.
    #[clap(long, value_name = "FILE")]
    pub job_feed: Option<PathBuf>,

    /// Length in bytes of the random per-device solver nonce.
    #[clap(long, default_value = "2", value_parser(RangedI64ValueParser::<usize>::new().range(0..=16)))]
    pub solver_nonce_len: usize,

    /// Interval between two hash rate reports.
    #[clap(long, default_value_t = DEFAULT_STATS_INTERVAL.into(), value_parser = parse_nonzero_duration)]
    pub stats_interval: humantime::Duration,

    /// How long a worker may take to exit after being asked to, before it is
    /// killed.
    #[clap(long, default_value_t = DEFAULT_SHUTDOWN_GRACE.into())]
    pub shutdown_grace: humantime::Duration,

    /// How long a worker without a job waits before polling again.
    #[clap(long, default_value_t = DEFAULT_IDLE_INTERVAL.into(), value_parser = parse_nonzero_duration)]
    pub idle_interval: humantime::Duration,

    /// Enable solver diagnostics in the workers.
    #[clap(long)]
    pub verbose_solver: bool,

    /// Run workers as threads of this process instead of child processes.
    ///
    /// Meant for debugging. A crashing solver takes the whole miner down.
    #[clap(long)]
    pub in_process: bool,

    /// Path of the worker executable. Defaults to `gpu-miner-worker` next to
    /// this executable.
    #[clap(long, value_name = "FILE")]
    pub worker_path: Option<PathBuf>,

    /// Enable tokio tracing for consumption by the tokio-console application
    /// note: this will attempt to connect to localhost:6669
    #[structopt(long, name = "tokio-console", default_value = "false")]
    pub tokio_console: bool,
}

impl Default for Args {
    fn default() -> Self {
        let empty: Vec<String> = vec![];
        Self::parse_from(empty)
    }
}
