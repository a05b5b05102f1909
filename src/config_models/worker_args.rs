use clap::Parser;

use super::parse_nonzero_duration;
use crate::models::device::DeviceId;
use crate::models::nonce::SolverNonce;
use crate::solver::SolverKind;
use crate::worker::WorkerParams;
use crate::worker::DEFAULT_IDLE_INTERVAL;

/// The `gpu-miner-worker` program runs one solver on one device.
///
/// It is started by `gpu-miner` and speaks its framed protocol on
/// stdin/stdout. Logs go to stderr.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[clap(name = "gpu-miner-worker", version, about)]
pub struct WorkerArgs {
    #[clap(long)]
    pub solver: SolverKind,

    #[clap(long)]
    pub platform_id: u32,

    #[clap(long)]
    pub device_id: u32,

    /// hex-encoded nonce prefix owned by this worker
    #[clap(long)]
    pub solver_nonce: SolverNonce,

    #[clap(long)]
    pub verbose: bool,

    #[clap(long, default_value_t = DEFAULT_IDLE_INTERVAL.into(), value_parser = parse_nonzero_duration)]
    pub idle_interval: humantime::Duration,
}

impl WorkerArgs {
    /// command line that parses back into `self`, program name excluded
    pub fn to_cli_args(&self) -> Vec<String> {
        let mut args = vec![
            format!("--solver={}", self.solver),
            format!("--platform-id={}", self.platform_id),
            format!("--device-id={}", self.device_id),
            format!("--solver-nonce={}", self.solver_nonce),
            format!("--idle-interval={}", self.idle_interval),
        ];
        if self.verbose {
            args.push("--verbose".to_string());
        }
        args
    }
}

impl From<&WorkerParams> for WorkerArgs {
    fn from(params: &WorkerParams) -> Self {
        Self {
            solver: params.solver,
            platform_id: params.device.platform,
            device_id: params.device.device,
            solver_nonce: params.solver_nonce.clone(),
            verbose: params.verbose,
            idle_interval: params.idle_interval.into(),
        }
    }
}

impl From<WorkerArgs> for WorkerParams {
    fn from(args: WorkerArgs) -> Self {
        Self {
            solver_nonce: args.solver_nonce,
            device: DeviceId::new(args.platform_id, args.device_id),
            solver: args.solver,
            verbose: args.verbose,
            idle_interval: args.idle_interval.into(),
        }
    }
}

#[cfg(test)]
mod worker_args_tests {
    use std::time::Duration;

    use super::*;
    use crate::tests::shared::worker_params;

    fn parse(args: Vec<String>) -> WorkerArgs {
        WorkerArgs::try_parse_from(std::iter::once("gpu-miner-worker".to_string()).chain(args))
            .unwrap()
    }

    #[test]
    fn launcher_command_line_parses_back_into_params() {
        let mut params = worker_params(Duration::from_millis(1500));
        params.device = DeviceId::new(1, 3);
        params.verbose = true;

        let args = WorkerArgs::from(&params).to_cli_args();
        assert_eq!(params, WorkerParams::from(parse(args)));
    }

    #[test]
    fn empty_solver_nonce_is_accepted() {
        let mut params = worker_params(Duration::from_secs(2));
        params.solver_nonce = SolverNonce::from(vec![]);

        let args = WorkerArgs::from(&params).to_cli_args();
        assert!(parse(args).solver_nonce.is_empty());
    }

    #[test]
    fn idle_interval_defaults_and_rejects_zero() {
        let args = WorkerArgs::try_parse_from([
            "gpu-miner-worker",
            "--solver=sha256d",
            "--platform-id=0",
            "--device-id=0",
            "--solver-nonce=",
        ])
        .unwrap();
        assert_eq!(DEFAULT_IDLE_INTERVAL, *args.idle_interval);

        assert!(WorkerArgs::try_parse_from([
            "gpu-miner-worker",
            "--solver=sha256d",
            "--platform-id=0",
            "--device-id=0",
            "--solver-nonce=",
            "--idle-interval=0s",
        ])
        .is_err());
    }

    #[test]
    fn solver_nonce_must_be_hex() {
        assert!(WorkerArgs::try_parse_from([
            "gpu-miner-worker",
            "--solver=sha256d",
            "--platform-id=0",
            "--device-id=0",
            "--solver-nonce=xyz",
        ])
        .is_err());
    }
}
