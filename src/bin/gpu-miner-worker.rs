//! Worker process. Reads framed commands from stdin, writes framed
//! solutions to stdout and logs to stderr, which the frontend forwards
//! into its own log.

use std::process;

use anyhow::Result;
use clap::Parser;
use gpu_miner::config_models::worker_args::WorkerArgs;
use gpu_miner::worker::stdio::serve_stdio;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<()> {
    let args = WorkerArgs::parse();
    set_up_logger(args.verbose);

    let tokio_runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_io()
        .enable_time()
        .build()?;

    let exit = tokio_runtime.block_on(serve_stdio(args.into()));

    // stdin is read on a blocking thread that only notices EOF
    tokio_runtime.shutdown_timeout(tokio::time::Duration::from_secs(1));

    process::exit(exit.exit_code())
}

/// Like the frontend's logger, but on stderr, and at debug level when the
/// solver runs verbose. `RUST_LOG` takes precedence.
fn set_up_logger(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    tracing::subscriber::set_global_default(
        FmtSubscriber::builder()
            .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new(default_filter)),
            )
            .with_thread_ids(true)
            .with_ansi(false)
            .with_writer(std::io::stderr)
            .finish(),
    )
    .map_err(|_err| eprintln!("Unable to set global default subscriber"))
    .expect("Failed to set trace subscriber");
}
