use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tracing::debug;
use tracing::warn;

use super::supervisor::run_worker_for_kind;
use super::WorkerExit;
use super::WorkerParams;
use crate::channel::codec::pump_pipe_to_jobs;
use crate::channel::codec::pump_results_to_pipe;
use crate::channel::job_channel;
use crate::channel::result_channel;

/// Worker process entry point: serves commands from stdin and writes
/// solutions to stdout until the worker loop ends.
pub async fn serve_stdio(params: WorkerParams) -> WorkerExit {
    serve(params, tokio::io::stdin(), tokio::io::stdout()).await
}

/// Runs a worker against an arbitrary pipe pair.
///
/// The worker loop runs on the blocking pool. Once it has returned, every
/// solution it produced is flushed to `output` before this function
/// returns.
pub async fn serve<R, W>(params: WorkerParams, input: R, output: W) -> WorkerExit
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (job_tx, job_rx) = job_channel();
    let (result_tx, result_rx) = result_channel();

    let input_pump = tokio::spawn(pump_pipe_to_jobs(input, job_tx));
    let output_pump = tokio::spawn(pump_results_to_pipe(result_rx, output));

    let exit = match tokio::task::spawn_blocking(move || {
        run_worker_for_kind(params, result_tx, job_rx)
    })
    .await
    {
        Ok(exit) => exit,
        Err(e) => WorkerExit::Fatal(format!("worker task failed: {}", e)),
    };

    match output_pump.await {
        Ok(Ok(())) => debug!("result pipe flushed"),
        Ok(Err(e)) => warn!("could not flush results: {}", e),
        Err(e) => warn!("result pump failed: {}", e),
    }
    input_pump.abort();

    exit
}

#[cfg(test)]
mod stdio_tests {
    use std::time::Duration;

    use super::*;
    use crate::channel::codec::pump_jobs_to_pipe;
    use crate::channel::codec::pump_pipe_to_results;
    use crate::models::mining_context::MiningContext;
    use crate::models::worker_message::WorkerCommand;
    use crate::tests::shared::job_with_target;
    use crate::tests::shared::nonce1;
    use crate::tests::shared::solver_nonce;
    use crate::tests::shared::worker_params;

    #[tokio::test(flavor = "multi_thread")]
    async fn serves_until_shutdown_and_flushes_results() {
        let (to_worker, worker_stdin) = tokio::io::duplex(1 << 16);
        let (worker_stdout, from_worker) = tokio::io::duplex(1 << 16);
        let server = tokio::spawn(serve(
            worker_params(Duration::from_millis(10)),
            worker_stdin,
            worker_stdout,
        ));

        let (job_tx, job_rx) = job_channel();
        let (result_tx, mut result_rx) = result_channel();
        tokio::spawn(pump_jobs_to_pipe(job_rx, to_worker));
        tokio::spawn(pump_pipe_to_results(from_worker, result_tx));

        // about one in 256 attempts succeeds
        let mut target = [0xff; 32];
        target[0] = 0;
        let context = MiningContext::new(job_with_target("j1", target), nonce1(), solver_nonce());
        job_tx.send(WorkerCommand::Mine(context)).unwrap();

        let first = result_rx.recv().await.unwrap();
        assert_eq!("j1", first.job.job_id);

        job_tx.send(WorkerCommand::Shutdown).unwrap();
        assert_eq!(WorkerExit::Clean, server.await.unwrap());

        while let Some(message) = result_rx.recv().await {
            assert_eq!("j1", message.job.job_id);
        }
    }

    #[tokio::test]
    async fn closed_stdin_ends_the_worker() {
        let (to_worker, worker_stdin) = tokio::io::duplex(1024);
        let (worker_stdout, _from_worker) = tokio::io::duplex(1024);
        drop(to_worker);

        let exit = serve(
            worker_params(Duration::from_millis(10)),
            worker_stdin,
            worker_stdout,
        )
        .await;
        assert_eq!(WorkerExit::Clean, exit);
    }
}
