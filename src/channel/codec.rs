//! Carries the channel pair over a child process's stdin/stdout.
//!
//! Every message is one length-delimited frame holding the bincode encoding
//! of a [WorkerCommand] (stdin) or a [SolutionMessage] (stdout). The pumps
//! below move messages between a pipe and the matching in-process channel
//! end, so the worker loop and the coordinator never see the pipes.

use futures::sink::SinkExt;
use futures::stream::TryStreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tokio_serde::formats::SymmetricalBincode;
use tokio_serde::SymmetricallyFramed;
use tokio_util::codec::FramedRead;
use tokio_util::codec::FramedWrite;
use tokio_util::codec::LengthDelimitedCodec;
use tracing::debug;

use super::errors::ChannelError;
use super::JobReceiver;
use super::JobSender;
use super::ResultReceiver;
use super::ResultSender;
use crate::models::worker_message::SolutionMessage;
use crate::models::worker_message::WorkerCommand;

pub type FramedWriter<W, T> =
    SymmetricallyFramed<FramedWrite<W, LengthDelimitedCodec>, T, SymmetricalBincode<T>>;
pub type FramedReader<R, T> =
    SymmetricallyFramed<FramedRead<R, LengthDelimitedCodec>, T, SymmetricalBincode<T>>;

pub fn framed_writer<W, T>(io: W) -> FramedWriter<W, T>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    SymmetricallyFramed::new(
        FramedWrite::new(io, LengthDelimitedCodec::new()),
        SymmetricalBincode::default(),
    )
}

pub fn framed_reader<R, T>(io: R) -> FramedReader<R, T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    SymmetricallyFramed::new(
        FramedRead::new(io, LengthDelimitedCodec::new()),
        SymmetricalBincode::default(),
    )
}

/// frontend side: job channel -> child stdin.
///
/// Runs until every [JobSender] is dropped or a `Shutdown` has been
/// written. Superseded commands are dropped before they hit the pipe.
pub async fn pump_jobs_to_pipe<W>(mut jobs: JobReceiver, pipe: W) -> Result<(), ChannelError>
where
    W: AsyncWrite + Unpin,
{
    let mut writer = framed_writer::<W, WorkerCommand>(pipe);
    while let Some(command) = jobs.recv_latest().await {
        let is_shutdown = matches!(command, WorkerCommand::Shutdown);
        debug!("writing {} command to worker", command.get_type());
        writer.send(command).await?;
        if is_shutdown {
            break;
        }
    }
    writer.close().await?;
    debug!("job pipe closed");
    Ok(())
}

/// worker side: stdin -> job channel.
///
/// Returns when the pipe reaches EOF, i.e. when the frontend closed its end.
/// Dropping `jobs` then disconnects the worker loop.
pub async fn pump_pipe_to_jobs<R>(pipe: R, jobs: JobSender) -> Result<(), ChannelError>
where
    R: AsyncRead + Unpin,
{
    let mut reader = framed_reader::<R, WorkerCommand>(pipe);
    while let Some(command) = reader.try_next().await? {
        jobs.send(command)?;
    }
    debug!("job pipe reached end of stream");
    Ok(())
}

/// worker side: result channel -> stdout.
///
/// Runs until the worker loop drops its [ResultSender].
pub async fn pump_results_to_pipe<W>(
    mut results: ResultReceiver,
    pipe: W,
) -> Result<(), ChannelError>
where
    W: AsyncWrite + Unpin,
{
    let mut writer = framed_writer::<W, SolutionMessage>(pipe);
    while let Some(message) = results.recv().await {
        writer.send(message).await?;
    }
    writer.close().await?;
    Ok(())
}

/// frontend side: child stdout -> result channel.
///
/// Returns when the worker closes stdout, normally because it exited.
pub async fn pump_pipe_to_results<R>(pipe: R, results: ResultSender) -> Result<(), ChannelError>
where
    R: AsyncRead + Unpin,
{
    let mut reader = framed_reader::<R, SolutionMessage>(pipe);
    while let Some(message) = reader.try_next().await? {
        results.send(message)?;
    }
    debug!("result pipe reached end of stream");
    Ok(())
}

#[cfg(test)]
mod codec_tests {
    use assert2::let_assert;
    use tokio_test::io::Builder;

    use super::*;
    use crate::channel::job_channel;
    use crate::channel::result_channel;
    use crate::tests::shared::mining_context;
    use crate::tests::shared::solution_message;

    #[tokio::test]
    async fn jobs_cross_a_pipe() {
        let (frontend_tx, frontend_rx) = job_channel();
        let (worker_tx, mut worker_rx) = job_channel();
        let (frontend_end, worker_end) = tokio::io::duplex(4096);

        frontend_tx
            .send(WorkerCommand::Mine(mining_context("j1")))
            .unwrap();
        frontend_tx.send(WorkerCommand::Shutdown).unwrap();

        pump_jobs_to_pipe(frontend_rx, frontend_end).await.unwrap();
        pump_pipe_to_jobs(worker_end, worker_tx).await.unwrap();

        assert_eq!(vec![WorkerCommand::Shutdown], worker_rx.drain_pending());
    }

    #[tokio::test]
    async fn results_cross_a_pipe_in_order() {
        let (worker_tx, worker_rx) = result_channel();
        let (frontend_tx, mut frontend_rx) = result_channel();
        let (worker_end, frontend_end) = tokio::io::duplex(4096);

        let sent = vec![
            solution_message("j1", 10),
            solution_message("j1", 0),
            solution_message("j2", 7),
        ];
        for message in &sent {
            worker_tx.send(message.clone()).unwrap();
        }
        drop(worker_tx);

        let (writing, reading) = tokio::join!(
            pump_results_to_pipe(worker_rx, worker_end),
            pump_pipe_to_results(frontend_end, frontend_tx),
        );
        writing.unwrap();
        reading.unwrap();

        let mut received = vec![];
        while let Ok(message) = frontend_rx.try_recv() {
            received.push(message);
        }
        assert_eq!(sent, received);
    }

    #[tokio::test]
    async fn truncated_result_frame_is_an_error() {
        let mut writer = framed_writer::<_, SolutionMessage>(Vec::new());
        writer.send(solution_message("j1", 3)).await.unwrap();
        let frame = writer.into_inner().into_inner();

        // the worker died halfway through its second message
        let pipe = Builder::new()
            .read(&frame)
            .read(&frame[..frame.len() - 3])
            .build();
        let (frontend_tx, mut frontend_rx) = result_channel();

        let_assert!(Err(ChannelError::Io(_)) = pump_pipe_to_results(pipe, frontend_tx).await);
        assert_eq!(Ok(solution_message("j1", 3)), frontend_rx.try_recv());
        assert!(frontend_rx.try_recv().is_err());
    }
}
