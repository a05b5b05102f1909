use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::debug;

use super::errors::ChannelError;
use crate::models::worker_message::WorkerCommand;

/// creates the frontend -> worker job channel.
///
/// The channel buffers without bound, but the receiver only ever hands out
/// the most recent command. Commands the worker did not poll in time are
/// skipped.
pub fn job_channel() -> (JobSender, JobReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (JobSender { tx }, JobReceiver { rx })
}

#[derive(Debug, Clone)]
pub struct JobSender {
    tx: mpsc::UnboundedSender<WorkerCommand>,
}

impl JobSender {
    /// enqueue a command. Never blocks and never waits for the worker.
    pub fn send(&self, command: WorkerCommand) -> Result<(), ChannelError> {
        self.tx.send(command).map_err(|_| ChannelError::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[derive(Debug)]
pub struct JobReceiver {
    rx: mpsc::UnboundedReceiver<WorkerCommand>,
}

impl JobReceiver {
    /// Non-blocking receive of the freshest pending command.
    ///
    /// Drains everything that is pending and returns the last command. A
    /// pending [WorkerCommand::Shutdown] is never superseded by a later
    /// `Mine`.
    ///
    /// Returns [TryRecvError::Empty] when nothing is pending and
    /// [TryRecvError::Disconnected] when nothing is pending and every
    /// sender is gone.
    pub fn try_recv_latest(&mut self) -> Result<WorkerCommand, TryRecvError> {
        let first = self.rx.try_recv()?;
        Ok(self.drain_after(first))
    }

    /// Waits for the next command, then behaves like
    /// [Self::try_recv_latest]. Returns `None` once every sender is gone.
    pub async fn recv_latest(&mut self) -> Option<WorkerCommand> {
        let first = self.rx.recv().await?;
        Some(self.drain_after(first))
    }

    fn drain_after(&mut self, mut latest: WorkerCommand) -> WorkerCommand {
        let mut skipped = 0usize;
        while let Ok(next) = self.rx.try_recv() {
            if !matches!(latest, WorkerCommand::Shutdown) {
                latest = next;
            }
            skipped += 1;
        }
        if skipped > 0 {
            debug!("skipped {} superseded job command(s)", skipped);
        }
        latest
    }

    /// every pending command, oldest first, without superseding.
    #[cfg(test)]
    pub(crate) fn drain_pending(&mut self) -> Vec<WorkerCommand> {
        std::iter::from_fn(|| self.rx.try_recv().ok()).collect()
    }
}
