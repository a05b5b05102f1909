use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use super::errors::ChannelError;
use crate::models::worker_message::SolutionMessage;

/// creates the worker -> frontend result channel. FIFO.
pub fn result_channel() -> (ResultSender, ResultReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ResultSender { tx }, ResultReceiver { rx })
}

/// Sending half. Usable from blocking code, e.g. inside the worker loop.
#[derive(Debug, Clone)]
pub struct ResultSender {
    tx: mpsc::UnboundedSender<SolutionMessage>,
}

impl ResultSender {
    pub fn send(&self, message: SolutionMessage) -> Result<(), ChannelError> {
        self.tx.send(message).map_err(|_| ChannelError::Closed)
    }
}

#[derive(Debug)]
pub struct ResultReceiver {
    rx: mpsc::UnboundedReceiver<SolutionMessage>,
}

impl ResultReceiver {
    /// waits for the next message. `None` once every sender is gone, which
    /// is how the frontend learns that its worker has exited.
    pub async fn recv(&mut self) -> Option<SolutionMessage> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Result<SolutionMessage, TryRecvError> {
        self.rx.try_recv()
    }
}
