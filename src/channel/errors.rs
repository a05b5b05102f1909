#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("the receiving end of the channel is gone")]
    Closed,

    #[error("pipe transport failed")]
    Io(#[from] std::io::Error),
}
