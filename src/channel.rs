//! The job/result channel pair connecting a frontend coordinator with its
//! worker.
//!
//! Both channels are plain in-process channels. When the worker lives in a
//! separate process, [codec] bridges each channel onto one of the child's
//! pipes so that neither side has to know where the other one runs.

pub mod codec;
pub mod errors;
mod job_channel;
mod result_channel;

pub use job_channel::job_channel;
pub use job_channel::JobReceiver;
pub use job_channel::JobSender;
pub use result_channel::result_channel;
pub use result_channel::ResultReceiver;
pub use result_channel::ResultSender;
pub use tokio::sync::mpsc::error::TryRecvError;
