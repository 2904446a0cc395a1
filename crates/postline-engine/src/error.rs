use postline_channels::ChannelError;
use postline_core::PostlineError;
use thiserror::Error;

/// Failures of the single-writer state thread.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Store(#[from] PostlineError),

    #[error("state executor has shut down")]
    ChannelClosed,
}

/// A publication run that did not complete. Rotation state is untouched
/// whenever one of these is returned before the publish step succeeded.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("rotation state: {0}")]
    State(#[from] ExecutorError),

    #[error("content plan: {0}")]
    Plan(#[source] PostlineError),

    #[error("generation failed: {0}")]
    Generation(#[source] ChannelError),

    #[error("publishing failed: {0}")]
    Publish(#[source] ChannelError),

    #[error("run timed out after {secs}s")]
    TimedOut { secs: u64 },
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Talking to a running scheduler over its control socket.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("no scheduler is listening: {0}")]
    Unavailable(#[source] std::io::Error),

    #[error("control socket I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed control message: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("scheduler closed the connection without replying")]
    Closed,
}
