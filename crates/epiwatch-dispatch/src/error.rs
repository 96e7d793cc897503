use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// A dispatch for this event is still running. Recoverable: the caller
    /// may retry after it settles; requests are rejected, never queued.
    #[error("Dispatch already in progress for event {0}")]
    InProgress(String),

    #[error("Dispatch attempt not found: {0}")]
    AttemptNotFound(String),

    /// The attempt settled before the cancellation could be applied.
    #[error("Dispatch attempt already settled: {0}")]
    AttemptSettled(String),

    #[error("Recipient directory error: {0}")]
    Directory(String),

    #[error("Internal dispatch error: {0}")]
    Internal(String),
}

impl DispatchError {
    pub fn directory(message: impl Into<String>) -> Self {
        Self::Directory(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;
