use std::io;
use std::path::PathBuf;

/// Failure to derive a [`QueueKey`](crate::QueueKey) from a path.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum KeyDerivationError {
    #[error("cannot resolve key anchor {path}: {source}")]
    Unresolvable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("key anchor path contains an interior NUL byte: {0}")]
    InvalidPath(PathBuf),

    #[error("discriminator must be non-zero")]
    ZeroDiscriminator,
}

/// Errors from opening or creating a queue.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum QueueCreationError {
    #[error("queue already exists")]
    AlreadyExists,

    #[error("permission denied")]
    PermissionDenied,

    #[error("system limit on message queues reached")]
    LimitReached,

    #[error("msgget failed: {0}")]
    Os(#[source] io::Error),
}

/// Errors from enqueueing a message.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SendError {
    #[error("queue is full")]
    QueueFull,

    #[error("queue handle is no longer valid")]
    InvalidHandle,

    #[error("message type must be positive, got {0}")]
    InvalidType(i64),

    #[error("payload of {size} bytes exceeds the {limit} byte message limit")]
    TooLarge { size: usize, limit: usize },

    #[error("permission denied")]
    PermissionDenied,

    #[error("interrupted by signal")]
    Interrupted,

    #[error("msgsnd failed: {0}")]
    Os(#[source] io::Error),
}

/// Errors from dequeueing a message.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ReceiveError {
    #[error("no message available")]
    NoMessage,

    #[error("queue was removed")]
    QueueRemoved,

    #[error("type selector {0} is out of range for this platform")]
    InvalidSelector(i64),

    #[error("pending message is larger than the {limit} byte receive buffer")]
    TooLarge { limit: usize },

    #[error("permission denied")]
    PermissionDenied,

    #[error("interrupted by signal")]
    Interrupted,

    #[error("msgrcv failed: {0}")]
    Os(#[source] io::Error),
}

/// Errors from control operations (stat, remove).
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ControlError {
    #[error("queue handle is no longer valid")]
    InvalidHandle,

    #[error("permission denied")]
    PermissionDenied,

    #[error("msgctl failed: {0}")]
    Os(#[source] io::Error),
}

/// Errors from a [`Codec`](crate::Codec).
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SerializationError {
    #[error("encode failed: {0}")]
    EncodeFailed(String),

    #[error("decode failed: {0}")]
    DecodeFailed(String),
}

impl SerializationError {
    pub fn encode(err: impl std::fmt::Display) -> Self {
        Self::EncodeFailed(err.to_string())
    }

    pub fn decode(err: impl std::fmt::Display) -> Self {
        Self::DecodeFailed(err.to_string())
    }
}

/// Any error surfaced by a [`Queue`](crate::Queue) operation.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum QueueError {
    #[error(transparent)]
    Key(#[from] KeyDerivationError),

    #[error(transparent)]
    Creation(#[from] QueueCreationError),

    #[error(transparent)]
    Send(#[from] SendError),

    #[error(transparent)]
    Receive(#[from] ReceiveError),

    #[error(transparent)]
    Control(#[from] ControlError),

    #[error(transparent)]
    Serialization(#[from] SerializationError),

    #[error("{0} is not available on this platform")]
    Unsupported(&'static str),
}

impl QueueError {
    /// Returns `true` for transient errors that may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Send(SendError::QueueFull | SendError::Interrupted)
                | Self::Receive(ReceiveError::NoMessage | ReceiveError::Interrupted)
        )
    }

    /// Returns `true` when the underlying queue no longer exists.
    pub fn is_queue_gone(&self) -> bool {
        matches!(
            self,
            Self::Send(SendError::InvalidHandle)
                | Self::Receive(ReceiveError::QueueRemoved)
                | Self::Control(ControlError::InvalidHandle)
        )
    }
}
