//! Message-queue primitive backends.
//!
//! [`MessageQueueBackend`] is the boundary between queue logic and the
//! kernel primitive. [`SysV`] talks to the System V syscalls;
//! [`MemoryBackend`] emulates them inside one process.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ControlError, QueueCreationError, ReceiveError, SendError};
use crate::key::QueueKey;

mod memory;
#[cfg(target_os = "linux")]
mod sysv;

pub use memory::MemoryBackend;
#[cfg(target_os = "linux")]
pub use sysv::SysV;

/// Identifier of an open kernel queue, as returned by `msgget`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueId(i32);

impl QueueId {
    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> i32 {
        self.0
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Message type tag.
///
/// Senders must use a positive value. On receive the value is handed to the
/// primitive untouched; for System V, `0` takes the first message of any
/// type, a positive value the first message of exactly that type, and a
/// negative value the first message with the lowest type not above its
/// absolute value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeSelector(i64);

impl TypeSelector {
    /// Tag used by `put` and `get` when none is given.
    pub const DEFAULT: Self = Self(1);

    /// Receive-side selector matching any message.
    pub const ANY: Self = Self(0);

    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> i64 {
        self.0
    }

    /// Whether this value may tag an outgoing message.
    pub const fn is_sendable(self) -> bool {
        self.0 > 0
    }
}

impl Default for TypeSelector {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<i64> for TypeSelector {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for TypeSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// How `open` treats an existing queue for the key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreationMode {
    /// Attach to the existing queue or create it.
    #[default]
    CreateIfMissing,
    /// Create the queue; fail if it already exists.
    ExclusiveCreate,
}

/// Whether a send or receive may suspend the calling thread.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BlockingMode {
    #[default]
    Blocking,
    NonBlocking,
}

impl BlockingMode {
    pub fn is_blocking(self) -> bool {
        matches!(self, Self::Blocking)
    }
}

/// One queued message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub type_selector: TypeSelector,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(type_selector: TypeSelector, payload: Vec<u8>) -> Self {
        Self {
            type_selector,
            payload,
        }
    }
}

/// Snapshot of a queue's kernel bookkeeping (`IPC_STAT`).
///
/// Times are seconds since the Unix epoch, `0` when the event never happened.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct QueueStat {
    pub key: QueueKey,
    pub uid: u32,
    pub gid: u32,
    pub cuid: u32,
    pub cgid: u32,
    pub mode: u32,
    pub messages: u64,
    pub max_bytes: u64,
    pub last_send_time: i64,
    pub last_receive_time: i64,
    pub last_change_time: i64,
    pub last_send_pid: i32,
    pub last_receive_pid: i32,
}

/// The operations a queue needs from the underlying primitive.
///
/// Each call maps onto at most one primitive operation; implementations do
/// not retry, including after `EINTR`.
pub trait MessageQueueBackend: Send + Sync {
    /// Attach to or create the queue for `key` with the given mode bits.
    fn open(
        &self,
        key: QueueKey,
        permissions: u32,
        creation: CreationMode,
    ) -> Result<QueueId, QueueCreationError>;

    /// Enqueue `message`. `message.type_selector` is positive.
    fn send(&self, id: QueueId, message: &Message, blocking: BlockingMode)
        -> Result<(), SendError>;

    /// Dequeue the oldest message matching `selector`, accepting payloads of
    /// up to `max_size` bytes.
    fn receive(
        &self,
        id: QueueId,
        selector: TypeSelector,
        max_size: usize,
        blocking: BlockingMode,
    ) -> Result<Message, ReceiveError>;

    fn stat(&self, id: QueueId) -> Result<QueueStat, ControlError>;

    /// Destroy the queue, discarding pending messages and waking blocked
    /// callers with a removal error.
    fn remove(&self, id: QueueId) -> Result<(), ControlError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_defaults() {
        assert_eq!(TypeSelector::default(), TypeSelector::DEFAULT);
        assert!(TypeSelector::DEFAULT.is_sendable());
        assert!(!TypeSelector::ANY.is_sendable());
        assert!(!TypeSelector::new(-3).is_sendable());
    }

    #[test]
    fn stat_serializes_to_json() {
        let stat = QueueStat {
            key: QueueKey::from_raw(5),
            messages: 2,
            ..QueueStat::default()
        };
        let json = serde_json::to_value(&stat).unwrap();
        assert_eq!(json["key"], 5);
        assert_eq!(json["messages"], 2);
    }
}
