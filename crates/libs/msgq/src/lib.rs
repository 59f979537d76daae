//! # msgq
//!
//! Persistent, process-independent message queues on top of System V IPC
//! (`ftok`, `msgget`, `msgsnd`, `msgrcv`, `msgctl`), with pluggable codecs
//! so unrelated processes can exchange structured values rather than raw
//! bytes.
//!
//! Processes find each other through a shared filesystem path and a small
//! discriminator. The kernel queue outlives every process using it until it
//! is removed explicitly.
//!
//! ## Layers
//!
//! - [`KeyResolver`]: `(path, discriminator)` → [`QueueKey`] ([`FtokResolver`] on Linux)
//! - [`MessageQueueBackend`]: the primitive ([`SysV`], or [`MemoryBackend`] in-process)
//! - [`QueueHandle`]: open / exclusive create / permissions / removal
//! - [`Codec`]: [`IdentityCodec`], [`JsonCodec`], [`MsgPackCodec`]
//! - [`Queue`]: `put` / `get` / iteration
//!
//! ## Example
//!
//! ```rust,no_run
//! use msgq::{IdentityCodec, Queue};
//!
//! let queue = Queue::open("/tmp", 1, IdentityCodec)?;
//! queue.put_display(&42)?;
//! assert_eq!(queue.get()?, "42");
//! # Ok::<(), msgq::QueueError>(())
//! ```

pub mod backend;
pub mod codec;
pub mod config;
pub mod error;
pub mod handle;
pub mod iter;
pub mod key;
pub mod queue;

#[cfg(target_os = "linux")]
mod sys;

#[cfg(target_os = "linux")]
pub use backend::SysV;
pub use backend::{
    BlockingMode, CreationMode, MemoryBackend, Message, MessageQueueBackend, QueueId, QueueStat,
    TypeSelector,
};
pub use codec::{Codec, CodecKind, IdentityCodec, JsonCodec, MsgPackCodec};
pub use config::QueueConfig;
pub use error::{
    ControlError, KeyDerivationError, QueueCreationError, QueueError, ReceiveError, SendError,
    SerializationError,
};
pub use handle::QueueHandle;
pub use iter::{CompatIter, Iter};
#[cfg(target_os = "linux")]
pub use key::FtokResolver;
pub use key::{KeyResolver, QueueKey};
pub use queue::{Queue, QueueBuilder};

/// Mode bits for newly created queues: read/write for everyone.
pub const DEFAULT_PERMISSIONS: u32 = 0o666;

/// Discriminator used when none is configured.
pub const DEFAULT_DISCRIMINATOR: u8 = 1;

/// Largest payload a queue sends or expects to receive (Linux `MSGMAX`).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 8192;

/// Pending-byte capacity of a queue (Linux `MSGMNB`).
pub const DEFAULT_QUEUE_BYTES: usize = 16384;
