//! Typed queue: a [`QueueHandle`] plus a [`Codec`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backend::{
    BlockingMode, CreationMode, Message, MessageQueueBackend, QueueStat, TypeSelector,
};
use crate::codec::{Codec, IdentityCodec};
use crate::config::QueueConfig;
use crate::error::{QueueError, SendError};
use crate::handle::QueueHandle;
use crate::iter::{CompatIter, Iter};
use crate::key::{KeyResolver, QueueKey};
use crate::{DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_PERMISSIONS};

/// A persistent message queue carrying values of `C::Item`.
///
/// Every operation is a single call into the backend; there is no
/// in-process locking, and a `Queue` can be shared between threads behind
/// an `Arc`. Ordering is FIFO per type selector and otherwise whatever the
/// primitive provides.
///
/// ```rust,no_run
/// use msgq::{JsonCodec, Queue};
///
/// let queue = Queue::open("/var/run/worker", 1, JsonCodec::<serde_json::Value>::new())?;
/// queue.put(&serde_json::json!({"job": 7}))?;
/// let job = queue.get()?;
/// # Ok::<(), msgq::QueueError>(())
/// ```
pub struct Queue<C> {
    handle: QueueHandle,
    codec: C,
    max_message_size: usize,
}

impl<C: Codec> Queue<C> {
    /// Attach to (or create) the queue anchored at `path` with the default
    /// resolver, backend and permissions.
    pub fn open(path: impl AsRef<Path>, discriminator: u8, codec: C) -> Result<Self, QueueError> {
        QueueBuilder::new(path, discriminator).build(codec)
    }

    pub fn builder(path: impl AsRef<Path>, discriminator: u8) -> QueueBuilder {
        QueueBuilder::new(path, discriminator)
    }

    /// Wrap an already opened handle.
    pub fn from_handle(handle: QueueHandle, codec: C) -> Self {
        Self {
            handle,
            codec,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    /// Largest payload accepted by `put` and expected by `get`.
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Blocking put with the default type selector.
    pub fn put(&self, item: &C::Item) -> Result<(), QueueError> {
        self.put_with(item, TypeSelector::DEFAULT, BlockingMode::Blocking)
    }

    /// Non-blocking put with the default type selector; fails with
    /// `QueueFull` instead of waiting.
    pub fn try_put(&self, item: &C::Item) -> Result<(), QueueError> {
        self.put_with(item, TypeSelector::DEFAULT, BlockingMode::NonBlocking)
    }

    pub fn put_with(
        &self,
        item: &C::Item,
        selector: TypeSelector,
        blocking: BlockingMode,
    ) -> Result<(), QueueError> {
        if !selector.is_sendable() {
            return Err(SendError::InvalidType(selector.get()).into());
        }
        let payload = self.codec.encode(item)?;
        if payload.len() > self.max_message_size {
            return Err(SendError::TooLarge {
                size: payload.len(),
                limit: self.max_message_size,
            }
            .into());
        }

        let message = Message::new(selector, payload);
        self.handle
            .backend()
            .send(self.handle.id(), &message, blocking)?;
        log::trace!(
            "msgq: put {} bytes type {} on queue {}",
            message.payload.len(),
            selector,
            self.handle.id()
        );
        Ok(())
    }

    /// Blocking get with the default type selector.
    pub fn get(&self) -> Result<C::Item, QueueError> {
        self.get_with(TypeSelector::DEFAULT, BlockingMode::Blocking)
    }

    /// Non-blocking get with the default type selector; fails with
    /// `NoMessage` when nothing matches.
    pub fn try_get(&self) -> Result<C::Item, QueueError> {
        self.get_with(TypeSelector::DEFAULT, BlockingMode::NonBlocking)
    }

    pub fn get_with(
        &self,
        selector: TypeSelector,
        blocking: BlockingMode,
    ) -> Result<C::Item, QueueError> {
        self.get_message(selector, blocking).map(|(_, item)| item)
    }

    /// Like [`get_with`](Self::get_with), also returning the type the
    /// message was sent with. Useful with [`TypeSelector::ANY`] or negative
    /// selectors.
    pub fn get_message(
        &self,
        selector: TypeSelector,
        blocking: BlockingMode,
    ) -> Result<(TypeSelector, C::Item), QueueError> {
        let message = self.handle.backend().receive(
            self.handle.id(),
            selector,
            self.max_message_size,
            blocking,
        )?;
        log::trace!(
            "msgq: got {} bytes type {} from queue {}",
            message.payload.len(),
            message.type_selector,
            self.handle.id()
        );
        let item = self.codec.decode(&message.payload)?;
        Ok((message.type_selector, item))
    }

    /// Blocking iteration over the default type selector.
    ///
    /// Ends only when the queue reports no message; removal, decode and
    /// other failures are yielded once as `Err`, after which the iterator is
    /// exhausted.
    pub fn iter(&self) -> Iter<'_, C> {
        self.iter_with(TypeSelector::DEFAULT, BlockingMode::Blocking)
    }

    /// Non-blocking iteration: drains what is queued now and stops cleanly
    /// when nothing is left.
    pub fn poll_iter(&self) -> Iter<'_, C> {
        self.iter_with(TypeSelector::DEFAULT, BlockingMode::NonBlocking)
    }

    pub fn iter_with(&self, selector: TypeSelector, blocking: BlockingMode) -> Iter<'_, C> {
        Iter::new(self, selector, blocking)
    }

    /// Blocking iteration that stops silently on the first error of any kind.
    ///
    /// A caller cannot tell a removed queue from a payload that failed to
    /// decode; use [`iter`](Self::iter) or [`get`](Self::get) to react to
    /// individual failures.
    pub fn iter_compat(&self) -> CompatIter<'_, C> {
        CompatIter::new(self.iter())
    }

    pub fn stat(&self) -> Result<QueueStat, QueueError> {
        Ok(self.handle.stat()?)
    }

    /// Destroy the underlying queue.
    pub fn remove(self) -> Result<(), QueueError> {
        Ok(self.handle.remove()?)
    }
}

impl<C> Queue<C> {
    pub fn handle(&self) -> &QueueHandle {
        &self.handle
    }

    pub fn handle_mut(&mut self) -> &mut QueueHandle {
        &mut self.handle
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn key(&self) -> QueueKey {
        self.handle.key()
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    pub fn into_handle(self) -> QueueHandle {
        self.handle
    }
}

impl Queue<IdentityCodec> {
    /// Put the `Display` form of `value`.
    pub fn put_display(&self, value: &impl fmt::Display) -> Result<(), QueueError> {
        self.put(&value.to_string())
    }

    pub fn put_display_with(
        &self,
        value: &impl fmt::Display,
        selector: TypeSelector,
        blocking: BlockingMode,
    ) -> Result<(), QueueError> {
        self.put_with(&value.to_string(), selector, blocking)
    }
}

impl<C: fmt::Debug> fmt::Debug for Queue<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("handle", &self.handle)
            .field("codec", &self.codec)
            .field("max_message_size", &self.max_message_size)
            .finish()
    }
}

impl<'q, C: Codec> IntoIterator for &'q Queue<C> {
    type Item = Result<C::Item, QueueError>;
    type IntoIter = Iter<'q, C>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Configures and opens a [`Queue`].
#[must_use]
pub struct QueueBuilder {
    path: PathBuf,
    discriminator: u8,
    permissions: u32,
    creation: CreationMode,
    max_message_size: usize,
    remove_on_drop: bool,
    key: Option<QueueKey>,
    resolver: Option<Arc<dyn KeyResolver>>,
    backend: Option<Arc<dyn MessageQueueBackend>>,
}

impl QueueBuilder {
    pub fn new(path: impl AsRef<Path>, discriminator: u8) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            discriminator,
            permissions: DEFAULT_PERMISSIONS,
            creation: CreationMode::CreateIfMissing,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            remove_on_drop: false,
            key: None,
            resolver: None,
            backend: None,
        }
    }

    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new(&config.path, config.discriminator)
            .permissions(config.permissions)
            .exclusive(config.exclusive)
            .max_message_size(config.max_message_size)
            .remove_on_drop(config.remove_on_drop)
    }

    pub fn permissions(mut self, mode: u32) -> Self {
        self.permissions = mode;
        self
    }

    pub fn creation_mode(mut self, creation: CreationMode) -> Self {
        self.creation = creation;
        self
    }

    pub fn exclusive(self, exclusive: bool) -> Self {
        self.creation_mode(if exclusive {
            CreationMode::ExclusiveCreate
        } else {
            CreationMode::CreateIfMissing
        })
    }

    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    pub fn remove_on_drop(mut self, remove: bool) -> Self {
        self.remove_on_drop = remove;
        self
    }

    /// Use `key` as is, skipping key derivation.
    pub fn key(mut self, key: QueueKey) -> Self {
        self.key = Some(key);
        self
    }

    pub fn resolver(mut self, resolver: impl KeyResolver + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    pub fn backend(mut self, backend: Arc<dyn MessageQueueBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn build<C: Codec>(self, codec: C) -> Result<Queue<C>, QueueError> {
        let key = match self.key {
            Some(key) => key,
            None => {
                let resolver = match self.resolver {
                    Some(resolver) => resolver,
                    None => default_resolver()?,
                };
                resolver.resolve(&self.path, self.discriminator)?
            }
        };
        let backend = match self.backend {
            Some(backend) => backend,
            None => default_backend()?,
        };

        let mut handle = QueueHandle::open(backend, key, self.permissions, self.creation)?;
        handle.set_remove_on_drop(self.remove_on_drop);
        Ok(Queue::from_handle(handle, codec).with_max_message_size(self.max_message_size))
    }
}

impl fmt::Debug for QueueBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueBuilder")
            .field("path", &self.path)
            .field("discriminator", &self.discriminator)
            .field("permissions", &format_args!("{:o}", self.permissions))
            .field("creation", &self.creation)
            .field("max_message_size", &self.max_message_size)
            .field("remove_on_drop", &self.remove_on_drop)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

#[cfg(target_os = "linux")]
fn default_resolver() -> Result<Arc<dyn KeyResolver>, QueueError> {
    Ok(Arc::new(crate::key::FtokResolver))
}

#[cfg(not(target_os = "linux"))]
fn default_resolver() -> Result<Arc<dyn KeyResolver>, QueueError> {
    Err(QueueError::Unsupported("ftok key derivation"))
}

#[cfg(target_os = "linux")]
fn default_backend() -> Result<Arc<dyn MessageQueueBackend>, QueueError> {
    Ok(Arc::new(crate::backend::SysV))
}

#[cfg(not(target_os = "linux"))]
fn default_backend() -> Result<Arc<dyn MessageQueueBackend>, QueueError> {
    Err(QueueError::Unsupported("System V message queues"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::codec::JsonCodec;
    use crate::error::{ReceiveError, SerializationError};
    use crate::KeyDerivationError;

    fn fixed_key(_: &Path, id: u8) -> Result<QueueKey, KeyDerivationError> {
        Ok(QueueKey::from_raw(0x7000 + i32::from(id)))
    }

    fn queue<C: Codec>(backend: &Arc<MemoryBackend>, codec: C) -> Queue<C> {
        QueueBuilder::new("/virtual/anchor", 1)
            .resolver(fixed_key)
            .backend(backend.clone())
            .build(codec)
            .unwrap()
    }

    /// Codec that upper-cases on the way in and fails on a marker payload.
    struct Shouting;

    impl Codec for Shouting {
        type Item = String;

        fn encode(&self, item: &String) -> Result<Vec<u8>, SerializationError> {
            Ok(item.to_uppercase().into_bytes())
        }

        fn decode(&self, payload: &[u8]) -> Result<String, SerializationError> {
            if payload == b"POISON" {
                return Err(SerializationError::decode("poisoned payload"));
            }
            Ok(String::from_utf8_lossy(payload).into_owned())
        }
    }

    #[test]
    fn builder_uses_injected_resolver() {
        let backend = Arc::new(MemoryBackend::new());
        let q = queue(&backend, IdentityCodec);
        assert_eq!(q.key(), QueueKey::from_raw(0x7001));
    }

    #[test]
    fn explicit_key_skips_resolution() {
        let backend = Arc::new(MemoryBackend::new());
        let q = QueueBuilder::new("/does/not/matter", 1)
            .resolver(|_: &Path, _: u8| -> Result<QueueKey, KeyDerivationError> {
                Err(KeyDerivationError::ZeroDiscriminator)
            })
            .key(QueueKey::from_raw(99))
            .backend(backend)
            .build(IdentityCodec)
            .unwrap();
        assert_eq!(q.key(), QueueKey::from_raw(99));
    }

    #[test]
    fn resolver_failure_surfaces() {
        let backend = Arc::new(MemoryBackend::new());
        let err = QueueBuilder::new("/missing", 0)
            .resolver(|_: &Path, _: u8| -> Result<QueueKey, KeyDerivationError> {
                Err(KeyDerivationError::ZeroDiscriminator)
            })
            .backend(backend)
            .build(IdentityCodec)
            .unwrap_err();
        assert!(matches!(err, QueueError::Key(KeyDerivationError::ZeroDiscriminator)));
    }

    #[test]
    fn queue_logic_is_codec_agnostic() {
        let backend = Arc::new(MemoryBackend::new());
        let q = queue(&backend, Shouting);
        q.put(&"quiet".to_string()).unwrap();
        assert_eq!(q.get().unwrap(), "QUIET");
    }

    #[test]
    fn decode_failure_surfaces_from_get() {
        let backend = Arc::new(MemoryBackend::new());
        let q = queue(&backend, Shouting);
        q.put(&"poison".to_string()).unwrap();
        let err = q.try_get().unwrap_err();
        assert!(matches!(
            err,
            QueueError::Serialization(SerializationError::DecodeFailed(_))
        ));
    }

    #[test]
    fn put_display_uses_text_form() {
        let backend = Arc::new(MemoryBackend::new());
        let q = queue(&backend, IdentityCodec);
        q.put_display(&42).unwrap();
        q.put_display(&3.5).unwrap();
        assert_eq!(q.get().unwrap(), "42");
        assert_eq!(q.get().unwrap(), "3.5");
    }

    #[test]
    fn non_positive_type_rejected() {
        let backend = Arc::new(MemoryBackend::new());
        let q = queue(&backend, IdentityCodec);
        let err = q
            .put_with(&"x".to_string(), TypeSelector::ANY, BlockingMode::NonBlocking)
            .unwrap_err();
        assert!(matches!(err, QueueError::Send(SendError::InvalidType(0))));
    }

    #[test]
    fn oversized_payload_rejected_before_send() {
        let backend = Arc::new(MemoryBackend::new());
        let q = queue(&backend, IdentityCodec).with_max_message_size(4);
        let err = q.try_put(&"too long".to_string()).unwrap_err();
        assert!(matches!(
            err,
            QueueError::Send(SendError::TooLarge { size: 8, limit: 4 })
        ));
        assert_eq!(q.stat().unwrap().messages, 0);
    }

    #[test]
    fn selectors_route_messages() {
        let backend = Arc::new(MemoryBackend::new());
        let q = queue(&backend, JsonCodec::<u32>::new());
        q.put_with(&10, TypeSelector::new(2), BlockingMode::NonBlocking).unwrap();
        q.put_with(&20, TypeSelector::new(5), BlockingMode::NonBlocking).unwrap();

        assert!(matches!(
            q.try_get(),
            Err(QueueError::Receive(ReceiveError::NoMessage))
        ));
        let (kind, value) = q
            .get_message(TypeSelector::new(5), BlockingMode::NonBlocking)
            .unwrap();
        assert_eq!((kind, value), (TypeSelector::new(5), 20));
        let (kind, value) = q.get_message(TypeSelector::ANY, BlockingMode::NonBlocking).unwrap();
        assert_eq!((kind, value), (TypeSelector::new(2), 10));
    }

    #[test]
    fn two_queues_share_one_kernel_queue() {
        let backend = Arc::new(MemoryBackend::new());
        let producer = queue(&backend, IdentityCodec);
        let consumer = queue(&backend, IdentityCodec);
        producer.put_display(&"hello").unwrap();
        assert_eq!(consumer.try_get().unwrap(), "hello");
    }

    #[test]
    fn remove_on_drop_from_builder() {
        let backend = Arc::new(MemoryBackend::new());
        let q = QueueBuilder::new("/virtual", 1)
            .resolver(fixed_key)
            .backend(backend.clone())
            .remove_on_drop(true)
            .build(IdentityCodec)
            .unwrap();
        assert!(q.handle().removes_on_drop());
        drop(q);
        assert!(backend.is_empty());
    }
}
