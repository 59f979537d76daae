use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use super::{
    BlockingMode, CreationMode, Message, MessageQueueBackend, QueueId, QueueStat, TypeSelector,
};
use crate::error::{ControlError, QueueCreationError, ReceiveError, SendError};
use crate::key::QueueKey;
use crate::{DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_QUEUE_BYTES};

/// Process-local emulation of System V message queues.
///
/// Queues live as long as the backend. Type selectors, byte capacity,
/// per-message size limits, blocking and removal behave like the kernel
/// primitive; permission bits are recorded but not enforced. Key `0` acts
/// like `IPC_PRIVATE` and always creates a fresh queue.
pub struct MemoryBackend {
    registry: Mutex<Registry>,
    max_bytes: usize,
    max_message_size: usize,
}

#[derive(Default)]
struct Registry {
    next_id: i32,
    by_key: HashMap<QueueKey, QueueId>,
    queues: HashMap<QueueId, Arc<Slot>>,
}

struct Slot {
    key: QueueKey,
    mode: u32,
    state: Mutex<SlotState>,
    changed: Condvar,
}

#[derive(Default)]
struct SlotState {
    messages: VecDeque<Message>,
    bytes: usize,
    removed: bool,
    last_send_time: i64,
    last_receive_time: i64,
    last_change_time: i64,
    last_send_pid: i32,
    last_receive_pid: i32,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn pid() -> i32 {
    std::process::id() as i32
}

/// Index of the message `selector` picks, following `msgrcv(2)`.
fn select(messages: &VecDeque<Message>, selector: TypeSelector) -> Option<usize> {
    match selector.get() {
        0 => (!messages.is_empty()).then_some(0),
        wanted if wanted > 0 => messages
            .iter()
            .position(|m| m.type_selector.get() == wanted),
        bound => {
            let bound = bound.unsigned_abs();
            messages
                .iter()
                .enumerate()
                .filter(|(_, m)| m.type_selector.get().unsigned_abs() <= bound)
                .min_by_key(|(_, m)| m.type_selector)
                .map(|(idx, _)| idx)
        }
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_QUEUE_BYTES, DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// `max_bytes` bounds the payload bytes pending per queue (`msg_qbytes`),
    /// `max_message_size` a single payload (`MSGMAX`).
    pub fn with_limits(max_bytes: usize, max_message_size: usize) -> Self {
        Self {
            registry: Mutex::new(Registry {
                next_id: 1,
                ..Registry::default()
            }),
            max_bytes,
            max_message_size,
        }
    }

    /// Number of live queues.
    pub fn len(&self) -> usize {
        lock(&self.registry).queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, id: QueueId) -> Option<Arc<Slot>> {
        lock(&self.registry).queues.get(&id).cloned()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageQueueBackend for MemoryBackend {
    fn open(
        &self,
        key: QueueKey,
        permissions: u32,
        creation: CreationMode,
    ) -> Result<QueueId, QueueCreationError> {
        let mut registry = lock(&self.registry);
        let private = key.as_raw() == 0;

        if !private {
            if let Some(id) = registry.by_key.get(&key) {
                if creation == CreationMode::ExclusiveCreate {
                    return Err(QueueCreationError::AlreadyExists);
                }
                return Ok(*id);
            }
        }

        let id = QueueId::from_raw(registry.next_id);
        registry.next_id = registry
            .next_id
            .checked_add(1)
            .ok_or(QueueCreationError::LimitReached)?;

        let slot = Slot {
            key,
            mode: permissions & 0o777,
            state: Mutex::new(SlotState {
                last_change_time: now(),
                ..SlotState::default()
            }),
            changed: Condvar::new(),
        };
        registry.queues.insert(id, Arc::new(slot));
        if !private {
            registry.by_key.insert(key, id);
        }
        Ok(id)
    }

    fn send(
        &self,
        id: QueueId,
        message: &Message,
        blocking: BlockingMode,
    ) -> Result<(), SendError> {
        if !message.type_selector.is_sendable() {
            return Err(SendError::InvalidType(message.type_selector.get()));
        }
        // The kernel fails these with EINVAL instead of blocking.
        let size = message.payload.len();
        let limit = self.max_message_size.min(self.max_bytes);
        if size > limit {
            return Err(SendError::TooLarge { size, limit });
        }

        let slot = self.slot(id).ok_or(SendError::InvalidHandle)?;
        let mut state = lock(&slot.state);
        loop {
            if state.removed {
                return Err(SendError::InvalidHandle);
            }
            if state.bytes + size <= self.max_bytes {
                break;
            }
            if !blocking.is_blocking() {
                return Err(SendError::QueueFull);
            }
            state = slot
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }

        state.messages.push_back(message.clone());
        state.bytes += size;
        state.last_send_time = now();
        state.last_send_pid = pid();
        drop(state);
        slot.changed.notify_all();
        Ok(())
    }

    fn receive(
        &self,
        id: QueueId,
        selector: TypeSelector,
        max_size: usize,
        blocking: BlockingMode,
    ) -> Result<Message, ReceiveError> {
        let slot = self.slot(id).ok_or(ReceiveError::QueueRemoved)?;
        let mut state = lock(&slot.state);
        let idx = loop {
            if state.removed {
                return Err(ReceiveError::QueueRemoved);
            }
            if let Some(idx) = select(&state.messages, selector) {
                break idx;
            }
            if !blocking.is_blocking() {
                return Err(ReceiveError::NoMessage);
            }
            state = slot
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        };

        // Oversized messages stay queued, as with msgrcv without MSG_NOERROR.
        if state.messages[idx].payload.len() > max_size {
            return Err(ReceiveError::TooLarge { limit: max_size });
        }
        let message = state
            .messages
            .remove(idx)
            .ok_or(ReceiveError::NoMessage)?;
        state.bytes -= message.payload.len();
        state.last_receive_time = now();
        state.last_receive_pid = pid();
        drop(state);
        slot.changed.notify_all();
        Ok(message)
    }

    fn stat(&self, id: QueueId) -> Result<QueueStat, ControlError> {
        let slot = self.slot(id).ok_or(ControlError::InvalidHandle)?;
        let state = lock(&slot.state);
        Ok(QueueStat {
            key: slot.key,
            uid: 0,
            gid: 0,
            cuid: 0,
            cgid: 0,
            mode: slot.mode,
            messages: state.messages.len() as u64,
            max_bytes: self.max_bytes as u64,
            last_send_time: state.last_send_time,
            last_receive_time: state.last_receive_time,
            last_change_time: state.last_change_time,
            last_send_pid: state.last_send_pid,
            last_receive_pid: state.last_receive_pid,
        })
    }

    fn remove(&self, id: QueueId) -> Result<(), ControlError> {
        let slot = {
            let mut registry = lock(&self.registry);
            let slot = registry
                .queues
                .remove(&id)
                .ok_or(ControlError::InvalidHandle)?;
            if registry.by_key.get(&slot.key) == Some(&id) {
                registry.by_key.remove(&slot.key);
            }
            slot
        };

        let mut state = lock(&slot.state);
        state.removed = true;
        state.messages.clear();
        state.bytes = 0;
        drop(state);
        slot.changed.notify_all();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;

    const KEY: QueueKey = QueueKey::from_raw(0x1234);

    fn msg(kind: i64, body: &str) -> Message {
        Message::new(TypeSelector::new(kind), body.as_bytes().to_vec())
    }

    fn recv(backend: &MemoryBackend, id: QueueId, selector: i64) -> Result<Message, ReceiveError> {
        backend.receive(id, TypeSelector::new(selector), 64, BlockingMode::NonBlocking)
    }

    #[test]
    fn open_attaches_or_creates() {
        let backend = MemoryBackend::new();
        let a = backend.open(KEY, 0o600, CreationMode::CreateIfMissing).unwrap();
        let b = backend.open(KEY, 0o600, CreationMode::CreateIfMissing).unwrap();
        assert_eq!(a, b);
        assert!(matches!(
            backend.open(KEY, 0o600, CreationMode::ExclusiveCreate),
            Err(QueueCreationError::AlreadyExists)
        ));
        assert_eq!(backend.len(), 1);
    }

    #[test]
    fn private_key_always_creates() {
        let backend = MemoryBackend::new();
        let private = QueueKey::from_raw(0);
        let a = backend.open(private, 0o600, CreationMode::ExclusiveCreate).unwrap();
        let b = backend.open(private, 0o600, CreationMode::ExclusiveCreate).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn selector_semantics() {
        let backend = MemoryBackend::new();
        let id = backend.open(KEY, 0o600, CreationMode::CreateIfMissing).unwrap();
        for (kind, body) in [(3, "c1"), (1, "a1"), (2, "b1"), (1, "a2")] {
            backend.send(id, &msg(kind, body), BlockingMode::NonBlocking).unwrap();
        }

        // exact type, FIFO within it
        assert_eq!(recv(&backend, id, 1).unwrap().payload, b"a1");
        // lowest type not above |t|
        assert_eq!(recv(&backend, id, -3).unwrap().payload, b"a2");
        // any: oldest overall
        assert_eq!(recv(&backend, id, 0).unwrap().payload, b"c1");
        assert!(matches!(recv(&backend, id, 3), Err(ReceiveError::NoMessage)));
        assert_eq!(recv(&backend, id, 2).unwrap().type_selector, TypeSelector::new(2));
    }

    #[test]
    fn capacity_is_enforced() {
        let backend = MemoryBackend::with_limits(8, 8);
        let id = backend.open(KEY, 0o600, CreationMode::CreateIfMissing).unwrap();
        backend.send(id, &msg(1, "12345"), BlockingMode::NonBlocking).unwrap();
        assert!(matches!(
            backend.send(id, &msg(1, "6789"), BlockingMode::NonBlocking),
            Err(SendError::QueueFull)
        ));
        assert!(matches!(
            backend.send(id, &msg(1, "123456789"), BlockingMode::NonBlocking),
            Err(SendError::TooLarge { size: 9, limit: 8 })
        ));
    }

    #[test]
    fn payload_above_capacity_fails_instead_of_blocking() {
        let backend = MemoryBackend::with_limits(4, 8);
        let id = backend.open(KEY, 0o600, CreationMode::CreateIfMissing).unwrap();
        assert!(matches!(
            backend.send(id, &msg(1, "123456"), BlockingMode::Blocking),
            Err(SendError::TooLarge { size: 6, limit: 4 })
        ));
        assert_eq!(backend.stat(id).unwrap().messages, 0);
    }

    #[test]
    fn oversized_message_stays_queued() {
        let backend = MemoryBackend::new();
        let id = backend.open(KEY, 0o600, CreationMode::CreateIfMissing).unwrap();
        backend.send(id, &msg(1, "long body"), BlockingMode::NonBlocking).unwrap();
        assert!(matches!(
            backend.receive(id, TypeSelector::ANY, 4, BlockingMode::NonBlocking),
            Err(ReceiveError::TooLarge { limit: 4 })
        ));
        assert_eq!(recv(&backend, id, 0).unwrap().payload, b"long body");
    }

    #[test]
    fn blocked_sender_resumes_when_space_frees() {
        let backend = Arc::new(MemoryBackend::with_limits(4, 4));
        let id = backend.open(KEY, 0o600, CreationMode::CreateIfMissing).unwrap();
        backend.send(id, &msg(1, "full"), BlockingMode::NonBlocking).unwrap();

        let sender = {
            let backend = Arc::clone(&backend);
            thread::spawn(move || backend.send(id, &msg(1, "next"), BlockingMode::Blocking))
        };
        thread::sleep(Duration::from_millis(20));
        assert_eq!(recv(&backend, id, 0).unwrap().payload, b"full");
        sender.join().unwrap().unwrap();
        assert_eq!(recv(&backend, id, 0).unwrap().payload, b"next");
    }

    #[test]
    fn remove_wakes_blocked_receiver() {
        let backend = Arc::new(MemoryBackend::new());
        let id = backend.open(KEY, 0o600, CreationMode::CreateIfMissing).unwrap();

        let receiver = {
            let backend = Arc::clone(&backend);
            thread::spawn(move || {
                backend.receive(id, TypeSelector::ANY, 64, BlockingMode::Blocking)
            })
        };
        thread::sleep(Duration::from_millis(20));
        backend.remove(id).unwrap();
        assert!(matches!(receiver.join().unwrap(), Err(ReceiveError::QueueRemoved)));

        assert!(matches!(
            backend.send(id, &msg(1, "late"), BlockingMode::NonBlocking),
            Err(SendError::InvalidHandle)
        ));
        assert!(matches!(backend.remove(id), Err(ControlError::InvalidHandle)));
        assert!(backend.is_empty());
    }

    #[test]
    fn stat_tracks_messages() {
        let backend = MemoryBackend::new();
        let id = backend.open(KEY, 0o640, CreationMode::CreateIfMissing).unwrap();
        backend.send(id, &msg(1, "x"), BlockingMode::NonBlocking).unwrap();
        let stat = backend.stat(id).unwrap();
        assert_eq!(stat.key, KEY);
        assert_eq!(stat.mode, 0o640);
        assert_eq!(stat.messages, 1);
        assert_eq!(stat.max_bytes, DEFAULT_QUEUE_BYTES as u64);
        assert_eq!(stat.last_send_pid, std::process::id() as i32);
    }
}
