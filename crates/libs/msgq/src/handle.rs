//! Lifecycle of one kernel queue identifier.

use std::fmt;
use std::sync::Arc;

use crate::backend::{CreationMode, MessageQueueBackend, QueueId, QueueStat};
use crate::error::{ControlError, QueueCreationError};
use crate::key::QueueKey;

/// An opened message queue.
///
/// The kernel queue is shared and unowned: other handles, in this process or
/// others, may use it concurrently, and dropping a handle leaves it in place
/// unless [`set_remove_on_drop`](Self::set_remove_on_drop) was enabled.
/// [`remove`](Self::remove) destroys it explicitly.
pub struct QueueHandle {
    backend: Arc<dyn MessageQueueBackend>,
    key: QueueKey,
    id: QueueId,
    permissions: u32,
    creation: CreationMode,
    remove_on_drop: bool,
}

impl QueueHandle {
    /// Open the queue for `key`, creating it with `permissions` if allowed.
    pub fn open(
        backend: Arc<dyn MessageQueueBackend>,
        key: QueueKey,
        permissions: u32,
        creation: CreationMode,
    ) -> Result<Self, QueueCreationError> {
        let permissions = permissions & 0o777;
        let id = backend.open(key, permissions, creation)?;
        log::debug!("msgq: opened queue {id} for key {key} (mode {permissions:o}, {creation:?})");
        Ok(Self {
            backend,
            key,
            id,
            permissions,
            creation,
            remove_on_drop: false,
        })
    }

    pub fn key(&self) -> QueueKey {
        self.key
    }

    pub fn id(&self) -> QueueId {
        self.id
    }

    pub fn permissions(&self) -> u32 {
        self.permissions
    }

    pub fn creation_mode(&self) -> CreationMode {
        self.creation
    }

    pub fn backend(&self) -> &Arc<dyn MessageQueueBackend> {
        &self.backend
    }

    /// Destroy the kernel queue when this handle is dropped, on every exit
    /// path including unwinding.
    pub fn set_remove_on_drop(&mut self, remove: bool) {
        self.remove_on_drop = remove;
    }

    pub fn removes_on_drop(&self) -> bool {
        self.remove_on_drop
    }

    pub fn stat(&self) -> Result<QueueStat, ControlError> {
        let mut stat = self.backend.stat(self.id)?;
        stat.key = self.key;
        Ok(stat)
    }

    /// Destroy the kernel queue now. Pending messages are discarded and
    /// blocked callers in any process fail with a removal error.
    pub fn remove(mut self) -> Result<(), ControlError> {
        self.remove_on_drop = false;
        self.backend.remove(self.id)?;
        log::debug!("msgq: removed queue {} (key {})", self.id, self.key);
        Ok(())
    }
}

impl Drop for QueueHandle {
    fn drop(&mut self) {
        if !self.remove_on_drop {
            return;
        }
        match self.backend.remove(self.id) {
            Ok(()) => log::debug!("msgq: removed queue {} on drop", self.id),
            // Someone else already removed it.
            Err(ControlError::InvalidHandle) => {}
            Err(err) => log::warn!("msgq: failed to remove queue {} on drop: {err}", self.id),
        }
    }
}

impl fmt::Debug for QueueHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueHandle")
            .field("key", &self.key)
            .field("id", &self.id)
            .field("permissions", &format_args!("{:o}", self.permissions))
            .field("creation", &self.creation)
            .field("remove_on_drop", &self.remove_on_drop)
            .finish()
    }
}
