use std::fs;
use std::io;

use libc::{c_int, c_long};

use super::{
    BlockingMode, CreationMode, Message, MessageQueueBackend, QueueId, QueueStat, TypeSelector,
};
use crate::error::{ControlError, QueueCreationError, ReceiveError, SendError};
use crate::key::QueueKey;
use crate::sys;
use crate::DEFAULT_MAX_MESSAGE_SIZE;

/// Backend over the kernel's System V message queues.
#[derive(Clone, Copy, Debug, Default)]
pub struct SysV;

fn nowait(blocking: BlockingMode) -> c_int {
    match blocking {
        BlockingMode::Blocking => 0,
        BlockingMode::NonBlocking => libc::IPC_NOWAIT,
    }
}

fn creation_error(err: io::Error) -> QueueCreationError {
    match err.raw_os_error() {
        Some(libc::EEXIST) => QueueCreationError::AlreadyExists,
        Some(libc::EACCES) => QueueCreationError::PermissionDenied,
        Some(libc::ENOSPC) => QueueCreationError::LimitReached,
        _ => QueueCreationError::Os(err),
    }
}

fn send_error(err: io::Error) -> SendError {
    match err.raw_os_error() {
        Some(libc::EAGAIN) => SendError::QueueFull,
        Some(libc::EIDRM) | Some(libc::EINVAL) => SendError::InvalidHandle,
        Some(libc::EACCES) => SendError::PermissionDenied,
        Some(libc::EINTR) => SendError::Interrupted,
        _ => SendError::Os(err),
    }
}

/// `msgsnd` reports both a stale id and a payload above `msgmax` as EINVAL.
fn send_failure(id: QueueId, size: usize, err: io::Error) -> SendError {
    if err.raw_os_error() == Some(libc::EINVAL) && sys::msgctl_stat(id.as_raw()).is_ok() {
        return SendError::TooLarge {
            size,
            limit: msgmax(),
        };
    }
    send_error(err)
}

/// Kernel per-message limit, `MSGMAX` when procfs is unavailable.
fn msgmax() -> usize {
    fs::read_to_string("/proc/sys/kernel/msgmax")
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(DEFAULT_MAX_MESSAGE_SIZE)
}

fn mtype(selector: TypeSelector) -> Option<c_long> {
    c_long::try_from(selector.get()).ok()
}

fn receive_error(err: io::Error, limit: usize) -> ReceiveError {
    match err.raw_os_error() {
        Some(libc::ENOMSG) => ReceiveError::NoMessage,
        Some(libc::EIDRM) | Some(libc::EINVAL) => ReceiveError::QueueRemoved,
        Some(libc::E2BIG) => ReceiveError::TooLarge { limit },
        Some(libc::EACCES) => ReceiveError::PermissionDenied,
        Some(libc::EINTR) => ReceiveError::Interrupted,
        _ => ReceiveError::Os(err),
    }
}

fn control_error(err: io::Error) -> ControlError {
    match err.raw_os_error() {
        Some(libc::EIDRM) | Some(libc::EINVAL) => ControlError::InvalidHandle,
        Some(libc::EPERM) | Some(libc::EACCES) => ControlError::PermissionDenied,
        _ => ControlError::Os(err),
    }
}

impl MessageQueueBackend for SysV {
    fn open(
        &self,
        key: QueueKey,
        permissions: u32,
        creation: CreationMode,
    ) -> Result<QueueId, QueueCreationError> {
        let mut flags = (permissions & 0o777) as c_int | libc::IPC_CREAT;
        if creation == CreationMode::ExclusiveCreate {
            flags |= libc::IPC_EXCL;
        }
        let id = sys::msgget(key.as_raw(), flags).map_err(creation_error)?;
        Ok(QueueId::from_raw(id))
    }

    fn send(
        &self,
        id: QueueId,
        message: &Message,
        blocking: BlockingMode,
    ) -> Result<(), SendError> {
        let selector = message.type_selector;
        let kind = mtype(selector)
            .filter(|_| selector.is_sendable())
            .ok_or(SendError::InvalidType(selector.get()))?;
        sys::msgsnd(id.as_raw(), kind, &message.payload, nowait(blocking))
            .map_err(|err| send_failure(id, message.payload.len(), err))
    }

    fn receive(
        &self,
        id: QueueId,
        selector: TypeSelector,
        max_size: usize,
        blocking: BlockingMode,
    ) -> Result<Message, ReceiveError> {
        let wanted = mtype(selector).ok_or(ReceiveError::InvalidSelector(selector.get()))?;
        let (kind, payload) = sys::msgrcv(id.as_raw(), wanted, max_size, nowait(blocking))
            .map_err(|err| receive_error(err, max_size))?;
        Ok(Message::new(TypeSelector::new(i64::from(kind)), payload))
    }

    fn stat(&self, id: QueueId) -> Result<QueueStat, ControlError> {
        let ds = sys::msgctl_stat(id.as_raw()).map_err(control_error)?;
        // msqid_ds does not expose the key portably; QueueHandle fills it in.
        Ok(QueueStat {
            key: QueueKey::default(),
            uid: ds.msg_perm.uid,
            gid: ds.msg_perm.gid,
            cuid: ds.msg_perm.cuid,
            cgid: ds.msg_perm.cgid,
            mode: ds.msg_perm.mode as u32 & 0o777,
            messages: ds.msg_qnum as u64,
            max_bytes: ds.msg_qbytes as u64,
            last_send_time: ds.msg_stime as i64,
            last_receive_time: ds.msg_rtime as i64,
            last_change_time: ds.msg_ctime as i64,
            last_send_pid: ds.msg_lspid,
            last_receive_pid: ds.msg_lrpid,
        })
    }

    fn remove(&self, id: QueueId) -> Result<(), ControlError> {
        sys::msgctl_remove(id.as_raw()).map_err(control_error)
    }
}
