//! Thin wrappers over the System V message-queue syscalls.
//!
//! Every `unsafe` block in the crate lives here. Wrappers return the raw
//! `io::Error` from errno; mapping onto the queue error taxonomy happens in
//! [`crate::backend::sysv`].
#![allow(unsafe_code)]

use std::ffi::CStr;
use std::io;
use std::mem::{self, size_of};

use libc::{c_int, c_long, c_void, key_t};

/// Size of the `mtype` header that precedes `mtext` in a `struct msgbuf`.
const MTYPE_SIZE: usize = size_of::<c_long>();

pub(crate) fn ftok(path: &CStr, proj_id: u8) -> io::Result<key_t> {
    // SAFETY: `path` is a valid NUL-terminated string for the duration of the call.
    let key = unsafe { libc::ftok(path.as_ptr(), c_int::from(proj_id)) };
    if key == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(key)
}

pub(crate) fn msgget(key: key_t, flags: c_int) -> io::Result<c_int> {
    // SAFETY: msgget takes no pointers.
    let id = unsafe { libc::msgget(key, flags) };
    if id == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(id)
}

pub(crate) fn msgsnd(id: c_int, mtype: c_long, payload: &[u8], flags: c_int) -> io::Result<()> {
    let mut buf = Vec::with_capacity(MTYPE_SIZE + payload.len());
    buf.extend_from_slice(&mtype.to_ne_bytes());
    buf.extend_from_slice(payload);

    // SAFETY: `buf` holds an `mtype` header followed by exactly `payload.len()`
    // bytes of `mtext`, and outlives the call.
    let rv = unsafe { libc::msgsnd(id, buf.as_ptr() as *const c_void, payload.len(), flags) };
    if rv == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

pub(crate) fn msgrcv(
    id: c_int,
    msgtyp: c_long,
    max_size: usize,
    flags: c_int,
) -> io::Result<(c_long, Vec<u8>)> {
    let mut buf = vec![0u8; MTYPE_SIZE + max_size];

    // SAFETY: `buf` has room for the `mtype` header plus `max_size` bytes of
    // `mtext`; the kernel writes at most that much.
    let received = unsafe {
        libc::msgrcv(id, buf.as_mut_ptr() as *mut c_void, max_size, msgtyp, flags)
    };
    if received < 0 {
        return Err(io::Error::last_os_error());
    }

    let mut header = [0u8; MTYPE_SIZE];
    header.copy_from_slice(&buf[..MTYPE_SIZE]);
    let mtype = c_long::from_ne_bytes(header);

    let end = MTYPE_SIZE + received as usize;
    buf.truncate(end);
    buf.drain(..MTYPE_SIZE);
    Ok((mtype, buf))
}

pub(crate) fn msgctl_stat(id: c_int) -> io::Result<libc::msqid_ds> {
    // SAFETY: msqid_ds is plain old data; all-zero is a valid bit pattern.
    let mut ds: libc::msqid_ds = unsafe { mem::zeroed() };
    // SAFETY: `ds` is a valid, writable msqid_ds.
    let rv = unsafe { libc::msgctl(id, libc::IPC_STAT, &mut ds) };
    if rv == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(ds)
}

pub(crate) fn msgctl_remove(id: c_int) -> io::Result<()> {
    // SAFETY: IPC_RMID ignores the buffer argument.
    let rv = unsafe { libc::msgctl(id, libc::IPC_RMID, std::ptr::null_mut()) };
    if rv == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
