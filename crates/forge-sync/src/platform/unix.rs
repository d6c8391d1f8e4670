// Copyright (c) 2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! POSIX named semaphores back both the mutex and semaphore primitives on
//! Unix. `sem_timedwait` isn't available on every Unix `libc` targets this
//! crate cares about (notably macOS), so timed acquisition is built on top
//! of `sem_trywait` polled at [`crate::mutex::LOCK_POLL_INTERVAL`].
use std::{
    ffi::CString,
    io,
    time::Duration,
};

use crate::error::{Result, SyncError};
use crate::mutex::poll_until;

pub(crate) struct SemHandle {
    sem: *mut libc::sem_t,
    name: CString,
}

unsafe impl Send for SemHandle {}
unsafe impl Sync for SemHandle {}

impl Drop for SemHandle {
    fn drop(&mut self) {
        unsafe {
            if libc::sem_close(self.sem) != 0 {
                tracing::warn!(
                    err = %io::Error::last_os_error(),
                    "failed to close named semaphore"
                );
            }
            // Best-effort: the name is released so a later `create` under
            // the same logical name starts from a fresh count rather than
            // perpetually reusing whatever was left in the OS's namespace.
            libc::sem_unlink(self.name.as_ptr());
        }
    }
}

fn namespaced(name: &str) -> Result<CString> {
    let sanitized: String = name.chars().map(|c| if c == '/' { '_' } else { c }).collect();
    CString::new(format!("/forge-sync-{sanitized}")).map_err(|_| {
        SyncError::InvalidArgument("sync primitive name must not contain NUL bytes".to_string())
    })
}

pub(crate) fn sem_create(name: &str, initial: u32) -> Result<SemHandle> {
    let cname = namespaced(name)?;
    let sem = unsafe {
        libc::sem_open(
            cname.as_ptr(),
            libc::O_CREAT,
            0o600 as libc::mode_t,
            initial as libc::c_uint,
        )
    };
    if sem == libc::SEM_FAILED {
        return Err(SyncError::Io(io::Error::last_os_error()));
    }
    Ok(SemHandle { sem, name: cname })
}

pub(crate) fn sem_wait(handle: &SemHandle) -> Result<()> {
    let result = unsafe { libc::sem_wait(handle.sem) };
    if result != 0 {
        return Err(SyncError::Io(io::Error::last_os_error()));
    }
    Ok(())
}

pub(crate) fn sem_post(handle: &SemHandle) -> Result<()> {
    let result = unsafe { libc::sem_post(handle.sem) };
    if result != 0 {
        return Err(SyncError::Io(io::Error::last_os_error()));
    }
    Ok(())
}

fn sem_try_wait_once(handle: &SemHandle) -> Result<bool> {
    let result = unsafe { libc::sem_trywait(handle.sem) };
    if result == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::EAGAIN) {
        Ok(false)
    } else {
        Err(SyncError::Io(err))
    }
}

pub(crate) fn sem_try_wait_for(handle: &SemHandle, timeout: Duration) -> Result<bool> {
    if timeout.is_zero() {
        return sem_try_wait_once(handle);
    }
    poll_until(timeout, || sem_try_wait_once(handle))
}
