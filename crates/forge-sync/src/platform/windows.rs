// Copyright (c) 2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Both the mutex and semaphore primitives are built on a single Win32
//! semaphore object: a semaphore with a maximum count of 1 behaves exactly
//! like a mutex for our purposes, and `ReleaseSemaphore`/
//! `WaitForSingleObject` already give us the timed-wait semantics
//! `sem_trywait` polling has to approximate on Unix.

use std::{io, time::Duration};

use windows_sys::Win32::{
    Foundation::{CloseHandle, WAIT_OBJECT_0, WAIT_TIMEOUT},
    System::Threading::{CreateSemaphoreW, ReleaseSemaphore, WaitForSingleObject, INFINITE},
};

use crate::error::{Result, SyncError};

pub(crate) struct SemHandle {
    handle: windows_sys::Win32::Foundation::HANDLE,
}

unsafe impl Send for SemHandle {}
unsafe impl Sync for SemHandle {}

impl Drop for SemHandle {
    fn drop(&mut self) {
        unsafe {
            CloseHandle(self.handle);
        }
    }
}

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

pub(crate) fn sem_create(name: &str, initial: u32) -> Result<SemHandle> {
    let sanitized: String = name
        .chars()
        .map(|c| if c == '\\' { '_' } else { c })
        .collect();
    let wide_name = wide(&format!("forge-sync-{sanitized}"));
    let handle = unsafe {
        CreateSemaphoreW(std::ptr::null(), initial as i32, i32::MAX, wide_name.as_ptr())
    };
    if handle.is_null() {
        return Err(SyncError::Io(io::Error::last_os_error()));
    }
    Ok(SemHandle { handle })
}

pub(crate) fn sem_wait(handle: &SemHandle) -> Result<()> {
    let result = unsafe { WaitForSingleObject(handle.handle, INFINITE) };
    if result != WAIT_OBJECT_0 {
        return Err(SyncError::Io(io::Error::last_os_error()));
    }
    Ok(())
}

pub(crate) fn sem_post(handle: &SemHandle) -> Result<()> {
    let ok = unsafe { ReleaseSemaphore(handle.handle, 1, std::ptr::null_mut()) };
    if ok == 0 {
        return Err(SyncError::Io(io::Error::last_os_error()));
    }
    Ok(())
}

pub(crate) fn sem_try_wait_for(handle: &SemHandle, timeout: Duration) -> Result<bool> {
    let millis = timeout.as_millis().min(INFINITE as u128 - 1) as u32;
    let result = unsafe { WaitForSingleObject(handle.handle, millis) };
    match result {
        WAIT_OBJECT_0 => Ok(true),
        WAIT_TIMEOUT => Ok(false),
        _ => Err(SyncError::Io(io::Error::last_os_error())),
    }
}
