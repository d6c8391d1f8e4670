// Copyright (c) 2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub(crate) use unix as imp;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub(crate) use windows as imp;

pub(crate) mod mutex {
    use std::time::Duration;

    use crate::error::Result;

    pub(crate) type Handle = super::imp::SemHandle;

    pub(crate) fn create(name: &str) -> Result<Handle> {
        super::imp::sem_create(&format!("mtx-{name}"), 1)
    }

    pub(crate) fn acquire(handle: &Handle) -> Result<()> {
        super::imp::sem_wait(handle)
    }

    pub(crate) fn try_acquire_for(handle: &Handle, timeout: Duration) -> Result<bool> {
        super::imp::sem_try_wait_for(handle, timeout)
    }

    pub(crate) fn release(handle: &Handle) -> Result<()> {
        super::imp::sem_post(handle)
    }
}

pub(crate) mod semaphore {
    use std::time::Duration;

    use crate::error::Result;

    pub(crate) type Handle = super::imp::SemHandle;

    pub(crate) fn create(name: &str, initial: u32) -> Result<Handle> {
        super::imp::sem_create(&format!("sem-{name}"), initial)
    }

    pub(crate) fn acquire(handle: &Handle) -> Result<()> {
        super::imp::sem_wait(handle)
    }

    pub(crate) fn try_acquire_for(handle: &Handle, timeout: Duration) -> Result<bool> {
        super::imp::sem_try_wait_for(handle, timeout)
    }

    pub(crate) fn release(handle: &Handle) -> Result<()> {
        super::imp::sem_post(handle)
    }
}
