// Copyright (c) 2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! A named, cross-process counting semaphore, and a plain in-process one
//! for callers that don't need an OS-level name.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::error::{Result, SyncError};
use crate::platform::semaphore as raw;

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SyncError::InvalidArgument(
            "semaphore name must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// A counting semaphore identified by name, acquirable from any process
/// that knows the name.
pub struct NamedSemaphore {
    handle: raw::Handle,
}

impl NamedSemaphore {
    /// Creates (or attaches to, if already present) a named semaphore with
    /// `initial` permits available.
    pub fn create(name: &str, initial: u32) -> Result<Self> {
        validate_name(name)?;
        let handle = raw::create(name, initial)?;
        tracing::debug!(name, initial, "created named semaphore");
        Ok(Self { handle })
    }

    /// Blocks until a permit is available, then takes it.
    pub fn acquire(&self) -> Result<()> {
        raw::acquire(&self.handle)
    }

    /// Takes a permit if one is available within `timeout`.
    pub fn try_acquire_for(&self, timeout: Duration) -> Result<bool> {
        raw::try_acquire_for(&self.handle, timeout)
    }

    /// Returns a permit to the semaphore.
    pub fn release(&self) -> Result<()> {
        raw::release(&self.handle)
    }
}

/// A counting semaphore with no OS-level name, local to this process.
/// Needs no platform backing; exposed as a standalone utility alongside the
/// named primitives even though `forge-core`'s thread pool relies on its
/// own condition variables rather than this type.
pub struct AnonymousSemaphore {
    state: Mutex<u32>,
    available: Condvar,
}

impl AnonymousSemaphore {
    pub fn new(initial: u32) -> Self {
        Self {
            state: Mutex::new(initial),
            available: Condvar::new(),
        }
    }

    pub fn acquire(&self) {
        let mut permits = self.state.lock();
        while *permits == 0 {
            self.available.wait(&mut permits);
        }
        *permits -= 1;
    }

    pub fn try_acquire_for(&self, timeout: Duration) -> bool {
        let mut permits = self.state.lock();
        if *permits == 0 {
            self.available.wait_for(&mut permits, timeout);
        }
        if *permits > 0 {
            *permits -= 1;
            true
        } else {
            false
        }
    }

    pub fn release(&self) {
        let mut permits = self.state.lock();
        *permits += 1;
        self.available.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_semaphore_round_trips_acquire_release() {
        let name = format!("forge-sync-test-sem-{}", std::process::id());
        let sem = NamedSemaphore::create(&name, 1).unwrap();
        sem.acquire().unwrap();
        sem.release().unwrap();
    }

    #[test]
    fn named_semaphore_try_acquire_times_out_when_exhausted() {
        let name = format!("forge-sync-test-sem-exhaust-{}", std::process::id());
        let sem = NamedSemaphore::create(&name, 1).unwrap();
        sem.acquire().unwrap();
        let got = sem.try_acquire_for(Duration::from_millis(20)).unwrap();
        assert!(!got);
    }

    #[test]
    fn anonymous_semaphore_blocks_until_permit_available() {
        let sem = AnonymousSemaphore::new(0);
        assert!(!sem.try_acquire_for(Duration::from_millis(10)));
        sem.release();
        assert!(sem.try_acquire_for(Duration::from_millis(10)));
    }

    #[test]
    fn empty_name_is_rejected() {
        assert!(matches!(
            NamedSemaphore::create("", 1),
            Err(SyncError::InvalidArgument(_))
        ));
    }
}
