// Copyright (c) 2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! A named mutex, shareable by any process that opens it under the same
//! name. Recursion is tracked per-handle in this process, on top of a
//! single OS-level exclusive gate (a POSIX named semaphore on Unix, a
//! native mutex object on Windows).

use std::{
    thread::{self, ThreadId},
    time::{Duration, Instant},
};

use parking_lot::Mutex;

use crate::error::{Result, SyncError};
use crate::platform::mutex as raw;

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SyncError::InvalidArgument(
            "mutex name must not be empty".to_string(),
        ));
    }
    Ok(())
}

struct Reentrance {
    owner: ThreadId,
    depth: usize,
}

/// A mutex identified by name, lockable from any process that knows the
/// name. When `recursive`, the same thread may lock it more than once
/// without deadlocking itself; it must unlock the same number of times.
pub struct NamedMutex {
    handle: raw::Handle,
    recursive: bool,
    reentrance: Mutex<Option<Reentrance>>,
}

impl NamedMutex {
    /// Creates (or attaches to, if already present) a named mutex.
    pub fn create(name: &str, recursive: bool) -> Result<Self> {
        validate_name(name)?;
        let handle = raw::create(name)?;
        tracing::debug!(name, recursive, "created named mutex");
        Ok(Self {
            handle,
            recursive,
            reentrance: Mutex::new(None),
        })
    }

    /// Blocks until the mutex is acquired.
    pub fn lock(&self) -> Result<NamedMutexGuard<'_>> {
        if self.try_reenter() {
            return Ok(NamedMutexGuard { mutex: self });
        }
        raw::acquire(&self.handle)?;
        self.mark_owned();
        Ok(NamedMutexGuard { mutex: self })
    }

    /// Attempts to acquire the mutex, giving up after `timeout`.
    pub fn try_lock_for(&self, timeout: Duration) -> Result<Option<NamedMutexGuard<'_>>> {
        if self.try_reenter() {
            return Ok(Some(NamedMutexGuard { mutex: self }));
        }
        if raw::try_acquire_for(&self.handle, timeout)? {
            self.mark_owned();
            Ok(Some(NamedMutexGuard { mutex: self }))
        } else {
            Ok(None)
        }
    }

    fn try_reenter(&self) -> bool {
        if !self.recursive {
            return false;
        }
        let mut state = self.reentrance.lock();
        match state.as_mut() {
            Some(reentrance) if reentrance.owner == thread::current().id() => {
                reentrance.depth += 1;
                true
            }
            _ => false,
        }
    }

    fn mark_owned(&self) {
        if self.recursive {
            *self.reentrance.lock() = Some(Reentrance {
                owner: thread::current().id(),
                depth: 1,
            });
        }
    }

    fn unlock(&self) {
        if self.recursive {
            let mut state = self.reentrance.lock();
            if let Some(reentrance) = state.as_mut() {
                reentrance.depth -= 1;
                if reentrance.depth > 0 {
                    return;
                }
            }
            *state = None;
        }
        if let Err(err) = raw::release(&self.handle) {
            tracing::error!(%err, "failed to release named mutex");
        }
    }
}

/// An RAII guard releasing its [`NamedMutex`] on drop.
pub struct NamedMutexGuard<'a> {
    mutex: &'a NamedMutex,
}

impl Drop for NamedMutexGuard<'_> {
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}

/// Polls `raw_try_acquire` at this interval while waiting out a
/// `try_lock_for` deadline, mirroring the bounded-latency polling
/// `forge-core`'s thread pool uses to discover externally-raised fences.
pub(crate) const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(5);

pub(crate) fn poll_until<F>(timeout: Duration, mut try_once: F) -> Result<bool>
where
    F: FnMut() -> Result<bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if try_once()? {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        thread::sleep(LOCK_POLL_INTERVAL.min(timeout));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recursive_mutex_allows_same_thread_reentry() {
        let name = format!("forge-sync-test-recursive-{}", std::process::id());
        let mutex = NamedMutex::create(&name, true).unwrap();
        let outer = mutex.lock().unwrap();
        let inner = mutex.lock().unwrap();
        drop(inner);
        drop(outer);
    }

    #[test]
    fn non_recursive_mutex_round_trips_lock_unlock() {
        let name = format!("forge-sync-test-plain-{}", std::process::id());
        let mutex = NamedMutex::create(&name, false).unwrap();
        {
            let _guard = mutex.lock().unwrap();
        }
        let _guard = mutex.lock().unwrap();
    }

    #[test]
    fn empty_name_is_rejected() {
        assert!(matches!(
            NamedMutex::create("", false),
            Err(SyncError::InvalidArgument(_))
        ));
    }
}
