// Copyright (c) 2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Minimal one-shot promise/future primitives used by checkpoints, task
//! result handles, and list-completion futures. Built directly on
//! `parking_lot::{Mutex, Condvar}` rather than an async runtime, since the
//! pool schedules on plain OS threads.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};

/// A multi-waiter one-shot slot. Fulfilled at most once per `reset`; any
/// number of observers may `wait`/`get` a clone of the value.
pub(crate) struct Signal<T: Clone> {
    state: Mutex<Option<T>>,
    condvar: Condvar,
}

impl<T: Clone> Signal<T> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(None),
            condvar: Condvar::new(),
        })
    }

    pub(crate) fn reset(&self) {
        *self.state.lock() = None;
    }

    /// Fulfills the slot. A second call before the next `reset` is a no-op:
    /// each checkpoint/task promise is only ever meant to fire once per
    /// submission.
    pub(crate) fn fulfill(&self, value: T) {
        let mut guard = self.state.lock();
        if guard.is_some() {
            return;
        }
        *guard = Some(value);
        self.condvar.notify_all();
    }

    pub(crate) fn wait(&self) -> T {
        let mut guard = self.state.lock();
        loop {
            if let Some(value) = guard.as_ref() {
                return value.clone();
            }
            self.condvar.wait(&mut guard);
        }
    }

    pub(crate) fn wait_for(&self, timeout: Duration) -> Option<T> {
        self.wait_until(Instant::now() + timeout)
    }

    pub(crate) fn wait_until(&self, deadline: Instant) -> Option<T> {
        let mut guard = self.state.lock();
        loop {
            if let Some(value) = guard.as_ref() {
                return Some(value.clone());
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            self.condvar.wait_for(&mut guard, deadline - now);
        }
    }
}

/// A single-consumer one-shot slot: used for list-completion futures, where
/// the finished `TaskList` is moved out exactly once and is not `Clone`.
pub(crate) struct OnceSlot<T> {
    state: Mutex<Option<T>>,
    condvar: Condvar,
}

impl<T> OnceSlot<T> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(None),
            condvar: Condvar::new(),
        })
    }

    pub(crate) fn fulfill(&self, value: T) {
        let mut guard = self.state.lock();
        if guard.is_none() {
            *guard = Some(value);
            self.condvar.notify_all();
        }
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.state.lock().is_some()
    }

    /// Blocks until fulfilled, then takes the value. Only the first caller
    /// across all clones of the owning handle receives the value.
    pub(crate) fn take(&self) -> T {
        let mut guard = self.state.lock();
        loop {
            if let Some(value) = guard.take() {
                return value;
            }
            self.condvar.wait(&mut guard);
        }
    }

    pub(crate) fn wait_ready_for(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.state.lock();
        loop {
            if guard.is_some() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.condvar.wait_for(&mut guard, deadline - now);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread, time::Duration};

    use super::{OnceSlot, Signal};

    #[test]
    fn signal_wait_blocks_until_fulfilled() {
        let signal = Signal::<u32>::new();
        assert!(signal.wait_for(Duration::from_millis(20)).is_none());

        let waiter = signal.clone();
        let handle = thread::spawn(move || waiter.wait());

        thread::sleep(Duration::from_millis(10));
        signal.fulfill(7);
        handle.join().unwrap();
        assert_eq!(signal.wait_for(Duration::from_millis(0)), Some(7));
    }

    #[test]
    fn signal_reset_allows_refire() {
        let signal = Signal::<u32>::new();
        signal.fulfill(1);
        assert_eq!(signal.wait(), 1);
        signal.reset();
        assert!(signal.wait_for(Duration::from_millis(10)).is_none());
        signal.fulfill(2);
        assert_eq!(signal.wait(), 2);
    }

    #[test]
    fn signal_second_fulfill_is_ignored() {
        let signal = Signal::<u32>::new();
        signal.fulfill(1);
        signal.fulfill(2);
        assert_eq!(signal.wait(), 1);
    }

    #[test]
    fn once_slot_take_only_succeeds_once() {
        let slot: Arc<OnceSlot<u32>> = OnceSlot::new();
        slot.fulfill(42);
        assert!(slot.is_ready());
        assert_eq!(slot.take(), 42);
        assert!(!slot.is_ready());
    }
}
