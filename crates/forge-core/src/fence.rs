// Copyright (c) 2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::Mutex;

use crate::signal::Signal;

/// A callback the pool binds to a fence at submission time so that
/// `signal()`, called from arbitrary external code with no reference of
/// its own to the pool, can still wake the pool's worker condition. This is
/// the push-time-channel half of the fence contract; the pool supplies the
/// closure (pump this fence's list, then notify `work_available`) when the
/// list is pushed.
type Wake = Arc<dyn Fn() + Send + Sync>;

/// A latch raised by external code (outside the pool's own task graph)
/// rather than by task completions. Scheduling-wise it behaves like a
/// barrier: the list cursor stalls on it until `signal` is called.
pub(crate) struct Fence {
    signal: Arc<Signal<()>>,
    wake: Mutex<Option<Wake>>,
}

impl Fence {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            signal: Signal::new(),
            wake: Mutex::new(None),
        })
    }

    pub(crate) fn arm(&self) {
        self.signal.reset();
    }

    /// Binds the callback that wakes the pool once this fence is signaled.
    /// Called by the pool when the list containing this fence is pushed.
    pub(crate) fn bind(&self, wake: Wake) {
        *self.wake.lock() = Some(wake);
    }

    pub(crate) fn signal(&self) {
        self.signal.fulfill(());
        let wake = self.wake.lock().clone();
        if let Some(wake) = wake {
            wake();
        }
    }

    pub(crate) fn is_raised(&self) -> bool {
        // A cheap non-blocking probe would need its own flag; reuse wait_for
        // with a zero timeout instead of adding one.
        self.signal.wait_for(Duration::from_secs(0)).is_some()
    }

    /// Called by the scheduler cursor. Returns `true` once raised.
    pub(crate) fn scheduler_pass(&self) -> bool {
        self.is_raised()
    }

    fn wait(&self) {
        self.signal.wait();
    }

    fn wait_for(&self, timeout: Duration) -> bool {
        self.signal.wait_for(timeout).is_some()
    }

    fn wait_until(&self, deadline: Instant) -> bool {
        self.signal.wait_until(deadline).is_some()
    }
}

/// Handle returned by [`TaskBuilder::fence`](crate::TaskBuilder::fence),
/// used by the submitter to unblock the list from outside the task graph.
#[derive(Clone)]
pub struct FenceHandle(pub(crate) Arc<Fence>);

impl FenceHandle {
    /// Signals the fence, allowing the list cursor to proceed past it, and
    /// wakes the pool so it re-checks the list immediately rather than
    /// waiting for an unrelated event. Idempotent: signaling an
    /// already-signaled fence is a no-op.
    pub fn signal(&self) {
        self.0.signal();
    }

    pub fn is_raised(&self) -> bool {
        self.0.is_raised()
    }

    /// Blocks the calling thread until another party raises the fence.
    pub fn wait(&self) {
        self.0.wait();
    }

    pub fn wait_for(&self, timeout: Duration) -> bool {
        self.0.wait_for(timeout)
    }

    pub fn wait_until(&self, deadline: Instant) -> bool {
        self.0.wait_until(deadline)
    }
}

impl std::fmt::Debug for FenceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FenceHandle")
            .field("raised", &self.0.is_raised())
            .finish()
    }
}
