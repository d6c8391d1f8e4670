// Copyright (c) 2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use crate::signal::Signal;

/// A checkpoint's counter starts at `segment_task_count + 1`: one decrement
/// per task in its segment, plus one for the scheduler's own pass over the
/// entry. For a barrier, that last decrement is gated on the counter already
/// being 1 (i.e. every task has finished); for a plain checkpoint it is not
/// gated at all, and typically fires long before the segment's tasks do,
/// leaving the segment's own completions to drive the counter the rest of
/// the way to zero.
pub(crate) struct Checkpoint {
    counter: AtomicUsize,
    reset_value: AtomicUsize,
    barrier: bool,
    signal: Arc<Signal<()>>,
}

impl Checkpoint {
    pub(crate) fn new(barrier: bool) -> Arc<Self> {
        Arc::new(Self {
            counter: AtomicUsize::new(1),
            reset_value: AtomicUsize::new(1),
            barrier,
            signal: Signal::new(),
        })
    }

    pub(crate) fn is_barrier(&self) -> bool {
        self.barrier
    }

    pub(crate) fn set_reset_value(&self, value: usize) {
        self.reset_value.store(value, Ordering::Relaxed);
    }

    pub(crate) fn arm(&self) {
        self.counter
            .store(self.reset_value.load(Ordering::Relaxed), Ordering::Release);
        self.signal.reset();
    }

    fn decrement_and_maybe_fire(&self) {
        let previous = self.counter.fetch_sub(1, Ordering::AcqRel);
        if previous == 1 {
            self.signal.fulfill(());
        }
    }

    /// Called by a task, after its callable returns, for every checkpoint in
    /// its checkpoint range.
    pub(crate) fn task_completed(&self) {
        self.decrement_and_maybe_fire();
    }

    /// Called by the scheduler as the list cursor walks past this entry.
    /// Returns `true` if the cursor may advance past it, `false` if a
    /// barrier is blocking progress.
    pub(crate) fn scheduler_pass(&self) -> bool {
        if self.barrier && self.counter.load(Ordering::Acquire) != 1 {
            return false;
        }
        self.decrement_and_maybe_fire();
        true
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

/// Observer handle for a checkpoint or barrier, returned by
/// [`TaskBuilder::checkpoint`](crate::TaskBuilder::checkpoint) and
/// [`TaskBuilder::barrier`](crate::TaskBuilder::barrier).
#[derive(Clone)]
pub struct CheckpointHandle(pub(crate) Arc<Checkpoint>);

impl CheckpointHandle {
    /// Blocks the calling thread until every task in this checkpoint's
    /// segment (up to and including, for a barrier, the barrier itself) has
    /// completed.
    pub fn wait(&self) {
        self.0.wait();
    }

    /// Like [`wait`](Self::wait), but returns `false` on timeout instead of
    /// blocking indefinitely.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        self.0.wait_for(timeout)
    }

    /// Like [`wait_for`](Self::wait_for), with an absolute deadline.
    pub fn wait_until(&self, deadline: Instant) -> bool {
        self.0.wait_until(deadline)
    }

    /// Blocks until ready, same as [`wait`](Self::wait); named to mirror the
    /// result-observer surface of task handles.
    pub fn get(&self) {
        self.0.wait();
    }

    /// Always `true`: a `CheckpointHandle` is only ever constructed already
    /// bound to shared checkpoint state.
    pub fn valid(&self) -> bool {
        true
    }

    /// Whether this handle observes a barrier (participates in scheduling)
    /// or a plain checkpoint (observer only).
    pub fn is_barrier(&self) -> bool {
        self.0.is_barrier()
    }
}

impl std::fmt::Debug for CheckpointHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointHandle")
            .field("barrier", &self.0.is_barrier())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::Checkpoint;

    #[test]
    fn plain_checkpoint_fires_once_every_hit_and_the_scheduler_pass_land() {
        let checkpoint = Checkpoint::new(false);
        checkpoint.set_reset_value(3); // two tasks + one scheduler pass
        checkpoint.arm();

        let handle = super::CheckpointHandle(checkpoint.clone());
        assert!(!handle.wait_for(Duration::from_millis(10)));

        checkpoint.task_completed();
        checkpoint.task_completed();
        assert!(!handle.wait_for(Duration::from_millis(10)));

        assert!(checkpoint.scheduler_pass());
        assert!(handle.wait_for(Duration::from_millis(10)));
    }

    #[test]
    fn barrier_scheduler_pass_blocks_until_tasks_settle() {
        let checkpoint = Checkpoint::new(true);
        checkpoint.set_reset_value(2); // one task + one scheduler pass
        checkpoint.arm();

        assert!(!checkpoint.scheduler_pass(), "barrier must not pass early");
        checkpoint.task_completed();
        assert!(checkpoint.scheduler_pass());
    }

    #[test]
    fn arm_resets_counter_and_signal_for_reuse() {
        let checkpoint = Checkpoint::new(true);
        checkpoint.set_reset_value(1);
        checkpoint.arm();
        assert!(checkpoint.scheduler_pass());
        // Without a re-arm the counter stays at zero: a second pass must
        // not fire the signal again.
        assert!(!checkpoint.scheduler_pass());

        checkpoint.arm();
        assert!(checkpoint.scheduler_pass(), "re-armed barrier must fire again");
    }
}
