// Copyright (c) 2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
    time::{Duration, Instant},
};

use crate::{checkpoint::Checkpoint, error::Error, signal::OnceSlot};

/// Turns a caught panic payload into a readable message. Rust closures
/// don't raise catchable exceptions the way the callables this pool was
/// modeled on do, so a panic is the closest equivalent to "callable raised
/// a recoverable error" and is reported through [`Error::TaskCallableFailed`]
/// rather than re-propagated as a panic on another thread.
pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task callable panicked with a non-string payload".to_string()
    }
}

/// Object-safe unit of work queued in a [`TaskEntry`]. Implemented once for
/// fire-and-forget callables and once for value-returning ones.
pub(crate) trait Runnable: Send {
    /// Runs the callable, returning `true` if it panicked.
    fn run(self: Box<Self>) -> bool;
}

struct FireAndForget<F>(F)
where
    F: FnOnce() + Send;

impl<F> Runnable for FireAndForget<F>
where
    F: FnOnce() + Send,
{
    fn run(self: Box<Self>) -> bool {
        if let Err(payload) = catch_unwind(AssertUnwindSafe(self.0)) {
            tracing::warn!(
                message = %panic_message(payload),
                "fire-and-forget task callable panicked"
            );
            true
        } else {
            false
        }
    }
}

struct ValueReturning<F, R>
where
    F: FnOnce() -> R + Send,
    R: Clone + Send,
{
    callable: F,
    slot: Arc<OnceSlot<crate::error::Result<R>>>,
}

impl<F, R> Runnable for ValueReturning<F, R>
where
    F: FnOnce() -> R + Send,
    R: Clone + Send,
{
    fn run(self: Box<Self>) -> bool {
        let outcome = catch_unwind(AssertUnwindSafe(self.callable))
            .map_err(|payload| Error::TaskCallableFailed(panic_message(payload)));
        let panicked = outcome.is_err();
        self.slot.fulfill(outcome);
        panicked
    }
}

/// A queued unit of work together with the checkpoints it must decrement
/// on completion (every checkpoint from its own position through the end
/// of its segment).
pub(crate) struct TaskEntry {
    runnable: Box<dyn Runnable>,
    checkpoints: Vec<Arc<Checkpoint>>,
}

impl TaskEntry {
    pub(crate) fn fire_and_forget<F>(callable: F, checkpoints: Vec<Arc<Checkpoint>>) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            runnable: Box::new(FireAndForget(callable)),
            checkpoints,
        }
    }

    pub(crate) fn value_returning<F, R>(
        callable: F,
        checkpoints: Vec<Arc<Checkpoint>>,
        slot: Arc<OnceSlot<crate::error::Result<R>>>,
    ) -> Self
    where
        F: FnOnce() -> R + Send + 'static,
        R: Clone + Send + 'static,
    {
        Self {
            runnable: Box::new(ValueReturning { callable, slot }),
            checkpoints,
        }
    }

    /// Wires this task's checkpoint range after construction, once the
    /// builder has closed the segment it belongs to and knows the full
    /// suffix of checkpoints the task must decrement.
    pub(crate) fn set_checkpoints(&mut self, checkpoints: Vec<Arc<Checkpoint>>) {
        self.checkpoints = checkpoints;
    }

    /// Executes the callable, then decrements every checkpoint in this
    /// task's range regardless of whether the callable panicked. Returns
    /// `true` if the callable panicked, for the caller's metrics.
    pub(crate) fn run(self) -> bool {
        let panicked = self.runnable.run();
        for checkpoint in &self.checkpoints {
            checkpoint.task_completed();
        }
        panicked
    }
}

/// A handle to a single in-flight task's return value, analogous to a
/// `std::shared_future`: any number of clones may independently wait on and
/// read the result.
#[derive(Clone)]
pub struct TaskHandle<R>
where
    R: Clone + Send + 'static,
{
    slot: Arc<OnceSlot<crate::error::Result<R>>>,
}

impl<R> TaskHandle<R>
where
    R: Clone + Send + 'static,
{
    pub(crate) fn new(slot: Arc<OnceSlot<crate::error::Result<R>>>) -> Self {
        Self { slot }
    }

    /// Blocks until the task completes, returning its result or the error
    /// produced by a panicking callable.
    pub fn get(&self) -> crate::error::Result<R> {
        loop {
            if self.slot.is_ready() {
                // Peek without consuming: multiple handles may read the
                // same outcome, so re-fulfill after taking to let other
                // waiters through.
                let value = self.slot.take();
                self.slot.fulfill(value.clone());
                return value;
            }
            self.slot.wait_ready_for(Duration::from_millis(50));
        }
    }

    pub fn wait(&self) {
        let _ = self.get();
    }

    pub fn wait_for(&self, timeout: Duration) -> bool {
        self.slot.wait_ready_for(timeout)
    }

    pub fn wait_until(&self, deadline: Instant) -> bool {
        let now = Instant::now();
        if deadline <= now {
            return self.slot.is_ready();
        }
        self.slot.wait_ready_for(deadline - now)
    }

    pub fn valid(&self) -> bool {
        true
    }
}

impl<R> std::fmt::Debug for TaskHandle<R>
where
    R: Clone + Send + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("ready", &self.slot.is_ready())
            .finish()
    }
}
