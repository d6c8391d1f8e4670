// Copyright (c) 2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use parking_lot::Mutex;

use crate::{checkpoint::Checkpoint, fence::Fence, signal::Signal, task::TaskEntry};

/// One slot in the flattened, ordered sequence a [`TaskBuilder`] produces.
/// Tasks are scheduled as soon as the pool has a free worker; checkpoints,
/// barriers, and fences are synchronization points the scheduler cursor
/// walks through in order.
///
/// `Task` stores an index into `TaskList::tasks` rather than the entry
/// itself: the scheduler only ever needs shared access to `TaskList`
/// (`&self`), but a queued callable is an `FnOnce` that must be moved out
/// and consumed exactly once, so its home is a mutex-guarded slot instead.
pub(crate) enum Entry {
    Task(usize),
    Checkpoint(Arc<Checkpoint>),
    Fence(Arc<Fence>),
}

/// An assembled, ready-to-run task graph produced by
/// [`TaskBuilder::build`](crate::TaskBuilder::build). Submitted to a
/// [`ThreadPool`](crate::ThreadPool) exactly once.
///
/// A plain checkpoint does not gate the scheduler cursor, so the cursor can
/// walk past one before that segment's tasks finish. List completion is
/// therefore tracked independently of cursor position, by counting every
/// task's completion regardless of which segment it belonged to.
pub struct TaskList {
    pub(crate) entries: Vec<Entry>,
    tasks: Mutex<Vec<Option<TaskEntry>>>,
    pub(crate) checkpoints: Vec<Arc<Checkpoint>>,
    pub(crate) fences: Vec<Arc<Fence>>,
    task_count: usize,
    remaining: AtomicUsize,
    completion: Arc<Signal<()>>,
    cursor: AtomicUsize,
}

impl TaskList {
    pub(crate) fn new(
        entries: Vec<Entry>,
        tasks: Vec<Option<TaskEntry>>,
        checkpoints: Vec<Arc<Checkpoint>>,
        fences: Vec<Arc<Fence>>,
    ) -> Self {
        let task_count = tasks.len();
        Self {
            entries,
            tasks: Mutex::new(tasks),
            checkpoints,
            fences,
            task_count,
            remaining: AtomicUsize::new(task_count),
            completion: Signal::new(),
            cursor: AtomicUsize::new(0),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Moves the queued task entry at `task_index` (the index stored in
    /// `Entry::Task`) out for the caller to run. Panics if called twice for
    /// the same index, which would indicate a scheduler bug.
    pub(crate) fn take_task(&self, task_index: usize) -> TaskEntry {
        self.tasks.lock()[task_index]
            .take()
            .expect("task entry already taken")
    }

    /// (Re-)arms every checkpoint and fence in the list, resets the
    /// completion counter, and resets the cursor. Called once by the pool
    /// immediately before the first task in the list is scheduled. `wake`,
    /// when given, is bound to every fence so that a later external
    /// `FenceHandle::signal` call can wake the pool instead of leaving it
    /// to discover the fence on its own.
    pub(crate) fn arm(&self, wake: Option<Arc<dyn Fn() + Send + Sync>>) {
        for checkpoint in &self.checkpoints {
            checkpoint.arm();
        }
        for fence in &self.fences {
            fence.arm();
            if let Some(wake) = &wake {
                fence.bind(wake.clone());
            }
        }
        self.remaining.store(self.task_count, Ordering::Release);
        self.completion.reset();
        self.cursor.store(0, Ordering::Release);
        if self.task_count == 0 {
            self.completion.fulfill(());
        }
    }

    /// Advances the cursor past every checkpoint/fence entry it currently
    /// sits on, stopping either at a `Task` entry ready to hand to a worker,
    /// a barrier/fence not yet satisfied, or the end of the list.
    ///
    /// Returns `Some(task_index)` — the index into `self.tasks`, suitable
    /// for [`Self::take_task`] — or `None` if the cursor is blocked (caller
    /// should retry once the blocking checkpoint or fence signals) or the
    /// list is exhausted.
    pub(crate) fn next(&self) -> Option<usize> {
        loop {
            let index = self.cursor.load(Ordering::Acquire);
            if index >= self.entries.len() {
                return None;
            }
            match &self.entries[index] {
                Entry::Task(task_index) => {
                    let task_index = *task_index;
                    // Claim this task slot so no other scheduler pass hands
                    // it out twice.
                    if self
                        .cursor
                        .compare_exchange(index, index + 1, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        return Some(task_index);
                    }
                    continue;
                }
                Entry::Checkpoint(checkpoint) => {
                    if !checkpoint.scheduler_pass() {
                        return None;
                    }
                    let _ = self.cursor.compare_exchange(
                        index,
                        index + 1,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    );
                }
                Entry::Fence(fence) => {
                    if !fence.scheduler_pass() {
                        return None;
                    }
                    let _ = self.cursor.compare_exchange(
                        index,
                        index + 1,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    );
                }
            }
        }
    }

    /// Called by the pool after a dispatched task (by index) finishes
    /// running, regardless of which segment it belonged to.
    pub(crate) fn task_finished(&self) {
        let previous = self.remaining.fetch_sub(1, Ordering::AcqRel);
        if previous == 1 {
            self.completion.fulfill(());
        }
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.remaining.load(Ordering::Acquire) == 0
    }

    /// Blocks until every task in the list has completed.
    pub(crate) fn wait(&self) {
        self.completion.wait();
    }
}
