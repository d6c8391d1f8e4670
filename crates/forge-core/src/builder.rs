// Copyright (c) 2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use crate::{
    checkpoint::{Checkpoint, CheckpointHandle},
    error::{Error, Result},
    fence::{Fence, FenceHandle},
    signal::OnceSlot,
    task::{TaskEntry, TaskHandle},
    task_list::{Entry, TaskList},
};

/// Assembles a flat, ordered [`TaskList`] from calls to `execute`/`invoke`/
/// `dispatch`, interleaved with `checkpoint`/`barrier`/`fence` calls that
/// delimit segments of concurrently-schedulable work. Single-use: calling
/// `build` a second time returns [`Error::BuilderExhausted`].
///
/// Every task's checkpoint range is the suffix of its own segment's
/// checkpoint list starting at the checkpoint placed immediately after the
/// task — i.e. a task decrements every checkpoint between its own position
/// and the end of the segment it belongs to.
pub struct TaskBuilder {
    entries: Vec<Entry>,
    tasks: Vec<Option<TaskEntry>>,
    all_checkpoints: Vec<Arc<Checkpoint>>,
    all_fences: Vec<Arc<Fence>>,
    /// Checkpoints placed in the current, still-open segment, in order.
    segment_checkpoints: Vec<Arc<Checkpoint>>,
    /// Index into `tasks` for each task in the current segment, paired
    /// with how many checkpoints existed in `segment_checkpoints` at the
    /// time the task was queued (its own position within the segment).
    segment_tasks: Vec<(usize, usize)>,
    thread_count: usize,
    built: bool,
}

impl TaskBuilder {
    /// Creates a new builder sized for `thread_count` worker threads. The
    /// count only informs dispatch fan-out (see [`Self::dispatch`]); it
    /// does not bind the builder to a specific pool.
    pub fn new(thread_count: usize) -> Result<Self> {
        if thread_count == 0 {
            return Err(Error::InvalidArgument(
                "thread_count must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            entries: Vec::new(),
            tasks: Vec::new(),
            all_checkpoints: Vec::new(),
            all_fences: Vec::new(),
            segment_checkpoints: Vec::new(),
            segment_tasks: Vec::new(),
            thread_count,
            built: false,
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.built {
            return Err(Error::BuilderExhausted);
        }
        Ok(())
    }

    /// Queues a fire-and-forget task. Its checkpoint range is fixed once
    /// the next checkpoint/barrier in the current segment is placed.
    pub fn execute<F>(&mut self, callable: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.ensure_open()?;
        let position = self.segment_checkpoints.len();
        let task_index = self.tasks.len();
        // Checkpoint range is resolved lazily in finalize_segment, since
        // the segment's trailing checkpoints aren't known yet.
        self.tasks
            .push(Some(TaskEntry::fire_and_forget(callable, Vec::new())));
        self.entries.push(Entry::Task(task_index));
        self.segment_tasks.push((task_index, position));
        Ok(())
    }

    /// Queues a value-returning task, returning a handle to its result.
    pub fn invoke<F, R>(&mut self, callable: F) -> Result<TaskHandle<R>>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Clone + Send + 'static,
    {
        self.ensure_open()?;
        let position = self.segment_checkpoints.len();
        let task_index = self.tasks.len();
        let slot = OnceSlot::new();
        let handle = TaskHandle::new(slot.clone());
        self.tasks.push(Some(TaskEntry::value_returning(
            callable,
            Vec::new(),
            slot,
        )));
        self.entries.push(Entry::Task(task_index));
        self.segment_tasks.push((task_index, position));
        Ok(handle)
    }

    /// Queues a parallel-for over the 3D grid `0..x × 0..y × 0..z`,
    /// invoking `callable(ix, iy, iz)` once per point. When the grid has at
    /// least as many points as this builder's thread count, the grid is
    /// split into `thread_count` contiguous shards (by flat index) and each
    /// shard is queued as a single task that loops over its range; any
    /// remainder `r = N mod thread_count` points are distributed one-extra
    /// to the first `r` shards. Smaller grids get one task per point
    /// instead, since sharding them wouldn't keep every worker busy.
    pub fn dispatch<F>(&mut self, x: usize, y: usize, z: usize, callable: F) -> Result<()>
    where
        F: Fn(usize, usize, usize) + Send + Sync + 'static,
    {
        self.ensure_open()?;
        if x == 0 || y == 0 || z == 0 {
            return Err(Error::InvalidArgument(
                "dispatch dimensions must all be greater than zero".to_string(),
            ));
        }
        let total = x * y * z;
        let callable = Arc::new(callable);
        let coords = move |i: usize| (i % x, (i / x) % y, i / (x * y));

        if total >= self.thread_count {
            let base = total / self.thread_count;
            let remainder = total % self.thread_count;
            let mut start = 0;
            for shard in 0..self.thread_count {
                let len = base + if shard < remainder { 1 } else { 0 };
                if len == 0 {
                    continue;
                }
                let end = start + len;
                let callable = callable.clone();
                let coords = coords.clone();
                self.execute(move || {
                    for i in start..end {
                        let (ix, iy, iz) = coords(i);
                        callable(ix, iy, iz);
                    }
                })?;
                start = end;
            }
        } else {
            for i in 0..total {
                let callable = callable.clone();
                let (ix, iy, iz) = coords(i);
                self.execute(move || callable(ix, iy, iz))?;
            }
        }
        Ok(())
    }

    /// Places a plain checkpoint in the current segment: an observer point
    /// that does not itself gate scheduling and, unlike a barrier, does not
    /// end the segment — tasks queued before and after it within the same
    /// segment are both still waiting on the barrier that eventually closes
    /// it. Returns a handle callers can wait on for every task queued so
    /// far in the segment to finish.
    pub fn checkpoint(&mut self) -> Result<CheckpointHandle> {
        self.ensure_open()?;
        Ok(self.place_checkpoint(false))
    }

    /// Closes the current segment with a barrier: the scheduler cursor
    /// will not advance past it until every task in the segment —
    /// including any placed before an intervening plain checkpoint — has
    /// completed, so no task after the barrier can start before every task
    /// before it has finished.
    pub fn barrier(&mut self) -> Result<CheckpointHandle> {
        self.ensure_open()?;
        Ok(self.place_checkpoint(true))
    }

    /// Inserts a fence: an externally-raised latch the scheduler cursor
    /// stalls on, independent of task completion.
    pub fn fence(&mut self) -> Result<FenceHandle> {
        self.ensure_open()?;
        let fence = Fence::new();
        self.entries.push(Entry::Fence(fence.clone()));
        self.all_fences.push(fence.clone());
        Ok(FenceHandle(fence))
    }

    /// Places a checkpoint or barrier call. A barrier closes the segment
    /// (wiring every task queued since the last barrier, including any
    /// placed before an intervening plain checkpoint, and resetting the
    /// segment's bookkeeping); a plain checkpoint only adds itself to the
    /// segment's checkpoint list so a later barrier still accounts for it.
    fn place_checkpoint(&mut self, barrier: bool) -> CheckpointHandle {
        let checkpoint = Checkpoint::new(barrier);
        self.segment_checkpoints.push(checkpoint.clone());
        self.entries.push(Entry::Checkpoint(checkpoint.clone()));
        self.all_checkpoints.push(checkpoint.clone());
        if barrier {
            self.finalize_segment();
        }
        CheckpointHandle(checkpoint)
    }

    /// Wires each task queued since the last barrier to the suffix of
    /// `segment_checkpoints` (every checkpoint and the closing barrier
    /// itself) starting at its own position, and sets each of those
    /// checkpoints' reset value to one more than the number of tasks that
    /// target it (the `+1` slot is the scheduler's own pass-through
    /// decrement). Called only when a barrier closes the segment, so a
    /// plain checkpoint never cuts off tasks queued before it from the
    /// barrier that eventually closes their shared segment.
    fn finalize_segment(&mut self) {
        let segment_checkpoints = std::mem::take(&mut self.segment_checkpoints);
        let segment_tasks = std::mem::take(&mut self.segment_tasks);

        let mut hit_counts = vec![0usize; segment_checkpoints.len()];
        for &(_, position) in &segment_tasks {
            for count in hit_counts.iter_mut().skip(position) {
                *count += 1;
            }
        }
        for (checkpoint, hits) in segment_checkpoints.iter().zip(hit_counts.iter()) {
            checkpoint.set_reset_value(hits + 1);
        }

        for (task_index, position) in segment_tasks {
            let range = segment_checkpoints[position..].to_vec();
            self.tasks[task_index]
                .as_mut()
                .expect("task not yet taken during build")
                .set_checkpoints(range);
        }
    }

    /// Finalizes the task graph. Any tasks queued since the last
    /// checkpoint/barrier that weren't closed off by one are left without a
    /// trailing synchronization point of their own; the pool tracks their
    /// completion directly rather than relying on a final checkpoint.
    pub fn build(&mut self) -> Result<TaskList> {
        self.ensure_open()?;
        self.built = true;
        if !self.segment_tasks.is_empty() {
            // No checkpoint closed the final segment; those tasks simply
            // have an empty checkpoint range (the scheduler/completion
            // tracking in TaskList doesn't depend on checkpoints).
            self.segment_tasks.clear();
            self.segment_checkpoints.clear();
        }

        Ok(TaskList::new(
            std::mem::take(&mut self.entries),
            std::mem::take(&mut self.tasks),
            std::mem::take(&mut self.all_checkpoints),
            std::mem::take(&mut self.all_fences),
        ))
    }

    pub fn thread_count(&self) -> usize {
        self.thread_count
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::TaskBuilder;
    use crate::error::Error;

    #[test]
    fn empty_thread_count_is_rejected() {
        assert!(matches!(
            TaskBuilder::new(0),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn build_twice_is_rejected() {
        let mut builder = TaskBuilder::new(4).unwrap();
        builder.execute(|| {}).unwrap();
        builder.barrier().unwrap();
        builder.build().unwrap();
        assert!(matches!(builder.build(), Err(Error::BuilderExhausted)));
    }

    #[test]
    fn barrier_checkpoint_waits_for_every_task_in_its_segment() {
        let mut builder = TaskBuilder::new(4).unwrap();
        let hits = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        for _ in 0..5 {
            let hits = hits.clone();
            builder
                .execute(move || {
                    std::thread::sleep(Duration::from_millis(5));
                    hits.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                })
                .unwrap();
        }
        let barrier = builder.barrier().unwrap();
        let list = builder.build().unwrap();
        list.arm(None);
        let mut dispatched = 0;
        while let Some(task_index) = list.next() {
            list.take_task(task_index).run();
            list.task_finished();
            dispatched += 1;
        }
        assert_eq!(dispatched, 5);
        barrier.wait();
        assert_eq!(hits.load(std::sync::atomic::Ordering::SeqCst), 5);
    }

    #[test]
    fn dispatch_rejects_zero_dimension() {
        let mut builder = TaskBuilder::new(2).unwrap();
        assert!(matches!(
            builder.dispatch(0, 1, 1, |_, _, _| {}),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn dispatch_single_point_runs_once_at_origin() {
        let mut builder = TaskBuilder::new(4).unwrap();
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let recorded = seen.clone();
        builder
            .dispatch(1, 1, 1, move |ix, iy, iz| {
                recorded.lock().unwrap().push((ix, iy, iz));
            })
            .unwrap();
        let list = builder.build().unwrap();
        list.arm(None);
        while let Some(task_index) = list.next() {
            list.take_task(task_index).run();
            list.task_finished();
        }
        assert_eq!(*seen.lock().unwrap(), vec![(0, 0, 0)]);
    }

    #[test]
    fn dispatch_covers_every_grid_point_exactly_once() {
        let (x, y, z) = (2, 3, 2);
        let mut builder = TaskBuilder::new(4).unwrap();
        let seen = std::sync::Arc::new(std::sync::Mutex::new(std::collections::HashSet::new()));
        let recorded = seen.clone();
        builder
            .dispatch(x, y, z, move |ix, iy, iz| {
                recorded.lock().unwrap().insert((ix, iy, iz));
            })
            .unwrap();
        let list = builder.build().unwrap();
        list.arm(None);
        while let Some(task_index) = list.next() {
            list.take_task(task_index).run();
            list.task_finished();
        }
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), x * y * z);
        for ix in 0..x {
            for iy in 0..y {
                for iz in 0..z {
                    assert!(seen.contains(&(ix, iy, iz)));
                }
            }
        }
    }

    #[test]
    fn dispatch_shards_a_grid_at_least_as_large_as_thread_count() {
        // 8 points over 4 threads: one task (shard) per thread, no remainder.
        let mut builder = TaskBuilder::new(4).unwrap();
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let recorded = seen.clone();
        builder
            .dispatch(8, 1, 1, move |ix, iy, iz| {
                recorded.lock().unwrap().push((ix, iy, iz));
            })
            .unwrap();
        assert_eq!(builder.entries.len(), 4, "one shard task per thread, no leftover single-point tasks");
        let list = builder.build().unwrap();
        list.arm(None);
        while let Some(task_index) = list.next() {
            list.take_task(task_index).run();
            list.task_finished();
        }
        let mut seen = seen.lock().unwrap();
        seen.sort();
        assert_eq!(
            *seen,
            (0..8).map(|i| (i, 0, 0)).collect::<Vec<_>>()
        );
    }
}
