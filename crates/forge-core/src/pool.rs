// Copyright (c) 2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::{
    collections::VecDeque,
    sync::Arc,
    thread::{self, JoinHandle},
};

use parking_lot::{Condvar, Mutex};
use prometheus::Registry;

use crate::{
    builder::TaskBuilder,
    error::{Error, Result},
    task::TaskHandle,
    task_list::TaskList,
    PoolMetrics,
};

/// Tunables for a [`ThreadPool`]. Construct with
/// [`PoolConfig::default`](Default::default) and override what you need.
#[derive(Clone)]
pub struct PoolConfig {
    /// Number of OS worker threads to spawn. Defaults to the host's logical
    /// CPU count, floored at 8 to keep small/CI hosts from starving.
    pub worker_threads: usize,
    /// Prometheus registry new [`PoolMetrics`] are registered into.
    pub registry: Registry,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_threads: num_cpus::get().max(8),
            registry: Registry::new(),
        }
    }
}

/// An item in the ready queue: a dispatchable task belonging to a
/// particular in-flight list.
struct ReadyItem {
    list: Arc<TaskList>,
    task_index: usize,
}

struct PoolState {
    ready: VecDeque<ReadyItem>,
    /// Lists submitted to the pool that have not yet completed.
    active: Vec<Arc<TaskList>>,
    shutting_down: bool,
}

/// A fixed-size pool of OS worker threads that execute
/// [`TaskList`]s submitted via [`push`](Self::push), plus the `execute`/
/// `invoke` convenience entry points for a single ad-hoc callable.
///
/// Built on `parking_lot::{Mutex, Condvar}` and plain [`std::thread`]
/// workers rather than an async runtime: task callables are ordinary
/// blocking closures, and the scheduler only ever needs to wake a worker
/// or a waiter, never poll a future.
pub struct ThreadPool {
    state: Arc<Mutex<PoolState>>,
    work_available: Arc<Condvar>,
    idle: Arc<Condvar>,
    workers: Vec<JoinHandle<()>>,
    metrics: PoolMetrics,
    thread_count: usize,
}

impl ThreadPool {
    /// Builds a pool with `num_workers` worker threads and a fresh,
    /// unregistered metrics registry.
    pub fn new(num_workers: usize) -> Result<Self> {
        Self::with_config(PoolConfig {
            worker_threads: num_workers,
            ..PoolConfig::default()
        })
    }

    /// Builds a pool using [`PoolConfig::default`].
    pub fn default_config() -> Result<Self> {
        Self::with_config(PoolConfig::default())
    }

    /// Builds a pool with an explicit configuration.
    pub fn with_config(config: PoolConfig) -> Result<Self> {
        if config.worker_threads == 0 {
            return Err(Error::InvalidArgument(
                "worker_threads must be greater than zero".to_string(),
            ));
        }
        let metrics = PoolMetrics::new(&config.registry);
        metrics.worker_threads.set(config.worker_threads as i64);

        let state = Arc::new(Mutex::new(PoolState {
            ready: VecDeque::new(),
            active: Vec::new(),
            shutting_down: false,
        }));
        let work_available = Arc::new(Condvar::new());
        let idle = Arc::new(Condvar::new());

        let mut workers = Vec::with_capacity(config.worker_threads);
        for worker_id in 0..config.worker_threads {
            let state = state.clone();
            let work_available = work_available.clone();
            let idle = idle.clone();
            let metrics = metrics.clone();
            workers.push(
                thread::Builder::new()
                    .name(format!("forge-pool-{worker_id}"))
                    .spawn(move || worker_loop(worker_id, state, work_available, idle, metrics))
                    .expect("failed to spawn forge pool worker thread"),
            );
        }

        tracing::info!(worker_threads = config.worker_threads, "thread pool started");

        Ok(Self {
            state,
            work_available,
            idle,
            workers,
            metrics,
            thread_count: config.worker_threads,
        })
    }

    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    pub fn metrics(&self) -> &PoolMetrics {
        &self.metrics
    }

    /// Creates a [`TaskBuilder`] sized for this pool's worker count.
    pub fn new_task_builder(&self) -> Result<TaskBuilder> {
        TaskBuilder::new(self.thread_count)
    }

    /// Submits an assembled task list. The returned `Arc<TaskList>` can be
    /// waited on via [`wait_for`](Self::wait_for); the pool also tracks it
    /// internally so [`wait_idle`](Self::wait_idle) and graceful shutdown
    /// see it.
    pub fn push(&self, list: TaskList) -> Result<Arc<TaskList>> {
        let list = Arc::new(list);

        // Bound to every fence in the list so that an external
        // `FenceHandle::signal` call can pump this specific list and wake a
        // worker immediately, rather than the pool having to discover the
        // fence on its own.
        let state_for_wake = self.state.clone();
        let work_available_for_wake = self.work_available.clone();
        let metrics_for_wake = self.metrics.clone();
        let list_for_wake = list.clone();
        let wake: Arc<dyn Fn() + Send + Sync> = Arc::new(move || {
            let mut guard = state_for_wake.lock();
            pump(&mut guard, &list_for_wake, &metrics_for_wake);
            drop(guard);
            work_available_for_wake.notify_all();
        });
        list.arm(Some(wake));

        let mut state = self.state.lock();
        if state.shutting_down {
            return Err(Error::SubmissionClosed);
        }
        state.active.push(list.clone());
        self.metrics.active_task_lists.inc();
        pump(&mut state, &list, &self.metrics);
        self.work_available.notify_all();
        Ok(list)
    }

    /// Blocks until the given list has finished.
    pub fn wait_for(&self, list: &Arc<TaskList>) {
        list.wait();
    }

    /// Convenience wrapper: submits a single fire-and-forget callable as
    /// its own one-task list.
    pub fn execute<F>(&self, callable: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut builder = self.new_task_builder()?;
        builder.execute(callable)?;
        self.push(builder.build()?)?;
        Ok(())
    }

    /// Convenience wrapper: submits a single value-returning callable as
    /// its own one-task list and returns a handle to its result.
    pub fn invoke<F, R>(&self, callable: F) -> Result<TaskHandle<R>>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Clone + Send + 'static,
    {
        let mut builder = self.new_task_builder()?;
        let handle = builder.invoke(callable)?;
        self.push(builder.build()?)?;
        Ok(handle)
    }

    /// Blocks until every list submitted so far has completed.
    pub fn wait_idle(&self) {
        let mut state = self.state.lock();
        while !state.active.is_empty() {
            self.idle.wait(&mut state);
        }
    }

    fn active_count(&self) -> usize {
        self.state.lock().active.len()
    }

    /// Stops accepting new submissions and joins every worker thread once
    /// the ready queue drains. Lists already active continue running to
    /// completion; this does not wait for them (`wait_idle` first if you
    /// need that).
    fn drain(&mut self) {
        {
            let mut state = self.state.lock();
            state.shutting_down = true;
        }
        self.work_available.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        let active = self.active_count();
        if active != 0 {
            // Spec contract: destroying a pool with outstanding task lists
            // is a programming error with no safe recovery (a detached
            // worker thread could still be touching freed task state), so
            // this is fatal rather than an ordinary panic.
            tracing::error!(
                active_task_lists = active,
                "thread pool destroyed while task lists were still active"
            );
            std::process::abort();
        }
        self.drain();
        tracing::info!("thread pool shut down");
    }
}

/// Advances `list`'s scheduler cursor, pushing every task it yields into
/// the pool's ready queue, until the cursor blocks or the list is
/// exhausted. Called both when a list is first submitted and after every
/// task completion, since finishing a task may be what unblocks a barrier.
fn pump(state: &mut PoolState, list: &Arc<TaskList>, metrics: &PoolMetrics) {
    while let Some(task_index) = list.next() {
        state.ready.push_back(ReadyItem {
            list: list.clone(),
            task_index,
        });
        metrics.queued_tasks.inc();
    }
}

fn worker_loop(
    worker_id: usize,
    state: Arc<Mutex<PoolState>>,
    work_available: Arc<Condvar>,
    idle: Arc<Condvar>,
    metrics: PoolMetrics,
) {
    tracing::debug!(worker_id, "pool worker started");
    loop {
        let item = {
            let mut guard = state.lock();
            loop {
                if let Some(item) = guard.ready.pop_front() {
                    metrics.queued_tasks.dec();
                    break Some(item);
                }
                if guard.shutting_down {
                    break None;
                }
                work_available.wait(&mut guard);
            }
        };
        let Some(ReadyItem { list, task_index }) = item else {
            break;
        };

        let task = list.take_task(task_index);
        let panicked = task.run();
        metrics.tasks_completed.inc();
        if panicked {
            metrics.tasks_panicked.inc();
        }
        list.task_finished();

        let mut guard = state.lock();
        pump(&mut guard, &list, &metrics);
        let woke_idle = if list.is_complete() {
            guard.active.retain(|active| !Arc::ptr_eq(active, &list));
            metrics.active_task_lists.dec();
            true
        } else {
            false
        };
        let has_more_ready = !guard.ready.is_empty();
        drop(guard);

        if has_more_ready {
            work_available.notify_all();
        }
        if woke_idle {
            idle.notify_all();
        }
    }
    tracing::debug!(worker_id, "pool worker stopped");
}
