// Copyright (c) 2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use prometheus::{
    register_int_counter_with_registry, register_int_gauge_with_registry, IntCounter, IntGauge,
    Registry,
};

/// Pool-wide instrumentation, registered once per [`ThreadPool`](crate::ThreadPool).
#[derive(Clone)]
pub struct PoolMetrics {
    pub worker_threads: IntGauge,
    pub active_task_lists: IntGauge,
    pub queued_tasks: IntGauge,
    pub tasks_completed: IntCounter,
    pub tasks_panicked: IntCounter,
}

impl PoolMetrics {
    pub fn new(registry: &Registry) -> Self {
        Self {
            worker_threads: register_int_gauge_with_registry!(
                "forge_pool_worker_threads",
                "Number of worker threads owned by the pool.",
                registry,
            )
            .unwrap(),
            active_task_lists: register_int_gauge_with_registry!(
                "forge_pool_active_task_lists",
                "Number of task lists currently submitted and not yet complete.",
                registry,
            )
            .unwrap(),
            queued_tasks: register_int_gauge_with_registry!(
                "forge_pool_queued_tasks",
                "Number of task entries currently waiting for a free worker.",
                registry,
            )
            .unwrap(),
            tasks_completed: register_int_counter_with_registry!(
                "forge_pool_tasks_completed_total",
                "Total number of task callables that have finished running.",
                registry,
            )
            .unwrap(),
            tasks_panicked: register_int_counter_with_registry!(
                "forge_pool_tasks_panicked_total",
                "Total number of task callables that panicked instead of returning normally.",
                registry,
            )
            .unwrap(),
        }
    }
}
