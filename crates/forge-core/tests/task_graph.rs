// Copyright (c) 2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use forge_core::{Error, PoolConfig, ThreadPool};

fn small_pool() -> ThreadPool {
    ThreadPool::with_config(PoolConfig {
        worker_threads: 4,
        ..PoolConfig::default()
    })
    .unwrap()
}

#[test]
fn two_phase_pipeline_runs_producers_then_consumers() {
    let pool = small_pool();
    let mut builder = pool.new_task_builder().unwrap();
    let buffer = Arc::new(Mutex::new(Vec::new()));

    for i in 0..8 {
        let buffer = buffer.clone();
        builder
            .execute(move || buffer.lock().unwrap().push(i))
            .unwrap();
    }
    builder.barrier().unwrap();

    let seen_at_start = Arc::new(AtomicUsize::new(0));
    for _ in 0..4 {
        let buffer = buffer.clone();
        let seen_at_start = seen_at_start.clone();
        builder
            .execute(move || {
                seen_at_start.fetch_max(buffer.lock().unwrap().len(), Ordering::SeqCst);
            })
            .unwrap();
    }
    let done = builder.checkpoint().unwrap();

    let list = pool.push(builder.build().unwrap()).unwrap();
    pool.wait_for(&list);
    done.wait();

    assert_eq!(buffer.lock().unwrap().len(), 8);
    assert_eq!(
        seen_at_start.load(Ordering::SeqCst),
        8,
        "no consumer should observe a partially-filled buffer"
    );
}

#[test]
fn barrier_enforces_ordering_between_segments() {
    let pool = small_pool();
    let mut builder = pool.new_task_builder().unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));

    for label in ["a0", "a1", "a2"] {
        let order = order.clone();
        builder
            .execute(move || {
                std::thread::sleep(Duration::from_millis(2));
                order.lock().unwrap().push(label);
            })
            .unwrap();
    }
    builder.barrier().unwrap();
    for label in ["b0", "b1"] {
        let order = order.clone();
        builder.execute(move || order.lock().unwrap().push(label)).unwrap();
    }
    let final_checkpoint = builder.checkpoint().unwrap();

    let list = pool.push(builder.build().unwrap()).unwrap();
    final_checkpoint.wait();
    pool.wait_for(&list);

    let order = order.lock().unwrap();
    let last_a = order.iter().rposition(|l| l.starts_with('a')).unwrap();
    let first_b = order.iter().position(|l| l.starts_with('b')).unwrap();
    assert!(last_a < first_b, "all a-tasks must finish before any b-task starts");
}

#[test]
fn invoke_propagates_callable_result() {
    let pool = small_pool();
    let handle = pool.invoke(|| 6 * 7).unwrap();
    assert_eq!(handle.get().unwrap(), 42);
}

#[test]
fn invoke_surfaces_panics_as_task_callable_failed() {
    let pool = small_pool();
    let handle = pool.invoke::<_, ()>(|| panic!("boom")).unwrap();
    match handle.get() {
        Err(Error::TaskCallableFailed(message)) => assert!(message.contains("boom")),
        other => panic!("expected TaskCallableFailed, got {other:?}"),
    }
}

#[test]
fn dispatch_rejects_zero_dimension_at_the_pool_level() {
    let pool = small_pool();
    let mut builder = pool.new_task_builder().unwrap();
    assert!(matches!(
        builder.dispatch(0, 1, 1, |_, _, _| {}),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn dispatch_grid_covers_every_point_through_the_pool() {
    let pool = small_pool();
    let mut builder = pool.new_task_builder().unwrap();
    let seen = Arc::new(Mutex::new(std::collections::HashSet::new()));
    let recorded = seen.clone();
    builder
        .dispatch(4, 2, 1, move |ix, iy, iz| {
            recorded.lock().unwrap().insert((ix, iy, iz));
        })
        .unwrap();
    let done = builder.checkpoint().unwrap();
    pool.push(builder.build().unwrap()).unwrap();
    done.wait();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 8);
    for ix in 0..4 {
        for iy in 0..2 {
            assert!(seen.contains(&(ix, iy, 0)));
        }
    }
}

#[test]
fn fence_blocks_the_list_until_raised_externally() {
    let pool = small_pool();
    let mut builder = pool.new_task_builder().unwrap();
    let ran = Arc::new(AtomicUsize::new(0));
    let fence = builder.fence().unwrap();
    let after = ran.clone();
    builder.execute(move || { after.fetch_add(1, Ordering::SeqCst); }).unwrap();
    let done = builder.checkpoint().unwrap();

    let list = pool.push(builder.build().unwrap()).unwrap();
    assert!(!done.wait_for(Duration::from_millis(30)));
    assert_eq!(ran.load(Ordering::SeqCst), 0);

    fence.signal();
    pool.wait_for(&list);
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[test]
fn wait_idle_blocks_until_all_submitted_lists_finish() {
    let pool = small_pool();
    let counter = Arc::new(AtomicUsize::new(0));
    for _ in 0..10 {
        let counter = counter.clone();
        pool.execute(move || {
            std::thread::sleep(Duration::from_millis(3));
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }
    pool.wait_idle();
    assert_eq!(counter.load(Ordering::SeqCst), 10);
}

#[test]
fn pool_drops_cleanly_once_idle() {
    let pool = small_pool();
    pool.execute(|| {}).unwrap();
    pool.wait_idle();
    drop(pool);
}
