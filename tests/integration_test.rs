//! End-to-end tests for the strand pool and containers.

use strand::prelude::*;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Poll `predicate` until it holds or `timeout` expires.
fn eventually(timeout: Duration, predicate: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    predicate()
}

#[test]
fn test_pool_arithmetic() {
    let pool = ThreadPool::make(4).unwrap();

    let futures: Vec<_> = (0..100i64)
        .map(|i| pool.submit(move || i * i).unwrap())
        .collect();

    let results: HashSet<i64> = futures.into_iter().map(|f| f.get().unwrap()).collect();
    let expected: HashSet<i64> = (0..100i64).map(|i| i * i).collect();
    assert_eq!(results, expected);

    pool.shutdown(true).unwrap();
}

#[test]
fn test_cancelled_submission_never_runs() {
    let pool = ThreadPool::make(2).unwrap();
    let source = StopSource::new();
    let ran = Arc::new(AtomicUsize::new(0));

    source.request_stop();

    let future = {
        let ran = Arc::clone(&ran);
        pool.submit_with_options(TaskHints::default(), source.token(), None, move || {
            ran.fetch_add(1, Ordering::SeqCst);
            42
        })
        .unwrap()
    };

    assert!(future.get().unwrap_err().is_cancelled());
    pool.wait_for_idle();
    assert_eq!(ran.load(Ordering::SeqCst), 0);

    pool.shutdown(true).unwrap();
}

#[test]
fn test_shutdown_drains_queued_tasks() {
    let pool = ThreadPool::make(2).unwrap();

    let futures: Vec<_> = (0..10u32)
        .map(|i| {
            pool.submit(move || {
                thread::sleep(Duration::from_millis(10));
                i
            })
            .unwrap()
        })
        .collect();

    pool.shutdown(true).unwrap();

    for (i, future) in futures.into_iter().enumerate() {
        assert_eq!(future.get().unwrap(), i as u32);
    }
}

#[test]
fn test_quick_shutdown_abandons_queued_tasks() {
    let pool = ThreadPool::make(1).unwrap();
    let (started_tx, started_rx) = crossbeam_channel::bounded(1);

    let future_a = pool
        .submit(move || {
            started_tx.send(()).unwrap();
            thread::sleep(Duration::from_millis(200));
            1u32
        })
        .unwrap();
    let future_b = pool.submit(|| 2u32).unwrap();
    let future_c = pool.submit(|| 3u32).unwrap();

    // Shut down while A occupies the only worker; B and C are still queued.
    started_rx.recv().unwrap();
    pool.shutdown(false).unwrap();

    assert_eq!(future_a.get().unwrap(), 1);
    assert!(future_b.get().unwrap_err().is_cancelled());
    assert!(future_c.get().unwrap_err().is_cancelled());
}

#[test]
fn test_quick_shutdown_fires_stop_callbacks() {
    let pool = ThreadPool::make(1).unwrap();
    let (started_tx, started_rx) = crossbeam_channel::bounded(1);
    let abandoned = Arc::new(AtomicUsize::new(0));

    pool.spawn(move || {
        started_tx.send(()).unwrap();
        thread::sleep(Duration::from_millis(100));
    })
    .unwrap();

    {
        let abandoned = Arc::clone(&abandoned);
        pool.spawn_with_options(
            TaskHints::default(),
            StopToken::unstoppable(),
            Some(Box::new(move |error: &Error| {
                assert!(error.is_cancelled());
                abandoned.fetch_add(1, Ordering::SeqCst);
            })),
            || unreachable!("abandoned task must not run"),
        )
        .unwrap();
    }

    started_rx.recv().unwrap();
    pool.shutdown(false).unwrap();

    assert_eq!(abandoned.load(Ordering::SeqCst), 1);
}

#[test]
fn test_submission_after_shutdown_fails() {
    let pool = ThreadPool::make(2).unwrap();
    pool.shutdown(true).unwrap();

    assert!(pool.spawn(|| {}).unwrap_err().is_shutdown());
    assert!(pool.submit(|| 7).unwrap_err().is_shutdown());
    assert!(pool.set_capacity(4).unwrap_err().is_shutdown());
}

#[test]
fn test_shutdown_idempotent() {
    let pool = ThreadPool::make(2).unwrap();
    pool.shutdown(true).unwrap();
    pool.shutdown(true).unwrap();
    pool.shutdown(false).unwrap();
}

#[test]
fn test_capacity_grow_and_shrink() {
    let pool = ThreadPool::make(2).unwrap();
    assert_eq!(pool.capacity(), 2);
    assert_eq!(pool.actual_capacity(), 2);

    pool.set_capacity(6).unwrap();
    assert_eq!(pool.capacity(), 6);
    // Growth is eager.
    assert_eq!(pool.actual_capacity(), 6);

    pool.set_capacity(3).unwrap();
    assert_eq!(pool.capacity(), 3);
    // Surplus workers exit at their next scheduling point.
    assert!(eventually(Duration::from_secs(5), || pool.actual_capacity() == 3));

    // The shrunk pool still runs tasks.
    let future = pool.submit(|| 11 * 11).unwrap();
    assert_eq!(future.get().unwrap(), 121);

    pool.shutdown(true).unwrap();
}

#[test]
fn test_set_capacity_zero_rejected() {
    let pool = ThreadPool::make(1).unwrap();
    assert!(pool.set_capacity(0).unwrap_err().is_invalid());
    pool.shutdown(true).unwrap();
}

#[test]
fn test_wait_for_idle() {
    let pool = ThreadPool::make(3).unwrap();
    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..20 {
        let counter = Arc::clone(&counter);
        pool.spawn(move || {
            thread::sleep(Duration::from_millis(5));
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }

    pool.wait_for_idle();
    assert_eq!(counter.load(Ordering::SeqCst), 20);
    assert_eq!(pool.num_tasks(), 0);

    pool.shutdown(true).unwrap();
}

#[test]
fn test_wait_for_idle_on_quiet_pool_returns() {
    let pool = ThreadPool::make(1).unwrap();
    pool.wait_for_idle();
    pool.shutdown(true).unwrap();
}

#[test]
fn test_stop_from_signal_observable_without_mutex() {
    let source = StopSource::new();
    let token = source.token();

    source.request_stop_from_signal(15);
    assert!(token.is_stop_requested());

    let err = token.poll().unwrap_err();
    assert!(err.is_cancelled());

    source.reset();
    assert!(token.poll().is_ok());
}

#[test]
fn test_running_task_observes_stop_by_polling() {
    let pool = ThreadPool::make(1).unwrap();
    let source = StopSource::new();
    let token = source.token();

    let (started_tx, started_rx) = crossbeam_channel::bounded(1);
    let future = pool
        .submit_with_options(TaskHints::default(), source.token(), None, move || {
            started_tx.send(()).unwrap();
            let mut spins = 0u64;
            while token.poll().is_ok() {
                thread::sleep(Duration::from_millis(1));
                spins += 1;
                assert!(spins < 10_000, "stop request never observed");
            }
            spins
        })
        .unwrap();

    // Cancellation after pickup is cooperative: the task keeps running
    // until its own poll sees the request.
    started_rx.recv().unwrap();
    source.request_stop();
    assert!(future.get().is_ok());

    pool.shutdown(true).unwrap();
}

#[test]
fn test_global_pool_capacity_control() {
    let before = strand::cpu_thread_pool_capacity();
    assert!(before >= 1);

    strand::set_cpu_thread_pool_capacity(before + 1).unwrap();
    assert_eq!(strand::cpu_thread_pool_capacity(), before + 1);

    let future = cpu_thread_pool().submit(|| 9 * 9).unwrap();
    assert_eq!(future.get().unwrap(), 81);

    strand::set_cpu_thread_pool_capacity(before).unwrap();
}

#[test]
fn test_fifo_single_producer_single_consumer_order() {
    let queue = Arc::new(FifoQueue::new());

    let producer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            for i in 1..=1000u32 {
                queue.push(i);
            }
        })
    };

    let popped: Vec<u32> = (0..1000).map(|_| queue.wait_and_pop()).collect();
    producer.join().unwrap();

    assert_eq!(popped, (1..=1000).collect::<Vec<_>>());
}

#[test]
fn test_stack_destructor_frees_every_node() {
    static LIVE: AtomicUsize = AtomicUsize::new(0);

    struct Tracked(#[allow(dead_code)] usize);
    impl Tracked {
        fn new(v: usize) -> Self {
            LIVE.fetch_add(1, Ordering::SeqCst);
            Tracked(v)
        }
    }
    impl Drop for Tracked {
        fn drop(&mut self) {
            LIVE.fetch_sub(1, Ordering::SeqCst);
        }
    }

    let stack = Arc::new(LockFreeStack::new());
    let pushers: Vec<_> = (0..2)
        .map(|t| {
            let stack = Arc::clone(&stack);
            thread::spawn(move || {
                for i in 0..5000 {
                    stack.push(Tracked::new(t * 5000 + i));
                }
            })
        })
        .collect();
    for pusher in pushers {
        pusher.join().unwrap();
    }

    assert_eq!(LIVE.load(Ordering::SeqCst), 10_000);
    drop(Arc::try_unwrap(stack).expect("no other holders"));
    assert_eq!(LIVE.load(Ordering::SeqCst), 0);
}

#[test]
fn test_hints_are_advisory_only() {
    // Hints are recorded but never reorder pickup: a low-priority task
    // submitted first still starts first on a single worker.
    let pool = ThreadPool::make(1).unwrap();
    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let (started_tx, started_rx) = crossbeam_channel::bounded(1);

    let blocker = pool
        .submit(move || {
            started_tx.send(()).unwrap();
            thread::sleep(Duration::from_millis(50));
        })
        .unwrap();
    started_rx.recv().unwrap();

    for (label, priority) in [("first", 100), ("second", 0)] {
        let order = Arc::clone(&order);
        pool.spawn_with_options(
            TaskHints {
                priority,
                ..TaskHints::default()
            },
            StopToken::unstoppable(),
            None,
            move || order.lock().push(label),
        )
        .unwrap();
    }

    blocker.get().unwrap();
    pool.wait_for_idle();
    assert_eq!(*order.lock(), vec!["first", "second"]);

    pool.shutdown(true).unwrap();
}
