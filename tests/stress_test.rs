//! Stress tests for the task pools

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use taskpools::prelude::*;

#[test]
#[ignore] // Run with --ignored flag
fn stress_test_many_small_tasks() {
    let runtime = Runtime::new(ThreadPoolSettings::default()).unwrap();
    let dispatcher = runtime.dispatcher();

    let handles: Vec<_> = (0..100_000u64)
        .map(|i| dispatcher.submit(move || i * 2).unwrap())
        .collect();
    let sum: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(sum, 99_999 * 100_000);

    runtime.shutdown();
}

#[test]
#[ignore]
fn stress_test_concurrent_submitters() {
    let runtime = Runtime::new(ThreadPoolSettings::default()).unwrap();
    let counter = Arc::new(AtomicUsize::new(0));
    let rejected = Arc::new(AtomicUsize::new(0));

    let submitters: Vec<_> = (0..8)
        .map(|_| {
            let dispatcher = runtime.dispatcher().clone();
            let counter = counter.clone();
            let rejected = rejected.clone();
            thread::spawn(move || {
                for _ in 0..10_000 {
                    let counter = counter.clone();
                    let done = dispatcher.submit_cpu(move || {
                        counter.fetch_add(1, Ordering::Relaxed);
                    });
                    match done {
                        Ok(handle) => handle.join().unwrap(),
                        Err(e) if e.is_saturated() => {
                            rejected.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                }
            })
        })
        .collect();

    for submitter in submitters {
        submitter.join().unwrap();
    }
    assert_eq!(
        counter.load(Ordering::Relaxed) + rejected.load(Ordering::Relaxed),
        80_000
    );

    runtime.dispatcher().log_status();
    runtime.shutdown();
}

#[test]
#[ignore]
fn stress_test_caller_runs_under_flood() {
    let settings = ThreadPoolSettings::builder()
        .core_pool_size(1)
        .max_pool_size(2)
        .queue_capacity(4)
        .build()
        .unwrap();
    let runtime = Runtime::new(settings).unwrap();
    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..50_000 {
        let counter = counter.clone();
        runtime
            .dispatcher()
            .execute(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();
    }

    runtime.shutdown();
    assert_eq!(counter.load(Ordering::Relaxed), 50_000);
}
