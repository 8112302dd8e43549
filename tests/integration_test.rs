use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use taskpools::prelude::*;
use taskpools::{PoolProvisioner, PoolSet};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// core 2, max 4, queue 3 (the I/O pool doubles all three)
fn small_pools() -> PoolSet {
    let settings = ThreadPoolSettings::builder()
        .core_pool_size(2)
        .max_pool_size(4)
        .queue_capacity(3)
        .build()
        .unwrap();
    PoolProvisioner::new(settings)
        .with_cpu_count(2)
        .provision()
        .unwrap()
}

// Tasks blocked on the receiver proceed once the sender is dropped.
fn gate() -> (Sender<()>, Receiver<()>) {
    crossbeam_channel::bounded(0)
}

fn hold<F>(n: usize, wait: &Receiver<()>, submit: F) -> Vec<TaskHandle<usize>>
where
    F: Fn(Box<dyn FnOnce() -> usize + Send>) -> Result<TaskHandle<usize>>,
{
    (0..n)
        .map(|i| {
            let wait = wait.clone();
            submit(Box::new(move || {
                let _ = wait.recv();
                i
            }))
            .unwrap()
        })
        .collect()
}

#[test]
fn test_runtime_defaults() {
    init_tracing();
    let runtime = Runtime::new(ThreadPoolSettings::default()).unwrap();
    let pools = runtime.pools();

    assert_eq!(pools.general.config().core_pool_size, 10);
    assert_eq!(pools.general.config().max_pool_size, 50);
    assert_eq!(pools.io.config().core_pool_size, 20);
    assert_eq!(pools.io.config().queue_capacity, 200);
    assert_eq!(pools.cpu.config().core_pool_size, num_cpus::get());
    assert_eq!(pools.cpu.config().max_pool_size, 2 * num_cpus::get());
    assert_eq!(pools.cpu.config().queue_capacity, 100);

    runtime.shutdown();
}

#[test]
fn test_handles_complete_with_values() {
    init_tracing();
    let runtime = Runtime::new(ThreadPoolSettings::default()).unwrap();
    let dispatcher = runtime.dispatcher();

    let general = dispatcher.submit(|| "general").unwrap();
    let io = dispatcher.submit_io(|| 2u8).unwrap();
    let cpu = dispatcher.submit_cpu(|| (1..=10u64).product::<u64>()).unwrap();

    assert_eq!(general.join().unwrap(), "general");
    assert_eq!(io.join().unwrap(), 2);
    assert_eq!(cpu.join().unwrap(), 3_628_800);

    runtime.shutdown();
}

#[test]
fn test_cpu_pool_rejects_excess_load() {
    init_tracing();
    let pools = small_pools();
    let dispatcher = TaskDispatcher::new(&pools);
    let (open, wait) = gate();

    // max size + queue capacity
    let held = hold(7, &wait, |f| dispatcher.submit_cpu(f));
    assert_eq!(pools.cpu.pool_size(), 4);
    assert_eq!(pools.cpu.queue_size(), 3);

    for _ in 0..5 {
        let err = dispatcher.submit_cpu(|| 0).unwrap_err();
        assert!(matches!(err, Error::Saturated { ref pool } if pool == "cpu-task"));
    }
    assert_eq!(pools.cpu.stats().metrics.rejected, 5);

    drop(open);
    let values: Vec<_> = held.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(values, (0..7).collect::<Vec<_>>());
    pools.shutdown();
}

#[test]
fn test_general_pool_runs_excess_in_caller() {
    init_tracing();
    let pools = small_pools();
    let dispatcher = TaskDispatcher::new(&pools);
    let (open, wait) = gate();

    let held = hold(7, &wait, |f| dispatcher.submit(f));

    let caller = thread::current().id();
    for _ in 0..5 {
        let handle = dispatcher.submit(move || thread::current().id()).unwrap();
        assert!(handle.is_finished());
        assert_eq!(handle.join().unwrap(), caller);
    }
    let metrics = pools.general.stats().metrics;
    assert_eq!(metrics.caller_runs, 5);
    assert_eq!(metrics.rejected, 0);

    drop(open);
    for handle in held {
        handle.join().unwrap();
    }
    pools.shutdown();
}

#[test]
fn test_io_pool_logs_and_runs_in_caller() {
    init_tracing();
    let pools = small_pools();
    let dispatcher = TaskDispatcher::new(&pools);
    let (open, wait) = gate();

    // doubled: max 8 + queue 6
    let held = hold(14, &wait, |f| dispatcher.submit_io(f));

    let caller = thread::current().id();
    let handle = dispatcher.submit_io(move || thread::current().id()).unwrap();
    assert_eq!(handle.join().unwrap(), caller);

    let err = dispatcher
        .submit_io(|| -> u8 { panic!("io failure") })
        .unwrap_err();
    assert!(err.is_task_failure());

    drop(open);
    for handle in held {
        handle.join().unwrap();
    }
    pools.shutdown();
}

#[test]
fn test_cancel_before_start() {
    init_tracing();
    let pools = small_pools();
    let dispatcher = TaskDispatcher::new(&pools);
    let (open, wait) = gate();

    // both core threads busy, the next submission waits in the queue
    let busy = hold(2, &wait, |f| dispatcher.submit_cpu(f));

    let ran = Arc::new(AtomicUsize::new(0));
    let r = ran.clone();
    let queued = dispatcher
        .submit_cpu(move || {
            r.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    assert!(queued.cancel());
    assert!(queued.is_cancelled());

    drop(open);
    for handle in busy {
        handle.join().unwrap();
    }
    assert!(matches!(queued.join(), Err(Error::Cancelled)));
    pools.shutdown();
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[test]
fn test_cancel_after_start_is_ignored() {
    init_tracing();
    let pools = small_pools();
    let (started_tx, started_rx) = crossbeam_channel::bounded(1);
    let (open, wait) = gate();

    let handle = pools
        .general
        .submit(move || {
            let _ = started_tx.send(());
            let _ = wait.recv();
            "finished"
        })
        .unwrap();
    started_rx.recv().unwrap();

    assert!(!handle.cancel());
    drop(open);
    assert_eq!(handle.join().unwrap(), "finished");
    pools.shutdown();
}

#[test]
fn test_panic_does_not_kill_pool() {
    init_tracing();
    let pools = small_pools();
    let dispatcher = TaskDispatcher::new(&pools);

    let failed = dispatcher.submit_cpu(|| -> u32 { panic!("bad input") }).unwrap();
    let err = failed.join().unwrap_err();
    assert!(matches!(err, Error::TaskPanicked { ref message } if message == "bad input"));

    let ok = dispatcher.submit_cpu(|| 7).unwrap();
    assert_eq!(ok.join().unwrap(), 7);
    pools.shutdown();
}

#[test]
fn test_shutdown_completes_queued_tasks() {
    init_tracing();
    let settings = ThreadPoolSettings::builder()
        .core_pool_size(2)
        .max_pool_size(2)
        .queue_capacity(64)
        .wait_for_tasks_to_complete(true)
        .build()
        .unwrap();
    let runtime = Runtime::new(settings).unwrap();
    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..60 {
        let counter = counter.clone();
        runtime
            .dispatcher()
            .execute(move || {
                thread::sleep(Duration::from_millis(1));
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }

    runtime.shutdown();
    assert!(runtime.pools().general.is_terminated());
    assert_eq!(counter.load(Ordering::SeqCst), 60);

    let err = runtime.dispatcher().submit(|| ()).unwrap_err();
    assert!(matches!(err, Error::Shutdown { .. }));
}

#[test]
fn test_shutdown_without_waiting_cancels_queue() {
    init_tracing();
    let settings = ThreadPoolSettings::builder()
        .core_pool_size(1)
        .max_pool_size(1)
        .queue_capacity(8)
        .wait_for_tasks_to_complete(false)
        .build()
        .unwrap();
    let pools = PoolProvisioner::new(settings).with_cpu_count(1).provision().unwrap();
    let (open, wait) = gate();

    let running = hold(1, &wait, |f| pools.general.submit(f));
    let queued = hold(3, &wait, |f| pools.general.submit(f));

    pools.general.shutdown();
    for handle in queued {
        assert!(matches!(handle.join(), Err(Error::Cancelled)));
    }

    drop(open);
    for handle in running {
        assert_eq!(handle.join().unwrap(), 0);
    }
    assert!(pools.general.await_termination(Duration::from_secs(5)));
    pools.shutdown();
}

#[test]
fn test_await_handle_from_async_code() {
    init_tracing();
    let runtime = Runtime::new(ThreadPoolSettings::default()).unwrap();
    let dispatcher = runtime.dispatcher().clone();

    let total = futures::executor::block_on(async move {
        let a = dispatcher.submit_cpu(|| 20).unwrap();
        let b = dispatcher.submit_io(|| 22).unwrap();
        a.await.unwrap() + b.await.unwrap()
    });
    assert_eq!(total, 42);
    runtime.shutdown();
}

#[test]
fn test_scheduler_from_runtime() {
    init_tracing();
    let runtime = Runtime::new(ThreadPoolSettings::default()).unwrap();

    let delayed = runtime
        .scheduler()
        .schedule(Duration::from_millis(10), || "later")
        .unwrap();

    let ticks = Arc::new(AtomicUsize::new(0));
    let t = ticks.clone();
    let periodic = runtime
        .scheduler()
        .schedule_at_fixed_rate(Duration::from_millis(1), Duration::from_millis(5), move || {
            t.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    assert_eq!(delayed.join().unwrap(), "later");

    let deadline = Instant::now() + Duration::from_secs(5);
    while periodic.runs() < 2 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    periodic.cancel();
    assert!(periodic.runs() >= 2);
    assert!(ticks.load(Ordering::SeqCst) >= 2);
    runtime.shutdown();
}

#[test]
fn test_provision_with_unbounded_style_queue() {
    init_tracing();
    let settings = ThreadPoolSettings::builder()
        .core_pool_size(2)
        .max_pool_size(4)
        .queue_capacity(i32::MAX as usize)
        .build()
        .unwrap();
    let runtime = Runtime::new(settings).unwrap();
    let dispatcher = runtime.dispatcher();
    assert_eq!(runtime.pools().io.config().queue_capacity, 2 * i32::MAX as usize);

    let handles: Vec<_> = (0..1_000u64)
        .map(|i| dispatcher.submit_cpu(move || i).unwrap())
        .collect();
    let sum: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(sum, 499_500);
    runtime.shutdown();
}

#[test]
fn test_shutdown_runs_already_scheduled_jobs() {
    init_tracing();
    let settings = ThreadPoolSettings::builder()
        .wait_for_tasks_to_complete(true)
        .build()
        .unwrap();
    let runtime = Runtime::new(settings).unwrap();

    let delayed = runtime
        .scheduler()
        .schedule(Duration::from_millis(20), || "ran")
        .unwrap();
    let periodic = runtime
        .scheduler()
        .schedule_at_fixed_rate(Duration::from_secs(30), Duration::from_secs(30), || {})
        .unwrap();

    runtime.shutdown();
    assert_eq!(delayed.join().unwrap(), "ran");
    assert!(periodic.is_cancelled());
}

#[test]
fn test_shutdown_without_waiting_discards_scheduled_jobs() {
    init_tracing();
    let settings = ThreadPoolSettings::builder()
        .wait_for_tasks_to_complete(false)
        .build()
        .unwrap();
    let runtime = Runtime::new(settings).unwrap();

    let delayed = runtime
        .scheduler()
        .schedule(Duration::from_secs(30), || "never")
        .unwrap();

    runtime.shutdown();
    assert!(matches!(delayed.join(), Err(Error::Cancelled)));
}
