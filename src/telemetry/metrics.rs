//! Per-pool counters and latency histograms.

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

// one hour in nanoseconds
const MAX_TRACKED_NS: u64 = 3_600_000_000_000;

/// Counters collected by a single pool.
#[derive(Debug)]
pub struct Metrics {
    tasks_completed: AtomicU64,
    tasks_panicked: AtomicU64,
    tasks_cancelled: AtomicU64,
    caller_runs: AtomicU64,
    rejected: AtomicU64,

    // run time and queue wait, in nanoseconds
    run_histogram: Mutex<Histogram<u64>>,
    wait_histogram: Mutex<Histogram<u64>>,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            tasks_completed: AtomicU64::new(0),
            tasks_panicked: AtomicU64::new(0),
            tasks_cancelled: AtomicU64::new(0),
            caller_runs: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            run_histogram: Mutex::new(new_histogram()),
            wait_histogram: Mutex::new(new_histogram()),
            start_time: Instant::now(),
        }
    }

    /// A task finished on a pool thread (successfully or by panicking).
    pub fn record_completion(&self, waited: Duration, ran: Duration, panicked: bool) {
        self.tasks_completed.fetch_add(1, Ordering::Relaxed);
        if panicked {
            self.tasks_panicked.fetch_add(1, Ordering::Relaxed);
        }
        record(&self.wait_histogram, waited);
        record(&self.run_histogram, ran);
    }

    pub fn record_cancelled(&self) {
        self.tasks_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_caller_run(&self) {
        self.caller_runs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn completed(&self) -> u64 {
        self.tasks_completed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let run = self.run_histogram.lock();
        let wait = self.wait_histogram.lock();

        MetricsSnapshot {
            uptime: self.start_time.elapsed(),
            tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
            tasks_panicked: self.tasks_panicked.load(Ordering::Relaxed),
            tasks_cancelled: self.tasks_cancelled.load(Ordering::Relaxed),
            caller_runs: self.caller_runs.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            avg_run_ns: mean(&run),
            p99_run_ns: run.value_at_quantile(0.99),
            max_run_ns: run.max(),
            avg_wait_ns: mean(&wait),
            p99_wait_ns: wait.value_at_quantile(0.99),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn new_histogram() -> Histogram<u64> {
    Histogram::new_with_max(MAX_TRACKED_NS, 3).expect("Failed to create histogram")
}

fn record(histogram: &Mutex<Histogram<u64>>, elapsed: Duration) {
    let ns = (elapsed.as_nanos() as u64).clamp(1, MAX_TRACKED_NS);
    let _ = histogram.lock().record(ns);
}

fn mean(histogram: &Histogram<u64>) -> u64 {
    if histogram.len() > 0 {
        histogram.mean() as u64
    } else {
        0
    }
}

/// Counters at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    #[serde(with = "duration_ms")]
    pub uptime: Duration,
    pub tasks_completed: u64,
    pub tasks_panicked: u64,
    pub tasks_cancelled: u64,
    pub caller_runs: u64,
    pub rejected: u64,
    pub avg_run_ns: u64,
    pub p99_run_ns: u64,
    pub max_run_ns: u64,
    pub avg_wait_ns: u64,
    pub p99_wait_ns: u64,
}

impl MetricsSnapshot {
    /// Completed tasks per second of pool uptime.
    pub fn tasks_per_second(&self) -> f64 {
        let seconds = self.uptime.as_secs_f64();
        if seconds == 0.0 {
            return 0.0;
        }
        self.tasks_completed as f64 / seconds
    }
}

/// Pool telemetry: thread counts, queue depth and the counters above.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolStats {
    pub name: String,
    pub core_pool_size: usize,
    pub max_pool_size: usize,
    pub pool_size: usize,
    pub largest_pool_size: usize,
    pub active_count: usize,
    pub queue_size: usize,
    pub queue_capacity: usize,
    pub completed_task_count: u64,
    pub shutdown: bool,
    pub terminated: bool,
    pub metrics: MetricsSnapshot,
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}
