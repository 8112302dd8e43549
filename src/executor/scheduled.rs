//! Fixed-size pool for delayed and periodic work.

use super::panic;
use super::task::{Task, TaskHandle, TaskId, TaskOutcome};
use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{error, info};

pub struct ScheduledPool {
    inner: Arc<Shared>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

struct Shared {
    name: String,
    // one-shot jobs already scheduled still run after shutdown
    run_delayed_after_shutdown: bool,
    state: Mutex<State>,
    available: Condvar,
    seq: AtomicU64,
}

struct State {
    heap: BinaryHeap<Entry>,
    shutdown: bool,
}

enum Job {
    Once(Task),
    Periodic(Arc<PeriodicJob>),
}

struct Entry {
    deadline: Instant,
    seq: u64,
    job: Job,
}

// BinaryHeap is a max-heap: the earliest deadline must compare greatest,
// ties broken by submission order.
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Entry {}

struct PeriodicJob {
    id: TaskId,
    period: Duration,
    body: Mutex<Box<dyn FnMut() + Send + 'static>>,
    cancelled: AtomicBool,
    runs: AtomicU64,
}

/// Handle to a fixed-rate job.
#[derive(Clone)]
pub struct PeriodicHandle {
    job: Arc<PeriodicJob>,
}

impl PeriodicHandle {
    pub fn id(&self) -> TaskId {
        self.job.id
    }

    /// Stop future executions. A run already in progress completes.
    pub fn cancel(&self) {
        self.job.cancelled.store(true, Ordering::Release);
    }

    /// True once cancelled, or once the job panicked.
    pub fn is_cancelled(&self) -> bool {
        self.job.cancelled.load(Ordering::Acquire)
    }

    /// Completed executions so far.
    pub fn runs(&self) -> u64 {
        self.job.runs.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for PeriodicHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodicHandle")
            .field("id", &self.job.id)
            .field("period", &self.job.period)
            .field("runs", &self.runs())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl ScheduledPool {
    /// Start `num_threads` threads. Delayed one-shot jobs scheduled before
    /// [`shutdown`](Self::shutdown) still run; periodic jobs stop.
    pub fn new<S: Into<String>>(name: S, num_threads: usize) -> Result<Self> {
        Self::with_shutdown_policy(name, num_threads, true)
    }

    /// Like [`new`](Self::new), but with `run_delayed_after_shutdown = false`
    /// shutdown discards every pending job and their handles resolve to
    /// [`Error::Cancelled`].
    pub fn with_shutdown_policy<S: Into<String>>(
        name: S,
        num_threads: usize,
        run_delayed_after_shutdown: bool,
    ) -> Result<Self> {
        let name = name.into();
        if num_threads == 0 {
            return Err(Error::config(format!("{name}: need at least 1 thread")));
        }

        let inner = Arc::new(Shared {
            name,
            run_delayed_after_shutdown,
            state: Mutex::new(State {
                heap: BinaryHeap::new(),
                shutdown: false,
            }),
            available: Condvar::new(),
            seq: AtomicU64::new(0),
        });

        let mut threads = Vec::with_capacity(num_threads);
        for id in 0..num_threads {
            let shared = inner.clone();
            let thread = thread::Builder::new()
                .name(format!("{}-{}", inner.name, id))
                .spawn(move || shared.run_worker())?;
            threads.push(thread);
        }

        Ok(Self {
            inner,
            threads: Mutex::new(threads),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn num_threads(&self) -> usize {
        self.threads.lock().len()
    }

    /// Run `f` once, no earlier than `delay` from now.
    pub fn schedule<F, T>(&self, delay: Duration, f: F) -> Result<TaskHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (task, handle) = Task::with_handle(f);
        self.inner.push(Instant::now() + delay, Job::Once(task))?;
        Ok(handle)
    }

    /// Run `f` after `initial_delay`, then every `period` measured from the
    /// previous scheduled start. A panic suppresses later runs.
    pub fn schedule_at_fixed_rate<F>(
        &self,
        initial_delay: Duration,
        period: Duration,
        f: F,
    ) -> Result<PeriodicHandle>
    where
        F: FnMut() + Send + 'static,
    {
        if period.is_zero() {
            return Err(Error::config("period must be > 0"));
        }

        let job = Arc::new(PeriodicJob {
            id: TaskId::next(),
            period,
            body: Mutex::new(Box::new(f)),
            cancelled: AtomicBool::new(false),
            runs: AtomicU64::new(0),
        });
        self.inner
            .push(Instant::now() + initial_delay, Job::Periodic(job.clone()))?;
        Ok(PeriodicHandle { job })
    }

    /// Jobs waiting for their deadline.
    pub fn pending(&self) -> usize {
        self.inner.state.lock().heap.len()
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.state.lock().shutdown
    }

    /// Stop accepting jobs and stop periodic jobs. Pending one-shot jobs run
    /// at their deadline unless the pool discards them on shutdown; this call
    /// blocks until the threads have exited.
    pub fn shutdown(&self) {
        let (kept, discarded) = {
            let mut state = self.inner.state.lock();
            if state.shutdown {
                return;
            }
            state.shutdown = true;

            let mut discarded = 0;
            for entry in mem::take(&mut state.heap).into_vec() {
                let keep =
                    self.inner.run_delayed_after_shutdown && matches!(entry.job, Job::Once(_));
                if keep {
                    state.heap.push(entry);
                    continue;
                }
                if let Job::Periodic(job) = &entry.job {
                    job.cancelled.store(true, Ordering::Release);
                }
                // dropping a one-shot task resolves its handle as cancelled
                drop(entry);
                discarded += 1;
            }
            (state.heap.len(), discarded)
        };
        self.inner.available.notify_all();
        info!(pool = %self.inner.name, kept, discarded, "scheduled pool shutting down");

        let current = thread::current().id();
        let threads: Vec<_> = self.threads.lock().drain(..).collect();
        for thread in threads {
            if thread.thread().id() != current {
                let _ = thread.join();
            }
        }
    }
}

impl Drop for ScheduledPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ScheduledPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledPool")
            .field("name", &self.inner.name)
            .field("pending", &self.pending())
            .finish()
    }
}

impl Shared {
    fn push(&self, deadline: Instant, job: Job) -> Result<()> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        {
            let mut state = self.state.lock();
            if state.shutdown {
                return Err(Error::shutdown(&self.name));
            }
            state.heap.push(Entry { deadline, seq, job });
        }
        // a new earliest deadline must wake a sleeper
        self.available.notify_one();
        Ok(())
    }

    fn next_due(&self) -> Option<Entry> {
        let mut state = self.state.lock();
        loop {
            match state.heap.peek().map(|e| e.deadline) {
                None if state.shutdown => return None,
                None => self.available.wait(&mut state),
                Some(deadline) if deadline <= Instant::now() => return state.heap.pop(),
                Some(deadline) => {
                    self.available.wait_until(&mut state, deadline);
                }
            }
        }
    }

    fn run_worker(&self) {
        while let Some(entry) = self.next_due() {
            match entry.job {
                Job::Once(task) => {
                    let tid = task.id;
                    if let TaskOutcome::Panicked(info) = task.run() {
                        error!(pool = %self.name, task = tid.as_u64(), "scheduled task panicked: {}", info.message);
                    }
                }
                Job::Periodic(job) => self.run_periodic(entry.deadline, job),
            }
        }
    }

    fn run_periodic(&self, scheduled_at: Instant, job: Arc<PeriodicJob>) {
        if job.cancelled.load(Ordering::Acquire) {
            return;
        }

        let result = {
            let mut body = job.body.lock();
            panic::catch(|| (*body)())
        };

        match result {
            Ok(()) => {
                job.runs.fetch_add(1, Ordering::AcqRel);
                if !job.cancelled.load(Ordering::Acquire) {
                    // shut down in the meantime: the job just stops
                    let _ = self.push(scheduled_at + job.period, Job::Periodic(job));
                }
            }
            Err(info) => {
                job.cancelled.store(true, Ordering::Release);
                error!(
                    pool = %self.name,
                    task = job.id.as_u64(),
                    "periodic task panicked, suppressing further runs: {}",
                    info.message
                );
            }
        }
    }
}
