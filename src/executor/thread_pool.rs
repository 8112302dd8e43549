//! Bounded thread pool with a fixed core/max size and a bounded FIFO queue.
//!
//! Admission follows the classic executor rule: start a thread while below
//! core size, otherwise enqueue, otherwise start a thread while below max
//! size, otherwise hand the task to the pool's [`OverflowPolicy`].

use super::overflow::OverflowPolicy;
use super::task::{Task, TaskHandle};
use super::worker;
use crate::config::PoolConfig;
use crate::error::{Error, Result};
use crate::telemetry::{Metrics, PoolStats};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::{Condvar, Mutex, RwLock};
use std::mem;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

pub struct ThreadPool {
    inner: Arc<Inner>,
}

pub(crate) struct Inner {
    config: PoolConfig,
    // None once shutdown has started; dropping it disconnects the queue
    sender: RwLock<Option<Sender<Task>>>,
    receiver: Receiver<Task>,
    workers: Mutex<WorkerSet>,
    terminated: Condvar,
    active: AtomicUsize,
    thread_seq: AtomicU64,
    pub(crate) metrics: Metrics,
}

struct WorkerSet {
    count: usize,
    largest: usize,
    threads: Vec<JoinHandle<()>>,
    shutdown: bool,
}

impl WorkerSet {
    fn is_terminated(&self) -> bool {
        self.shutdown && self.count == 0
    }
}

impl ThreadPool {
    /// Build a pool. Threads are started lazily, on submission.
    pub fn new(config: PoolConfig) -> Result<Self> {
        config.validate()?;

        // capacity 0 is a direct hand-off; otherwise the queue grows on demand
        // and `offer` enforces the bound
        let (sender, receiver) = if config.queue_capacity == 0 {
            crossbeam_channel::bounded(0)
        } else {
            crossbeam_channel::unbounded()
        };

        let inner = Arc::new(Inner {
            sender: RwLock::new(Some(sender)),
            receiver,
            workers: Mutex::new(WorkerSet {
                count: 0,
                largest: 0,
                threads: Vec::with_capacity(config.core_pool_size),
                shutdown: false,
            }),
            terminated: Condvar::new(),
            active: AtomicUsize::new(0),
            thread_seq: AtomicU64::new(0),
            metrics: Metrics::new(),
            config,
        });

        Ok(Self { inner })
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn overflow_policy(&self) -> OverflowPolicy {
        self.inner.config.overflow_policy
    }

    /// Submit `f` and get a handle to its result.
    ///
    /// Never blocks unless the pool is saturated and its policy runs the
    /// task on the calling thread; in that case a panic of `f` is returned
    /// here as [`Error::TaskPanicked`] instead of through a handle.
    pub fn submit<F, T>(&self, f: F) -> Result<TaskHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (task, handle) = Task::with_handle(f);
        if let Some(rejected) = self.inner.offer(task)? {
            self.inner
                .config
                .overflow_policy
                .handle(rejected, &self.inner)?;
        }
        Ok(handle)
    }

    /// Fire-and-forget submission.
    pub fn execute<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(f).map(drop)
    }

    pub fn stats(&self) -> PoolStats {
        self.inner.stats()
    }

    /// Threads currently running a task.
    pub fn active_count(&self) -> usize {
        self.inner.active.load(Ordering::Relaxed)
    }

    /// Live worker threads.
    pub fn pool_size(&self) -> usize {
        self.inner.workers.lock().count
    }

    pub fn queue_size(&self) -> usize {
        self.inner.receiver.len()
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.is_shutdown()
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.workers.lock().is_terminated()
    }

    /// Stop accepting tasks.
    ///
    /// With `wait_for_tasks_to_complete` queued and running tasks finish and
    /// this call blocks until the pool has terminated. Otherwise queued tasks
    /// are discarded (their handles resolve to [`Error::Cancelled`]) and only
    /// running tasks finish, without waiting.
    pub fn shutdown(&self) {
        if !self.inner.begin_shutdown() {
            return;
        }
        if !self.inner.config.wait_for_tasks_to_complete {
            return;
        }
        if self.inner.on_worker_thread() {
            warn!(pool = %self.name(), "shutdown requested from a pool thread, not waiting for termination");
            return;
        }
        self.inner.wait_terminated(None);
    }

    /// Wait up to `timeout` for the pool to terminate after [`shutdown`](Self::shutdown).
    pub fn await_termination(&self, timeout: Duration) -> bool {
        self.inner.wait_terminated(Some(Instant::now() + timeout))
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("config", &self.inner.config)
            .field("pool_size", &self.pool_size())
            .field("queue_size", &self.queue_size())
            .finish()
    }
}

impl Inner {
    pub(crate) fn name(&self) -> &str {
        &self.config.name
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.workers.lock().shutdown
    }

    /// Admit `task` to a thread or the queue. Gives the task back when the
    /// pool is saturated.
    ///
    /// Runs under the worker-set lock, so the queue bound holds across
    /// concurrent submitters and a worker never retires while a task it
    /// should take is being queued.
    fn offer(self: &Arc<Self>, task: Task) -> Result<Option<Task>> {
        let mut set = self.workers.lock();
        if set.shutdown {
            return Err(Error::shutdown(self.name()));
        }
        // with no live thread the queue is empty; start one with the task
        // instead of queueing it
        if set.count < self.config.core_pool_size || set.count == 0 {
            self.spawn_worker(&mut set, Some(task))?;
            return Ok(None);
        }

        let sent = match self.sender.read().as_ref() {
            Some(sender) if self.has_queue_room() => sender.try_send(task),
            Some(_) => Err(TrySendError::Full(task)),
            None => return Err(Error::shutdown(self.name())),
        };

        match sent {
            Ok(()) => Ok(None),
            Err(TrySendError::Full(task)) if set.count < self.config.max_pool_size => {
                self.spawn_worker(&mut set, Some(task))?;
                Ok(None)
            }
            Err(TrySendError::Full(task)) => Ok(Some(task)),
            Err(TrySendError::Disconnected(_)) => Err(Error::shutdown(self.name())),
        }
    }

    // A hand-off queue has no slots; `try_send` alone decides.
    fn has_queue_room(&self) -> bool {
        self.config.queue_capacity == 0 || self.receiver.len() < self.config.queue_capacity
    }

    fn spawn_worker(self: &Arc<Self>, set: &mut WorkerSet, first: Option<Task>) -> Result<()> {
        set.threads.retain(|t| !t.is_finished());

        let index = self.thread_seq.fetch_add(1, Ordering::Relaxed);
        let pool = Arc::clone(self);
        let thread = thread::Builder::new()
            .name(self.config.thread_name(index))
            .spawn(move || worker::run(pool, first))?;

        set.count += 1;
        set.largest = set.largest.max(set.count);
        set.threads.push(thread);
        trace!(pool = %self.name(), workers = set.count, "worker started");
        Ok(())
    }

    /// Next queued task for a worker, or `None` when the worker should exit.
    /// On `None` the worker has already been removed from the count.
    pub(crate) fn next_task(&self) -> Option<Task> {
        loop {
            let timed = self.may_time_out(self.workers.lock().count);
            let polled = if timed {
                self.receiver.recv_timeout(self.config.keep_alive)
            } else {
                self.receiver
                    .recv()
                    .map_err(|_| RecvTimeoutError::Disconnected)
            };

            match polled {
                Ok(task) => return Some(task),
                Err(RecvTimeoutError::Disconnected) => {
                    self.retire(&mut self.workers.lock());
                    return None;
                }
                Err(RecvTimeoutError::Timeout) => {
                    let mut set = self.workers.lock();
                    if self.may_time_out(set.count) && (set.count > 1 || self.receiver.is_empty()) {
                        trace!(pool = %self.name(), "worker idle past keep-alive, exiting");
                        self.retire(&mut set);
                        return None;
                    }
                }
            }
        }
    }

    fn may_time_out(&self, count: usize) -> bool {
        self.config.allow_core_thread_timeout || count > self.config.core_pool_size
    }

    fn retire(&self, set: &mut WorkerSet) {
        set.count -= 1;
        if set.is_terminated() {
            self.terminated.notify_all();
        }
    }

    pub(crate) fn task_started(&self) {
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn task_finished(&self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Returns false if shutdown had already begun.
    fn begin_shutdown(self: &Arc<Self>) -> bool {
        {
            let mut set = self.workers.lock();
            if set.shutdown {
                return false;
            }
            set.shutdown = true;
        }

        // waits for in-flight try_send calls
        drop(self.sender.write().take());

        let dropped = if self.config.wait_for_tasks_to_complete {
            0
        } else {
            self.drain_queue()
        };

        let mut set = self.workers.lock();
        if set.count == 0 && !self.receiver.is_empty() {
            // queued work outlived every thread; start one to drain it
            let spawned = self.spawn_worker(&mut set, None);
            if let Err(e) = spawned {
                error!(pool = %self.name(), error = %e, "no worker left to drain the queue");
                self.drain_queue();
            }
        }
        if set.is_terminated() {
            self.terminated.notify_all();
        }
        drop(set);

        info!(
            pool = %self.name(),
            wait_for_tasks = self.config.wait_for_tasks_to_complete,
            dropped,
            "pool shutting down"
        );
        true
    }

    fn drain_queue(&self) -> usize {
        let mut dropped = 0;
        while let Ok(task) = self.receiver.try_recv() {
            debug!(pool = %self.name(), task = task.id.as_u64(), "discarding queued task");
            drop(task);
            self.metrics.record_cancelled();
            dropped += 1;
        }
        dropped
    }

    fn on_worker_thread(&self) -> bool {
        let current = thread::current().id();
        self.workers
            .lock()
            .threads
            .iter()
            .any(|t| t.thread().id() == current)
    }

    fn wait_terminated(&self, deadline: Option<Instant>) -> bool {
        let mut set = self.workers.lock();
        while !set.is_terminated() {
            match deadline {
                Some(deadline) => {
                    if self.terminated.wait_until(&mut set, deadline).timed_out() {
                        return set.is_terminated();
                    }
                }
                None => self.terminated.wait(&mut set),
            }
        }

        let threads = mem::take(&mut set.threads);
        drop(set);
        for thread in threads {
            let _ = thread.join();
        }
        true
    }

    pub(crate) fn stats(&self) -> PoolStats {
        let set = self.workers.lock();
        PoolStats {
            name: self.config.name.clone(),
            core_pool_size: self.config.core_pool_size,
            max_pool_size: self.config.max_pool_size,
            pool_size: set.count,
            largest_pool_size: set.largest,
            active_count: self.active.load(Ordering::Relaxed),
            queue_size: self.receiver.len(),
            queue_capacity: self.config.queue_capacity,
            completed_task_count: self.metrics.completed(),
            shutdown: set.shutdown,
            terminated: set.is_terminated(),
            metrics: self.metrics.snapshot(),
        }
    }
}
