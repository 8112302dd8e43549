//! Task representation and result handles.

use super::panic::{self, PanicInfo};
use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

/// Global task ID counter
static TASK_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    pub(crate) fn next() -> Self {
        TaskId(TASK_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// What happened when a task was run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TaskOutcome {
    Completed,
    Panicked(PanicInfo),
    /// The handle was cancelled before the task started; the body never ran.
    Cancelled,
}

/// Internal task representation
pub(crate) struct Task {
    pub(crate) id: TaskId,
    func: Box<dyn FnOnce() -> TaskOutcome + Send + 'static>,
    pub(crate) submitted_at: Instant,
}

impl Task {
    /// Wrap `f` so its result lands in the returned handle.
    pub(crate) fn with_handle<F, T>(f: F) -> (Task, TaskHandle<T>)
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let id = TaskId::next();
        let completion = Arc::new(Completion::new());
        let guard = CompletionGuard(completion.clone());

        let func = move || {
            let guard = guard;
            if !guard.0.begin() {
                return TaskOutcome::Cancelled;
            }
            match panic::catch(f) {
                Ok(value) => {
                    guard.0.complete(Ok(value));
                    TaskOutcome::Completed
                }
                Err(info) => {
                    guard.0.complete(Err(Error::task_panicked(info.message.clone())));
                    TaskOutcome::Panicked(info)
                }
            }
        };

        let task = Task {
            id,
            func: Box::new(func),
            submitted_at: Instant::now(),
        };
        (task, TaskHandle { id, completion })
    }

    /// Execute the task
    pub(crate) fn run(self) -> TaskOutcome {
        (self.func)()
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("submitted_at", &self.submitted_at)
            .finish()
    }
}

enum Slot<T> {
    Pending,
    Running,
    Done(Result<T>),
    Taken,
}

struct State<T> {
    slot: Slot<T>,
    waker: Option<Waker>,
}

struct Completion<T> {
    state: Mutex<State<T>>,
    ready: Condvar,
}

impl<T> Completion<T> {
    fn new() -> Self {
        Self {
            state: Mutex::new(State {
                slot: Slot::Pending,
                waker: None,
            }),
            ready: Condvar::new(),
        }
    }

    /// Claim the task for execution. False if it was cancelled first.
    fn begin(&self) -> bool {
        let mut state = self.state.lock();
        if matches!(state.slot, Slot::Pending) {
            state.slot = Slot::Running;
            true
        } else {
            false
        }
    }

    fn complete(&self, result: Result<T>) {
        let waker = {
            let mut state = self.state.lock();
            state.slot = Slot::Done(result);
            state.waker.take()
        };
        self.ready.notify_all();
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    /// Resolve a still-pending task as cancelled. Returns false once the task
    /// has started or finished.
    fn cancel(&self) -> bool {
        let waker = {
            let mut state = self.state.lock();
            if !matches!(state.slot, Slot::Pending) {
                return false;
            }
            state.slot = Slot::Done(Err(Error::Cancelled));
            state.waker.take()
        };
        self.ready.notify_all();
        if let Some(waker) = waker {
            waker.wake();
        }
        true
    }
}

// Dropped together with the task closure. A task discarded without running
// (queue drained at shutdown) must still resolve its handle.
struct CompletionGuard<T>(Arc<Completion<T>>);

impl<T> Drop for CompletionGuard<T> {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// Future-like handle to the outcome of a submitted task.
///
/// Completes exactly once, with the task's value or with an error
/// ([`Error::TaskPanicked`] or [`Error::Cancelled`]). The handle can be
/// waited on synchronously with [`join`](TaskHandle::join) or awaited.
pub struct TaskHandle<T> {
    id: TaskId,
    completion: Arc<Completion<T>>,
}

impl<T> TaskHandle<T> {
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Request cancellation. Honoured only if the task has not started;
    /// returns whether the request took effect.
    pub fn cancel(&self) -> bool {
        self.completion.cancel()
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.completion.state.lock().slot, Slot::Done(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self.completion.state.lock().slot,
            Slot::Done(Err(Error::Cancelled))
        )
    }

    /// Block until the task finishes and return its outcome.
    ///
    /// # Panics
    ///
    /// If the outcome was already taken by polling the handle to completion.
    pub fn join(self) -> Result<T> {
        let mut state = self.completion.state.lock();
        loop {
            match mem::replace(&mut state.slot, Slot::Taken) {
                Slot::Done(result) => return result,
                Slot::Taken => panic!("TaskHandle joined after completion"),
                other => {
                    state.slot = other;
                    self.completion.ready.wait(&mut state);
                }
            }
        }
    }

    /// Wait up to `timeout` for the task to finish. Returns whether it did.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.completion.state.lock();
        while !matches!(state.slot, Slot::Done(_)) {
            if self
                .completion
                .ready
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return matches!(state.slot, Slot::Done(_));
            }
        }
        true
    }

    /// Take the outcome if the task already finished, else give the handle back.
    pub fn try_join(self) -> std::result::Result<Result<T>, Self> {
        let taken = {
            let mut state = self.completion.state.lock();
            match mem::replace(&mut state.slot, Slot::Taken) {
                Slot::Done(result) => Some(result),
                other => {
                    state.slot = other;
                    None
                }
            }
        };
        taken.ok_or(self)
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.completion.state.lock();
        match mem::replace(&mut state.slot, Slot::Taken) {
            Slot::Done(result) => Poll::Ready(result),
            Slot::Taken => panic!("TaskHandle polled after completion"),
            other => {
                state.slot = other;
                state.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

impl<T> std::fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("finished", &self.is_finished())
            .finish()
    }
}
