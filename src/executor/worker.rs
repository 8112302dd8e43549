// worker thread loop
use super::task::{Task, TaskOutcome};
use super::thread_pool::Inner;
use std::sync::Arc;
use std::time::Instant;
use tracing::error;

/// Run `first`, then keep taking queued tasks until the pool retires this
/// worker (keep-alive expiry or shutdown with an empty queue).
pub(crate) fn run(pool: Arc<Inner>, first: Option<Task>) {
    let mut next = first;

    loop {
        let task = match next.take() {
            Some(task) => task,
            None => match pool.next_task() {
                Some(task) => task,
                None => break,
            },
        };
        execute_task(&pool, task);
    }
}

fn execute_task(pool: &Inner, task: Task) {
    let tid = task.id;
    let waited = task.submitted_at.elapsed();

    pool.task_started();
    let start = Instant::now();
    let outcome = task.run();
    let ran = start.elapsed();
    pool.task_finished();

    match outcome {
        TaskOutcome::Completed => pool.metrics.record_completion(waited, ran, false),
        TaskOutcome::Panicked(info) => {
            error!(pool = %pool.name(), task = tid.as_u64(), "task panicked: {}", info.message);
            pool.metrics.record_completion(waited, ran, true);
        }
        TaskOutcome::Cancelled => pool.metrics.record_cancelled(),
    }
}
