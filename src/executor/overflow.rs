//! What a saturated pool does with a task it cannot admit.

use super::task::{Task, TaskOutcome};
use super::thread_pool::Inner;
use crate::error::{Error, Result};
use tracing::{debug, error, info, warn};

/// Policy applied when a pool has no idle thread, is at max size and its
/// queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Run the task synchronously on the submitting thread.
    #[default]
    RunInCaller,
    /// Log pool telemetry, then run on the submitting thread and log the outcome.
    RunInCallerWithLogging,
    /// Fail the submission with [`Error::Saturated`].
    Reject,
}

impl OverflowPolicy {
    pub fn runs_in_caller(&self) -> bool {
        !matches!(self, OverflowPolicy::Reject)
    }

    /// Dispose of `task`. A failure of the task body under a caller-runs
    /// policy is returned here, to the submitter.
    pub(crate) fn handle(self, task: Task, pool: &Inner) -> Result<()> {
        match self {
            OverflowPolicy::Reject => {
                pool.metrics.record_rejected();
                debug!(pool = %pool.name(), task = task.id.as_u64(), "task rejected, pool saturated");
                Err(Error::saturated(pool.name()))
            }
            OverflowPolicy::RunInCaller => run_in_caller(task, pool),
            OverflowPolicy::RunInCallerWithLogging => {
                let stats = pool.stats();
                warn!(
                    pool = %pool.name(),
                    queue_size = stats.queue_size,
                    active = stats.active_count,
                    completed = stats.completed_task_count,
                    "task rejected, running in caller thread"
                );
                let result = run_in_caller(task, pool);
                match &result {
                    Ok(()) => info!(pool = %pool.name(), "task executed in caller thread after rejection"),
                    Err(e) => error!(pool = %pool.name(), error = %e, "failed to execute rejected task in caller thread"),
                }
                result
            }
        }
    }
}

fn run_in_caller(task: Task, pool: &Inner) -> Result<()> {
    if pool.is_shutdown() {
        return Err(Error::shutdown(pool.name()));
    }
    pool.metrics.record_caller_run();

    match task.run() {
        TaskOutcome::Completed => Ok(()),
        TaskOutcome::Panicked(info) => Err(Error::task_panicked(info.message)),
        TaskOutcome::Cancelled => Err(Error::Cancelled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        assert_eq!(OverflowPolicy::default(), OverflowPolicy::RunInCaller);
    }

    #[test]
    fn test_runs_in_caller() {
        assert!(OverflowPolicy::RunInCaller.runs_in_caller());
        assert!(OverflowPolicy::RunInCallerWithLogging.runs_in_caller());
        assert!(!OverflowPolicy::Reject.runs_in_caller());
    }
}
