use crate::error::Result;
use crate::executor::{TaskHandle, ThreadPool};
use crate::provisioner::PoolSet;
use crate::telemetry::PoolStats;
use std::sync::Arc;
use tracing::info;

/// Workload class a task is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolKind {
    General,
    Io,
    Cpu,
}

impl PoolKind {
    pub const ALL: [PoolKind; 3] = [PoolKind::General, PoolKind::Io, PoolKind::Cpu];
}

/// Routes work to the general, I/O and CPU pools.
///
/// Cheap to clone; clones share the same pools. The dispatcher references
/// the pools but does not own their lifecycle: shutting down is done through
/// [`PoolSet`] or the [`Runtime`](crate::Runtime).
#[derive(Debug, Clone)]
pub struct TaskDispatcher {
    general: Arc<ThreadPool>,
    io: Arc<ThreadPool>,
    cpu: Arc<ThreadPool>,
}

impl TaskDispatcher {
    pub fn new(pools: &PoolSet) -> Self {
        Self::from_pools(pools.general.clone(), pools.io.clone(), pools.cpu.clone())
    }

    pub fn from_pools(general: Arc<ThreadPool>, io: Arc<ThreadPool>, cpu: Arc<ThreadPool>) -> Self {
        Self { general, io, cpu }
    }

    pub fn pool(&self, kind: PoolKind) -> &ThreadPool {
        match kind {
            PoolKind::General => &self.general,
            PoolKind::Io => &self.io,
            PoolKind::Cpu => &self.cpu,
        }
    }

    pub fn submit_to<F, T>(&self, kind: PoolKind, f: F) -> Result<TaskHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.pool(kind).submit(f)
    }

    /// Run on the general pool.
    pub fn submit<F, T>(&self, f: F) -> Result<TaskHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.general.submit(f)
    }

    /// Run on the I/O pool.
    pub fn submit_io<F, T>(&self, f: F) -> Result<TaskHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.io.submit(f)
    }

    /// Run on the CPU pool. Fails with `Saturated` rather than falling back
    /// to the caller when the pool is full.
    pub fn submit_cpu<F, T>(&self, f: F) -> Result<TaskHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.cpu.submit(f)
    }

    /// Run a side effect on the general pool and get a completion handle.
    pub fn run_async<F>(&self, f: F) -> Result<TaskHandle<()>>
    where
        F: FnOnce() + Send + 'static,
    {
        self.general.submit(f)
    }

    /// Fire-and-forget on the general pool.
    pub fn execute<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.general.execute(f)
    }

    pub fn stats(&self) -> Vec<PoolStats> {
        PoolKind::ALL.iter().map(|k| self.pool(*k).stats()).collect()
    }

    pub fn log_status(&self) {
        for stats in self.stats() {
            info!(
                pool = %stats.name,
                pool_size = stats.pool_size,
                active = stats.active_count,
                queue_size = stats.queue_size,
                completed = stats.completed_task_count,
                rejected = stats.metrics.rejected,
                caller_runs = stats.metrics.caller_runs,
                "thread pool status"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThreadPoolSettings;
    use crate::provisioner::{PoolProvisioner, CPU_POOL, GENERAL_POOL, IO_POOL};
    use std::thread;

    fn pools() -> PoolSet {
        let settings = ThreadPoolSettings::builder()
            .core_pool_size(1)
            .max_pool_size(2)
            .queue_capacity(4)
            .build()
            .unwrap();
        PoolProvisioner::new(settings).with_cpu_count(2).provision().unwrap()
    }

    fn thread_name() -> String {
        thread::current().name().unwrap_or_default().to_string()
    }

    #[test]
    fn test_routes_to_each_pool() {
        let pools = pools();
        let dispatcher = TaskDispatcher::new(&pools);

        let general = dispatcher.submit(thread_name).unwrap().join().unwrap();
        let io = dispatcher.submit_io(thread_name).unwrap().join().unwrap();
        let cpu = dispatcher.submit_cpu(thread_name).unwrap().join().unwrap();

        assert!(general.starts_with(GENERAL_POOL));
        assert!(io.starts_with(IO_POOL));
        assert!(cpu.starts_with(CPU_POOL));

        let routed = dispatcher.submit_to(PoolKind::Io, thread_name).unwrap().join().unwrap();
        assert!(routed.starts_with(IO_POOL));
        pools.shutdown();
    }

    #[test]
    fn test_run_async_and_execute() {
        let pools = pools();
        let dispatcher = TaskDispatcher::new(&pools);

        let (tx, rx) = crossbeam_channel::bounded(1);
        dispatcher
            .execute(move || {
                let _ = tx.send(7);
            })
            .unwrap();
        assert_eq!(rx.recv().unwrap(), 7);

        dispatcher.run_async(|| {}).unwrap().join().unwrap();
        pools.shutdown();
    }

    #[test]
    fn test_stats_cover_three_pools() {
        let pools = pools();
        let dispatcher = TaskDispatcher::new(&pools);
        dispatcher.submit(|| ()).unwrap().join().unwrap();

        let stats = dispatcher.stats();
        let names: Vec<_> = stats.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec![GENERAL_POOL, IO_POOL, CPU_POOL]);
        assert!(stats.iter().all(|s| !s.shutdown));
        dispatcher.log_status();
        pools.shutdown();
    }
}
