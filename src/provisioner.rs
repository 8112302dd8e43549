//! Builds the workload-specific pools from the base settings.
//!
//! | pool             | core            | max               | queue      | overflow                 |
//! |------------------|-----------------|-------------------|------------|--------------------------|
//! | `default-task`   | base            | base              | base       | run in caller            |
//! | `io-task`        | 2 × base        | 2 × base          | 2 × base   | log, then run in caller  |
//! | `cpu-task`       | logical cores   | 2 × logical cores | base       | reject                   |
//! | `scheduled-task` | base (min 1)    | fixed             | unbounded  | n/a                      |

use crate::config::{PoolConfig, ThreadPoolSettings};
use crate::error::{Error, Result};
use crate::executor::{OverflowPolicy, ScheduledPool, ThreadPool};
use std::sync::Arc;
use tracing::info;

pub const GENERAL_POOL: &str = "default-task";
pub const IO_POOL: &str = "io-task";
pub const CPU_POOL: &str = "cpu-task";
pub const SCHEDULED_POOL: &str = "scheduled-task";

#[derive(Debug, Clone)]
pub struct PoolProvisioner {
    settings: ThreadPoolSettings,
    cpu_count: usize,
}

impl PoolProvisioner {
    pub fn new(settings: ThreadPoolSettings) -> Self {
        Self {
            settings,
            cpu_count: num_cpus::get(),
        }
    }

    /// Override the detected logical core count.
    pub fn with_cpu_count(mut self, cpu_count: usize) -> Self {
        self.cpu_count = cpu_count;
        self
    }

    pub fn settings(&self) -> &ThreadPoolSettings {
        &self.settings
    }

    pub fn cpu_count(&self) -> usize {
        self.cpu_count
    }

    pub fn general_config(&self) -> PoolConfig {
        PoolConfig::from_settings(GENERAL_POOL, &self.settings, OverflowPolicy::RunInCaller)
    }

    // I/O-bound work benefits from more threads
    pub fn io_config(&self) -> Result<PoolConfig> {
        let mut config =
            PoolConfig::from_settings(IO_POOL, &self.settings, OverflowPolicy::RunInCallerWithLogging);
        config.core_pool_size = doubled("core-pool-size", self.settings.core_pool_size)?;
        config.max_pool_size = doubled("max-pool-size", self.settings.max_pool_size)?;
        config.queue_capacity = doubled("queue-capacity", self.settings.queue_capacity)?;
        Ok(config)
    }

    pub fn cpu_config(&self) -> Result<PoolConfig> {
        if self.cpu_count == 0 {
            return Err(Error::config("logical core count must be > 0"));
        }
        let mut config = PoolConfig::from_settings(CPU_POOL, &self.settings, OverflowPolicy::Reject);
        config.core_pool_size = self.cpu_count;
        config.max_pool_size = doubled("cpu core count", self.cpu_count)?;
        Ok(config)
    }

    /// Build every pool. Any invalid setting fails the whole set.
    pub fn provision(&self) -> Result<PoolSet> {
        self.settings.validate()?;

        let general = build(self.general_config())?;
        let io = build(self.io_config()?)?;
        let cpu = build(self.cpu_config()?)?;

        let scheduled_threads = self.settings.core_pool_size.max(1);
        let scheduled = Arc::new(ScheduledPool::with_shutdown_policy(
            SCHEDULED_POOL,
            scheduled_threads,
            self.settings.wait_for_tasks_to_complete,
        )?);
        info!(pool = SCHEDULED_POOL, threads = scheduled_threads, "created scheduled task executor");

        Ok(PoolSet {
            general,
            io,
            cpu,
            scheduled,
        })
    }
}

fn doubled(what: &str, n: usize) -> Result<usize> {
    n.checked_mul(2)
        .ok_or_else(|| Error::config(format!("{what} too large to double ({n})")))
}

fn build(config: PoolConfig) -> Result<Arc<ThreadPool>> {
    let pool = ThreadPool::new(config)?;
    let c = pool.config();
    info!(
        pool = %c.name,
        core = c.core_pool_size,
        max = c.max_pool_size,
        queue = c.queue_capacity,
        policy = ?c.overflow_policy,
        "created task executor"
    );
    Ok(Arc::new(pool))
}

/// The provisioned pools. Dropping the last reference to a pool shuts it down.
#[derive(Debug, Clone)]
pub struct PoolSet {
    pub general: Arc<ThreadPool>,
    pub io: Arc<ThreadPool>,
    pub cpu: Arc<ThreadPool>,
    pub scheduled: Arc<ScheduledPool>,
}

impl PoolSet {
    pub fn shutdown(&self) {
        self.general.shutdown();
        self.io.shutdown();
        self.cpu.shutdown();
        self.scheduled.shutdown();
    }
}
