use crate::config::ThreadPoolSettings;
use crate::dispatcher::TaskDispatcher;
use crate::error::Result;
use crate::executor::ScheduledPool;
use crate::provisioner::{PoolProvisioner, PoolSet};
use tracing::info;

/// Composition root: owns the provisioned pools and hands out the dispatcher.
///
/// Built explicitly at start and passed to whatever needs it; there is no
/// process-wide instance. Dropping the runtime shuts every pool down.
pub struct Runtime {
    settings: ThreadPoolSettings,
    pools: PoolSet,
    dispatcher: TaskDispatcher,
}

impl Runtime {
    pub fn new(settings: ThreadPoolSettings) -> Result<Self> {
        Self::with_provisioner(PoolProvisioner::new(settings))
    }

    pub fn with_provisioner(provisioner: PoolProvisioner) -> Result<Self> {
        let pools = provisioner.provision()?;
        let dispatcher = TaskDispatcher::new(&pools);
        info!(cpus = provisioner.cpu_count(), "task runtime started");

        Ok(Self {
            settings: provisioner.settings().clone(),
            pools,
            dispatcher,
        })
    }

    /// Defaults overlaid with `THREAD_POOL_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(ThreadPoolSettings::from_env()?)
    }

    /// Settings from the `[thread.pool]` table of a TOML document.
    pub fn from_toml_str(doc: &str) -> Result<Self> {
        Self::new(ThreadPoolSettings::from_toml_str(doc)?)
    }

    pub fn settings(&self) -> &ThreadPoolSettings {
        &self.settings
    }

    pub fn dispatcher(&self) -> &TaskDispatcher {
        &self.dispatcher
    }

    pub fn scheduler(&self) -> &ScheduledPool {
        &self.pools.scheduled
    }

    pub fn pools(&self) -> &PoolSet {
        &self.pools
    }

    /// Shut down every pool, each according to its wait-for-tasks setting.
    pub fn shutdown(&self) {
        self.pools.shutdown();
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("settings", &self.settings)
            .field("pools", &self.pools)
            .finish()
    }
}
