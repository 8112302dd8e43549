//! Declarative pool settings.
//!
//! Settings are read once at start from a TOML document (`[thread.pool]`
//! table), from `THREAD_POOL_*` environment variables, or built in code.
//! Keys mirror the property names used by the services that embed the pools:
//!
//! ```toml
//! [thread.pool]
//! core-pool-size = 10
//! max-pool-size = 50
//! queue-capacity = 100
//! keep-alive-seconds = 60
//! allow-core-thread-timeout = true
//! wait-for-tasks-to-complete = true
//! ```

use crate::error::{Error, Result};
use crate::executor::OverflowPolicy;
use serde::Deserialize;
use std::time::Duration;

pub const CORE_POOL_SIZE_KEY: &str = "thread.pool.core-pool-size";
pub const MAX_POOL_SIZE_KEY: &str = "thread.pool.max-pool-size";
pub const QUEUE_CAPACITY_KEY: &str = "thread.pool.queue-capacity";
pub const KEEP_ALIVE_SECONDS_KEY: &str = "thread.pool.keep-alive-seconds";
pub const ALLOW_CORE_THREAD_TIMEOUT_KEY: &str = "thread.pool.allow-core-thread-timeout";
pub const WAIT_FOR_TASKS_KEY: &str = "thread.pool.wait-for-tasks-to-complete";

/// Upper bound on threads per pool, applied after derivation.
pub const MAX_THREADS_PER_POOL: usize = 10_000;

/// Base settings shared by every pool the provisioner builds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadPoolSettings {
    pub core_pool_size: usize,
    pub max_pool_size: usize,
    pub queue_capacity: usize,
    pub keep_alive: Duration,
    pub allow_core_thread_timeout: bool,
    pub wait_for_tasks_to_complete: bool,
}

impl Default for ThreadPoolSettings {
    fn default() -> Self {
        Self {
            core_pool_size: 10,
            max_pool_size: 50,
            queue_capacity: 100,
            keep_alive: Duration::from_secs(60),
            allow_core_thread_timeout: true,
            wait_for_tasks_to_complete: true,
        }
    }
}

impl ThreadPoolSettings {
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::new()
    }

    /// Parse the `[thread.pool]` table of a TOML document. Other tables are
    /// ignored; unknown keys inside `[thread.pool]` are rejected.
    pub fn from_toml_str(doc: &str) -> Result<Self> {
        let doc: SettingsDocument = toml::from_str(doc)?;
        let mut settings = Self::default();
        doc.thread.pool.apply_to(&mut settings)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Defaults overlaid with `THREAD_POOL_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut settings = Self::default();
        settings.apply_overrides(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Overlay values returned by `lookup`, keyed by environment variable name
    /// (`thread.pool.core-pool-size` becomes `THREAD_POOL_CORE_POOL_SIZE`).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &'static str| lookup(&env_var_name(key)).map(|v| (key, v));

        if let Some((key, v)) = get(CORE_POOL_SIZE_KEY) {
            self.core_pool_size = parse_size(key, &v)?;
        }
        if let Some((key, v)) = get(MAX_POOL_SIZE_KEY) {
            self.max_pool_size = parse_size(key, &v)?;
        }
        if let Some((key, v)) = get(QUEUE_CAPACITY_KEY) {
            self.queue_capacity = parse_size(key, &v)?;
        }
        if let Some((key, v)) = get(KEEP_ALIVE_SECONDS_KEY) {
            self.keep_alive = Duration::from_secs(parse_size(key, &v)? as u64);
        }
        if let Some((key, v)) = get(ALLOW_CORE_THREAD_TIMEOUT_KEY) {
            self.allow_core_thread_timeout = parse_flag(key, &v)?;
        }
        if let Some((key, v)) = get(WAIT_FOR_TASKS_KEY) {
            self.wait_for_tasks_to_complete = parse_flag(key, &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_pool_size == 0 {
            return Err(Error::config("max-pool-size must be > 0"));
        }
        if self.max_pool_size < self.core_pool_size {
            return Err(Error::config(format!(
                "max-pool-size ({}) must be >= core-pool-size ({})",
                self.max_pool_size, self.core_pool_size
            )));
        }
        if self.allow_core_thread_timeout && self.keep_alive.is_zero() {
            return Err(Error::config(
                "keep-alive-seconds must be > 0 when allow-core-thread-timeout is set",
            ));
        }
        // the I/O pool doubles the base sizes
        if self.max_pool_size > MAX_THREADS_PER_POOL / 2 {
            return Err(Error::config(format!(
                "max-pool-size too large (max {})",
                MAX_THREADS_PER_POOL / 2
            )));
        }
        Ok(())
    }
}

/// Environment variable carrying the given property key.
pub fn env_var_name(key: &str) -> String {
    key.to_ascii_uppercase().replace(['.', '-'], "_")
}

fn parse_size(key: &str, raw: &str) -> Result<usize> {
    let value: i64 = raw
        .trim()
        .parse()
        .map_err(|_| Error::config(format!("{key}: `{raw}` is not an integer")))?;
    to_size(key, value)
}

fn to_size(key: &str, value: i64) -> Result<usize> {
    usize::try_from(value).map_err(|_| Error::config(format!("{key} must not be negative (got {value})")))
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(Error::config(format!("{key}: `{raw}` is not a boolean"))),
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsDocument {
    #[serde(default)]
    thread: ThreadTable,
}

#[derive(Debug, Default, Deserialize)]
struct ThreadTable {
    #[serde(default)]
    pool: RawSettings,
}

// Sizes are signed so that negative values surface as config errors rather
// than as deserialization noise.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawSettings {
    core_pool_size: Option<i64>,
    max_pool_size: Option<i64>,
    queue_capacity: Option<i64>,
    keep_alive_seconds: Option<i64>,
    allow_core_thread_timeout: Option<bool>,
    wait_for_tasks_to_complete: Option<bool>,
}

impl RawSettings {
    fn apply_to(&self, settings: &mut ThreadPoolSettings) -> Result<()> {
        if let Some(v) = self.core_pool_size {
            settings.core_pool_size = to_size(CORE_POOL_SIZE_KEY, v)?;
        }
        if let Some(v) = self.max_pool_size {
            settings.max_pool_size = to_size(MAX_POOL_SIZE_KEY, v)?;
        }
        if let Some(v) = self.queue_capacity {
            settings.queue_capacity = to_size(QUEUE_CAPACITY_KEY, v)?;
        }
        if let Some(v) = self.keep_alive_seconds {
            settings.keep_alive = Duration::from_secs(to_size(KEEP_ALIVE_SECONDS_KEY, v)? as u64);
        }
        if let Some(v) = self.allow_core_thread_timeout {
            settings.allow_core_thread_timeout = v;
        }
        if let Some(v) = self.wait_for_tasks_to_complete {
            settings.wait_for_tasks_to_complete = v;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct SettingsBuilder {
    settings: ThreadPoolSettings,
}

impl SettingsBuilder {
    pub fn new() -> Self {
        Self {
            settings: ThreadPoolSettings::default(),
        }
    }

    pub fn core_pool_size(mut self, n: usize) -> Self {
        self.settings.core_pool_size = n;
        self
    }

    pub fn max_pool_size(mut self, n: usize) -> Self {
        self.settings.max_pool_size = n;
        self
    }

    pub fn queue_capacity(mut self, n: usize) -> Self {
        self.settings.queue_capacity = n;
        self
    }

    pub fn keep_alive(mut self, keep_alive: Duration) -> Self {
        self.settings.keep_alive = keep_alive;
        self
    }

    pub fn allow_core_thread_timeout(mut self, allow: bool) -> Self {
        self.settings.allow_core_thread_timeout = allow;
        self
    }

    pub fn wait_for_tasks_to_complete(mut self, wait: bool) -> Self {
        self.settings.wait_for_tasks_to_complete = wait;
        self
    }

    pub fn build(self) -> Result<ThreadPoolSettings> {
        self.settings.validate()?;
        Ok(self.settings)
    }
}

/// Immutable identity of one pool, derived from [`ThreadPoolSettings`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub name: String,
    pub core_pool_size: usize,
    pub max_pool_size: usize,
    pub queue_capacity: usize,
    pub keep_alive: Duration,
    pub allow_core_thread_timeout: bool,
    pub wait_for_tasks_to_complete: bool,
    pub overflow_policy: OverflowPolicy,
}

impl PoolConfig {
    /// Base settings taken verbatim.
    pub fn from_settings<S: Into<String>>(
        name: S,
        settings: &ThreadPoolSettings,
        overflow_policy: OverflowPolicy,
    ) -> Self {
        Self {
            name: name.into(),
            core_pool_size: settings.core_pool_size,
            max_pool_size: settings.max_pool_size,
            queue_capacity: settings.queue_capacity,
            keep_alive: settings.keep_alive,
            allow_core_thread_timeout: settings.allow_core_thread_timeout,
            wait_for_tasks_to_complete: settings.wait_for_tasks_to_complete,
            overflow_policy,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::config("pool name must not be empty"));
        }
        if self.max_pool_size == 0 {
            return Err(Error::config(format!("{}: max pool size must be > 0", self.name)));
        }
        if self.max_pool_size < self.core_pool_size {
            return Err(Error::config(format!(
                "{}: max pool size ({}) must be >= core pool size ({})",
                self.name, self.max_pool_size, self.core_pool_size
            )));
        }
        if self.max_pool_size > MAX_THREADS_PER_POOL {
            return Err(Error::config(format!(
                "{}: max pool size too large (max {})",
                self.name, MAX_THREADS_PER_POOL
            )));
        }
        if self.allow_core_thread_timeout && self.keep_alive.is_zero() {
            return Err(Error::config(format!(
                "{}: core threads may only time out with a non-zero keep-alive",
                self.name
            )));
        }
        Ok(())
    }

    /// Worker thread name for the `index`-th thread started by this pool.
    pub(crate) fn thread_name(&self, index: u64) -> String {
        format!("{}-{}", self.name, index)
    }
}
