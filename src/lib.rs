//! taskpools - differentiated thread pools for service workloads
//!
//! Work is routed to one of three pools, each built from the same
//! declarative settings but tuned for a workload class:
//!
//! - **general** (`default-task`): base sizes, saturated submissions run on
//!   the caller's thread;
//! - **I/O** (`io-task`): doubled sizes, saturation is logged and then run on
//!   the caller's thread;
//! - **CPU** (`cpu-task`): one core thread per logical CPU, saturated
//!   submissions fail fast with [`Error::Saturated`].
//!
//! A fixed-size scheduled pool handles delayed and periodic jobs.
//!
//! # Quick Start
//!
//! ```no_run
//! use taskpools::prelude::*;
//!
//! let runtime = Runtime::new(ThreadPoolSettings::default())?;
//! let dispatcher = runtime.dispatcher();
//!
//! let sum = dispatcher.submit_cpu(|| (0..1_000u64).sum::<u64>())?;
//! let body = dispatcher.submit_io(|| std::fs::read_to_string("/etc/hostname"))?;
//!
//! assert_eq!(sum.join()?, 499_500);
//! let _ = body.join()?;
//!
//! runtime.shutdown();
//! # Ok::<(), taskpools::Error>(())
//! ```
//!
//! Settings can also come from a TOML document or the environment, see
//! [`config`].

#![warn(missing_debug_implementations)]

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod messages;
pub mod prelude;
pub mod provisioner;
pub mod runtime;
pub mod telemetry;

pub use config::{PoolConfig, SettingsBuilder, ThreadPoolSettings};
pub use dispatcher::{PoolKind, TaskDispatcher};
pub use error::{Error, Result};
pub use executor::{OverflowPolicy, PeriodicHandle, ScheduledPool, TaskHandle, TaskId, ThreadPool};
pub use messages::{MessageCatalog, MessageSource};
pub use provisioner::{PoolProvisioner, PoolSet};
pub use runtime::Runtime;
pub use telemetry::PoolStats;
