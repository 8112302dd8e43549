//! Task execution infrastructure.
//!
//! This module provides the bounded [`ThreadPool`], the delayed/periodic
//! [`ScheduledPool`], task handles and the overflow policies.

pub mod overflow;
pub mod panic;
pub mod scheduled;
pub mod task;
pub mod thread_pool;
mod worker;

pub use overflow::OverflowPolicy;
pub use panic::PanicInfo;
pub use scheduled::{PeriodicHandle, ScheduledPool};
pub use task::{TaskHandle, TaskId};
pub use thread_pool::ThreadPool;
