pub use crate::config::ThreadPoolSettings;
pub use crate::dispatcher::{PoolKind, TaskDispatcher};
pub use crate::error::{Error, Result};
pub use crate::executor::{OverflowPolicy, PeriodicHandle, TaskHandle};
pub use crate::messages::{MessageCatalog, MessageSource};
pub use crate::runtime::Runtime;
pub use crate::telemetry::PoolStats;
