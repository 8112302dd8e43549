pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("pool `{pool}` saturated: no idle thread, max size reached and queue full")]
    Saturated { pool: String },

    #[error("pool `{pool}` is shut down")]
    Shutdown { pool: String },

    #[error("task panicked: {message}")]
    TaskPanicked { message: String },

    #[error("task was cancelled before it started")]
    Cancelled,

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("invalid settings document: {0}")]
    Parse(#[from] toml::de::Error),
}

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    pub fn saturated<S: Into<String>>(pool: S) -> Self {
        Error::Saturated { pool: pool.into() }
    }

    pub fn shutdown<S: Into<String>>(pool: S) -> Self {
        Error::Shutdown { pool: pool.into() }
    }

    pub fn task_panicked<S: Into<String>>(message: S) -> Self {
        Error::TaskPanicked {
            message: message.into(),
        }
    }

    /// Whether the error came from the task body rather than from the pool.
    pub fn is_task_failure(&self) -> bool {
        matches!(self, Error::TaskPanicked { .. })
    }

    pub fn is_saturated(&self) -> bool {
        matches!(self, Error::Saturated { .. })
    }
}
