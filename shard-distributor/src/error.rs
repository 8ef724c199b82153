use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("unsupported node state type {0}")]
    UnsupportedNodeStateType(String),

    #[error("unknown assignment strategy {0}, must be modulo or jump_hash")]
    UnknownStrategy(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failure reported by a node state source. The watcher treats it as
    /// transient and retries on the next tick.
    #[error("failed to query active nodes: {0}")]
    NodeQuery(String),

    #[error("the node monitor needs a tokio runtime, none is running on this thread")]
    NoRuntime,

    #[error("a panic has occurred in node monitor: {message}")]
    WatcherPanicked {
        message: String,
        /// `file:line:column` of the panic, when it was recorded.
        location: Option<String>,
        backtrace: String,
    },
}

impl Error {
    pub fn node_query(msg: impl Into<String>) -> Self {
        Self::NodeQuery(msg.into())
    }

    /// Stack trace of the panicking thread, if any.
    pub fn stack_trace(&self) -> Option<&str> {
        match self {
            Self::WatcherPanicked { backtrace, .. } => Some(backtrace),
            _ => None,
        }
    }

    pub fn panic_location(&self) -> Option<&str> {
        match self {
            Self::WatcherPanicked { location, .. } => location.as_deref(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
