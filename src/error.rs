//! Error types for the clustering engine

use thiserror::Error;

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by merging, querying and persisting cluster states
#[derive(Debug, Error)]
pub enum Error {
    /// The merge run was cancelled through its interaction handle.
    #[error("clustering was cancelled")]
    Cancelled,

    /// A serialized cluster state could not be reconstructed.
    #[error("corrupt clustering state: {0}")]
    CorruptState(String),

    /// The group forest contains a cycle or a dangling merged group.
    #[error("corrupt cluster forest at position {position}: {reason}")]
    CorruptForest { position: usize, reason: &'static str },

    /// A step outside `[0, steps]` was requested.
    #[error("step {requested} is outside the range 0..={steps}")]
    StepOutOfRange { requested: u32, steps: u32 },

    /// Another recluster is already running for the same graph.
    #[error("a recluster is already running for graph '{0}'")]
    ReclusterInProgress(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Cancellation is an expected outcome rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    pub(crate) fn corrupt(message: impl Into<String>) -> Self {
        Error::CorruptState(message.into())
    }
}
