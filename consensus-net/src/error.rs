//! Error types for the consensus networking layer.

use {
    crate::message::Op,
    quorum_types::{ChainId, NodeId},
    quorum_validators::ValidatorError,
    std::time::Duration,
    thiserror::Error,
};

/// A config rejected by `validate()`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("throttler has no bytes to allocate")]
    EmptyThrottler,

    #[error("benchlist max portion must be below 1, got {0}")]
    InvalidMaxPortion(f64),

    #[error("benchlist threshold must be positive")]
    ZeroBenchThreshold,

    #[error("minimum timeout {minimum:?} exceeds maximum timeout {maximum:?}")]
    TimeoutBounds { minimum: Duration, maximum: Duration },

    #[error("initial timeout {0:?} is outside the timeout bounds")]
    InitialTimeoutOutOfBounds(Duration),

    #[error("timeout coefficient must be at least 1, got {0}")]
    InvalidTimeoutCoefficient(f64),

    #[error("latency alpha must be in (0, 1], got {0}")]
    InvalidLatencyAlpha(f64),

    #[error("shutdown timeout must be positive")]
    ZeroShutdownTimeout,
}

/// Errors that can occur in the consensus networking layer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConsensusNetError {
    #[error("invalid config: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Validator(#[from] ValidatorError),

    /// The chain was never added to the router, or has been removed.
    #[error("unknown chain: {0}")]
    UnknownChain(ChainId),

    /// The chain is shutting down and accepts no more messages.
    #[error("chain {0} is closed")]
    ChainClosed(ChainId),

    /// A request id is already outstanding for this peer and chain.
    #[error("request {request_id} to {node_id} is already outstanding")]
    DuplicateRequest { node_id: NodeId, request_id: u32 },

    /// Only request ops are correlated with responses.
    #[error("{0} is not a request")]
    NotARequest(Op),

    #[error("failed to spawn thread {name}: {reason}")]
    ThreadSpawn { name: String, reason: String },
}

impl ConsensusNetError {
    pub(crate) fn thread_spawn(name: &str, err: std::io::Error) -> Self {
        Self::ThreadSpawn {
            name: name.to_string(),
            reason: err.to_string(),
        }
    }
}

/// Convenience result type for consensus networking operations.
pub type Result<T> = std::result::Result<T, ConsensusNetError>;

/// Failure reported by an engine handler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The engine can no longer make progress; its chain shuts down.
    #[error("fatal engine error: {0}")]
    Fatal(String),

    /// The single message could not be handled and is dropped.
    #[error("engine rejected message: {0}")]
    Rejected(String),
}

impl EngineError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}
