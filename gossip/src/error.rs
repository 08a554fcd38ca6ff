//! Error types for the gossip engine.

use {quorum_bloom::BloomError, quorum_types::Id, std::time::Duration, thiserror::Error};

/// A gossip config rejected by `validate()`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("branching factor has a negative field")]
    NegativeBranchingFactor,

    #[error("branching factor selects no peers")]
    EmptyBranchingFactor,

    #[error("{0} must be positive")]
    ZeroSize(&'static str),

    #[error("max regossip frequency must be positive, got {0:?}")]
    ZeroRegossipFrequency(Duration),

    #[error("false positive probability must be in (0, 1), got {0}")]
    InvalidFalsePositiveProbability(f64),

    #[error("reset probability {reset} is below the target probability {target}")]
    ResetBelowTarget { target: f64, reset: f64 },
}

#[derive(Error, Debug)]
pub enum GossipError {
    #[error("invalid config: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Bloom(#[from] BloomError),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// An item could not be encoded or decoded by the application marshaller.
    #[error("marshal error: {0}")]
    Marshal(String),

    /// The set refused an item, e.g. because it is invalid.
    #[error("rejected gossipable {id}: {reason}")]
    Rejected { id: Id, reason: String },

    #[error("no peers to send the request to")]
    NoPeers,

    /// The app request went unanswered or failed on the way.
    #[error("app request {0} failed")]
    RequestFailed(u32),

    #[error("failed to spawn thread {name}: {source}")]
    ThreadSpawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, GossipError>;
