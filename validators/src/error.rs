//! Error types for validator set operations.

use {quorum_types::{NodeId, SubnetId}, thiserror::Error};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidatorError {
    /// Sampling was requested but no visible weight is left to sample from.
    #[error("insufficient weight to sample {requested} validators")]
    InsufficientWeight { requested: usize },

    /// Sampling without replacement asked for more validators than are visible.
    #[error("cannot sample {requested} distinct validators out of {available}")]
    InsufficientValidators { requested: usize, available: usize },

    /// Adding the weight would overflow the set's total.
    #[error("weight overflow adding {weight} for {node_id}")]
    WeightOverflow { node_id: NodeId, weight: u64 },

    #[error("duplicate validator {0}")]
    DuplicateValidator(NodeId),

    #[error("validator {0} has zero weight")]
    ZeroWeight(NodeId),

    #[error("unknown subnet {0}")]
    UnknownSubnet(SubnetId),
}

pub type Result<T> = std::result::Result<T, ValidatorError>;
