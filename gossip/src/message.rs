//! Gossip protocol envelopes, carried as app message bytes.

use {
    crate::error::Result,
    serde::{Deserialize, Serialize},
};

/// Sent by the pull gossiper: "send me what this filter does not contain".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub filter: Vec<u8>,
    pub salt: Vec<u8>,
}

/// Marshalled gossipables, answering a [`PullRequest`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullResponse {
    pub gossip: Vec<Vec<u8>>,
}

/// Marshalled gossipables pushed as app gossip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushGossip {
    pub gossip: Vec<Vec<u8>>,
}

pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    Ok(bincode::serialize(message)?)
}

pub fn decode<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T> {
    Ok(bincode::deserialize(bytes)?)
}
