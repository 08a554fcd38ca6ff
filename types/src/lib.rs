//! Shared primitives for the quorum networking crates.
//!
//! - [`ids`]: fixed-size [`Id`] and [`NodeId`] identifiers
//! - [`clock`]: a [`Clock`] handle that tests can freeze and advance

pub mod clock;
pub mod error;
pub mod ids;

pub use {
    clock::Clock,
    error::{Result, TypesError},
    ids::{ChainId, Id, NodeId, SubnetId, PRIMARY_NETWORK_ID},
};
