//! Bloom filters used to summarise "what I already have" to peers.
//!
//! [`Filter`] is the mutable local filter, [`ReadFilter`] the parsed form of a
//! filter received over the wire. Elements are hashed with [`hash`] under a
//! salt before they are added; [`optimal`] sizes filters for a target false
//! positive probability.

pub mod error;
pub mod filter;
pub mod hasher;
pub mod optimal;

pub use {
    error::{BloomError, Result},
    filter::{Filter, ReadFilter},
    hasher::hash,
    optimal::{estimate_count, optimal_parameters},
};
