//! Application-level gossip over the consensus networking layer.
//!
//! Two strategies share one [`Set`] of gossipables:
//!
//! ```text
//!            push                                   pull
//!  Add ──► to_gossip ──► AppGossip ──► peers     PullRequest{filter, salt}
//!              │                                        │
//!              ▼                                        ▼
//!         to_regossip ──(cooldown)──► AppGossip    peer Handler answers with
//!                                                  what the filter lacks
//! ```
//!
//! | Module | Purpose |
//! |---|---|
//! | [`gossipable`] | `Gossipable`, `Marshaller` and `Set` traits |
//! | [`bloom`] | salted bloom filter over gossip ids, with resets |
//! | [`config`] | branching factors and gossiper configs |
//! | [`push`] | `PushGossiper` with fresh and regossip queues |
//! | [`pull`] | `PullGossiper` sending filters to random validators |
//! | [`handler`] | serves pull requests and absorbs pushed gossip |
//! | [`client`] | app request correlation |
//! | [`gossiper`] | the `Gossiper` trait and the periodic runner |

pub mod bloom;
pub mod client;
pub mod config;
pub mod error;
pub mod gossipable;
pub mod gossiper;
pub mod handler;
pub mod message;
pub mod metrics;
pub mod pull;
pub mod push;
#[cfg(any(test, feature = "dev-context-only-utils"))]
pub mod testing;

pub use {
    bloom::{reset_bloom_filter_if_needed, BloomFilter},
    client::{Client, ResponseCallback},
    config::{
        BloomFilterConfig, BranchingFactor, HandlerConfig, PullGossiperConfig,
        PushGossiperConfig,
    },
    error::{ConfigError, GossipError, Result},
    gossipable::{Gossipable, Marshaller, Set},
    gossiper::{every, GossipService, Gossiper, NoOpGossiper, ValidatorGossiper},
    handler::Handler,
    pull::PullGossiper,
    push::PushGossiper,
};
