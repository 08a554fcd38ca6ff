//! Quorum consensus networking layer.
//!
//! Sits between the network and the per-chain consensus engines:
//!
//! - **Admission control**: a [`WeightedThrottler`] bounds the unprocessed
//!   bytes each peer may have in flight, splitting a validator pool by stake
//!   and sharing an at-large pool.
//! - **Routing**: the [`ChainRouter`] demultiplexes inbound messages by
//!   chain and matches responses to the requests it registered, failing
//!   unanswered requests on an adaptive timeout.
//! - **Single-flight dispatch**: each chain's [`Handler`] drains one queue
//!   into its bootstrapper or engine, never concurrently.
//! - **Benching**: validators that keep failing are skipped for a while,
//!   bounded by a portion of total stake.
//!
//! ## Architecture
//!
//! ```text
//!   network ──▶ WeightedThrottler ──▶ ChainRouter ──▶ Handler (per chain) ──▶ Engine
//!                                        │   ▲
//!                     BenchlistManager ◀─┤   └── TimeoutManager
//!                                        ▼
//!   network ◀── ExternalSender ◀────── Sender (per chain)
//! ```
//!
//! ## Crate modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`]    | Throttler, benchlist, timeout and router configs |
//! | [`message`]   | Ops, message bodies and envelopes |
//! | [`throttler`] | Stake-weighted inbound admission control |
//! | [`benchlist`] | Per-chain failure tracking and benching |
//! | [`timeout`]   | Adaptive request timeouts |
//! | [`engine`]    | The engine interface chains plug in |
//! | [`handler`]   | Per-chain state machine and dispatch loop |
//! | [`router`]    | Chain routing and request correlation |
//! | [`sender`]    | Outbound requests, responses and app gossip |
//! | [`error`]     | Crate-wide error enums |

pub mod benchlist;
pub mod config;
pub mod engine;
pub mod error;
pub mod handler;
pub mod message;
pub mod metrics;
pub mod router;
pub mod sender;
pub mod throttler;
pub mod timeout;

pub use {
    benchlist::{Benchable, Benchlist, BenchlistManager, ChainBenchlist, NoBenchlist},
    config::{BenchlistConfig, RouterConfig, ThrottlerConfig, TimeoutConfig},
    engine::{Bootstrapper, Engine, EngineResult},
    error::{ConfigError, ConsensusNetError, EngineError, Result},
    handler::{Handler, HandlerEvent, HandlerState},
    message::{InboundMessage, Message, Op, OutboundMessage},
    router::ChainRouter,
    sender::{AppSender, ExternalSender, SendConfig, Sender},
    throttler::{MessageThrottler, NoThrottler, ThrottlePermit, WeightedThrottler},
    timeout::TimeoutManager,
};
