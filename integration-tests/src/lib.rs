//! Cross-crate scenarios for quorum networking.
//!
//! [`harness`] wires routers, handlers, senders and gossipers of several
//! nodes together over an in-process transport. The scenario modules drive
//! them end to end:
//!
//! 1. **Routing**: request correlation across nodes, timeouts, unreachable
//!    and benched peers, chain shutdown
//! 2. **Gossip**: push and pull gossip converging over the router

pub mod harness;
