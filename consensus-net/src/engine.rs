//! The interface the handler drives.
//!
//! Consensus and bootstrapping logic live outside this crate. A chain plugs
//! in two engines: a [`Bootstrapper`] that runs first and the consensus
//! [`Engine`] that takes over once bootstrapping reports completion. Every
//! handler defaults to accepting and ignoring the message.

use {
    crate::{
        error::EngineError,
        message::{InboundMessage, Message},
    },
    quorum_types::{Id, NodeId},
    std::time::Instant,
};

pub type EngineResult = std::result::Result<(), EngineError>;

/// Per-message handlers of a chain engine.
///
/// The handler never calls these concurrently for one chain. Only
/// [`Engine::halt`] may arrive from another thread while a call is running.
#[allow(unused_variables)]
pub trait Engine: Send + Sync {
    fn start(&self, request_id: u32) -> EngineResult {
        Ok(())
    }

    fn get_accepted_frontier(&self, node_id: NodeId, request_id: u32) -> EngineResult {
        Ok(())
    }

    fn accepted_frontier(
        &self,
        node_id: NodeId,
        request_id: u32,
        container_ids: Vec<Id>,
    ) -> EngineResult {
        Ok(())
    }

    fn get_accepted_frontier_failed(&self, node_id: NodeId, request_id: u32) -> EngineResult {
        Ok(())
    }

    fn get_accepted(&self, node_id: NodeId, request_id: u32, container_ids: Vec<Id>) -> EngineResult {
        Ok(())
    }

    fn accepted(&self, node_id: NodeId, request_id: u32, container_ids: Vec<Id>) -> EngineResult {
        Ok(())
    }

    fn get_accepted_failed(&self, node_id: NodeId, request_id: u32) -> EngineResult {
        Ok(())
    }

    fn get_ancestors(&self, node_id: NodeId, request_id: u32, container_id: Id) -> EngineResult {
        Ok(())
    }

    fn ancestors(&self, node_id: NodeId, request_id: u32, containers: Vec<Vec<u8>>) -> EngineResult {
        Ok(())
    }

    fn get_ancestors_failed(&self, node_id: NodeId, request_id: u32) -> EngineResult {
        Ok(())
    }

    fn get(&self, node_id: NodeId, request_id: u32, container_id: Id) -> EngineResult {
        Ok(())
    }

    fn put(&self, node_id: NodeId, request_id: u32, container: Vec<u8>) -> EngineResult {
        Ok(())
    }

    fn get_failed(&self, node_id: NodeId, request_id: u32) -> EngineResult {
        Ok(())
    }

    fn push_query(&self, node_id: NodeId, request_id: u32, container: Vec<u8>) -> EngineResult {
        Ok(())
    }

    fn pull_query(&self, node_id: NodeId, request_id: u32, container_id: Id) -> EngineResult {
        Ok(())
    }

    fn chits(&self, node_id: NodeId, request_id: u32, container_ids: Vec<Id>) -> EngineResult {
        Ok(())
    }

    fn query_failed(&self, node_id: NodeId, request_id: u32) -> EngineResult {
        Ok(())
    }

    fn app_request(
        &self,
        node_id: NodeId,
        request_id: u32,
        deadline: Option<Instant>,
        bytes: Vec<u8>,
    ) -> EngineResult {
        Ok(())
    }

    fn app_response(&self, node_id: NodeId, request_id: u32, bytes: Vec<u8>) -> EngineResult {
        Ok(())
    }

    fn app_request_failed(&self, node_id: NodeId, request_id: u32) -> EngineResult {
        Ok(())
    }

    fn app_gossip(&self, node_id: NodeId, bytes: Vec<u8>) -> EngineResult {
        Ok(())
    }

    fn connected(&self, node_id: NodeId) -> EngineResult {
        Ok(())
    }

    fn disconnected(&self, node_id: NodeId) -> EngineResult {
        Ok(())
    }

    /// Asked to stop promptly; may be called while another call is running.
    fn halt(&self) {}

    /// Called once, after the last message, when the chain closes.
    fn shutdown(&self) -> EngineResult {
        Ok(())
    }
}

/// The engine a chain runs until it has caught up.
pub trait Bootstrapper: Engine {
    /// Checked after each message; `true` hands the chain to consensus.
    fn is_bootstrapped(&self) -> bool;
}

/// Call the handler of `engine` that matches `msg`.
pub fn dispatch<E: Engine + ?Sized>(engine: &E, msg: InboundMessage) -> EngineResult {
    // Any throttle permit is released once the engine returns.
    let InboundMessage {
        node_id,
        request_id,
        message,
        expiration: deadline,
        ..
    } = msg;
    match message {
        Message::GetAcceptedFrontier => engine.get_accepted_frontier(node_id, request_id),
        Message::AcceptedFrontier { container_ids } => {
            engine.accepted_frontier(node_id, request_id, container_ids)
        }
        Message::GetAcceptedFrontierFailed => {
            engine.get_accepted_frontier_failed(node_id, request_id)
        }
        Message::GetAccepted { container_ids } => {
            engine.get_accepted(node_id, request_id, container_ids)
        }
        Message::Accepted { container_ids } => engine.accepted(node_id, request_id, container_ids),
        Message::GetAcceptedFailed => engine.get_accepted_failed(node_id, request_id),
        Message::GetAncestors { container_id } => {
            engine.get_ancestors(node_id, request_id, container_id)
        }
        Message::Ancestors { containers } => engine.ancestors(node_id, request_id, containers),
        Message::GetAncestorsFailed => engine.get_ancestors_failed(node_id, request_id),
        Message::Get { container_id } => engine.get(node_id, request_id, container_id),
        Message::Put { container } => engine.put(node_id, request_id, container),
        Message::GetFailed => engine.get_failed(node_id, request_id),
        Message::PushQuery { container } => engine.push_query(node_id, request_id, container),
        Message::PullQuery { container_id } => engine.pull_query(node_id, request_id, container_id),
        Message::Chits { container_ids } => engine.chits(node_id, request_id, container_ids),
        Message::QueryFailed => engine.query_failed(node_id, request_id),
        Message::AppRequest { bytes } => engine.app_request(node_id, request_id, deadline, bytes),
        Message::AppResponse { bytes } => engine.app_response(node_id, request_id, bytes),
        Message::AppRequestFailed => engine.app_request_failed(node_id, request_id),
        Message::AppGossip { bytes } => engine.app_gossip(node_id, bytes),
        Message::Connected => engine.connected(node_id),
        Message::Disconnected => engine.disconnected(node_id),
    }
}
