//! Consensus message types.
//!
//! Payloads stay opaque: the router only looks at the [`Op`], the request id
//! and, for responses carrying them, the container ids. Byte encoding is the
//! network layer's business.

use {
    crate::throttler::ThrottlePermit,
    quorum_types::{ChainId, Id, NodeId},
    std::{collections::HashSet, fmt, time::Instant},
};

// ── Operations ──────────────────────────────────────────────────────────────

/// Every message kind the router understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Op {
    GetAcceptedFrontier,
    AcceptedFrontier,
    GetAcceptedFrontierFailed,
    GetAccepted,
    Accepted,
    GetAcceptedFailed,
    GetAncestors,
    Ancestors,
    GetAncestorsFailed,
    Get,
    Put,
    GetFailed,
    PushQuery,
    PullQuery,
    Chits,
    QueryFailed,
    AppRequest,
    AppResponse,
    AppRequestFailed,
    AppGossip,
    Connected,
    Disconnected,
}

impl Op {
    /// Ops that expect exactly one response from the recipient.
    pub fn is_request(self) -> bool {
        matches!(
            self,
            Op::GetAcceptedFrontier
                | Op::GetAccepted
                | Op::GetAncestors
                | Op::Get
                | Op::PushQuery
                | Op::PullQuery
                | Op::AppRequest
        )
    }

    pub fn is_response(self) -> bool {
        matches!(
            self,
            Op::AcceptedFrontier
                | Op::Accepted
                | Op::Ancestors
                | Op::Put
                | Op::Chits
                | Op::AppResponse
        )
    }

    pub fn is_failure(self) -> bool {
        matches!(
            self,
            Op::GetAcceptedFrontierFailed
                | Op::GetAcceptedFailed
                | Op::GetAncestorsFailed
                | Op::GetFailed
                | Op::QueryFailed
                | Op::AppRequestFailed
        )
    }

    /// Peer lifecycle notifications. They are never dropped as expired.
    pub fn is_internal(self) -> bool {
        matches!(self, Op::Connected | Op::Disconnected)
    }

    /// The failure delivered when a request of this op goes unanswered.
    pub fn failure_op(self) -> Option<Op> {
        match self {
            Op::GetAcceptedFrontier => Some(Op::GetAcceptedFrontierFailed),
            Op::GetAccepted => Some(Op::GetAcceptedFailed),
            Op::GetAncestors => Some(Op::GetAncestorsFailed),
            Op::Get => Some(Op::GetFailed),
            Op::PushQuery | Op::PullQuery => Some(Op::QueryFailed),
            Op::AppRequest => Some(Op::AppRequestFailed),
            _ => None,
        }
    }

    /// Whether `response` answers a request of this op.
    pub fn is_answered_by(self, response: Op) -> bool {
        matches!(
            (self, response),
            (Op::GetAcceptedFrontier, Op::AcceptedFrontier)
                | (Op::GetAccepted, Op::Accepted)
                | (Op::GetAncestors, Op::Ancestors)
                | (Op::Get, Op::Put)
                | (Op::PushQuery | Op::PullQuery, Op::Chits)
                | (Op::AppRequest, Op::AppResponse)
        )
    }

    /// Whether `failure` resolves a request of this op.
    pub fn is_failed_by(self, failure: Op) -> bool {
        self.failure_op() == Some(failure)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Op::GetAcceptedFrontier => "get_accepted_frontier",
            Op::AcceptedFrontier => "accepted_frontier",
            Op::GetAcceptedFrontierFailed => "get_accepted_frontier_failed",
            Op::GetAccepted => "get_accepted",
            Op::Accepted => "accepted",
            Op::GetAcceptedFailed => "get_accepted_failed",
            Op::GetAncestors => "get_ancestors",
            Op::Ancestors => "ancestors",
            Op::GetAncestorsFailed => "get_ancestors_failed",
            Op::Get => "get",
            Op::Put => "put",
            Op::GetFailed => "get_failed",
            Op::PushQuery => "push_query",
            Op::PullQuery => "pull_query",
            Op::Chits => "chits",
            Op::QueryFailed => "query_failed",
            Op::AppRequest => "app_request",
            Op::AppResponse => "app_response",
            Op::AppRequestFailed => "app_request_failed",
            Op::AppGossip => "app_gossip",
            Op::Connected => "connected",
            Op::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Message bodies ──────────────────────────────────────────────────────────

/// A message body. Containers and app bytes are opaque.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    GetAcceptedFrontier,
    AcceptedFrontier { container_ids: Vec<Id> },
    GetAcceptedFrontierFailed,
    GetAccepted { container_ids: Vec<Id> },
    Accepted { container_ids: Vec<Id> },
    GetAcceptedFailed,
    GetAncestors { container_id: Id },
    Ancestors { containers: Vec<Vec<u8>> },
    GetAncestorsFailed,
    Get { container_id: Id },
    Put { container: Vec<u8> },
    GetFailed,
    PushQuery { container: Vec<u8> },
    PullQuery { container_id: Id },
    Chits { container_ids: Vec<Id> },
    QueryFailed,
    AppRequest { bytes: Vec<u8> },
    AppResponse { bytes: Vec<u8> },
    AppRequestFailed,
    AppGossip { bytes: Vec<u8> },
    Connected,
    Disconnected,
}

impl Message {
    pub fn op(&self) -> Op {
        match self {
            Message::GetAcceptedFrontier => Op::GetAcceptedFrontier,
            Message::AcceptedFrontier { .. } => Op::AcceptedFrontier,
            Message::GetAcceptedFrontierFailed => Op::GetAcceptedFrontierFailed,
            Message::GetAccepted { .. } => Op::GetAccepted,
            Message::Accepted { .. } => Op::Accepted,
            Message::GetAcceptedFailed => Op::GetAcceptedFailed,
            Message::GetAncestors { .. } => Op::GetAncestors,
            Message::Ancestors { .. } => Op::Ancestors,
            Message::GetAncestorsFailed => Op::GetAncestorsFailed,
            Message::Get { .. } => Op::Get,
            Message::Put { .. } => Op::Put,
            Message::GetFailed => Op::GetFailed,
            Message::PushQuery { .. } => Op::PushQuery,
            Message::PullQuery { .. } => Op::PullQuery,
            Message::Chits { .. } => Op::Chits,
            Message::QueryFailed => Op::QueryFailed,
            Message::AppRequest { .. } => Op::AppRequest,
            Message::AppResponse { .. } => Op::AppResponse,
            Message::AppRequestFailed => Op::AppRequestFailed,
            Message::AppGossip { .. } => Op::AppGossip,
            Message::Connected => Op::Connected,
            Message::Disconnected => Op::Disconnected,
        }
    }

    /// The body of a failure op. `None` for ops that carry data.
    pub fn failure(op: Op) -> Option<Message> {
        match op {
            Op::GetAcceptedFrontierFailed => Some(Message::GetAcceptedFrontierFailed),
            Op::GetAcceptedFailed => Some(Message::GetAcceptedFailed),
            Op::GetAncestorsFailed => Some(Message::GetAncestorsFailed),
            Op::GetFailed => Some(Message::GetFailed),
            Op::QueryFailed => Some(Message::QueryFailed),
            Op::AppRequestFailed => Some(Message::AppRequestFailed),
            _ => None,
        }
    }

    pub fn container_ids(&self) -> Option<&[Id]> {
        match self {
            Message::AcceptedFrontier { container_ids }
            | Message::GetAccepted { container_ids }
            | Message::Accepted { container_ids }
            | Message::Chits { container_ids } => Some(container_ids),
            _ => None,
        }
    }

    /// Whether the message lists the same container id more than once.
    pub fn has_duplicate_container_ids(&self) -> bool {
        self.container_ids().is_some_and(|ids| {
            let mut seen = HashSet::with_capacity(ids.len());
            !ids.iter().all(|id| seen.insert(id))
        })
    }

    /// Approximate payload size in bytes, used for accounting.
    pub fn byte_len(&self) -> usize {
        match self {
            Message::AcceptedFrontier { container_ids }
            | Message::GetAccepted { container_ids }
            | Message::Accepted { container_ids }
            | Message::Chits { container_ids } => container_ids.len() * Id::LEN,
            Message::GetAncestors { .. } | Message::Get { .. } | Message::PullQuery { .. } => {
                Id::LEN
            }
            Message::Ancestors { containers } => containers.iter().map(Vec::len).sum(),
            Message::Put { container } | Message::PushQuery { container } => container.len(),
            Message::AppRequest { bytes }
            | Message::AppResponse { bytes }
            | Message::AppGossip { bytes } => bytes.len(),
            _ => 0,
        }
    }
}

// ── Envelopes ───────────────────────────────────────────────────────────────

/// A message received from, or synthesized on behalf of, a peer.
pub struct InboundMessage {
    pub node_id: NodeId,
    pub chain_id: ChainId,
    pub request_id: u32,
    pub message: Message,
    /// Dropped unprocessed once this passes. `None` never expires.
    pub expiration: Option<Instant>,
    /// Returns the message's bytes to the throttler when the message is dropped.
    permit: Option<ThrottlePermit>,
}

impl InboundMessage {
    pub fn new(node_id: NodeId, chain_id: ChainId, request_id: u32, message: Message) -> Self {
        Self {
            node_id,
            chain_id,
            request_id,
            message,
            expiration: None,
            permit: None,
        }
    }

    pub fn with_expiration(mut self, expiration: Instant) -> Self {
        self.expiration = Some(expiration);
        self
    }

    /// Hold `permit` until the message is done with.
    pub fn with_permit(mut self, permit: ThrottlePermit) -> Self {
        self.permit = Some(permit);
        self
    }

    pub fn op(&self) -> Op {
        self.message.op()
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        !self.op().is_internal() && self.expiration.is_some_and(|deadline| now >= deadline)
    }
}

impl fmt::Debug for InboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundMessage")
            .field("op", &self.op())
            .field("node_id", &self.node_id)
            .field("chain_id", &self.chain_id)
            .field("request_id", &self.request_id)
            .field("expiration", &self.expiration)
            .field("throttled", &self.permit.is_some())
            .finish()
    }
}

/// A message to hand to the network layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub chain_id: ChainId,
    pub request_id: u32,
    pub message: Message,
}

impl OutboundMessage {
    pub fn new(chain_id: ChainId, request_id: u32, message: Message) -> Self {
        Self {
            chain_id,
            request_id,
            message,
        }
    }

    pub fn op(&self) -> Op {
        self.message.op()
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
