//! Outbound messages for one chain.
//!
//! Requests are registered with the router before they leave, so every one of
//! them resolves exactly once. Recipients the network layer could not reach
//! fail immediately instead of waiting for their timeout.

use {
    crate::{
        message::{InboundMessage, Message, OutboundMessage},
        router::ChainRouter,
    },
    log::{debug, trace},
    quorum_types::{ChainId, Id, NodeId, SubnetId},
    std::{collections::HashSet, sync::Arc},
};

/// The network layer as seen by the sender. Both methods return the peers the
/// message was actually handed to.
pub trait ExternalSender: Send + Sync {
    fn send(
        &self,
        msg: &OutboundMessage,
        node_ids: &HashSet<NodeId>,
        subnet_id: SubnetId,
        validators_only: bool,
    ) -> HashSet<NodeId>;

    fn gossip(
        &self,
        msg: &OutboundMessage,
        subnet_id: SubnetId,
        validators_only: bool,
        num_validators: usize,
        num_non_validators: usize,
        num_peers: usize,
    ) -> HashSet<NodeId>;
}

/// How many peers of each kind an app gossip message goes to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendConfig {
    pub validators: usize,
    pub non_validators: usize,
    pub peers: usize,
}

impl SendConfig {
    pub fn is_empty(&self) -> bool {
        self.validators == 0 && self.non_validators == 0 && self.peers == 0
    }
}

/// The app-level messaging surface used by gossip.
pub trait AppSender: Send + Sync {
    fn send_app_request(&self, node_ids: &HashSet<NodeId>, request_id: u32, bytes: Vec<u8>);

    fn send_app_response(&self, node_id: NodeId, request_id: u32, bytes: Vec<u8>);

    fn send_app_gossip(&self, bytes: Vec<u8>, config: SendConfig);
}

pub struct Sender {
    node_id: NodeId,
    chain_id: ChainId,
    subnet_id: SubnetId,
    validators_only: bool,
    router: Arc<ChainRouter>,
    external: Arc<dyn ExternalSender>,
}

impl Sender {
    pub fn new(
        chain_id: ChainId,
        subnet_id: SubnetId,
        router: Arc<ChainRouter>,
        external: Arc<dyn ExternalSender>,
    ) -> Self {
        Self {
            node_id: router.node_id(),
            chain_id,
            subnet_id,
            validators_only: false,
            router,
            external,
        }
    }

    /// Restrict sends to the subnet's validators.
    pub fn validators_only(mut self, validators_only: bool) -> Self {
        self.validators_only = validators_only;
        self
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    // ── Requests ────────────────────────────────────────────────────────────

    pub fn send_get_accepted_frontier(&self, node_ids: &HashSet<NodeId>, request_id: u32) {
        self.send_request(node_ids, request_id, Message::GetAcceptedFrontier);
    }

    pub fn send_get_accepted(
        &self,
        node_ids: &HashSet<NodeId>,
        request_id: u32,
        container_ids: Vec<Id>,
    ) {
        self.send_request(node_ids, request_id, Message::GetAccepted { container_ids });
    }

    pub fn send_get_ancestors(&self, node_id: NodeId, request_id: u32, container_id: Id) {
        self.send_request(
            &HashSet::from([node_id]),
            request_id,
            Message::GetAncestors { container_id },
        );
    }

    pub fn send_get(&self, node_id: NodeId, request_id: u32, container_id: Id) {
        self.send_request(
            &HashSet::from([node_id]),
            request_id,
            Message::Get { container_id },
        );
    }

    pub fn send_push_query(&self, node_ids: &HashSet<NodeId>, request_id: u32, container: Vec<u8>) {
        self.send_request(node_ids, request_id, Message::PushQuery { container });
    }

    pub fn send_pull_query(&self, node_ids: &HashSet<NodeId>, request_id: u32, container_id: Id) {
        self.send_request(node_ids, request_id, Message::PullQuery { container_id });
    }

    // ── Responses ───────────────────────────────────────────────────────────

    pub fn send_accepted_frontier(&self, node_id: NodeId, request_id: u32, container_ids: Vec<Id>) {
        self.send_response(node_id, request_id, Message::AcceptedFrontier { container_ids });
    }

    pub fn send_accepted(&self, node_id: NodeId, request_id: u32, container_ids: Vec<Id>) {
        self.send_response(node_id, request_id, Message::Accepted { container_ids });
    }

    pub fn send_ancestors(&self, node_id: NodeId, request_id: u32, containers: Vec<Vec<u8>>) {
        self.send_response(node_id, request_id, Message::Ancestors { containers });
    }

    pub fn send_put(&self, node_id: NodeId, request_id: u32, container: Vec<u8>) {
        self.send_response(node_id, request_id, Message::Put { container });
    }

    pub fn send_chits(&self, node_id: NodeId, request_id: u32, container_ids: Vec<Id>) {
        self.send_response(node_id, request_id, Message::Chits { container_ids });
    }

    fn send_request(&self, node_ids: &HashSet<NodeId>, request_id: u32, message: Message) {
        let op = message.op();
        let mut to_self = false;
        let mut recipients = HashSet::with_capacity(node_ids.len());
        for node_id in node_ids {
            match self
                .router
                .register_request(*node_id, self.chain_id, request_id, op)
            {
                Ok(true) if *node_id == self.node_id => to_self = true,
                Ok(true) => {
                    recipients.insert(*node_id);
                }
                // Benched: the failure is already on its way.
                Ok(false) => {}
                Err(err) => {
                    debug!("not sending {} {} to {}: {}", op, request_id, node_id, err);
                    self.router
                        .reject_request(*node_id, self.chain_id, request_id, op);
                }
            }
        }

        if to_self {
            self.router.handle_inbound(InboundMessage::new(
                self.node_id,
                self.chain_id,
                request_id,
                message.clone(),
            ));
        }
        if recipients.is_empty() {
            return;
        }
        let outbound = OutboundMessage::new(self.chain_id, request_id, message);
        let sent = self.external.send(
            &outbound,
            &recipients,
            self.subnet_id,
            self.validators_only,
        );
        for node_id in recipients.difference(&sent) {
            debug!(
                "failed to send {} {} to {} on chain {}",
                op, request_id, node_id, self.chain_id
            );
            self.router.fail_request(*node_id, self.chain_id, request_id);
        }
    }

    fn send_response(&self, node_id: NodeId, request_id: u32, message: Message) {
        if node_id == self.node_id {
            self.router.handle_inbound(InboundMessage::new(
                self.node_id,
                self.chain_id,
                request_id,
                message,
            ));
            return;
        }
        let op = message.op();
        let outbound = OutboundMessage::new(self.chain_id, request_id, message);
        let sent = self.external.send(
            &outbound,
            &HashSet::from([node_id]),
            self.subnet_id,
            self.validators_only,
        );
        if !sent.contains(&node_id) {
            debug!(
                "failed to send {} {} to {} on chain {}",
                op, request_id, node_id, self.chain_id
            );
        }
    }
}

impl AppSender for Sender {
    fn send_app_request(&self, node_ids: &HashSet<NodeId>, request_id: u32, bytes: Vec<u8>) {
        self.send_request(node_ids, request_id, Message::AppRequest { bytes });
    }

    fn send_app_response(&self, node_id: NodeId, request_id: u32, bytes: Vec<u8>) {
        self.send_response(node_id, request_id, Message::AppResponse { bytes });
    }

    fn send_app_gossip(&self, bytes: Vec<u8>, config: SendConfig) {
        if config.is_empty() {
            trace!("app gossip on chain {} has no targets", self.chain_id);
            return;
        }
        let outbound = OutboundMessage::new(self.chain_id, 0, Message::AppGossip { bytes });
        let sent = self.external.gossip(
            &outbound,
            self.subnet_id,
            self.validators_only,
            config.validators,
            config.non_validators,
            config.peers,
        );
        if sent.is_empty() {
            debug!("app gossip on chain {} reached no peers", self.chain_id);
        }
    }
}
