//! App request client.
//!
//! Matches app responses and failures to the callbacks of the requests that
//! caused them. Each request id is handed out once, so a callback runs at
//! most once.

use {
    crate::error::{GossipError, Result},
    log::{debug, trace},
    parking_lot::Mutex,
    quorum_consensus_net::AppSender,
    quorum_types::NodeId,
    quorum_validators::ValidatorSet,
    std::{
        collections::{HashMap, HashSet},
        sync::Arc,
    },
};

/// Receives the responder and either its response bytes or the failure.
pub type ResponseCallback = Box<dyn FnOnce(NodeId, Result<Vec<u8>>) + Send>;

pub struct Client {
    node_id: NodeId,
    sender: Arc<dyn AppSender>,
    validators: Arc<ValidatorSet>,
    next_request_id: Mutex<u32>,
    pending: Mutex<HashMap<u32, (NodeId, ResponseCallback)>>,
}

impl Client {
    pub fn new(node_id: NodeId, sender: Arc<dyn AppSender>, validators: Arc<ValidatorSet>) -> Self {
        Self {
            node_id,
            sender,
            validators,
            next_request_id: Mutex::new(0),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Send `bytes` to a validator other than ourselves, sampled by weight.
    /// Masked validators are never picked.
    pub fn app_request_any(&self, bytes: Vec<u8>, on_response: ResponseCallback) -> Result<()> {
        let Some(peer) = self
            .validators
            .sample_unique_excluding(1, &self.node_id)
            .ok()
            .and_then(|sampled| sampled.first().copied())
        else {
            return Err(GossipError::NoPeers);
        };
        self.app_request(peer.node_id, bytes, on_response);
        Ok(())
    }

    pub fn app_request(&self, node_id: NodeId, bytes: Vec<u8>, on_response: ResponseCallback) {
        let request_id = {
            let mut next = self.next_request_id.lock();
            let id = *next;
            *next = next.wrapping_add(1);
            id
        };
        self.pending
            .lock()
            .insert(request_id, (node_id, on_response));
        trace!("app request {} to {}", request_id, node_id);
        self.sender
            .send_app_request(&HashSet::from([node_id]), request_id, bytes);
    }

    pub fn app_response(&self, node_id: NodeId, request_id: u32, bytes: Vec<u8>) {
        if let Some(on_response) = self.take(node_id, request_id) {
            on_response(node_id, Ok(bytes));
        }
    }

    pub fn app_request_failed(&self, node_id: NodeId, request_id: u32) {
        if let Some(on_response) = self.take(node_id, request_id) {
            on_response(node_id, Err(GossipError::RequestFailed(request_id)));
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    fn take(&self, node_id: NodeId, request_id: u32) -> Option<ResponseCallback> {
        let mut pending = self.pending.lock();
        match pending.get(&request_id) {
            Some((expected, _)) if *expected == node_id => {
                pending.remove(&request_id).map(|(_, on_response)| on_response)
            }
            Some((expected, _)) => {
                debug!(
                    "app request {} went to {}, ignoring answer from {}",
                    request_id, expected, node_id
                );
                None
            }
            None => {
                debug!("unexpected app answer {} from {}", request_id, node_id);
                None
            }
        }
    }
}
