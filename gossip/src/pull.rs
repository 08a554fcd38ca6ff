//! Pull gossip: ask random validators for what our bloom filter lacks.

use {
    crate::{
        client::Client,
        config::PullGossiperConfig,
        error::Result,
        gossiper::Gossiper,
        gossipable::{Gossipable, Marshaller, Set},
        handler::add_all,
        message::{decode, encode, PullRequest, PullResponse},
    },
    log::debug,
    quorum_monitoring::MetricsSink,
    quorum_types::NodeId,
    std::sync::Arc,
};

struct PullState<T> {
    marshaller: Arc<dyn Marshaller<T>>,
    set: Arc<dyn Set<T>>,
    metrics: Arc<dyn MetricsSink>,
}

impl<T: Gossipable> PullState<T> {
    fn handle_response(&self, node_id: NodeId, response: Result<Vec<u8>>) {
        let bytes = match response {
            Ok(bytes) => bytes,
            Err(err) => {
                debug!("pull request to {} failed: {}", node_id, err);
                return;
            }
        };
        let response: PullResponse = match decode(&bytes) {
            Ok(response) => response,
            Err(err) => {
                debug!("malformed pull response from {}: {}", node_id, err);
                return;
            }
        };
        let added = add_all(
            self.marshaller.as_ref(),
            self.set.as_ref(),
            self.metrics.as_ref(),
            node_id,
            &response.gossip,
        );
        debug!(
            "pulled {} new of {} gossipables from {}",
            added,
            response.gossip.len(),
            node_id
        );
    }
}

pub struct PullGossiper<T> {
    config: PullGossiperConfig,
    state: Arc<PullState<T>>,
    client: Arc<Client>,
}

impl<T: Gossipable + Send + 'static> PullGossiper<T> {
    pub fn new(
        config: PullGossiperConfig,
        marshaller: Arc<dyn Marshaller<T>>,
        set: Arc<dyn Set<T>>,
        client: Arc<Client>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: Arc::new(PullState {
                marshaller,
                set,
                metrics,
            }),
            client,
        })
    }
}

impl<T: Gossipable + Send + 'static> Gossiper for PullGossiper<T> {
    /// Send `poll_size` pull requests carrying the set's current filter.
    fn gossip(&self) -> Result<()> {
        let (filter, salt) = self.state.set.get_filter();
        let request = encode(&PullRequest { filter, salt })?;
        for _ in 0..self.config.poll_size {
            let state = self.state.clone();
            self.client.app_request_any(
                request.clone(),
                Box::new(move |node_id, response| state.handle_response(node_id, response)),
            )?;
        }
        Ok(())
    }
}
