//! Serves pull requests and absorbs pushed gossip.

use {
    crate::{
        bloom::filter_contains,
        config::HandlerConfig,
        error::Result,
        gossipable::{Gossipable, Marshaller, Set},
        message::{decode, encode, PullRequest, PullResponse, PushGossip},
        metrics,
    },
    log::{debug, trace},
    quorum_bloom::ReadFilter,
    quorum_monitoring::MetricsSink,
    quorum_types::NodeId,
    std::sync::Arc,
};

pub struct Handler<T> {
    marshaller: Arc<dyn Marshaller<T>>,
    set: Arc<dyn Set<T>>,
    config: HandlerConfig,
    metrics: Arc<dyn MetricsSink>,
}

impl<T: Gossipable> Handler<T> {
    pub fn new(
        config: HandlerConfig,
        marshaller: Arc<dyn Marshaller<T>>,
        set: Arc<dyn Set<T>>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            marshaller,
            set,
            config,
            metrics,
        })
    }

    /// Answer a pull request with the items the requester's filter lacks,
    /// in set order, up to `target_response_size` bytes. A first item larger
    /// than the target is still sent, alone.
    pub fn app_request(&self, node_id: NodeId, request: &[u8]) -> Result<Vec<u8>> {
        let request: PullRequest = decode(request)?;
        let filter = ReadFilter::parse(&request.filter)?;

        let target = self.config.target_response_size;
        let mut gossip = Vec::new();
        let mut size = 0usize;
        self.set.iterate(&mut |item| {
            let id = item.gossip_id();
            if filter_contains(&filter, &request.salt, &id) {
                return true;
            }
            let bytes = match self.marshaller.marshal(item) {
                Ok(bytes) => bytes,
                Err(err) => {
                    debug!("skipping gossipable {}: {}", id, err);
                    return true;
                }
            };
            if !gossip.is_empty() && size + bytes.len() > target {
                return false;
            }
            size += bytes.len();
            gossip.push(bytes);
            size < target
        });

        trace!("answering pull from {} with {} items", node_id, gossip.len());
        self.metrics
            .add_counter(&metrics::GOSSIP_SENT_COUNT, gossip.len() as u64);
        self.metrics
            .add_counter(&metrics::GOSSIP_SENT_BYTES, size as u64);
        encode(&PullResponse { gossip })
    }

    /// Add pushed items to the set. Items that fail to decode or that the set
    /// refuses are skipped.
    pub fn app_gossip(&self, node_id: NodeId, bytes: &[u8]) -> Result<()> {
        let push: PushGossip = decode(bytes)?;
        add_all(
            self.marshaller.as_ref(),
            self.set.as_ref(),
            self.metrics.as_ref(),
            node_id,
            &push.gossip,
        );
        Ok(())
    }
}

/// Unmarshal each item and add it to `set`, returning how many were added.
pub(crate) fn add_all<T: Gossipable>(
    marshaller: &dyn Marshaller<T>,
    set: &dyn Set<T>,
    sink: &dyn MetricsSink,
    node_id: NodeId,
    gossip: &[Vec<u8>],
) -> usize {
    let mut added = 0;
    for bytes in gossip {
        sink.inc_counter(&metrics::GOSSIP_RECEIVED_COUNT);
        sink.add_counter(&metrics::GOSSIP_RECEIVED_BYTES, bytes.len() as u64);
        let item = match marshaller.unmarshal(bytes) {
            Ok(item) => item,
            Err(err) => {
                debug!("failed to unmarshal gossip from {}: {}", node_id, err);
                continue;
            }
        };
        let id = item.gossip_id();
        match set.add(item) {
            Ok(()) => added += 1,
            Err(err) => trace!("not adding {} from {}: {}", id, node_id, err),
        }
    }
    added
}
