//! Push gossip.
//!
//! New items wait in a fresh queue until their first send, then move to a
//! regossip queue where they become eligible again once
//! `max_regossip_frequency` has passed. Each [`PushGossiper::gossip`] round
//! runs a fresh pass then a regossip pass, each filling one app gossip message
//! up to its byte budget.
//!
//! Items that leave the set while tracked are forgotten. Only the regossip
//! pass records them in the discarded cache; an item that vanishes before its
//! first send and is added again later is treated as new. Re-adding a
//! discarded item starts it in the regossip queue as if it had just been sent.

use {
    crate::{
        config::{BranchingFactor, PushGossiperConfig},
        error::Result,
        gossiper::Gossiper,
        gossipable::{Gossipable, Marshaller, Set},
        message::{encode, PushGossip},
        metrics,
    },
    log::{debug, trace},
    lru::LruCache,
    parking_lot::Mutex,
    quorum_consensus_net::AppSender,
    quorum_monitoring::MetricsSink,
    quorum_types::{Clock, Id},
    std::{
        collections::{HashMap, VecDeque},
        sync::Arc,
        time::Instant,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Fresh,
    Regossip,
}

struct Tracked<T> {
    item: T,
    /// `None` until the first send.
    last_gossiped: Option<Instant>,
}

struct PushState<T> {
    tracking: HashMap<Id, Tracked<T>>,
    to_gossip: VecDeque<Id>,
    to_regossip: VecDeque<Id>,
    discarded: LruCache<Id, ()>,
}

impl<T> PushState<T> {
    fn queue(&mut self, pass: Pass) -> &mut VecDeque<Id> {
        match pass {
            Pass::Fresh => &mut self.to_gossip,
            Pass::Regossip => &mut self.to_regossip,
        }
    }
}

pub struct PushGossiper<T> {
    config: PushGossiperConfig,
    marshaller: Arc<dyn Marshaller<T>>,
    set: Arc<dyn Set<T>>,
    sender: Arc<dyn AppSender>,
    clock: Clock,
    metrics: Arc<dyn MetricsSink>,
    state: Mutex<PushState<T>>,
}

impl<T: Gossipable + Send> PushGossiper<T> {
    pub fn new(
        config: PushGossiperConfig,
        marshaller: Arc<dyn Marshaller<T>>,
        set: Arc<dyn Set<T>>,
        sender: Arc<dyn AppSender>,
        clock: Clock,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self> {
        config.validate()?;
        let discarded = LruCache::new(config.discarded_cache_size);
        Ok(Self {
            config,
            marshaller,
            set,
            sender,
            clock,
            metrics,
            state: Mutex::new(PushState {
                tracking: HashMap::new(),
                to_gossip: VecDeque::new(),
                to_regossip: VecDeque::new(),
                discarded,
            }),
        })
    }

    /// Start tracking newly observed items. Items already tracked are ignored.
    pub fn add(&self, items: impl IntoIterator<Item = T>) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        for item in items {
            let id = item.gossip_id();
            if state.tracking.contains_key(&id) {
                continue;
            }
            if state.discarded.contains(&id) {
                trace!("{} was discarded recently, queueing it for regossip", id);
                state.tracking.insert(
                    id,
                    Tracked {
                        item,
                        last_gossiped: Some(now),
                    },
                );
                state.to_regossip.push_back(id);
            } else {
                state.tracking.insert(
                    id,
                    Tracked {
                        item,
                        last_gossiped: None,
                    },
                );
                state.to_gossip.push_back(id);
            }
        }
        self.metrics
            .set_gauge(&metrics::GOSSIP_TRACKING, state.tracking.len() as i64);
    }

    /// Items being tracked for a first send or a regossip.
    pub fn tracked(&self) -> usize {
        self.state.lock().tracking.len()
    }

    fn select(&self, state: &mut PushState<T>, now: Instant, pass: Pass) -> Vec<Vec<u8>> {
        let target = match pass {
            Pass::Fresh => self.config.target_gossip_size,
            Pass::Regossip => self.config.target_regossip_size,
        };
        let mut batch = Vec::new();
        let mut size = 0usize;
        while size < target {
            let Some(id) = state.queue(pass).pop_front() else {
                break;
            };
            if !self.set.has(&id) {
                state.tracking.remove(&id);
                if pass == Pass::Regossip {
                    state.discarded.put(id, ());
                    self.metrics.inc_counter(&metrics::GOSSIP_DISCARDED);
                }
                continue;
            }
            let Some(tracked) = state.tracking.get(&id) else {
                continue;
            };
            if let Some(last) = tracked.last_gossiped {
                if now.saturating_duration_since(last) < self.config.max_regossip_frequency {
                    // Queues are in send order, so nothing behind it is due either.
                    state.queue(pass).push_front(id);
                    break;
                }
            }
            let bytes = match self.marshaller.marshal(&tracked.item) {
                Ok(bytes) => bytes,
                Err(err) => {
                    debug!("dropping gossipable {}: {}", id, err);
                    state.tracking.remove(&id);
                    continue;
                }
            };
            // An item over the whole budget still goes out, alone.
            if !batch.is_empty() && size + bytes.len() > target {
                state.queue(pass).push_front(id);
                break;
            }
            size += bytes.len();
            batch.push(bytes);
            if let Some(tracked) = state.tracking.get_mut(&id) {
                tracked.last_gossiped = Some(now);
            }
            state.to_regossip.push_back(id);
        }
        batch
    }

    fn send(&self, batch: Vec<Vec<u8>>, params: &BranchingFactor) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let count = batch.len();
        let size: usize = batch.iter().map(Vec::len).sum();
        let bytes = encode(&PushGossip { gossip: batch })?;
        self.sender.send_app_gossip(bytes, params.send_config());
        self.metrics
            .add_counter(&metrics::GOSSIP_SENT_COUNT, count as u64);
        self.metrics
            .add_counter(&metrics::GOSSIP_SENT_BYTES, size as u64);
        Ok(())
    }
}

impl<T: Gossipable + Send> Gossiper for PushGossiper<T> {
    fn gossip(&self) -> Result<()> {
        let now = self.clock.now();
        let (fresh, regossip) = {
            let mut state = self.state.lock();
            if state.to_gossip.is_empty() && state.to_regossip.is_empty() {
                return Ok(());
            }
            let fresh = self.select(&mut state, now, Pass::Fresh);
            let regossip = self.select(&mut state, now, Pass::Regossip);
            self.metrics
                .set_gauge(&metrics::GOSSIP_TRACKING, state.tracking.len() as i64);
            (fresh, regossip)
        };
        self.send(fresh, &self.config.gossip_params)?;
        self.send(regossip, &self.config.regossip_params)
    }
}
