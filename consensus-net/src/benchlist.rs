//! Benching of unresponsive validators.
//!
//! Every chain tracks, per validator, the current streak of consecutive
//! request failures. A validator whose streak reaches `threshold` failures
//! and has lasted at least `minimum_failing_duration` is benched for
//! `duration`: requests to it fail immediately instead of waiting for a
//! timeout.
//!
//! The weight benched on a chain never exceeds `max_portion` of the chain's
//! total weight. A bench that would exceed it evicts the benches expiring
//! soonest (lowest [`NodeId`] first on equal expiry); a validator heavier than
//! the whole allowance is never benched.

use {
    crate::{config::BenchlistConfig, error::Result, metrics},
    log::{debug, info, warn},
    parking_lot::{Mutex, MutexGuard, RwLock},
    quorum_monitoring::MetricsSink,
    quorum_types::{ChainId, Clock, NodeId, SubnetId},
    quorum_validators::{ObserverId, ValidatorEvent, ValidatorManager, ValidatorSet},
    std::{
        collections::HashMap,
        fmt,
        sync::{Arc, Weak},
        time::Instant,
    },
};

/// Notified when a validator is benched or leaves the bench.
pub trait Benchable: Send + Sync {
    fn benched(&self, chain_id: ChainId, node_id: NodeId);
    fn unbenched(&self, chain_id: ChainId, node_id: NodeId);
}

/// Ignores bench notifications.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBenchable;

impl Benchable for NoopBenchable {
    fn benched(&self, _chain_id: ChainId, _node_id: NodeId) {}

    fn unbenched(&self, _chain_id: ChainId, _node_id: NodeId) {}
}

/// Forwards while the target is alive.
impl<T: Benchable> Benchable for Weak<T> {
    fn benched(&self, chain_id: ChainId, node_id: NodeId) {
        if let Some(target) = self.upgrade() {
            target.benched(chain_id, node_id);
        }
    }

    fn unbenched(&self, chain_id: ChainId, node_id: NodeId) {
        if let Some(target) = self.upgrade() {
            target.unbenched(chain_id, node_id);
        }
    }
}

/// Failure tracking for one chain.
pub trait Benchlist: Send + Sync {
    /// `node_id` answered a request; its failure streak ends.
    fn register_response(&self, node_id: &NodeId);

    /// A request to `node_id` failed or timed out.
    fn register_failure(&self, node_id: &NodeId);

    fn is_benched(&self, node_id: &NodeId) -> bool;

    /// Stop following validator changes. The chain is going away.
    fn unsubscribe(&self) {}
}

/// Never benches anyone. Selected when `max_portion <= 0`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBenchlist;

impl Benchlist for NoBenchlist {
    fn register_response(&self, _node_id: &NodeId) {}

    fn register_failure(&self, _node_id: &NodeId) {}

    fn is_benched(&self, _node_id: &NodeId) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy)]
struct FailureStreak {
    consecutive: usize,
    first_failure: Instant,
}

#[derive(Debug, Default)]
struct BenchState {
    /// Mirrors the validator set through its events.
    weights: HashMap<NodeId, u64>,
    total_weight: u64,
    streaks: HashMap<NodeId, FailureStreak>,
    /// Benched validators and when their bench ends.
    benched: HashMap<NodeId, Instant>,
}

impl BenchState {
    fn benched_weight(&self) -> u64 {
        self.benched
            .keys()
            .map(|node| self.weights.get(node).copied().unwrap_or(0))
            .sum()
    }

    fn max_benched_weight(&self, max_portion: f64) -> f64 {
        self.total_weight as f64 * max_portion
    }

    /// Remove benches that have run out.
    fn expire(&mut self, now: Instant) -> Vec<NodeId> {
        let mut expired: Vec<NodeId> = self
            .benched
            .iter()
            .filter(|(_, until)| now >= **until)
            .map(|(node, _)| *node)
            .collect();
        expired.sort_unstable();
        for node in &expired {
            self.benched.remove(node);
        }
        expired
    }

    /// Unbench the benches ending soonest until `extra` more weight fits.
    fn make_room(&mut self, extra: u64, max_portion: f64) -> Vec<NodeId> {
        let max = self.max_benched_weight(max_portion);
        let mut evicted = Vec::new();
        while (self.benched_weight() + extra) as f64 > max {
            let Some(next) = self
                .benched
                .iter()
                .min_by_key(|(node, until)| (**until, **node))
                .map(|(node, _)| *node)
            else {
                break;
            };
            self.benched.remove(&next);
            evicted.push(next);
        }
        evicted
    }
}

pub struct ChainBenchlist {
    chain_id: ChainId,
    config: BenchlistConfig,
    benchable: Arc<dyn Benchable>,
    clock: Clock,
    metrics: Arc<dyn MetricsSink>,
    state: Mutex<BenchState>,
    validators: Arc<ValidatorSet>,
    observer: Mutex<Option<ObserverId>>,
}

impl ChainBenchlist {
    /// Build the benchlist for `chain_id` and subscribe it to `validators`.
    pub fn new(
        chain_id: ChainId,
        config: BenchlistConfig,
        validators: &Arc<ValidatorSet>,
        benchable: Arc<dyn Benchable>,
        clock: Clock,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        let benchlist = Arc::new(Self {
            chain_id,
            config,
            benchable,
            clock,
            metrics,
            state: Mutex::new(BenchState::default()),
            validators: validators.clone(),
            observer: Mutex::new(None),
        });
        let weak: Weak<Self> = Arc::downgrade(&benchlist);
        let observer = validators.register_observer(Arc::new(move |event: &ValidatorEvent| {
            if let Some(benchlist) = weak.upgrade() {
                benchlist.on_validator_event(event);
            }
        }));
        *benchlist.observer.lock() = Some(observer);
        Ok(benchlist)
    }

    /// Validators benched right now, sorted.
    pub fn benched(&self) -> Vec<NodeId> {
        let now = self.clock.now();
        let mut benched: Vec<NodeId> = self
            .state
            .lock()
            .benched
            .iter()
            .filter(|(_, until)| now < **until)
            .map(|(node, _)| *node)
            .collect();
        benched.sort_unstable();
        benched
    }

    /// Combined weight of the validators benched right now.
    pub fn benched_weight(&self) -> u64 {
        let now = self.clock.now();
        let state = self.state.lock();
        state
            .benched
            .iter()
            .filter(|(_, until)| now < **until)
            .map(|(node, _)| state.weights.get(node).copied().unwrap_or(0))
            .sum()
    }

    fn on_validator_event(&self, event: &ValidatorEvent) {
        let mut state = self.state.lock();
        let mut unbenched = Vec::new();
        match *event {
            ValidatorEvent::Added { node_id, weight } => {
                state.weights.insert(node_id, weight);
                state.total_weight = state.total_weight.saturating_add(weight);
            }
            ValidatorEvent::Removed { node_id, weight } => {
                state.weights.remove(&node_id);
                state.total_weight = state.total_weight.saturating_sub(weight);
                state.streaks.remove(&node_id);
                if state.benched.remove(&node_id).is_some() {
                    unbenched.push(node_id);
                }
            }
            ValidatorEvent::WeightChanged {
                node_id,
                old_weight,
                new_weight,
            } => {
                state.weights.insert(node_id, new_weight);
                state.total_weight = state
                    .total_weight
                    .saturating_sub(old_weight)
                    .saturating_add(new_weight);
            }
        }
        // Shrinking weights can leave the bench over its allowance.
        unbenched.extend(state.make_room(0, self.config.max_portion));
        self.finish(state, None, unbenched);
    }

    fn bench(&self, state: &mut BenchState, node_id: NodeId, now: Instant) -> Option<Vec<NodeId>> {
        let weight = state.weights.get(&node_id).copied().unwrap_or(0);
        let max = state.max_benched_weight(self.config.max_portion);
        if weight as f64 > max {
            warn!(
                "not benching {} on chain {}: weight {} exceeds the bench allowance {}",
                node_id, self.chain_id, weight, max
            );
            return None;
        }
        let evicted = state.make_room(weight, self.config.max_portion);
        for node in &evicted {
            debug!("unbenching {} early on chain {} to make room", node, self.chain_id);
        }
        state.streaks.remove(&node_id);
        state.benched.insert(node_id, now + self.config.duration);
        info!(
            "benching {} on chain {} for {:?}",
            node_id, self.chain_id, self.config.duration
        );
        Some(evicted)
    }

    /// Report gauges and notify the benchable once the lock is released.
    fn finish(
        &self,
        state: MutexGuard<BenchState>,
        benched: Option<NodeId>,
        unbenched: Vec<NodeId>,
    ) {
        self.metrics.set_gauge(
            &metrics::BENCHLIST_BENCHED_WEIGHT,
            state.benched_weight() as i64,
        );
        self.metrics
            .set_gauge(&metrics::BENCHLIST_BENCHED_COUNT, state.benched.len() as i64);
        drop(state);
        for node in unbenched {
            self.benchable.unbenched(self.chain_id, node);
        }
        if let Some(node) = benched {
            self.benchable.benched(self.chain_id, node);
        }
    }
}

impl Benchlist for ChainBenchlist {
    fn register_response(&self, node_id: &NodeId) {
        let mut state = self.state.lock();
        state.streaks.remove(node_id);
        let unbenched = state.expire(self.clock.now());
        if !unbenched.is_empty() {
            self.finish(state, None, unbenched);
        }
    }

    fn register_failure(&self, node_id: &NodeId) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let mut unbenched = state.expire(now);

        if state.benched.contains_key(node_id) {
            // Already benched: failures while benched carry no new signal.
            self.finish(state, None, unbenched);
            return;
        }
        if !state.weights.contains_key(node_id) {
            self.finish(state, None, unbenched);
            return;
        }

        let streak = state.streaks.entry(*node_id).or_insert(FailureStreak {
            consecutive: 0,
            first_failure: now,
        });
        streak.consecutive += 1;
        let streak = *streak;
        let due = streak.consecutive >= self.config.threshold
            && now >= streak.first_failure + self.config.minimum_failing_duration;
        let mut benched = None;
        if due {
            if let Some(evicted) = self.bench(&mut state, *node_id, now) {
                unbenched.extend(evicted);
                benched = Some(*node_id);
            }
        }
        self.finish(state, benched, unbenched);
    }

    fn is_benched(&self, node_id: &NodeId) -> bool {
        let now = self.clock.now();
        self.state
            .lock()
            .benched
            .get(node_id)
            .is_some_and(|until| now < *until)
    }

    fn unsubscribe(&self) {
        if let Some(observer) = self.observer.lock().take() {
            self.validators.unregister_observer(observer);
        }
    }
}

impl fmt::Debug for ChainBenchlist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainBenchlist")
            .field("chain_id", &self.chain_id)
            .field("config", &self.config)
            .field("benched", &self.benched())
            .finish()
    }
}

/// One benchlist per chain.
pub struct BenchlistManager {
    config: BenchlistConfig,
    validators: Arc<ValidatorManager>,
    clock: Clock,
    metrics: Arc<dyn MetricsSink>,
    chains: RwLock<HashMap<ChainId, Arc<dyn Benchlist>>>,
}

impl BenchlistManager {
    pub fn new(
        config: BenchlistConfig,
        validators: Arc<ValidatorManager>,
        clock: Clock,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            validators,
            clock,
            metrics,
            chains: RwLock::new(HashMap::new()),
        })
    }

    /// Start tracking `chain_id`, validated by `subnet_id`'s validators.
    /// `benchable` hears about the chain's bench changes. Registering a chain
    /// twice keeps the first benchlist.
    pub fn register_chain(
        &self,
        chain_id: ChainId,
        subnet_id: SubnetId,
        benchable: Arc<dyn Benchable>,
    ) -> Result<()> {
        // Held across the build so a losing registration never subscribes.
        let mut chains = self.chains.write();
        if chains.contains_key(&chain_id) {
            debug!("benchlist for chain {} already registered", chain_id);
            return Ok(());
        }
        let benchlist: Arc<dyn Benchlist> = if self.config.is_disabled() {
            Arc::new(NoBenchlist)
        } else {
            ChainBenchlist::new(
                chain_id,
                self.config.clone(),
                &self.validators.get_or_create_set(subnet_id),
                benchable,
                self.clock.clone(),
                self.metrics.clone(),
            )?
        };
        chains.insert(chain_id, benchlist);
        Ok(())
    }

    pub fn remove_chain(&self, chain_id: &ChainId) {
        let removed = self.chains.write().remove(chain_id);
        if let Some(benchlist) = removed {
            benchlist.unsubscribe();
        }
    }

    pub fn register_response(&self, chain_id: &ChainId, node_id: &NodeId) {
        if let Some(benchlist) = self.chain(chain_id) {
            benchlist.register_response(node_id);
        }
    }

    pub fn register_failure(&self, chain_id: &ChainId, node_id: &NodeId) {
        if let Some(benchlist) = self.chain(chain_id) {
            benchlist.register_failure(node_id);
        }
    }

    /// Unknown chains never bench anyone.
    pub fn is_benched(&self, node_id: &NodeId, chain_id: &ChainId) -> bool {
        self.chain(chain_id)
            .is_some_and(|benchlist| benchlist.is_benched(node_id))
    }

    fn chain(&self, chain_id: &ChainId) -> Option<Arc<dyn Benchlist>> {
        self.chains.read().get(chain_id).cloned()
    }
}

impl fmt::Debug for BenchlistManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BenchlistManager")
            .field("config", &self.config)
            .field("chains", &self.chains.read().len())
            .finish()
    }
}
