//! Inbound admission control.
//!
//! Bytes read from the network are charged to the throttler before the
//! message is routed and returned once the message has been handled. A
//! [`WeightedThrottler`] has two pools:
//!
//! - the **at-large** pool, open to every peer, consumed first;
//! - the **validator** pool, split between validators by weight. Validator
//!   `v` may hold at most `validator_alloc_size * weight(v) / total_weight`
//!   bytes of it.
//!
//! A peer that fits neither pool blocks until some release changes the
//! state. Releases always wake every waiter: a release credited to one pool
//! may unblock a waiter that only fits the other.

use {
    crate::{config::ThrottlerConfig, error::Result, metrics},
    log::{error, trace},
    parking_lot::{Condvar, Mutex},
    quorum_monitoring::MetricsSink,
    quorum_types::NodeId,
    quorum_validators::ValidatorSet,
    std::{
        collections::{hash_map::Entry, HashMap},
        fmt,
        sync::Arc,
        time::{Duration, Instant},
    },
};

/// Gates how many unprocessed bytes each peer may have in flight.
pub trait MessageThrottler: Send + Sync {
    /// Block until `size` bytes from `node_id` can be admitted.
    fn acquire(&self, size: u64, node_id: &NodeId);

    /// Return bytes previously admitted by [`MessageThrottler::acquire`].
    /// Releasing bytes that were never acquired is a caller bug.
    fn release(&self, size: u64, node_id: &NodeId);
}

/// Admits everything. Used when throttling is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoThrottler;

impl MessageThrottler for NoThrottler {
    fn acquire(&self, _size: u64, _node_id: &NodeId) {}

    fn release(&self, _size: u64, _node_id: &NodeId) {}
}

/// Bytes held on behalf of one message; released when dropped.
pub struct ThrottlePermit {
    throttler: Arc<dyn MessageThrottler>,
    node_id: NodeId,
    size: u64,
}

impl ThrottlePermit {
    /// Block until `size` bytes are admitted for `node_id`.
    pub fn acquire(throttler: Arc<dyn MessageThrottler>, size: u64, node_id: NodeId) -> Self {
        throttler.acquire(size, &node_id);
        Self {
            throttler,
            node_id,
            size,
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

impl Drop for ThrottlePermit {
    fn drop(&mut self) {
        self.throttler.release(self.size, &self.node_id);
    }
}

impl fmt::Debug for ThrottlePermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThrottlePermit")
            .field("node_id", &self.node_id)
            .field("size", &self.size)
            .finish()
    }
}

/// Snapshot of a [`WeightedThrottler`]'s pools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottlerState {
    pub remaining_at_large: u64,
    pub at_large_in_flight: u64,
    pub remaining_per_validator: u64,
    pub used_by_validator: HashMap<NodeId, u64>,
}

impl ThrottlerState {
    /// Sum of every byte the throttler accounts for. Constant for the
    /// throttler's lifetime as long as releases match acquisitions.
    pub fn total(&self) -> u64 {
        self.remaining_at_large
            + self.at_large_in_flight
            + self.remaining_per_validator
            + self.used_by_validator.values().sum::<u64>()
    }
}

#[derive(Debug)]
struct Pools {
    remaining_at_large: u64,
    at_large_in_flight: u64,
    remaining_per_validator: u64,
    used_by_validator: HashMap<NodeId, u64>,
}

pub struct WeightedThrottler {
    config: ThrottlerConfig,
    validators: Arc<ValidatorSet>,
    pools: Mutex<Pools>,
    released: Condvar,
    metrics: Arc<dyn MetricsSink>,
}

impl WeightedThrottler {
    pub fn new(
        config: ThrottlerConfig,
        validators: Arc<ValidatorSet>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self> {
        config.validate()?;
        let pools = Pools {
            remaining_at_large: config.at_large_alloc_size,
            at_large_in_flight: 0,
            remaining_per_validator: config.validator_alloc_size,
            used_by_validator: HashMap::new(),
        };
        let throttler = Self {
            config,
            validators,
            pools: Mutex::new(pools),
            released: Condvar::new(),
            metrics,
        };
        throttler.report(&throttler.pools.lock());
        Ok(throttler)
    }

    /// Admit `size` bytes if they fit right now.
    pub fn try_acquire(&self, size: u64, node_id: &NodeId) -> bool {
        if size == 0 {
            return true;
        }
        let mut pools = self.pools.lock();
        self.admit(&mut pools, size, node_id)
    }

    /// Like [`MessageThrottler::acquire`], but gives up after `timeout`.
    pub fn acquire_timeout(&self, size: u64, node_id: &NodeId, timeout: Duration) -> bool {
        if size == 0 {
            return true;
        }
        let deadline = Instant::now() + timeout;
        let mut pools = self.pools.lock();
        loop {
            if self.admit(&mut pools, size, node_id) {
                return true;
            }
            if self.released.wait_until(&mut pools, deadline).timed_out() {
                return self.admit(&mut pools, size, node_id);
            }
        }
    }

    pub fn state(&self) -> ThrottlerState {
        let pools = self.pools.lock();
        ThrottlerState {
            remaining_at_large: pools.remaining_at_large,
            at_large_in_flight: pools.at_large_in_flight,
            remaining_per_validator: pools.remaining_per_validator,
            used_by_validator: pools.used_by_validator.clone(),
        }
    }

    /// Largest share of the validator pool `node_id` may hold.
    pub fn allocation_for(&self, node_id: &NodeId) -> u64 {
        let weight = self.validators.weight_of(node_id);
        let total = self.validators.total_stake();
        if weight == 0 || total == 0 {
            return 0;
        }
        (u128::from(self.config.validator_alloc_size) * u128::from(weight) / u128::from(total))
            as u64
    }

    fn admit(&self, pools: &mut Pools, size: u64, node_id: &NodeId) -> bool {
        if size <= pools.remaining_at_large {
            pools.remaining_at_large -= size;
            pools.at_large_in_flight += size;
            trace!("admitted {} at-large bytes from {}", size, node_id);
            self.report(pools);
            return true;
        }
        if size > pools.remaining_per_validator {
            return false;
        }
        let allocation = self.allocation_for(node_id);
        let used = pools.used_by_validator.get(node_id).copied().unwrap_or(0);
        if used.saturating_add(size) > allocation {
            return false;
        }
        pools.remaining_per_validator -= size;
        pools.used_by_validator.insert(*node_id, used + size);
        trace!(
            "admitted {} validator bytes from {} ({} of {} used)",
            size,
            node_id,
            used + size,
            allocation
        );
        self.report(pools);
        true
    }

    fn report(&self, pools: &Pools) {
        self.metrics.set_gauge(
            &metrics::THROTTLER_AT_LARGE_REMAINING,
            pools.remaining_at_large as i64,
        );
        self.metrics.set_gauge(
            &metrics::THROTTLER_VALIDATOR_REMAINING,
            pools.remaining_per_validator as i64,
        );
    }
}

impl MessageThrottler for WeightedThrottler {
    fn acquire(&self, size: u64, node_id: &NodeId) {
        if size == 0 {
            return;
        }
        let mut pools = self.pools.lock();
        // Wakeups may be spurious or lost to another waiter; recheck every time.
        while !self.admit(&mut pools, size, node_id) {
            self.released.wait(&mut pools);
        }
    }

    fn release(&self, size: u64, node_id: &NodeId) {
        if size == 0 {
            return;
        }
        let mut guard = self.pools.lock();
        let pools = &mut *guard;
        let mut to_at_large = size;
        if let Entry::Occupied(mut used) = pools.used_by_validator.entry(*node_id) {
            let credited = (*used.get()).min(size);
            *used.get_mut() -= credited;
            if *used.get() == 0 {
                used.remove();
            }
            pools.remaining_per_validator += credited;
            to_at_large -= credited;
        }
        let returned = to_at_large.min(pools.at_large_in_flight);
        if returned < to_at_large {
            error!(
                "{} released {} bytes more than it acquired",
                node_id,
                to_at_large - returned
            );
        }
        pools.at_large_in_flight -= returned;
        pools.remaining_at_large += returned;
        self.report(pools);
        drop(guard);
        self.released.notify_all();
    }
}

impl fmt::Debug for WeightedThrottler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeightedThrottler")
            .field("config", &self.config)
            .field("pools", &*self.pools.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        quorum_monitoring::{MetricsRegistry, NoopMetrics},
        std::{
            sync::atomic::{AtomicBool, Ordering},
            thread,
        },
    };

    fn throttler(at_large: u64, per_validator: u64, weights: &[(NodeId, u64)]) -> WeightedThrottler {
        let set = Arc::new(ValidatorSet::new());
        for (node, weight) in weights {
            set.add_weight(*node, *weight).unwrap();
        }
        let config = ThrottlerConfig {
            at_large_alloc_size: at_large,
            validator_alloc_size: per_validator,
        };
        WeightedThrottler::new(config, set, NoopMetrics::shared()).unwrap()
    }

    #[test]
    fn test_at_large_pool_is_used_first() {
        let validator = NodeId::new_unique();
        let throttler = throttler(100, 100, &[(validator, 1)]);
        assert!(throttler.try_acquire(60, &validator));
        let state = throttler.state();
        assert_eq!(state.remaining_at_large, 40);
        assert_eq!(state.remaining_per_validator, 100);
        assert!(state.used_by_validator.is_empty());

        // Does not fit at-large any more; falls through to the validator pool.
        assert!(throttler.try_acquire(60, &validator));
        let state = throttler.state();
        assert_eq!(state.remaining_at_large, 40);
        assert_eq!(state.remaining_per_validator, 40);
        assert_eq!(state.used_by_validator[&validator], 60);
    }

    #[test]
    fn test_non_validator_only_gets_at_large() {
        let stranger = NodeId::new_unique();
        let throttler = throttler(50, 1_000, &[(NodeId::new_unique(), 1)]);
        assert!(throttler.try_acquire(50, &stranger));
        assert!(!throttler.try_acquire(1, &stranger));
    }

    #[test]
    fn test_allocation_is_weighted() {
        let heavy = NodeId::new_unique();
        let light = NodeId::new_unique();
        let throttler = throttler(0, 100, &[(heavy, 3), (light, 1)]);
        assert_eq!(throttler.allocation_for(&heavy), 75);
        assert_eq!(throttler.allocation_for(&light), 25);
        assert_eq!(throttler.allocation_for(&NodeId::new_unique()), 0);

        assert!(throttler.try_acquire(25, &light));
        assert!(!throttler.try_acquire(1, &light));
        assert!(throttler.try_acquire(75, &heavy));
        assert!(!throttler.try_acquire(1, &heavy));
    }

    #[test]
    fn test_release_credits_validator_pool_first() {
        let validator = NodeId::new_unique();
        let throttler = throttler(10, 100, &[(validator, 1)]);
        assert!(throttler.try_acquire(10, &validator)); // at-large
        assert!(throttler.try_acquire(30, &validator)); // validator pool

        throttler.release(10, &validator);
        let state = throttler.state();
        assert_eq!(state.remaining_per_validator, 80);
        assert_eq!(state.used_by_validator[&validator], 20);
        assert_eq!(state.remaining_at_large, 0);

        throttler.release(30, &validator);
        let state = throttler.state();
        assert_eq!(state.remaining_per_validator, 100);
        assert!(state.used_by_validator.is_empty());
        assert_eq!(state.remaining_at_large, 10);
    }

    #[test]
    fn test_release_beyond_acquired_is_not_credited() {
        let stranger = NodeId::new_unique();
        let throttler = throttler(10, 100, &[(NodeId::new_unique(), 1)]);
        assert!(throttler.try_acquire(4, &stranger));
        assert_eq!(throttler.state().at_large_in_flight, 4);

        throttler.release(9, &stranger);
        let state = throttler.state();
        assert_eq!(state.at_large_in_flight, 0);
        assert_eq!(state.remaining_at_large, 10);
        assert_eq!(state.total(), 110);
    }

    #[test]
    fn test_zero_size_is_a_no_op() {
        let node = NodeId::new_unique();
        let throttler = throttler(1, 0, &[]);
        throttler.acquire(0, &node);
        throttler.release(0, &node);
        assert!(throttler.try_acquire(0, &node));
    }

    #[test]
    fn test_empty_config_is_rejected() {
        let result = WeightedThrottler::new(
            ThrottlerConfig {
                at_large_alloc_size: 0,
                validator_alloc_size: 0,
            },
            Arc::new(ValidatorSet::new()),
            NoopMetrics::shared(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_acquire_timeout_gives_up() {
        let node = NodeId::new_unique();
        let throttler = throttler(10, 0, &[]);
        assert!(throttler.acquire_timeout(10, &node, Duration::from_millis(10)));
        assert!(!throttler.acquire_timeout(1, &node, Duration::from_millis(20)));
    }

    #[test]
    fn test_blocked_acquire_wakes_on_release() {
        let node = NodeId::new_unique();
        let throttler = Arc::new(throttler(10, 0, &[]));
        throttler.acquire(10, &node);

        let admitted = Arc::new(AtomicBool::new(false));
        let waiter = {
            let throttler = throttler.clone();
            let admitted = admitted.clone();
            thread::spawn(move || {
                throttler.acquire(5, &node);
                admitted.store(true, Ordering::SeqCst);
            })
        };
        thread::sleep(Duration::from_millis(50));
        assert!(!admitted.load(Ordering::SeqCst));

        throttler.release(10, &node);
        waiter.join().unwrap();
        assert!(admitted.load(Ordering::SeqCst));
        assert_eq!(throttler.state().remaining_at_large, 5);
    }

    #[test]
    fn test_release_wakes_every_waiter() {
        let node = NodeId::new_unique();
        let throttler = Arc::new(throttler(30, 0, &[]));
        throttler.acquire(30, &node);

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let throttler = throttler.clone();
                thread::spawn(move || throttler.acquire(10, &node))
            })
            .collect();
        thread::sleep(Duration::from_millis(50));

        // One release makes room for all three.
        throttler.release(30, &node);
        for waiter in waiters {
            waiter.join().unwrap();
        }
        assert_eq!(throttler.state().remaining_at_large, 0);
    }

    #[test]
    fn test_permit_releases_on_drop() {
        let node = NodeId::new_unique();
        let throttler = Arc::new(throttler(10, 0, &[]));
        let permit = ThrottlePermit::acquire(throttler.clone(), 10, node);
        assert_eq!(permit.size(), 10);
        assert_eq!(throttler.state().remaining_at_large, 0);
        drop(permit);
        assert_eq!(throttler.state().remaining_at_large, 10);
    }

    #[test]
    fn test_conservation_and_gauges() {
        let a = NodeId::new_unique();
        let b = NodeId::new_unique();
        let set = Arc::new(ValidatorSet::new());
        set.add_weight(a, 1).unwrap();
        set.add_weight(b, 1).unwrap();
        let registry = Arc::new(MetricsRegistry::new());
        let throttler = WeightedThrottler::new(
            ThrottlerConfig {
                at_large_alloc_size: 40,
                validator_alloc_size: 60,
            },
            set,
            registry.clone(),
        )
        .unwrap();

        let acquired = [(a, 25), (b, 25), (a, 20), (b, 5)];
        for (node, size) in acquired {
            assert!(throttler.try_acquire(size, &node));
            assert_eq!(throttler.state().total(), 100);
        }
        assert_eq!(registry.gauge("throttler_at_large_remaining"), 10);
        assert_eq!(registry.gauge("throttler_validator_remaining"), 15);

        for (node, size) in acquired.into_iter().rev() {
            throttler.release(size, &node);
            assert_eq!(throttler.state().total(), 100);
        }
        let state = throttler.state();
        assert_eq!(state.remaining_at_large, 40);
        assert_eq!(state.remaining_per_validator, 60);
    }
}
