//! Weighted validator set management.
//!
//! Validators live in a dense vector with a `node_id → position` index.
//! Removal swaps the last validator into the freed slot, so every mutation is
//! `O(1)` amortized. A parallel `masked_weights` vector holds what each
//! validator contributes to sampling: its weight, or zero while masked.
//!
//! The sampler is rebuilt lazily, on the first sample after a mutation, so a
//! burst of samples between two mutations pays for one rebuild.

use {
    crate::{
        error::{Result, ValidatorError},
        sampler::WeightedSampler,
        validator::{ObserverId, Validator, ValidatorEvent, ValidatorObserver},
    },
    log::{debug, trace},
    parking_lot::{RwLock, RwLockUpgradableReadGuard, RwLockWriteGuard},
    quorum_types::NodeId,
    std::{
        collections::{HashMap, HashSet},
        sync::Arc,
    },
};

/// Backing storage is halved once its capacity exceeds this multiple of the
/// live count.
const SHRINK_FACTOR: usize = 4;

/// A thread-safe, weighted set of validators.
#[derive(Default)]
pub struct ValidatorSet {
    inner: RwLock<SetInner>,
}

#[derive(Default)]
struct SetInner {
    validators: Vec<Validator>,
    index: HashMap<NodeId, usize>,
    /// `masked_weights[i]` is `validators[i].weight`, or 0 while masked.
    masked_weights: Vec<u64>,
    /// Masks outlive membership so a node can be masked before it joins.
    masked: HashSet<NodeId>,
    /// Sum of `masked_weights`.
    total_weight: u64,
    /// Sum of all weights, masked or not.
    total_stake: u64,
    sampler: WeightedSampler,
    sampler_initialized: bool,
    observers: Vec<(ObserverId, Arc<dyn ValidatorObserver>)>,
    next_observer_id: u64,
}

impl SetInner {
    fn notify(&self, event: ValidatorEvent) {
        trace!("validator event {:?}", event);
        for (_, observer) in &self.observers {
            observer.on_event(&event);
        }
    }

    fn visible_weight(&self, node_id: &NodeId, weight: u64) -> u64 {
        if self.masked.contains(node_id) {
            0
        } else {
            weight
        }
    }

    fn add_weight(&mut self, node_id: NodeId, weight: u64) -> Result<()> {
        if weight == 0 {
            return Ok(());
        }
        let total_stake = self
            .total_stake
            .checked_add(weight)
            .ok_or(ValidatorError::WeightOverflow { node_id, weight })?;
        let visible = self.visible_weight(&node_id, weight);

        match self.index.get(&node_id).copied() {
            Some(i) => {
                let old_weight = self.validators[i].weight;
                // Bounded by the checked total above.
                let new_weight = old_weight + weight;
                self.validators[i].weight = new_weight;
                self.masked_weights[i] = self.visible_weight(&node_id, new_weight);
                self.total_stake = total_stake;
                self.total_weight += visible;
                self.sampler_initialized = false;
                self.notify(ValidatorEvent::WeightChanged {
                    node_id,
                    old_weight,
                    new_weight,
                });
            }
            None => {
                self.index.insert(node_id, self.validators.len());
                self.validators.push(Validator::new(node_id, weight));
                self.masked_weights.push(visible);
                self.total_stake = total_stake;
                self.total_weight += visible;
                self.sampler_initialized = false;
                self.notify(ValidatorEvent::Added { node_id, weight });
            }
        }
        Ok(())
    }

    fn remove_weight(&mut self, node_id: NodeId, weight: u64) {
        if weight == 0 {
            return;
        }
        let Some(i) = self.index.get(&node_id).copied() else {
            return;
        };
        let old_weight = self.validators[i].weight;
        let removed = weight.min(old_weight);
        let new_weight = old_weight - removed;

        self.total_stake -= removed;
        self.total_weight -= self.masked_weights[i];
        self.sampler_initialized = false;

        if new_weight == 0 {
            self.remove_at(i);
            self.notify(ValidatorEvent::Removed {
                node_id,
                weight: old_weight,
            });
        } else {
            self.validators[i].weight = new_weight;
            let visible = self.visible_weight(&node_id, new_weight);
            self.masked_weights[i] = visible;
            self.total_weight += visible;
            self.notify(ValidatorEvent::WeightChanged {
                node_id,
                old_weight,
                new_weight,
            });
        }
    }

    /// Swap-and-truncate removal; only the moved validator's index changes.
    fn remove_at(&mut self, i: usize) {
        let removed = self.validators.swap_remove(i);
        self.masked_weights.swap_remove(i);
        self.index.remove(&removed.node_id);
        if let Some(moved) = self.validators.get(i) {
            self.index.insert(moved.node_id, i);
        }
    }

    fn set_weight(&mut self, node_id: NodeId, new_weight: u64) -> Result<()> {
        match self.index.get(&node_id).copied() {
            Some(i) => {
                let old_weight = self.validators[i].weight;
                if new_weight < old_weight {
                    self.remove_weight(node_id, old_weight - new_weight);
                    Ok(())
                } else {
                    self.add_weight(node_id, new_weight - old_weight)
                }
            }
            None => self.add_weight(node_id, new_weight),
        }
    }

    fn maybe_shrink(&mut self) {
        let capacity = self.validators.capacity();
        if capacity > SHRINK_FACTOR * self.validators.len() {
            let target = capacity / 2;
            debug!(
                "shrinking validator set storage from {} to {} (len {})",
                capacity,
                target,
                self.validators.len()
            );
            self.validators.shrink_to(target);
            self.masked_weights.shrink_to(target);
            self.index.shrink_to(target);
        }
    }

    fn rebuild_sampler(&mut self) {
        self.sampler.initialize(&self.masked_weights);
        self.sampler_initialized = true;
    }

    fn sample(&self, size: usize) -> Result<Vec<Validator>> {
        let mut rng = rand::rng();
        (0..size)
            .map(|_| {
                self.sampler
                    .sample(&mut rng)
                    .map(|i| self.validators[i])
                    .ok_or(ValidatorError::InsufficientWeight { requested: size })
            })
            .collect()
    }
}

impl ValidatorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from `validators`; zero weights are skipped.
    pub fn with_validators(validators: &[Validator]) -> Result<Self> {
        let set = Self::new();
        set.set(validators)?;
        Ok(set)
    }

    /// Add `weight` to `node_id`, inserting it if absent.
    pub fn add_weight(&self, node_id: NodeId, weight: u64) -> Result<()> {
        self.inner.write().add_weight(node_id, weight)
    }

    /// Remove up to `weight` from `node_id`. A validator whose weight reaches
    /// zero leaves the set. Unknown validators are ignored.
    pub fn remove_weight(&self, node_id: NodeId, weight: u64) {
        self.inner.write().remove_weight(node_id, weight)
    }

    pub fn get_weight(&self, node_id: &NodeId) -> Option<u64> {
        let inner = self.inner.read();
        inner
            .index
            .get(node_id)
            .map(|&i| inner.validators[i].weight)
    }

    /// Weight of `node_id`, or 0 if it is not a validator.
    pub fn weight_of(&self, node_id: &NodeId) -> u64 {
        self.get_weight(node_id).unwrap_or(0)
    }

    pub fn get_validator(&self, node_id: &NodeId) -> Option<Validator> {
        let inner = self.inner.read();
        inner.index.get(node_id).map(|&i| inner.validators[i])
    }

    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.inner.read().index.contains_key(node_id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Weight visible to sampling: the sum of all unmasked weights.
    pub fn total_weight(&self) -> u64 {
        self.inner.read().total_weight
    }

    /// Sum of every validator's weight, masked or not.
    pub fn total_stake(&self) -> u64 {
        self.inner.read().total_stake
    }

    /// Sum of the weights of `node_ids` that are validators.
    pub fn subset_weight<'a>(&self, node_ids: impl IntoIterator<Item = &'a NodeId>) -> u64 {
        let inner = self.inner.read();
        node_ids
            .into_iter()
            .filter_map(|id| inner.index.get(id))
            .map(|&i| inner.validators[i].weight)
            // A subset of the set cannot exceed `total_stake`.
            .sum()
    }

    /// Snapshot of the current members in storage order.
    pub fn list(&self) -> Vec<Validator> {
        self.inner.read().validators.clone()
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.inner
            .read()
            .validators
            .iter()
            .map(|v| v.node_id)
            .collect()
    }

    /// Hide `node_id` from sampling without touching membership.
    /// Returns false if it was already masked.
    pub fn mask(&self, node_id: NodeId) -> bool {
        let mut inner = self.inner.write();
        if !inner.masked.insert(node_id) {
            return false;
        }
        if let Some(i) = inner.index.get(&node_id).copied() {
            inner.total_weight -= inner.masked_weights[i];
            inner.masked_weights[i] = 0;
            inner.sampler_initialized = false;
        }
        true
    }

    /// Undo [`ValidatorSet::mask`]. Returns false if `node_id` was not masked.
    pub fn reveal(&self, node_id: NodeId) -> bool {
        let mut inner = self.inner.write();
        if !inner.masked.remove(&node_id) {
            return false;
        }
        if let Some(i) = inner.index.get(&node_id).copied() {
            let weight = inner.validators[i].weight;
            inner.masked_weights[i] = weight;
            inner.total_weight += weight;
            inner.sampler_initialized = false;
        }
        true
    }

    pub fn is_masked(&self, node_id: &NodeId) -> bool {
        self.inner.read().masked.contains(node_id)
    }

    /// Sample `size` validators with replacement, weighted by visible weight.
    pub fn sample(&self, size: usize) -> Result<Vec<Validator>> {
        if size == 0 {
            return Ok(Vec::new());
        }
        {
            let inner = self.inner.read();
            if inner.sampler_initialized {
                return inner.sample(size);
            }
        }
        let inner = self.inner.upgradable_read();
        let inner = if inner.sampler_initialized {
            RwLockUpgradableReadGuard::downgrade(inner)
        } else {
            let mut inner = RwLockUpgradableReadGuard::upgrade(inner);
            inner.rebuild_sampler();
            RwLockWriteGuard::downgrade(inner)
        };
        inner.sample(size)
    }

    /// Sample `size` distinct validators, weighted by visible weight.
    ///
    /// Each draw removes the winner from the candidate weights, so this costs
    /// `O(size · n)`; it is meant for small fan-outs.
    pub fn sample_unique(&self, size: usize) -> Result<Vec<Validator>> {
        self.sample_unique_inner(size, None)
    }

    /// [`ValidatorSet::sample_unique`] with `excluded` treated as masked.
    pub fn sample_unique_excluding(
        &self,
        size: usize,
        excluded: &NodeId,
    ) -> Result<Vec<Validator>> {
        self.sample_unique_inner(size, Some(excluded))
    }

    fn sample_unique_inner(
        &self,
        size: usize,
        excluded: Option<&NodeId>,
    ) -> Result<Vec<Validator>> {
        let inner = self.inner.read();
        let mut weights = inner.masked_weights.clone();
        if let Some(&i) = excluded.and_then(|node_id| inner.index.get(node_id)) {
            weights[i] = 0;
        }
        let available = weights.iter().filter(|w| **w > 0).count();
        if size > available {
            return Err(ValidatorError::InsufficientValidators {
                requested: size,
                available,
            });
        }
        let mut rng = rand::rng();
        let mut sampler = WeightedSampler::default();
        let mut sampled = Vec::with_capacity(size);
        for _ in 0..size {
            sampler.initialize(&weights);
            let i = sampler
                .sample(&mut rng)
                .ok_or(ValidatorError::InsufficientWeight { requested: size })?;
            sampled.push(inner.validators[i]);
            weights[i] = 0;
        }
        Ok(sampled)
    }

    /// Replace the membership with `validators`, emitting only the events
    /// needed to get from the current membership to the new one.
    ///
    /// The new list is validated before anything changes: a duplicate id or
    /// a total that overflows leaves the set untouched.
    pub fn set(&self, validators: &[Validator]) -> Result<()> {
        let mut target: HashMap<NodeId, u64> = HashMap::with_capacity(validators.len());
        let mut total = 0u64;
        for v in validators.iter().filter(|v| v.weight > 0) {
            if target.insert(v.node_id, v.weight).is_some() {
                return Err(ValidatorError::DuplicateValidator(v.node_id));
            }
            total = total
                .checked_add(v.weight)
                .ok_or(ValidatorError::WeightOverflow {
                    node_id: v.node_id,
                    weight: v.weight,
                })?;
        }

        let mut inner = self.inner.write();

        // Shrinking first keeps every intermediate total below the final one.
        let departing: Vec<NodeId> = inner
            .validators
            .iter()
            .filter(|v| !target.contains_key(&v.node_id))
            .map(|v| v.node_id)
            .collect();
        for node_id in departing {
            inner.remove_weight(node_id, u64::MAX);
        }
        let mut decreases = Vec::new();
        let mut increases = Vec::new();
        for v in validators.iter().filter(|v| v.weight > 0) {
            match inner.get_current_weight(&v.node_id) {
                Some(current) if current == v.weight => {}
                Some(current) if current > v.weight => decreases.push(*v),
                _ => increases.push(*v),
            }
        }
        for v in decreases.into_iter().chain(increases) {
            inner.set_weight(v.node_id, v.weight)?;
        }

        inner.maybe_shrink();
        Ok(())
    }

    /// Register `observer`. It first receives an `Added` event for every
    /// current member, then every later change until it is unregistered.
    pub fn register_observer(&self, observer: Arc<dyn ValidatorObserver>) -> ObserverId {
        let mut inner = self.inner.write();
        for v in &inner.validators {
            observer.on_event(&ValidatorEvent::Added {
                node_id: v.node_id,
                weight: v.weight,
            });
        }
        let id = ObserverId(inner.next_observer_id);
        inner.next_observer_id += 1;
        inner.observers.push((id, observer));
        id
    }

    /// Stop notifying the observer registered as `id`. Returns false if it
    /// was already gone.
    pub fn unregister_observer(&self, id: ObserverId) -> bool {
        let mut inner = self.inner.write();
        let before = inner.observers.len();
        inner.observers.retain(|(registered, _)| *registered != id);
        inner.observers.len() != before
    }

    pub fn observer_count(&self) -> usize {
        self.inner.read().observers.len()
    }

    /// Allocated capacity of the backing storage.
    pub fn capacity(&self) -> usize {
        self.inner.read().validators.capacity()
    }
}

impl SetInner {
    fn get_current_weight(&self, node_id: &NodeId) -> Option<u64> {
        self.index.get(node_id).map(|&i| self.validators[i].weight)
    }
}

impl std::fmt::Debug for ValidatorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("ValidatorSet")
            .field("len", &inner.validators.len())
            .field("total_weight", &inner.total_weight)
            .field("total_stake", &inner.total_stake)
            .finish()
    }
}
