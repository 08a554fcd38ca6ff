//! Per-subnet validator sets.
//!
//! The [`ValidatorManager`] is constructed once per node and shared by handle.
//! A subnet's set is created on first use and kept for the manager's lifetime,
//! so components holding the `Arc<ValidatorSet>` always see later changes.

use {
    crate::{
        error::{Result, ValidatorError},
        set::ValidatorSet,
        validator::{ObserverId, Validator, ValidatorObserver},
    },
    log::{debug, info},
    parking_lot::RwLock,
    quorum_types::{NodeId, SubnetId},
    std::{collections::HashMap, sync::Arc},
};

#[derive(Default)]
pub struct ValidatorManager {
    inner: RwLock<ManagerInner>,
}

#[derive(Default)]
struct ManagerInner {
    subnets: HashMap<SubnetId, Arc<ValidatorSet>>,
}

impl ManagerInner {
    fn get_or_create(&mut self, subnet_id: SubnetId) -> Arc<ValidatorSet> {
        self.subnets
            .entry(subnet_id)
            .or_insert_with(|| {
                debug!("creating validator set for subnet {}", subnet_id);
                Arc::new(ValidatorSet::new())
            })
            .clone()
    }
}

impl ValidatorManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new validator. Fails if it is already a member of the subnet.
    pub fn add_staker(&self, subnet_id: SubnetId, node_id: NodeId, weight: u64) -> Result<()> {
        if weight == 0 {
            return Err(ValidatorError::ZeroWeight(node_id));
        }
        let mut inner = self.inner.write();
        let set = inner.get_or_create(subnet_id);
        if set.contains(&node_id) {
            return Err(ValidatorError::DuplicateValidator(node_id));
        }
        set.add_weight(node_id, weight)?;
        info!(
            "added validator {} to subnet {} with weight {}",
            node_id, subnet_id, weight
        );
        Ok(())
    }

    pub fn add_weight(&self, subnet_id: SubnetId, node_id: NodeId, weight: u64) -> Result<()> {
        if weight == 0 {
            return Ok(());
        }
        let mut inner = self.inner.write();
        inner.get_or_create(subnet_id).add_weight(node_id, weight)
    }

    pub fn remove_weight(&self, subnet_id: SubnetId, node_id: NodeId, weight: u64) {
        if let Some(set) = self.get_set(&subnet_id) {
            set.remove_weight(node_id, weight);
        }
    }

    /// The subnet's set, if the subnet has ever been used.
    pub fn get_set(&self, subnet_id: &SubnetId) -> Option<Arc<ValidatorSet>> {
        self.inner.read().subnets.get(subnet_id).cloned()
    }

    /// The subnet's set, created empty if the subnet is new.
    pub fn get_or_create_set(&self, subnet_id: SubnetId) -> Arc<ValidatorSet> {
        if let Some(set) = self.get_set(&subnet_id) {
            return set;
        }
        self.inner.write().get_or_create(subnet_id)
    }

    pub fn get_weight(&self, subnet_id: &SubnetId, node_id: &NodeId) -> Option<u64> {
        self.get_set(subnet_id)?.get_weight(node_id)
    }

    pub fn contains(&self, subnet_id: &SubnetId, node_id: &NodeId) -> bool {
        self.get_set(subnet_id)
            .is_some_and(|set| set.contains(node_id))
    }

    pub fn count(&self, subnet_id: &SubnetId) -> usize {
        self.get_set(subnet_id).map_or(0, |set| set.len())
    }

    pub fn total_weight(&self, subnet_id: &SubnetId) -> u64 {
        self.get_set(subnet_id).map_or(0, |set| set.total_weight())
    }

    pub fn subset_weight<'a>(
        &self,
        subnet_id: &SubnetId,
        node_ids: impl IntoIterator<Item = &'a NodeId>,
    ) -> u64 {
        self.get_set(subnet_id)
            .map_or(0, |set| set.subset_weight(node_ids))
    }

    pub fn sample(&self, subnet_id: &SubnetId, size: usize) -> Result<Vec<Validator>> {
        match self.get_set(subnet_id) {
            Some(set) => set.sample(size),
            None if size == 0 => Ok(Vec::new()),
            None => Err(ValidatorError::UnknownSubnet(*subnet_id)),
        }
    }

    /// Register `observer` with the subnet's set, creating the set if needed.
    pub fn register_callback_listener(
        &self,
        subnet_id: SubnetId,
        observer: Arc<dyn ValidatorObserver>,
    ) -> ObserverId {
        self.get_or_create_set(subnet_id).register_observer(observer)
    }
}

impl std::fmt::Debug for ValidatorManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatorManager")
            .field("subnets", &self.inner.read().subnets.len())
            .finish()
    }
}
