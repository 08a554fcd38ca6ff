//! Validator records and membership change events.

use quorum_types::NodeId;

/// A validator with its stake-derived weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validator {
    pub node_id: NodeId,
    pub weight: u64,
}

impl Validator {
    pub fn new(node_id: NodeId, weight: u64) -> Self {
        Self { node_id, weight }
    }
}

/// A membership change, delivered to observers in mutation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidatorEvent {
    Added {
        node_id: NodeId,
        weight: u64,
    },
    Removed {
        node_id: NodeId,
        weight: u64,
    },
    WeightChanged {
        node_id: NodeId,
        old_weight: u64,
        new_weight: u64,
    },
}

impl ValidatorEvent {
    pub fn node_id(&self) -> NodeId {
        match self {
            ValidatorEvent::Added { node_id, .. }
            | ValidatorEvent::Removed { node_id, .. }
            | ValidatorEvent::WeightChanged { node_id, .. } => *node_id,
        }
    }
}

/// Handle returned by [`crate::ValidatorSet::register_observer`], used to
/// unregister the observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub(crate) u64);

/// Receives [`ValidatorEvent`]s from a set.
///
/// Events are delivered synchronously while the set is locked: an observer
/// must not call back into the set that notifies it.
pub trait ValidatorObserver: Send + Sync {
    fn on_event(&self, event: &ValidatorEvent);
}

impl<F> ValidatorObserver for F
where
    F: Fn(&ValidatorEvent) + Send + Sync,
{
    fn on_event(&self, event: &ValidatorEvent) {
        self(event)
    }
}
