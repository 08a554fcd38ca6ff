//! Property-based tests for validator set bookkeeping.
//!
//! Properties tested:
//! 1. Weights, membership, total stake and visible weight match a simple model
//!    after any sequence of add, remove, mask and reveal.
//! 2. Masking then revealing a node leaves the visible weight unchanged.
//! 3. Sampling never returns a masked validator.

#[cfg(test)]
mod tests {
    use {
        proptest::prelude::*,
        quorum_types::NodeId,
        quorum_validators::ValidatorSet,
        std::collections::{HashMap, HashSet},
    };

    const NODES: usize = 6;

    #[derive(Debug, Clone)]
    enum Step {
        Add(usize, u64),
        Remove(usize, u64),
        Mask(usize),
        Reveal(usize),
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            4 => (0..NODES, 0..100u64).prop_map(|(node, weight)| Step::Add(node, weight)),
            2 => (0..NODES, 0..150u64).prop_map(|(node, weight)| Step::Remove(node, weight)),
            1 => (0..NODES).prop_map(Step::Mask),
            1 => (0..NODES).prop_map(Step::Reveal),
        ]
    }

    #[derive(Default)]
    struct Model {
        weights: HashMap<NodeId, u64>,
        masked: HashSet<NodeId>,
    }

    impl Model {
        fn apply(&mut self, set: &ValidatorSet, nodes: &[NodeId], step: &Step) -> bool {
            match *step {
                Step::Add(i, weight) => {
                    set.add_weight(nodes[i], weight).unwrap();
                    if weight > 0 {
                        *self.weights.entry(nodes[i]).or_default() += weight;
                    }
                    true
                }
                Step::Remove(i, weight) => {
                    set.remove_weight(nodes[i], weight);
                    if let Some(current) = self.weights.get_mut(&nodes[i]) {
                        *current -= weight.min(*current);
                        if *current == 0 {
                            self.weights.remove(&nodes[i]);
                        }
                    }
                    true
                }
                Step::Mask(i) => set.mask(nodes[i]) == self.masked.insert(nodes[i]),
                Step::Reveal(i) => set.reveal(nodes[i]) == self.masked.remove(&nodes[i]),
            }
        }

        fn total_stake(&self) -> u64 {
            self.weights.values().sum()
        }

        fn total_weight(&self) -> u64 {
            self.weights
                .iter()
                .filter(|(node, _)| !self.masked.contains(node))
                .map(|(_, weight)| weight)
                .sum()
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(300))]

        #[test]
        fn set_matches_model(steps in prop::collection::vec(step(), 1..100)) {
            let nodes: Vec<NodeId> = (0..NODES).map(|_| NodeId::new_unique()).collect();
            let set = ValidatorSet::new();
            let mut model = Model::default();

            for step in &steps {
                prop_assert!(model.apply(&set, &nodes, step), "mask result differs at {:?}", step);
                prop_assert_eq!(set.total_stake(), model.total_stake());
                prop_assert_eq!(set.total_weight(), model.total_weight());
                prop_assert_eq!(set.len(), model.weights.len());
                for node in &nodes {
                    prop_assert_eq!(set.get_weight(node), model.weights.get(node).copied());
                    prop_assert_eq!(set.is_masked(node), model.masked.contains(node));
                }
            }
        }

        #[test]
        fn mask_then_reveal_restores_weight(
            weights in prop::collection::vec(1..1_000u64, 1..NODES),
            pick in any::<prop::sample::Index>(),
        ) {
            let nodes: Vec<NodeId> = weights.iter().map(|_| NodeId::new_unique()).collect();
            let set = ValidatorSet::new();
            for (node, weight) in nodes.iter().zip(&weights) {
                set.add_weight(*node, *weight).unwrap();
            }
            let before = set.total_weight();
            let node = nodes[pick.index(nodes.len())];

            prop_assert!(set.mask(node));
            prop_assert_eq!(set.total_weight(), before - set.weight_of(&node));
            prop_assert_eq!(set.total_stake(), before);
            prop_assert!(set.reveal(node));
            prop_assert_eq!(set.total_weight(), before);
        }

        #[test]
        fn sampling_skips_masked_validators(
            weights in prop::collection::vec(1..1_000u64, 2..NODES),
            pick in any::<prop::sample::Index>(),
        ) {
            let nodes: Vec<NodeId> = weights.iter().map(|_| NodeId::new_unique()).collect();
            let set = ValidatorSet::new();
            for (node, weight) in nodes.iter().zip(&weights) {
                set.add_weight(*node, *weight).unwrap();
            }
            let masked = nodes[pick.index(nodes.len())];
            set.mask(masked);

            let sampled = set.sample(32).unwrap();
            prop_assert_eq!(sampled.len(), 32);
            prop_assert!(sampled.iter().all(|validator| validator.node_id != masked));
        }
    }
}
