//! Property-based tests for the weighted message throttler.
//!
//! Properties tested:
//! 1. Each pool's free and held bytes sum to its size, and held bytes match
//!    what is outstanding.
//! 2. No validator holds more of the validator pool than its allocation.
//! 3. Releasing everything that was admitted restores the initial pools.

#[cfg(test)]
mod tests {
    use {
        proptest::prelude::*,
        quorum_consensus_net::{MessageThrottler, ThrottlerConfig, WeightedThrottler},
        quorum_monitoring::NoopMetrics,
        quorum_types::NodeId,
        quorum_validators::ValidatorSet,
        std::sync::Arc,
    };

    const AT_LARGE: u64 = 1_000;
    const PER_VALIDATOR: u64 = 1_000;

    #[derive(Debug, Clone)]
    enum Step {
        /// Try to admit `size` bytes for node `node`.
        Acquire { node: usize, size: u64 },
        /// Release the admitted message at this index (modulo the count).
        Release(usize),
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            3 => (0..6usize, 1..400u64).prop_map(|(node, size)| Step::Acquire { node, size }),
            2 => any::<usize>().prop_map(Step::Release),
        ]
    }

    /// Four validators with the given weights plus two non-validators.
    fn setup(weights: &[u64]) -> (WeightedThrottler, Vec<NodeId>) {
        let nodes: Vec<NodeId> = (0..6).map(|_| NodeId::new_unique()).collect();
        let validators = Arc::new(ValidatorSet::new());
        for (node, weight) in nodes.iter().zip(weights) {
            validators.add_weight(*node, *weight).unwrap();
        }
        let throttler = WeightedThrottler::new(
            ThrottlerConfig {
                at_large_alloc_size: AT_LARGE,
                validator_alloc_size: PER_VALIDATOR,
            },
            validators,
            NoopMetrics::shared(),
        )
        .unwrap();
        (throttler, nodes)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(300))]

        #[test]
        fn bytes_are_conserved(
            weights in prop::collection::vec(1..100u64, 4),
            steps in prop::collection::vec(step(), 1..80),
        ) {
            let (throttler, nodes) = setup(&weights);
            let mut admitted: Vec<(NodeId, u64)> = Vec::new();

            for step in steps {
                match step {
                    Step::Acquire { node, size } => {
                        if throttler.try_acquire(size, &nodes[node]) {
                            admitted.push((nodes[node], size));
                        }
                    }
                    Step::Release(index) => {
                        if !admitted.is_empty() {
                            let (node, size) = admitted.swap_remove(index % admitted.len());
                            throttler.release(size, &node);
                        }
                    }
                }
                let state = throttler.state();
                let used: u64 = state.used_by_validator.values().sum();
                let outstanding: u64 = admitted.iter().map(|(_, size)| size).sum();
                prop_assert_eq!(state.total(), AT_LARGE + PER_VALIDATOR);
                prop_assert_eq!(state.remaining_at_large + state.at_large_in_flight, AT_LARGE);
                prop_assert_eq!(state.remaining_per_validator + used, PER_VALIDATOR);
                prop_assert_eq!(state.at_large_in_flight + used, outstanding);
                for (node, used) in &state.used_by_validator {
                    prop_assert!(*used <= throttler.allocation_for(node));
                }
            }

            for (node, size) in admitted {
                throttler.release(size, &node);
            }
            let state = throttler.state();
            prop_assert_eq!(state.remaining_at_large, AT_LARGE);
            prop_assert_eq!(state.at_large_in_flight, 0);
            prop_assert_eq!(state.remaining_per_validator, PER_VALIDATOR);
            prop_assert!(state.used_by_validator.is_empty());
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn non_validators_only_use_at_large_bytes(
            sizes in prop::collection::vec(1..300u64, 1..20),
        ) {
            let (throttler, nodes) = setup(&[10, 10, 10, 10]);
            // Nodes 4 and 5 carry no weight.
            let outsider = nodes[5];
            let mut admitted = 0u64;
            for size in sizes {
                if throttler.try_acquire(size, &outsider) {
                    admitted += size;
                }
            }
            let state = throttler.state();
            prop_assert_eq!(state.at_large_in_flight, admitted);
            prop_assert_eq!(state.remaining_per_validator, PER_VALIDATOR);
            prop_assert!(!state.used_by_validator.contains_key(&outsider));
        }
    }
}
