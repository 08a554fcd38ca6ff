//! Property-based tests for the per-chain benchlist.
//!
//! Properties tested:
//! 1. Benched weight never exceeds `max_portion` of the chain's total stake,
//!    including after validator weights change.
//! 2. Only current validators are ever benched.
//! 3. A response clears a failure streak: a validator below the threshold is
//!    not benched by a single further failure.

#[cfg(test)]
mod tests {
    use {
        proptest::prelude::*,
        quorum_consensus_net::{
            benchlist::NoopBenchable, Benchlist, BenchlistConfig, ChainBenchlist,
        },
        quorum_monitoring::NoopMetrics,
        quorum_types::{Clock, Id, NodeId},
        quorum_validators::ValidatorSet,
        std::{
            sync::Arc,
            time::{Duration, Instant},
        },
    };

    const MAX_PORTION: f64 = 0.2;
    const NODES: usize = 8;

    #[derive(Debug, Clone)]
    enum Step {
        Fail(usize),
        Respond(usize),
        Advance(u64),
        AddWeight(usize, u64),
        RemoveWeight(usize, u64),
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            6 => (0..NODES).prop_map(Step::Fail),
            2 => (0..NODES).prop_map(Step::Respond),
            1 => (1..30u64).prop_map(Step::Advance),
            1 => (0..NODES, 1..40u64).prop_map(|(node, weight)| Step::AddWeight(node, weight)),
            1 => (0..NODES, 1..40u64).prop_map(|(node, weight)| Step::RemoveWeight(node, weight)),
        ]
    }

    fn setup(
        weights: &[u64],
        threshold: usize,
    ) -> (Arc<ChainBenchlist>, Arc<ValidatorSet>, Clock, Vec<NodeId>) {
        let nodes: Vec<NodeId> = (0..NODES).map(|_| NodeId::new_unique()).collect();
        let validators = Arc::new(ValidatorSet::new());
        for (node, weight) in nodes.iter().zip(weights) {
            validators.add_weight(*node, *weight).unwrap();
        }
        let clock = Clock::mock(Instant::now());
        let benchlist = ChainBenchlist::new(
            Id::new_unique(),
            BenchlistConfig {
                threshold,
                minimum_failing_duration: Duration::ZERO,
                duration: Duration::from_secs(60),
                max_portion: MAX_PORTION,
            },
            &validators,
            Arc::new(NoopBenchable),
            clock.clone(),
            NoopMetrics::shared(),
        )
        .unwrap();
        (benchlist, validators, clock, nodes)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(300))]

        #[test]
        fn benched_weight_stays_within_allowance(
            weights in prop::collection::vec(1..40u64, NODES),
            steps in prop::collection::vec(step(), 1..120),
        ) {
            let (benchlist, validators, clock, nodes) = setup(&weights, 1);

            for step in steps {
                match step {
                    Step::Fail(i) => benchlist.register_failure(&nodes[i]),
                    Step::Respond(i) => benchlist.register_response(&nodes[i]),
                    Step::Advance(secs) => clock.advance(Duration::from_secs(secs)),
                    Step::AddWeight(i, weight) => validators.add_weight(nodes[i], weight).unwrap(),
                    Step::RemoveWeight(i, weight) => validators.remove_weight(nodes[i], weight),
                }

                let allowance = validators.total_stake() as f64 * MAX_PORTION;
                prop_assert!(
                    benchlist.benched_weight() as f64 <= allowance,
                    "benched {} over allowance {}",
                    benchlist.benched_weight(),
                    allowance
                );
                for node in benchlist.benched() {
                    prop_assert!(validators.contains(&node));
                    prop_assert!(benchlist.is_benched(&node));
                }
            }
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn response_resets_the_failure_streak(
            threshold in 2..6usize,
            failures_before in 1..6usize,
        ) {
            // Equal weights, so any single validator fits the allowance.
            let (benchlist, _validators, _clock, nodes) = setup(&[10; NODES], threshold);
            let node = nodes[0];

            for _ in 0..failures_before.min(threshold - 1) {
                benchlist.register_failure(&node);
            }
            benchlist.register_response(&node);
            benchlist.register_failure(&node);
            prop_assert!(!benchlist.is_benched(&node));

            for _ in 1..threshold {
                benchlist.register_failure(&node);
            }
            prop_assert!(benchlist.is_benched(&node));
        }
    }
}
