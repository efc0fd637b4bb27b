//! Generated instances are valid and round end to end.
#![allow(clippy::expect_used)]

use liquid_bench::{SizeTier, generate_instance};
use liquid_core::{MaxFlowSolver, Mechanism, RoundingConfig, check_delegations, get_delegations};

#[test]
fn generated_instances_validate() {
    for tier in [SizeTier::Small, SizeTier::Medium, SizeTier::Large] {
        for seed in [42, 123, 999] {
            let graph = generate_instance(&tier.config(seed));
            assert_eq!(
                graph.validate(),
                Ok(()),
                "{tier:?}/seed={seed} should be a valid instance"
            );
        }
    }
}

#[test]
fn small_instances_round_within_bound() {
    for seed in [1, 2, 3, 4, 5] {
        let graph = generate_instance(&SizeTier::Small.config(seed));
        for mechanism in Mechanism::ALL {
            let outcome = get_delegations(
                &graph,
                mechanism,
                &MaxFlowSolver::default(),
                &RoundingConfig::default(),
            )
            .expect("rounds");
            check_delegations(&graph, &outcome.delegations).expect("fits the instance");
            let bound = mechanism.approximation_factor(graph.node_count());
            assert!(
                outcome.approximation_ratio() <= bound + 1e-9,
                "{mechanism}/seed={seed}: ratio {} above {bound}",
                outcome.approximation_ratio()
            );
        }
    }
}
