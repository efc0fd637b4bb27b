#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod config;
pub mod error;
pub mod flow;
pub mod fractional;
pub mod graph;
pub mod mechanism;
pub mod rebalance;
pub mod rounding;
pub mod weights;

#[cfg(test)]
mod test_helpers;

pub use config::{DEFAULT_EPSILON, Deadline, RoundingConfig};
pub use error::{InputError, RoundingError};
pub use flow::{FlowState, InflowSummary, Successors};
pub use fractional::{FixedFlow, FractionalFlow, FractionalFlowSolver, MaxFlowSolver};
pub use graph::{DelegationGraph, detect_cycle_longer_than_two, sink_strongly_connected_component};
pub use mechanism::{Mechanism, RoundingOutcome, get_delegations};
pub use rebalance::{FrontierNode, RebalanceProblem, Rebalancer, WaterFillingRebalancer};
pub use rounding::{
    GreedyMerge, RoundingEngine, RoundingResult, RoundingStats, RoundingStep, SccRebalance,
    SinkDeactivation,
};
pub use weights::{check_delegations, max_weight, voter_weights};

/// Returns the current version of the liquid-core library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;

    #[test]
    fn version_is_semver() {
        let v = version();
        let parts: Vec<&str> = v.split('.').collect();
        assert_eq!(parts.len(), 3, "version should have 3 parts: {v}");
        for part in parts {
            part.parse::<u32>().expect("each part should be a number");
        }
    }
}
