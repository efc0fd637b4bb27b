//! The two rounding mechanisms and the end-to-end entry point.
//!
//! [`get_delegations`] validates an instance, asks a
//! [`FractionalFlowSolver`] for a splittable flow, rounds it with the chosen
//! [`Mechanism`], and checks the result before handing it back. The whole
//! pipeline runs against one deadline taken from the configuration.
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{Deadline, RoundingConfig};
use crate::error::RoundingError;
use crate::fractional::{FractionalFlow, FractionalFlowSolver};
use crate::graph::DelegationGraph;
use crate::rebalance::WaterFillingRebalancer;
use crate::rounding::{GreedyMerge, RoundingEngine, RoundingResult, RoundingStats, SccRebalance};
use crate::weights::{check_delegations, max_weight};

// ---------------------------------------------------------------------------
// Mechanism
// ---------------------------------------------------------------------------

/// A confluent rounding mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mechanism {
    /// Greedy sink merging; maximum weight within `1 + log₂ n` of the
    /// fractional optimum.
    OnePlusLogTwo,
    /// Sink-component rebalancing; maximum weight within `1 + ln n` of the
    /// fractional optimum.
    #[default]
    OnePlusLn,
}

impl Mechanism {
    /// Every mechanism, in a stable order.
    pub const ALL: [Self; 2] = [Self::OnePlusLogTwo, Self::OnePlusLn];

    /// Stable machine-readable name.
    pub fn name(self) -> &'static str {
        match self {
            Self::OnePlusLogTwo => "one-plus-log-two",
            Self::OnePlusLn => "one-plus-ln",
        }
    }

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Self::OnePlusLogTwo => "(1 + log2 |V|)-approximation",
            Self::OnePlusLn => "(1 + ln |V|)-approximation",
        }
    }

    /// Worst-case ratio between the rounded maximum weight and the
    /// fractional congestion on an instance with `node_count` nodes.
    pub fn approximation_factor(self, node_count: usize) -> f64 {
        let n = node_count.max(1) as f64;
        match self {
            Self::OnePlusLogTwo => 1.0 + n.log2(),
            Self::OnePlusLn => 1.0 + n.ln(),
        }
    }

    /// Rounds `flow` with this mechanism's engine.
    ///
    /// # Errors
    ///
    /// See [`RoundingEngine::round`].
    pub fn round(
        self,
        graph: &DelegationGraph,
        flow: &FractionalFlow,
        config: &RoundingConfig,
        deadline: &Deadline,
    ) -> Result<RoundingResult, RoundingError> {
        match self {
            Self::OnePlusLogTwo => {
                RoundingEngine::new(GreedyMerge, config.clone()).round(graph, flow, deadline)
            }
            Self::OnePlusLn => RoundingEngine::new(
                SccRebalance::new(WaterFillingRebalancer::from_config(config)),
                config.clone(),
            )
            .round(graph, flow, deadline),
        }
    }
}

impl fmt::Display for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// get_delegations
// ---------------------------------------------------------------------------

/// Everything one end-to-end rounding run produces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundingOutcome {
    /// The mechanism that produced the delegations.
    pub mechanism: Mechanism,
    /// Per node, the chosen delegate; `None` for voters.
    pub delegations: Vec<Option<usize>>,
    /// Largest number of nodes resolving to one voter.
    pub max_weight: usize,
    /// Maximum voter load of the fractional flow that was rounded.
    pub fractional_congestion: f64,
    /// Counters of the rounding run.
    pub stats: RoundingStats,
}

impl RoundingOutcome {
    /// Rounded maximum weight over fractional congestion; `1.0` when the
    /// congestion is zero.
    pub fn approximation_ratio(&self) -> f64 {
        if self.fractional_congestion > 0.0 {
            self.max_weight as f64 / self.fractional_congestion
        } else {
            1.0
        }
    }
}

/// Computes a confluent delegation for `graph` with `mechanism`.
///
/// The deadline derived from `config.time_limit` covers validation, the
/// fractional solve, and rounding.
///
/// # Errors
///
/// - [`RoundingError::InvalidInput`] if `graph` fails validation.
/// - [`RoundingError::SolverFailure`] if `solver` or the rebalancer fails.
/// - [`RoundingError::TimedOut`] if the deadline expires anywhere.
/// - [`RoundingError::InternalInvariantViolation`] if rounding breaks an
///   invariant or produces a delegation that does not fit `graph`.
pub fn get_delegations<S>(
    graph: &DelegationGraph,
    mechanism: Mechanism,
    solver: &S,
    config: &RoundingConfig,
) -> Result<RoundingOutcome, RoundingError>
where
    S: FractionalFlowSolver + ?Sized,
{
    let deadline = config.deadline();
    graph.validate()?;
    deadline.check()?;

    let flow = solver.solve(graph, &deadline)?;
    debug!(congestion = flow.congestion, "fractional flow solved");

    let result = mechanism.round(graph, &flow, config, &deadline)?;
    check_delegations(graph, &result.delegations)
        .and_then(|()| max_weight(&result.delegations))
        .map_err(|err| RoundingError::invariant(format!("rounded delegation is unusable: {err}")))
        .map(|weight| {
            info!(
                %mechanism,
                nodes = graph.node_count(),
                max_weight = weight,
                congestion = flow.congestion,
                iterations = result.stats.iterations,
                "rounded delegations"
            );
            RoundingOutcome {
                mechanism,
                delegations: result.delegations,
                max_weight: weight,
                fractional_congestion: flow.congestion,
                stats: result.stats,
            }
        })
}
