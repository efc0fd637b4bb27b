//! Confluent rounding of a splittable delegation flow.
//!
//! [`RoundingEngine`] owns one [`FlowState`] per call and rewrites it until
//! no node has outgoing flow. Every iteration applies the first rule that
//! fits, in this order:
//!
//! 1. [`aggregation`] contracts a delegator whose only successor is a voter.
//! 2. [`sawtooth`] breaks an alternating cycle of the doubled graph.
//! 3. A [`SinkDeactivation`] rule removes arcs around the sinks.
//!
//! Each step strictly decreases `arcs + active sinks`; the engine checks
//! this after every iteration. Once the flow is empty, [`reconstruct`]
//! turns the recorded transitive delegations into one delegate per node.
//!
//! The two approximation variants differ only in the deactivation rule:
//! [`GreedyMerge`] for the `1 + log₂ n` mechanism and [`SccRebalance`] for
//! the `1 + ln n` mechanism.
pub mod aggregation;
pub mod deactivation;
pub mod reconstruct;
pub mod sawtooth;


pub use deactivation::{GreedyMerge, SccRebalance, SinkDeactivation};

use serde::Serialize;
use tracing::{debug, error, trace};

use crate::config::{Deadline, RoundingConfig};
use crate::error::RoundingError;
use crate::flow::FlowState;
use crate::fractional::FractionalFlow;
use crate::graph::DelegationGraph;

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Counters describing one rounding run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RoundingStats {
    /// Engine iterations.
    pub iterations: usize,
    /// Delegators contracted into a voter.
    pub aggregations: usize,
    /// Sawtooth cycles broken.
    pub cycles_broken: usize,
    /// Sink deactivation steps.
    pub deactivations: usize,
    /// Improved deactivations whose first rebalancing deleted no arc.
    pub rebalance_fallbacks: usize,
}

/// The rule applied in one engine iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundingStep {
    /// A delegator was contracted into its only successor.
    Aggregation,
    /// An alternating cycle was broken.
    CycleBreaking,
    /// The sink deactivation rule ran.
    Deactivation,
}

/// A confluent delegation: one delegate per delegator, `None` for voters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundingResult {
    /// Per node, the chosen delegate.
    pub delegations: Vec<Option<usize>>,
    /// Counters of the run.
    pub stats: RoundingStats,
}

// ---------------------------------------------------------------------------
// RoundingEngine
// ---------------------------------------------------------------------------

/// Rounds fractional flows with a fixed sink deactivation rule.
#[derive(Debug, Clone)]
pub struct RoundingEngine<D> {
    deactivation: D,
    config: RoundingConfig,
}

impl<D: SinkDeactivation> RoundingEngine<D> {
    /// Creates an engine using `deactivation` when no other rule applies.
    pub fn new(deactivation: D, config: RoundingConfig) -> Self {
        Self {
            deactivation,
            config,
        }
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &RoundingConfig {
        &self.config
    }

    /// Rounds `flow`, computed for `graph`, to a confluent delegation.
    ///
    /// # Errors
    ///
    /// - [`RoundingError::InvalidInput`] if `graph` fails validation or
    ///   `flow` does not fit it.
    /// - [`RoundingError::TimedOut`] once `deadline` expires.
    /// - [`RoundingError::InternalInvariantViolation`] if an iteration
    ///   makes no progress, no rule applies, or the iteration cap is hit.
    /// - Rebalancer errors from the deactivation rule.
    pub fn round(
        &self,
        graph: &DelegationGraph,
        flow: &FractionalFlow,
        deadline: &Deadline,
    ) -> Result<RoundingResult, RoundingError> {
        graph.validate()?;
        let mut state = FlowState::from_fractional(graph, flow, self.config.epsilon)?;
        let mut stats = RoundingStats::default();
        let mut measure = state.progress_measure();
        debug!(
            nodes = state.node_count(),
            arcs = state.arc_count(),
            rule = self.deactivation.name(),
            "rounding started"
        );

        while !state.is_resolved() {
            deadline.check()?;
            if let Some(limit) = self
                .config
                .max_iterations
                .filter(|&limit| stats.iterations >= limit)
            {
                return Err(fatal(
                    &state,
                    RoundingError::invariant(format!("no result after {limit} iterations")),
                ));
            }
            stats.iterations += 1;

            let step = self
                .step(&mut state, deadline, &mut stats)
                .map_err(|err| match err {
                    RoundingError::InternalInvariantViolation { .. } => fatal(&state, err),
                    RoundingError::InvalidInput(_)
                    | RoundingError::SolverFailure { .. }
                    | RoundingError::TimedOut { .. } => err,
                })?;

            let next = state.progress_measure();
            if next >= measure {
                return Err(fatal(
                    &state,
                    RoundingError::invariant(format!(
                        "{step:?} step left the progress measure at {next} (was {measure})"
                    )),
                ));
            }
            trace!(iteration = stats.iterations, ?step, measure = next, "engine step");
            measure = next;
        }

        if state.total_demand() != graph.node_count() {
            return Err(fatal(
                &state,
                RoundingError::invariant(format!(
                    "total demand {} differs from node count {}",
                    state.total_demand(),
                    graph.node_count()
                )),
            ));
        }

        let delegations =
            reconstruct::delegations_from_transitive(graph, state.transitive_delegations())?;
        debug!(
            iterations = stats.iterations,
            aggregations = stats.aggregations,
            cycles_broken = stats.cycles_broken,
            deactivations = stats.deactivations,
            "rounding finished"
        );
        Ok(RoundingResult { delegations, stats })
    }

    /// Applies the first rule that fits.
    fn step(
        &self,
        state: &mut FlowState,
        deadline: &Deadline,
        stats: &mut RoundingStats,
    ) -> Result<RoundingStep, RoundingError> {
        if let Some((node, voter)) = aggregation::aggregate_one(state)? {
            stats.aggregations += 1;
            debug!(node, voter, "aggregated delegator");
            return Ok(RoundingStep::Aggregation);
        }
        if sawtooth::break_one_cycle(state)?.is_some() {
            stats.cycles_broken += 1;
            debug!(arcs = state.arc_count(), "broke sawtooth cycle");
            return Ok(RoundingStep::CycleBreaking);
        }
        self.deactivation.deactivate(state, deadline, stats)?;
        stats.deactivations += 1;
        debug!(
            arcs = state.arc_count(),
            active_sinks = state.active_sink_count(),
            rule = self.deactivation.name(),
            "deactivated sink"
        );
        Ok(RoundingStep::Deactivation)
    }
}

/// Logs the full state next to a fatal error and hands the error back.
fn fatal(state: &FlowState, err: RoundingError) -> RoundingError {
    error!(?state, %err, "rounding engine invariant violated");
    err
}
