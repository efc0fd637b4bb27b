//! Sink deactivation rules.
//!
//! Deactivation runs only when neither aggregation nor cycle breaking
//! applies. Each rule removes at least one flow arc, so the engine's
//! progress measure keeps falling.
//!
//! - [`GreedyMerge`] merges one arc of a delegator that splits between a
//!   single-predecessor voter and another voter.
//! - [`SccRebalance`] rebalances a whole sink component of the doubled
//!   graph and, if that deletes nothing, drains its lightest sink.
use std::collections::BTreeMap;

use tracing::{trace, warn};

use crate::config::Deadline;
use crate::error::RoundingError;
use crate::flow::FlowState;
use crate::graph::sink_strongly_connected_component;
use crate::rebalance::{FrontierNode, RebalanceProblem, Rebalancer, WaterFillingRebalancer};

use super::RoundingStats;

/// One sink deactivation rule of the rounding engine.
pub trait SinkDeactivation {
    /// Short name used in logs and reports.
    fn name(&self) -> &'static str;

    /// Removes at least one arc from `state`.
    ///
    /// # Errors
    ///
    /// - [`RoundingError::InternalInvariantViolation`] if the state offers
    ///   nothing to deactivate although flow remains.
    /// - Errors of the rebalancing capability, where one is used.
    fn deactivate(
        &self,
        state: &mut FlowState,
        deadline: &Deadline,
        stats: &mut RoundingStats,
    ) -> Result<(), RoundingError>;
}

// ---------------------------------------------------------------------------
// GreedyMerge
// ---------------------------------------------------------------------------

/// Basic deactivation: merges the lighter of two voter arcs of one
/// delegator.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyMerge;

impl SinkDeactivation for GreedyMerge {
    fn name(&self) -> &'static str {
        "greedy-merge"
    }

    fn deactivate(
        &self,
        state: &mut FlowState,
        _deadline: &Deadline,
        _stats: &mut RoundingStats,
    ) -> Result<(), RoundingError> {
        let summary = state.inflow_summary();

        // First voter, in index order, fed by exactly one delegator that
        // also feeds another voter.
        let sink = (0..state.node_count())
            .find(|&node| {
                state.is_voter(node)
                    && matches!(
                        summary.predecessors[node].as_slice(),
                        [pred] if summary.voter_successors[*pred] >= 2
                    )
            })
            .ok_or_else(|| {
                RoundingError::invariant("no voter has a single predecessor splitting between voters")
            })?;
        let pred = summary.predecessors[sink][0];

        let (other, moved) = state
            .successors(pred)
            .iter()
            .find(|&(&succ, _)| succ != sink && state.is_voter(succ))
            .map(|(&succ, &value)| (succ, value))
            .ok_or_else(|| {
                RoundingError::invariant(format!("delegator {pred} has no second voter successor"))
            })?;

        let sink_load = state.demand(sink) as f64 + summary.inflow[sink] + moved;
        let other_load = state.demand(other) as f64 + summary.inflow[other] - moved;
        if sink_load < other_load {
            state.merge_arc(pred, other, sink)?;
            trace!(pred, loser = other, winner = sink, "merged voter arc");
        } else {
            state.merge_arc(pred, sink, other)?;
            trace!(pred, loser = sink, winner = other, "merged voter arc");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SccRebalance
// ---------------------------------------------------------------------------

/// Improved deactivation: rebalances a sink component of the doubled graph.
#[derive(Debug, Clone, Default)]
pub struct SccRebalance<R = WaterFillingRebalancer> {
    rebalancer: R,
}

impl<R: Rebalancer> SccRebalance<R> {
    /// Uses `rebalancer` for the convex rebalancing step.
    pub fn new(rebalancer: R) -> Self {
        Self { rebalancer }
    }

    /// Rebalances the flow of `frontier` into `sinks` and writes the result
    /// back. Arcs of the frontier into other nodes keep their value. Returns
    /// whether any arc dropped to zero and was deleted.
    fn rebalance(
        &self,
        state: &mut FlowState,
        sinks: &[usize],
        frontier: &[usize],
        deadline: &Deadline,
    ) -> Result<bool, RoundingError> {
        let problem = RebalanceProblem {
            sinks: sinks.to_vec(),
            sink_demands: sinks.iter().map(|&sink| state.demand(sink) as f64).collect(),
            frontier: frontier
                .iter()
                .filter_map(|&node| {
                    let arcs: Vec<(usize, f64)> = state
                        .successors(node)
                        .iter()
                        .filter(|&(succ, _)| sinks.contains(succ))
                        .map(|(&succ, &value)| (succ, value))
                        .collect();
                    (!arcs.is_empty()).then_some(FrontierNode { node, arcs })
                })
                .collect(),
        };
        let solution = self.rebalancer.rebalance(&problem, deadline)?;
        if solution.len() != problem.frontier.len() {
            return Err(RoundingError::solver(
                "rebalancer",
                format!(
                    "returned {} rows for {} frontier nodes",
                    solution.len(),
                    problem.frontier.len()
                ),
            ));
        }

        let epsilon = state.epsilon();
        let mut deleted = false;
        for (entry, values) in problem.frontier.iter().zip(solution) {
            if values.len() != entry.arcs.len() {
                return Err(RoundingError::solver(
                    "rebalancer",
                    format!("wrong arc count for frontier node {}", entry.node),
                ));
            }
            for (&(sink, _), value) in entry.arcs.iter().zip(values) {
                if value.is_nan() || value <= epsilon {
                    deleted = true;
                    trace!(from = entry.node, to = sink, "rebalancing drained arc");
                }
                state.set_flow(entry.node, sink, value);
            }
            if state.successors(entry.node).is_empty() {
                return Err(RoundingError::invariant(format!(
                    "rebalancing left frontier node {} without flow",
                    entry.node
                )));
            }
        }
        Ok(deleted)
    }
}

impl<R: Rebalancer> SinkDeactivation for SccRebalance<R> {
    fn name(&self) -> &'static str {
        "scc-rebalance"
    }

    fn deactivate(
        &self,
        state: &mut FlowState,
        deadline: &Deadline,
        stats: &mut RoundingStats,
    ) -> Result<(), RoundingError> {
        let component = sink_strongly_connected_component(&state.doubled_graph())
            .ok_or_else(|| RoundingError::invariant("doubled graph has no sink component"))?;
        let (sinks, frontier): (Vec<usize>, Vec<usize>) =
            component.iter().partition(|&&node| state.is_voter(node));
        if sinks.is_empty() || frontier.is_empty() {
            return Err(RoundingError::invariant(format!(
                "sink component {component:?} lacks voters or delegators"
            )));
        }
        trace!(?sinks, ?frontier, "rebalancing sink component");

        if self.rebalance(state, &sinks, &frontier, deadline)? {
            return Ok(());
        }

        stats.rebalance_fallbacks += 1;
        warn!(
            sinks = sinks.len(),
            frontier = frontier.len(),
            "rebalancing deleted no arc; draining the lightest sink"
        );

        let mut inflow: BTreeMap<usize, f64> = sinks.iter().map(|&sink| (sink, 0.0)).collect();
        let mut predecessors: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for &node in &frontier {
            for (&succ, &value) in state.successors(node) {
                if let Some(total) = inflow.get_mut(&succ) {
                    *total += value;
                    predecessors.entry(succ).or_default().push(node);
                }
            }
        }

        let mut lightest = sinks[0];
        for &sink in &sinks[1..] {
            if inflow[&sink] < inflow[&lightest] {
                lightest = sink;
            }
        }

        for pred in predecessors.remove(&lightest).unwrap_or_default() {
            // Prefer another sink of the component; any other successor will do.
            let successors = state.successors(pred);
            let alternative = successors
                .keys()
                .copied()
                .find(|&succ| succ != lightest && inflow.contains_key(&succ))
                .or_else(|| successors.keys().copied().find(|&succ| succ != lightest))
                .ok_or_else(|| {
                    RoundingError::invariant(format!(
                        "frontier node {pred} has no successor besides {lightest}"
                    ))
                })?;
            state.merge_arc(pred, lightest, alternative)?;
        }
        trace!(sink = lightest, "drained lightest sink");

        let remaining: Vec<usize> = sinks.into_iter().filter(|&sink| sink != lightest).collect();
        self.rebalance(state, &remaining, &frontier, deadline)?;
        Ok(())
    }
}
