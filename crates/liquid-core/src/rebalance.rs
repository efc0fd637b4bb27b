//! Convex rebalancing of one sink component.
//!
//! Given the frontier delegators of a sink component and the voters they
//! feed, a rebalancer redistributes each frontier node's fixed outgoing flow
//! among its current sink neighbors so that the sum of squared sink loads
//! `Σ (demand + inflow)²` is minimal.
//!
//! # Default implementation
//!
//! [`WaterFillingRebalancer`] runs block-coordinate descent: one block per
//! frontier node, each solved exactly. With the other blocks fixed, the
//! best split of a node's flow `F` over sinks with base loads `b_j` is the
//! water level `t` with `Σ max(0, t − b_j) = F`, so arcs into sinks that are
//! already heavier than the level get exactly zero flow. The objective is
//! convex and each block step is exact, so sweeps converge to the optimum.
use std::collections::BTreeMap;

use tracing::{trace, warn};

use crate::config::{Deadline, RoundingConfig};
use crate::error::RoundingError;

const SOLVER_NAME: &str = "water-filling rebalancer";

// ---------------------------------------------------------------------------
// Problem
// ---------------------------------------------------------------------------

/// One frontier delegator and its arcs into the component's sinks.
#[derive(Debug, Clone, PartialEq)]
pub struct FrontierNode {
    /// Node id of the delegator.
    pub node: usize,
    /// `(sink node id, current flow)` per arc. The sum is preserved.
    pub arcs: Vec<(usize, f64)>,
}

/// A bounded rebalancing sub-problem over one sink component.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RebalanceProblem {
    /// Node ids of the sinks under consideration.
    pub sinks: Vec<usize>,
    /// Demand of each sink, parallel to `sinks`.
    pub sink_demands: Vec<f64>,
    /// Every delegator routing flow into `sinks`.
    pub frontier: Vec<FrontierNode>,
}

/// Minimizes the sum of squared sink loads over one [`RebalanceProblem`].
pub trait Rebalancer {
    /// Returns new flow values, one vector per frontier node and one value
    /// per arc, in the order of `problem`.
    ///
    /// # Errors
    ///
    /// - [`RoundingError::SolverFailure`] if the problem is malformed (an
    ///   arc into a node outside `sinks`).
    /// - [`RoundingError::TimedOut`] if `deadline` expires.
    fn rebalance(
        &self,
        problem: &RebalanceProblem,
        deadline: &Deadline,
    ) -> Result<Vec<Vec<f64>>, RoundingError>;
}

// ---------------------------------------------------------------------------
// WaterFillingRebalancer
// ---------------------------------------------------------------------------

/// Block-coordinate descent with exact water-filling blocks.
#[derive(Debug, Clone)]
pub struct WaterFillingRebalancer {
    /// Sweep limit per call.
    pub max_sweeps: usize,
    /// A sweep whose largest per-arc change is at or below this converges.
    pub tolerance: f64,
}

impl Default for WaterFillingRebalancer {
    fn default() -> Self {
        Self::from_config(&RoundingConfig::default())
    }
}

impl WaterFillingRebalancer {
    /// Takes sweep limit and tolerance from `config`.
    pub fn from_config(config: &RoundingConfig) -> Self {
        Self {
            max_sweeps: config.rebalance_max_sweeps,
            tolerance: config.rebalance_tolerance,
        }
    }
}

impl Rebalancer for WaterFillingRebalancer {
    fn rebalance(
        &self,
        problem: &RebalanceProblem,
        deadline: &Deadline,
    ) -> Result<Vec<Vec<f64>>, RoundingError> {
        deadline.check()?;
        if problem.sink_demands.len() != problem.sinks.len() {
            return Err(RoundingError::solver(
                SOLVER_NAME,
                format!(
                    "{} sinks but {} sink demands",
                    problem.sinks.len(),
                    problem.sink_demands.len()
                ),
            ));
        }

        let position: BTreeMap<usize, usize> = problem
            .sinks
            .iter()
            .enumerate()
            .map(|(pos, &sink)| (sink, pos))
            .collect();

        // Arc targets as positions into `loads`.
        let mut targets: Vec<Vec<usize>> = Vec::with_capacity(problem.frontier.len());
        for frontier in &problem.frontier {
            let mut row = Vec::with_capacity(frontier.arcs.len());
            for &(sink, _) in &frontier.arcs {
                let pos = position.get(&sink).copied().ok_or_else(|| {
                    RoundingError::solver(
                        SOLVER_NAME,
                        format!("arc {} -> {sink} leaves the sink set", frontier.node),
                    )
                })?;
                row.push(pos);
            }
            targets.push(row);
        }

        let mut flows: Vec<Vec<f64>> = problem
            .frontier
            .iter()
            .map(|f| f.arcs.iter().map(|&(_, value)| value.max(0.0)).collect())
            .collect();
        let totals: Vec<f64> = problem
            .frontier
            .iter()
            .map(|f| f.arcs.iter().map(|&(_, value)| value).sum())
            .collect();

        let mut loads = problem.sink_demands.clone();
        for (row, values) in targets.iter().zip(&flows) {
            for (&pos, &value) in row.iter().zip(values) {
                loads[pos] += value;
            }
        }

        let mut bases = Vec::new();
        for sweep in 0..self.max_sweeps {
            deadline.check()?;
            let mut largest_change: f64 = 0.0;

            for ((row, values), &total) in targets.iter().zip(flows.iter_mut()).zip(&totals) {
                bases.clear();
                bases.extend(row.iter().zip(values.iter()).map(|(&pos, &v)| loads[pos] - v));
                let levels = water_fill(&bases, total);
                for ((&pos, value), new) in row.iter().zip(values.iter_mut()).zip(levels) {
                    largest_change = largest_change.max((new - *value).abs());
                    loads[pos] += new - *value;
                    *value = new;
                }
            }

            trace!(sweep, largest_change, "rebalancing sweep");
            if largest_change <= self.tolerance {
                return Ok(flows);
            }
        }

        warn!(
            max_sweeps = self.max_sweeps,
            "rebalancing stopped at the sweep limit before converging"
        );
        Ok(flows)
    }
}

/// Splits `total` over bins with base loads `bases` so that the largest
/// resulting load is as low as possible: every receiving bin ends at the
/// same level `t`, and bins already at or above `t` receive nothing.
fn water_fill(bases: &[f64], total: f64) -> Vec<f64> {
    if bases.is_empty() {
        return Vec::new();
    }
    let mut order: Vec<usize> = (0..bases.len()).collect();
    order.sort_by(|&a, &b| bases[a].total_cmp(&bases[b]));

    let mut prefix = 0.0;
    let mut level = bases[order[0]] + total;
    for (filled, &idx) in order.iter().enumerate() {
        prefix += bases[idx];
        level = (total + prefix) / (filled + 1) as f64;
        match order.get(filled + 1) {
            Some(&next) if level > bases[next] => {}
            Some(_) | None => break,
        }
    }
    bases.iter().map(|&b| (level - b).max(0.0)).collect()
}
