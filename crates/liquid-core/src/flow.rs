//! Mutable flow state shared by the rewrite rules of one rounding run.
//!
//! [`FlowState`] owns, per node, the map from successor to positive flow,
//! the node's integer demand, and the voter it currently resolves to. It is
//! created once from a fractional flow, rewritten in place by aggregation,
//! cycle breaking, and sink deactivation, and dropped when every flow map
//! is empty.
//!
//! Successor maps are `BTreeMap`s so that "the first other successor" is
//! always the one with the smallest id, which keeps rounding deterministic.
use std::collections::BTreeMap;

use crate::config::DEFAULT_EPSILON;
use crate::error::{InputError, RoundingError};
use crate::fractional::FractionalFlow;
use crate::graph::DelegationGraph;

/// Outgoing flow of one node: successor id to flow value.
pub type Successors = BTreeMap<usize, f64>;

// ---------------------------------------------------------------------------
// FlowState
// ---------------------------------------------------------------------------

/// Flow graph, demands, and transitive delegations of one rounding run.
///
/// Invariants maintained by every method:
/// - no node has a flow arc to itself;
/// - every stored flow value exceeds `epsilon`;
/// - voters never have outgoing flow;
/// - a delegator's map is empty only after it has been contracted.
#[derive(Debug, Clone)]
pub struct FlowState {
    flows: Vec<Successors>,
    demands: Vec<usize>,
    transitive: Vec<usize>,
    voter: Vec<bool>,
    epsilon: f64,
}

/// Per-node predecessor bookkeeping derived from the current flow.
#[derive(Debug, Clone, Default)]
pub struct InflowSummary {
    /// For each node, the nodes with a flow arc into it, in index order.
    pub predecessors: Vec<Vec<usize>>,
    /// For each node, the total flow arriving at it.
    pub inflow: Vec<f64>,
    /// For each node, how many of its successors are voters.
    pub voter_successors: Vec<usize>,
}

impl FlowState {
    /// Builds the state for `graph` from a fractional flow.
    ///
    /// Every node starts with demand 1 and resolves to itself. Antiparallel
    /// flow between two delegators is cancelled up front, since the cycle
    /// finder never reports two-node cycles.
    ///
    /// # Errors
    ///
    /// [`InputError::InconsistentFlow`] if the flow has the wrong length,
    /// gives a voter outgoing flow, leaves a delegator without flow, or
    /// contains a self-loop, a non-candidate successor, or a value at or
    /// below `epsilon`. The same error if a delegator does not send out
    /// `1 +` its inflow, or if all of its flow cancels against flow coming
    /// back.
    pub fn from_fractional(
        graph: &DelegationGraph,
        flow: &FractionalFlow,
        epsilon: f64,
    ) -> Result<Self, RoundingError> {
        let node_count = graph.node_count();
        if flow.flows.len() != node_count {
            return Err(InputError::InconsistentFlow {
                node: flow.flows.len().min(node_count),
                detail: format!(
                    "flow covers {} nodes, instance has {node_count}",
                    flow.flows.len()
                ),
            }
            .into());
        }

        let mut flows = Vec::with_capacity(node_count);
        for (node, entry) in flow.flows.iter().enumerate() {
            let inconsistent = |detail: String| InputError::InconsistentFlow { node, detail };
            match entry {
                None if graph.is_voter(node) => flows.push(Successors::new()),
                None => return Err(inconsistent("delegator has no flow".to_owned()).into()),
                Some(_) if graph.is_voter(node) => {
                    return Err(inconsistent("voter has outgoing flow".to_owned()).into());
                }
                Some(succs) => {
                    if succs.is_empty() {
                        return Err(inconsistent("delegator has no flow".to_owned()).into());
                    }
                    for (&succ, &value) in succs {
                        if succ == node {
                            return Err(inconsistent("flow arc to itself".to_owned()).into());
                        }
                        if !graph.candidates(node).contains(&succ) {
                            return Err(inconsistent(format!(
                                "flow to {succ}, which is not a candidate"
                            ))
                            .into());
                        }
                        if value.is_nan() || value <= epsilon {
                            return Err(inconsistent(format!(
                                "flow {value} to {succ} is not above epsilon"
                            ))
                            .into());
                        }
                    }
                    flows.push(succs.clone());
                }
            }
        }

        check_conservation(graph, &flows, epsilon)?;

        let mut state = Self {
            flows,
            demands: vec![1; node_count],
            transitive: (0..node_count).collect(),
            voter: (0..node_count).map(|node| graph.is_voter(node)).collect(),
            epsilon,
        };
        state.cancel_antiparallel_flow();
        if let Some(node) =
            (0..node_count).find(|&node| !state.voter[node] && state.flows[node].is_empty())
        {
            return Err(InputError::InconsistentFlow {
                node,
                detail: "all flow of the delegator runs in a circle".to_owned(),
            }
            .into());
        }
        Ok(state)
    }

    /// Removes `min(f(u, v), f(v, u))` from both directions for every pair
    /// of delegators with flow both ways. Conservation is unaffected.
    fn cancel_antiparallel_flow(&mut self) {
        for u in 0..self.flows.len() {
            let targets: Vec<usize> = self.flows[u].keys().copied().filter(|&v| v > u).collect();
            for v in targets {
                let Some(&back) = self.flows[v].get(&u) else {
                    continue;
                };
                let Some(&forth) = self.flows[u].get(&v) else {
                    continue;
                };
                let common = forth.min(back);
                self.set_flow(u, v, forth - common);
                self.set_flow(v, u, back - common);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Returns the number of nodes.
    pub fn node_count(&self) -> usize {
        self.flows.len()
    }

    /// Returns `true` if `node` is a voter.
    pub fn is_voter(&self, node: usize) -> bool {
        self.voter.get(node).copied().unwrap_or(false)
    }

    /// Returns the zero tolerance this state was built with.
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Returns the current successor map of `node`.
    pub fn successors(&self, node: usize) -> &Successors {
        &self.flows[node]
    }

    /// Returns the accumulated demand of `node`.
    pub fn demand(&self, node: usize) -> usize {
        self.demands[node]
    }

    /// Returns the voter each node resolves to through recorded contractions.
    pub fn transitive_delegations(&self) -> &[usize] {
        &self.transitive
    }

    /// Returns `true` once no node has outgoing flow.
    pub fn is_resolved(&self) -> bool {
        self.flows.iter().all(BTreeMap::is_empty)
    }

    /// Total number of flow arcs.
    pub fn arc_count(&self) -> usize {
        self.flows.iter().map(BTreeMap::len).sum()
    }

    /// Number of voters currently receiving flow.
    pub fn active_sink_count(&self) -> usize {
        let mut active = vec![false; self.flows.len()];
        for succs in &self.flows {
            for &succ in succs.keys() {
                if self.voter[succ] {
                    active[succ] = true;
                }
            }
        }
        active.into_iter().filter(|&a| a).count()
    }

    /// The non-negative measure every engine step must strictly decrease.
    pub fn progress_measure(&self) -> usize {
        self.arc_count() + self.active_sink_count()
    }

    /// Sum of all demands. Starts at the node count and never changes.
    pub fn total_demand(&self) -> usize {
        self.demands.iter().sum()
    }

    /// Total outgoing flow of `node`.
    pub fn outflow(&self, node: usize) -> f64 {
        self.flows[node].values().sum()
    }

    /// Predecessors, inflow, and voter-successor counts of every node.
    pub fn inflow_summary(&self) -> InflowSummary {
        let node_count = self.flows.len();
        let mut summary = InflowSummary {
            predecessors: vec![Vec::new(); node_count],
            inflow: vec![0.0; node_count],
            voter_successors: vec![0; node_count],
        };
        for (node, succs) in self.flows.iter().enumerate() {
            for (&succ, &value) in succs {
                summary.predecessors[succ].push(node);
                summary.inflow[succ] += value;
                if self.voter[succ] {
                    summary.voter_successors[node] += 1;
                }
            }
        }
        summary
    }

    /// Builds the doubled graph: every flow arc `u → v`, plus `v → u`
    /// whenever `v` is a voter.
    pub fn doubled_graph(&self) -> Vec<Vec<usize>> {
        let mut doubled = vec![Vec::new(); self.flows.len()];
        for (node, succs) in self.flows.iter().enumerate() {
            for &succ in succs.keys() {
                doubled[node].push(succ);
                if self.voter[succ] {
                    doubled[succ].push(node);
                }
            }
        }
        doubled
    }

    // -----------------------------------------------------------------------
    // Rewrites
    // -----------------------------------------------------------------------

    /// Sets the flow on `from → to`, removing the arc when `value` is at or
    /// below epsilon.
    pub fn set_flow(&mut self, from: usize, to: usize, value: f64) {
        if value > self.epsilon {
            self.flows[from].insert(to, value);
        } else {
            self.flows[from].remove(&to);
        }
    }

    /// Moves all flow of `from → loser` onto `from → winner` and deletes the
    /// loser arc.
    ///
    /// # Errors
    ///
    /// [`RoundingError::InternalInvariantViolation`] if `from → loser` does
    /// not exist, or `loser == winner`.
    pub fn merge_arc(&mut self, from: usize, loser: usize, winner: usize) -> Result<(), RoundingError> {
        if loser == winner {
            return Err(RoundingError::invariant(format!(
                "cannot merge arc {from} -> {loser} into itself"
            )));
        }
        let moved = self.flows[from].remove(&loser).ok_or_else(|| {
            RoundingError::invariant(format!("merge of missing arc {from} -> {loser}"))
        })?;
        *self.flows[from].entry(winner).or_insert(0.0) += moved;
        Ok(())
    }

    /// Contracts `node` into the voter `into`.
    ///
    /// Every other node's flow into `node` is redirected to `into`, summing
    /// with existing flow. `node`'s own flow map is cleared, its demand is
    /// moved to `into`, and `into` is recorded as its transitive delegate.
    ///
    /// # Errors
    ///
    /// [`RoundingError::InternalInvariantViolation`] if `node == into` or
    /// `into` is not a voter.
    pub fn contract(&mut self, node: usize, into: usize) -> Result<(), RoundingError> {
        if node == into || !self.voter[into] {
            return Err(RoundingError::invariant(format!(
                "cannot contract {node} into {into}"
            )));
        }
        for succs in &mut self.flows {
            if let Some(value) = succs.remove(&node) {
                *succs.entry(into).or_insert(0.0) += value;
            }
        }
        self.flows[node].clear();
        self.demands[into] += self.demands[node];
        self.demands[node] = 0;
        self.transitive[node] = into;
        Ok(())
    }

    /// Pushes `amount` around one step of an alternating cycle.
    ///
    /// A step out of a delegator follows a real arc and decreases it,
    /// deleting it once at or below epsilon. A step out of a voter follows a
    /// reversed arc and increases the real arc `to → from` instead.
    ///
    /// # Errors
    ///
    /// [`RoundingError::InternalInvariantViolation`] if the underlying real
    /// arc does not exist or would go negative beyond epsilon.
    pub fn push_along(&mut self, from: usize, to: usize, amount: f64) -> Result<(), RoundingError> {
        if self.voter[from] {
            let value = self.flows[to].get_mut(&from).ok_or_else(|| {
                RoundingError::invariant(format!("reversed arc {from} -> {to} has no real arc"))
            })?;
            *value += amount;
            return Ok(());
        }

        let value = self.flows[from]
            .get(&to)
            .copied()
            .ok_or_else(|| RoundingError::invariant(format!("missing arc {from} -> {to}")))?;
        let residual = value - amount;
        if residual < -self.epsilon {
            return Err(RoundingError::invariant(format!(
                "arc {from} -> {to} would drop to {residual}"
            )));
        }
        self.set_flow(from, to, residual);
        Ok(())
    }
}

/// Checks that every delegator sends out its own unit of demand plus
/// everything it receives.
///
/// A balance may be off by up to `epsilon` per dropped arc plus a solver's
/// routing shortfall; the tolerance is `3 * epsilon` per node.
fn check_conservation(
    graph: &DelegationGraph,
    flows: &[Successors],
    epsilon: f64,
) -> Result<(), RoundingError> {
    let node_count = flows.len();
    let mut inflow = vec![0.0; node_count];
    for succs in flows {
        for (&succ, &value) in succs {
            if let Some(slot) = inflow.get_mut(succ) {
                *slot += value;
            }
        }
    }
    let tolerance = epsilon.max(DEFAULT_EPSILON) * (3 * node_count + 1) as f64;
    for (node, succs) in flows.iter().enumerate() {
        if graph.is_voter(node) {
            continue;
        }
        let outflow: f64 = succs.values().sum();
        let expected = 1.0 + inflow[node];
        if (outflow - expected).abs() > tolerance {
            return Err(InputError::InconsistentFlow {
                node,
                detail: format!("sends {outflow} but receives {} plus its own 1", inflow[node]),
            }
            .into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;
    use crate::test_helpers::{fractional, graph};

    fn state(entries: Vec<Option<Vec<usize>>>, flow: Vec<Option<Vec<(usize, f64)>>>) -> FlowState {
        FlowState::from_fractional(&graph(entries), &fractional(flow), 1e-9).expect("valid state")
    }

    #[test]
    fn initial_state_has_unit_demands() {
        let s = state(
            vec![None, None, Some(vec![0, 1])],
            vec![None, None, Some(vec![(0, 0.5), (1, 0.5)])],
        );
        assert_eq!(s.total_demand(), 3);
        assert_eq!(s.transitive_delegations(), &[0, 1, 2]);
        assert_eq!(s.arc_count(), 2);
        assert_eq!(s.active_sink_count(), 2);
        assert!(!s.is_resolved());
    }

    #[test]
    fn voter_with_flow_is_rejected() {
        let err = FlowState::from_fractional(
            &graph(vec![None, None]),
            &fractional(vec![Some(vec![(1, 1.0)]), None]),
            1e-9,
        )
        .expect_err("voter flow must be rejected");
        assert!(matches!(
            err,
            RoundingError::InvalidInput(InputError::InconsistentFlow { node: 0, .. })
        ));
    }

    #[test]
    fn circulating_delegator_flow_is_rejected() {
        let err = FlowState::from_fractional(
            &graph(vec![None, Some(vec![2, 0]), Some(vec![1, 0])]),
            &fractional(vec![None, Some(vec![(2, 1.0)]), Some(vec![(1, 1.0)])]),
            1e-9,
        )
        .expect_err("no demand reaches the voter");
        assert!(matches!(
            err,
            RoundingError::InvalidInput(InputError::InconsistentFlow { node: 1, .. })
        ));
    }

    #[test]
    fn unbalanced_delegator_is_rejected() {
        let err = FlowState::from_fractional(
            &graph(vec![None, None, Some(vec![0, 1]), Some(vec![2])]),
            &fractional(vec![None, None, Some(vec![(0, 0.5), (1, 0.5)]), Some(vec![(2, 1.0)])]),
            1e-9,
        )
        .expect_err("2 forwards only its own demand");
        assert!(matches!(
            err,
            RoundingError::InvalidInput(InputError::InconsistentFlow { node: 2, .. })
        ));
    }

    #[test]
    fn flow_cancelling_to_nothing_is_rejected() {
        // A coarse epsilon lets the circulation pass the balance check, but
        // cancellation still leaves both delegators without flow.
        let err = FlowState::from_fractional(
            &graph(vec![None, Some(vec![2, 0]), Some(vec![1, 0])]),
            &fractional(vec![None, Some(vec![(2, 1.0)]), Some(vec![(1, 1.0)])]),
            0.3,
        )
        .expect_err("cancelled flow");
        assert!(matches!(
            err,
            RoundingError::InvalidInput(InputError::InconsistentFlow { node: 1, .. })
        ));
    }

    #[test]
    fn non_candidate_successor_is_rejected() {
        let err = FlowState::from_fractional(
            &graph(vec![None, None, Some(vec![0])]),
            &fractional(vec![None, None, Some(vec![(1, 1.0)])]),
            1e-9,
        )
        .expect_err("non-candidate must be rejected");
        assert!(matches!(
            err,
            RoundingError::InvalidInput(InputError::InconsistentFlow { node: 2, .. })
        ));
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let result = FlowState::from_fractional(
            &graph(vec![None, Some(vec![0])]),
            &fractional(vec![None]),
            1e-9,
        );
        assert!(result.is_err());
    }

    #[test]
    fn antiparallel_delegator_flow_is_cancelled() {
        let s = state(
            vec![None, Some(vec![0, 2]), Some(vec![0, 1])],
            vec![
                None,
                Some(vec![(0, 1.5), (2, 0.5)]),
                Some(vec![(0, 0.5), (1, 1.0)]),
            ],
        );
        assert!(s.successors(1).get(&2).is_none());
        assert_eq!(s.successors(2).get(&1).copied(), Some(0.5));
    }

    #[test]
    fn contraction_moves_demand_and_redirects_inflow() {
        let mut s = state(
            vec![None, None, Some(vec![0, 1]), Some(vec![2, 1])],
            vec![
                None,
                None,
                Some(vec![(1, 1.5)]),
                Some(vec![(2, 0.5), (1, 0.5)]),
            ],
        );
        let arcs_before = s.arc_count();
        s.contract(2, 1).expect("contracts");

        assert!(s.successors(2).is_empty());
        assert_eq!(s.successors(3).get(&1).copied(), Some(1.0));
        assert_eq!(s.successors(3).len(), 1);
        assert_eq!(s.demand(1), 2);
        assert_eq!(s.demand(2), 0);
        assert_eq!(s.transitive_delegations()[2], 1);
        assert_eq!(s.total_demand(), 4);
        assert!(s.arc_count() < arcs_before);
    }

    #[test]
    fn contraction_into_delegator_is_refused() {
        let mut s = state(
            vec![None, Some(vec![0]), Some(vec![1])],
            vec![None, Some(vec![(0, 2.0)]), Some(vec![(1, 1.0)])],
        );
        assert!(s.contract(2, 1).is_err());
    }

    #[test]
    fn doubled_graph_adds_reverse_arcs_for_voters_only() {
        let s = state(
            vec![None, Some(vec![0]), Some(vec![1])],
            vec![None, Some(vec![(0, 2.0)]), Some(vec![(1, 1.0)])],
        );
        assert_eq!(s.doubled_graph(), vec![vec![1], vec![0], vec![1]]);
    }

    #[test]
    fn push_along_decreases_real_and_increases_reversed_arcs() {
        let mut s = state(
            vec![None, None, Some(vec![0, 1])],
            vec![None, None, Some(vec![(0, 0.25), (1, 0.75)])],
        );
        s.push_along(2, 0, 0.25).expect("real arc");
        assert!(s.successors(2).get(&0).is_none(), "drained arc is deleted");
        s.push_along(1, 2, 0.25).expect("reversed arc");
        assert_eq!(s.successors(2).get(&1).copied(), Some(1.0));
    }

    #[test]
    fn push_along_refuses_overdraft() {
        let mut s = state(
            vec![None, Some(vec![0])],
            vec![None, Some(vec![(0, 1.0)])],
        );
        assert!(s.push_along(1, 0, 2.0).is_err());
    }

    #[test]
    fn merge_arc_sums_onto_winner() {
        let mut s = state(
            vec![None, None, Some(vec![0, 1])],
            vec![None, None, Some(vec![(0, 0.5), (1, 0.5)])],
        );
        s.merge_arc(2, 0, 1).expect("merges");
        assert_eq!(s.successors(2).len(), 1);
        assert_eq!(s.successors(2).get(&1).copied(), Some(1.0));
        assert!(s.merge_arc(2, 0, 1).is_err(), "loser arc is gone");
    }

    #[test]
    fn inflow_summary_counts_voter_successors() {
        let s = state(
            vec![None, None, Some(vec![0, 1]), Some(vec![2])],
            vec![None, None, Some(vec![(0, 1.5), (1, 0.5)]), Some(vec![(2, 1.0)])],
        );
        let summary = s.inflow_summary();
        assert_eq!(summary.predecessors[0], vec![2]);
        assert_eq!(summary.predecessors[2], vec![3]);
        assert_eq!(summary.voter_successors[2], 2);
        assert_eq!(summary.voter_successors[3], 0);
        assert!((summary.inflow[0] - 1.5).abs() < 1e-12);
    }
}
