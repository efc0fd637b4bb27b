//! Splittable (fractional) delegation flow: the input the rounding engine
//! consumes, and the solvers that produce it.
//!
//! A splittable flow lets every delegator fan its demand out across several
//! candidates. Minimizing the maximum voter load over such flows is a
//! linear program; this module treats it as a capability behind the
//! [`FractionalFlowSolver`] trait.
//!
//! # Default solver
//!
//! [`MaxFlowSolver`] exploits the structure of the program instead of
//! running a general LP: a target congestion `z` is feasible iff a maximum
//! flow from a super source (capacity 1 into every delegator) through the
//! candidate arcs (unbounded) to a super sink (capacity `z − 1` out of
//! every voter) routes all delegator demand. The solver bisects `z` between
//! the trivial bounds `max(1, n / voters)` and `n` and returns the flow at
//! the smallest feasible `z` found.
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{Deadline, RoundingConfig};
use crate::error::{InputError, RoundingError};
use crate::graph::DelegationGraph;

const SOLVER_NAME: &str = "max-flow solver";

/// Residual capacity below which an arc counts as saturated.
const RESIDUAL_TOLERANCE: f64 = 1e-12;

// ---------------------------------------------------------------------------
// FractionalFlow
// ---------------------------------------------------------------------------

/// A splittable flow over a [`DelegationGraph`].
///
/// `flows[i]` is `None` for voters and a non-empty map from successor to
/// positive flow for delegators. Outgoing flow of a delegator equals one
/// plus its inflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FractionalFlow {
    /// Per-node outgoing flow; `None` for voters.
    pub flows: Vec<Option<BTreeMap<usize, f64>>>,
    /// Maximum over voters of one plus inflow. Diagnostic only.
    pub congestion: f64,
}

impl FractionalFlow {
    /// Wraps per-node flows and computes their congestion.
    pub fn from_flows(flows: Vec<Option<BTreeMap<usize, f64>>>) -> Self {
        let mut inflow = vec![0.0; flows.len()];
        for succs in flows.iter().flatten() {
            for (&succ, &value) in succs {
                if let Some(slot) = inflow.get_mut(succ) {
                    *slot += value;
                }
            }
        }
        let congestion = flows
            .iter()
            .zip(&inflow)
            .filter(|(entry, _)| entry.is_none())
            .map(|(_, &incoming)| 1.0 + incoming)
            .fold(0.0, f64::max);
        Self { flows, congestion }
    }

    /// Returns the number of nodes covered.
    pub fn node_count(&self) -> usize {
        self.flows.len()
    }
}

// ---------------------------------------------------------------------------
// FractionalFlowSolver
// ---------------------------------------------------------------------------

/// Computes a congestion-minimizing splittable flow.
pub trait FractionalFlowSolver {
    /// Solves for `graph`, which the caller has already validated.
    ///
    /// # Errors
    ///
    /// - [`RoundingError::SolverFailure`] if the problem cannot be solved.
    /// - [`RoundingError::TimedOut`] if `deadline` expires during the solve.
    fn solve(
        &self,
        graph: &DelegationGraph,
        deadline: &Deadline,
    ) -> Result<FractionalFlow, RoundingError>;
}

/// A "solver" that hands back a precomputed flow.
///
/// Useful to round a flow obtained elsewhere, or to pin the rounding input
/// in tests.
#[derive(Debug, Clone)]
pub struct FixedFlow(pub FractionalFlow);

impl FractionalFlowSolver for FixedFlow {
    fn solve(
        &self,
        graph: &DelegationGraph,
        deadline: &Deadline,
    ) -> Result<FractionalFlow, RoundingError> {
        deadline.check()?;
        if self.0.node_count() != graph.node_count() {
            return Err(InputError::InconsistentFlow {
                node: self.0.node_count().min(graph.node_count()),
                detail: format!(
                    "fixed flow covers {} nodes, instance has {}",
                    self.0.node_count(),
                    graph.node_count()
                ),
            }
            .into());
        }
        Ok(self.0.clone())
    }
}

// ---------------------------------------------------------------------------
// MaxFlowSolver
// ---------------------------------------------------------------------------

/// Exact-up-to-tolerance splittable flow via bisection over maximum flows.
#[derive(Debug, Clone)]
pub struct MaxFlowSolver {
    /// Bisection stops once the congestion bracket is narrower than this.
    pub bisection_tolerance: f64,
    /// Flow values at or below this are dropped from the result.
    pub epsilon: f64,
}

impl Default for MaxFlowSolver {
    fn default() -> Self {
        Self::from_config(&RoundingConfig::default())
    }
}

impl MaxFlowSolver {
    /// Takes tolerances from `config`.
    pub fn from_config(config: &RoundingConfig) -> Self {
        Self {
            bisection_tolerance: config.bisection_tolerance,
            epsilon: config.epsilon,
        }
    }
}

impl FractionalFlowSolver for MaxFlowSolver {
    fn solve(
        &self,
        graph: &DelegationGraph,
        deadline: &Deadline,
    ) -> Result<FractionalFlow, RoundingError> {
        let node_count = graph.node_count();
        let voter_count = graph.voters().count();
        let delegator_count = node_count - voter_count;
        if delegator_count == 0 {
            return Ok(FractionalFlow::from_flows(vec![None; node_count]));
        }
        if voter_count == 0 {
            return Err(RoundingError::solver(SOLVER_NAME, "instance has no voter"));
        }

        let mut routing = Routing::build(graph);
        let demand = delegator_count as f64;
        let feasibility_slack = self.epsilon * demand;

        let mut hi = node_count as f64;
        if routing.route(hi, deadline)? < demand - feasibility_slack {
            return Err(RoundingError::solver(
                SOLVER_NAME,
                "not every delegator can route its demand to a voter",
            ));
        }

        let mut lo = (node_count as f64 / voter_count as f64).max(1.0);
        let mut steps = 0usize;
        if routing.route(lo, deadline)? >= demand - feasibility_slack {
            hi = lo;
        } else {
            while hi - lo > self.bisection_tolerance {
                deadline.check()?;
                let mid = 0.5 * (lo + hi);
                if routing.route(mid, deadline)? >= demand - feasibility_slack {
                    hi = mid;
                } else {
                    lo = mid;
                }
                steps += 1;
            }
        }
        routing.route(hi, deadline)?;
        debug!(congestion = hi, steps, "fractional congestion bracketed");

        let mut flows = routing.extract(graph);
        cancel_antiparallel(&mut flows);

        let mut result = Vec::with_capacity(node_count);
        for (node, entry) in flows.into_iter().enumerate() {
            match entry {
                None => result.push(None),
                Some(succs) => {
                    let kept: BTreeMap<usize, f64> = succs
                        .into_iter()
                        .filter(|&(_, value)| value > self.epsilon)
                        .collect();
                    if kept.is_empty() {
                        return Err(RoundingError::solver(
                            SOLVER_NAME,
                            format!("delegator {node} ended with no outgoing flow"),
                        ));
                    }
                    result.push(Some(kept));
                }
            }
        }
        Ok(FractionalFlow::from_flows(result))
    }
}

/// Cancels flow that runs both ways between two delegators.
fn cancel_antiparallel(flows: &mut [Option<BTreeMap<usize, f64>>]) {
    for u in 0..flows.len() {
        let targets: Vec<usize> = match &flows[u] {
            Some(succs) => succs.keys().copied().filter(|&v| v > u).collect(),
            None => continue,
        };
        for v in targets {
            let back = flows[v].as_ref().and_then(|s| s.get(&u)).copied().unwrap_or(0.0);
            if back <= 0.0 {
                continue;
            }
            let forth = flows[u].as_ref().and_then(|s| s.get(&v)).copied().unwrap_or(0.0);
            let common = forth.min(back);
            if let Some(value) = flows[u].as_mut().and_then(|s| s.get_mut(&v)) {
                *value -= common;
            }
            if let Some(value) = flows[v].as_mut().and_then(|s| s.get_mut(&u)) {
                *value -= common;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Routing network
// ---------------------------------------------------------------------------

/// The super-source / super-sink network for one instance.
struct Routing {
    network: FlowNetwork,
    source: usize,
    sink: usize,
    /// Per node, `(successor, arc id)` of every distinct candidate arc.
    candidate_arcs: Vec<Vec<(usize, usize)>>,
    /// Arc id from each voter to the super sink.
    voter_arcs: Vec<usize>,
}

impl Routing {
    fn build(graph: &DelegationGraph) -> Self {
        let node_count = graph.node_count();
        let source = node_count;
        let sink = node_count + 1;
        let unbounded = node_count as f64;

        let mut network = FlowNetwork::new(node_count + 2);
        let mut candidate_arcs = vec![Vec::new(); node_count];
        let mut voter_arcs = Vec::new();

        for node in 0..node_count {
            if graph.is_voter(node) {
                voter_arcs.push(network.add_arc(node, sink, 0.0));
                continue;
            }
            network.add_arc(source, node, 1.0);
            let distinct: BTreeSet<usize> = graph.candidates(node).iter().copied().collect();
            for succ in distinct {
                let arc = network.add_arc(node, succ, unbounded);
                candidate_arcs[node].push((succ, arc));
            }
        }

        Self {
            network,
            source,
            sink,
            candidate_arcs,
            voter_arcs,
        }
    }

    /// Routes as much demand as possible with every voter capped at
    /// congestion `z`; returns the routed amount.
    fn route(&mut self, z: f64, deadline: &Deadline) -> Result<f64, RoundingError> {
        for &arc in &self.voter_arcs {
            self.network.capacity[arc] = (z - 1.0).max(0.0);
        }
        self.network.reset();
        self.network.max_flow(self.source, self.sink, deadline)
    }

    /// Reads the candidate-arc flows of the last [`Routing::route`] call.
    fn extract(&self, graph: &DelegationGraph) -> Vec<Option<BTreeMap<usize, f64>>> {
        (0..graph.node_count())
            .map(|node| {
                if graph.is_voter(node) {
                    return None;
                }
                Some(
                    self.candidate_arcs[node]
                        .iter()
                        .map(|&(succ, arc)| (succ, self.network.flow[arc].max(0.0)))
                        .collect(),
                )
            })
            .collect()
    }
}

/// Residual network with paired arcs: arc `a` and its reverse `a ^ 1`.
struct FlowNetwork {
    adjacency: Vec<Vec<usize>>,
    head: Vec<usize>,
    capacity: Vec<f64>,
    flow: Vec<f64>,
}

impl FlowNetwork {
    fn new(node_count: usize) -> Self {
        Self {
            adjacency: vec![Vec::new(); node_count],
            head: Vec::new(),
            capacity: Vec::new(),
            flow: Vec::new(),
        }
    }

    fn add_arc(&mut self, from: usize, to: usize, capacity: f64) -> usize {
        let arc = self.head.len();
        self.head.push(to);
        self.capacity.push(capacity);
        self.flow.push(0.0);
        self.head.push(from);
        self.capacity.push(0.0);
        self.flow.push(0.0);
        self.adjacency[from].push(arc);
        self.adjacency[to].push(arc + 1);
        arc
    }

    fn residual(&self, arc: usize) -> f64 {
        self.capacity[arc] - self.flow[arc]
    }

    fn reset(&mut self) {
        self.flow.iter_mut().for_each(|f| *f = 0.0);
    }

    /// Edmonds–Karp: augments along shortest residual paths until the sink
    /// is cut off.
    fn max_flow(
        &mut self,
        source: usize,
        sink: usize,
        deadline: &Deadline,
    ) -> Result<f64, RoundingError> {
        let mut total = 0.0;
        let mut parent_arc: Vec<Option<usize>> = vec![None; self.adjacency.len()];
        let mut queue = VecDeque::new();

        loop {
            deadline.check()?;
            parent_arc.iter_mut().for_each(|p| *p = None);
            queue.clear();
            queue.push_back(source);
            let mut reached = false;

            while let Some(node) = queue.pop_front() {
                for &arc in &self.adjacency[node] {
                    let next = self.head[arc];
                    if next == source
                        || parent_arc[next].is_some()
                        || self.residual(arc) <= RESIDUAL_TOLERANCE
                    {
                        continue;
                    }
                    parent_arc[next] = Some(arc);
                    if next == sink {
                        reached = true;
                        break;
                    }
                    queue.push_back(next);
                }
                if reached {
                    break;
                }
            }
            if !reached {
                return Ok(total);
            }

            let mut bottleneck = f64::INFINITY;
            let mut node = sink;
            while let Some(arc) = parent_arc[node] {
                bottleneck = bottleneck.min(self.residual(arc));
                node = self.head[arc ^ 1];
            }
            let mut node = sink;
            while let Some(arc) = parent_arc[node] {
                self.flow[arc] += bottleneck;
                self.flow[arc ^ 1] -= bottleneck;
                node = self.head[arc ^ 1];
            }
            total += bottleneck;
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;

    fn solve(entries: Vec<Option<Vec<usize>>>) -> FractionalFlow {
        MaxFlowSolver::default()
            .solve(&DelegationGraph::new(entries), &Deadline::none())
            .expect("solves")
    }

    fn conserves(graph: &DelegationGraph, flow: &FractionalFlow) -> bool {
        let mut inflow = vec![0.0; graph.node_count()];
        for succs in flow.flows.iter().flatten() {
            for (&succ, &value) in succs {
                inflow[succ] += value;
            }
        }
        flow.flows.iter().enumerate().all(|(node, entry)| match entry {
            None => true,
            Some(succs) => (succs.values().sum::<f64>() - (1.0 + inflow[node])).abs() < 1e-6,
        })
    }

    #[test]
    fn chain_into_single_voter() {
        let flow = solve(vec![None, Some(vec![0]), Some(vec![1, 1]), None]);
        assert!((flow.congestion - 3.0).abs() < 1e-6);
        assert_eq!(flow.flows[0], None);
        assert_eq!(flow.flows[3], None);
        let two = flow.flows[2].as_ref().expect("delegator flow");
        assert_eq!(two.len(), 1, "duplicate candidates collapse to one arc");
        assert!((two[&1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn forced_routing_balances_two_voters() {
        let flow = solve(vec![None, None, Some(vec![0, 1]), Some(vec![1])]);
        assert!((flow.congestion - 2.0).abs() < 1e-6);
        let two = flow.flows[2].as_ref().expect("delegator flow");
        assert!((two.get(&0).copied().unwrap_or(0.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn single_delegator_splits_evenly() {
        let flow = solve(vec![None, None, Some(vec![0, 1])]);
        assert!((flow.congestion - 1.5).abs() < 1e-6);
        let two = flow.flows[2].as_ref().expect("delegator flow");
        assert!((two[&0] - 0.5).abs() < 1e-6);
        assert!((two[&1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn all_voters_have_congestion_one() {
        let flow = solve(vec![None, None]);
        assert_eq!(flow.flows, vec![None, None]);
        assert!((flow.congestion - 1.0).abs() < 1e-12);
    }

    #[test]
    fn flow_is_conserved_on_layered_instance() {
        let graph = DelegationGraph::new(vec![
            None,
            None,
            None,
            Some(vec![0, 1]),
            Some(vec![1, 2]),
            Some(vec![3, 4]),
            Some(vec![4, 2]),
            Some(vec![5, 6, 0]),
        ]);
        let flow = MaxFlowSolver::default()
            .solve(&graph, &Deadline::none())
            .expect("solves");
        assert!(conserves(&graph, &flow));
        assert!((flow.congestion - 8.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn expired_deadline_times_out() {
        let graph = DelegationGraph::new(vec![None, Some(vec![0])]);
        let err = MaxFlowSolver::default()
            .solve(&graph, &Deadline::after(std::time::Duration::ZERO))
            .expect_err("must time out");
        assert!(err.is_timeout());
    }

    #[test]
    fn fixed_flow_rejects_wrong_size() {
        let fixed = FixedFlow(FractionalFlow::from_flows(vec![None]));
        let graph = DelegationGraph::new(vec![None, Some(vec![0])]);
        assert!(fixed.solve(&graph, &Deadline::none()).is_err());
    }

    #[test]
    fn from_flows_computes_congestion() {
        let flow = FractionalFlow::from_flows(vec![
            None,
            None,
            Some([(0, 1.5), (1, 0.5)].into_iter().collect()),
        ]);
        assert!((flow.congestion - 2.5).abs() < 1e-12);
    }

    #[test]
    fn json_keys_round_trip() {
        let flow = FractionalFlow::from_flows(vec![None, Some([(0, 1.0)].into_iter().collect())]);
        let json = serde_json::to_string(&flow).expect("serializes");
        let back: FractionalFlow = serde_json::from_str(&json).expect("parses");
        assert_eq!(back, flow);
    }
}
