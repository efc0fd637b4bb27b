//! The delegation instance and the graph algorithms the rounding engine
//! runs on its auxiliary graphs.
//!
//! A [`DelegationGraph`] stores, per node, either nothing (a voter) or the
//! ordered list of potential delegation targets. Duplicates in a candidate
//! list are kept: they matter to callers that weigh candidates by
//! multiplicity, and reconstruction walks them in order.
//!
//! # Submodules
//!
//! - [`cycles`]: minimal alternating cycle detection in the doubled graph.
//! - [`scc`]: Tarjan-based sink strongly connected component search.
pub mod cycles;
pub mod scc;

pub use cycles::detect_cycle_longer_than_two;
pub use scc::sink_strongly_connected_component;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;
use serde::{Deserialize, Serialize};

use crate::error::InputError;

// ---------------------------------------------------------------------------
// DelegationGraph
// ---------------------------------------------------------------------------

/// Potential delegations of every node, indexed by node id in `[0, n)`.
///
/// Serializes as a JSON array whose entries are either `null` (voter) or an
/// array of candidate ids.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DelegationGraph {
    potential_delegations: Vec<Option<Vec<usize>>>,
}

impl DelegationGraph {
    /// Wraps a list of potential delegations. No validation happens here;
    /// call [`DelegationGraph::validate`] before rounding.
    pub fn new(potential_delegations: Vec<Option<Vec<usize>>>) -> Self {
        Self {
            potential_delegations,
        }
    }

    /// Returns the number of nodes.
    pub fn node_count(&self) -> usize {
        self.potential_delegations.len()
    }

    /// Returns `true` if the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.potential_delegations.is_empty()
    }

    /// Returns `true` if `node` is a voter. Out-of-range ids are not voters.
    pub fn is_voter(&self, node: usize) -> bool {
        matches!(self.potential_delegations.get(node), Some(None))
    }

    /// Returns the candidate list of `node`; empty for voters and
    /// out-of-range ids.
    pub fn candidates(&self, node: usize) -> &[usize] {
        match self.potential_delegations.get(node) {
            Some(Some(candidates)) => candidates,
            Some(None) | None => &[],
        }
    }

    /// Iterates over voter ids in increasing order.
    pub fn voters(&self) -> impl Iterator<Item = usize> + '_ {
        self.potential_delegations
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.is_none())
            .map(|(node, _)| node)
    }

    /// Returns the raw potential delegations.
    pub fn potential_delegations(&self) -> &[Option<Vec<usize>>] {
        &self.potential_delegations
    }

    /// Checks every precondition the fractional solver and the rounding
    /// engine rely on.
    ///
    /// # Errors
    ///
    /// - [`InputError::EmptyCandidates`]: a delegator with an empty list.
    /// - [`InputError::UnknownCandidate`]: a candidate id out of range.
    /// - [`InputError::SelfLoop`]: a delegator listing itself.
    /// - [`InputError::NoVoters`]: nodes exist but none is a voter.
    /// - [`InputError::Unreachable`]: a delegator with no path to a voter.
    pub fn validate(&self) -> Result<(), InputError> {
        let node_count = self.node_count();

        for (node, entry) in self.potential_delegations.iter().enumerate() {
            let Some(candidates) = entry else {
                continue;
            };
            if candidates.is_empty() {
                return Err(InputError::EmptyCandidates { node });
            }
            for &candidate in candidates {
                if candidate >= node_count {
                    return Err(InputError::UnknownCandidate {
                        node,
                        candidate,
                        node_count,
                    });
                }
                if candidate == node {
                    return Err(InputError::SelfLoop { node });
                }
            }
        }

        if node_count > 0 && self.voters().next().is_none() {
            return Err(InputError::NoVoters { node_count });
        }

        let reached = self.reaching_voters();
        match reached.iter().position(|&ok| !ok) {
            Some(node) => Err(InputError::Unreachable { node }),
            None => Ok(()),
        }
    }

    /// Marks every node with a delegation path to some voter.
    ///
    /// Builds the reversed candidate graph plus one root pointing at every
    /// voter, then runs a single BFS from that root. Assumes candidate ids
    /// are in range.
    fn reaching_voters(&self) -> Vec<bool> {
        let node_count = self.node_count();
        let mut reversed: DiGraph<(), ()> = DiGraph::with_capacity(node_count + 1, node_count);
        let indices: Vec<NodeIndex> = (0..node_count).map(|_| reversed.add_node(())).collect();
        let root = reversed.add_node(());

        for (node, entry) in self.potential_delegations.iter().enumerate() {
            match entry {
                None => {
                    reversed.add_edge(root, indices[node], ());
                }
                Some(candidates) => {
                    for &candidate in candidates {
                        reversed.add_edge(indices[candidate], indices[node], ());
                    }
                }
            }
        }

        let mut reached = vec![false; node_count];
        let mut bfs = Bfs::new(&reversed, root);
        while let Some(idx) = bfs.next(&reversed) {
            if let Some(slot) = reached.get_mut(idx.index()) {
                *slot = true;
            }
        }
        reached
    }
}

impl From<Vec<Option<Vec<usize>>>> for DelegationGraph {
    fn from(potential_delegations: Vec<Option<Vec<usize>>>) -> Self {
        Self::new(potential_delegations)
    }
}
