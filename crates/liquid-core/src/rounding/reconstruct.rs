//! Recovery of one-hop delegations from transitive ones.
//!
//! Contraction only records which voter each node resolves to. To turn that
//! into a delegation per node, walk the original candidate graph backwards
//! from every voter and let each not-yet-assigned predecessor that resolves
//! to the same voter delegate to the node it was reached from.
use crate::error::RoundingError;
use crate::graph::DelegationGraph;

/// Derives per-node delegations from `transitive`.
///
/// Voters are visited in index order; below each voter, predecessors are
/// visited depth first in increasing id order, once per listing.
///
/// # Errors
///
/// [`RoundingError::InternalInvariantViolation`] if some node is never
/// assigned.
pub fn delegations_from_transitive(
    graph: &DelegationGraph,
    transitive: &[usize],
) -> Result<Vec<Option<usize>>, RoundingError> {
    let node_count = graph.node_count();
    if transitive.len() != node_count {
        return Err(RoundingError::invariant(format!(
            "{} transitive delegations for {node_count} nodes",
            transitive.len()
        )));
    }

    let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); node_count];
    let mut assigned: Vec<Option<Option<usize>>> = vec![None; node_count];
    for node in 0..node_count {
        if graph.is_voter(node) {
            assigned[node] = Some(None);
        } else {
            for &candidate in graph.candidates(node) {
                predecessors[candidate].push(node);
            }
        }
    }

    // Frame: (node, index of the next predecessor to look at).
    let mut stack: Vec<(usize, usize)> = Vec::new();
    for voter in graph.voters() {
        stack.push((voter, 0));
        while let Some(frame) = stack.last_mut() {
            let node = frame.0;
            let Some(&pred) = predecessors[node].get(frame.1) else {
                stack.pop();
                continue;
            };
            frame.1 += 1;
            if assigned[pred].is_some() || transitive[pred] != transitive[node] {
                continue;
            }
            assigned[pred] = Some(Some(node));
            stack.push((pred, 0));
        }
    }

    assigned
        .into_iter()
        .enumerate()
        .map(|(node, delegation)| {
            delegation.ok_or_else(|| {
                RoundingError::invariant(format!(
                    "node {node} resolving to {} was never assigned a delegate",
                    transitive[node]
                ))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;
    use crate::test_helpers::graph;

    #[test]
    fn chain_is_rebuilt_hop_by_hop() {
        let g = graph(vec![None, None, Some(vec![0, 1]), Some(vec![2]), Some(vec![1])]);
        let delegations =
            delegations_from_transitive(&g, &[0, 1, 1, 1, 1]).expect("every node assigned");
        assert_eq!(delegations, vec![None, None, Some(1), Some(2), Some(1)]);
    }

    #[test]
    fn predecessor_resolving_elsewhere_is_skipped() {
        let g = graph(vec![None, None, Some(vec![0, 1]), Some(vec![0, 1])]);
        let delegations =
            delegations_from_transitive(&g, &[0, 1, 0, 1]).expect("every node assigned");
        assert_eq!(delegations, vec![None, None, Some(0), Some(1)]);
    }

    #[test]
    fn duplicate_candidates_assign_once() {
        // 1 is claimed from voter 0 and then claims 2 via its first copy.
        let g = graph(vec![None, Some(vec![0, 0]), Some(vec![1, 1, 0])]);
        let delegations =
            delegations_from_transitive(&g, &[0, 0, 0]).expect("every node assigned");
        assert_eq!(delegations, vec![None, Some(0), Some(1)]);
    }

    #[test]
    fn depth_first_order_follows_candidate_lists() {
        // From voter 0: predecessor 1 is reached first and then claims 3
        // before 2 gets the chance.
        let g = graph(vec![None, Some(vec![0]), Some(vec![0]), Some(vec![2, 1])]);
        let delegations =
            delegations_from_transitive(&g, &[0, 0, 0, 0]).expect("every node assigned");
        assert_eq!(delegations, vec![None, Some(0), Some(0), Some(1)]);
    }

    #[test]
    fn unreachable_assignment_is_an_invariant_violation() {
        let g = graph(vec![None, None, Some(vec![0])]);
        let err = delegations_from_transitive(&g, &[0, 1, 1]).expect_err("2 cannot reach 1");
        assert!(matches!(err, RoundingError::InternalInvariantViolation { .. }));
    }
}
