//! Voter weights of a confluent delegation.
//!
//! The weight of a voter is the number of nodes, itself included, whose
//! delegation chain ends at it. The maximum weight is the quantity the
//! rounding mechanisms bound relative to the fractional congestion.
use crate::error::{InputError, RoundingError};
use crate::graph::DelegationGraph;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Unknown,
    OnPath,
    Voter(usize),
}

/// Counts, per node, how many nodes resolve to it. Delegators get zero.
///
/// Chains are followed iteratively and each node is resolved once, so the
/// cost is linear in the number of nodes.
///
/// # Errors
///
/// - [`InputError::UnknownCandidate`] if a delegation points outside the
///   node range.
/// - [`InputError::DelegationCycle`] if a chain never reaches a voter.
pub fn voter_weights(delegations: &[Option<usize>]) -> Result<Vec<usize>, RoundingError> {
    let node_count = delegations.len();
    let mut resolution = vec![Resolution::Unknown; node_count];
    let mut path = Vec::new();

    for start in 0..node_count {
        let mut node = start;
        let voter = loop {
            match resolution[node] {
                Resolution::Voter(voter) => break voter,
                Resolution::OnPath => return Err(InputError::DelegationCycle { node }.into()),
                Resolution::Unknown => {}
            }
            match delegations[node] {
                None => break node,
                Some(next) if next >= node_count => {
                    return Err(InputError::UnknownCandidate {
                        node,
                        candidate: next,
                        node_count,
                    }
                    .into());
                }
                Some(next) => {
                    resolution[node] = Resolution::OnPath;
                    path.push(node);
                    node = next;
                }
            }
        };
        resolution[node] = Resolution::Voter(voter);
        for member in path.drain(..) {
            resolution[member] = Resolution::Voter(voter);
        }
    }

    let mut weights = vec![0; node_count];
    for entry in resolution {
        if let Resolution::Voter(voter) = entry {
            weights[voter] += 1;
        }
    }
    Ok(weights)
}

/// Returns the largest voter weight, or zero for an empty delegation.
///
/// # Errors
///
/// See [`voter_weights`].
pub fn max_weight(delegations: &[Option<usize>]) -> Result<usize, RoundingError> {
    Ok(voter_weights(delegations)?.into_iter().max().unwrap_or(0))
}

/// Checks that `delegations` is a confluent choice within `graph`: voters
/// choose nothing and every delegator chooses one of its own candidates.
///
/// # Errors
///
/// [`InputError::InconsistentDelegation`] naming the first offending node.
pub fn check_delegations(
    graph: &DelegationGraph,
    delegations: &[Option<usize>],
) -> Result<(), RoundingError> {
    if delegations.len() != graph.node_count() {
        return Err(InputError::InconsistentDelegation {
            node: delegations.len().min(graph.node_count()),
            detail: format!(
                "{} delegations for {} nodes",
                delegations.len(),
                graph.node_count()
            ),
        }
        .into());
    }
    for (node, delegation) in delegations.iter().enumerate() {
        let detail = match (graph.is_voter(node), delegation) {
            (true, None) => continue,
            (false, Some(target)) if graph.candidates(node).contains(target) => continue,
            (true, Some(_)) => "voter delegates".to_owned(),
            (false, None) => "delegator has no delegate".to_owned(),
            (false, Some(target)) => format!("{target} is not a candidate"),
        };
        return Err(InputError::InconsistentDelegation { node, detail }.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;
    use crate::test_helpers::graph;

    #[test]
    fn weights_follow_chains() {
        let weights = voter_weights(&[None, None, Some(1), Some(2), Some(1)]).expect("acyclic");
        assert_eq!(weights, vec![1, 4, 0, 0, 0]);
        assert_eq!(max_weight(&[None, None, Some(1), Some(2), Some(1)]), Ok(4));
    }

    #[test]
    fn weights_sum_to_node_count() {
        let delegations = [None, Some(0), Some(1), None, Some(3), Some(2)];
        let weights = voter_weights(&delegations).expect("acyclic");
        assert_eq!(weights.iter().sum::<usize>(), delegations.len());
    }

    #[test]
    fn cycle_is_reported() {
        let err = voter_weights(&[None, Some(2), Some(1)]).expect_err("cyclic");
        assert_eq!(
            err,
            RoundingError::InvalidInput(InputError::DelegationCycle { node: 1 })
        );
    }

    #[test]
    fn chain_into_cycle_is_reported() {
        assert!(voter_weights(&[None, Some(2), Some(3), Some(2)]).is_err());
    }

    #[test]
    fn out_of_range_delegate_is_reported() {
        let err = voter_weights(&[None, Some(9)]).expect_err("out of range");
        assert!(matches!(
            err,
            RoundingError::InvalidInput(InputError::UnknownCandidate { candidate: 9, .. })
        ));
    }

    #[test]
    fn empty_delegation_has_zero_max_weight() {
        assert_eq!(max_weight(&[]), Ok(0));
    }

    #[test]
    fn check_accepts_candidate_choices() {
        let g = graph(vec![None, None, Some(vec![0, 1]), Some(vec![2])]);
        assert_eq!(check_delegations(&g, &[None, None, Some(1), Some(2)]), Ok(()));
    }

    #[test]
    fn check_rejects_non_candidate() {
        let g = graph(vec![None, None, Some(vec![0])]);
        let err = check_delegations(&g, &[None, None, Some(1)]).expect_err("1 not listed");
        assert!(matches!(
            err,
            RoundingError::InvalidInput(InputError::InconsistentDelegation { node: 2, .. })
        ));
    }

    #[test]
    fn check_rejects_delegating_voter() {
        let g = graph(vec![None, None]);
        assert!(check_delegations(&g, &[Some(1), None]).is_err());
    }
}
