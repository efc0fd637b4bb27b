//! Node aggregation: contraction of resolved delegators.
use tracing::trace;

use crate::error::RoundingError;
use crate::flow::FlowState;

/// Contracts the first delegator, in index order, whose only remaining
/// successor is a voter.
///
/// Returns the contracted `(node, voter)` pair, or `None` when no delegator
/// qualifies.
///
/// # Errors
///
/// Propagates [`FlowState::contract`] failures, which indicate a corrupted
/// state.
pub fn aggregate_one(state: &mut FlowState) -> Result<Option<(usize, usize)>, RoundingError> {
    let found = (0..state.node_count()).find_map(|node| {
        let succs = state.successors(node);
        if succs.len() != 1 {
            return None;
        }
        let (&target, _) = succs.first_key_value()?;
        state.is_voter(target).then_some((node, target))
    });

    let Some((node, voter)) = found else {
        return Ok(None);
    };
    state.contract(node, voter)?;
    trace!(node, voter, demand = state.demand(voter), "contracted delegator");
    Ok(Some((node, voter)))
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
    fn first_resolved_delegator_is_contracted() {
        let mut s = state(
            vec![None, None, Some(vec![0, 1]), Some(vec![2]), Some(vec![1])],
            vec![
                None,
                None,
                Some(vec![(0, 1.5), (1, 0.5)]),
                Some(vec![(2, 1.0)]),
                Some(vec![(1, 1.0)]),
            ],
        );
        assert_eq!(aggregate_one(&mut s).expect("no error"), Some((4, 1)));
        assert_eq!(s.demand(1), 2);
        assert_eq!(s.transitive_delegations()[4], 1);
    }

    #[test]
    fn delegator_pointing_at_delegator_is_not_contracted() {
        let mut s = state(
            vec![None, None, Some(vec![0, 1]), Some(vec![2])],
            vec![
                None,
                None,
                Some(vec![(0, 1.0), (1, 1.0)]),
                Some(vec![(2, 1.0)]),
            ],
        );
        assert_eq!(aggregate_one(&mut s).expect("no error"), None);
        assert_eq!(s.total_demand(), 4);
    }

    #[test]
    fn contraction_reduces_active_delegators_and_keeps_demand() {
        let mut s = state(
            vec![None, Some(vec![0]), Some(vec![1])],
            vec![None, Some(vec![(0, 2.0)]), Some(vec![(1, 1.0)])],
        );
        let active = |s: &FlowState| (0..3).filter(|&n| !s.successors(n).is_empty()).count();
        let before = active(&s);
        aggregate_one(&mut s).expect("no error");
        assert_eq!(active(&s), before - 1);
        assert_eq!(s.total_demand(), 3);
        // 2's flow into 1 now targets voter 0.
        assert_eq!(s.successors(2).get(&0).copied(), Some(1.0));
    }
}
