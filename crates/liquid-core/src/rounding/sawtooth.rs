//! Sawtooth cycle breaking.
//!
//! Finds one alternating cycle of length at least three in the doubled
//! graph and pushes the smallest real-arc flow around it. Real arcs lose
//! that amount; a step out of a voter travels a reversed arc and adds the
//! amount to the real arc it mirrors. Outflows and inflows of every node on
//! the cycle stay unchanged, and at least one real arc drops to zero.
use tracing::trace;

use crate::error::RoundingError;
use crate::flow::FlowState;
use crate::graph::detect_cycle_longer_than_two;

/// Breaks one sawtooth cycle.
///
/// Returns the cycle (first node repeated at the end), or `None` when the
/// doubled graph has no cycle of length three or more.
///
/// # Errors
///
/// [`RoundingError::InternalInvariantViolation`] if the reported cycle is
/// too short or crosses no real arc.
pub fn break_one_cycle(state: &mut FlowState) -> Result<Option<Vec<usize>>, RoundingError> {
    let Some(cycle) = detect_cycle_longer_than_two(&state.doubled_graph()) else {
        return Ok(None);
    };
    if cycle.len() < 4 {
        return Err(RoundingError::invariant(format!(
            "cycle finder returned the short cycle {cycle:?}"
        )));
    }

    let bottleneck = cycle
        .windows(2)
        .filter_map(|step| state.successors(step[0]).get(&step[1]).copied())
        .fold(f64::INFINITY, f64::min);
    if !bottleneck.is_finite() {
        return Err(RoundingError::invariant(format!(
            "cycle {cycle:?} crosses no real arc"
        )));
    }

    for step in cycle.windows(2) {
        state.push_along(step[0], step[1], bottleneck)?;
    }
    trace!(?cycle, bottleneck, "broke sawtooth cycle");
    Ok(Some(cycle))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;
    use crate::test_helpers::{fractional, graph};

    #[test]
    fn two_splitting_delegators_lose_one_arc() {
        let mut s = FlowState::from_fractional(
            &graph(vec![None, None, Some(vec![0, 1]), Some(vec![0, 1])]),
            &fractional(vec![
                None,
                None,
                Some(vec![(0, 0.3), (1, 0.7)]),
                Some(vec![(0, 0.7), (1, 0.3)]),
            ]),
            1e-9,
        )
        .expect("valid state");
        let arcs = s.arc_count();

        let cycle = break_one_cycle(&mut s).expect("no error").expect("cycle");
        assert_eq!(cycle, vec![0, 2, 1, 3, 0]);
        // The real arcs on the cycle are 2 → 1 and 3 → 0, both 0.7; both
        // drain, and the mirrored arcs 2 → 0 and 3 → 1 absorb the flow.
        assert_eq!(s.arc_count(), arcs - 2);
        assert!((s.successors(2)[&0] - 1.0).abs() < 1e-12);
        assert!((s.successors(3)[&1] - 1.0).abs() < 1e-12);
        assert!(s.successors(2).get(&1).is_none());
        assert!(s.successors(3).get(&0).is_none());
        assert!((s.outflow(2) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn tree_shaped_flow_has_no_sawtooth() {
        let mut s = FlowState::from_fractional(
            &graph(vec![None, None, Some(vec![0, 1]), Some(vec![2])]),
            &fractional(vec![
                None,
                None,
                Some(vec![(0, 1.0), (1, 1.0)]),
                Some(vec![(2, 1.0)]),
            ]),
            1e-9,
        )
        .expect("valid state");
        assert_eq!(break_one_cycle(&mut s).expect("no error"), None);
        assert_eq!(s.arc_count(), 3);
    }
}
