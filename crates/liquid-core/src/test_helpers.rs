//! Shared fixture constructors for unit tests across `liquid-core`.
//!
//! Integration tests in `crates/liquid-core/tests/` define their own local
//! helpers because they link against the non-test library build where this
//! module is not available.
#![allow(clippy::expect_used, clippy::panic)]

use crate::fractional::FractionalFlow;
use crate::graph::DelegationGraph;

/// Builds a [`DelegationGraph`] from potential delegations.
pub fn graph(entries: Vec<Option<Vec<usize>>>) -> DelegationGraph {
    DelegationGraph::new(entries)
}

/// Builds a [`FractionalFlow`] from `(successor, value)` lists.
pub fn fractional(entries: Vec<Option<Vec<(usize, f64)>>>) -> FractionalFlow {
    FractionalFlow::from_flows(
        entries
            .into_iter()
            .map(|entry| entry.map(|arcs| arcs.into_iter().collect()))
            .collect(),
    )
}

/// Follows `delegations` from `node` to its voter, panicking on cycles.
pub fn resolve(delegations: &[Option<usize>], mut node: usize) -> usize {
    for _ in 0..=delegations.len() {
        match delegations[node] {
            None => return node,
            Some(next) => node = next,
        }
    }
    panic!("delegation chain from {node} does not terminate");
}
