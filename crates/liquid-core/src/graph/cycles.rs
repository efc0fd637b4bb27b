//! Minimal alternating cycle detection.
//!
//! The rounding engine builds a doubled graph in which every flow arc
//! `u → v` appears, and every arc into a voter `v` additionally appears
//! reversed as `v → u`. A rounding step can leave "sawtooth" patterns in
//! this graph: alternating cycles through sinks and their predecessors.
//! [`detect_cycle_longer_than_two`] finds one such cycle of length at least
//! three.
//!
//! # Algorithm Overview
//!
//! Iterative depth-first search from every unvisited node, in index order.
//! Each node is *unseen*, *entered* (on the active DFS path), or *left*
//! (fully explored). Arcs into left nodes are ignored, and so is the arc
//! straight back to the DFS parent: every flow arc into a voter has its
//! reverse twin in the doubled graph, so that bounce is never a real cycle.
//! An arc into any other entered node closes a cycle, which is read off the
//! active path.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    Unseen,
    Entered,
    Left,
}

/// Finds a directed cycle of length at least three in `graph`.
///
/// `graph` is an adjacency list; parallel arcs are allowed, self-loops are
/// ignored.
///
/// Returns the cycle as a node list in traversal order with the first node
/// repeated at the end, so a cycle through `k` nodes has `k + 1` entries.
/// Returns `None` when every cycle in the graph has length one or two.
pub fn detect_cycle_longer_than_two(graph: &[Vec<usize>]) -> Option<Vec<usize>> {
    let mut visit = vec![Visit::Unseen; graph.len()];

    // Stack entry: (node, DFS parent, index of the next arc to explore).
    // The nodes on the stack are exactly the active DFS path.
    let mut stack: Vec<(usize, Option<usize>, usize)> = Vec::new();

    for root in 0..graph.len() {
        if visit[root] != Visit::Unseen {
            continue;
        }
        visit[root] = Visit::Entered;
        stack.push((root, None, 0));

        while let Some(frame) = stack.last_mut() {
            let (node, parent, next) = *frame;
            let Some(&child) = graph[node].get(next) else {
                stack.pop();
                visit[node] = Visit::Left;
                continue;
            };
            frame.2 += 1;

            if child == node || Some(child) == parent {
                continue;
            }
            match visit[child] {
                Visit::Left => {}
                Visit::Entered => {
                    if let Some(start) = stack.iter().position(|&(n, _, _)| n == child) {
                        let mut cycle: Vec<usize> = stack[start..].iter().map(|&(n, _, _)| n).collect();
                        cycle.push(child);
                        return Some(cycle);
                    }
                }
                Visit::Unseen => {
                    visit[child] = Visit::Entered;
                    stack.push((child, Some(node), 0));
                }
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triangle_is_found() {
        assert_eq!(
            detect_cycle_longer_than_two(&[vec![1], vec![2], vec![0]]),
            Some(vec![0, 1, 2, 0])
        );
    }

    #[test]
    fn bounce_to_parent_is_not_a_cycle() {
        assert_eq!(
            detect_cycle_longer_than_two(&[vec![1], vec![0], vec![0]]),
            None
        );
    }

    #[test]
    fn cycle_is_cut_out_of_the_dfs_path() {
        // 0 → 4 → 0 is a bounce; 1 → 2 → 3 → 1 is the cycle.
        assert_eq!(
            detect_cycle_longer_than_two(&[vec![4], vec![2], vec![3], vec![1], vec![0]]),
            Some(vec![1, 2, 3, 1])
        );
    }

    #[test]
    fn single_isolated_node_has_no_cycle() {
        assert_eq!(detect_cycle_longer_than_two(&[vec![]]), None);
    }

    #[test]
    fn empty_graph_has_no_cycle() {
        assert_eq!(detect_cycle_longer_than_two(&[]), None);
    }

    #[test]
    fn two_cycle_at_end_of_chain_is_ignored() {
        assert_eq!(
            detect_cycle_longer_than_two(&[vec![1], vec![2], vec![3], vec![2]]),
            None
        );
    }

    #[test]
    fn four_cycle_is_found() {
        assert_eq!(
            detect_cycle_longer_than_two(&[vec![1], vec![2], vec![3], vec![4], vec![1]]),
            Some(vec![1, 2, 3, 4, 1])
        );
    }

    #[test]
    fn parallel_arcs_into_finished_node_are_skipped() {
        assert_eq!(
            detect_cycle_longer_than_two(&[vec![], vec![0, 0, 2], vec![0, 3], vec![1, 0]]),
            Some(vec![1, 2, 3, 1])
        );
    }

    #[test]
    fn arcs_into_sink_without_return_are_acyclic() {
        assert_eq!(
            detect_cycle_longer_than_two(&[vec![], vec![2], vec![3], vec![0]]),
            None
        );
    }

    #[test]
    fn self_loop_is_ignored() {
        assert_eq!(detect_cycle_longer_than_two(&[vec![0]]), None);
    }

    #[test]
    fn alternating_sawtooth_is_found() {
        // Delegators 2 and 3 both split between voters 0 and 1; the doubled
        // graph closes 0 → 2 → 1 → 3 → 0.
        let doubled = vec![vec![2, 3], vec![2, 3], vec![0, 1], vec![0, 1]];
        assert_eq!(
            detect_cycle_longer_than_two(&doubled),
            Some(vec![0, 2, 1, 3, 0])
        );
    }

    #[test]
    fn deep_path_does_not_overflow() {
        // A single long path followed by one closing arc.
        let n = 100_000;
        let mut graph: Vec<Vec<usize>> = (0..n).map(|i| vec![i + 1]).collect();
        graph[n - 1] = vec![0];
        let cycle = detect_cycle_longer_than_two(&graph).unwrap_or_default();
        assert_eq!(cycle.len(), n + 1);
        assert_eq!(cycle.first(), cycle.last());
    }
}
