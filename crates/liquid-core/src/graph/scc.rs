//! Sink strongly connected component search.
//!
//! Tarjan's algorithm, driven by an explicit work stack instead of
//! recursion. Tarjan completes components in reverse topological order of
//! the condensation, so the first completed component reachable from a DFS
//! root has no arcs leaving it. The search returns the first completed
//! component that has at least two nodes and is closed under its
//! out-arcs.

struct TarjanState {
    counter: usize,
    index: Vec<Option<usize>>,
    lowlink: Vec<usize>,
    on_stack: Vec<bool>,
    component_stack: Vec<usize>,
}

impl TarjanState {
    fn new(node_count: usize) -> Self {
        Self {
            counter: 0,
            index: vec![None; node_count],
            lowlink: vec![0; node_count],
            on_stack: vec![false; node_count],
            component_stack: Vec::new(),
        }
    }

    fn discover(&mut self, node: usize) {
        self.index[node] = Some(self.counter);
        self.lowlink[node] = self.counter;
        self.counter += 1;
        self.component_stack.push(node);
        self.on_stack[node] = true;
    }

    /// Pops the component rooted at `root` off the component stack.
    fn pop_component(&mut self, root: usize) -> Vec<usize> {
        let mut component = Vec::new();
        while let Some(member) = self.component_stack.pop() {
            self.on_stack[member] = false;
            component.push(member);
            if member == root {
                break;
            }
        }
        component
    }
}

/// Returns the nodes of a sink strongly connected component of `graph`
/// with at least two nodes, sorted ascending.
///
/// Only nodes with at least one out-arc are used as DFS roots, so isolated
/// nodes are never reported. Returns `None` if no such component exists.
pub fn sink_strongly_connected_component(graph: &[Vec<usize>]) -> Option<Vec<usize>> {
    let node_count = graph.len();
    let mut state = TarjanState::new(node_count);
    let mut in_component = vec![false; node_count];

    // Work stack entry: (node, index of the next arc to explore).
    let mut work: Vec<(usize, usize)> = Vec::new();

    for root in 0..node_count {
        if graph[root].is_empty() || state.index[root].is_some() {
            continue;
        }
        state.discover(root);
        work.push((root, 0));

        while let Some(frame) = work.last_mut() {
            let node = frame.0;
            if let Some(&child) = graph[node].get(frame.1) {
                frame.1 += 1;
                match state.index[child] {
                    None => {
                        state.discover(child);
                        work.push((child, 0));
                    }
                    Some(child_index) if state.on_stack[child] => {
                        state.lowlink[node] = state.lowlink[node].min(child_index);
                    }
                    Some(_) => {}
                }
                continue;
            }

            work.pop();
            if let Some(&(parent, _)) = work.last() {
                state.lowlink[parent] = state.lowlink[parent].min(state.lowlink[node]);
            }
            if state.index[node] != Some(state.lowlink[node]) {
                continue;
            }

            let mut component = state.pop_component(node);
            if component.len() < 2 {
                continue;
            }
            for &member in &component {
                in_component[member] = true;
            }
            let closed = component
                .iter()
                .all(|&member| graph[member].iter().all(|&next| in_component[next]));
            if closed {
                component.sort_unstable();
                return Some(component);
            }
            for &member in &component {
                in_component[member] = false;
            }
        }
    }

    None
}
