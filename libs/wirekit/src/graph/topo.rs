//! Cycle detection and topological ordering over index-based adjacency lists.

use std::collections::VecDeque;

/// Detect a cycle using DFS with path tracking.
///
/// Returns the node indices of the first cycle found, closed by repeating its
/// first node (`a -> b -> a`), or `None` for an acyclic graph.
pub(crate) fn detect_cycle_with_path(adj: &[Vec<usize>]) -> Option<Vec<usize>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White, // unvisited
        Gray,  // on the current path
        Black, // finished
    }

    fn dfs(
        node: usize,
        adj: &[Vec<usize>],
        colors: &mut [Color],
        path: &mut Vec<usize>,
    ) -> Option<Vec<usize>> {
        colors[node] = Color::Gray;
        path.push(node);

        for &neighbor in &adj[node] {
            match colors[neighbor] {
                Color::Gray => {
                    if let Some(start) = path.iter().position(|&n| n == neighbor) {
                        let mut cycle = path[start..].to_vec();
                        cycle.push(neighbor);
                        return Some(cycle);
                    }
                }
                Color::White => {
                    if let Some(cycle) = dfs(neighbor, adj, colors, path) {
                        return Some(cycle);
                    }
                }
                Color::Black => {}
            }
        }

        path.pop();
        colors[node] = Color::Black;
        None
    }

    let mut colors = vec![Color::White; adj.len()];
    let mut path = Vec::new();
    for i in 0..adj.len() {
        if colors[i] == Color::White {
            if let Some(cycle) = dfs(i, adj, &mut colors, &mut path) {
                return Some(cycle);
            }
        }
    }
    None
}

/// Kahn's algorithm. `adj[u]` lists the nodes that must come after `u`.
/// Ties are broken by index, so the order is deterministic. The caller
/// guarantees the graph is acyclic.
pub(crate) fn topo_sort(adj: &[Vec<usize>]) -> Vec<usize> {
    let mut indeg = vec![0usize; adj.len()];
    for targets in adj {
        for &t in targets {
            indeg[t] += 1;
        }
    }

    let mut queue: VecDeque<usize> = indeg
        .iter()
        .enumerate()
        .filter(|(_, &d)| d == 0)
        .map(|(i, _)| i)
        .collect();

    let mut order = Vec::with_capacity(adj.len());
    while let Some(u) = queue.pop_front() {
        order.push(u);
        for &w in &adj[u] {
            indeg[w] -= 1;
            if indeg[w] == 0 {
                queue.push_back(w);
            }
        }
    }
    order
}
