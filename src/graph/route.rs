//! Single-source shortest paths over the open road network.

use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BinaryHeap};

use super::{NodeId, WorldGraph};

/// Total-ordered distance so f64 costs can live in a `BinaryHeap`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Cost(f64);

impl Eq for Cost {}

impl PartialOrd for Cost {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Cost {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Distances and predecessors from one source node. Blocked edges are never used.
#[derive(Debug, Clone)]
pub struct ShortestPaths {
    ids: Vec<NodeId>,
    dist: Vec<f64>,
    prev: Vec<Option<usize>>,
    index: BTreeMap<NodeId, usize>,
}

impl ShortestPaths {
    pub fn reachable(&self, target: NodeId) -> bool {
        self.cost_to(target).is_some()
    }

    /// Route length in km, `None` when the node is cut off or unknown.
    pub fn cost_to(&self, target: NodeId) -> Option<f64> {
        let i = *self.index.get(&target)?;
        let d = self.dist[i];
        d.is_finite().then_some(d)
    }

    /// Node sequence from the source to `target`, both ends included.
    pub fn path_to(&self, target: NodeId) -> Option<Vec<NodeId>> {
        let mut cur = *self.index.get(&target)?;
        if !self.dist[cur].is_finite() {
            return None;
        }
        let mut path = vec![self.ids[cur]];
        while let Some(prev) = self.prev[cur] {
            path.push(self.ids[prev]);
            cur = prev;
        }
        path.reverse();
        Some(path)
    }
}

/// Dijkstra from `source`. Ties on cost resolve towards the lower node id,
/// so the same graph always yields the same paths.
pub fn shortest_paths(graph: &WorldGraph, source: NodeId) -> Option<ShortestPaths> {
    let start = graph.index_of(source)?;
    let adjacency = graph.open_adjacency();
    let n = adjacency.len();

    let mut dist = vec![f64::INFINITY; n];
    let mut prev = vec![None; n];
    dist[start] = 0.0;

    // Nodes are stored sorted by id, so the index doubles as the id tie-break.
    let mut heap: BinaryHeap<Reverse<(Cost, usize)>> = BinaryHeap::new();
    heap.push(Reverse((Cost(0.0), start)));

    while let Some(Reverse((Cost(cost), node))) = heap.pop() {
        // Skip stale heap entries.
        if cost > dist[node] {
            continue;
        }
        for &(next, weight) in &adjacency[node] {
            let candidate = cost + weight;
            if candidate < dist[next] {
                dist[next] = candidate;
                prev[next] = Some(node);
                heap.push(Reverse((Cost(candidate), next)));
            }
        }
    }

    let ids: Vec<NodeId> = graph.node_ids().collect();
    let index = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
    Some(ShortestPaths {
        ids,
        dist,
        prev,
        index,
    })
}
