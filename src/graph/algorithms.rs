//! Graph algorithms used around the clustering run

use std::collections::HashSet;
use log;
use crate::graph::{CompressedGraph, GraphSnapshot};

/// Union-Find data structure for connected component analysis
pub struct DisjointSets {
    /// Parent pointers (parent[i] = parent of node i)
    parent: Vec<u32>,

    /// Size of each set (for union by size)
    rank: Vec<u32>,
}

impl DisjointSets {
    /// Create a new DisjointSets data structure
    pub fn new(size: usize) -> Self {
        Self {
            parent: (0..size as u32).collect(),
            rank: vec![1; size],
        }
    }

    /// Find the root of the set containing x with path compression
    pub fn find(&mut self, x: u32) -> u32 {
        let mut root = x;
        while self.parent[root as usize] != root {
            root = self.parent[root as usize];
        }

        // Path compression: point every node on the path at the root
        let mut node = x;
        while self.parent[node as usize] != root {
            let next = self.parent[node as usize];
            self.parent[node as usize] = root;
            node = next;
        }
        root
    }

    /// Union the sets containing x and y
    pub fn union(&mut self, x: u32, y: u32) {
        let root_x = self.find(x);
        let root_y = self.find(y);

        if root_x == root_y {
            return;
        }

        // Attach smaller tree under root of larger tree
        if self.rank[root_x as usize] > self.rank[root_y as usize] {
            self.parent[root_y as usize] = root_x;
            self.rank[root_x as usize] += self.rank[root_y as usize];
        } else {
            self.parent[root_x as usize] = root_y;
            self.rank[root_y as usize] += self.rank[root_x as usize];
        }
    }

    /// Get the size of the set containing x
    pub fn size(&mut self, x: u32) -> u32 {
        let root = self.find(x);
        self.rank[root as usize]
    }
}

/// Label every vertex position with the smallest position in its component
pub fn connected_components<G: GraphSnapshot>(graph: &G) -> Vec<usize> {
    let vertex_count = graph.vertex_count();
    let mut sets = DisjointSets::new(vertex_count);

    for link in 0..graph.link_count() {
        let high = graph.vertex_position(graph.link_high_vertex(link));
        let low = graph.vertex_position(graph.link_low_vertex(link));
        if let (Some(high), Some(low)) = (high, low) {
            sets.union(high as u32, low as u32);
        }
    }

    let mut smallest = vec![usize::MAX; vertex_count];
    let mut labels = Vec::with_capacity(vertex_count);
    for position in 0..vertex_count {
        let root = sets.find(position as u32) as usize;
        if smallest[root] == usize::MAX {
            smallest[root] = position;
        }
        labels.push(smallest[root]);
    }
    labels
}

/// Links that are the only non-self-loop link of one of their endpoints.
///
/// Merging these first absorbs pendant vertices into their neighbour before
/// any modularity-driven merge happens.
pub fn pendant_links(graph: &CompressedGraph) -> HashSet<usize> {
    let degrees = graph.degrees();
    let mut pendants = HashSet::new();

    for link in 0..graph.link_count() {
        if graph.is_self_loop(link) {
            continue;
        }
        let pendant = [graph.link_high_vertex(link), graph.link_low_vertex(link)]
            .into_iter()
            .filter_map(|vertex| graph.vertex_position(vertex))
            .any(|position| degrees[position] == 1);
        if pendant {
            pendants.insert(link);
        }
    }

    log::debug!("Found {} pendant links", pendants.len());
    pendants
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;

    #[test]
    fn star_leaves_are_pendants() {
        let mut builder = GraphBuilder::default();
        builder.add_transaction("hub", "a");
        builder.add_transaction("hub", "b");
        builder.add_transaction("a", "b");
        builder.add_transaction("hub", "c");
        builder.add_transaction("c", "c");
        let graph = builder.build();

        let pendants = pendant_links(&graph);
        assert_eq!(pendants.len(), 1);
        let link = *pendants.iter().next().unwrap();
        assert_eq!((graph.link_low_vertex(link), graph.link_high_vertex(link)), (0, 3));
    }

    #[test]
    fn components_are_labelled_by_first_position() {
        let mut builder = GraphBuilder::default();
        builder.add_transaction("a", "b");
        builder.add_transaction("c", "d");
        builder.add_transaction("d", "e");
        builder.get_or_create_vertex("f");
        let graph = builder.build();

        assert_eq!(connected_components(&graph), vec![0, 0, 2, 2, 2, 5]);
    }

    #[test]
    fn union_tracks_set_sizes() {
        let mut sets = DisjointSets::new(4);
        sets.union(0, 1);
        sets.union(2, 1);
        assert_eq!(sets.size(0), 3);
        assert_eq!(sets.size(3), 1);
        assert_eq!(sets.find(2), sets.find(0));
    }
}
