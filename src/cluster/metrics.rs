//! Cluster statistics and metrics

use std::collections::{BTreeMap, BTreeSet, HashMap};
use itertools::Itertools;
use petgraph::algo::dijkstra;
use petgraph::graph::{NodeIndex, UnGraph};
use rayon::prelude::*;
use serde::{Serialize, Deserialize};
use crate::cluster::state::ClusterState;
use crate::cluster::weights::Weights;
use crate::cluster::Cluster;
use crate::error::Result;
use crate::graph::{CompressedGraph, GraphSnapshot};

/// Number of central vertices reported per cluster
const CENTRAL_VERTICES: usize = 5;

/// Newman modularity of a partition given as a cluster label per position.
///
/// Positions labelled `None` are left out.
pub fn modularity<G: GraphSnapshot>(graph: &G, weights: &Weights, assignment: &[Option<usize>]) -> f64 {
    let mut internal = 0.0;
    for link in 0..graph.link_count() {
        if graph.is_self_loop(link) {
            continue;
        }
        let high = graph.vertex_position(graph.link_high_vertex(link)).and_then(|p| assignment[p]);
        let low = graph.vertex_position(graph.link_low_vertex(link)).and_then(|p| assignment[p]);
        if high.is_some() && high == low {
            internal += weights.link[link];
        }
    }

    let mut totals: BTreeMap<usize, f64> = BTreeMap::new();
    for (position, cluster) in assignment.iter().enumerate().take(weights.vertex.len()) {
        if let Some(cluster) = cluster {
            *totals.entry(*cluster).or_insert(0.0) += weights.vertex[position];
        }
    }

    internal - totals.values().map(|a| a * a).sum::<f64>()
}

/// Modularity of the state's current cut
pub fn current_modularity<G: GraphSnapshot>(graph: &G, weights: &Weights, state: &ClusterState) -> Result<f64> {
    let assignment = state.cluster_assignments()?;
    Ok(modularity(graph, weights, &assignment))
}

/// Density over undirected links: actual links / potential links
pub fn calculate_density(internal_links: usize, size: usize) -> f32 {
    if size <= 1 {
        return 1.0; // By convention, singleton clusters have density 1
    }
    let potential = size * (size - 1) / 2;
    internal_links as f32 / potential as f32
}

/// Describe every cluster of the current cut with at least `min_size`
/// members, largest first.
///
/// Numbers come from a fresh redraw epoch so they match what an overlay of
/// the same cut shows.
pub fn summarize_clusters(
    graph: &CompressedGraph,
    state: &mut ClusterState,
    min_size: usize,
) -> Result<Vec<Cluster>> {
    let assignment = state.cluster_assignments()?;
    let token = state.begin_redraw();

    let mut members: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for position in 0..graph.vertex_count() {
        if state.is_single_vertex(position) {
            continue;
        }
        if let Some(root) = assignment[position] {
            members.entry(root).or_default().push(position);
        }
    }

    // Count links inside each cluster and internal degree per vertex
    let mut internal_links: BTreeMap<usize, usize> = BTreeMap::new();
    let mut internal_degree = vec![0u32; graph.vertex_count()];
    for link in 0..graph.link_count() {
        if graph.is_self_loop(link) {
            continue;
        }
        let high = graph.vertex_position(graph.link_high_vertex(link));
        let low = graph.vertex_position(graph.link_low_vertex(link));
        if let (Some(high), Some(low)) = (high, low) {
            if assignment[high].is_some() && assignment[high] == assignment[low] {
                *internal_links.entry(assignment[high].unwrap_or_default()).or_insert(0) += 1;
                internal_degree[high] += 1;
                internal_degree[low] += 1;
            }
        }
    }

    let mut numbered = Vec::with_capacity(members.len());
    for (root, positions) in members {
        if positions.len() < min_size {
            continue;
        }
        let id = state.assign_stable_cluster_number(root, token).unwrap_or_default();
        let color = state.group(root).map(|g| g.color.to_string()).unwrap_or_default();
        numbered.push((id, root, color, positions));
    }

    let clusters: Vec<Cluster> = numbered
        .into_par_iter()
        .map(|(id, root, color, positions)| {
            let central_vertices = positions.iter()
                .sorted_by(|a, b| internal_degree[**b].cmp(&internal_degree[**a]).then(a.cmp(b)))
                .take(CENTRAL_VERTICES)
                .map(|&p| graph.vertex(p))
                .collect();
            let size = positions.len();
            Cluster {
                id,
                root: graph.vertex(root),
                members: positions.iter().map(|&p| graph.vertex(p)).collect(),
                size,
                density: calculate_density(internal_links.get(&root).copied().unwrap_or(0), size),
                color,
                central_vertices,
            }
        })
        .collect();

    Ok(clusters.into_iter()
        .sorted_by(|a, b| b.size.cmp(&a.size).then(a.id.cmp(&b.id)))
        .collect())
}

/// Vertices and links lying on shortest paths between cluster roots
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterPaths {
    /// Vertex ids of the cluster roots that were connected
    pub roots: Vec<u32>,
    pub vertices: BTreeSet<u32>,
    /// Link positions
    pub links: BTreeSet<usize>,
}

/// Every vertex and link on a shortest hop path between any two roots of
/// the current cut.
///
/// All tied shortest paths are included. Roots in different components
/// contribute nothing.
pub fn shortest_paths_between_clusters<G: GraphSnapshot>(graph: &G, state: &ClusterState) -> Result<ClusterPaths> {
    let roots = state.current_cluster_roots()?;

    let mut view: UnGraph<(), ()> = UnGraph::with_capacity(graph.vertex_count(), graph.link_count());
    for _ in 0..graph.vertex_count() {
        view.add_node(());
    }
    let mut ends = Vec::with_capacity(graph.link_count());
    for link in 0..graph.link_count() {
        if graph.is_self_loop(link) {
            continue;
        }
        let high = graph.vertex_position(graph.link_high_vertex(link));
        let low = graph.vertex_position(graph.link_low_vertex(link));
        if let (Some(high), Some(low)) = (high, low) {
            view.add_edge(NodeIndex::new(high), NodeIndex::new(low), ());
            ends.push((link, high, low));
        }
    }

    let sources: Vec<usize> = roots.iter()
        .filter_map(|&vertex| graph.vertex_position(vertex))
        .collect();
    let distances: Vec<HashMap<NodeIndex, usize>> = sources
        .par_iter()
        .map(|&source| dijkstra(&view, NodeIndex::new(source), None, |_| 1usize))
        .collect();

    let mut paths = ClusterPaths {
        roots: roots.clone(),
        ..Default::default()
    };
    let hops = |from: &HashMap<NodeIndex, usize>, position: usize| from.get(&NodeIndex::new(position)).copied();

    for (i, j) in (0..sources.len()).tuple_combinations() {
        let (from, to) = (&distances[i], &distances[j]);
        let Some(total) = hops(from, sources[j]) else {
            continue;
        };
        // A link lies on a shortest path when it bridges the two distance
        // fields without any slack, in either direction
        for &(link, high, low) in &ends {
            let on_path = [(high, low), (low, high)].into_iter().any(|(a, b)| {
                matches!((hops(from, a), hops(to, b)), (Some(x), Some(y)) if x + 1 + y == total)
            });
            if on_path {
                paths.links.insert(link);
                paths.vertices.insert(graph.vertex(high));
                paths.vertices.insert(graph.vertex(low));
            }
        }
        paths.vertices.insert(graph.vertex(sources[i]));
        paths.vertices.insert(graph.vertex(sources[j]));
    }

    log::debug!(
        "Paths between {} clusters cover {} vertices and {} links",
        roots.len(),
        paths.vertices.len(),
        paths.links.len()
    );
    Ok(paths)
}
