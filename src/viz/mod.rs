//! Display overlay for the current cut
//!
//! Mirrors what a renderer applies when the cut moves: each vertex gets its
//! cluster's color and number, vertices hidden by the single-vertex rule and
//! links between clusters are dimmed or hidden according to the state.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use anyhow::{Context, Result};
use itertools::Itertools;
use crate::cluster::color::Color;
use crate::cluster::state::{ClusterState, ExcludedState};
use crate::error;
use crate::graph::{CompressedGraph, GraphSnapshot};

pub const VISIBLE: f32 = 2.0;
pub const INVISIBLE: f32 = -2.0;

/// Rendering of one vertex
#[derive(Debug, Clone, PartialEq)]
pub struct VertexOverlay {
    pub vertex: u32,
    /// Stable cluster number, -1 for excluded vertices
    pub cluster: i64,
    /// Position of the cluster's root group
    pub root: Option<usize>,
    /// Cluster color, `None` leaves the previous color in place
    pub color: Option<Color>,
    pub dimmed: bool,
    pub visibility: f32,
}

/// Rendering applied to every transaction of one link
#[derive(Debug, Clone, PartialEq)]
pub struct LinkOverlay {
    pub link: usize,
    pub color: Option<Color>,
    pub dimmed: bool,
    pub visibility: f32,
}

#[derive(Debug, Clone)]
pub struct Overlay {
    /// Redraw epoch the cluster numbers belong to
    pub redraw: u64,
    /// Whether the renderer should show overlay colors at all
    pub colored: bool,
    /// Indexed by vertex position, `None` where no group exists
    pub vertices: Vec<Option<VertexOverlay>>,
    pub links: Vec<LinkOverlay>,
}

/// Compute the overlay for the state's current cut, starting a new redraw
pub fn compute_overlay<G: GraphSnapshot>(graph: &G, state: &mut ClusterState) -> error::Result<Overlay> {
    let redraw = state.begin_redraw();
    let interactive = state.is_interactive();
    let excluded = state.excluded_state();

    let mut vertices = Vec::with_capacity(graph.vertex_count());
    for position in 0..graph.vertex_count() {
        if state.group(position).is_none() {
            vertices.push(None);
            continue;
        }
        let vertex = graph.vertex(position);

        if state.is_single_vertex(position) {
            let (dimmed, visibility) = if interactive {
                (
                    excluded == ExcludedState::Dimmed,
                    if excluded == ExcludedState::Hidden { INVISIBLE } else { VISIBLE },
                )
            } else {
                (false, VISIBLE)
            };
            vertices.push(Some(VertexOverlay {
                vertex,
                cluster: -1,
                root: None,
                color: None,
                dimmed,
                visibility,
            }));
            continue;
        }

        let root = state.resolve_to_current_cut(position)?;
        let color = root.and_then(|r| state.group(r)).map(|g| g.color);
        let cluster = root
            .and_then(|r| state.assign_stable_cluster_number(r, redraw))
            .map_or(-1, i64::from);
        vertices.push(Some(VertexOverlay {
            vertex,
            cluster,
            root,
            color,
            dimmed: false,
            visibility: VISIBLE,
        }));
    }

    let lookup = |vertex: u32| graph.vertex_position(vertex).and_then(|p| vertices[p].as_ref());

    let mut links = Vec::with_capacity(graph.link_count());
    for link in 0..graph.link_count() {
        let high = lookup(graph.link_high_vertex(link));
        let low = lookup(graph.link_low_vertex(link));
        let high_color = high.and_then(|v| v.color);

        let overlay = if interactive {
            let same_cluster = match (high, low) {
                (Some(h), Some(l)) => h.root.is_some() && h.root == l.root && !h.dimmed && !l.dimmed,
                _ => false,
            };
            if same_cluster {
                LinkOverlay { link, color: high_color, dimmed: false, visibility: VISIBLE }
            } else {
                LinkOverlay {
                    link,
                    color: None,
                    dimmed: excluded != ExcludedState::Show,
                    visibility: if excluded == ExcludedState::Hidden { INVISIBLE } else { VISIBLE },
                }
            }
        } else {
            LinkOverlay { link, color: high_color, dimmed: false, visibility: VISIBLE }
        };
        links.push(overlay);
    }

    Ok(Overlay {
        redraw,
        colored: state.is_colored(),
        vertices,
        links,
    })
}

fn color_field(color: Option<Color>) -> String {
    color.map(|c| c.to_string()).unwrap_or_default()
}

/// Write `nodes.csv`, `links.csv` and `cluster_stats.csv` for external tools
pub fn write_overlay(overlay: &Overlay, graph: &CompressedGraph, output_dir: &Path) -> Result<()> {
    log::info!("Writing overlay for redraw {} to {}", overlay.redraw, output_dir.display());

    let viz_dir = output_dir.join("visualizations");
    fs::create_dir_all(&viz_dir)
        .with_context(|| format!("Failed to create {}", viz_dir.display()))?;

    let mut nodes = BufWriter::new(File::create(viz_dir.join("nodes.csv"))?);
    writeln!(nodes, "id,label,cluster,color,dimmed,visibility")?;
    let mut sizes: BTreeMap<i64, (usize, Option<Color>)> = BTreeMap::new();
    for (position, vertex) in overlay.vertices.iter().enumerate() {
        let Some(vertex) = vertex else {
            continue;
        };
        let row = [
            vertex.vertex.to_string(),
            graph.label(position),
            vertex.cluster.to_string(),
            color_field(vertex.color),
            vertex.dimmed.to_string(),
            vertex.visibility.to_string(),
        ];
        writeln!(nodes, "{}", row.iter().join(","))?;

        if vertex.cluster >= 0 {
            let entry = sizes.entry(vertex.cluster).or_insert((0, vertex.color));
            entry.0 += 1;
        }
    }
    nodes.flush()?;

    let mut links = BufWriter::new(File::create(viz_dir.join("links.csv"))?);
    writeln!(links, "low,high,transactions,color,dimmed,visibility")?;
    for link in &overlay.links {
        let row = [
            graph.link_low_vertex(link.link).to_string(),
            graph.link_high_vertex(link.link).to_string(),
            graph.link_transaction_count(link.link).to_string(),
            color_field(link.color),
            link.dimmed.to_string(),
            link.visibility.to_string(),
        ];
        writeln!(links, "{}", row.iter().join(","))?;
    }
    links.flush()?;

    let mut stats = BufWriter::new(File::create(viz_dir.join("cluster_stats.csv"))?);
    writeln!(stats, "cluster,size,color")?;
    for (cluster, (size, color)) in &sizes {
        writeln!(stats, "{},{},{}", cluster, size, color_field(*color))?;
    }
    stats.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::merger::{FastNewman, MergeOptions};
    use crate::cluster::NoInteraction;
    use crate::graph::algorithms::pendant_links;
    use crate::graph::GraphBuilder;

    // triangle a-b-c, pair d-e joined to c, and an isolated vertex f
    fn graph() -> CompressedGraph {
        let mut builder = GraphBuilder::default();
        for (a, b) in [("a", "b"), ("b", "c"), ("c", "a"), ("c", "d"), ("d", "e")] {
            builder.add_transaction(a, b);
        }
        builder.get_or_create_vertex("f");
        builder.build()
    }

    fn state(graph: &CompressedGraph, pendants_first: bool) -> ClusterState {
        let options = MergeOptions {
            initial_links: pendants_first.then(|| pendant_links(graph)),
            ..Default::default()
        };
        let result = FastNewman::new(options).run(graph, &NoInteraction).unwrap();
        ClusterState::from_merge(result, true)
    }

    #[test]
    fn singletons_get_their_own_numbers() {
        let graph = graph();
        let mut state = state(&graph, false);
        state.set_current_step(0).unwrap();
        let overlay = compute_overlay(&graph, &mut state).unwrap();

        let numbers: Vec<i64> = overlay.vertices.iter().flatten().map(|v| v.cluster).collect();
        assert_eq!(numbers, vec![0, 1, 2, 3, 4, 5]);
        // every link crosses clusters at step 0
        assert!(overlay.links.iter().all(|l| l.color.is_none() && !l.dimmed));
    }

    #[test]
    fn excluded_vertices_follow_the_excluded_state() {
        let graph = graph();
        let mut state = state(&graph, false);
        state.set_current_step(0).unwrap();
        state.set_exclude_single_vertices(true);
        state.set_excluded_state(ExcludedState::Hidden);

        let overlay = compute_overlay(&graph, &mut state).unwrap();
        for vertex in overlay.vertices.iter().flatten() {
            assert_eq!(vertex.cluster, -1);
            assert!(!vertex.dimmed);
            assert_eq!(vertex.visibility, INVISIBLE);
        }
        assert!(overlay.links.iter().all(|l| l.dimmed && l.visibility == INVISIBLE));

        state.set_interactive(false);
        let overlay = compute_overlay(&graph, &mut state).unwrap();
        assert!(overlay.vertices.iter().flatten().all(|v| v.visibility == VISIBLE));
        assert!(overlay.links.iter().all(|l| !l.dimmed));
    }

    #[test]
    fn pendant_pair_joins_at_step_zero() {
        let graph = graph();
        let mut state = state(&graph, true);
        state.set_current_step(0).unwrap();
        state.set_exclude_single_vertices(true);
        state.set_excluded_state(ExcludedState::Dimmed);

        let overlay = compute_overlay(&graph, &mut state).unwrap();
        let d = overlay.vertices[3].as_ref().unwrap();
        let e = overlay.vertices[4].as_ref().unwrap();
        assert_eq!(d.root, e.root);
        assert!(d.cluster >= 0);
        let a = overlay.vertices[0].as_ref().unwrap();
        assert_eq!(a.cluster, -1);
        assert!(a.dimmed);

        // the d-e link is the last link and lies inside one cluster
        let de = overlay.links.last().unwrap();
        assert_eq!(de.color, d.color);
        assert!(!de.dimmed);
    }

    #[test]
    fn overlay_files_are_written() {
        let graph = graph();
        let mut state = state(&graph, false);
        let overlay = compute_overlay(&graph, &mut state).unwrap();
        let dir = tempfile::tempdir().unwrap();

        write_overlay(&overlay, &graph, dir.path()).unwrap();
        let nodes = fs::read_to_string(dir.path().join("visualizations").join("nodes.csv")).unwrap();
        assert_eq!(nodes.lines().count(), 7);
        assert!(nodes.lines().nth(1).unwrap().starts_with("0,a,"));
    }
}
