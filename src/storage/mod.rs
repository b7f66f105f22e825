//! Results persistence module

pub mod document;

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use anyhow::{Context, Result};
use serde_json::{json, to_string_pretty, Value};
use statrs::statistics::Statistics;
use crate::cluster::state::ClusterState;
use crate::cluster::metrics::ClusterPaths;
use crate::cluster::Cluster;
use crate::graph::{CompressedGraph, GraphSnapshot};
use crate::error;

pub use document::{from_document, to_document, StateDocument, VertexIdMap};

/// Serialize an optional state, `None` becomes `null`
pub fn state_to_json(state: Option<&ClusterState>) -> error::Result<Value> {
    Ok(match state {
        Some(state) => serde_json::to_value(to_document(state))?,
        None => Value::Null,
    })
}

/// Parse a serialized state, `null` means no clustering was computed
pub fn state_from_json(value: Value, ids: &VertexIdMap) -> error::Result<Option<ClusterState>> {
    if value.is_null() {
        return Ok(None);
    }
    let document: StateDocument = serde_json::from_value(value)
        .map_err(|e| error::Error::corrupt(e.to_string()))?;
    from_document(document, ids).map(Some)
}

/// Write a state file
pub fn save_state(path: &Path, state: Option<&ClusterState>) -> Result<()> {
    log::info!("Saving clustering state to {}", path.display());

    let value = state_to_json(state)?;
    let file = File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, &value)?;
    writer.flush()?;

    Ok(())
}

/// Read a state file, translating vertex ids through `ids`
pub fn load_state(path: &Path, ids: &VertexIdMap) -> Result<Option<ClusterState>> {
    log::info!("Loading clustering state from {}", path.display());

    let file = File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let value: Value = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    Ok(state_from_json(value, ids)?)
}

/// Cache a graph in binary form
pub fn save_graph_cache(path: &Path, graph: &CompressedGraph) -> Result<()> {
    log::info!("Caching graph ({} bytes in memory) to {}", graph.memory_usage(), path.display());

    let file = File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    bincode::serialize_into(&mut writer, graph)?;
    writer.flush()?;
    Ok(())
}

pub fn load_graph_cache(path: &Path) -> Result<CompressedGraph> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let graph: CompressedGraph = bincode::deserialize_from(BufReader::new(file))
        .with_context(|| format!("Failed to decode graph cache {}", path.display()))?;
    Ok(graph)
}

/// Write the inter-cluster shortest paths with vertex labels
pub fn save_cluster_paths(paths: &ClusterPaths, graph: &CompressedGraph, output_dir: &Path) -> Result<()> {
    let path = output_dir.join("cluster_paths.json");
    log::info!("Saving paths between {} clusters to {}", paths.roots.len(), path.display());

    let label = |vertex: u32| {
        graph.vertex_position(vertex)
            .map(|position| graph.label(position))
            .unwrap_or_else(|| vertex.to_string())
    };
    let links: Vec<Value> = paths.links.iter()
        .map(|&link| json!({
            "low": label(graph.link_low_vertex(link)),
            "high": label(graph.link_high_vertex(link)),
            "transactions": graph.link_transaction_count(link),
        }))
        .collect();

    let document = json!({
        "roots": paths.roots.iter().map(|&v| label(v)).collect::<Vec<_>>(),
        "vertices": paths.vertices.iter().map(|&v| label(v)).collect::<Vec<_>>(),
        "links": links,
    });

    let mut file = File::create(&path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    file.write_all(to_string_pretty(&document)?.as_bytes())?;
    Ok(())
}

/// Save analysis results to the specified directory
pub fn save_results(
    clusters: &[Cluster],
    graph: &CompressedGraph,
    state: &ClusterState,
    modularity: f64,
    output_dir: &Path,
) -> Result<()> {
    log::info!("Saving {} clusters to {}", clusters.len(), output_dir.display());

    fs::create_dir_all(output_dir)?;

    save_summary(clusters, graph, state, modularity, output_dir)?;
    save_clusters(clusters, graph, output_dir)?;

    log::info!("Results saved successfully");

    Ok(())
}

/// Save summary information
fn save_summary(
    clusters: &[Cluster],
    graph: &CompressedGraph,
    state: &ClusterState,
    modularity: f64,
    output_dir: &Path,
) -> Result<()> {
    let path = output_dir.join("summary.json");
    let mut file = File::create(&path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    let sizes: Vec<f64> = clusters.iter().map(|c| c.size as f64).collect();
    let (mean_size, std_dev_size) = if sizes.len() > 1 {
        (sizes.iter().mean(), sizes.iter().std_dev())
    } else {
        (sizes.first().copied().unwrap_or(0.0), 0.0)
    };

    let summary = json!({
        "graph_stats": {
            "vertex_count": graph.vertex_count(),
            "link_count": graph.link_count(),
            "transaction_count": graph.transaction_count(),
            "structure_modification_counter": graph.structure_modification_counter(),
        },
        "clustering": {
            "steps": state.steps(),
            "current_step": state.current_step(),
            "optimum_step": state.optimum_step(),
            "current_number_of_clusters": state.current_number_of_clusters(),
            "modularity": modularity,
        },
        "cluster_stats": {
            "reported_clusters": clusters.len(),
            "clustered_vertices": clusters.iter().map(|c| c.size).sum::<usize>(),
            "largest_cluster_size": clusters.first().map_or(0, |c| c.size),
            "mean_cluster_size": mean_size,
            "std_dev_cluster_size": std_dev_size,
            "mean_density": clusters.iter().map(|c| c.density as f64).sum::<f64>() /
                            if clusters.is_empty() { 1.0 } else { clusters.len() as f64 },
        }
    });

    file.write_all(to_string_pretty(&summary)?.as_bytes())?;

    Ok(())
}

/// Save individual cluster information
fn save_clusters(
    clusters: &[Cluster],
    graph: &CompressedGraph,
    output_dir: &Path,
) -> Result<()> {
    let clusters_dir = output_dir.join("clusters");
    fs::create_dir_all(&clusters_dir)?;

    let label = |vertex: u32| {
        graph.vertex_position(vertex)
            .map(|position| graph.label(position))
            .unwrap_or_else(|| vertex.to_string())
    };

    for cluster in clusters {
        let path = clusters_dir.join(format!("cluster_{}.json", cluster.id));
        let mut file = File::create(path)?;

        let cluster_json = json!({
            "id": cluster.id,
            "root": label(cluster.root),
            "size": cluster.size,
            "density": cluster.density,
            "color": cluster.color,
            "central_vertices": cluster.central_vertices.iter().map(|&v| label(v)).collect::<Vec<_>>(),
            "members": cluster.members.iter().map(|&v| label(v)).collect::<Vec<_>>(),
        });

        file.write_all(to_string_pretty(&cluster_json)?.as_bytes())?;
    }

    let all_clusters_path = output_dir.join("all_clusters.json");
    let mut all_clusters_file = File::create(all_clusters_path)?;

    let clusters_json = json!({
        "clusters": clusters.iter().map(|c| {
            json!({
                "id": c.id,
                "size": c.size,
                "density": c.density,
                "color": c.color,
            })
        }).collect::<Vec<_>>()
    });

    all_clusters_file.write_all(to_string_pretty(&clusters_json)?.as_bytes())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::merger::FastNewman;
    use crate::cluster::NoInteraction;
    use crate::graph::GraphBuilder;

    fn clustered() -> (CompressedGraph, ClusterState) {
        let mut builder = GraphBuilder::default();
        builder.add_transaction("a", "b");
        builder.add_transaction("b", "c");
        builder.add_transaction("x", "y");
        let graph = builder.build();
        let result = FastNewman::default().run(&graph, &NoInteraction).unwrap();
        (graph, ClusterState::from_merge(result, false))
    }

    #[test]
    fn state_file_round_trips() {
        let (graph, mut state) = clustered();
        state.set_modification_counter(11);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        save_state(&path, Some(&state)).unwrap();
        let loaded = load_state(&path, &VertexIdMap::identity(graph.vertex_capacity()))
            .unwrap()
            .unwrap();

        assert_eq!(to_document(&loaded), to_document(&state));
        assert!(!loaded.is_interactive());
    }

    #[test]
    fn null_state_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        save_state(&path, None).unwrap();
        assert!(load_state(&path, &VertexIdMap::identity(0)).unwrap().is_none());
    }

    #[test]
    fn truncated_state_file_is_an_error() {
        let (graph, state) = clustered();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        save_state(&path, Some(&state)).unwrap();

        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();
        assert!(load_state(&path, &VertexIdMap::identity(graph.vertex_capacity())).is_err());
    }

    #[test]
    fn graph_cache_round_trips() {
        let (graph, _) = clustered();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.bin");

        save_graph_cache(&path, &graph).unwrap();
        let loaded = load_graph_cache(&path).unwrap();
        assert_eq!(loaded.vertex_ids, graph.vertex_ids);
        assert_eq!(loaded.labels, graph.labels);
        assert_eq!(loaded.link_transactions, graph.link_transactions);
    }

    #[test]
    fn cluster_paths_are_labelled() {
        let (graph, mut state) = clustered();
        state.set_current_step(0).unwrap();
        let paths = crate::cluster::metrics::shortest_paths_between_clusters(&graph, &state).unwrap();
        let dir = tempfile::tempdir().unwrap();

        save_cluster_paths(&paths, &graph, dir.path()).unwrap();
        let written: Value = serde_json::from_slice(&fs::read(dir.path().join("cluster_paths.json")).unwrap()).unwrap();
        assert_eq!(written["roots"].as_array().unwrap().len(), 5);
        // a-b, b-c and x-y; the two components are not joined
        assert_eq!(written["links"].as_array().unwrap().len(), 3);
        assert_eq!(written["vertices"][0], "a");
    }

    #[test]
    fn results_are_written() {
        let (graph, mut state) = clustered();
        let clusters = crate::cluster::metrics::summarize_clusters(&graph, &mut state, 1).unwrap();
        let dir = tempfile::tempdir().unwrap();

        save_results(&clusters, &graph, &state, 0.0, dir.path()).unwrap();
        let summary: Value = serde_json::from_slice(&fs::read(dir.path().join("summary.json")).unwrap()).unwrap();
        assert_eq!(summary["graph_stats"]["vertex_count"], 5);
        assert!(dir.path().join("clusters").join("cluster_0.json").exists());
    }
}
