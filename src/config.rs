//! Configuration management for the clustering engine

use crate::cluster::merger::MergeOptions;
use crate::cluster::state::ExcludedState;
use crate::graph::algorithms::pendant_links;
use crate::graph::CompressedGraph;

/// Default configuration for a clustering run
#[derive(Debug, Clone)]
pub struct Config {
    /// Float transaction attribute holding edge weights, transaction counts
    /// are used when unset or missing
    pub weight_attribute: Option<String>,

    /// Merge links to degree-one vertices before anything else
    pub cluster_pendants_first: bool,

    /// Whether the state is shown interactively
    pub interactive: bool,

    /// Hide vertices that have not joined a cluster at the current step
    pub exclude_single_vertices: bool,

    /// Rendering of excluded elements
    pub excluded_state: ExcludedState,

    /// Minimum cluster size reported in result files
    pub min_cluster_size: usize,

    /// Number of worker threads, 0 uses all available cores
    pub threads: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            weight_attribute: None,
            cluster_pendants_first: true,
            interactive: true,
            exclude_single_vertices: false,
            excluded_state: ExcludedState::Show,
            min_cluster_size: 3,
            threads: 0,
        }
    }
}

impl Config {
    /// Merge options for clustering `graph` under this configuration
    pub fn merge_options(&self, graph: &CompressedGraph) -> MergeOptions {
        MergeOptions {
            weight_attribute: self.weight_attribute.clone(),
            initial_links: self.cluster_pendants_first.then(|| pendant_links(graph)),
        }
    }

    pub fn worker_threads(&self) -> usize {
        if self.threads > 0 {
            self.threads
        } else {
            num_cpus::get()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;

    #[test]
    fn pendants_become_initial_links() {
        let mut builder = GraphBuilder::default();
        builder.add_transaction("a", "b");
        builder.add_transaction("b", "c");
        builder.add_transaction("c", "a");
        builder.add_transaction("c", "d");
        let graph = builder.build();

        let options = Config::default().merge_options(&graph);
        assert_eq!(options.initial_links.map(|links| links.len()), Some(1));

        let config = Config {
            weight_attribute: Some("weight".to_string()),
            cluster_pendants_first: false,
            ..Default::default()
        };
        let options = config.merge_options(&graph);
        assert!(options.initial_links.is_none());
        assert_eq!(options.weight_attribute.as_deref(), Some("weight"));
    }

    #[test]
    fn zero_threads_uses_all_cores() {
        assert_eq!(Config::default().worker_threads(), num_cpus::get());
        let config = Config { threads: 2, ..Default::default() };
        assert_eq!(config.worker_threads(), 2);
    }
}
