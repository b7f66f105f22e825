//! Normalized vertex and link weights for a merge run

use log;
use crate::graph::GraphSnapshot;

/// Per-link and per-vertex weight shares of one graph snapshot.
///
/// Link weights sum to 1 over the non-self-loop links; vertex weights are
/// half the sum of their incident link weights and therefore also sum to 1.
#[derive(Debug, Clone, Default)]
pub struct Weights {
    /// Normalized weight by link position, 0 for self loops
    pub link: Vec<f64>,

    /// Normalized weight by vertex position
    pub vertex: Vec<f64>,

    /// Raw weight total before normalization
    pub total: f64,
}

impl Weights {
    /// Compute weights from the named transaction attribute when the graph
    /// has it, otherwise from transaction counts.
    pub fn compute<G: GraphSnapshot>(graph: &G, attribute: Option<&str>) -> Self {
        let attribute = attribute.and_then(|name| {
            let found = graph.transaction_attribute(name);
            if found.is_none() {
                log::debug!("Weight attribute '{}' not found, using transaction counts", name);
            }
            found
        });

        let link_count = graph.link_count();
        let mut link = vec![0.0; link_count];
        let mut total = 0.0;

        for (position, weight) in link.iter_mut().enumerate() {
            if graph.is_self_loop(position) {
                continue;
            }
            let count = graph.link_transaction_count(position);
            *weight = match attribute {
                Some(attr) => (0..count)
                    .map(|i| graph.transaction_float(attr, graph.link_transaction(position, i)) as f64)
                    .sum(),
                None => count as f64,
            };
            total += *weight;
        }

        let mut vertex = vec![0.0; graph.vertex_count()];
        if total > 0.0 {
            for (position, weight) in link.iter_mut().enumerate() {
                if *weight == 0.0 {
                    continue;
                }
                *weight /= total;
                for endpoint in [graph.link_high_vertex(position), graph.link_low_vertex(position)] {
                    if let Some(v) = graph.vertex_position(endpoint) {
                        vertex[v] += *weight / 2.0;
                    }
                }
            }
        } else {
            link.iter_mut().for_each(|w| *w = 0.0);
        }

        Self { link, vertex, total }
    }

    /// True when there is no edge weight to cluster on
    pub fn is_degenerate(&self) -> bool {
        self.total <= 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::builder::WEIGHT_ATTRIBUTE;
    use crate::graph::GraphBuilder;

    #[test]
    fn counts_are_used_without_attribute() {
        let mut builder = GraphBuilder::default();
        builder.add_transaction("a", "b");
        builder.add_transaction("a", "b");
        builder.add_transaction("b", "c");
        builder.add_transaction("c", "c");
        let graph = builder.build();

        let weights = Weights::compute(&graph, Some(WEIGHT_ATTRIBUTE));
        assert_eq!(weights.total, 3.0);
        assert!((weights.link.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!((weights.vertex.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!((weights.vertex[1] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn attribute_values_are_summed() {
        let mut builder = GraphBuilder::default();
        let t0 = builder.add_transaction("a", "b");
        let t1 = builder.add_transaction("b", "c");
        builder.set_transaction_float(WEIGHT_ATTRIBUTE, t0, 3.0).unwrap();
        builder.set_transaction_float(WEIGHT_ATTRIBUTE, t1, 1.0).unwrap();
        let graph = builder.build();

        let weights = Weights::compute(&graph, Some(WEIGHT_ATTRIBUTE));
        assert!((weights.link[0] - 0.75).abs() < 1e-12);
        assert!((weights.vertex[0] - 0.375).abs() < 1e-12);
        assert!((weights.vertex[2] - 0.125).abs() < 1e-12);
    }

    #[test]
    fn self_loops_only_is_degenerate() {
        let mut builder = GraphBuilder::default();
        builder.add_transaction("a", "a");
        let weights = Weights::compute(&builder.build(), None);
        assert!(weights.is_degenerate());
        assert_eq!(weights.vertex, vec![0.0]);
    }
}
